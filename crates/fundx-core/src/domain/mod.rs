//! # Domain Types
//!
//! Small validated value types shared by every other module.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Date`] | Fiscal year + quarter (quarter 0 = annual) |
//! | [`PeriodKind`] | Annual or quarterly reporting granularity |
//! | [`Symbol`] | Validated ticker and its [`Listing`] |

mod date;
mod period;
mod symbol;

pub use date::Date;
pub use period::PeriodKind;
pub use symbol::{Listing, Symbol};
