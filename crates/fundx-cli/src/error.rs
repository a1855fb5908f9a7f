use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] fundx_core::ValidationError),

    #[error(transparent)]
    Rule(#[from] fundx_core::RuleError),

    #[error("usage error: {0}")]
    Usage(String),

    #[error(transparent)]
    Lookup(#[from] fundx_core::LookupError),

    #[error(transparent)]
    Core(#[from] fundx_core::CoreError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Rule(_) | Self::Usage(_) => 2,
            Self::Lookup(_) => 3,
            Self::Serialization(_) => 4,
            Self::Core(_) | Self::Io(_) => 10,
        }
    }
}
