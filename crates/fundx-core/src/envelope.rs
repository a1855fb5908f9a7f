use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::{PeriodKind, ProviderId, Symbol, ValidationError};

/// Current version of the machine-readable output.
pub const SCHEMA_VERSION: &str = "v1.0.0";

/// Standard envelope for all `fundx` machine-readable outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub meta: EnvelopeMeta,
    pub data: T,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EnvelopeError>,
}

impl<T> Envelope<T> {
    pub fn success(meta: EnvelopeMeta, data: T) -> Self {
        Self {
            meta,
            data,
            errors: Vec::new(),
        }
    }

    pub fn with_errors(
        meta: EnvelopeMeta,
        data: T,
        errors: Vec<EnvelopeError>,
    ) -> Result<Self, ValidationError> {
        meta.validate_schema_compliance()?;
        for error in &errors {
            error.validate()?;
        }

        Ok(Self { meta, data, errors })
    }

    pub fn push_error(&mut self, error: EnvelopeError) -> Result<(), ValidationError> {
        error.validate()?;
        self.errors.push(error);
        Ok(())
    }
}

/// Metadata attached to every envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    pub request_id: String,
    pub schema_version: String,
    /// RFC 3339, always UTC.
    #[serde(serialize_with = "serialize_utc", deserialize_with = "deserialize_utc")]
    pub generated_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<PeriodKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<Symbol>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_chain: Vec<ProviderId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl EnvelopeMeta {
    pub fn new(
        request_id: impl Into<String>,
        schema_version: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let meta = Self {
            request_id: request_id.into(),
            schema_version: schema_version.into(),
            generated_at: OffsetDateTime::now_utc(),
            period: None,
            symbols: Vec::new(),
            source_chain: Vec::new(),
            warnings: Vec::new(),
        };
        meta.validate_schema_compliance()?;
        Ok(meta)
    }

    pub fn with_run(mut self, period: PeriodKind, symbols: Vec<Symbol>) -> Self {
        self.period = Some(period);
        self.symbols = symbols;
        self
    }

    pub fn with_source_chain(mut self, source_chain: Vec<ProviderId>) -> Self {
        self.source_chain = source_chain;
        self
    }

    pub fn generated_at_rfc3339(&self) -> String {
        self.generated_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.generated_at.unix_timestamp().to_string())
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn validate_schema_compliance(&self) -> Result<(), ValidationError> {
        if self.request_id.trim().len() < 8 {
            return Err(ValidationError::InvalidRequestId);
        }

        if !is_valid_schema_version(&self.schema_version) {
            return Err(ValidationError::InvalidSchemaVersion {
                value: self.schema_version.clone(),
            });
        }

        Ok(())
    }
}

/// Structured error payload for failed runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl EnvelopeError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let error = Self {
            code: code.into(),
            message: message.into(),
            retryable: None,
        };
        error.validate()?;
        Ok(error)
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.code.trim().is_empty() {
            return Err(ValidationError::EmptyErrorCode);
        }

        if self.message.trim().is_empty() {
            return Err(ValidationError::EmptyErrorMessage);
        }

        Ok(())
    }
}

fn serialize_utc<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let text = value
        .to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&text)
}

fn deserialize_utc<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    let not_utc = || D::Error::custom(ValidationError::TimestampNotUtc { value: text.clone() });
    let parsed = OffsetDateTime::parse(&text, &Rfc3339).map_err(|_| not_utc())?;
    if parsed.offset() != UtcOffset::UTC {
        return Err(not_utc());
    }
    Ok(parsed)
}

fn is_valid_schema_version(value: &str) -> bool {
    let Some(version) = value.strip_prefix('v') else {
        return false;
    };

    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|ch| ch.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_meta() {
        let meta = EnvelopeMeta::new("request-12345", SCHEMA_VERSION)
            .expect("meta should be valid")
            .with_run(
                PeriodKind::Quarterly,
                vec![Symbol::parse("AAPL").expect("valid symbol")],
            );

        assert_eq!(meta.schema_version, "v1.0.0");
        assert_eq!(meta.period, Some(PeriodKind::Quarterly));
    }

    #[test]
    fn rejects_bad_schema_version_and_request_id() {
        let err = EnvelopeMeta::new("request-12345", "1.0.0").expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidSchemaVersion { .. }));

        let err = EnvelopeMeta::new("short", SCHEMA_VERSION).expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidRequestId));
    }

    #[test]
    fn rejects_empty_error_fields() {
        let err = EnvelopeError::new("", "message").expect_err("must fail");
        assert!(matches!(err, ValidationError::EmptyErrorCode));

        let err = EnvelopeError::new("engine.incomplete", " ").expect_err("must fail");
        assert!(matches!(err, ValidationError::EmptyErrorMessage));
    }

    #[test]
    fn generated_at_round_trips_as_utc_text() {
        let mut meta = EnvelopeMeta::new("request-12345", SCHEMA_VERSION).expect("meta");
        meta.generated_at = OffsetDateTime::parse("2021-03-31T16:30:00Z", &Rfc3339).expect("time");

        let json = serde_json::to_value(&meta).expect("serialize");
        assert_eq!(json["generated_at"], "2021-03-31T16:30:00Z");
        assert_eq!(meta.generated_at_rfc3339(), "2021-03-31T16:30:00Z");

        let back: EnvelopeMeta = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, meta);
    }

    #[test]
    fn rejects_generated_at_with_offset() {
        let json = serde_json::json!({
            "request_id": "request-12345",
            "schema_version": SCHEMA_VERSION,
            "generated_at": "2021-03-31T17:30:00+01:00",
        });

        let err = serde_json::from_value::<EnvelopeMeta>(json).expect_err("must fail");

        assert!(err.to_string().contains("must be RFC3339 UTC"), "unexpected error: {err}");
    }

    #[test]
    fn omits_empty_optional_fields() {
        let meta = EnvelopeMeta::new("request-12345", SCHEMA_VERSION).expect("meta should be valid");
        let json = serde_json::to_value(Envelope::success(meta, 1)).expect("serialize");

        assert!(json["meta"].get("period").is_none());
        assert!(json["meta"].get("warnings").is_none());
        assert!(json.get("errors").is_none());
        assert_eq!(json["data"], 1);
    }
}
