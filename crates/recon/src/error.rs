use thiserror::Error;

/// Run-level errors. Per-field and per-document failures never surface here;
/// they are recorded as `ERROR` rows instead.
#[derive(Debug, Error)]
pub enum AuditError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (missing mapping source, bad entity rule, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// The record store could not be reached or re-established.
    #[error("store connection error: {0}")]
    Connection(String),
}
