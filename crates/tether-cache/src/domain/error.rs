//! Domain Model: Holder Error Types
//!
//! Misconfiguration and loading failures. Absence of a binding is never an
//! error, and collaborator failures during release are logged, not returned.

/// Errors surfaced by configuration and registry construction
#[derive(Debug, thiserror::Error)]
pub enum HolderError {
    /// A configuration field violates its constraint
    #[error("Invalid registry config: {field} {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },

    /// Configuration file could not be read
    #[error("Failed to read registry config {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration text is not valid JSON for `RegistryConfig`
    #[error("Failed to parse registry config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl HolderError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// Check if error is a configuration constraint violation
    pub fn is_invalid_config(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }
}

pub type HolderResult<T> = Result<T, HolderError>;
