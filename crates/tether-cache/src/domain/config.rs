//! Domain Model: Registry Configuration
//!
//! Limits that govern one scope's bindings. Pure data plus validation; the
//! registry adapter reads these values when it sweeps.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::error::{HolderError, HolderResult};
use super::policy::EvictionLimits;

/// Default grace period between retirement and forced close
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 30_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-scope limits for a `ResourceRegistry`
///
/// Missing fields fall back to `Default` when deserialized, so a file only
/// needs to name what it overrides.
///
/// ```
/// use tether_cache::domain::RegistryConfig;
///
/// let config = RegistryConfig::from_json_str(r#"{ "scope_name": "default", "max_uses": 50 }"#).unwrap();
/// assert_eq!(config.max_uses, 50);
/// assert_eq!(config.grace_period_ms, 30_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Scope the registry serves (e.g. a workspace name); diagnostics only
    pub scope_name: String,

    /// A binding unused for longer than this is retired
    pub max_age_ms: u64,

    /// A binding used more than this many times is retired
    pub max_uses: u64,

    /// A retired handle is closed once its last use is older than this
    pub grace_period_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            scope_name: "default".to_string(),
            max_age_ms: 300_000,
            max_uses: 1_000,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
        }
    }
}

impl RegistryConfig {
    /// Config for `scope_name` with default limits
    pub fn for_scope(scope_name: impl Into<String>) -> Self {
        Self {
            scope_name: scope_name.into(),
            ..Self::default()
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age_ms = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_uses(mut self, max_uses: u64) -> Self {
        self.max_uses = max_uses;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Limits handed to `EvictionPolicy`
    pub fn limits(&self) -> EvictionLimits {
        EvictionLimits {
            max_age_ms: self.max_age_ms as i64,
            max_uses: self.max_uses,
            grace_period_ms: self.grace_period_ms as i64,
        }
    }

    /// Verify configuration validity
    ///
    /// # Errors
    ///
    /// `HolderError::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> HolderResult<()> {
        if self.scope_name.trim().is_empty() {
            return Err(HolderError::invalid("scope_name", "must not be empty"));
        }
        if self.max_uses == 0 {
            return Err(HolderError::invalid("max_uses", "must be greater than zero"));
        }
        if self.max_age_ms == 0 {
            return Err(HolderError::invalid("max_age_ms", "must be greater than zero"));
        }
        if self.max_age_ms > i64::MAX as u64 {
            return Err(HolderError::invalid("max_age_ms", "is out of range"));
        }
        if self.grace_period_ms > self.max_age_ms {
            return Err(HolderError::invalid(
                "grace_period_ms",
                format!(
                    "({}) must not exceed max_age_ms ({})",
                    self.grace_period_ms, self.max_age_ms
                ),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(text: &str) -> HolderResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn load(path: impl AsRef<Path>) -> HolderResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| HolderError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}
