//! Functional core: pure rules and data, no threads and no I/O.
//!
//! - **Policy**: `EvictionPolicy` - when a binding leaves the live map, when a
//!   retired handle may be closed
//! - **State**: `HandleState`, `RegistrySnapshot` - lifecycle and observability
//! - **Config**: `RegistryConfig` - per-scope limits
//! - **Clock**: `Clock` - time source used by every timestamp comparison

pub mod clock;
pub mod config;
pub mod error;
pub mod policy;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RegistryConfig;
pub use error::HolderError;
pub use policy::{Cutoffs, EvictionLimits, EvictionPolicy, EvictionReason};
pub use state::{HandleState, RegistrySnapshot};

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
