//! Domain Model: Handle Lifecycle & Registry State
//!
//! Lifecycle states of a handle and the observability snapshot of a registry.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handle State
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where a handle is in its lifecycle
///
/// `Created → Active → Pending → Closed`. Any non-terminal state may also go
/// straight to `Closed` when the reaper reclaims a dropped handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleState {
    /// Built, not yet stored in a registry
    Created,
    /// Live binding for a thread
    Active,
    /// Retired from the live map, waiting out the grace period
    Pending,
    /// Resource closed and session logged out
    Closed,
}

impl HandleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Check whether the lifecycle allows moving to `next`
    pub fn can_transition_to(self, next: HandleState) -> bool {
        use HandleState::*;
        match (self, next) {
            (Created, Active) | (Active, Pending) => true,
            (Created | Active | Pending, Closed) => true,
            _ => false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry Snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Point-in-time view of one registry
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Scope the registry serves
    pub scope_name: String,

    /// Bindings currently in the live map
    pub live_bindings: usize,

    /// Retired handles waiting out the grace period
    pub pending_removal: usize,

    /// Cache hits served by `get`
    pub hits: u64,

    /// `get` calls that found no binding
    pub misses: u64,

    /// Handles created by `set`
    pub created: u64,

    /// Bindings retired from the live map, all reasons
    pub evicted: u64,

    /// Handles released by this registry (sweep or `close`)
    pub released: u64,
}

impl RegistrySnapshot {
    /// Handles the registry still owns
    pub fn tracked(&self) -> usize {
        self.live_bindings + self.pending_removal
    }

    /// Hit rate in percent (0.0-100.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        (self.hits as f64 / total as f64) * 100.0
    }
}
