//! Domain Model: Eviction Policy
//!
//! Pure decision rules for the two-stage sweep. Stage one decides whether a
//! binding leaves the live map; stage two decides whether a retired handle may
//! be closed. The adapters layer carries out the decisions.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Eviction Reason
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Why a binding was retired from the live map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvictionReason {
    /// The owning thread (or scoped identity) no longer exists
    OwnerGone,

    /// Used more than `max_uses` times
    Overused,

    /// Not used within `max_age`
    Expired,

    /// Replaced by a newer binding for the same identity
    Superseded,

    /// Explicitly unbound by its owner
    Unbound,
}

impl EvictionReason {
    pub fn name(self) -> &'static str {
        match self {
            Self::OwnerGone => "owner-gone",
            Self::Overused => "overused",
            Self::Expired => "expired",
            Self::Superseded => "superseded",
            Self::Unbound => "unbound",
        }
    }
}

impl std::fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Limits & Cutoffs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Numeric limits a sweep is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionLimits {
    pub max_age_ms: i64,
    pub max_uses: u64,
    pub grace_period_ms: i64,
}

/// Timestamps computed once at the start of a sweep
///
/// Anything last used strictly before `evict_before` is stale; anything last
/// used strictly before `close_before` is past its grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cutoffs {
    pub evict_before: i64,
    pub close_before: i64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Eviction Policy (Pure Strategy Functions)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Eviction decisions
///
/// ```
/// use tether_cache::domain::{EvictionLimits, EvictionPolicy, EvictionReason};
///
/// let limits = EvictionLimits { max_age_ms: 60_000, max_uses: 3, grace_period_ms: 30_000 };
/// let cutoffs = EvictionPolicy::cutoffs(100_000, &limits);
///
/// // Fourth use of a three-use binding retires it
/// assert_eq!(
///     EvictionPolicy::should_evict(true, 4, 99_000, &limits, &cutoffs),
///     Some(EvictionReason::Overused)
/// );
/// // Recently used: retired but not yet closable
/// assert!(!EvictionPolicy::may_close(99_000, &cutoffs));
/// ```
pub struct EvictionPolicy;

impl EvictionPolicy {
    /// Compute both sweep cutoffs for `now_ms`
    pub fn cutoffs(now_ms: i64, limits: &EvictionLimits) -> Cutoffs {
        Cutoffs {
            evict_before: now_ms.saturating_sub(limits.max_age_ms),
            close_before: now_ms.saturating_sub(limits.grace_period_ms),
        }
    }

    /// Decide whether a live binding leaves the map
    ///
    /// The three triggers are independent; the first that matches is reported.
    ///
    /// # Arguments
    ///
    /// * `owner_alive` - Whether the owning identity still exists
    /// * `use_count` - Uses recorded so far (construction counts as one)
    /// * `last_used_at` - Millisecond timestamp of the last use
    ///
    /// # Returns
    ///
    /// The reason to retire, or `None` to keep the binding
    pub fn should_evict(
        owner_alive: bool,
        use_count: u64,
        last_used_at: i64,
        limits: &EvictionLimits,
        cutoffs: &Cutoffs,
    ) -> Option<EvictionReason> {
        if !owner_alive {
            Some(EvictionReason::OwnerGone)
        } else if use_count > limits.max_uses {
            Some(EvictionReason::Overused)
        } else if last_used_at < cutoffs.evict_before {
            Some(EvictionReason::Expired)
        } else {
            None
        }
    }

    /// Decide whether a retired handle may be closed now
    ///
    /// A handle last used inside the grace window may still be in the hands of
    /// a caller that fetched it before it was retired.
    pub fn may_close(last_used_at: i64, cutoffs: &Cutoffs) -> bool {
        last_used_at < cutoffs.close_before
    }
}
