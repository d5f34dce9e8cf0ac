//! # Thread Identity
//!
//! Stable map keys for calling threads. Each thread owns a liveness marker in
//! a thread-local; the registry only keeps a `Weak` to it, so a binding whose
//! thread has exited is recognisable on the next sweep. Tasks that are not
//! one-to-one with threads use a scoped identity whose guard plays the same
//! role: dropping the guard is the deregistration hook.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

// ============================================================================
// ID ALLOCATION
// ============================================================================

/// Process-wide identity counter, starting at 1; ids are never reused
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn allocate_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::SeqCst)
}

/// Liveness marker; identities are alive while this is strongly held
#[derive(Debug)]
struct Marker {
    id: u64,
}

impl Marker {
    fn allocate() -> Arc<Self> {
        Arc::new(Self { id: allocate_id() })
    }
}

thread_local! {
    static CURRENT: Arc<Marker> = Marker::allocate();
}

// ============================================================================
// THREAD IDENTITY
// ============================================================================

/// Identity of a calling thread or scoped task
///
/// Equality and hashing use the numeric id only.
#[derive(Clone)]
pub struct ThreadIdentity {
    id: u64,
    marker: Weak<Marker>,
}

impl ThreadIdentity {
    /// Identity of the calling thread
    ///
    /// Called while the thread's locals are being torn down, this returns an
    /// identity that is already dead, so anything bound to it is swept.
    pub fn current() -> Self {
        CURRENT
            .try_with(|marker| Self::from_marker(marker))
            .unwrap_or_else(|_| Self::detached())
    }

    /// New identity owned by the returned guard
    pub fn scoped() -> IdentityGuard {
        IdentityGuard {
            marker: Marker::allocate(),
        }
    }

    /// Identity with no owner; it is dead from the start
    pub fn detached() -> Self {
        Self {
            id: allocate_id(),
            marker: Weak::new(),
        }
    }

    fn from_marker(marker: &Arc<Marker>) -> Self {
        Self {
            id: marker.id,
            marker: Arc::downgrade(marker),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the owning thread or guard still exists
    pub fn is_alive(&self) -> bool {
        self.marker.strong_count() > 0
    }
}

impl PartialEq for ThreadIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ThreadIdentity {}

impl Hash for ThreadIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ThreadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadIdentity")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl fmt::Display for ThreadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.id)
    }
}

// ============================================================================
// SCOPED GUARD
// ============================================================================

/// Owner of a scoped identity
///
/// Drop it at task exit; bindings for the identity are then swept like those
/// of an exited thread.
#[derive(Debug)]
pub struct IdentityGuard {
    marker: Arc<Marker>,
}

impl IdentityGuard {
    pub fn identity(&self) -> ThreadIdentity {
        ThreadIdentity::from_marker(&self.marker)
    }
}
