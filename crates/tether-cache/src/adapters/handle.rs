//! # Resource Handle
//!
//! Owns exactly one (resource, session) pair and releases it at most once.
//! The release state lives in a shared core so that a registry sweep, an
//! explicit `close()` and the reaper can all reach the same handle; a
//! compare-and-swap on the closed flag decides which of them runs the body.
//!
//! Callers never see the handle itself. They get `Arc<Tethered<R>>` clones,
//! and the registry keeps one more. Only when the last of those goes away is
//! a pair that nobody released handed to the reaper.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::adapters::reaper::{ReclamationQueue, ReclamationToken, Reclaimable};
use crate::domain::HandleState;
use crate::traits::{Resource, Session};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared Core
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct HandleCore<R, S> {
    id: u64,
    scope: Arc<str>,
    closed: AtomicBool,
    parts: Mutex<Option<(Arc<R>, S)>>,
}

impl<R: Resource, S: Session> HandleCore<R, S> {
    /// Close the resource, then log out the session
    ///
    /// The flag is claimed before the body runs, so `is_closed` reads `true`
    /// while a release is in progress.
    fn release(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let Some((resource, mut session)) = self.parts.lock().take() else {
            return true;
        };

        debug!("[{}] Closing resource of handle #{}", self.scope, self.id);
        if let Err(e) = resource.close() {
            warn!("⚠️ [{}] Resource close failed for handle #{}: {:#}", self.scope, self.id, e);
        }

        debug!("[{}] Logging out session of handle #{}", self.scope, self.id);
        if let Err(e) = session.logout() {
            warn!("⚠️ [{}] Session logout failed for handle #{}: {:#}", self.scope, self.id, e);
        }
        true
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<R: Resource, S: Session> Reclaimable for HandleCore<R, S> {
    fn reclaim(&self) -> bool {
        self.release()
    }

    fn is_released(&self) -> bool {
        self.is_closed()
    }

    fn scope_name(&self) -> &str {
        &self.scope
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tethered Resource
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shared view of a bound resource
///
/// Derefs to `R`. When the last `Arc` clone is dropped and the pair was never
/// released, a token goes to the reaper; if the reaper is unavailable the
/// pair is released inline.
pub struct Tethered<R: Resource> {
    resource: Arc<R>,
    token: ReclamationToken,
    queue: ReclamationQueue,
}

impl<R: Resource> Tethered<R> {
    /// Whether the pair behind this resource has been released
    pub fn is_released(&self) -> bool {
        self.token.is_released()
    }
}

impl<R: Resource> Deref for Tethered<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.resource
    }
}

impl<R: Resource> Drop for Tethered<R> {
    fn drop(&mut self) {
        if self.token.is_released() {
            return;
        }

        if let Err(token) = self.queue.submit(self.token.clone()) {
            warn!(
                "⚠️ [{}] Reaper unavailable, releasing dropped resource inline",
                token.scope_name()
            );
            token.reclaim();
        }
    }
}

impl<R: Resource + std::fmt::Debug> std::fmt::Debug for Tethered<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tethered")
            .field("resource", &self.resource)
            .field("released", &self.is_released())
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resource Handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One bound (resource, session) pair plus its usage record
///
/// Dropping an unreleased handle only drops the registry's share of the
/// resource; see `Tethered`.
pub struct ResourceHandle<R: Resource, S: Session> {
    core: Arc<HandleCore<R, S>>,
    resource: Arc<Tethered<R>>,
    last_used_at: i64,
    use_count: u64,
    state: HandleState,
}

impl<R: Resource, S: Session> ResourceHandle<R, S> {
    /// Wrap a fresh pair; construction counts as the first use
    pub fn new(
        resource: R,
        session: S,
        scope: Arc<str>,
        now_ms: i64,
        queue: ReclamationQueue,
    ) -> Self {
        let resource = Arc::new(resource);
        let core = Arc::new(HandleCore {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::SeqCst),
            scope,
            closed: AtomicBool::new(false),
            parts: Mutex::new(Some((resource.clone(), session))),
        });
        let resource = Arc::new(Tethered {
            resource,
            token: ReclamationToken::new(core.clone()),
            queue,
        });

        Self {
            core,
            resource,
            last_used_at: now_ms,
            use_count: 1,
            state: HandleState::Created,
        }
    }

    /// Record a use at `now_ms`
    pub fn touch(&mut self, now_ms: i64) {
        self.last_used_at = now_ms;
        self.use_count += 1;
    }

    /// Release the pair if nobody has yet
    ///
    /// # Returns
    ///
    /// `true` if this call closed the resource and logged out the session
    pub fn release(&self) -> bool {
        self.core.release()
    }

    pub fn resource(&self) -> Arc<Tethered<R>> {
        self.resource.clone()
    }

    pub fn id(&self) -> u64 {
        self.core.id
    }

    pub fn scope_name(&self) -> &str {
        &self.core.scope
    }

    pub fn last_used_at(&self) -> i64 {
        self.last_used_at
    }

    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    pub fn state(&self) -> HandleState {
        if self.core.is_closed() {
            HandleState::Closed
        } else {
            self.state
        }
    }

    /// Record a registry-driven lifecycle move
    pub(crate) fn mark(&mut self, next: HandleState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal handle transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    /// Token referencing this handle's release state
    pub fn reclamation_token(&self) -> ReclamationToken {
        self.resource.token.clone()
    }
}

impl<R: Resource, S: Session> std::fmt::Debug for ResourceHandle<R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.core.id)
            .field("scope", &self.core.scope)
            .field("state", &self.state())
            .field("use_count", &self.use_count)
            .field("last_used_at", &self.last_used_at)
            .finish()
    }
}
