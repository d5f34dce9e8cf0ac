//! # Resource Registry
//!
//! One registry per scope. Keeps at most one live handle per calling thread
//! and sweeps on every `get`/`set`:
//!
//! 1. Bindings whose owner is gone, that are overused, or that have aged out
//!    leave the live map and join the pending-removal list.
//! 2. Pending handles whose last use is older than the grace period are
//!    released; the rest wait for a later sweep.
//!
//! The grace period covers callers that fetched a resource just before its
//! binding was retired and are still using it.
//!
//! All map mutation happens under one `parking_lot::Mutex`, so sweeps never
//! interleave with each other or with lookups.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::adapters::handle::{ResourceHandle, Tethered};
use crate::adapters::identity::ThreadIdentity;
use crate::adapters::reaper::ReclamationQueue;
use crate::domain::error::HolderResult;
use crate::domain::{
    Clock, EvictionLimits, EvictionPolicy, EvictionReason, HandleState, RegistryConfig,
    RegistrySnapshot, SystemClock,
};
use crate::traits::{Resource, ResourceFactory, Session};

struct Binding<R: Resource, S: Session> {
    owner: ThreadIdentity,
    handle: ResourceHandle<R, S>,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    created: u64,
    evicted: u64,
    released: u64,
}

struct RegistryState<R: Resource, S: Session> {
    bindings: HashMap<u64, Binding<R, S>>,
    pending: Vec<ResourceHandle<R, S>>,
    counters: Counters,
}

/// Thread-affine holder for one scope
pub struct ResourceRegistry<R: Resource, S: Session> {
    scope: Arc<str>,
    config: RegistryConfig,
    limits: EvictionLimits,
    clock: Arc<dyn Clock>,
    queue: ReclamationQueue,
    state: Mutex<RegistryState<R, S>>,
}

impl<R: Resource, S: Session> ResourceRegistry<R, S> {
    /// Registry on the wall clock, backed by the process-wide reaper
    ///
    /// # Errors
    ///
    /// `HolderError::InvalidConfig` if `config` fails validation.
    pub fn new(config: RegistryConfig) -> HolderResult<Self> {
        Self::with_parts(config, Arc::new(SystemClock), ReclamationQueue::default())
    }

    /// Registry with an explicit clock and reclamation queue
    pub fn with_parts(
        config: RegistryConfig,
        clock: Arc<dyn Clock>,
        queue: ReclamationQueue,
    ) -> HolderResult<Self> {
        config.validate()?;

        info!(
            "🏊 Resource registry '{}' initialized (max_age={}ms, max_uses={}, grace={}ms)",
            config.scope_name, config.max_age_ms, config.max_uses, config.grace_period_ms
        );

        Ok(Self {
            scope: Arc::from(config.scope_name.as_str()),
            limits: config.limits(),
            config,
            clock,
            queue,
            state: Mutex::new(RegistryState {
                bindings: HashMap::new(),
                pending: Vec::new(),
                counters: Counters::default(),
            }),
        })
    }

    /// [Query] Resource bound to `thread`, recording a use
    ///
    /// A miss is a normal outcome: build a fresh pair and call `set`.
    pub fn get(&self, thread: &ThreadIdentity) -> Option<Arc<Tethered<R>>> {
        let now = self.clock.now_ms();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        self.cleanup(state, now);

        let hit = state.bindings.get_mut(&thread.id()).map(|binding| {
            binding.handle.touch(now);
            binding.handle.resource()
        });

        if hit.is_some() {
            state.counters.hits += 1;
        } else {
            state.counters.misses += 1;
        }
        hit
    }

    /// [Command] Bind a fresh pair to `thread`
    ///
    /// A binding the thread already had is retired through the pending list,
    /// not closed on the spot.
    pub fn set(&self, resource: R, session: S, thread: &ThreadIdentity) -> Arc<Tethered<R>> {
        let now = self.clock.now_ms();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        self.cleanup(state, now);

        let mut handle =
            ResourceHandle::new(resource, session, self.scope.clone(), now, self.queue.clone());
        handle.mark(HandleState::Active);
        let handle_id = handle.id();
        let resource = handle.resource();

        let previous = state.bindings.insert(
            thread.id(),
            Binding {
                owner: thread.clone(),
                handle,
            },
        );
        if let Some(previous) = previous {
            self.retire(state, previous.handle, EvictionReason::Superseded);
        }
        state.counters.created += 1;

        debug!(
            "🆕 [{}] Bound handle #{} to {} (live={})",
            self.scope,
            handle_id,
            thread,
            state.bindings.len()
        );
        resource
    }

    /// [Command] Cached resource for `thread`, building one on a miss
    ///
    /// The factory runs outside the registry lock. Its errors are returned
    /// unchanged.
    pub fn get_or_create<F>(
        &self,
        thread: &ThreadIdentity,
        factory: &F,
    ) -> anyhow::Result<Arc<Tethered<R>>>
    where
        F: ResourceFactory<R, S> + ?Sized,
    {
        if let Some(resource) = self.get(thread) {
            return Ok(resource);
        }
        let (resource, session) = factory.create(thread)?;
        Ok(self.set(resource, session, thread))
    }

    /// `get` for the calling thread
    pub fn get_current(&self) -> Option<Arc<Tethered<R>>> {
        self.get(&ThreadIdentity::current())
    }

    /// `set` for the calling thread
    pub fn set_current(&self, resource: R, session: S) -> Arc<Tethered<R>> {
        self.set(resource, session, &ThreadIdentity::current())
    }

    /// [Command] Retire `thread`'s binding ahead of the next sweep
    ///
    /// Deregistration hook for thread or task exit. Returns whether a binding
    /// existed.
    pub fn unbind(&self, thread: &ThreadIdentity) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        match state.bindings.remove(&thread.id()) {
            Some(binding) => {
                self.retire(state, binding.handle, EvictionReason::Unbound);
                true
            }
            None => false,
        }
    }

    /// [Command] Release every handle, live and pending, and forget them
    pub fn close(&self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let live = state.bindings.drain().map(|(_, binding)| binding.handle);
        let pending = std::mem::take(&mut state.pending);

        let mut released = 0;
        for handle in live.chain(pending) {
            if handle.release() {
                released += 1;
            }
        }
        state.counters.released += released;

        info!("🛑 [{}] Registry closed: {} handles released", self.scope, released);
    }

    /// Whether `thread` currently has a live binding; no sweep, no use recorded
    pub fn contains(&self, thread: &ThreadIdentity) -> bool {
        self.state.lock().bindings.contains_key(&thread.id())
    }

    /// [Query] Current registry state
    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.lock();
        RegistrySnapshot {
            scope_name: self.scope.to_string(),
            live_bindings: state.bindings.len(),
            pending_removal: state.pending.len(),
            hits: state.counters.hits,
            misses: state.counters.misses,
            created: state.counters.created,
            evicted: state.counters.evicted,
            released: state.counters.released,
        }
    }

    pub fn scope_name(&self) -> &str {
        &self.scope
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Two-stage sweep; caller holds the lock
    fn cleanup(&self, state: &mut RegistryState<R, S>, now: i64) {
        let cutoffs = EvictionPolicy::cutoffs(now, &self.limits);

        let stale: Vec<(u64, EvictionReason)> = state
            .bindings
            .iter()
            .filter_map(|(id, binding)| {
                EvictionPolicy::should_evict(
                    binding.owner.is_alive(),
                    binding.handle.use_count(),
                    binding.handle.last_used_at(),
                    &self.limits,
                    &cutoffs,
                )
                .map(|reason| (*id, reason))
            })
            .collect();

        for (id, reason) in stale {
            if let Some(binding) = state.bindings.remove(&id) {
                self.retire(state, binding.handle, reason);
            }
        }

        if state.pending.is_empty() {
            return;
        }

        let candidates = std::mem::take(&mut state.pending);
        for handle in candidates {
            if handle.state().is_terminal() {
                continue;
            }
            if EvictionPolicy::may_close(handle.last_used_at(), &cutoffs) {
                if handle.release() {
                    state.counters.released += 1;
                }
                debug!(
                    "🗑️ [{}] Released handle #{} (live={}, pending={})",
                    self.scope,
                    handle.id(),
                    state.bindings.len(),
                    state.pending.len()
                );
            } else {
                state.pending.push(handle);
            }
        }
    }

    fn retire(
        &self,
        state: &mut RegistryState<R, S>,
        mut handle: ResourceHandle<R, S>,
        reason: EvictionReason,
    ) {
        debug!(
            "♻️ [{}] Retiring handle #{} ({}, uses={})",
            self.scope,
            handle.id(),
            reason,
            handle.use_count()
        );
        handle.mark(HandleState::Pending);
        state.pending.push(handle);
        state.counters.evicted += 1;
    }
}

impl<R: Resource, S: Session> Drop for ResourceRegistry<R, S> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let unreleased = state.bindings.len() + state.pending.len();
        if unreleased == 0 {
            return;
        }
        if self.queue.is_open() {
            debug!(
                "[{}] Registry dropped without close; {} handles go to the reaper once callers let go",
                self.scope, unreleased
            );
        } else {
            warn!(
                "⚠️ [{}] Registry dropped without close and no reaper is running; {} handles release inline",
                self.scope, unreleased
            );
        }
    }
}

impl<R: Resource, S: Session> std::fmt::Debug for ResourceRegistry<R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("scope", &self.scope)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
