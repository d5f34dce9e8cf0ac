//! # Behavior Contracts
//!
//! What the registry needs from its collaborators: a resource that can be
//! closed, a session that can be logged out, and a factory that builds both
//! on a cache miss.

use crate::adapters::identity::ThreadIdentity;

/// Expensive, cacheable object bound to one thread at a time
///
/// `close` is called at most once, by whichever path releases the handle
/// first. Callers that fetched the resource before it was retired may still
/// hold an `Arc` to it afterwards.
pub trait Resource: Send + Sync + 'static {
    fn close(&self) -> anyhow::Result<()>;
}

/// Lifecycle handle released in lock-step with its resource
///
/// `logout` runs after the resource has been closed, at most once.
pub trait Session: Send + 'static {
    fn logout(&mut self) -> anyhow::Result<()>;
}

/// Builds a fresh (resource, session) pair on a cache miss
///
/// Failures belong to the caller; the registry neither catches nor retries
/// them.
pub trait ResourceFactory<R, S> {
    fn create(&self, thread: &ThreadIdentity) -> anyhow::Result<(R, S)>;
}

impl<R, S, F> ResourceFactory<R, S> for F
where
    F: Fn(&ThreadIdentity) -> anyhow::Result<(R, S)>,
{
    fn create(&self, thread: &ThreadIdentity) -> anyhow::Result<(R, S)> {
        self(thread)
    }
}
