//! # tether-cache
//!
//! Thread-affine holder for expensive, stateful providers. Each calling
//! thread gets at most one bound (resource, session) pair per scope. Bindings
//! are retired when their thread exits, when they are used too often, or when
//! they sit idle too long; retired pairs are closed after a grace period, and
//! pairs dropped without release are closed by a background reaper once no
//! caller holds them any more.
//!
//! ```
//! use std::sync::Arc;
//! use tether_cache::{RegistryConfig, Resource, ResourceRegistry, Session, ThreadIdentity};
//!
//! struct Evaluator;
//! impl Resource for Evaluator {
//!     fn close(&self) -> anyhow::Result<()> { Ok(()) }
//! }
//!
//! struct Login;
//! impl Session for Login {
//!     fn logout(&mut self) -> anyhow::Result<()> { Ok(()) }
//! }
//!
//! let registry = ResourceRegistry::new(RegistryConfig::for_scope("default")).unwrap();
//! let me = ThreadIdentity::current();
//!
//! assert!(registry.get(&me).is_none());
//! let bound = registry.set(Evaluator, Login, &me);
//! assert!(Arc::ptr_eq(&bound, &registry.get(&me).unwrap()));
//!
//! registry.close();
//! ```

pub mod adapters;
pub mod domain;
pub mod traits;

pub use adapters::{
    IdentityGuard, Reaper, ReclamationQueue, ReclamationToken, ResourceHandle, ResourceRegistry,
    ScopeDirectory, Tethered, ThreadIdentity,
};
pub use domain::{
    Clock, EvictionPolicy, EvictionReason, HandleState, HolderError, ManualClock, RegistryConfig,
    RegistrySnapshot, SystemClock,
};
pub use traits::{Resource, ResourceFactory, Session};
