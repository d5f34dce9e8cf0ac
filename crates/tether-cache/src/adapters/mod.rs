//! Adapters: threads, locks and queues that carry out the domain decisions.

pub mod directory;
pub mod handle;
pub mod identity;
pub mod reaper;
pub mod registry;

pub use directory::ScopeDirectory;
pub use handle::{ResourceHandle, Tethered};
pub use identity::{IdentityGuard, ThreadIdentity};
pub use reaper::{Reaper, ReclamationQueue, ReclamationToken, GLOBAL_REAPER_NAME, REAPER_NICE};
pub use registry::ResourceRegistry;
