//! # Reaper
//!
//! Background drain for handles that were dropped without being released,
//! typically because their registry was dropped without `close()`. Each such
//! handle pushes a token onto a `ReclamationQueue`; a dedicated thread blocks
//! on the queue and releases whatever the tokens point at. Release is
//! idempotent, so a token racing a registry sweep is harmless.
//!
//! One process-wide reaper is started lazily by `Reaper::global()` and is never
//! stopped. Independent reapers can be started with `Reaper::start`; their
//! thread exits once every queue sender is gone.
//!
//! Reaper threads ask the OS for a raised scheduling priority when they
//! start. Unprivileged processes are usually refused; the reaper then logs a
//! warning and runs at normal priority.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::{io, thread};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Thread name of the process-wide reaper
pub const GLOBAL_REAPER_NAME: &str = "thread-bound-holder-cleaner";

/// Nice value requested by reaper threads (lower runs sooner)
pub const REAPER_NICE: i32 = -10;

static GLOBAL_REAPER: LazyLock<Reaper> = LazyLock::new(|| {
    Reaper::start(GLOBAL_REAPER_NAME).unwrap_or_else(|e| {
        error!("❌ Failed to start reaper thread: {}; releases will run inline", e);
        Reaper::inert(GLOBAL_REAPER_NAME)
    })
});

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tokens & Queue
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Something the reaper can release
pub(crate) trait Reclaimable: Send + Sync {
    /// Release if not yet released; `true` if this call did the work
    fn reclaim(&self) -> bool;

    fn is_released(&self) -> bool;

    fn scope_name(&self) -> &str;
}

/// Queue entry pointing at an unreleased handle
#[derive(Clone)]
pub struct ReclamationToken {
    target: Arc<dyn Reclaimable>,
}

impl ReclamationToken {
    pub(crate) fn new(target: Arc<dyn Reclaimable>) -> Self {
        Self { target }
    }

    pub fn scope_name(&self) -> &str {
        self.target.scope_name()
    }

    /// Release the target on the current thread
    pub fn reclaim(&self) -> bool {
        self.target.reclaim()
    }

    pub fn is_released(&self) -> bool {
        self.target.is_released()
    }
}

impl std::fmt::Debug for ReclamationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReclamationToken")
            .field("scope", &self.scope_name())
            .finish()
    }
}

/// Sending side of a reaper's queue
///
/// Cheap to clone; every registry holds one.
#[derive(Debug, Clone)]
pub struct ReclamationQueue {
    tx: mpsc::UnboundedSender<ReclamationToken>,
    depth: Arc<AtomicUsize>,
}

impl ReclamationQueue {
    /// Hand a token to the reaper
    ///
    /// # Errors
    ///
    /// Gives the token back if the reaper thread is gone.
    pub fn submit(&self, token: ReclamationToken) -> Result<(), ReclamationToken> {
        self.depth.fetch_add(1, Ordering::AcqRel);
        self.tx.send(token).map_err(|e| {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            e.0
        })
    }

    /// Tokens submitted but not yet drained
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a reaper is still draining this queue
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl Default for ReclamationQueue {
    /// The process-wide reaper's queue
    fn default() -> Self {
        Reaper::global().queue()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reaper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default)]
struct ReaperStats {
    drained: AtomicU64,
    reclaimed: AtomicU64,
    failures: AtomicU64,
    priority_raised: AtomicBool,
}

/// Handle to a reaper thread
#[derive(Debug)]
pub struct Reaper {
    name: String,
    queue: ReclamationQueue,
    stats: Arc<ReaperStats>,
}

impl Reaper {
    /// The process-wide reaper, started on first use
    pub fn global() -> &'static Reaper {
        &GLOBAL_REAPER
    }

    /// Start an independent reaper thread called `name`
    ///
    /// # Errors
    ///
    /// The OS refused to spawn the thread. A refused priority change is not
    /// an error.
    pub fn start(name: impl Into<String>) -> io::Result<Self> {
        Self::spawn(name.into(), raise_priority)
    }

    fn spawn(name: String, elevate: fn() -> io::Result<()>) -> io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        let stats = Arc::new(ReaperStats::default());

        thread::Builder::new().name(name.clone()).spawn({
            let name = name.clone();
            let depth = depth.clone();
            let stats = stats.clone();
            move || {
                match elevate() {
                    Ok(()) => {
                        stats.priority_raised.store(true, Ordering::Release);
                        debug!("🧹 Reaper '{}' running at nice {}", name, REAPER_NICE);
                    }
                    Err(e) => {
                        warn!(
                            "⚠️ Reaper '{}' could not raise its priority: {}; running at normal priority",
                            name, e
                        );
                    }
                }
                drain(name, rx, depth, stats)
            }
        })?;

        info!("🧹 Reaper '{}' started", name);
        Ok(Self {
            name,
            queue: ReclamationQueue { tx, depth },
            stats,
        })
    }

    /// Reaper with no thread; submitting to its queue always fails
    fn inert(name: &str) -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self {
            name: name.to_string(),
            queue: ReclamationQueue {
                tx,
                depth: Arc::new(AtomicUsize::new(0)),
            },
            stats: Arc::new(ReaperStats::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A sender for this reaper's queue
    pub fn queue(&self) -> ReclamationQueue {
        self.queue.clone()
    }

    /// Tokens processed so far
    pub fn drained(&self) -> u64 {
        self.stats.drained.load(Ordering::Acquire)
    }

    /// Tokens whose release was performed by this reaper
    pub fn reclaimed(&self) -> u64 {
        self.stats.reclaimed.load(Ordering::Acquire)
    }

    /// Tokens whose release panicked
    pub fn failures(&self) -> u64 {
        self.stats.failures.load(Ordering::Acquire)
    }

    /// Whether the OS granted the raised priority
    ///
    /// Set before the first token is drained.
    pub fn priority_raised(&self) -> bool {
        self.stats.priority_raised.load(Ordering::Acquire)
    }
}

/// Lower the calling thread's nice value to `REAPER_NICE`
///
/// Linux keeps a nice value per thread, so targeting the caller's tid leaves
/// the rest of the process alone.
#[cfg(target_os = "linux")]
fn raise_priority() -> io::Result<()> {
    // SAFETY: gettid takes no arguments and cannot fail
    let tid = unsafe { libc::syscall(libc::SYS_gettid) } as libc::id_t;
    // SAFETY: plain syscall on our own tid; failure is reported through errno
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, tid, REAPER_NICE) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(target_os = "linux"))]
fn raise_priority() -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "per-thread priority is only adjusted on Linux",
    ))
}

fn drain(
    name: String,
    mut rx: mpsc::UnboundedReceiver<ReclamationToken>,
    depth: Arc<AtomicUsize>,
    stats: Arc<ReaperStats>,
) {
    while let Some(token) = rx.blocking_recv() {
        depth.fetch_sub(1, Ordering::AcqRel);

        match panic::catch_unwind(AssertUnwindSafe(|| token.reclaim())) {
            Ok(true) => {
                stats.reclaimed.fetch_add(1, Ordering::AcqRel);
                debug!("🧹 [{}] Reclaimed dropped handle", token.scope_name());
            }
            Ok(false) => {
                debug!("[{}] Handle already released", token.scope_name());
            }
            Err(_) => {
                stats.failures.fetch_add(1, Ordering::AcqRel);
                error!("❌ [{}] Release panicked in reaper '{}'", token.scope_name(), name);
            }
        }
        stats.drained.fetch_add(1, Ordering::AcqRel);
    }

    warn!("Reaper '{}' queue closed; no more tokens can arrive", name);
}
