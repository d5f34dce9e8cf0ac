#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tether_cache::{
    ManualClock, ReclamationQueue, RegistryConfig, Resource, ResourceRegistry, Session,
};

/// Close/logout counters shared by a provider and its session
#[derive(Debug, Default)]
pub struct Ledger {
    pub closed: AtomicUsize,
    pub logged_out: AtomicUsize,
}

impl Ledger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn logged_out(&self) -> usize {
        self.logged_out.load(Ordering::SeqCst)
    }
}

/// Stand-in for a policy evaluator
#[derive(Debug)]
pub struct MockProvider {
    pub name: String,
    pub ledger: Arc<Ledger>,
}

impl Resource for MockProvider {
    fn close(&self) -> anyhow::Result<()> {
        self.ledger.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockSession {
    pub ledger: Arc<Ledger>,
}

impl Session for MockSession {
    fn logout(&mut self) -> anyhow::Result<()> {
        self.ledger.logged_out.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub type MockRegistry = ResourceRegistry<MockProvider, MockSession>;

/// Provider/session pair sharing `ledger`
pub fn pair(name: &str, ledger: &Arc<Ledger>) -> (MockProvider, MockSession) {
    (
        MockProvider {
            name: name.to_string(),
            ledger: ledger.clone(),
        },
        MockSession {
            ledger: ledger.clone(),
        },
    )
}

/// Registry on a manual clock starting at t=0
pub fn manual_registry(
    config: RegistryConfig,
    queue: ReclamationQueue,
) -> (MockRegistry, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(0));
    let registry = ResourceRegistry::with_parts(config, clock.clone(), queue)
        .expect("valid test config");
    (registry, clock)
}

/// Poll `cond` for up to five seconds
pub fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}
