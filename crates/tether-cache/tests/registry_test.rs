mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{manual_registry, pair, wait_for, Ledger, MockRegistry};
use tether_cache::{Reaper, ReclamationQueue, RegistryConfig, ThreadIdentity};

fn config(scope: &str) -> RegistryConfig {
    RegistryConfig::for_scope(scope)
        .with_max_age(Duration::from_secs(60))
        .with_max_uses(100)
        .with_grace_period(Duration::from_secs(30))
}

#[test]
fn test_set_then_get_returns_same_resource() {
    let (registry, _clock) = manual_registry(config("ws"), ReclamationQueue::default());
    let ledger = Ledger::new();
    let me = ThreadIdentity::current();

    let (provider, session) = pair("r1", &ledger);
    let bound = registry.set(provider, session, &me);
    let fetched = registry.get(&me).expect("fresh binding must hit");

    assert!(Arc::ptr_eq(&bound, &fetched));
    assert_eq!(fetched.name, "r1");
    assert_eq!(ledger.closed(), 0);

    registry.close();
}

#[test]
fn test_threads_never_see_each_others_resource() {
    let (registry, _clock) = manual_registry(config("ws"), ReclamationQueue::default());
    let ledger = Ledger::new();
    let a = ThreadIdentity::scoped();
    let b = ThreadIdentity::scoped();

    let (provider, session) = pair("for-a", &ledger);
    registry.set(provider, session, &a.identity());

    assert!(registry.get(&b.identity()).is_none());
    assert_eq!(registry.get(&a.identity()).unwrap().name, "for-a");

    registry.close();
}

#[test]
fn test_use_count_eviction_after_max_uses() {
    let (registry, _clock) =
        manual_registry(config("ws").with_max_uses(3), ReclamationQueue::default());
    let ledger = Ledger::new();
    let a = ThreadIdentity::scoped();

    let (provider, session) = pair("r1", &ledger);
    registry.set(provider, session, &a.identity());

    for _ in 0..3 {
        assert_eq!(registry.get(&a.identity()).expect("within max_uses").name, "r1");
    }

    // The previous get pushed the count past 3; this sweep retires it
    assert!(registry.get(&a.identity()).is_none());

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.live_bindings, 0);
    assert_eq!(snapshot.pending_removal, 1);
    assert_eq!(snapshot.evicted, 1);

    // Retired but still inside the grace period
    assert_eq!(ledger.closed(), 0);

    registry.close();
    assert_eq!(ledger.closed(), 1);
}

#[test]
fn test_overused_binding_is_evicted_by_another_thread() {
    let (registry, _clock) =
        manual_registry(config("ws").with_max_uses(1), ReclamationQueue::default());
    let ledger = Ledger::new();
    let a = ThreadIdentity::scoped();
    let b = ThreadIdentity::scoped();

    let (provider, session) = pair("r1", &ledger);
    registry.set(provider, session, &a.identity());
    assert!(registry.get(&a.identity()).is_some());
    assert!(registry.contains(&a.identity()));

    assert!(registry.get(&b.identity()).is_none());
    assert!(!registry.contains(&a.identity()));

    registry.close();
}

#[test]
fn test_age_eviction_ignores_use_count() {
    let (registry, clock) = manual_registry(config("ws"), ReclamationQueue::default());
    let ledger = Ledger::new();
    let a = ThreadIdentity::scoped();
    let b = ThreadIdentity::scoped();

    let (provider, session) = pair("r1", &ledger);
    registry.set(provider, session, &a.identity());

    clock.set(60_001);
    assert!(registry.get(&b.identity()).is_none());
    assert!(!registry.contains(&a.identity()));

    // Idle longer than the grace period too, so closed in the same sweep
    assert_eq!(ledger.closed(), 1);
    assert_eq!(ledger.logged_out(), 1);
    assert_eq!(registry.snapshot().released, 1);
}

#[test]
fn test_binding_used_within_max_age_survives() {
    let (registry, clock) = manual_registry(config("ws"), ReclamationQueue::default());
    let ledger = Ledger::new();
    let a = ThreadIdentity::scoped();

    let (provider, session) = pair("r1", &ledger);
    registry.set(provider, session, &a.identity());

    for step in 1..=5 {
        clock.set(step * 50_000);
        assert!(registry.get(&a.identity()).is_some(), "step {}", step);
    }
    assert_eq!(ledger.closed(), 0);

    registry.close();
}

#[test]
fn test_grace_period_defers_close() {
    let (registry, clock) =
        manual_registry(config("ws").with_max_uses(1), ReclamationQueue::default());
    let ledger = Ledger::new();
    let a = ThreadIdentity::scoped();
    let b = ThreadIdentity::scoped();

    // Bound and used at t=0, retired by the next sweep at t=0
    let (provider, session) = pair("r1", &ledger);
    registry.set(provider, session, &a.identity());
    let in_flight = registry.get(&a.identity()).unwrap();
    assert!(registry.get(&b.identity()).is_none());
    assert_eq!(registry.snapshot().pending_removal, 1);

    clock.set(20_000);
    assert!(registry.get(&b.identity()).is_none());
    assert_eq!(registry.snapshot().pending_removal, 1);
    assert_eq!(ledger.closed(), 0);
    assert_eq!(in_flight.name, "r1");

    clock.set(31_000);
    assert!(registry.get(&b.identity()).is_none());
    assert_eq!(registry.snapshot().pending_removal, 0);
    assert_eq!(ledger.closed(), 1);
    assert_eq!(ledger.logged_out(), 1);
}

#[test]
fn test_set_supersedes_through_pending_list() {
    let (registry, clock) = manual_registry(config("ws"), ReclamationQueue::default());
    let first = Ledger::new();
    let second = Ledger::new();
    let a = ThreadIdentity::scoped();

    let (provider, session) = pair("r1", &first);
    registry.set(provider, session, &a.identity());
    let (provider, session) = pair("r2", &second);
    registry.set(provider, session, &a.identity());

    assert_eq!(registry.get(&a.identity()).unwrap().name, "r2");
    let snapshot = registry.snapshot();
    assert_eq!(snapshot.live_bindings, 1);
    assert_eq!(snapshot.pending_removal, 1);
    assert_eq!(first.closed(), 0);

    clock.set(30_001);
    assert_eq!(registry.get(&a.identity()).unwrap().name, "r2");
    assert_eq!(first.closed(), 1);
    assert_eq!(second.closed(), 0);

    registry.close();
    assert_eq!(second.closed(), 1);
}

#[test]
fn test_exited_thread_binding_is_swept() {
    let clock_registry = manual_registry(config("ws"), ReclamationQueue::default());
    let registry = Arc::new(clock_registry.0);
    let clock = clock_registry.1;
    let ledger = Ledger::new();

    let worker = {
        let registry = registry.clone();
        let ledger = ledger.clone();
        thread::spawn(move || {
            let (provider, session) = pair("worker", &ledger);
            registry.set_current(provider, session);
            assert!(registry.get_current().is_some());
            ThreadIdentity::current()
        })
    };
    let worker_id = worker.join().unwrap();
    assert!(!worker_id.is_alive());

    // Still in the map until a sweep notices
    assert!(registry.contains(&worker_id));
    assert!(registry.get_current().is_none());
    assert!(!registry.contains(&worker_id));
    assert_eq!(registry.snapshot().pending_removal, 1);

    clock.set(30_001);
    let _ = registry.get_current();
    assert_eq!(ledger.closed(), 1);
}

#[test]
fn test_scoped_identity_guard_drop_releases_binding() {
    let (registry, clock) = manual_registry(config("ws"), ReclamationQueue::default());
    let ledger = Ledger::new();
    let task = ThreadIdentity::scoped();
    let id = task.identity();

    let (provider, session) = pair("task", &ledger);
    registry.set(provider, session, &id);
    drop(task);

    clock.set(30_001);
    assert!(registry.get(&ThreadIdentity::current()).is_none());
    assert!(!registry.contains(&id));
    assert_eq!(ledger.closed(), 1);
}

#[test]
fn test_close_releases_live_and_pending_exactly_once() {
    let reaper = Reaper::start("registry-close-test").unwrap();
    let (registry, _clock) = manual_registry(config("ws"), reaper.queue());
    let ledger = Ledger::new();
    let a = ThreadIdentity::scoped();
    let b = ThreadIdentity::scoped();

    let (provider, session) = pair("a1", &ledger);
    registry.set(provider, session, &a.identity());
    let (provider, session) = pair("a2", &ledger);
    registry.set(provider, session, &a.identity());
    let (provider, session) = pair("b1", &ledger);
    registry.set(provider, session, &b.identity());

    let before = registry.snapshot();
    assert_eq!(before.live_bindings, 2);
    assert_eq!(before.pending_removal, 1);

    registry.close();
    assert_eq!(ledger.closed(), 3);
    assert_eq!(ledger.logged_out(), 3);

    let after = registry.snapshot();
    assert_eq!(after.tracked(), 0);
    assert_eq!(after.released, 3);

    registry.close();
    drop(registry);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(ledger.closed(), 3);
    assert_eq!(reaper.drained(), 0);
}

#[test]
fn test_scopes_do_not_interfere() {
    let (registry_a, clock_a) = manual_registry(config("ws-a"), ReclamationQueue::default());
    let (registry_b, _clock_b) = manual_registry(config("ws-b"), ReclamationQueue::default());
    let ledger_a = Ledger::new();
    let ledger_b = Ledger::new();
    let me = ThreadIdentity::current();

    let (provider, session) = pair("a", &ledger_a);
    registry_a.set(provider, session, &me);
    let (provider, session) = pair("b", &ledger_b);
    registry_b.set(provider, session, &me);

    clock_a.set(120_000);
    assert!(registry_a.get(&me).is_none());
    assert_eq!(ledger_a.closed(), 1);

    assert_eq!(registry_b.get(&me).unwrap().name, "b");
    assert_eq!(ledger_b.closed(), 0);

    registry_a.close();
    assert_eq!(registry_b.get(&me).unwrap().name, "b");
    assert_eq!(registry_b.scope_name(), "ws-b");

    registry_b.close();
    assert_eq!(ledger_b.closed(), 1);
}

#[test]
fn test_concurrent_threads_keep_their_own_binding() {
    let registry: MockRegistry = MockRegistry::new(
        RegistryConfig::for_scope("concurrent")
            .with_max_uses(50)
            .with_max_age(Duration::from_secs(600)),
    )
    .unwrap();
    let ledger = Ledger::new();

    thread::scope(|s| {
        for worker in 0..8 {
            let registry = &registry;
            let ledger = &ledger;
            s.spawn(move || {
                let name = format!("worker-{}", worker);
                let factory =
                    |_: &ThreadIdentity| -> anyhow::Result<_> { Ok(pair(&name, ledger)) };
                let mut seen = HashSet::new();

                for _ in 0..200 {
                    let resource = registry
                        .get_or_create(&ThreadIdentity::current(), &factory)
                        .unwrap();
                    assert_eq!(resource.name, name);
                    seen.insert(Arc::as_ptr(&resource) as usize);
                }

                // 200 uses at 50 per binding needs several providers
                assert!(seen.len() >= 4);
            });
        }
    });

    let created = registry.snapshot().created as usize;
    registry.close();
    assert!(wait_for(|| ledger.closed() == created));
    assert_eq!(ledger.logged_out(), created);
}
