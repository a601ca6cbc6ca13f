//! Sticky Selection and Failover Tests
//!
//! Exercises the sticky outbound selector through the public API:
//! 1. Initial choice and refresh stability
//! 2. Failover on down-notifications
//! 3. Down-notification fan-out from the stats store

use std::sync::Arc;
use std::time::Duration;

use pathsel::metrics::PathStatsStore;
use pathsel::multipath::{watch_path_down, OutboundConfig, Selector, StickySelector};
use pathsel::path::{ForwardingPath, Path, PathMetadata};
use pathsel::transport::UdpPingerFactory;
use pathsel::{IsdAsn, PathInterface, SelectorState, UdpAddr};

// ============================================================================
// Helpers
// ============================================================================

fn ia(s: &str) -> IsdAsn {
    s.parse().unwrap()
}

/// Path 1-ff00:0:110 -> `transit` -> 1-ff00:0:112.
fn path(transit: &str, ifids: [u64; 4]) -> Arc<Path> {
    let src = ia("1-ff00:0:110");
    let mid = ia(transit);
    let dst = ia("1-ff00:0:112");
    Arc::new(Path::new(
        src,
        dst,
        vec![
            PathInterface::new(src, ifids[0]),
            PathInterface::new(mid, ifids[1]),
            PathInterface::new(mid, ifids[2]),
            PathInterface::new(dst, ifids[3]),
        ],
        ForwardingPath::new(vec![], "127.0.0.1:30041".parse().unwrap()),
        PathMetadata::new(1472),
    ))
}

fn abc() -> (Arc<Path>, Arc<Path>, Arc<Path>) {
    (
        path("1-ff00:0:111", [1, 2, 3, 4]),
        path("1-ff00:0:113", [5, 6, 7, 8]),
        path("1-ff00:0:114", [9, 10, 11, 12]),
    )
}

fn local() -> UdpAddr {
    "1-ff00:0:110,127.0.0.1:4000".parse().unwrap()
}

fn remote() -> UdpAddr {
    "1-ff00:0:112,127.0.0.1:5000".parse().unwrap()
}

fn current(selector: &dyn Selector) -> pathsel::path::PathFingerprint {
    selector.path().unwrap().fingerprint()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_failover_then_refresh() {
    let stats = PathStatsStore::shared();
    let selector = StickySelector::new(Arc::clone(&stats));
    let (a, b, c) = abc();

    selector.initialize(local(), remote(), vec![a.clone(), b.clone(), c.clone()]);
    assert_eq!(current(&selector), a.fingerprint());

    stats.notify_path_down(a.fingerprint(), a.first_hop().unwrap());
    selector.path_down(a.fingerprint(), a.first_hop().unwrap());
    assert_eq!(current(&selector), b.fingerprint());

    selector.refresh(vec![c.clone(), a.clone()]);
    assert_eq!(current(&selector), c.fingerprint());
}

#[test]
fn test_refresh_preserves_selection_in_any_order() {
    let (a, b, c) = abc();
    let selector = StickySelector::new(PathStatsStore::shared());
    selector.initialize(local(), remote(), vec![a.clone(), b.clone(), c.clone()]);
    selector.path_down(a.fingerprint(), a.first_hop().unwrap());
    let chosen = current(&selector);

    for order in [
        vec![a.clone(), b.clone(), c.clone()],
        vec![c.clone(), b.clone(), a.clone()],
        vec![b.clone(), c.clone()],
    ] {
        selector.refresh(order);
        assert_eq!(current(&selector), chosen);
    }
}

#[test]
fn test_unrelated_notifications_are_ignored() {
    let (a, b, c) = abc();
    let selector = StickySelector::new(PathStatsStore::shared());
    selector.initialize(local(), remote(), vec![a.clone(), b.clone()]);

    // Neither the fingerprint nor the interface belongs to the current path.
    selector.path_down(c.fingerprint(), PathInterface::new(ia("2-ff00:0:1"), 77));
    selector.path_down(b.fingerprint(), b.interfaces()[2]);
    assert_eq!(current(&selector), a.fingerprint());
}

#[test]
fn test_shared_interface_triggers_failover() {
    let stats = PathStatsStore::shared();
    let a = path("1-ff00:0:111", [1, 2, 3, 4]);
    let sibling = path("1-ff00:0:111", [5, 2, 3, 6]);
    let c = path("1-ff00:0:114", [9, 10, 11, 12]);
    let selector = StickySelector::new(Arc::clone(&stats));
    selector.initialize(local(), remote(), vec![a.clone(), sibling.clone(), c.clone()]);

    // The reported interface is on both a and sibling, so c is the only way out.
    let broken = a.interfaces()[1];
    stats.notify_path_down(sibling.fingerprint(), broken);
    selector.path_down(sibling.fingerprint(), broken);
    assert_eq!(current(&selector), c.fingerprint());
}

#[test]
fn test_all_down_keeps_cycling() {
    let stats = PathStatsStore::shared();
    let selector = StickySelector::new(Arc::clone(&stats));
    let (a, b, c) = abc();
    selector.initialize(local(), remote(), vec![a.clone(), b.clone(), c.clone()]);

    stats.notify_path_down(b.fingerprint(), b.first_hop().unwrap());
    stats.notify_path_down(c.fingerprint(), c.first_hop().unwrap());

    let mut visited = Vec::new();
    for _ in 0..4 {
        let current = selector.path().unwrap();
        let hop = current.first_hop().unwrap();
        stats.notify_path_down(current.fingerprint(), hop);
        selector.path_down(current.fingerprint(), hop);
        visited.push(selector.current_index());
    }
    assert_eq!(visited, vec![1, 2, 0, 1]);
}

#[test]
fn test_lifecycle() {
    let (a, _, _) = abc();
    let selector = StickySelector::new(PathStatsStore::shared());
    assert_eq!(selector.state(), SelectorState::Uninitialized);

    selector.refresh(vec![a.clone()]);
    assert!(selector.path().is_none());

    selector.initialize(local(), remote(), vec![a]);
    assert_eq!(selector.state(), SelectorState::Active);

    selector.close().unwrap();
    assert_eq!(selector.state(), SelectorState::Closed);
    assert!(selector.path().is_none());
}

// ============================================================================
// Fan-out
// ============================================================================

#[tokio::test]
async fn test_store_notifications_reach_selector() {
    let stats = PathStatsStore::shared();
    let (a, b, c) = abc();
    let selector: Arc<dyn Selector> = Arc::new(StickySelector::new(Arc::clone(&stats)));
    selector.initialize(local(), remote(), vec![a.clone(), b.clone(), c]);

    let watcher = watch_path_down(Arc::clone(&selector), stats.subscribe());
    stats.notify_path_down(a.fingerprint(), a.first_hop().unwrap());

    tokio::time::timeout(Duration::from_secs(1), async {
        while selector.path().unwrap().fingerprint() != b.fingerprint() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    selector.close().unwrap();
    stats.notify_path_down(b.fingerprint(), b.first_hop().unwrap());
    tokio::time::timeout(Duration::from_secs(1), watcher)
        .await
        .unwrap()
        .unwrap();
}

#[test]
fn test_build_from_config() {
    let selector = OutboundConfig::default()
        .build(PathStatsStore::shared(), Arc::new(UdpPingerFactory::default()))
        .unwrap();
    let (a, b, _) = abc();
    selector.initialize(local(), remote(), vec![a.clone(), b]);
    assert_eq!(selector.path().unwrap().fingerprint(), a.fingerprint());
}
