//! Active Probing Tests
//!
//! Drives the probed selector with a scripted pinger on a paused clock:
//! 1. Silent paths are charged the timeout and lose the selection
//! 2. Fault replies mark paths down
//! 3. Probing is skipped within one routing domain and stops on close

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use pathsel::metrics::PathStatsStore;
use pathsel::multipath::{ProbeConfig, ProbedSelector, Selector};
use pathsel::path::{ForwardingPath, Path, PathFingerprint, PathMetadata};
use pathsel::transport::{Pinger, PingerFactory, ProbeError, ProbeReply, ProbeSource};
use pathsel::{IfId, IsdAsn, PathInterface, Result, ScionAddr, UdpAddr};

// ============================================================================
// Scripted pinger
// ============================================================================

/// Answers probes after a fixed delay, except on silent paths.
struct ScriptedPinger {
    replies: mpsc::Sender<ProbeReply>,
    rtt: HashMap<PathFingerprint, Duration>,
    faults: Mutex<HashMap<PathFingerprint, ProbeError>>,
    sent: AtomicU64,
}

#[async_trait]
impl Pinger for ScriptedPinger {
    async fn send(&self, remote: ScionAddr, path: &Path, sequence: u16, _size: usize) -> Result<()> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        let fingerprint = path.fingerprint();
        let error = self.faults.lock().get(&fingerprint).copied();
        let Some(&rtt) = self.rtt.get(&fingerprint) else {
            return Ok(());
        };

        let reply = ProbeReply {
            source: ProbeSource::Ip(remote),
            sequence,
            fingerprint: Some(fingerprint),
            rtt,
            error,
        };
        let tx = self.replies.clone();
        tokio::spawn(async move {
            tokio::time::sleep(rtt).await;
            let _ = tx.send(reply).await;
        });
        Ok(())
    }
}

#[derive(Default)]
struct ScriptedFactory {
    rtt: HashMap<PathFingerprint, Duration>,
    created: Mutex<Vec<Arc<ScriptedPinger>>>,
}

impl ScriptedFactory {
    fn answering(paths: &[(&Arc<Path>, u64)]) -> Arc<Self> {
        Arc::new(Self {
            rtt: paths
                .iter()
                .map(|(p, ms)| (p.fingerprint(), Duration::from_millis(*ms)))
                .collect(),
            created: Mutex::new(Vec::new()),
        })
    }

    fn pinger(&self) -> Arc<ScriptedPinger> {
        Arc::clone(&self.created.lock()[0])
    }

    fn created(&self) -> usize {
        self.created.lock().len()
    }
}

impl PingerFactory for ScriptedFactory {
    fn create(&self, _local: ScionAddr) -> Result<(Arc<dyn Pinger>, mpsc::Receiver<ProbeReply>)> {
        let (tx, rx) = mpsc::channel(64);
        let pinger = Arc::new(ScriptedPinger {
            replies: tx,
            rtt: self.rtt.clone(),
            faults: Mutex::new(HashMap::new()),
            sent: AtomicU64::new(0),
        });
        self.created.lock().push(Arc::clone(&pinger));
        Ok((pinger, rx))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn ia(s: &str) -> IsdAsn {
    s.parse().unwrap()
}

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

fn local() -> UdpAddr {
    "1-ff00:0:110,127.0.0.1:4000".parse().unwrap()
}

fn remote() -> UdpAddr {
    "1-ff00:0:112,127.0.0.1:5000".parse().unwrap()
}

fn fast_probing() -> ProbeConfig {
    ProbeConfig {
        interval: Duration::from_millis(100),
        timeout: Duration::from_millis(50),
        active_paths: 2,
        ..Default::default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_responder_beats_silent_path() {
    let stats = PathStatsStore::shared();
    let silent = path("1-ff00:0:111", [1, 2, 3, 4]);
    let responder = path("1-ff00:0:113", [5, 6, 7, 8]);
    let factory = ScriptedFactory::answering(&[(&responder, 10)]);

    let selector = ProbedSelector::new(fast_probing(), Arc::clone(&stats), factory.clone()).unwrap();
    selector.initialize(local(), remote(), vec![silent.clone(), responder.clone()]);
    assert!(selector.is_probing());
    assert_eq!(selector.path().unwrap().fingerprint(), silent.fingerprint());

    tokio::time::sleep(Duration::from_millis(160)).await;

    let host = remote().scion_addr();
    let measured = stats.latency(host, responder.fingerprint()).unwrap();
    let penalized = stats.latency(host, silent.fingerprint()).unwrap();
    assert!(!measured.timed_out);
    assert!(penalized.timed_out);
    assert!(measured.rtt < penalized.rtt);
    assert!(!stats.is_down(&silent));

    assert_eq!(selector.path().unwrap().fingerprint(), responder.fingerprint());
    selector.close().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_only_active_count_is_probed() {
    let stats = PathStatsStore::shared();
    let a = path("1-ff00:0:111", [1, 2, 3, 4]);
    let b = path("1-ff00:0:113", [5, 6, 7, 8]);
    let c = path("1-ff00:0:114", [9, 10, 11, 12]);
    let factory = ScriptedFactory::answering(&[(&a, 5), (&b, 5), (&c, 1)]);

    let config = ProbeConfig {
        active_paths: 1,
        ..fast_probing()
    };
    let selector = ProbedSelector::new(config, Arc::clone(&stats), factory.clone()).unwrap();
    selector.initialize(local(), remote(), vec![a.clone(), b, c.clone()]);

    tokio::time::sleep(Duration::from_millis(350)).await;

    assert_eq!(factory.pinger().sent.load(Ordering::SeqCst), 3);
    assert!(stats.latency(remote().scion_addr(), c.fingerprint()).is_none());
    assert_eq!(selector.path().unwrap().fingerprint(), a.fingerprint());
}

#[tokio::test(start_paused = true)]
async fn test_fault_reply_marks_path_down() {
    let stats = PathStatsStore::shared();
    let a = path("1-ff00:0:111", [1, 2, 3, 4]);
    let b = path("1-ff00:0:113", [5, 6, 7, 8]);
    let factory = ScriptedFactory::answering(&[(&a, 5), (&b, 20)]);
    let mut events = stats.subscribe();

    let selector = ProbedSelector::new(fast_probing(), Arc::clone(&stats), factory.clone()).unwrap();
    selector.initialize(local(), remote(), vec![a.clone(), b.clone()]);

    // First round: a is faster.
    tokio::time::sleep(Duration::from_millis(160)).await;
    assert_eq!(selector.path().unwrap().fingerprint(), a.fingerprint());

    factory.pinger().faults.lock().insert(
        a.fingerprint(),
        ProbeError::ExternalInterfaceDown {
            ia: ia("1-ff00:0:111"),
            interface: IfId(2),
        },
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    let event = events.recv().await.unwrap();
    assert_eq!(event.fingerprint, a.fingerprint());
    assert_eq!(event.interface, PathInterface::new(ia("1-ff00:0:111"), 2));
    assert!(stats.is_down(&a));
    assert_eq!(selector.path().unwrap().fingerprint(), b.fingerprint());
}

#[tokio::test(start_paused = true)]
async fn test_same_domain_is_not_probed() {
    let factory = ScriptedFactory::answering(&[]);
    let selector =
        ProbedSelector::new(fast_probing(), PathStatsStore::shared(), factory.clone()).unwrap();

    let same_as: UdpAddr = "1-ff00:0:110,127.0.0.1:5000".parse().unwrap();
    selector.initialize(local(), same_as, vec![path("1-ff00:0:111", [1, 2, 3, 4])]);
    selector.set_active(3);

    assert!(!selector.is_probing());
    assert_eq!(factory.created(), 0);
    assert!(selector.path().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_close_stops_probing() {
    let a = path("1-ff00:0:111", [1, 2, 3, 4]);
    let b = path("1-ff00:0:113", [5, 6, 7, 8]);
    let factory = ScriptedFactory::answering(&[(&a, 5), (&b, 5)]);
    let selector =
        ProbedSelector::new(fast_probing(), PathStatsStore::shared(), factory.clone()).unwrap();
    selector.initialize(local(), remote(), vec![a, b]);

    tokio::time::sleep(Duration::from_millis(250)).await;
    let sent = factory.pinger().sent.load(Ordering::SeqCst);
    assert_eq!(sent, 4);

    selector.close().unwrap();
    assert!(!selector.is_probing());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(factory.pinger().sent.load(Ordering::SeqCst), sent);

    // Activation after close does not restart the prober.
    selector.set_active(2);
    assert_eq!(factory.created(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_set_active_starts_probing_once() {
    let a = path("1-ff00:0:111", [1, 2, 3, 4]);
    let factory = ScriptedFactory::answering(&[(&a, 5)]);
    let config = ProbeConfig {
        active_paths: 0,
        ..fast_probing()
    };
    let selector = ProbedSelector::new(config, PathStatsStore::shared(), factory.clone()).unwrap();
    selector.initialize(local(), remote(), vec![a]);
    assert!(!selector.is_probing());

    selector.set_active(1);
    selector.set_active(2);
    assert!(selector.is_probing());
    assert_eq!(factory.created(), 1);
}
