//! Path model.
//!
//! A [`Path`] is immutable once it has been returned by a path query. Its
//! identity is the [`PathFingerprint`], a SHA-256 digest over the ordered
//! interface sequence, so two values describing the same route compare equal
//! even when their metadata differs between refreshes.

mod metadata;
mod query;

pub use metadata::PathMetadata;
pub use query::{PathQuerier, StaticPathQuerier};

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

use sha2::{Digest, Sha256};

use crate::types::{IsdAsn, PathInterface};

/// Stable identity of a path.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathFingerprint(pub [u8; 32]);

impl PathFingerprint {
    /// Fingerprint of an interface sequence.
    pub fn from_interfaces(interfaces: &[PathInterface]) -> Self {
        let mut hasher = Sha256::new();
        for iface in interfaces {
            hasher.update(iface.ia.0.to_be_bytes());
            hasher.update(iface.ifid.0.to_be_bytes());
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        Self(digest)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PathFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for PathFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathFingerprint({self})")
    }
}

/// Transport-level description of how to send over a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingPath {
    /// Encoded dataplane path, opaque to the selectors.
    pub dataplane: Vec<u8>,
    /// First-hop underlay address.
    pub underlay: SocketAddr,
}

impl ForwardingPath {
    pub fn new(dataplane: Vec<u8>, underlay: SocketAddr) -> Self {
        Self { dataplane, underlay }
    }
}

/// One hop of a path: the interface pair connecting two consecutive ASes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathHop {
    pub a: PathInterface,
    pub b: PathInterface,
}

/// Set of hops traversed by a path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HopSet(HashSet<PathHop>);

impl HopSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, hop: &PathHop) -> bool {
        self.0.contains(hop)
    }

    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }
}

/// A network path to a remote routing domain.
#[derive(Debug, Clone)]
pub struct Path {
    /// Routing domain the path starts in.
    pub source: IsdAsn,
    /// Routing domain the path leads to.
    pub destination: IsdAsn,
    /// How the transport sends over this path.
    pub forwarding: ForwardingPath,
    /// Static metadata from the path query.
    pub metadata: PathMetadata,
    fingerprint: PathFingerprint,
    interfaces: Vec<PathInterface>,
}

impl Path {
    pub fn new(
        source: IsdAsn,
        destination: IsdAsn,
        interfaces: Vec<PathInterface>,
        forwarding: ForwardingPath,
        metadata: PathMetadata,
    ) -> Self {
        Self {
            source,
            destination,
            forwarding,
            metadata,
            fingerprint: PathFingerprint::from_interfaces(&interfaces),
            interfaces,
        }
    }

    pub fn fingerprint(&self) -> PathFingerprint {
        self.fingerprint
    }

    /// Interface sequence, in travel order.
    pub fn interfaces(&self) -> &[PathInterface] {
        &self.interfaces
    }

    /// Egress interface of the first hop.
    pub fn first_hop(&self) -> Option<PathInterface> {
        self.interfaces.first().copied()
    }

    /// Number of AS-level hops.
    pub fn hop_count(&self) -> usize {
        self.interfaces.len() / 2
    }

    pub fn hops(&self) -> impl Iterator<Item = PathHop> + '_ {
        self.interfaces
            .windows(2)
            .map(|pair| PathHop { a: pair[0], b: pair[1] })
    }

    pub fn hop_set(&self) -> HopSet {
        HopSet(self.hops().collect())
    }

    /// Whether a down-notification for `(fingerprint, iface)` concerns this path.
    pub fn is_affected_by(&self, fingerprint: PathFingerprint, iface: PathInterface) -> bool {
        self.fingerprint == fingerprint || is_interface_on_path(self, iface)
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

impl Eq for Path {}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}>{} [", self.source, self.destination)?;
        for (i, iface) in self.interfaces.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{iface}")?;
        }
        write!(f, "]")
    }
}

/// Whether `iface` is an endpoint of any hop of `path`.
pub fn is_interface_on_path(path: &Path, iface: PathInterface) -> bool {
    path.hops().any(|hop| hop.a == iface || hop.b == iface)
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    pub fn ia(s: &str) -> IsdAsn {
        s.parse().unwrap()
    }

    /// Path from 1-ff00:0:110 to 1-ff00:0:112 via the given transit AS and interface ids.
    pub fn path_via(transit: &str, ifids: [u64; 4]) -> Arc<Path> {
        path_with(transit, ifids, PathMetadata::default())
    }

    pub fn path_with(transit: &str, ifids: [u64; 4], metadata: PathMetadata) -> Arc<Path> {
        let src = ia("1-ff00:0:110");
        let mid = ia(transit);
        let dst = ia("1-ff00:0:112");
        let interfaces = vec![
            PathInterface::new(src, ifids[0]),
            PathInterface::new(mid, ifids[1]),
            PathInterface::new(mid, ifids[2]),
            PathInterface::new(dst, ifids[3]),
        ];
        let forwarding = ForwardingPath::new(vec![], "127.0.0.1:30041".parse().unwrap());
        Arc::new(Path::new(src, dst, interfaces, forwarding, metadata))
    }

    pub fn latencies(ms: &[u64]) -> Vec<Option<Duration>> {
        ms.iter().map(|&m| Some(Duration::from_millis(m))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;

    #[test]
    fn test_fingerprint_ignores_metadata() {
        let a = path_via("1-ff00:0:111", [1, 2, 3, 4]);
        let b = path_with(
            "1-ff00:0:111",
            [1, 2, 3, 4],
            PathMetadata { mtu: 9000, ..Default::default() },
        );
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(*a, *b);
    }

    #[test]
    fn test_fingerprint_depends_on_order() {
        let a = path_via("1-ff00:0:111", [1, 2, 3, 4]);
        let b = path_via("1-ff00:0:111", [1, 3, 2, 4]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_interface_on_path() {
        let p = path_via("1-ff00:0:111", [1, 2, 3, 4]);
        assert!(is_interface_on_path(&p, PathInterface::new(ia("1-ff00:0:110"), 1)));
        assert!(is_interface_on_path(&p, PathInterface::new(ia("1-ff00:0:111"), 3)));
        assert!(!is_interface_on_path(&p, PathInterface::new(ia("1-ff00:0:111"), 1)));
        assert!(!is_interface_on_path(&p, PathInterface::new(ia("1-ff00:0:113"), 2)));
    }

    #[test]
    fn test_affected_by_fingerprint_or_interface() {
        let p = path_via("1-ff00:0:111", [1, 2, 3, 4]);
        let other = path_via("1-ff00:0:113", [5, 6, 7, 8]);
        let unrelated = PathInterface::new(ia("2-ff00:0:1"), 9);

        assert!(p.is_affected_by(p.fingerprint(), unrelated));
        assert!(p.is_affected_by(other.fingerprint(), p.first_hop().unwrap()));
        assert!(!p.is_affected_by(other.fingerprint(), unrelated));
    }

    #[test]
    fn test_hop_set_subset() {
        let short = path_via("1-ff00:0:111", [1, 2, 3, 4]);
        let hops = short.hop_set();
        assert_eq!(hops.len(), 3);
        assert!(hops.is_subset_of(&short.hop_set()));

        let other = path_via("1-ff00:0:113", [1, 2, 3, 4]);
        assert!(!hops.is_subset_of(&other.hop_set()));
    }

    #[test]
    fn test_empty_path_has_no_hops() {
        let local = ia("1-ff00:0:110");
        let p = Path::new(
            local,
            local,
            vec![],
            ForwardingPath::new(vec![], "127.0.0.1:1".parse().unwrap()),
            PathMetadata::default(),
        );
        assert_eq!(p.hop_count(), 0);
        assert!(p.hop_set().is_empty());
        assert!(p.first_hop().is_none());
    }
}
