//! Core types used throughout pathsel.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

const ASN_BITS: u32 = 48;
const ASN_MASK: u64 = (1 << ASN_BITS) - 1;
const MAX_BGP_ASN: u64 = u32::MAX as u64;

/// Routing domain identifier: isolation domain (ISD) and AS number.
///
/// Encoded as a single `u64` with the ISD in the upper 16 bits. The text form
/// is `<isd>-<as>`, where the AS is decimal in the BGP range and otherwise
/// three colon-separated hex groups (`1-ff00:0:110`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct IsdAsn(pub u64);

impl IsdAsn {
    /// Wildcard (unspecified) ISD-AS.
    pub const WILDCARD: Self = Self(0);

    pub fn new(isd: u16, asn: u64) -> Self {
        Self((u64::from(isd) << ASN_BITS) | (asn & ASN_MASK))
    }

    pub fn isd(self) -> u16 {
        (self.0 >> ASN_BITS) as u16
    }

    pub fn asn(self) -> u64 {
        self.0 & ASN_MASK
    }

    pub fn is_wildcard(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for IsdAsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let asn = self.asn();
        if asn <= MAX_BGP_ASN {
            write!(f, "{}-{}", self.isd(), asn)
        } else {
            write!(
                f,
                "{}-{:x}:{:x}:{:x}",
                self.isd(),
                (asn >> 32) & 0xffff,
                (asn >> 16) & 0xffff,
                asn & 0xffff
            )
        }
    }
}

impl FromStr for IsdAsn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidAddress(format!("invalid ISD-AS: {s:?}"));

        let (isd, asn) = s.split_once('-').ok_or_else(invalid)?;
        let isd: u16 = isd.parse().map_err(|_| invalid())?;

        let asn = if asn.contains(':') {
            let groups: Vec<&str> = asn.split(':').collect();
            if groups.len() != 3 {
                return Err(invalid());
            }
            let mut value = 0u64;
            for group in groups {
                let part = u16::from_str_radix(group, 16).map_err(|_| invalid())?;
                value = (value << 16) | u64::from(part);
            }
            value
        } else {
            let value: u64 = asn.parse().map_err(|_| invalid())?;
            if value > MAX_BGP_ASN {
                return Err(invalid());
            }
            value
        };

        Ok(Self::new(isd, asn))
    }
}

impl Serialize for IsdAsn {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IsdAsn {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Interface identifier, unique within one AS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct IfId(pub u64);

impl fmt::Display for IfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single interface of an AS, as named by down-notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PathInterface {
    pub ia: IsdAsn,
    pub ifid: IfId,
}

impl PathInterface {
    pub fn new(ia: IsdAsn, ifid: u64) -> Self {
        Self { ia, ifid: IfId(ifid) }
    }
}

impl fmt::Display for PathInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.ia, self.ifid)
    }
}

/// Host address within a routing domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScionAddr {
    pub ia: IsdAsn,
    pub ip: IpAddr,
}

impl ScionAddr {
    pub fn new(ia: IsdAsn, ip: IpAddr) -> Self {
        Self { ia, ip }
    }
}

impl fmt::Display for ScionAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.ia, self.ip)
    }
}

/// UDP endpoint within a routing domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UdpAddr {
    pub ia: IsdAsn,
    pub addr: SocketAddr,
}

impl UdpAddr {
    pub fn new(ia: IsdAsn, addr: SocketAddr) -> Self {
        Self { ia, addr }
    }

    /// Host part of this endpoint (drops the port).
    pub fn scion_addr(&self) -> ScionAddr {
        ScionAddr::new(self.ia, self.addr.ip())
    }
}

impl fmt::Display for UdpAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.ia, self.addr)
    }
}

impl FromStr for UdpAddr {
    type Err = Error;

    /// Parses `<isd-as>,<ip>:<port>`; the IP may be bracketed (`1-ff00:0:110,[127.0.0.1]:443`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidAddress(format!("invalid UDP address: {s:?}"));

        let (ia, host) = s.split_once(',').ok_or_else(invalid)?;
        let ia: IsdAsn = ia.parse()?;

        if let Ok(addr) = host.parse::<SocketAddr>() {
            return Ok(Self::new(ia, addr));
        }

        let (ip, port) = host.rsplit_once(':').ok_or_else(invalid)?;
        let ip = ip.trim_start_matches('[').trim_end_matches(']');
        let ip: IpAddr = ip.parse().map_err(|_| invalid())?;
        let port: u16 = port.parse().map_err(|_| invalid())?;

        Ok(Self::new(ia, SocketAddr::new(ip, port)))
    }
}

/// Lifecycle state of an outbound selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorState {
    /// Created, not yet initialized with paths
    #[default]
    Uninitialized,
    /// Initialized and serving paths
    Active,
    /// Closed; never serves paths again
    Closed,
}

impl SelectorState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for SelectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Active => write!(f, "active"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isd_asn_hex_format() {
        let ia: IsdAsn = "1-ff00:0:110".parse().unwrap();
        assert_eq!(ia.isd(), 1);
        assert_eq!(ia.asn(), 0xff00_0000_0110);
        assert_eq!(ia.to_string(), "1-ff00:0:110");
    }

    #[test]
    fn test_isd_asn_bgp_format() {
        let ia: IsdAsn = "19-64512".parse().unwrap();
        assert_eq!(ia.isd(), 19);
        assert_eq!(ia.asn(), 64512);
        assert_eq!(ia.to_string(), "19-64512");
    }

    #[test]
    fn test_isd_asn_rejects_garbage() {
        assert!("ff00:0:110".parse::<IsdAsn>().is_err());
        assert!("1-ff00:0".parse::<IsdAsn>().is_err());
        assert!("1-99999999999".parse::<IsdAsn>().is_err());
        assert!("x-1".parse::<IsdAsn>().is_err());
    }

    #[test]
    fn test_udp_addr_bracketed_ipv4() {
        let addr: UdpAddr = "19-ffaa:1:bcc,[127.0.0.1]:9988".parse().unwrap();
        assert_eq!(addr.ia.to_string(), "19-ffaa:1:bcc");
        assert_eq!(addr.addr, "127.0.0.1:9988".parse().unwrap());
    }

    #[test]
    fn test_udp_addr_ipv6() {
        let addr: UdpAddr = "1-ff00:0:111,[::1]:443".parse().unwrap();
        assert_eq!(addr.addr, "[::1]:443".parse().unwrap());
        assert_eq!(addr.scion_addr().ip, "::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_path_interface_display() {
        let iface = PathInterface::new("1-ff00:0:110".parse().unwrap(), 7);
        assert_eq!(iface.to_string(), "1-ff00:0:110#7");
    }
}
