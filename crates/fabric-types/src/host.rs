//! Host addressing.
//!
//! A host's location is encoded in both of its addresses:
//!
//! | Host | Network address | Link address |
//! |------|-----------------|--------------|
//! | fabric (pod, edge, host) | `10.pod.edge.(host+1)` | `02:00:00:PP:EE:HH` |
//! | external n | `10.255.0.n` | `02:ff:00:00:00:n` |
//!
//! In link addresses each fabric field is written as its two decimal digits,
//! so pod 12 is the octet `0x12`. The topology generator assigns addresses
//! with the same rules, so the controller can resolve any host without
//! having seen it.

use crate::{Ipv4Address, MacAddress, MacPrefix, ParseError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved pod value for hosts behind the gateway.
pub const EXTERNAL_POD: u8 = 255;

const NETWORK_OCTET: u8 = 10;
const LOCAL_UNICAST: u8 = 0x02;
const EDGE_REWRITE_TAG: [u8; 4] = [0x02, 0x01, 0x00, 0x01];

/// Octet holding the two decimal digits of `value`, e.g. 12 -> `0x12`.
///
/// Only defined below 100; [`MAX_FANOUT`](crate::MAX_FANOUT) keeps every
/// pod, edge and host index inside that range.
pub const fn decimal_octet(value: u8) -> u8 {
    ((value / 10) % 10) << 4 | (value % 10)
}

/// Topological location of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HostAddress {
    /// A host attached to edge switch `edge` of pod `pod`; `host` is 0-based.
    Fabric { pod: u8, edge: u8, host: u8 },
    /// A host on the gateway side, numbered as in its address.
    External { host: u8 },
}

impl HostAddress {
    /// A fabric host location.
    pub const fn fabric(pod: u8, edge: u8, host: u8) -> Self {
        HostAddress::Fabric { pod, edge, host }
    }

    /// An external host behind the gateway.
    pub const fn external(host: u8) -> Self {
        HostAddress::External { host }
    }

    pub const fn is_external(&self) -> bool {
        matches!(self, HostAddress::External { .. })
    }

    /// See [`host_link_address`].
    pub fn link_address(&self) -> MacAddress {
        host_link_address(*self)
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostAddress::Fabric { pod, edge, host } => {
                write!(f, "host[pod={} edge={} host={}]", pod, edge, host)
            }
            HostAddress::External { host } => write!(f, "external[{}]", host),
        }
    }
}

/// Decodes a host network address into its location.
///
/// The first octet must be 10. For fabric hosts the last octet is 1-based,
/// so `10.p.e.0` is rejected.
pub fn decode_host_address(ip: Ipv4Address) -> Result<HostAddress, ParseError> {
    let [net, pod, edge, last] = ip.octets();
    if net != NETWORK_OCTET {
        return Err(ParseError::InvalidHostAddress(format!(
            "{} is outside {}.0.0.0/8",
            ip, NETWORK_OCTET
        )));
    }

    if pod == EXTERNAL_POD {
        return Ok(HostAddress::External { host: last });
    }

    match last.checked_sub(1) {
        Some(host) => Ok(HostAddress::Fabric { pod, edge, host }),
        None => Err(ParseError::InvalidHostAddress(format!(
            "{} has a zero host octet",
            ip
        ))),
    }
}

/// Link address the topology generator gives the host at `addr`.
pub fn host_link_address(addr: HostAddress) -> MacAddress {
    match addr {
        HostAddress::Fabric { pod, edge, host } => MacAddress::new([
            LOCAL_UNICAST,
            0,
            0,
            decimal_octet(pod),
            decimal_octet(edge),
            decimal_octet(host),
        ]),
        HostAddress::External { host } => {
            MacAddress::new([LOCAL_UNICAST, EXTERNAL_POD, 0, 0, 0, host])
        }
    }
}

/// Network address the topology generator gives the host at `addr`.
///
/// Fails for locations with no encoding: a fabric host in the reserved pod
/// or with host index 255.
pub fn host_network_address(addr: HostAddress) -> Result<Ipv4Address, ParseError> {
    match addr {
        HostAddress::Fabric { pod, .. } if pod == EXTERNAL_POD => Err(
            ParseError::InvalidHostAddress(format!("{} uses the reserved pod", addr)),
        ),
        HostAddress::Fabric { pod, edge, host } => host
            .checked_add(1)
            .map(|last| Ipv4Address::new(NETWORK_OCTET, pod, edge, last))
            .ok_or_else(|| ParseError::InvalidHostAddress(format!("{} has no address", addr))),
        HostAddress::External { host } => {
            Ok(Ipv4Address::new(NETWORK_OCTET, EXTERNAL_POD, 0, host))
        }
    }
}

/// Source address written by an edge switch's uplink buckets.
pub fn edge_source_rewrite(pod: u8, edge: u8) -> MacAddress {
    let [a, b, c, d] = EDGE_REWRITE_TAG;
    MacAddress::new([a, b, c, d, decimal_octet(pod), decimal_octet(edge)])
}

impl MacPrefix {
    /// Matches every fabric host in `pod`.
    pub fn pod_hosts(pod: u8) -> MacPrefix {
        let pod = decimal_octet(pod);
        MacPrefix::leading_bytes(MacAddress::new([LOCAL_UNICAST, 0, 0, pod, 0, 0]), 4)
    }

    /// Matches every fabric host behind edge switch `edge` of `pod`.
    pub fn edge_hosts(pod: u8, edge: u8) -> MacPrefix {
        let (pod, edge) = (decimal_octet(pod), decimal_octet(edge));
        MacPrefix::leading_bytes(MacAddress::new([LOCAL_UNICAST, 0, 0, pod, edge, 0]), 5)
    }
}
