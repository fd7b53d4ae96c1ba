//! Addressing primitives for a K-ary fat-tree fabric.
//!
//! The controller never discovers the network. Everything it knows is derived
//! from the fan-out `K` and from the identifiers the topology generator
//! assigns to switches and hosts:
//!
//! - [`MacAddress`], [`MacPrefix`]: link addresses and masked link matches
//! - [`Ipv4Address`]: host network addresses
//! - [`DatapathId`], [`SwitchIdentity`]: switch identifier bit fields
//! - [`HostAddress`]: host location encoded in its addresses
//! - [`TopologyParameters`], [`PortLayout`]: derived counts and port numbering

mod host;
mod ip;
mod mac;
mod port;
mod switch;
mod topology;

pub use host::{
    decimal_octet, decode_host_address, edge_source_rewrite, host_link_address,
    host_network_address, HostAddress, EXTERNAL_POD,
};
pub use ip::Ipv4Address;
pub use mac::{MacAddress, MacPrefix};
pub use port::{PortLayout, PortNo, PortRole};
pub use switch::{decode_switch, DatapathId, SwitchIdentity, SwitchLayer};
pub use topology::{TopologyParameters, MAX_FANOUT};

/// Common error type for parsing and decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("unknown layer tag {tag} in datapath {dpid}")]
    UnknownLayer { dpid: DatapathId, tag: u8 },

    #[error("invalid datapath identifier {0}")]
    InvalidIdentifier(DatapathId),

    #[error("invalid host address: {0}")]
    InvalidHostAddress(String),

    #[error("invalid fan-out {0} (must be even, 2..={max})", max = MAX_FANOUT)]
    InvalidFanout(u8),
}
