//! Switch port numbering.
//!
//! Ports are numbered from 1 in the order the topology generator attaches
//! links. A [`PortLayout`] records that order as a list of role segments, so
//! the first port of a role is one past the running sum of the counts before
//! it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 1-based switch port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortNo(u16);

impl PortNo {
    /// Creates a port number.
    pub const fn new(port: u16) -> Self {
        PortNo(port)
    }

    /// Returns the raw port number.
    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for PortNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for PortNo {
    fn from(port: u16) -> Self {
        PortNo(port)
    }
}

/// What sits on the far end of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortRole {
    /// Core switch port toward a pod's aggregation layer.
    Pod,
    /// Uplink to a core switch.
    Core,
    /// Link to an aggregation switch.
    Aggregation,
    /// Downlink to an edge switch.
    Edge,
    /// Fabric host.
    Host,
    /// Traffic sent to the middlebox.
    MiddleboxIngress,
    /// Traffic returning from the middlebox.
    MiddleboxEgress,
    /// Core switch port toward the gateway.
    Gateway,
    /// Gateway port toward an external host.
    External,
}

/// Port numbering of one switch, as role segments in attachment order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortLayout {
    segments: Vec<(PortRole, u16)>,
}

impl PortLayout {
    /// Creates a layout from `(role, count)` segments in attachment order.
    pub fn new(segments: Vec<(PortRole, u16)>) -> Self {
        PortLayout { segments }
    }

    /// Returns the role segments.
    pub fn segments(&self) -> &[(PortRole, u16)] {
        &self.segments
    }

    /// The first port of `role`, or `None` if the switch has no such port.
    pub fn first_port(&self, role: PortRole) -> Option<PortNo> {
        self.port(role, 0)
    }

    /// The `offset`-th port (0-based) of `role`.
    pub fn port(&self, role: PortRole, offset: u16) -> Option<PortNo> {
        let mut base = 0u16;
        for &(segment_role, count) in &self.segments {
            if segment_role == role {
                return (offset < count).then(|| PortNo(base + offset + 1));
            }
            base += count;
        }
        None
    }

    /// All ports of `role`, in ascending order.
    pub fn ports(&self, role: PortRole) -> Vec<PortNo> {
        let mut base = 0u16;
        for &(segment_role, count) in &self.segments {
            if segment_role == role {
                return (1..=count).map(|i| PortNo(base + i)).collect();
            }
            base += count;
        }
        Vec::new()
    }

    /// Role and 0-based offset of `port`.
    pub fn role_of(&self, port: PortNo) -> Option<(PortRole, u16)> {
        let mut base = 0u16;
        for &(role, count) in &self.segments {
            if port.0 > base && port.0 <= base + count {
                return Some((role, port.0 - base - 1));
            }
            base += count;
        }
        None
    }

    /// Returns the number of ports across every segment.
    pub fn total_ports(&self) -> u16 {
        self.segments.iter().map(|(_, count)| count).sum()
    }
}
