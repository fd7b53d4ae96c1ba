//! Fan-out parameter and everything derived from it.

use crate::{ParseError, PortLayout, PortRole, SwitchLayer};
use serde::{Deserialize, Serialize};

/// Largest supported fan-out.
///
/// Core switch indices are 1-based and stored in one identifier byte, so
/// `(K/2)²` must stay below 256. Host link addresses write pod, edge and
/// host as two decimal digits each, which also needs every index below 100.
pub const MAX_FANOUT: u8 = 30;

/// Static topology parameters of a K-ary fat tree.
///
/// # Examples
///
/// ```
/// use fabric_types::TopologyParameters;
///
/// let params = TopologyParameters::new(4).unwrap();
/// assert_eq!(params.core_switches(), 4);
/// assert_eq!(params.total_hosts(), 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct TopologyParameters {
    k: u8,
}

impl TopologyParameters {
    /// Validates `k`: even, at least 2, at most [`MAX_FANOUT`].
    pub fn new(k: u8) -> Result<Self, ParseError> {
        if k < 2 || k % 2 != 0 || k > MAX_FANOUT {
            return Err(ParseError::InvalidFanout(k));
        }
        Ok(TopologyParameters { k })
    }

    pub const fn k(&self) -> u8 {
        self.k
    }

    const fn half(&self) -> u8 {
        self.k / 2
    }

    pub const fn pods(&self) -> u8 {
        self.k
    }

    pub const fn core_switches(&self) -> u8 {
        self.half() * self.half()
    }

    pub const fn aggregation_per_pod(&self) -> u8 {
        self.half()
    }

    pub const fn edge_per_pod(&self) -> u8 {
        self.half()
    }

    pub const fn hosts_per_edge(&self) -> u8 {
        self.half()
    }

    /// Core switches each aggregation switch connects to.
    pub const fn aggregation_uplinks(&self) -> u8 {
        self.half()
    }

    /// Aggregation switches each edge switch connects to.
    pub const fn edge_uplinks(&self) -> u8 {
        self.half()
    }

    pub const fn total_hosts(&self) -> u32 {
        self.k as u32 * self.edge_per_pod() as u32 * self.hosts_per_edge() as u32
    }

    /// Port numbering of a switch in `layer`.
    ///
    /// `external_hosts` is only consulted for the gateway.
    pub fn port_layout(&self, layer: SwitchLayer, external_hosts: u16) -> PortLayout {
        let k = u16::from(self.k);
        let half = u16::from(self.half());
        let segments = match layer {
            SwitchLayer::Core => vec![
                (PortRole::Pod, k),
                (PortRole::MiddleboxIngress, 1),
                (PortRole::MiddleboxEgress, 1),
                (PortRole::Gateway, 1),
            ],
            SwitchLayer::Aggregation => vec![
                (PortRole::Core, half),
                (PortRole::Edge, half),
                (PortRole::MiddleboxIngress, 1),
                (PortRole::MiddleboxEgress, 1),
            ],
            SwitchLayer::Edge => vec![
                (PortRole::Aggregation, half),
                (PortRole::Host, half),
                (PortRole::MiddleboxIngress, 1),
                (PortRole::MiddleboxEgress, 1),
            ],
            SwitchLayer::Gateway => vec![
                (PortRole::Core, u16::from(self.core_switches())),
                (PortRole::External, external_hosts),
            ],
        };
        PortLayout::new(segments)
    }
}

impl TryFrom<u8> for TopologyParameters {
    type Error = ParseError;

    fn try_from(k: u8) -> Result<Self, Self::Error> {
        TopologyParameters::new(k)
    }
}

impl From<TopologyParameters> for u8 {
    fn from(params: TopologyParameters) -> u8 {
        params.k
    }
}
