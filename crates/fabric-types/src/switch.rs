//! Switch identifiers and the topological role they encode.
//!
//! The topology generator packs a switch's position into its 64-bit
//! datapath identifier:
//!
//! ```text
//!  63        24 23      16 15       8 7        0
//! +------------+----------+----------+----------+
//! |  zero      |  layer   |   pod    |  index   |
//! +------------+----------+----------+----------+
//! ```
//!
//! Core switch indices start at 1. Core and gateway identifiers carry a
//! zero pod byte.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A switch's 64-bit datapath identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatapathId(u64);

impl DatapathId {
    /// Wraps a raw datapath identifier.
    pub const fn new(raw: u64) -> Self {
        DatapathId(raw)
    }

    /// Returns the raw identifier.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    const fn layer_tag(&self) -> u8 {
        ((self.0 >> 16) & 0xff) as u8
    }

    const fn pod_field(&self) -> u8 {
        ((self.0 >> 8) & 0xff) as u8
    }

    const fn index_field(&self) -> u8 {
        (self.0 & 0xff) as u8
    }

    const fn has_high_bits(&self) -> bool {
        self.0 >> 24 != 0
    }

    const fn compose(layer: SwitchLayer, pod: u8, index: u8) -> Self {
        DatapathId(((layer.tag() as u64) << 16) | ((pod as u64) << 8) | index as u64)
    }
}

impl fmt::Display for DatapathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#08x}", self.0)
    }
}

impl From<u64> for DatapathId {
    fn from(raw: u64) -> Self {
        DatapathId(raw)
    }
}

/// The four switch layers of the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchLayer {
    Core,
    Aggregation,
    Edge,
    Gateway,
}

impl SwitchLayer {
    pub const ALL: [SwitchLayer; 4] = [
        SwitchLayer::Core,
        SwitchLayer::Aggregation,
        SwitchLayer::Edge,
        SwitchLayer::Gateway,
    ];

    /// Tag stored in bits 16..24 of the datapath identifier.
    pub const fn tag(self) -> u8 {
        match self {
            SwitchLayer::Core => 0,
            SwitchLayer::Aggregation => 1,
            SwitchLayer::Edge => 2,
            SwitchLayer::Gateway => 3,
        }
    }

    /// Layer for an identifier tag, if the fabric uses it.
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(SwitchLayer::Core),
            1 => Some(SwitchLayer::Aggregation),
            2 => Some(SwitchLayer::Edge),
            3 => Some(SwitchLayer::Gateway),
            _ => None,
        }
    }

    /// The gateway is the only layer without an attached middlebox.
    pub const fn has_middlebox(self) -> bool {
        !matches!(self, SwitchLayer::Gateway)
    }
}

impl fmt::Display for SwitchLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwitchLayer::Core => "core",
            SwitchLayer::Aggregation => "aggregation",
            SwitchLayer::Edge => "edge",
            SwitchLayer::Gateway => "gateway",
        };
        write!(f, "{}", s)
    }
}

/// A switch's position in the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "layer", rename_all = "lowercase")]
pub enum SwitchIdentity {
    /// Core switch; `index` is 1-based.
    Core { index: u8 },
    Aggregation { pod: u8, index: u8 },
    Edge { pod: u8, index: u8 },
    Gateway { index: u8 },
}

impl SwitchIdentity {
    /// Layer the switch belongs to.
    pub const fn layer(&self) -> SwitchLayer {
        match self {
            SwitchIdentity::Core { .. } => SwitchLayer::Core,
            SwitchIdentity::Aggregation { .. } => SwitchLayer::Aggregation,
            SwitchIdentity::Edge { .. } => SwitchLayer::Edge,
            SwitchIdentity::Gateway { .. } => SwitchLayer::Gateway,
        }
    }

    /// Pod index, absent for core and gateway switches.
    pub const fn pod(&self) -> Option<u8> {
        match self {
            SwitchIdentity::Aggregation { pod, .. } | SwitchIdentity::Edge { pod, .. } => {
                Some(*pod)
            }
            SwitchIdentity::Core { .. } | SwitchIdentity::Gateway { .. } => None,
        }
    }

    /// Index within the pod, or among the core switches.
    pub const fn index(&self) -> u8 {
        match self {
            SwitchIdentity::Core { index }
            | SwitchIdentity::Aggregation { index, .. }
            | SwitchIdentity::Edge { index, .. }
            | SwitchIdentity::Gateway { index } => *index,
        }
    }

    /// Encodes this identity back into a datapath identifier.
    pub const fn datapath_id(&self) -> DatapathId {
        let pod = match self.pod() {
            Some(pod) => pod,
            None => 0,
        };
        DatapathId::compose(self.layer(), pod, self.index())
    }
}

impl fmt::Display for SwitchIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pod() {
            Some(pod) => write!(f, "{}[pod={} index={}]", self.layer(), pod, self.index()),
            None => write!(f, "{}[index={}]", self.layer(), self.index()),
        }
    }
}

impl TryFrom<DatapathId> for SwitchIdentity {
    type Error = ParseError;

    fn try_from(dpid: DatapathId) -> Result<Self, Self::Error> {
        decode_switch(dpid)
    }
}

/// Decodes a datapath identifier into the switch's layer, pod and index.
///
/// Total and deterministic: every input yields either an identity or an
/// error, and two distinct identifiers never decode to the same identity.
pub fn decode_switch(dpid: DatapathId) -> Result<SwitchIdentity, ParseError> {
    let tag = dpid.layer_tag();
    let layer = SwitchLayer::from_tag(tag).ok_or(ParseError::UnknownLayer { dpid, tag })?;

    if dpid.has_high_bits() {
        return Err(ParseError::InvalidIdentifier(dpid));
    }

    let pod = dpid.pod_field();
    let index = dpid.index_field();

    match layer {
        SwitchLayer::Core | SwitchLayer::Gateway if pod != 0 => {
            Err(ParseError::InvalidIdentifier(dpid))
        }
        SwitchLayer::Core => Ok(SwitchIdentity::Core { index }),
        SwitchLayer::Gateway => Ok(SwitchIdentity::Gateway { index }),
        SwitchLayer::Aggregation => Ok(SwitchIdentity::Aggregation { pod, index }),
        SwitchLayer::Edge => Ok(SwitchIdentity::Edge { pod, index }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn test_decode_each_layer() {
        assert_eq!(
            decode_switch(DatapathId::new(0x000002)).unwrap(),
            SwitchIdentity::Core { index: 2 }
        );
        assert_eq!(
            decode_switch(DatapathId::new(0x010301)).unwrap(),
            SwitchIdentity::Aggregation { pod: 3, index: 1 }
        );
        assert_eq!(
            decode_switch(DatapathId::new(0x020100)).unwrap(),
            SwitchIdentity::Edge { pod: 1, index: 0 }
        );
        assert_eq!(
            decode_switch(DatapathId::new(0x030000)).unwrap(),
            SwitchIdentity::Gateway { index: 0 }
        );
    }

    #[test]
    fn test_unknown_layer() {
        let dpid = DatapathId::new(0x040000);
        assert_eq!(
            decode_switch(dpid),
            Err(ParseError::UnknownLayer { dpid, tag: 4 })
        );
    }

    #[test]
    fn test_high_bits_rejected() {
        let dpid = DatapathId::new(0x0100_020100);
        assert_eq!(decode_switch(dpid), Err(ParseError::InvalidIdentifier(dpid)));
    }

    #[test]
    fn test_core_with_pod_rejected() {
        let dpid = DatapathId::new(0x000101);
        assert_eq!(decode_switch(dpid), Err(ParseError::InvalidIdentifier(dpid)));
    }

    #[test]
    fn test_round_trip_and_injective() {
        let mut seen = HashSet::new();
        for raw in 0u64..0x04_0000 {
            let dpid = DatapathId::new(raw);
            if let Ok(identity) = decode_switch(dpid) {
                assert_eq!(identity.datapath_id(), dpid);
                assert!(seen.insert(identity), "{} decoded twice", identity);
            }
        }
        // 256 core + 65536 aggregation + 65536 edge + 256 gateway
        assert_eq!(seen.len(), 256 + 65536 * 2 + 256);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let dpid = DatapathId::new(0x020305);
        assert_eq!(decode_switch(dpid), decode_switch(dpid));
    }

    #[test]
    fn test_display() {
        assert_eq!(DatapathId::new(0x020100).to_string(), "0x020100");
        assert_eq!(
            SwitchIdentity::Edge { pod: 1, index: 0 }.to_string(),
            "edge[pod=1 index=0]"
        );
        assert_eq!(SwitchIdentity::Core { index: 2 }.to_string(), "core[index=2]");
    }

    #[test]
    fn test_middlebox_layers() {
        let with_middlebox: Vec<_> = SwitchLayer::ALL
            .iter()
            .copied()
            .filter(|l| l.has_middlebox())
            .collect();
        assert_eq!(
            with_middlebox,
            vec![SwitchLayer::Core, SwitchLayer::Aggregation, SwitchLayer::Edge]
        );
    }
}
