//! Flow-table types.
//!
//! These mirror the subset of a match-action pipeline the fabric uses: two
//! tables, one select group, Ethernet address matching with arbitrary
//! masks, and three action kinds.

use fabric_types::{Ipv4Address, MacAddress, MacPrefix, PortNo};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ETH_TYPE_IPV4: u16 = 0x0800;
pub const ETH_TYPE_ARP: u16 = 0x0806;

/// A flow table in the switch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(u8);

impl TableId {
    /// First table: middlebox steering and controller interception.
    pub const STEERING: TableId = TableId(0);
    /// Second table: destination-based forwarding.
    pub const ROUTING: TableId = TableId(1);

    /// Create a table identifier.
    pub const fn new(id: u8) -> Self {
        TableId(id)
    }

    /// Get the raw table number.
    pub const fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A group table entry identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(u32);

impl GroupId {
    /// The single multipath group each switch carries.
    pub const MULTIPATH: GroupId = GroupId(1);

    /// Create a group identifier.
    pub const fn new(id: u32) -> Self {
        GroupId(id)
    }

    /// Get the raw group number.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output destination of an action or packet-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputPort {
    Physical(PortNo),
    /// The controller connection (packet-in).
    Controller,
}

impl fmt::Display for OutputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputPort::Physical(port) => write!(f, "{}", port),
            OutputPort::Controller => write!(f, "CONTROLLER"),
        }
    }
}

impl From<PortNo> for OutputPort {
    fn from(port: PortNo) -> Self {
        OutputPort::Physical(port)
    }
}

/// Header fields a [`FlowMatch`] is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketFields {
    pub in_port: PortNo,
    pub eth_src: MacAddress,
    pub eth_dst: MacAddress,
    pub eth_type: u16,
    pub ipv4_dst: Option<Ipv4Address>,
    pub ip_proto: Option<u8>,
}

/// Match fields of a flow rule. `None` is a wildcard.
///
/// Matching on an IPv4 field implies `eth_type == 0x0800`; the builder
/// methods set that prerequisite.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct FlowMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_port: Option<PortNo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_type: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_src: Option<MacPrefix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_dst: Option<MacPrefix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_dst: Option<Ipv4Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_proto: Option<u8>,
}

impl FlowMatch {
    /// Matches every packet.
    pub fn any() -> Self {
        FlowMatch::default()
    }

    /// Matches the ingress port.
    pub fn in_port(mut self, port: PortNo) -> Self {
        self.in_port = Some(port);
        self
    }

    /// Matches the Ethernet type.
    pub fn eth_type(mut self, eth_type: u16) -> Self {
        self.eth_type = Some(eth_type);
        self
    }

    /// Matches the source address, exactly or under a mask.
    pub fn eth_src(mut self, prefix: impl Into<MacPrefix>) -> Self {
        self.eth_src = Some(prefix.into());
        self
    }

    /// Matches the destination address, exactly or under a mask.
    pub fn eth_dst(mut self, prefix: impl Into<MacPrefix>) -> Self {
        self.eth_dst = Some(prefix.into());
        self
    }

    /// Matches the IPv4 destination; implies IPv4.
    pub fn ipv4_dst(mut self, addr: Ipv4Address) -> Self {
        self.eth_type = Some(ETH_TYPE_IPV4);
        self.ipv4_dst = Some(addr);
        self
    }

    /// Matches the IP protocol number; implies IPv4.
    pub fn ip_proto(mut self, proto: u8) -> Self {
        self.eth_type = Some(ETH_TYPE_IPV4);
        self.ip_proto = Some(proto);
        self
    }

    /// Returns true if no field is constrained.
    pub fn is_catch_all(&self) -> bool {
        *self == FlowMatch::default()
    }

    /// Returns true if every packet matched by `other` is matched by `self`.
    ///
    /// This is the non-strict delete relation: clearing a table with
    /// `self` removes every rule whose match `self` covers.
    pub fn covers(&self, other: &FlowMatch) -> bool {
        fn field<T: PartialEq>(mine: &Option<T>, theirs: &Option<T>) -> bool {
            match (mine, theirs) {
                (None, _) => true,
                (Some(a), Some(b)) => a == b,
                (Some(_), None) => false,
            }
        }

        fn prefix(mine: &Option<MacPrefix>, theirs: &Option<MacPrefix>) -> bool {
            match (mine, theirs) {
                (None, _) => true,
                (Some(a), Some(b)) => a.covers(b),
                (Some(_), None) => false,
            }
        }

        prefix(&self.eth_src, &other.eth_src)
            && prefix(&self.eth_dst, &other.eth_dst)
            && field(&self.in_port, &other.in_port)
            && field(&self.eth_type, &other.eth_type)
            && field(&self.ipv4_dst, &other.ipv4_dst)
            && field(&self.ip_proto, &other.ip_proto)
    }

    /// Returns true if `packet` satisfies every constrained field.
    pub fn matches(&self, packet: &PacketFields) -> bool {
        self.in_port.map_or(true, |p| p == packet.in_port)
            && self.eth_type.map_or(true, |t| t == packet.eth_type)
            && self.eth_src.map_or(true, |m| m.contains(&packet.eth_src))
            && self.eth_dst.map_or(true, |m| m.contains(&packet.eth_dst))
            && self.ipv4_dst.map_or(true, |a| Some(a) == packet.ipv4_dst)
            && self.ip_proto.map_or(true, |p| Some(p) == packet.ip_proto)
    }
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields = Vec::new();
        if let Some(port) = self.in_port {
            fields.push(format!("in_port={}", port));
        }
        if let Some(eth_type) = self.eth_type {
            fields.push(format!("eth_type={:#06x}", eth_type));
        }
        if let Some(src) = self.eth_src {
            fields.push(format!("eth_src={}", src));
        }
        if let Some(dst) = self.eth_dst {
            fields.push(format!("eth_dst={}", dst));
        }
        if let Some(dst) = self.ipv4_dst {
            fields.push(format!("ipv4_dst={}", dst));
        }
        if let Some(proto) = self.ip_proto {
            fields.push(format!("ip_proto={}", proto));
        }
        if fields.is_empty() {
            write!(f, "*")
        } else {
            write!(f, "{}", fields.join(","))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Output { port: OutputPort },
    Group { group_id: GroupId },
    SetEthSrc { address: MacAddress },
}

impl Action {
    /// Output to `port`.
    pub fn output(port: impl Into<OutputPort>) -> Self {
        Action::Output { port: port.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Instruction {
    GotoTable { table_id: TableId },
    ApplyActions { actions: Vec<Action> },
}

impl Instruction {
    /// Continue matching in `table_id`.
    pub fn goto(table_id: TableId) -> Self {
        Instruction::GotoTable { table_id }
    }

    /// Apply a single output action.
    pub fn output(port: impl Into<OutputPort>) -> Self {
        Instruction::ApplyActions {
            actions: vec![Action::output(port)],
        }
    }

    /// Hand the packet to a group.
    pub fn group(group_id: GroupId) -> Self {
        Instruction::ApplyActions {
            actions: vec![Action::Group { group_id }],
        }
    }
}

/// A prioritised flow rule. Higher priority wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowRule {
    pub priority: u16,
    #[serde(rename = "match")]
    pub flow_match: FlowMatch,
    pub instruction: Instruction,
}

impl FlowRule {
    pub fn new(priority: u16, flow_match: FlowMatch, instruction: Instruction) -> Self {
        FlowRule {
            priority,
            flow_match,
            instruction,
        }
    }
}

/// One member of a select group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bucket {
    pub weight: u16,
    pub actions: Vec<Action>,
}

impl Bucket {
    /// Equal-weight bucket: optional source rewrite, then output.
    pub fn to_port(port: PortNo, rewrite_src: Option<MacAddress>) -> Self {
        let mut actions = Vec::with_capacity(2);
        if let Some(address) = rewrite_src {
            actions.push(Action::SetEthSrc { address });
        }
        actions.push(Action::output(port));
        Bucket { weight: 1, actions }
    }

    /// Physical port this bucket outputs to.
    pub fn output_port(&self) -> Option<PortNo> {
        self.actions.iter().find_map(|action| match action {
            Action::Output {
                port: OutputPort::Physical(port),
            } => Some(*port),
            _ => None,
        })
    }

    /// Source address this bucket writes, if any.
    pub fn source_rewrite(&self) -> Option<MacAddress> {
        self.actions.iter().find_map(|action| match action {
            Action::SetEthSrc { address } => Some(*address),
            _ => None,
        })
    }
}

/// A select group spreading traffic across equal-cost uplinks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MultipathGroup {
    pub group_id: GroupId,
    pub buckets: Vec<Bucket>,
}

impl MultipathGroup {
    /// Create the multipath group from `buckets`.
    pub fn new(buckets: Vec<Bucket>) -> Self {
        MultipathGroup {
            group_id: GroupId::MULTIPATH,
            buckets,
        }
    }

    /// Output ports of every bucket, in bucket order.
    pub fn ports(&self) -> Vec<PortNo> {
        self.buckets.iter().filter_map(Bucket::output_port).collect()
    }

    /// Removes the bucket that outputs to `port`, leaving every other bucket
    /// untouched. Returns false if no bucket uses `port`.
    pub fn remove_port(&mut self, port: PortNo) -> bool {
        let before = self.buckets.len();
        self.buckets.retain(|bucket| bucket.output_port() != Some(port));
        self.buckets.len() != before
    }
}
