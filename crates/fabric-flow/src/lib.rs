//! Flow-table abstractions for programmable switches.
//!
//! The controller never speaks the control protocol directly. It describes
//! the state it wants with the types in this crate and hands
//! [`FlowCommand`]s to a [`DatapathTransport`], which owns the wire
//! encoding and the switch connections.
//!
//! - [`types`]: tables, groups, matches, actions and rules
//! - [`command`]: the outbound mutation commands
//! - [`transport`]: the transport boundary trait
//! - [`error`]: transport failures

pub mod command;
pub mod error;
pub mod transport;
pub mod types;

pub use command::FlowCommand;
pub use error::{TransportError, TransportResult};
pub use transport::DatapathTransport;
pub use types::{
    Action, Bucket, FlowMatch, FlowRule, GroupId, Instruction, MultipathGroup, OutputPort,
    PacketFields, TableId, ETH_TYPE_ARP, ETH_TYPE_IPV4,
};
