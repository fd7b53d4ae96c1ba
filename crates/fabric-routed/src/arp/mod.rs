//! ARP handling.
//!
//! Edge switches and the gateway punt every ARP frame to the controller;
//! requests are answered from the address plan and the reply leaves through
//! the port the request arrived on.

mod frame;
mod responder;

pub use frame::{parse_frame, ArpFrame, ArpOp, Frame, ARP_FRAME_LEN};
pub use responder::{ArpOutcome, ArpReply, ArpResponder, IgnoreReason};
