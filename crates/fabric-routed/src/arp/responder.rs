//! Proxy ARP from the addressing scheme.

use fabric_types::{decode_host_address, host_link_address, Ipv4Address, MacAddress, PortNo};
use std::fmt;
use tracing::debug;

use super::frame::{parse_frame, ArpFrame, ArpOp, Frame};
use crate::error::Result;

/// A reply ready to be sent out `out_port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpReply {
    pub payload: Vec<u8>,
    pub out_port: PortNo,
    /// Link address the requested network address resolved to
    pub resolved: MacAddress,
}

/// Why a packet-in produced no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotArp { ether_type: u16 },
    NotRequest { opcode: u16 },
    /// The target is outside the fabric's address plan
    UnknownTarget(Ipv4Address),
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::NotArp { ether_type } => write!(f, "ether type {:#06x}", ether_type),
            IgnoreReason::NotRequest { opcode } => write!(f, "ARP opcode {}", opcode),
            IgnoreReason::UnknownTarget(ip) => write!(f, "no host at {}", ip),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArpOutcome {
    Reply(ArpReply),
    Ignored(IgnoreReason),
}

/// Answers ARP requests for any fabric or external host without learning.
///
/// The link address of every host follows from its network address, so
/// the responder keeps no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArpResponder;

impl ArpResponder {
    pub fn new() -> Self {
        Self
    }

    /// Builds the reply to an ARP request received on `ingress_port`.
    ///
    /// Frames that are not ARP requests are ignored; truncated or non
    /// IPv4-over-Ethernet ARP frames are `MalformedPacket` errors.
    pub fn handle_request(&self, payload: &[u8], ingress_port: PortNo) -> Result<ArpOutcome> {
        let request = match parse_frame(payload)? {
            Frame::Arp(frame) => frame,
            Frame::Other { ether_type } => {
                return Ok(ArpOutcome::Ignored(IgnoreReason::NotArp { ether_type }));
            }
        };

        if request.op() != Some(ArpOp::Request) {
            return Ok(ArpOutcome::Ignored(IgnoreReason::NotRequest {
                opcode: request.body.opcode,
            }));
        }

        let target_ip = request.target_ip();
        let resolved = match decode_host_address(target_ip) {
            Ok(host) => host_link_address(host),
            Err(e) => {
                debug!(%target_ip, error = %e, "ARP target outside the address plan");
                return Ok(ArpOutcome::Ignored(IgnoreReason::UnknownTarget(target_ip)));
            }
        };

        let reply = ArpFrame::new(
            ArpOp::Request.complement(),
            request.eth_src(),
            resolved,
            (resolved, target_ip),
            (request.sender_mac(), request.sender_ip()),
        );

        debug!(
            %target_ip,
            %resolved,
            requester = %request.sender_ip(),
            port = %ingress_port,
            "answering ARP request"
        );

        Ok(ArpOutcome::Reply(ArpReply {
            payload: reply.encode()?,
            out_port: ingress_port,
            resolved,
        }))
    }
}
