//! Ethernet II + ARP (IPv4 over Ethernet) wire format.

use binrw::io::Cursor;
use binrw::{binrw, BinRead, BinWrite};
use fabric_flow::{ETH_TYPE_ARP, ETH_TYPE_IPV4};
use fabric_types::{Ipv4Address, MacAddress};
use std::fmt;

use crate::error::{FabricError, Result};

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const ARP_FRAME_LEN: usize = 42;

pub const ARP_HTYPE_ETHERNET: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOp {
    Request,
    Reply,
}

impl ArpOp {
    pub const fn code(self) -> u16 {
        match self {
            ArpOp::Request => 1,
            ArpOp::Reply => 2,
        }
    }

    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(ArpOp::Request),
            2 => Some(ArpOp::Reply),
            _ => None,
        }
    }

    /// The opcode that answers this one.
    pub const fn complement(self) -> Self {
        match self {
            ArpOp::Request => ArpOp::Reply,
            ArpOp::Reply => ArpOp::Request,
        }
    }
}

impl fmt::Display for ArpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArpOp::Request => write!(f, "request"),
            ArpOp::Reply => write!(f, "reply"),
        }
    }
}

#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: [u8; 6],
    pub src: [u8; 6],
    pub ether_type: u16,
}

#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpBody {
    pub htype: u16,
    pub ptype: u16,
    pub hlen: u8,
    pub plen: u8,
    pub opcode: u16,
    pub sha: [u8; 6],
    pub spa: [u8; 4],
    pub tha: [u8; 6],
    pub tpa: [u8; 4],
}

/// A validated ARP frame.
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpFrame {
    pub ethernet: EthernetHeader,
    pub body: ArpBody,
}

/// Result of looking at a packet-in payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Arp(ArpFrame),
    Other { ether_type: u16 },
}

impl ArpFrame {
    pub fn new(
        op: ArpOp,
        eth_dst: MacAddress,
        eth_src: MacAddress,
        sender: (MacAddress, Ipv4Address),
        target: (MacAddress, Ipv4Address),
    ) -> Self {
        Self {
            ethernet: EthernetHeader {
                dst: *eth_dst.as_bytes(),
                src: *eth_src.as_bytes(),
                ether_type: ETH_TYPE_ARP,
            },
            body: ArpBody {
                htype: ARP_HTYPE_ETHERNET,
                ptype: ETH_TYPE_IPV4,
                hlen: 6,
                plen: 4,
                opcode: op.code(),
                sha: *sender.0.as_bytes(),
                spa: sender.1.octets(),
                tha: *target.0.as_bytes(),
                tpa: target.1.octets(),
            },
        }
    }

    pub fn eth_src(&self) -> MacAddress {
        MacAddress::new(self.ethernet.src)
    }

    pub fn eth_dst(&self) -> MacAddress {
        MacAddress::new(self.ethernet.dst)
    }

    /// `None` for opcodes other than request and reply.
    pub fn op(&self) -> Option<ArpOp> {
        ArpOp::from_code(self.body.opcode)
    }

    pub fn sender_mac(&self) -> MacAddress {
        MacAddress::new(self.body.sha)
    }

    pub fn sender_ip(&self) -> Ipv4Address {
        Ipv4Address::from(self.body.spa)
    }

    pub fn target_mac(&self) -> MacAddress {
        MacAddress::new(self.body.tha)
    }

    pub fn target_ip(&self) -> Ipv4Address {
        Ipv4Address::from(self.body.tpa)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(ARP_FRAME_LEN));
        self.write(&mut cursor)
            .map_err(|e| FabricError::malformed(format!("encoding ARP frame: {}", e)))?;
        Ok(cursor.into_inner())
    }
}

/// Classifies `payload` and decodes it if it carries ARP.
///
/// Trailing padding after the ARP body is ignored.
pub fn parse_frame(payload: &[u8]) -> Result<Frame> {
    if payload.len() < ETHERNET_HEADER_LEN {
        return Err(FabricError::malformed(format!(
            "{} bytes is shorter than an Ethernet header",
            payload.len()
        )));
    }

    let mut cursor = Cursor::new(payload);
    let ethernet = EthernetHeader::read(&mut cursor)
        .map_err(|e| FabricError::malformed(format!("Ethernet header: {}", e)))?;
    if ethernet.ether_type != ETH_TYPE_ARP {
        return Ok(Frame::Other {
            ether_type: ethernet.ether_type,
        });
    }

    let body = ArpBody::read(&mut cursor).map_err(|_| {
        FabricError::malformed(format!(
            "ARP frame truncated at {} bytes, need {}",
            payload.len(),
            ARP_FRAME_LEN
        ))
    })?;

    if body.htype != ARP_HTYPE_ETHERNET || body.hlen != 6 {
        return Err(FabricError::malformed(format!(
            "ARP hardware type {} length {} is not Ethernet",
            body.htype, body.hlen
        )));
    }
    if body.ptype != ETH_TYPE_IPV4 || body.plen != 4 {
        return Err(FabricError::malformed(format!(
            "ARP protocol type {:#06x} length {} is not IPv4",
            body.ptype, body.plen
        )));
    }

    Ok(Frame::Arp(ArpFrame { ethernet, body }))
}
