//! Test fixtures for common fabric scenarios
//!
//! Identifiers follow the generator's encoding and frames are assembled
//! byte by byte, so they do not share code with the controller's codec.

use fabric_types::{DatapathId, Ipv4Address, MacAddress, SwitchIdentity, TopologyParameters};

/// External hosts behind the gateway in the reference topology
pub const EXTERNAL_HOSTS: [u8; 2] = [1, 2];

/// The K=4 reference topology
pub fn k4() -> TopologyParameters {
    match TopologyParameters::new(4) {
        Ok(params) => params,
        Err(e) => panic!("K=4 must be valid: {e}"),
    }
}

/// Core switch with 1-based index
pub fn core(index: u8) -> DatapathId {
    SwitchIdentity::Core { index }.datapath_id()
}

pub fn aggregation(pod: u8, index: u8) -> DatapathId {
    SwitchIdentity::Aggregation { pod, index }.datapath_id()
}

pub fn edge(pod: u8, index: u8) -> DatapathId {
    SwitchIdentity::Edge { pod, index }.datapath_id()
}

pub fn gateway() -> DatapathId {
    SwitchIdentity::Gateway { index: 0 }.datapath_id()
}

/// Raw frame builders
pub mod frames {
    use super::*;

    const ETH_TYPE_ARP: [u8; 2] = [0x08, 0x06];
    const ETH_TYPE_IPV4: [u8; 2] = [0x08, 0x00];

    /// Broadcast ARP request from `sender` asking for `target_ip`
    pub fn arp_request(
        sender_mac: MacAddress,
        sender_ip: Ipv4Address,
        target_ip: Ipv4Address,
    ) -> Vec<u8> {
        arp(
            MacAddress::BROADCAST,
            sender_mac,
            1,
            sender_mac,
            sender_ip,
            MacAddress::ZERO,
            target_ip,
        )
    }

    /// Unsolicited ARP reply
    pub fn arp_reply(
        sender_mac: MacAddress,
        sender_ip: Ipv4Address,
        target_mac: MacAddress,
        target_ip: Ipv4Address,
    ) -> Vec<u8> {
        arp(target_mac, sender_mac, 2, sender_mac, sender_ip, target_mac, target_ip)
    }

    /// Ethernet + ARP frame with arbitrary header fields
    pub fn arp(
        eth_dst: MacAddress,
        eth_src: MacAddress,
        opcode: u16,
        sender_mac: MacAddress,
        sender_ip: Ipv4Address,
        target_mac: MacAddress,
        target_ip: Ipv4Address,
    ) -> Vec<u8> {
        let mut frame = Vec::with_capacity(42);
        frame.extend_from_slice(eth_dst.as_bytes());
        frame.extend_from_slice(eth_src.as_bytes());
        frame.extend_from_slice(&ETH_TYPE_ARP);
        frame.extend_from_slice(&[0x00, 0x01]); // hardware type: Ethernet
        frame.extend_from_slice(&ETH_TYPE_IPV4); // protocol type
        frame.push(6);
        frame.push(4);
        frame.extend_from_slice(&opcode.to_be_bytes());
        frame.extend_from_slice(sender_mac.as_bytes());
        frame.extend_from_slice(&sender_ip.octets());
        frame.extend_from_slice(target_mac.as_bytes());
        frame.extend_from_slice(&target_ip.octets());
        frame
    }

    /// Minimal IPv4 frame header (no payload checksum)
    pub fn ipv4(eth_dst: MacAddress, eth_src: MacAddress) -> Vec<u8> {
        let mut frame = Vec::with_capacity(34);
        frame.extend_from_slice(eth_dst.as_bytes());
        frame.extend_from_slice(eth_src.as_bytes());
        frame.extend_from_slice(&ETH_TYPE_IPV4);
        frame.extend_from_slice(&[0x45, 0, 0, 20, 0, 0, 0, 0, 64, 17, 0, 0]);
        frame.extend_from_slice(&[10, 0, 0, 1, 10, 1, 0, 1]);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_identifiers() {
        assert_eq!(core(1).as_u64(), 0x000001);
        assert_eq!(aggregation(2, 1).as_u64(), 0x010201);
        assert_eq!(edge(1, 0).as_u64(), 0x020100);
        assert_eq!(gateway().as_u64(), 0x030000);
    }

    #[test]
    fn test_arp_request_layout() {
        let frame = frames::arp_request(
            MacAddress::new([2, 0, 0, 1, 0, 0]),
            Ipv4Address::new(10, 1, 0, 1),
            Ipv4Address::new(10, 0, 0, 1),
        );
        assert_eq!(frame.len(), 42);
        assert_eq!(&frame[0..6], &[0xff; 6]);
        assert_eq!(&frame[12..14], &[0x08, 0x06]);
        assert_eq!(&frame[20..22], &[0x00, 0x01]);
        assert_eq!(&frame[38..42], &[10, 0, 0, 1]);
    }
}
