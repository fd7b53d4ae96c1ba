//! Fabric wiring and end-to-end packet walks
//!
//! Reconstructs the links the topology generator creates, independently of
//! the controller's port layout code, and walks packets hop by hop through
//! a set of programmed switches.

use fabric_flow::{PacketFields, ETH_TYPE_IPV4};
use fabric_types::{
    host_link_address, host_network_address, DatapathId, HostAddress, PortNo, SwitchIdentity,
    TopologyParameters,
};
use std::collections::HashMap;
use thiserror::Error;

use crate::{Egress, SwitchTables};

const MAX_HOPS: usize = 16;

/// Far end of a switch port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Switch { dpid: DatapathId, port: PortNo },
    Host(HostAddress),
    /// Middlebox ingress; it hands traffic back on the same switch's
    /// egress port
    Middlebox { dpid: DatapathId, egress: PortNo },
}

/// One switch traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    pub dpid: DatapathId,
    pub in_port: PortNo,
    pub out_port: PortNo,
}

/// A complete walk from source to destination host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub hops: Vec<Hop>,
    /// Switches whose middlebox the packet passed through
    pub middleboxes: Vec<DatapathId>,
}

impl Path {
    pub fn switches(&self) -> Vec<DatapathId> {
        self.hops.iter().map(|hop| hop.dpid).collect()
    }
}

/// Ways a walk can fail
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalkError {
    #[error("host {0} is not attached to the fabric")]
    UnknownHost(HostAddress),

    #[error("switch {0} has no flow state")]
    Unprogrammed(DatapathId),

    #[error("switch {dpid} dropped the packet in table {table}")]
    Dropped { dpid: DatapathId, table: u8 },

    #[error("switch {dpid} sent the packet to the controller")]
    Punted { dpid: DatapathId },

    #[error("switch {dpid} port {port} is not wired")]
    Unwired { dpid: DatapathId, port: PortNo },

    #[error("packet delivered to {0} instead of the destination")]
    Misdelivered(HostAddress),

    #[error("packet exceeded {MAX_HOPS} hops")]
    Loop,
}

/// Links of a K-ary fat tree as the generator builds them
#[derive(Debug, Clone)]
pub struct FabricWiring {
    params: TopologyParameters,
    links: HashMap<(DatapathId, PortNo), Endpoint>,
    hosts: HashMap<HostAddress, (DatapathId, PortNo)>,
}

impl FabricWiring {
    /// Wire the fabric; `external_hosts` are attached to the gateway in order
    pub fn new(params: TopologyParameters, external_hosts: &[u8]) -> Self {
        let mut wiring = FabricWiring {
            params,
            links: HashMap::new(),
            hosts: HashMap::new(),
        };

        let k = u16::from(params.k());
        let half = k / 2;
        let gateway = SwitchIdentity::Gateway { index: 0 }.datapath_id();

        for core in 0..u16::from(params.core_switches()) {
            let core_dpid = core_dpid(core);
            // Aggregation switch a uplinks to cores half*a .. half*(a+1)
            let agg_index = core / half;
            let agg_port = core % half + 1;
            for pod in 0..k {
                let agg = agg_dpid(pod, agg_index);
                wiring.link(core_dpid, pod + 1, agg, agg_port);
            }
            wiring.middlebox(core_dpid, k + 1);
            wiring.link(core_dpid, k + 3, gateway, core + 1);
        }

        for pod in 0..k {
            for agg in 0..half {
                wiring.middlebox(agg_dpid(pod, agg), k + 1);
            }
            for edge in 0..half {
                let edge_dpid = edge_dpid(pod, edge);
                for agg in 0..half {
                    wiring.link(edge_dpid, agg + 1, agg_dpid(pod, agg), half + edge + 1);
                }
                for host in 0..half {
                    let addr = HostAddress::fabric(pod as u8, edge as u8, host as u8);
                    wiring.host(edge_dpid, half + host + 1, addr);
                }
                wiring.middlebox(edge_dpid, k + 1);
            }
        }

        let first_external = u16::from(params.core_switches()) + 1;
        for (i, host) in external_hosts.iter().enumerate() {
            let port = first_external + i as u16;
            wiring.host(gateway, port, HostAddress::external(*host));
        }

        wiring
    }

    fn link(&mut self, a: DatapathId, a_port: u16, b: DatapathId, b_port: u16) {
        let (a_port, b_port) = (PortNo::new(a_port), PortNo::new(b_port));
        self.links.insert((a, a_port), Endpoint::Switch { dpid: b, port: b_port });
        self.links.insert((b, b_port), Endpoint::Switch { dpid: a, port: a_port });
    }

    fn middlebox(&mut self, dpid: DatapathId, ingress: u16) {
        self.links.insert(
            (dpid, PortNo::new(ingress)),
            Endpoint::Middlebox {
                dpid,
                egress: PortNo::new(ingress + 1),
            },
        );
    }

    fn host(&mut self, dpid: DatapathId, port: u16, addr: HostAddress) {
        let port = PortNo::new(port);
        self.links.insert((dpid, port), Endpoint::Host(addr));
        self.hosts.insert(addr, (dpid, port));
    }

    pub fn params(&self) -> TopologyParameters {
        self.params
    }

    pub fn endpoint(&self, dpid: DatapathId, port: PortNo) -> Option<Endpoint> {
        self.links.get(&(dpid, port)).copied()
    }

    /// Switch and port a host hangs off
    pub fn attachment(&self, host: HostAddress) -> Option<(DatapathId, PortNo)> {
        self.hosts.get(&host).copied()
    }

    /// Every switch in the fabric, gateway last
    pub fn switches(&self) -> Vec<DatapathId> {
        let k = u16::from(self.params.k());
        let half = k / 2;
        let mut out: Vec<_> = (0..u16::from(self.params.core_switches()))
            .map(core_dpid)
            .collect();
        for pod in 0..k {
            out.extend((0..half).map(|a| agg_dpid(pod, a)));
            out.extend((0..half).map(|e| edge_dpid(pod, e)));
        }
        out.push(SwitchIdentity::Gateway { index: 0 }.datapath_id());
        out
    }

    /// Every host, fabric hosts first
    pub fn hosts(&self) -> Vec<HostAddress> {
        let mut hosts: Vec<_> = self.hosts.keys().copied().collect();
        hosts.sort();
        hosts
    }

    /// Walk an IPv4 packet from `src` to `dst` along every multipath choice
    pub fn walk(
        &self,
        switches: &HashMap<DatapathId, SwitchTables>,
        src: HostAddress,
        dst: HostAddress,
        ip_proto: u8,
    ) -> Result<Vec<Path>, WalkError> {
        let (dpid, in_port) = self.attachment(src).ok_or(WalkError::UnknownHost(src))?;
        let ipv4_dst = host_network_address(dst).map_err(|_| WalkError::UnknownHost(dst))?;
        let packet = PacketFields {
            in_port,
            eth_src: host_link_address(src),
            eth_dst: host_link_address(dst),
            eth_type: ETH_TYPE_IPV4,
            ipv4_dst: Some(ipv4_dst),
            ip_proto: Some(ip_proto),
        };

        let mut paths = Vec::new();
        let start = Path {
            hops: Vec::new(),
            middleboxes: Vec::new(),
        };
        self.step(switches, dpid, packet, dst, start, &mut paths)?;
        Ok(paths)
    }

    fn step(
        &self,
        switches: &HashMap<DatapathId, SwitchTables>,
        dpid: DatapathId,
        packet: PacketFields,
        dst: HostAddress,
        path: Path,
        paths: &mut Vec<Path>,
    ) -> Result<(), WalkError> {
        if path.hops.len() >= MAX_HOPS {
            return Err(WalkError::Loop);
        }
        let tables = switches.get(&dpid).ok_or(WalkError::Unprogrammed(dpid))?;

        for egress in tables.process(&packet) {
            let (port, mut packet) = match egress {
                Egress::Port { port, packet } => (port, packet),
                Egress::Controller { .. } => return Err(WalkError::Punted { dpid }),
                Egress::Dropped { table_id } => {
                    return Err(WalkError::Dropped {
                        dpid,
                        table: table_id.as_u8(),
                    })
                }
            };

            let mut next = path.clone();
            next.hops.push(Hop {
                dpid,
                in_port: packet.in_port,
                out_port: port,
            });

            match self.endpoint(dpid, port) {
                None => return Err(WalkError::Unwired { dpid, port }),
                Some(Endpoint::Host(host)) if host == dst => paths.push(next),
                Some(Endpoint::Host(host)) => return Err(WalkError::Misdelivered(host)),
                Some(Endpoint::Middlebox { dpid, egress }) => {
                    next.middleboxes.push(dpid);
                    packet.in_port = egress;
                    self.step(switches, dpid, packet, dst, next, paths)?;
                }
                Some(Endpoint::Switch { dpid, port }) => {
                    packet.in_port = port;
                    self.step(switches, dpid, packet, dst, next, paths)?;
                }
            }
        }
        Ok(())
    }
}

fn core_dpid(core: u16) -> DatapathId {
    SwitchIdentity::Core {
        index: (core + 1) as u8,
    }
    .datapath_id()
}

fn agg_dpid(pod: u16, index: u16) -> DatapathId {
    SwitchIdentity::Aggregation {
        pod: pod as u8,
        index: index as u8,
    }
    .datapath_id()
}

fn edge_dpid(pod: u16, index: u16) -> DatapathId {
    SwitchIdentity::Edge {
        pod: pod as u8,
        index: index as u8,
    }
    .datapath_id()
}
