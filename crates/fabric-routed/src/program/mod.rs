//! Table programs for each switch layer.
//!
//! Every switch runs the same two-table pipeline:
//!
//! ```text
//!              steering (table 0)                  routing (table 1)
//! priority 3   from middlebox egress -> routing    external host -> port (gateway)
//!              ARP -> controller (edge, gateway)
//! priority 2   steering policy -> middlebox        known destination -> port
//! priority 1   anything -> routing                 anything -> multipath group
//! ```
//!
//! The program is a pure function of the switch identity, the fan-out and
//! the routing policy. Nothing is learnt from the network.

mod agg_switch;
mod core_switch;
mod edge_switch;
mod gateway_switch;
mod steering;

use fabric_flow::{FlowMatch, FlowRule, MultipathGroup};
use fabric_types::{
    DatapathId, PortLayout, PortNo, PortRole, SwitchIdentity, SwitchLayer, TopologyParameters,
};
use std::collections::BTreeMap;

use crate::error::{FabricError, Result};

pub use agg_switch::build_aggregation;
pub use core_switch::build_core;
pub use edge_switch::build_edge;
pub use gateway_switch::build_gateway;

/// Rule priorities shared by every layer.
pub mod priority {
    /// Traffic returning from the middlebox skips steering.
    pub const PASSTHROUGH: u16 = 3;
    /// Address resolution is answered by the controller.
    pub const CONTROLLER: u16 = 3;
    /// Gateway routes to external hosts bypass the group.
    pub const EXTERNAL_HOST: u16 = 3;
    pub const STEER: u16 = 2;
    pub const DESTINATION: u16 = 2;
    pub const DEFAULT: u16 = 1;
}

/// Intended flow state of one switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableProgram {
    pub identity: SwitchIdentity,
    pub steering: Vec<FlowRule>,
    pub routing: Vec<FlowRule>,
    pub group: Option<MultipathGroup>,
}

impl TableProgram {
    pub fn rule_count(&self) -> usize {
        self.steering.len() + self.routing.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.group.as_ref().map_or(0, |g| g.buckets.len())
    }
}

/// Traffic diverted through a switch's middlebox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteeringPolicy {
    pub name: String,
    /// Layers the policy applies to; never includes the gateway.
    pub layers: Vec<SwitchLayer>,
    /// Switches the policy is limited to; empty means every switch in
    /// `layers`.
    pub dpids: Vec<DatapathId>,
    pub flow_match: FlowMatch,
}

impl SteeringPolicy {
    /// Returns true if `identity` installs this policy's diversion rule.
    pub fn applies_to(&self, identity: &SwitchIdentity) -> bool {
        let layer = identity.layer();
        layer.has_middlebox()
            && self.layers.contains(&layer)
            && (self.dpids.is_empty() || self.dpids.contains(&identity.datapath_id()))
    }
}

/// Static routing choices layered on top of the topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPolicy {
    /// External hosts attached to the gateway, in port order.
    pub external_hosts: Vec<u8>,
    pub steering: Vec<SteeringPolicy>,
    /// Uplink ports removed from a switch's multipath group.
    pub pruned_uplinks: BTreeMap<DatapathId, Vec<PortNo>>,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            external_hosts: vec![1, 2],
            steering: Vec::new(),
            pruned_uplinks: BTreeMap::new(),
        }
    }
}

impl RoutingPolicy {
    fn pruned(&self, identity: &SwitchIdentity) -> &[PortNo] {
        self.pruned_uplinks
            .get(&identity.datapath_id())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn port_layout(&self, params: &TopologyParameters, layer: SwitchLayer) -> PortLayout {
        let external = u16::try_from(self.external_hosts.len()).unwrap_or(u16::MAX);
        params.port_layout(layer, external)
    }
}

/// Builds the program for any switch, dispatching on its layer.
///
/// `observed_ports`, when the switch reported it, must equal the port count
/// the generator gives that layer.
pub fn build_program(
    identity: SwitchIdentity,
    params: &TopologyParameters,
    policy: &RoutingPolicy,
    observed_ports: Option<u16>,
) -> Result<TableProgram> {
    if let Some(observed) = observed_ports {
        let expected = policy.port_layout(params, identity.layer()).total_ports();
        if observed != expected {
            return Err(FabricError::inconsistent(
                &identity,
                format!("switch reports {} ports, layout has {}", observed, expected),
            ));
        }
    }

    match identity {
        SwitchIdentity::Core { index } => build_core(index, params, policy),
        SwitchIdentity::Aggregation { pod, index } => build_aggregation(pod, index, params, policy),
        SwitchIdentity::Edge { pod, index } => build_edge(pod, index, params, policy),
        SwitchIdentity::Gateway { index } => build_gateway(index, params, policy),
    }
}

fn require_port(
    identity: &SwitchIdentity,
    layout: &PortLayout,
    role: PortRole,
    offset: u16,
) -> Result<PortNo> {
    layout.port(role, offset).ok_or_else(|| {
        FabricError::inconsistent(identity, format!("no {:?} port at offset {}", role, offset))
    })
}

fn check_range(identity: &SwitchIdentity, what: &str, value: u8, start: u8, end: u8) -> Result<()> {
    if value < start || value >= end {
        return Err(FabricError::inconsistent(
            identity,
            format!("{} {} outside {}..{}", what, value, start, end),
        ));
    }
    Ok(())
}

/// Applies configured pruning to `group`, one bucket per port.
fn prune_group(
    identity: &SwitchIdentity,
    group: &mut MultipathGroup,
    policy: &RoutingPolicy,
) -> Result<()> {
    for port in policy.pruned(identity) {
        if !group.remove_port(*port) {
            return Err(FabricError::inconsistent(
                identity,
                format!("pruned port {} is not an uplink", port),
            ));
        }
    }
    if group.buckets.is_empty() {
        return Err(FabricError::inconsistent(identity, "every uplink is pruned"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn k4() -> TopologyParameters {
        TopologyParameters::new(4).unwrap()
    }

    #[test]
    fn test_dispatch_by_layer() {
        let policy = RoutingPolicy::default();
        for identity in [
            SwitchIdentity::Core { index: 1 },
            SwitchIdentity::Aggregation { pod: 0, index: 1 },
            SwitchIdentity::Edge { pod: 3, index: 0 },
            SwitchIdentity::Gateway { index: 0 },
        ] {
            let program = build_program(identity, &k4(), &policy, None).unwrap();
            assert_eq!(program.identity, identity);
        }
    }

    #[test]
    fn test_observed_port_count_checked() {
        let policy = RoutingPolicy::default();
        let edge = SwitchIdentity::Edge { pod: 1, index: 0 };

        assert!(build_program(edge, &k4(), &policy, Some(6)).is_ok());
        let err = build_program(edge, &k4(), &policy, Some(5)).unwrap_err();
        assert!(matches!(err, FabricError::InconsistentTopology { .. }));

        let gateway = SwitchIdentity::Gateway { index: 0 };
        assert!(build_program(gateway, &k4(), &policy, Some(6)).is_ok());
    }

    #[test]
    fn test_catch_all_lowest_in_every_layer() {
        let policy = RoutingPolicy::default();
        for identity in [
            SwitchIdentity::Core { index: 3 },
            SwitchIdentity::Aggregation { pod: 2, index: 0 },
            SwitchIdentity::Edge { pod: 2, index: 1 },
            SwitchIdentity::Gateway { index: 0 },
        ] {
            let program = build_program(identity, &k4(), &policy, None).unwrap();
            for table in [&program.steering, &program.routing] {
                let catch_all: Vec<_> = table
                    .iter()
                    .filter(|r| r.flow_match.is_catch_all())
                    .map(|r| r.priority)
                    .collect();
                assert_eq!(catch_all, vec![priority::DEFAULT], "{}", identity);
                assert!(table
                    .iter()
                    .filter(|r| !r.flow_match.is_catch_all())
                    .all(|r| r.priority > priority::DEFAULT));
            }
        }
    }

    #[test]
    fn test_program_is_deterministic() {
        let policy = RoutingPolicy::default();
        let identity = SwitchIdentity::Aggregation { pod: 1, index: 1 };
        assert_eq!(
            build_program(identity, &k4(), &policy, None).unwrap(),
            build_program(identity, &k4(), &policy, None).unwrap()
        );
    }
}
