//! Steering table (table 0) rules common to every layer.

use fabric_flow::{FlowMatch, FlowRule, Instruction, OutputPort, TableId, ETH_TYPE_ARP};
use fabric_types::{PortLayout, PortRole, SwitchIdentity};

use super::{priority, require_port, RoutingPolicy};
use crate::error::Result;

/// Steering rules for `identity`, highest priority first.
///
/// Switches with a middlebox get the passthrough rule for traffic coming
/// back from it and one diversion rule per applicable steering policy.
pub(super) fn steering_rules(
    identity: &SwitchIdentity,
    layout: &PortLayout,
    policy: &RoutingPolicy,
    intercept_arp: bool,
) -> Result<Vec<FlowRule>> {
    let layer = identity.layer();
    let mut rules = Vec::new();

    if layer.has_middlebox() {
        let egress = require_port(identity, layout, PortRole::MiddleboxEgress, 0)?;
        rules.push(FlowRule::new(
            priority::PASSTHROUGH,
            FlowMatch::any().in_port(egress),
            Instruction::goto(TableId::ROUTING),
        ));
    }

    // Overlaps the passthrough rule only for ARP sent on the egress port.
    // Steered traffic never includes ARP, since this rule outranks every
    // steering rule, so such a frame was originated by the middlebox and
    // either winner is accepted: the controller answers it here, or the
    // default routes carry it up to the gateway, which punts it.
    if intercept_arp {
        rules.push(FlowRule::new(
            priority::CONTROLLER,
            FlowMatch::any().eth_type(ETH_TYPE_ARP),
            Instruction::output(OutputPort::Controller),
        ));
    }

    if layer.has_middlebox() {
        let ingress = require_port(identity, layout, PortRole::MiddleboxIngress, 0)?;
        for steer in policy.steering.iter().filter(|p| p.applies_to(identity)) {
            rules.push(FlowRule::new(
                priority::STEER,
                steer.flow_match.clone(),
                Instruction::output(ingress),
            ));
        }
    }

    rules.push(FlowRule::new(
        priority::DEFAULT,
        FlowMatch::any(),
        Instruction::goto(TableId::ROUTING),
    ));

    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::SteeringPolicy;
    use fabric_types::{edge_source_rewrite, PortNo, SwitchLayer, TopologyParameters};
    use pretty_assertions::assert_eq;

    fn layout(layer: SwitchLayer) -> PortLayout {
        TopologyParameters::new(4).unwrap().port_layout(layer, 2)
    }

    #[test]
    fn test_middlebox_passthrough_first() {
        let identity = SwitchIdentity::Aggregation { pod: 0, index: 0 };
        let rules = steering_rules(
            &identity,
            &layout(SwitchLayer::Aggregation),
            &RoutingPolicy::default(),
            false,
        )
        .unwrap();

        assert_eq!(
            rules,
            vec![
                FlowRule::new(
                    3,
                    FlowMatch::any().in_port(PortNo::new(6)),
                    Instruction::goto(TableId::ROUTING)
                ),
                FlowRule::new(1, FlowMatch::any(), Instruction::goto(TableId::ROUTING)),
            ]
        );
    }

    #[test]
    fn test_policy_only_on_named_layers() {
        let policy = RoutingPolicy {
            steering: vec![SteeringPolicy {
                name: "udp".to_string(),
                layers: vec![SwitchLayer::Edge],
                dpids: Vec::new(),
                flow_match: FlowMatch::any().ip_proto(17),
            }],
            ..RoutingPolicy::default()
        };

        let edge = SwitchIdentity::Edge { pod: 0, index: 0 };
        let rules = steering_rules(&edge, &layout(SwitchLayer::Edge), &policy, true).unwrap();
        let steer: Vec<_> = rules.iter().filter(|r| r.priority == 2).collect();
        assert_eq!(steer.len(), 1);
        assert_eq!(steer[0].instruction, Instruction::output(PortNo::new(5)));

        let core = SwitchIdentity::Core { index: 1 };
        let rules = steering_rules(&core, &layout(SwitchLayer::Core), &policy, false).unwrap();
        assert!(rules.iter().all(|r| r.priority != 2));
    }

    #[test]
    fn test_policy_scoped_to_one_switch() {
        let scoped = SwitchIdentity::Aggregation { pod: 1, index: 0 };
        let policy = RoutingPolicy {
            steering: vec![SteeringPolicy {
                name: "from-edge".to_string(),
                layers: vec![SwitchLayer::Aggregation],
                dpids: vec![scoped.datapath_id()],
                flow_match: FlowMatch::any().eth_src(edge_source_rewrite(1, 1)),
            }],
            ..RoutingPolicy::default()
        };
        let layout = layout(SwitchLayer::Aggregation);

        let rules = steering_rules(&scoped, &layout, &policy, false).unwrap();
        assert_eq!(
            rules[1],
            FlowRule::new(
                2,
                FlowMatch::any().eth_src(edge_source_rewrite(1, 1)),
                Instruction::output(PortNo::new(5))
            )
        );

        let sibling = SwitchIdentity::Aggregation { pod: 1, index: 1 };
        let rules = steering_rules(&sibling, &layout, &policy, false).unwrap();
        assert!(rules.iter().all(|r| r.priority != 2));
    }

    #[test]
    fn test_gateway_has_no_passthrough() {
        let gateway = SwitchIdentity::Gateway { index: 0 };
        let rules = steering_rules(
            &gateway,
            &layout(SwitchLayer::Gateway),
            &RoutingPolicy::default(),
            true,
        )
        .unwrap();
        assert_eq!(
            rules,
            vec![
                FlowRule::new(
                    3,
                    FlowMatch::any().eth_type(ETH_TYPE_ARP),
                    Instruction::output(OutputPort::Controller)
                ),
                FlowRule::new(1, FlowMatch::any(), Instruction::goto(TableId::ROUTING)),
            ]
        );
    }
}
