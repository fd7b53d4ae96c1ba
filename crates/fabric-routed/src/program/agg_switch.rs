//! Aggregation switch program.

use fabric_flow::{Bucket, FlowMatch, FlowRule, GroupId, Instruction, MultipathGroup};
use fabric_types::{MacPrefix, PortRole, SwitchIdentity, SwitchLayer, TopologyParameters};

use super::steering::steering_rules;
use super::{check_range, priority, prune_group, require_port, RoutingPolicy, TableProgram};
use crate::error::Result;

/// Builds the program for aggregation switch `index` of `pod`.
///
/// Traffic for an edge switch of this pod goes down its link; everything
/// else is spread over the core uplinks.
pub fn build_aggregation(
    pod: u8,
    index: u8,
    params: &TopologyParameters,
    policy: &RoutingPolicy,
) -> Result<TableProgram> {
    let identity = SwitchIdentity::Aggregation { pod, index };
    check_range(&identity, "pod", pod, 0, params.pods())?;
    check_range(&identity, "aggregation index", index, 0, params.aggregation_per_pod())?;

    let layout = policy.port_layout(params, SwitchLayer::Aggregation);

    let mut buckets = Vec::with_capacity(usize::from(params.aggregation_uplinks()));
    for uplink in 0..params.aggregation_uplinks() {
        let port = require_port(&identity, &layout, PortRole::Core, u16::from(uplink))?;
        buckets.push(Bucket::to_port(port, None));
    }
    let mut group = MultipathGroup::new(buckets);
    prune_group(&identity, &mut group, policy)?;

    let steering = steering_rules(&identity, &layout, policy, false)?;

    let mut routing = Vec::with_capacity(usize::from(params.edge_per_pod()) + 1);
    for edge in 0..params.edge_per_pod() {
        let port = require_port(&identity, &layout, PortRole::Edge, u16::from(edge))?;
        routing.push(FlowRule::new(
            priority::DESTINATION,
            FlowMatch::any().eth_dst(MacPrefix::edge_hosts(pod, edge)),
            Instruction::output(port),
        ));
    }
    routing.push(FlowRule::new(
        priority::DEFAULT,
        FlowMatch::any(),
        Instruction::group(GroupId::MULTIPATH),
    ));

    Ok(TableProgram {
        identity,
        steering,
        routing,
        group: Some(group),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_types::{DatapathId, PortNo};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_k4_aggregation() {
        let params = TopologyParameters::new(4).unwrap();
        let program = build_aggregation(1, 0, &params, &RoutingPolicy::default()).unwrap();

        let group = program.group.as_ref().unwrap();
        assert_eq!(group.ports(), vec![PortNo::new(1), PortNo::new(2)]);
        assert!(group.buckets.iter().all(|b| b.source_rewrite().is_none()));

        assert_eq!(
            program.routing,
            vec![
                FlowRule::new(
                    2,
                    FlowMatch::any().eth_dst(MacPrefix::edge_hosts(1, 0)),
                    Instruction::output(PortNo::new(3))
                ),
                FlowRule::new(
                    2,
                    FlowMatch::any().eth_dst(MacPrefix::edge_hosts(1, 1)),
                    Instruction::output(PortNo::new(4))
                ),
                FlowRule::new(1, FlowMatch::any(), Instruction::group(GroupId::MULTIPATH)),
            ]
        );
    }

    #[test]
    fn test_bucket_count_is_half_k() {
        for k in (2..=12).step_by(2) {
            let params = TopologyParameters::new(k).unwrap();
            let program = build_aggregation(0, 0, &params, &RoutingPolicy::default()).unwrap();
            assert_eq!(program.bucket_count(), usize::from(k / 2));
        }
    }

    #[test]
    fn test_range_checks() {
        let params = TopologyParameters::new(4).unwrap();
        let policy = RoutingPolicy::default();
        assert!(build_aggregation(4, 0, &params, &policy).is_err());
        assert!(build_aggregation(0, 2, &params, &policy).is_err());
    }

    #[test]
    fn test_pruning_removes_only_that_bucket() {
        let params = TopologyParameters::new(8).unwrap();
        let full = build_aggregation(2, 1, &params, &RoutingPolicy::default()).unwrap();

        let mut policy = RoutingPolicy::default();
        policy
            .pruned_uplinks
            .insert(DatapathId::new(0x010201), vec![PortNo::new(3)]);
        let pruned = build_aggregation(2, 1, &params, &policy).unwrap();

        let mut expected = full.group.clone().unwrap();
        expected.buckets.remove(2);
        assert_eq!(pruned.group, Some(expected));
        assert_eq!(pruned.steering, full.steering);
        assert_eq!(pruned.routing, full.routing);
    }

    #[test]
    fn test_pruning_downlink_rejected() {
        let params = TopologyParameters::new(4).unwrap();
        let mut policy = RoutingPolicy::default();
        policy
            .pruned_uplinks
            .insert(DatapathId::new(0x010000), vec![PortNo::new(3)]);
        assert!(build_aggregation(0, 0, &params, &policy).is_err());

        policy.pruned_uplinks.insert(
            DatapathId::new(0x010000),
            vec![PortNo::new(1), PortNo::new(2)],
        );
        assert!(build_aggregation(0, 0, &params, &policy).is_err());
    }
}
