//! Edge switch program.

use fabric_flow::{Bucket, FlowMatch, FlowRule, GroupId, Instruction, MultipathGroup};
use fabric_types::{
    edge_source_rewrite, host_link_address, HostAddress, PortRole, SwitchIdentity, SwitchLayer,
    TopologyParameters,
};

use super::steering::steering_rules;
use super::{check_range, priority, prune_group, require_port, RoutingPolicy, TableProgram};
use crate::error::Result;

/// Builds the program for edge switch `index` of `pod`.
///
/// Attached hosts are matched exactly. Everything else goes up to the
/// pod's aggregation switches with the source rewritten to the edge
/// switch's tag. ARP is punted to the controller.
pub fn build_edge(
    pod: u8,
    index: u8,
    params: &TopologyParameters,
    policy: &RoutingPolicy,
) -> Result<TableProgram> {
    let identity = SwitchIdentity::Edge { pod, index };
    check_range(&identity, "pod", pod, 0, params.pods())?;
    check_range(&identity, "edge index", index, 0, params.edge_per_pod())?;

    let layout = policy.port_layout(params, SwitchLayer::Edge);
    let rewrite = edge_source_rewrite(pod, index);

    // Ascending uplink order, equal weights
    let mut buckets = Vec::with_capacity(usize::from(params.edge_uplinks()));
    for uplink in 0..params.edge_uplinks() {
        let port = require_port(&identity, &layout, PortRole::Aggregation, u16::from(uplink))?;
        buckets.push(Bucket::to_port(port, Some(rewrite)));
    }
    let mut group = MultipathGroup::new(buckets);
    prune_group(&identity, &mut group, policy)?;

    let steering = steering_rules(&identity, &layout, policy, true)?;

    let mut routing = Vec::with_capacity(usize::from(params.hosts_per_edge()) + 1);
    for host in 0..params.hosts_per_edge() {
        let port = require_port(&identity, &layout, PortRole::Host, u16::from(host))?;
        let mac = host_link_address(HostAddress::fabric(pod, index, host));
        routing.push(FlowRule::new(
            priority::DESTINATION,
            FlowMatch::any().eth_dst(mac),
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
