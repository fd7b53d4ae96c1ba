//! Gateway switch program.

use fabric_flow::{Bucket, FlowMatch, FlowRule, GroupId, Instruction, MultipathGroup};
use fabric_types::{
    host_link_address, HostAddress, PortRole, SwitchIdentity, SwitchLayer, TopologyParameters,
};

use super::steering::steering_rules;
use super::{check_range, priority, prune_group, require_port, RoutingPolicy, TableProgram};
use crate::error::Result;

/// Builds the program for the gateway.
///
/// External hosts are routed directly; all other traffic enters the fabric
/// through one of the core switches.
pub fn build_gateway(
    index: u8,
    params: &TopologyParameters,
    policy: &RoutingPolicy,
) -> Result<TableProgram> {
    let identity = SwitchIdentity::Gateway { index };
    check_range(&identity, "gateway index", index, 0, 1)?;

    let layout = policy.port_layout(params, SwitchLayer::Gateway);

    let mut buckets = Vec::with_capacity(usize::from(params.core_switches()));
    for uplink in 0..params.core_switches() {
        let port = require_port(&identity, &layout, PortRole::Core, u16::from(uplink))?;
        buckets.push(Bucket::to_port(port, None));
    }
    let mut group = MultipathGroup::new(buckets);
    prune_group(&identity, &mut group, policy)?;

    let steering = steering_rules(&identity, &layout, policy, true)?;

    let mut routing = Vec::with_capacity(policy.external_hosts.len() + 1);
    for (offset, host) in (0u16..).zip(&policy.external_hosts) {
        let port = require_port(&identity, &layout, PortRole::External, offset)?;
        routing.push(FlowRule::new(
            priority::EXTERNAL_HOST,
            FlowMatch::any().eth_dst(host_link_address(HostAddress::external(*host))),
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
