//! Core switch program.
//!
//! One rule per pod toward that pod's aggregation switch. Everything
//! else leaves through the gateway port. Core switches have no group.

use fabric_flow::{FlowMatch, FlowRule, Instruction};
use fabric_types::{MacPrefix, PortRole, SwitchIdentity, SwitchLayer, TopologyParameters};

use super::steering::steering_rules;
use super::{check_range, priority, require_port, RoutingPolicy, TableProgram};
use crate::error::{FabricError, Result};

/// Builds the program for core switch `index` (1-based).
pub fn build_core(
    index: u8,
    params: &TopologyParameters,
    policy: &RoutingPolicy,
) -> Result<TableProgram> {
    let identity = SwitchIdentity::Core { index };
    check_range(
        &identity,
        "core index",
        index,
        1,
        params.core_switches().saturating_add(1),
    )?;
    if !policy.pruned(&identity).is_empty() {
        return Err(FabricError::inconsistent(
            &identity,
            "core switches have no multipath group to prune",
        ));
    }

    let layout = policy.port_layout(params, SwitchLayer::Core);
    let steering = steering_rules(&identity, &layout, policy, false)?;

    let mut routing = Vec::with_capacity(usize::from(params.pods()) + 1);
    for pod in 0..params.pods() {
        let port = require_port(&identity, &layout, PortRole::Pod, u16::from(pod))?;
        routing.push(FlowRule::new(
            priority::DESTINATION,
            FlowMatch::any().eth_dst(MacPrefix::pod_hosts(pod)),
            Instruction::output(port),
        ));
    }

    let gateway = require_port(&identity, &layout, PortRole::Gateway, 0)?;
    routing.push(FlowRule::new(
        priority::DEFAULT,
        FlowMatch::any(),
        Instruction::output(gateway),
    ));

    Ok(TableProgram {
        identity,
        steering,
        routing,
        group: None,
    })
}
