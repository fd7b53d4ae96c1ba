//! Outbound switch mutation commands.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{FlowMatch, FlowRule, GroupId, MultipathGroup, OutputPort, TableId};

/// A single mutation sent to one switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FlowCommand {
    /// Adds `rule` to `table_id`, replacing any rule with the same priority
    /// and match.
    InstallRule { table_id: TableId, rule: FlowRule },

    /// Deletes every rule in `table_id` whose match `flow_match` covers.
    ClearTable {
        table_id: TableId,
        #[serde(rename = "match")]
        flow_match: FlowMatch,
    },

    InstallGroup { group: MultipathGroup },

    /// Deletes a group. Deleting a missing group is not an error.
    DeleteGroup { group_id: GroupId },

    /// Emits `payload` on `out_port` (packet-out).
    SendPacket { payload: Vec<u8>, out_port: OutputPort },
}

impl FlowCommand {
    pub fn clear_table(table_id: TableId) -> Self {
        FlowCommand::ClearTable {
            table_id,
            flow_match: FlowMatch::any(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FlowCommand::InstallRule { .. } => "install_rule",
            FlowCommand::ClearTable { .. } => "clear_table",
            FlowCommand::InstallGroup { .. } => "install_group",
            FlowCommand::DeleteGroup { .. } => "delete_group",
            FlowCommand::SendPacket { .. } => "send_packet",
        }
    }
}

impl fmt::Display for FlowCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowCommand::InstallRule { table_id, rule } => write!(
                f,
                "install table={} priority={} match={}",
                table_id, rule.priority, rule.flow_match
            ),
            FlowCommand::ClearTable {
                table_id,
                flow_match,
            } => write!(f, "clear table={} match={}", table_id, flow_match),
            FlowCommand::InstallGroup { group } => write!(
                f,
                "install group={} buckets={}",
                group.group_id,
                group.buckets.len()
            ),
            FlowCommand::DeleteGroup { group_id } => write!(f, "delete group={}", group_id),
            FlowCommand::SendPacket { payload, out_port } => {
                write!(f, "packet-out port={} bytes={}", out_port, payload.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Instruction;
    use fabric_types::PortNo;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display() {
        assert_eq!(
            FlowCommand::clear_table(TableId::ROUTING).to_string(),
            "clear table=1 match=*"
        );
        let rule = FlowRule::new(
            3,
            FlowMatch::any().in_port(PortNo::new(6)),
            Instruction::goto(TableId::ROUTING),
        );
        assert_eq!(
            FlowCommand::InstallRule {
                table_id: TableId::STEERING,
                rule
            }
            .to_string(),
            "install table=0 priority=3 match=in_port=6"
        );
    }

    #[test]
    fn test_json_shape() {
        let command = FlowCommand::SendPacket {
            payload: vec![1, 2],
            out_port: OutputPort::Physical(PortNo::new(3)),
        };
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "op": "send_packet",
                "payload": [1, 2],
                "out_port": { "physical": 3 }
            })
        );
        let back: FlowCommand = serde_json::from_value(json).unwrap();
        assert_eq!(back, command);
    }
}
