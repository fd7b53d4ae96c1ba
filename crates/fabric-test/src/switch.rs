//! In-memory switch flow state
//!
//! Applies [`FlowCommand`]s with the semantics a real switch gives them, so
//! tests can inspect the resulting tables and push packets through them.

use fabric_flow::{
    Action, FlowCommand, FlowMatch, FlowRule, GroupId, Instruction, MultipathGroup, OutputPort,
    PacketFields, TableId,
};
use fabric_types::PortNo;
use std::collections::BTreeMap;
use thiserror::Error;

/// Commands a switch would refuse
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwitchError {
    #[error("rule in table {table_id} references missing group {group_id}")]
    MissingGroup { table_id: TableId, group_id: GroupId },

    #[error("group {0} already exists")]
    GroupExists(GroupId),

    #[error("table {from} cannot jump to table {to}")]
    BadGoto { from: TableId, to: TableId },
}

/// Where a packet leaves the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Egress {
    /// Sent out a physical port, with any rewrites applied
    Port { port: PortNo, packet: PacketFields },
    /// Punted to the controller
    Controller { packet: PacketFields },
    /// No rule matched, or the group was missing
    Dropped { table_id: TableId },
}

type RuleKey = (u16, FlowMatch);

/// Flow tables, groups and emitted packets of one switch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchTables {
    tables: BTreeMap<TableId, BTreeMap<RuleKey, Instruction>>,
    groups: BTreeMap<GroupId, MultipathGroup>,
    packets_out: Vec<(OutputPort, Vec<u8>)>,
}

impl SwitchTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one command
    ///
    /// Rules are keyed by (priority, match); reinstalling replaces. Clearing
    /// removes every rule the clear match covers. Deleting a group also
    /// removes the rules that reference it.
    pub fn apply(&mut self, command: &FlowCommand) -> Result<(), SwitchError> {
        match command {
            FlowCommand::InstallRule { table_id, rule } => {
                self.check_instruction(*table_id, &rule.instruction)?;
                self.tables
                    .entry(*table_id)
                    .or_default()
                    .insert((rule.priority, rule.flow_match.clone()), rule.instruction.clone());
            }
            FlowCommand::ClearTable {
                table_id,
                flow_match,
            } => {
                if let Some(table) = self.tables.get_mut(table_id) {
                    table.retain(|(_, existing), _| !flow_match.covers(existing));
                }
            }
            FlowCommand::InstallGroup { group } => {
                if self.groups.contains_key(&group.group_id) {
                    return Err(SwitchError::GroupExists(group.group_id));
                }
                self.groups.insert(group.group_id, group.clone());
            }
            FlowCommand::DeleteGroup { group_id } => {
                if self.groups.remove(group_id).is_some() {
                    for table in self.tables.values_mut() {
                        table.retain(|_, instruction| !references_group(instruction, *group_id));
                    }
                }
            }
            FlowCommand::SendPacket { payload, out_port } => {
                self.packets_out.push((*out_port, payload.clone()));
            }
        }
        Ok(())
    }

    fn check_instruction(
        &self,
        table_id: TableId,
        instruction: &Instruction,
    ) -> Result<(), SwitchError> {
        match instruction {
            Instruction::GotoTable { table_id: to } if *to <= table_id => {
                Err(SwitchError::BadGoto {
                    from: table_id,
                    to: *to,
                })
            }
            Instruction::GotoTable { .. } => Ok(()),
            Instruction::ApplyActions { actions } => {
                for action in actions {
                    if let Action::Group { group_id } = action {
                        if !self.groups.contains_key(group_id) {
                            return Err(SwitchError::MissingGroup {
                                table_id,
                                group_id: *group_id,
                            });
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Rules of `table_id`, highest priority first
    pub fn rules(&self, table_id: TableId) -> Vec<FlowRule> {
        self.tables
            .get(&table_id)
            .map(|table| {
                table
                    .iter()
                    .rev()
                    .map(|((priority, flow_match), instruction)| {
                        FlowRule::new(*priority, flow_match.clone(), instruction.clone())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn rule_count(&self) -> usize {
        self.tables.values().map(|table| table.len()).sum()
    }

    pub fn group(&self, group_id: GroupId) -> Option<&MultipathGroup> {
        self.groups.get(&group_id)
    }

    pub fn packets_out(&self) -> &[(OutputPort, Vec<u8>)] {
        &self.packets_out
    }

    /// Highest-priority rule of `table_id` matching `packet`
    pub fn lookup(&self, table_id: TableId, packet: &PacketFields) -> Option<FlowRule> {
        self.rules(table_id)
            .into_iter()
            .find(|rule| rule.flow_match.matches(packet))
    }

    /// Run `packet` through the pipeline from the first table
    ///
    /// A select group yields one egress per bucket; each is an alternative
    /// the switch may pick.
    pub fn process(&self, packet: &PacketFields) -> Vec<Egress> {
        let mut table_id = TableId::STEERING;
        loop {
            let Some(rule) = self.lookup(table_id, packet) else {
                return vec![Egress::Dropped { table_id }];
            };
            match rule.instruction {
                Instruction::GotoTable { table_id: next } => table_id = next,
                Instruction::ApplyActions { actions } => {
                    return self.run_actions(table_id, &actions, *packet);
                }
            }
        }
    }

    fn run_actions(
        &self,
        table_id: TableId,
        actions: &[Action],
        mut packet: PacketFields,
    ) -> Vec<Egress> {
        let mut egress = Vec::new();
        for action in actions {
            match action {
                Action::SetEthSrc { address } => packet.eth_src = *address,
                Action::Output { port } => egress.push(output(*port, packet)),
                Action::Group { group_id } => match self.groups.get(group_id) {
                    Some(group) => {
                        for bucket in &group.buckets {
                            egress.extend(self.run_actions(table_id, &bucket.actions, packet));
                        }
                    }
                    None => egress.push(Egress::Dropped { table_id }),
                },
            }
        }
        egress
    }
}

fn output(port: OutputPort, packet: PacketFields) -> Egress {
    match port {
        OutputPort::Physical(port) => Egress::Port { port, packet },
        OutputPort::Controller => Egress::Controller { packet },
    }
}

fn references_group(instruction: &Instruction, group_id: GroupId) -> bool {
    match instruction {
        Instruction::ApplyActions { actions } => actions
            .iter()
            .any(|action| matches!(action, Action::Group { group_id: g } if *g == group_id)),
        Instruction::GotoTable { .. } => false,
    }
}
