//! Verification helpers for programmed switches
//!
//! Assertions over a [`SwitchTables`] snapshot that report what was
//! expected instead of dumping whole tables.

use fabric_flow::{FlowMatch, FlowRule, GroupId, Instruction, TableId};
use fabric_types::{DatapathId, PortNo};
use thiserror::Error;

use crate::SwitchTables;

/// Verification error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("switch {dpid}: no rule at priority {priority} matching {flow_match} in table {table_id}")]
    RuleNotFound {
        dpid: DatapathId,
        table_id: TableId,
        priority: u16,
        flow_match: String,
    },

    #[error("switch {dpid}: expected {expected} rules in table {table_id}, found {actual}")]
    RuleCountMismatch {
        dpid: DatapathId,
        table_id: TableId,
        expected: usize,
        actual: usize,
    },

    #[error("switch {dpid}: expected group ports {expected:?}, found {actual:?}")]
    GroupMismatch {
        dpid: DatapathId,
        expected: Vec<PortNo>,
        actual: Vec<PortNo>,
    },

    #[error("switch {dpid}: catch-all at priority {catch_all} in table {table_id} is not below priority {specific}")]
    PriorityInversion {
        dpid: DatapathId,
        table_id: TableId,
        catch_all: u16,
        specific: u16,
    },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Flow-table verifier for one switch
pub struct TableVerifier<'a> {
    dpid: DatapathId,
    tables: &'a SwitchTables,
}

impl<'a> TableVerifier<'a> {
    pub fn new(dpid: DatapathId, tables: &'a SwitchTables) -> Self {
        Self { dpid, tables }
    }

    /// Verify the number of rules in a table
    pub fn assert_rule_count(&self, table_id: TableId, expected: usize) -> VerifyResult<()> {
        let actual = self.tables.rules(table_id).len();
        if actual != expected {
            return Err(VerificationError::RuleCountMismatch {
                dpid: self.dpid,
                table_id,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Verify a rule exists and return its instruction
    pub fn assert_rule(
        &self,
        table_id: TableId,
        priority: u16,
        flow_match: &FlowMatch,
    ) -> VerifyResult<Instruction> {
        self.tables
            .rules(table_id)
            .into_iter()
            .find(|rule| rule.priority == priority && rule.flow_match == *flow_match)
            .map(|rule| rule.instruction)
            .ok_or_else(|| VerificationError::RuleNotFound {
                dpid: self.dpid,
                table_id,
                priority,
                flow_match: flow_match.to_string(),
            })
    }

    /// Verify the multipath group outputs to exactly `expected`, in order
    pub fn assert_group_ports(&self, expected: &[PortNo]) -> VerifyResult<()> {
        let actual = self
            .tables
            .group(GroupId::MULTIPATH)
            .map(|group| group.ports())
            .unwrap_or_default();
        if actual != expected {
            return Err(VerificationError::GroupMismatch {
                dpid: self.dpid,
                expected: expected.to_vec(),
                actual,
            });
        }
        Ok(())
    }

    /// Verify every catch-all rule sits below every specific rule
    pub fn assert_catch_all_lowest(&self, table_id: TableId) -> VerifyResult<()> {
        let rules = self.tables.rules(table_id);
        let (catch_all, specific): (Vec<&FlowRule>, Vec<&FlowRule>) =
            rules.iter().partition(|rule| rule.flow_match.is_catch_all());

        for low in &catch_all {
            for high in &specific {
                if low.priority >= high.priority {
                    return Err(VerificationError::PriorityInversion {
                        dpid: self.dpid,
                        table_id,
                        catch_all: low.priority,
                        specific: high.priority,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_flow::FlowCommand;

    #[test]
    fn test_priority_inversion_detected() {
        let mut tables = SwitchTables::new();
        for (priority, m) in [
            (2, FlowMatch::any()),
            (2, FlowMatch::any().in_port(PortNo::new(1))),
        ] {
            tables
                .apply(&FlowCommand::InstallRule {
                    table_id: TableId::ROUTING,
                    rule: FlowRule::new(priority, m, Instruction::output(PortNo::new(1))),
                })
                .unwrap();
        }

        let verifier = TableVerifier::new(DatapathId::new(1), &tables);
        assert!(verifier.assert_rule_count(TableId::ROUTING, 2).is_ok());
        assert!(matches!(
            verifier.assert_catch_all_lowest(TableId::ROUTING),
            Err(VerificationError::PriorityInversion { .. })
        ));
        assert!(verifier.assert_group_ports(&[]).is_ok());
    }
}
