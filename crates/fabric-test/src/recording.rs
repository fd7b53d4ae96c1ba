//! Recording datapath transport
//!
//! Keeps one [`SwitchTables`] per datapath, applies every command it is
//! sent, and logs the command stream. Disconnects can be injected
//! immediately or after a number of further commands.

use async_trait::async_trait;
use fabric_flow::{DatapathTransport, FlowCommand, TransportError, TransportResult};
use fabric_types::DatapathId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::SwitchTables;

#[derive(Debug, Default)]
struct RecordingState {
    switches: HashMap<DatapathId, SwitchTables>,
    log: Vec<(DatapathId, FlowCommand)>,
    disconnected: HashSet<DatapathId>,
    /// Commands each datapath still accepts before dropping its connection
    budget: HashMap<DatapathId, usize>,
}

/// Transport that applies commands to in-memory switches
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        // A panic in another test thread must not hide this one's state
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop the connection now
    pub fn disconnect(&self, dpid: DatapathId) {
        self.lock().disconnected.insert(dpid);
    }

    /// Accept `commands` more commands, then drop the connection
    pub fn disconnect_after(&self, dpid: DatapathId, commands: usize) {
        self.lock().budget.insert(dpid, commands);
    }

    /// Restore the connection; the switch keeps its tables
    pub fn reconnect(&self, dpid: DatapathId) {
        let mut state = self.lock();
        state.disconnected.remove(&dpid);
        state.budget.remove(&dpid);
    }

    /// Snapshot of a switch's tables
    pub fn switch(&self, dpid: DatapathId) -> Option<SwitchTables> {
        self.lock().switches.get(&dpid).cloned()
    }

    /// Snapshot of every switch that has received a command
    pub fn switches(&self) -> HashMap<DatapathId, SwitchTables> {
        self.lock().switches.clone()
    }

    /// Full command log in send order
    pub fn commands(&self) -> Vec<(DatapathId, FlowCommand)> {
        self.lock().log.clone()
    }

    /// Commands sent to one datapath, in order
    pub fn commands_for(&self, dpid: DatapathId) -> Vec<FlowCommand> {
        self.lock()
            .log
            .iter()
            .filter(|(d, _)| *d == dpid)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }
}

#[async_trait]
impl DatapathTransport for RecordingTransport {
    async fn send(&self, dpid: DatapathId, command: FlowCommand) -> TransportResult<()> {
        let mut state = self.lock();

        if let Some(remaining) = state.budget.get_mut(&dpid) {
            if *remaining == 0 {
                state.budget.remove(&dpid);
                state.disconnected.insert(dpid);
            } else {
                *remaining -= 1;
            }
        }

        if state.disconnected.contains(&dpid) {
            debug!(%dpid, command = command.kind(), "recording transport: dropped, disconnected");
            return Err(TransportError::Disconnected { dpid });
        }

        state
            .switches
            .entry(dpid)
            .or_default()
            .apply(&command)
            .map_err(|e| TransportError::rejected(dpid, e.to_string()))?;
        state.log.push((dpid, command));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_flow::{GroupId, TableId};
    use pretty_assertions::assert_eq;

    const DPID: DatapathId = DatapathId::new(0x020100);

    #[tokio::test]
    async fn test_records_and_applies() {
        let transport = RecordingTransport::new();
        transport
            .send(DPID, FlowCommand::clear_table(TableId::STEERING))
            .await
            .unwrap();

        assert_eq!(transport.commands_for(DPID).len(), 1);
        assert_eq!(transport.switch(DPID).unwrap().rule_count(), 0);
        assert!(transport.switch(DatapathId::new(1)).is_none());
    }

    #[tokio::test]
    async fn test_disconnect_after_budget() {
        let transport = RecordingTransport::new();
        transport.disconnect_after(DPID, 2);

        let command = FlowCommand::DeleteGroup {
            group_id: GroupId::MULTIPATH,
        };
        assert!(transport.send(DPID, command.clone()).await.is_ok());
        assert!(transport.send(DPID, command.clone()).await.is_ok());
        assert_eq!(
            transport.send(DPID, command.clone()).await,
            Err(TransportError::Disconnected { dpid: DPID })
        );
        assert!(transport.send(DPID, command.clone()).await.is_err());

        transport.reconnect(DPID);
        assert!(transport.send(DPID, command).await.is_ok());
        assert_eq!(transport.commands_for(DPID).len(), 3);
    }

    #[tokio::test]
    async fn test_switch_rejection_is_reported() {
        use fabric_flow::{FlowMatch, FlowRule, Instruction};

        let transport = RecordingTransport::new();
        let result = transport
            .send(
                DPID,
                FlowCommand::InstallRule {
                    table_id: TableId::ROUTING,
                    rule: FlowRule::new(1, FlowMatch::any(), Instruction::group(GroupId::MULTIPATH)),
                },
            )
            .await;
        assert!(matches!(result, Err(TransportError::Rejected { .. })));
        assert!(transport.commands().is_empty());
    }
}
