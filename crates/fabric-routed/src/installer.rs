//! Flow installer
//!
//! Turns a [`TableProgram`] into the command sequence that rebuilds a
//! switch from scratch. Every apply starts by wiping both tables and the
//! multipath group, so applying the same program twice leaves the switch in
//! the same state as applying it once.

use dashmap::DashMap;
use fabric_flow::{DatapathTransport, FlowCommand, GroupId, OutputPort, TableId};
use fabric_types::DatapathId;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::program::TableProgram;

/// Summary of one successful [`FlowInstaller::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub dpid: DatapathId,
    pub commands: usize,
    pub steering_rules: usize,
    pub routing_rules: usize,
    pub buckets: usize,
}

/// Sends table programs to switches.
pub struct FlowInstaller {
    transport: Arc<dyn DatapathTransport>,
    /// One apply in flight per datapath
    locks: DashMap<DatapathId, Arc<Mutex<()>>>,
}

impl FlowInstaller {
    pub fn new(transport: Arc<dyn DatapathTransport>) -> Self {
        Self {
            transport,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, dpid: DatapathId) -> Arc<Mutex<()>> {
        self.locks.entry(dpid).or_default().clone()
    }

    /// Replaces the switch's flow state with `program`.
    ///
    /// Order: clear steering, clear routing, delete group, install group,
    /// steering rules, routing rules. The group exists before any rule that
    /// points at it. A failed send stops the sequence and the partial state
    /// is left as is.
    #[instrument(skip(self, program), fields(switch = %program.identity))]
    pub async fn apply(&self, dpid: DatapathId, program: &TableProgram) -> Result<InstallReport> {
        let lock = self.lock_for(dpid);
        let _guard = lock.lock().await;

        let commands = Self::commands_for(program);
        let total = commands.len();

        for (sent, command) in commands.into_iter().enumerate() {
            debug!(%dpid, %command, "sending");
            if let Err(e) = self.transport.send(dpid, command).await {
                if e.is_disconnect() {
                    warn!(%dpid, sent, total, "switch disconnected, abandoning partial program");
                } else {
                    warn!(%dpid, sent, total, error = %e, "send failed, switch left partially programmed");
                }
                return Err(e.into());
            }
        }

        let report = InstallReport {
            dpid,
            commands: total,
            steering_rules: program.steering.len(),
            routing_rules: program.routing.len(),
            buckets: program.bucket_count(),
        };
        info!(
            %dpid,
            steering = report.steering_rules,
            routing = report.routing_rules,
            buckets = report.buckets,
            "switch programmed"
        );
        Ok(report)
    }

    /// Removes every rule from one table.
    #[instrument(skip(self))]
    pub async fn clear(&self, dpid: DatapathId, table_id: TableId) -> Result<()> {
        let lock = self.lock_for(dpid);
        let _guard = lock.lock().await;
        self.transport
            .send(dpid, FlowCommand::clear_table(table_id))
            .await?;
        Ok(())
    }

    /// Emits a frame out one port of the switch (packet-out).
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    pub async fn send_packet(
        &self,
        dpid: DatapathId,
        payload: Vec<u8>,
        out_port: OutputPort,
    ) -> Result<()> {
        self.transport
            .send(dpid, FlowCommand::SendPacket { payload, out_port })
            .await?;
        Ok(())
    }

    fn commands_for(program: &TableProgram) -> Vec<FlowCommand> {
        let mut commands = Vec::with_capacity(program.rule_count() + 4);
        commands.push(FlowCommand::clear_table(TableId::STEERING));
        commands.push(FlowCommand::clear_table(TableId::ROUTING));
        // Always delete; a reconnecting switch may still hold a stale group
        commands.push(FlowCommand::DeleteGroup {
            group_id: GroupId::MULTIPATH,
        });
        if let Some(group) = &program.group {
            commands.push(FlowCommand::InstallGroup {
                group: group.clone(),
            });
        }
        commands.extend(program.steering.iter().map(|rule| FlowCommand::InstallRule {
            table_id: TableId::STEERING,
            rule: rule.clone(),
        }));
        commands.extend(program.routing.iter().map(|rule| FlowCommand::InstallRule {
            table_id: TableId::ROUTING,
            rule: rule.clone(),
        }));
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FabricError;
    use crate::program::{build_edge, build_program, RoutingPolicy};
    use fabric_flow::TransportError;
    use fabric_test::{edge, k4, RecordingTransport};
    use fabric_types::SwitchIdentity;
    use pretty_assertions::assert_eq;

    fn installer() -> (FlowInstaller, RecordingTransport) {
        let transport = RecordingTransport::new();
        (FlowInstaller::new(Arc::new(transport.clone())), transport)
    }

    #[tokio::test]
    async fn test_command_order() {
        let (installer, transport) = installer();
        let program = build_edge(1, 0, &k4(), &RoutingPolicy::default()).unwrap();

        let report = installer.apply(edge(1, 0), &program).await.unwrap();
        let kinds: Vec<_> = transport
            .commands_for(edge(1, 0))
            .iter()
            .map(FlowCommand::kind)
            .collect();

        assert_eq!(&kinds[..4], &["clear_table", "clear_table", "delete_group", "install_group"]);
        assert!(kinds[4..].iter().all(|k| *k == "install_rule"));
        assert_eq!(report.commands, kinds.len());
        assert_eq!(report.steering_rules, 3);
        assert_eq!(report.routing_rules, 3);
        assert_eq!(report.buckets, 2);
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let (installer, transport) = installer();
        let identity = SwitchIdentity::Aggregation { pod: 3, index: 1 };
        let program = build_program(identity, &k4(), &RoutingPolicy::default(), None).unwrap();
        let dpid = identity.datapath_id();

        installer.apply(dpid, &program).await.unwrap();
        let once = transport.switch(dpid).unwrap();
        installer.apply(dpid, &program).await.unwrap();
        let twice = transport.switch(dpid).unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.rule_count(), program.rule_count());
    }

    #[tokio::test]
    async fn test_disconnect_abandons_apply() {
        let (installer, transport) = installer();
        let program = build_edge(0, 0, &k4(), &RoutingPolicy::default()).unwrap();
        transport.disconnect_after(edge(0, 0), 5);

        let err = installer.apply(edge(0, 0), &program).await.unwrap_err();
        assert!(matches!(
            err,
            FabricError::Transport(TransportError::Disconnected { .. })
        ));
        assert_eq!(transport.commands_for(edge(0, 0)).len(), 5);

        // Reconnect rebuilds from scratch
        transport.reconnect(edge(0, 0));
        installer.apply(edge(0, 0), &program).await.unwrap();
        assert_eq!(
            transport.switch(edge(0, 0)).unwrap().rule_count(),
            program.rule_count()
        );
    }

    #[tokio::test]
    async fn test_clear_one_table() {
        let (installer, transport) = installer();
        let program = build_edge(0, 1, &k4(), &RoutingPolicy::default()).unwrap();
        installer.apply(edge(0, 1), &program).await.unwrap();

        installer.clear(edge(0, 1), TableId::ROUTING).await.unwrap();
        let tables = transport.switch(edge(0, 1)).unwrap();
        assert!(tables.rules(TableId::ROUTING).is_empty());
        assert_eq!(tables.rules(TableId::STEERING).len(), program.steering.len());
    }
}
