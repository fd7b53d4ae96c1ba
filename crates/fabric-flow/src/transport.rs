//! The boundary between the controller and the switch connections.

use async_trait::async_trait;
use fabric_types::DatapathId;
use std::sync::Arc;

use crate::{FlowCommand, TransportResult};

/// Delivers commands to connected switches.
///
/// Sends are fire-and-forget: `Ok` means the command was handed to the
/// connection, not that the switch acknowledged it. Commands sent to one
/// datapath must reach it in the order they were sent.
#[async_trait]
pub trait DatapathTransport: Send + Sync {
    async fn send(&self, dpid: DatapathId, command: FlowCommand) -> TransportResult<()>;
}

#[async_trait]
impl<T: DatapathTransport + ?Sized> DatapathTransport for Arc<T> {
    async fn send(&self, dpid: DatapathId, command: FlowCommand) -> TransportResult<()> {
        (**self).send(dpid, command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GroupId, TransportError};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        sent: Mutex<Vec<(DatapathId, FlowCommand)>>,
    }

    #[async_trait]
    impl DatapathTransport for Collect {
        async fn send(&self, dpid: DatapathId, command: FlowCommand) -> TransportResult<()> {
            if dpid.as_u64() == 0 {
                return Err(TransportError::Disconnected { dpid });
            }
            self.sent.lock().unwrap().push((dpid, command));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_arc_forwards() {
        let inner = Arc::new(Collect::default());
        let transport: Arc<dyn DatapathTransport> = inner.clone();

        let command = FlowCommand::DeleteGroup {
            group_id: GroupId::MULTIPATH,
        };
        transport.send(DatapathId::new(1), command.clone()).await.unwrap();
        assert!(transport.send(DatapathId::new(0), command).await.is_err());
        assert_eq!(inner.sent.lock().unwrap().len(), 1);
    }
}
