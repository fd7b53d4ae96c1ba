//! Newline-delimited JSON adapter
//!
//! The binary does not speak the switch wire protocol itself. A codec
//! process feeds it one [`ControllerEvent`] per line and reads back one
//! `{"dpid":…,"command":{…}}` object per line.

use async_trait::async_trait;
use fabric_flow::{DatapathTransport, FlowCommand, TransportError, TransportResult};
use fabric_types::DatapathId;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::controller::ControllerEvent;
use crate::error::Result;

#[derive(Serialize)]
struct OutboundLine<'a> {
    dpid: DatapathId,
    command: &'a FlowCommand,
}

/// Writes commands as JSON lines to any async writer.
pub struct JsonLinesTransport<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> DatapathTransport for JsonLinesTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, dpid: DatapathId, command: FlowCommand) -> TransportResult<()> {
        let mut line = serde_json::to_vec(&OutboundLine {
            dpid,
            command: &command,
        })
        .map_err(|e| TransportError::rejected(dpid, e.to_string()))?;
        line.push(b'\n');

        // One lock per line keeps concurrent switches from interleaving
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| TransportError::send_failed(dpid, e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| TransportError::send_failed(dpid, e.to_string()))?;
        Ok(())
    }
}

/// Forwards events read from `reader` into `events` until EOF.
///
/// Lines that do not parse are logged and skipped. Returns the number of
/// events forwarded; stops early if the receiving side has gone away.
pub async fn read_events<R>(reader: R, events: mpsc::Sender<ControllerEvent>) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    let mut forwarded = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: ControllerEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping malformed event");
                continue;
            }
        };

        if events.send(event).await.is_err() {
            debug!("event channel closed, stop reading");
            break;
        }
        forwarded += 1;
    }

    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_flow::{GroupId, TableId};
    use fabric_types::PortNo;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_command_lines() {
        let transport = JsonLinesTransport::new(Vec::new());
        transport
            .send(
                DatapathId::new(0x020100),
                FlowCommand::clear_table(TableId::ROUTING),
            )
            .await
            .unwrap();
        transport
            .send(
                DatapathId::new(1),
                FlowCommand::DeleteGroup {
                    group_id: GroupId::MULTIPATH,
                },
            )
            .await
            .unwrap();

        let output = String::from_utf8(transport.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["dpid"], json!(0x020100));
        assert_eq!(lines[0]["command"]["op"], json!("clear_table"));
        assert_eq!(
            lines[1],
            json!({"dpid": 1, "command": {"op": "delete_group", "group_id": 1}})
        );
    }

    #[tokio::test]
    async fn test_read_events_skips_garbage() {
        let input = concat!(
            "{\"type\":\"switch_connect\",\"dpid\":1}\n",
            "\n",
            "not json\n",
            "{\"type\":\"bogus\"}\n",
            "{\"type\":\"packet_in\",\"dpid\":196608,\"in_port\":5,\"payload\":[1,2]}\n",
        );
        let (tx, mut rx) = mpsc::channel(8);

        let forwarded = read_events(input.as_bytes(), tx).await.unwrap();
        assert_eq!(forwarded, 2);

        assert_eq!(
            rx.recv().await,
            Some(ControllerEvent::SwitchConnect {
                dpid: DatapathId::new(1),
                port_count: None
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(ControllerEvent::PacketIn {
                dpid: DatapathId::new(0x030000),
                in_port: PortNo::new(5),
                payload: vec![1, 2],
            })
        );
        assert_eq!(rx.recv().await, None);
    }
}
