//! Transport error types.

use fabric_types::DatapathId;
use thiserror::Error;

/// Failure reported by a [`DatapathTransport`](crate::DatapathTransport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The switch is no longer connected.
    #[error("datapath {dpid} disconnected")]
    Disconnected { dpid: DatapathId },

    /// The command could not be written to the switch connection.
    #[error("send to datapath {dpid} failed: {reason}")]
    SendFailed { dpid: DatapathId, reason: String },

    /// The transport could not express the command.
    #[error("command for datapath {dpid} rejected: {reason}")]
    Rejected { dpid: DatapathId, reason: String },
}

impl TransportError {
    pub fn send_failed(dpid: DatapathId, reason: impl Into<String>) -> Self {
        Self::SendFailed {
            dpid,
            reason: reason.into(),
        }
    }

    pub fn rejected(dpid: DatapathId, reason: impl Into<String>) -> Self {
        Self::Rejected {
            dpid,
            reason: reason.into(),
        }
    }

    pub fn dpid(&self) -> DatapathId {
        match self {
            Self::Disconnected { dpid }
            | Self::SendFailed { dpid, .. }
            | Self::Rejected { dpid, .. } => *dpid,
        }
    }

    /// A disconnect ends the session; the switch is rebuilt on reconnect.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
