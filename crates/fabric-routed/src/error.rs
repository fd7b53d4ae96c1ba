//! Error types for the fabric controller.

use fabric_flow::TransportError;
use fabric_types::{DatapathId, ParseError, SwitchIdentity};
use thiserror::Error;

/// Errors raised while programming switches or answering packets.
#[derive(Debug, Error)]
pub enum FabricError {
    /// The identifier carries a layer tag the fabric does not use.
    #[error("datapath {dpid} has unknown layer tag {tag}")]
    UnknownLayer { dpid: DatapathId, tag: u8 },

    /// The identifier has bits set outside the layer/pod/index fields.
    #[error("datapath {0} is not a valid fabric identifier")]
    InvalidIdentifier(DatapathId),

    /// The switch does not fit the configured topology.
    #[error("inconsistent topology for {switch}: {reason}")]
    InconsistentTopology { switch: String, reason: String },

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FabricError {
    pub fn inconsistent(identity: &SwitchIdentity, reason: impl Into<String>) -> Self {
        Self::InconsistentTopology {
            switch: identity.to_string(),
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPacket(reason.into())
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    /// Errors after which the switch is left unprogrammed until it reconnects.
    pub fn leaves_switch_unprogrammed(&self) -> bool {
        matches!(
            self,
            Self::UnknownLayer { .. }
                | Self::InvalidIdentifier(_)
                | Self::InconsistentTopology { .. }
                | Self::Transport(_)
        )
    }
}

impl From<ParseError> for FabricError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::UnknownLayer { dpid, tag } => Self::UnknownLayer { dpid, tag },
            ParseError::InvalidIdentifier(dpid) => Self::InvalidIdentifier(dpid),
            ParseError::InvalidFanout(_) => Self::Config(e.to_string()),
            ParseError::InvalidMacAddress(_)
            | ParseError::InvalidIpAddress(_)
            | ParseError::InvalidHostAddress(_) => Self::MalformedPacket(e.to_string()),
        }
    }
}

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, FabricError>;
