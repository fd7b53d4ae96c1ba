//! Routing controller
//!
//! Reacts to the two events a switch produces: connecting, and punting a
//! packet. A connecting switch is decoded from its datapath id and rebuilt
//! from scratch; a punted ARP request is answered out its ingress port.

use fabric_flow::{DatapathTransport, OutputPort};
use fabric_types::{decode_switch, DatapathId, PortNo, TopologyParameters};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::arp::{ArpOutcome, ArpResponder};
use crate::error::{FabricError, Result};
use crate::installer::{FlowInstaller, InstallReport};
use crate::program::{build_program, RoutingPolicy};

/// Inbound switch event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerEvent {
    SwitchConnect {
        dpid: DatapathId,
        /// Port count the switch reported, if the transport knows it
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port_count: Option<u16>,
    },
    PacketIn {
        dpid: DatapathId,
        in_port: PortNo,
        payload: Vec<u8>,
    },
}

impl ControllerEvent {
    pub fn dpid(&self) -> DatapathId {
        match self {
            ControllerEvent::SwitchConnect { dpid, .. } | ControllerEvent::PacketIn { dpid, .. } => {
                *dpid
            }
        }
    }
}

/// What handling a packet-in did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketInOutcome {
    Replied { out_port: PortNo },
    Dropped,
}

pub struct RoutingController {
    params: TopologyParameters,
    policy: RoutingPolicy,
    installer: FlowInstaller,
    responder: ArpResponder,
}

impl RoutingController {
    pub fn new(
        params: TopologyParameters,
        policy: RoutingPolicy,
        transport: Arc<dyn DatapathTransport>,
    ) -> Self {
        Self {
            params,
            policy,
            installer: FlowInstaller::new(transport),
            responder: ArpResponder::new(),
        }
    }

    pub fn params(&self) -> &TopologyParameters {
        &self.params
    }

    /// Programs a newly connected switch.
    ///
    /// Nothing is sent when the identifier or port count does not fit the
    /// topology.
    #[instrument(skip(self))]
    pub async fn on_switch_connect(
        &self,
        dpid: DatapathId,
        port_count: Option<u16>,
    ) -> Result<InstallReport> {
        let identity = decode_switch(dpid)?;
        info!(%dpid, switch = %identity, layer = ?identity.layer(), "switch connected");

        let program = build_program(identity, &self.params, &self.policy, port_count)?;
        self.installer.apply(dpid, &program).await
    }

    /// Answers an ARP request punted by `dpid`; drops anything else.
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    pub async fn on_packet_in(
        &self,
        dpid: DatapathId,
        in_port: PortNo,
        payload: &[u8],
    ) -> Result<PacketInOutcome> {
        match self.responder.handle_request(payload, in_port)? {
            ArpOutcome::Reply(reply) => {
                let out_port = reply.out_port;
                self.installer
                    .send_packet(dpid, reply.payload, OutputPort::Physical(out_port))
                    .await?;
                Ok(PacketInOutcome::Replied { out_port })
            }
            ArpOutcome::Ignored(reason) => {
                debug!(%dpid, %in_port, %reason, "packet-in dropped");
                Ok(PacketInOutcome::Dropped)
            }
        }
    }

    /// Handles one event, logging any failure; the controller keeps running.
    pub async fn handle_event(&self, event: ControllerEvent) {
        let dpid = event.dpid();
        let result = match event {
            ControllerEvent::SwitchConnect { dpid, port_count } => {
                self.on_switch_connect(dpid, port_count).await.map(|_| ())
            }
            ControllerEvent::PacketIn {
                dpid,
                in_port,
                payload,
            } => self.on_packet_in(dpid, in_port, &payload).await.map(|_| ()),
        };

        if let Err(e) = result {
            log_failure(dpid, &e);
        }
    }
}

fn log_failure(dpid: DatapathId, e: &FabricError) {
    match e {
        FabricError::UnknownLayer { .. }
        | FabricError::InvalidIdentifier(_)
        | FabricError::InconsistentTopology { .. }
        | FabricError::Config(_) => {
            error!(%dpid, error = %e, "switch left unprogrammed");
        }
        FabricError::Transport(_) | FabricError::Io(_) => {
            warn!(%dpid, error = %e, "send to switch failed");
        }
        FabricError::MalformedPacket(_) => {
            debug!(%dpid, error = %e, "malformed packet dropped");
        }
    }
}
