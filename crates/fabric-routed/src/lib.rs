//! Fat-tree fabric routing controller
//!
//! Programs every switch of a K-ary fat tree from its datapath id alone.
//! Each switch gets a steering table and a routing table; upward traffic
//! is spread over a multipath group and ARP is answered by the controller
//! from the address plan, so nothing is ever learnt from the network.
//!
//! - [`program`]: pure per-layer table builders
//! - [`installer`]: clear-then-install command sequences
//! - [`arp`]: proxy ARP replies
//! - [`controller`]: connect and packet-in handling
//! - [`daemon`]: per-switch ordered event dispatch
//! - [`transport`]: JSON-lines adapter used by the binary

pub mod arp;
pub mod config;
pub mod controller;
pub mod daemon;
pub mod error;
pub mod installer;
pub mod program;
pub mod transport;

pub use config::FabricConfig;
pub use controller::{ControllerEvent, PacketInOutcome, RoutingController};
pub use daemon::{DaemonStats, FabricDaemon};
pub use error::{FabricError, Result};
pub use installer::{FlowInstaller, InstallReport};
pub use program::{build_program, RoutingPolicy, SteeringPolicy, TableProgram};
pub use transport::{read_events, JsonLinesTransport};
