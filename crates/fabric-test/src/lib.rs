//! Test infrastructure for the fabric controller
//!
//! Provides:
//! - An in-memory switch that applies flow commands the way a switch would
//! - A recording transport with disconnect injection
//! - The generator's wiring, for walking packets across the whole fabric
//! - Fixtures for identifiers and raw frames
//! - Flow-table verification helpers

pub mod fixtures;
mod recording;
mod switch;
mod verification;
mod wiring;

pub use fixtures::*;
pub use recording::RecordingTransport;
pub use switch::{Egress, SwitchError, SwitchTables};
pub use verification::*;
pub use wiring::{Endpoint, FabricWiring, Hop, Path, WalkError};
