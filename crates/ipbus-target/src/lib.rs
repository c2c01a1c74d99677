//! Sessions with IPbus targets.
//!
//! This is the layer applications talk to. A [`Session`] owns the socket,
//! tracks whether the target is online and serializes every exchange. A
//! [`Target`] pairs a session with a [`Device`] whose `sync` hook runs after
//! successful writes and on each [`Heartbeat`] tick.

pub mod config;
pub mod error;
pub mod heartbeat;
pub mod session;
pub mod sim;
pub mod status;
pub mod target;

pub use config::{TargetConfig, DEFAULT_ADDRESS, DEFAULT_PORT};
pub use error::{Result, TargetError};
pub use heartbeat::Heartbeat;
pub use session::Session;
pub use sim::{RegisterMap, SimulatedTarget};
pub use status::StatusReport;
pub use target::{Device, NoSync, Target};
