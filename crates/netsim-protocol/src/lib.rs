//! Wire types shared by the NetSim relay server and its clients.

pub mod limits;
pub mod messages;
pub mod types;

pub use messages::{ClientMessage, ServerMessage};
pub use types::*;
