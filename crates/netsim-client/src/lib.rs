//! NetSim headless client
//!
//! Creates or joins a relay room, then plays the sender or receiver side of
//! the OSI layer simulation over the event channel.

pub mod error;
pub mod network;
pub mod session;
pub mod simulation;
