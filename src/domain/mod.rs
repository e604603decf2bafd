//! Domain models for protocol classification.
//!
//! These types carry no capture or broker concerns.

mod events;
mod packet;
mod protocol;

pub use events::{ClassificationEvent, Direction};
pub use packet::{HeaderFlags, RawPacket};
pub use protocol::ProtocolLabel;

#[cfg(test)]
pub(crate) use packet::frames;
