//! Protocol classification module.
//!
//! Maps a captured packet to exactly one protocol label. Pure and
//! stateless; parsing and publishing live elsewhere.

mod protocol_classifier;

pub use protocol_classifier::classify;
