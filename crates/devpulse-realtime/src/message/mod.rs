//! Wire message definitions and codec.

pub mod codec;
pub mod types;

pub use types::{ClientMessage, CompactUser, ServerMessage};
