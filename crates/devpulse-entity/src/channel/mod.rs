//! Channel entities.

pub mod member;
pub mod model;

pub use member::{ChannelMember, ChannelRole};
pub use model::Channel;
