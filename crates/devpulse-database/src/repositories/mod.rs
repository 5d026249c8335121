//! Repository implementations over the PostgreSQL pool.

pub mod channel;
pub mod user;

pub use channel::ChannelRepository;
pub use user::UserRepository;
