//! Connection lifecycle: handles and window sets.

pub mod handle;
pub mod pool;

pub use handle::{ConnectionHandle, ConnectionId, SessionState};
pub use pool::ConnectionPool;
