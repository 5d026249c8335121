//! Shared kernel for the devpulse presence backend.
//!
//! Contains the unified error type, the configuration schemas, and the
//! provider traits (cache, pub/sub) that decouple the realtime engine
//! from concrete Redis/Postgres backends.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
