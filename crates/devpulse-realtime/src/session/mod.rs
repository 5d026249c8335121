//! Session lifecycle: login, resume, initial sync, disconnect.

pub mod manager;

pub use manager::{ResumeRecord, SessionManager};
