//! User entities.

pub mod model;

pub use model::{GuestUser, IdentityProfile, User};
