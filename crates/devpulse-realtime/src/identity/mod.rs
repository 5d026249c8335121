//! Identity-provider adapter.
//!
//! Login with an access token delegates to this adapter for the
//! profile and social-graph snapshot. The engine only sees the trait;
//! the GitHub implementation lives in [`github`].

pub mod github;

use async_trait::async_trait;

use devpulse_core::AppResult;
use devpulse_entity::user::IdentityProfile;

pub use github::GitHubIdentityProvider;

/// Adapter to the external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Fetch the profile and follower/following graph for a token.
    ///
    /// Implementations enforce a bounded per-request timeout; exceeding
    /// it fails the login attempt gracefully.
    async fn fetch_profile(&self, access_token: &str) -> AppResult<IdentityProfile>;
}
