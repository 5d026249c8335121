//! GitHub-backed identity adapter.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use devpulse_core::config::IdentityConfig;
use devpulse_core::{AppError, AppResult};
use devpulse_entity::user::IdentityProfile;

use super::IdentityProvider;

/// Page size for follower/following listings.
const PER_PAGE: usize = 100;
/// Upper bound on pages fetched per listing.
const MAX_PAGES: usize = 10;

/// Identity adapter over the GitHub REST API.
#[derive(Debug)]
pub struct GitHubIdentityProvider {
    http: reqwest::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEdge {
    id: i64,
}

impl GitHubIdentityProvider {
    /// Builds the adapter with the configured request timeout.
    pub fn new(config: &IdentityConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(
                config.request_timeout_seconds,
            ))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                AppError::with_source(
                    devpulse_core::ErrorKind::Configuration,
                    "Failed to build identity HTTP client",
                    e,
                )
            })?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
    ) -> AppResult<T> {
        let response = self
            .http
            .get(format!("{}{path}", self.api_base))
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    devpulse_core::ErrorKind::ExternalService,
                    "Identity provider unreachable",
                    e,
                )
            })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AppError::auth_failure("Invalid access token"));
        }
        if !response.status().is_success() {
            return Err(AppError::external(format!(
                "Identity provider returned {}",
                response.status()
            )));
        }

        response.json().await.map_err(|e| {
            AppError::with_source(
                devpulse_core::ErrorKind::ExternalService,
                "Invalid identity provider response",
                e,
            )
        })
    }

    async fn fetch_edges(&self, path: &str, token: &str) -> AppResult<Vec<i64>> {
        let mut ids = Vec::new();
        for page in 1..=MAX_PAGES {
            let batch: Vec<GitHubEdge> = self
                .get_json(&format!("{path}?per_page={PER_PAGE}&page={page}"), token)
                .await?;
            let len = batch.len();
            ids.extend(batch.into_iter().map(|e| e.id));
            if len < PER_PAGE {
                break;
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl IdentityProvider for GitHubIdentityProvider {
    async fn fetch_profile(&self, access_token: &str) -> AppResult<IdentityProfile> {
        let user: GitHubUser = self.get_json("/user", access_token).await?;
        let followers = self.fetch_edges("/user/followers", access_token).await?;
        let following = self.fetch_edges("/user/following", access_token).await?;

        debug!(
            login = %user.login,
            followers = followers.len(),
            following = following.len(),
            "Fetched identity profile"
        );

        Ok(IdentityProfile {
            identity_id: user.id,
            username: user.login,
            avatar_url: user.avatar_url,
            followers,
            following,
        })
    }
}
