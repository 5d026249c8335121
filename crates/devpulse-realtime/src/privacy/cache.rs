//! Read-through cache of target visibility data.
//!
//! The egress path consults this on every presence delivery, so the
//! store is shielded by a short-TTL moka cache. Local preference
//! changes invalidate immediately; remote-replica changes converge
//! within the TTL.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use devpulse_core::{AppError, AppResult};
use devpulse_entity::store::UserStore;

use super::filter::TargetVisibility;

/// Username → visibility data cache over the user store.
#[derive(Debug)]
pub struct VisibilityCache {
    cache: Cache<String, Arc<TargetVisibility>>,
    users: Arc<dyn UserStore>,
}

impl VisibilityCache {
    /// Creates a new cache with the given entry TTL.
    pub fn new(users: Arc<dyn UserStore>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(ttl)
            .build();
        Self { cache, users }
    }

    /// Loads visibility data for a target username.
    ///
    /// Unknown usernames and guests resolve to default-everyone with an
    /// empty graph.
    pub async fn get(&self, username: &str) -> AppResult<Arc<TargetVisibility>> {
        let users = self.users.clone();
        let name = username.to_string();
        self.cache
            .try_get_with(username.to_string(), async move {
                load_visibility(users, &name).await.map(Arc::new)
            })
            .await
            .map_err(|e: Arc<AppError>| (*e).clone())
    }

    /// Drops the cached entry for a username (after a local prefs change).
    pub async fn invalidate(&self, username: &str) {
        self.cache.invalidate(username).await;
    }
}

async fn load_visibility(
    users: Arc<dyn UserStore>,
    username: &str,
) -> AppResult<TargetVisibility> {
    match users.find_by_username(username).await? {
        Some(user) => {
            let prefs = users.preferences(user.identity_id).await?;
            Ok(TargetVisibility {
                identity_id: Some(user.identity_id),
                prefs,
                followers: HashSet::from_iter(user.followers.iter().copied()),
                following: HashSet::from_iter(user.following.iter().copied()),
                close_friends: HashSet::from_iter(user.close_friends.iter().copied()),
            })
        }
        None => Ok(TargetVisibility::guest()),
    }
}
