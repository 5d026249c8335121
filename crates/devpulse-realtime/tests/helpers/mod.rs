//! Test harness: in-memory stores, a static identity adapter, and a
//! client driver over the engine's transport interface.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use devpulse_cache::BrokerManager;
use devpulse_core::config::{CacheConfig, RealtimeConfig};
use devpulse_core::{AppError, AppResult};
use devpulse_entity::channel::{Channel, ChannelMember, ChannelRole};
use devpulse_entity::preferences::{Preferences, PreferencesUpdate};
use devpulse_entity::store::{ChannelStore, UserStore};
use devpulse_entity::user::{IdentityProfile, User};
use devpulse_realtime::RealtimeEngine;
use devpulse_realtime::connection::handle::ConnectionHandle;
use devpulse_realtime::identity::IdentityProvider;

/// In-memory user store.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<i64, User>>,
    prefs: Mutex<HashMap<i64, Preferences>>,
    guests: Mutex<HashSet<String>>,
}

impl MemoryUserStore {
    pub fn seed_user(&self, user: User) {
        self.users.lock().unwrap().insert(user.identity_id, user);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn upsert_user(&self, profile: &IdentityProfile) -> AppResult<User> {
        // The identity claim releases any guest registration of the name.
        self.guests.lock().unwrap().remove(&profile.username);
        let mut users = self.users.lock().unwrap();
        let user = users
            .entry(profile.identity_id)
            .and_modify(|u| {
                u.username = profile.username.clone();
                u.avatar_url = profile.avatar_url.clone();
                u.followers = profile.followers.clone();
                u.following = profile.following.clone();
            })
            .or_insert_with(|| User {
                identity_id: profile.identity_id,
                username: profile.username.clone(),
                avatar_url: profile.avatar_url.clone(),
                followers: profile.followers.clone(),
                following: profile.following.clone(),
                close_friends: Vec::new(),
                last_seen_ms: 0,
                created_at: Utc::now(),
            });
        Ok(user.clone())
    }

    async fn find_by_identity(&self, identity_id: i64) -> AppResult<Option<User>> {
        Ok(self.users.lock().unwrap().get(&identity_id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn usernames_for(&self, identity_ids: &[i64]) -> AppResult<Vec<String>> {
        let users = self.users.lock().unwrap();
        Ok(identity_ids
            .iter()
            .filter_map(|id| users.get(id).map(|u| u.username.clone()))
            .collect())
    }

    async fn update_last_seen(&self, username: &str, last_seen_ms: i64) -> AppResult<()> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.values_mut().find(|u| u.username == username) {
            user.last_seen_ms = last_seen_ms;
        }
        Ok(())
    }

    async fn preferences(&self, identity_id: i64) -> AppResult<Preferences> {
        Ok(self
            .prefs
            .lock()
            .unwrap()
            .get(&identity_id)
            .copied()
            .unwrap_or_default())
    }

    async fn update_preferences(
        &self,
        identity_id: i64,
        update: &PreferencesUpdate,
    ) -> AppResult<Preferences> {
        let mut prefs = self.prefs.lock().unwrap();
        let merged = prefs
            .get(&identity_id)
            .copied()
            .unwrap_or_default()
            .merged(update);
        prefs.insert(identity_id, merged);
        Ok(merged)
    }

    async fn register_guest(&self, username: &str) -> AppResult<()> {
        if self
            .users
            .lock()
            .unwrap()
            .values()
            .any(|u| u.username == username)
        {
            return Err(AppError::auth_failure(format!(
                "Username '{username}' is already registered"
            )));
        }
        self.guests.lock().unwrap().insert(username.to_string());
        Ok(())
    }
}

/// In-memory channel store.
#[derive(Debug, Default)]
pub struct MemoryChannelStore {
    channels: Mutex<HashMap<Uuid, Channel>>,
    members: Mutex<HashMap<Uuid, Vec<ChannelMember>>>,
}

#[async_trait]
impl ChannelStore for MemoryChannelStore {
    async fn create_channel(
        &self,
        name: &str,
        owner_identity_id: i64,
        owner_username: &str,
        invite_code: &str,
    ) -> AppResult<Channel> {
        let mut channels = self.channels.lock().unwrap();
        if channels.values().any(|c| c.invite_code == invite_code) {
            return Err(AppError::conflict("Invite code already in use"));
        }
        let channel = Channel {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner_identity_id,
            invite_code: invite_code.to_string(),
            created_at: Utc::now(),
        };
        channels.insert(channel.id, channel.clone());
        self.members.lock().unwrap().insert(
            channel.id,
            vec![ChannelMember {
                channel_id: channel.id,
                identity_id: owner_identity_id,
                username: owner_username.to_string(),
                role: ChannelRole::Admin,
                joined_at: Utc::now(),
            }],
        );
        Ok(channel)
    }

    async fn find_by_invite(&self, invite_code: &str) -> AppResult<Option<Channel>> {
        Ok(self
            .channels
            .lock()
            .unwrap()
            .values()
            .find(|c| c.invite_code == invite_code)
            .cloned())
    }

    async fn find_by_id(&self, channel_id: Uuid) -> AppResult<Option<Channel>> {
        Ok(self.channels.lock().unwrap().get(&channel_id).cloned())
    }

    async fn members(&self, channel_id: Uuid) -> AppResult<Vec<ChannelMember>> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(&channel_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn member_count(&self, channel_id: Uuid) -> AppResult<u64> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(&channel_id)
            .map(|m| m.len() as u64)
            .unwrap_or(0))
    }

    async fn is_member(&self, channel_id: Uuid, identity_id: i64) -> AppResult<bool> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(&channel_id)
            .is_some_and(|m| m.iter().any(|mm| mm.identity_id == identity_id)))
    }

    async fn add_member(
        &self,
        channel_id: Uuid,
        identity_id: i64,
        username: &str,
        role: ChannelRole,
    ) -> AppResult<()> {
        let mut members = self.members.lock().unwrap();
        let list = members.entry(channel_id).or_default();
        if !list.iter().any(|m| m.identity_id == identity_id) {
            list.push(ChannelMember {
                channel_id,
                identity_id,
                username: username.to_string(),
                role,
                joined_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn remove_member(&self, channel_id: Uuid, identity_id: i64) -> AppResult<bool> {
        let mut members = self.members.lock().unwrap();
        if let Some(list) = members.get_mut(&channel_id) {
            let before = list.len();
            list.retain(|m| m.identity_id != identity_id);
            return Ok(list.len() < before);
        }
        Ok(false)
    }

    async fn channels_for(&self, identity_id: i64) -> AppResult<Vec<Channel>> {
        let members = self.members.lock().unwrap();
        let channels = self.channels.lock().unwrap();
        Ok(members
            .iter()
            .filter(|(_, list)| list.iter().any(|m| m.identity_id == identity_id))
            .filter_map(|(id, _)| channels.get(id).cloned())
            .collect())
    }
}

/// Identity adapter resolving tokens from a fixed table.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    profiles: Mutex<HashMap<String, IdentityProfile>>,
}

impl StaticIdentityProvider {
    pub fn grant(&self, token: &str, profile: IdentityProfile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(token.to_string(), profile);
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn fetch_profile(&self, access_token: &str) -> AppResult<IdentityProfile> {
        self.profiles
            .lock()
            .unwrap()
            .get(access_token)
            .cloned()
            .ok_or_else(|| AppError::auth_failure("Invalid access token"))
    }
}

/// A fully wired engine over in-memory providers.
pub struct TestBackend {
    pub engine: Arc<RealtimeEngine>,
    pub users: Arc<MemoryUserStore>,
    pub channels: Arc<MemoryChannelStore>,
    pub identity: Arc<StaticIdentityProvider>,
}

impl TestBackend {
    pub async fn new() -> Self {
        let cache_config = CacheConfig {
            provider: "memory".to_string(),
            ..CacheConfig::default()
        };
        let broker = BrokerManager::new(&cache_config)
            .await
            .expect("memory broker");

        let users = Arc::new(MemoryUserStore::default());
        let channels = Arc::new(MemoryChannelStore::default());
        let identity = Arc::new(StaticIdentityProvider::default());

        // Short offline grace keeps disconnect-driven assertions fast.
        let config = RealtimeConfig {
            offline_grace_seconds: 1,
            ..RealtimeConfig::default()
        };
        let engine = RealtimeEngine::new(
            config,
            &broker,
            users.clone(),
            channels.clone(),
            identity.clone(),
        );
        engine.clone().start().await.expect("engine start");

        Self {
            engine,
            users,
            channels,
            identity,
        }
    }

    /// Seeds a user and a token resolving to their profile.
    pub fn seed(&self, identity_id: i64, username: &str, followers: &[i64], following: &[i64]) {
        let profile = IdentityProfile {
            identity_id,
            username: username.to_string(),
            avatar_url: None,
            followers: followers.to_vec(),
            following: following.to_vec(),
        };
        self.users.seed_user(User {
            identity_id,
            username: username.to_string(),
            avatar_url: None,
            followers: followers.to_vec(),
            following: following.to_vec(),
            close_friends: Vec::new(),
            last_seen_ms: 0,
            created_at: Utc::now(),
        });
        self.identity.grant(&format!("tok-{username}"), profile);
    }

    pub async fn connect(&self) -> TestClient {
        let (handle, rx) = self.engine.register_transport();
        TestClient {
            engine: self.engine.clone(),
            handle,
            rx,
        }
    }
}

/// A fake client driving one connection.
pub struct TestClient {
    engine: Arc<RealtimeEngine>,
    pub handle: Arc<ConnectionHandle>,
    rx: mpsc::Receiver<String>,
}

impl TestClient {
    /// Sends a raw frame; processed to completion before returning.
    pub async fn send(&self, frame: &str) {
        self.engine.handle_frame(&self.handle.id, frame).await;
    }

    /// Logs in with a token and returns the resume token.
    pub async fn login(&mut self, username: &str) -> String {
        self.send(&format!(
            r#"{{"t":"login","username":"{username}","token":"tok-{username}"}}"#
        ))
        .await;
        let msg = self.recv().await;
        let token = msg
            .get("token")
            .and_then(|t| t.as_str())
            .unwrap_or_else(|| panic!("expected loginSuccess, got {msg}"))
            .to_string();
        // initial sync follows loginSuccess
        let sync = self.recv().await;
        assert_eq!(sync["t"], "sync", "expected sync, got {sync}");
        token
    }

    /// Receives the next frame as JSON, failing after a short timeout.
    pub async fn recv(&mut self) -> serde_json::Value {
        let frame = timeout(Duration::from_secs(2), self.rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed");
        serde_json::from_str(&frame).expect("frame is not JSON")
    }

    /// Receives frames until one matches the tag.
    pub async fn recv_tag(&mut self, tag: &str) -> serde_json::Value {
        for _ in 0..16 {
            let msg = self.recv().await;
            if msg["t"] == tag {
                return msg;
            }
        }
        panic!("no frame tagged '{tag}' arrived");
    }

    /// Asserts no frame arrives within a short window.
    pub async fn assert_silent(&mut self) {
        self.assert_silent_for(200).await;
    }

    /// Asserts no frame arrives within the given window.
    pub async fn assert_silent_for(&mut self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        if let Ok(frame) = self.rx.try_recv() {
            panic!("expected silence, got {frame}");
        }
    }

    /// Disconnects the transport.
    pub async fn disconnect(&self) {
        self.engine.disconnect(&self.handle.id).await;
    }
}
