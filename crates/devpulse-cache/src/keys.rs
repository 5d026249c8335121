//! Key and topic builders for the broker keyspace.
//!
//! Centralising key construction prevents typos and makes it easy
//! to find every key the application uses.

use uuid::Uuid;

/// Key holding a resume-session record.
pub fn resume_session(token: &str) -> String {
    format!("session:{token}")
}

/// Key holding the last published status snapshot of a user.
pub fn status_cache(username: &str) -> String {
    format!("status:{username}")
}

/// Topic carrying one user's presence events.
pub fn presence_topic(username: &str) -> String {
    format!("presence:{username}")
}

/// Topic carrying one channel's events.
pub fn channel_topic(channel_id: Uuid) -> String {
    format!("channel:{channel_id}")
}

/// The username of a presence topic, if it is one.
pub fn presence_topic_target(topic: &str) -> Option<&str> {
    topic.strip_prefix("presence:")
}

/// The channel id of a channel topic, if it is one.
pub fn channel_topic_id(topic: &str) -> Option<Uuid> {
    topic.strip_prefix("channel:").and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_round_trip() {
        assert_eq!(presence_topic_target("presence:alice"), Some("alice"));
        assert_eq!(presence_topic_target("channel:abc"), None);

        let id = Uuid::new_v4();
        assert_eq!(channel_topic_id(&channel_topic(id)), Some(id));
    }
}
