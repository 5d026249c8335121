//! Channel entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use devpulse_core::{AppError, AppResult};

/// Minimum channel name length in code points.
pub const NAME_MIN_CHARS: usize = 3;
/// Maximum channel name length in code points.
pub const NAME_MAX_CHARS: usize = 30;

/// Alphabet used for invite codes: uppercase alphanumerics with the
/// confusable characters 0, O, I, and 1 removed.
pub const INVITE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of every invite code.
pub const INVITE_CODE_LEN: usize = 6;

/// A group channel.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Channel {
    /// Opaque unique identifier.
    pub id: Uuid,
    /// Human name, 3–30 code points.
    pub name: String,
    /// Identity id of the creating user.
    pub owner_identity_id: i64,
    /// Six-character invite code, unique among active channels.
    pub invite_code: String,
    /// When the channel was created.
    pub created_at: DateTime<Utc>,
}

/// Validate a proposed channel name.
pub fn validate_name(name: &str) -> AppResult<()> {
    let len = name.chars().count();
    if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&len) {
        return Err(AppError::invalid_frame(format!(
            "Channel name must be {NAME_MIN_CHARS}-{NAME_MAX_CHARS} characters, got {len}"
        )));
    }
    Ok(())
}

/// Check that a string has the shape of an invite code.
pub fn is_invite_code(code: &str) -> bool {
    code.len() == INVITE_CODE_LEN && code.bytes().all(|b| INVITE_ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_boundaries() {
        assert!(validate_name("abc").is_ok());
        assert!(validate_name(&"x".repeat(30)).is_ok());
        assert!(validate_name("ab").is_err());
        assert!(validate_name(&"x".repeat(31)).is_err());
    }

    #[test]
    fn test_name_counts_code_points() {
        // 3 multi-byte characters are a valid name
        assert!(validate_name("äöü").is_ok());
    }

    #[test]
    fn test_invite_code_shape() {
        assert!(is_invite_code("ABC234"));
        assert!(!is_invite_code("ABC23"));
        assert!(!is_invite_code("ABC2340"));
        // confusables are excluded
        assert!(!is_invite_code("ABC10O"));
        assert!(!is_invite_code("abc234"));
    }
}
