//! Custom status value object.

use serde::{Deserialize, Serialize};

/// A user-set custom status line, optionally expiring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomStatus {
    /// Status text, at most 128 code points.
    pub text: String,
    /// Optional emoji prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

impl CustomStatus {
    /// Build a custom status, truncating the text to `max_chars` code points.
    pub fn new(text: &str, emoji: Option<String>, max_chars: usize) -> Self {
        Self {
            text: text.chars().take(max_chars).collect(),
            emoji,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncates_at_code_points() {
        let text = "é".repeat(200);
        let cs = CustomStatus::new(&text, None, 128);
        assert_eq!(cs.text.chars().count(), 128);
    }

    #[test]
    fn test_short_text_untouched() {
        let cs = CustomStatus::new("shipping", Some("🚀".into()), 128);
        assert_eq!(cs.text, "shipping");
    }
}
