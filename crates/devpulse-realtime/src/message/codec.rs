//! Frame encoding and decoding.
//!
//! Decoding tolerates anything a client can throw at it — malformed
//! JSON, unknown `t` tags, missing required fields — by reporting an
//! invalid-frame error instead of terminating the connection.

use devpulse_core::{AppError, AppResult};

use super::types::{ClientMessage, ServerMessage};

/// Decode a raw text frame into a client message.
pub fn decode_client(raw: &str) -> AppResult<ClientMessage> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::invalid_frame(format!("Invalid message: {e}")))
}

/// Encode a server message as a text frame.
pub fn encode_server(msg: &ServerMessage) -> AppResult<String> {
    serde_json::to_string(msg).map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use devpulse_core::ErrorKind;
    use devpulse_entity::presence::{Activity, PresenceStatus};

    use super::*;

    #[test]
    fn test_decode_login() {
        let msg = decode_client(r#"{"t":"login","username":"alice","token":"gho_x"}"#).unwrap();
        match msg {
            ClientMessage::Login {
                username,
                token,
                resume_token,
            } => {
                assert_eq!(username, "alice");
                assert_eq!(token.as_deref(), Some("gho_x"));
                assert!(resume_token.is_none());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_decode_status_update_subset() {
        let msg = decode_client(r#"{"t":"statusUpdate","a":"Coding"}"#).unwrap();
        match msg {
            ClientMessage::StatusUpdate { s, a, p, l } => {
                assert!(s.is_none());
                assert_eq!(a, Some(Activity::Coding));
                assert!(p.is_none() && l.is_none());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_tag_is_invalid_frame() {
        let err = decode_client(r#"{"t":"warp","x":1}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidFrame);
    }

    #[test]
    fn test_malformed_json_is_invalid_frame() {
        let err = decode_client("{nope").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidFrame);
    }

    #[test]
    fn test_missing_required_field_is_invalid_frame() {
        let err = decode_client(r#"{"t":"jc"}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidFrame);
    }

    #[test]
    fn test_delta_carries_only_changed_fields() {
        let msg = ServerMessage::Delta {
            id: "alice".into(),
            s: None,
            a: Some(Activity::Coding),
            p: None,
            l: None,
            cs: None,
        };
        let value: serde_json::Value =
            serde_json::from_str(&encode_server(&msg).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"t": "u", "id": "alice", "a": "Coding"})
        );
    }

    #[test]
    fn test_custom_status_clear_serializes_null() {
        let msg = ServerMessage::Delta {
            id: "alice".into(),
            s: None,
            a: None,
            p: None,
            l: None,
            cs: Some(None),
        };
        let value: serde_json::Value =
            serde_json::from_str(&encode_server(&msg).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"t": "u", "id": "alice", "cs": null})
        );
    }

    #[test]
    fn test_offline_event_shape() {
        let msg = ServerMessage::Offline {
            id: "alice".into(),
            ts: 1_700_000_000_000,
        };
        let value: serde_json::Value =
            serde_json::from_str(&encode_server(&msg).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"t": "x", "id": "alice", "ts": 1_700_000_000_000i64})
        );
    }

    #[test]
    fn test_online_event_round_trip() {
        let msg = ServerMessage::Online {
            id: "alice".into(),
            a: Some("https://avatars.example/alice".into()),
            s: PresenceStatus::Online,
            act: Activity::Idle,
            p: None,
            l: None,
        };
        let encoded = encode_server(&msg).unwrap();
        let decoded: ServerMessage = serde_json::from_str(&encoded).unwrap();
        match decoded {
            ServerMessage::Online { id, s, act, .. } => {
                assert_eq!(id, "alice");
                assert_eq!(s, PresenceStatus::Online);
                assert_eq!(act, Activity::Idle);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
