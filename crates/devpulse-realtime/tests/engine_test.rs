//! End-to-end engine tests over in-memory providers.

mod helpers;

use helpers::TestBackend;
use serde_json::json;

const ALICE: i64 = 1;
const BOB: i64 = 2;
const CHARLIE: i64 = 3;
const DAVE: i64 = 4;

/// Alice and Bob follow each other; Charlie is unrelated.
async fn backend_with_graph() -> TestBackend {
    let backend = TestBackend::new().await;
    backend.seed(ALICE, "alice", &[BOB], &[BOB]);
    backend.seed(BOB, "bob", &[ALICE], &[ALICE]);
    backend.seed(CHARLIE, "charlie", &[], &[]);
    backend
}

#[tokio::test]
async fn test_delta_only_fan_out() {
    let backend = backend_with_graph().await;

    let mut bob = backend.connect().await;
    bob.login("bob").await;
    let mut charlie = backend.connect().await;
    charlie.login("charlie").await;

    let mut alice = backend.connect().await;
    alice.login("alice").await;
    // Bob observes Alice's fresh login.
    let online = bob.recv_tag("o").await;
    assert_eq!(online["id"], "alice");

    alice.send(r#"{"t":"statusUpdate","a":"Coding"}"#).await;

    let delta = bob.recv().await;
    assert_eq!(delta, json!({"t": "u", "id": "alice", "a": "Coding"}));

    charlie.assert_silent().await;
}

#[tokio::test]
async fn test_idempotent_status_update_produces_nothing() {
    let backend = backend_with_graph().await;

    let mut bob = backend.connect().await;
    bob.login("bob").await;
    let mut alice = backend.connect().await;
    alice.login("alice").await;
    bob.recv_tag("o").await;

    alice.send(r#"{"t":"statusUpdate","a":"Coding"}"#).await;
    bob.recv_tag("u").await;

    // Same value again: no outbound traffic.
    alice.send(r#"{"t":"statusUpdate","a":"Coding"}"#).await;
    bob.assert_silent().await;
}

#[tokio::test]
async fn test_non_follower_isolation() {
    use devpulse_entity::preferences::{PreferencesUpdate, VisibilityMode};
    use devpulse_entity::store::UserStore;

    let backend = TestBackend::new().await;
    // Alice shows to followers only. Dave has Alice in his own friend
    // set (stale one-way edge) and so holds a subscription by mistake.
    backend.seed(ALICE, "alice", &[BOB], &[]);
    backend.seed(BOB, "bob", &[], &[ALICE]);
    backend.seed(DAVE, "dave", &[], &[ALICE]);
    backend
        .users
        .update_preferences(
            ALICE,
            &PreferencesUpdate {
                visibility: Some(VisibilityMode::Followers),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let mut dave = backend.connect().await;
    dave.login("dave").await;

    let mut alice = backend.connect().await;
    alice.login("alice").await;
    alice.send(r#"{"t":"statusUpdate","a":"Coding"}"#).await;

    // Dave is subscribed to presence:alice but the filter denies him
    // both the online event and the delta.
    dave.assert_silent().await;
}

#[tokio::test]
async fn test_session_resume_masks_reconnect() {
    let backend = backend_with_graph().await;

    let mut bob = backend.connect().await;
    bob.login("bob").await;

    let mut alice = backend.connect().await;
    let resume_token = alice.login("alice").await;
    bob.recv_tag("o").await;

    alice.disconnect().await;

    // Reconnect within the window, presenting the resume token.
    let mut alice2 = backend.connect().await;
    alice2
        .send(&format!(
            r#"{{"t":"login","username":"alice","resumeToken":"{resume_token}"}}"#
        ))
        .await;
    let success = alice2.recv().await;
    assert_eq!(success["t"], "loginSuccess");

    // Bob observes neither the departure nor a re-arrival, even after
    // the offline grace window would have fired.
    bob.assert_silent_for(1500).await;
}

#[tokio::test]
async fn test_multi_window_aggregation_and_offline_gating() {
    let backend = backend_with_graph().await;

    let mut w1 = backend.connect().await;
    w1.login("alice").await;
    let mut w2 = backend.connect().await;
    w2.login("alice").await;

    w1.send(r#"{"t":"statusUpdate","a":"Idle"}"#).await;
    w2.send(r#"{"t":"statusUpdate","a":"Coding"}"#).await;

    // Bob's initial sync aggregates to the highest-priority window.
    let mut bob = backend.connect().await;
    bob.send(r#"{"t":"login","username":"bob","token":"tok-bob"}"#)
        .await;
    let success = bob.recv().await;
    assert_eq!(success["t"], "loginSuccess");
    let sync = bob.recv().await;
    assert_eq!(sync["t"], "sync");
    let users = sync["users"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["id"], "alice");
    assert_eq!(users[0]["act"], "Coding");

    // Closing one window is masked; closing the last one is not.
    w2.disconnect().await;
    bob.assert_silent_for(1500).await;

    w1.disconnect().await;
    let offline = bob.recv_tag("x").await;
    assert_eq!(offline["id"], "alice");
    assert!(offline["ts"].as_i64().is_some());
}

#[tokio::test]
async fn test_invisible_transition() {
    let backend = backend_with_graph().await;

    let mut bob = backend.connect().await;
    bob.login("bob").await;
    let mut alice = backend.connect().await;
    alice.login("alice").await;
    bob.recv_tag("o").await;

    alice
        .send(r#"{"t":"prefsUpdate","prefs":{"visibility":"invisible"}}"#)
        .await;

    let offline = bob.recv_tag("x").await;
    assert_eq!(offline["id"], "alice");

    // No further deltas while invisible.
    alice.send(r#"{"t":"statusUpdate","a":"Debugging"}"#).await;
    bob.assert_silent().await;

    // Leaving invisibility publishes the full snapshot.
    alice
        .send(r#"{"t":"prefsUpdate","prefs":{"visibility":"everyone"}}"#)
        .await;
    let online = bob.recv_tag("o").await;
    assert_eq!(online["id"], "alice");
    assert_eq!(online["act"], "Debugging");
}

#[tokio::test]
async fn test_channel_create_join_chat() {
    let backend = backend_with_graph().await;

    let mut alice = backend.connect().await;
    alice.login("alice").await;
    let mut bob = backend.connect().await;
    bob.login("bob").await;
    alice.recv_tag("o").await;

    alice.send(r#"{"t":"cc","name":"DevTeam"}"#).await;
    let created = alice.recv_tag("ccOk").await;
    assert_eq!(created["name"], "DevTeam");
    let invite = created["inviteCode"].as_str().unwrap().to_string();
    assert_eq!(invite.len(), 6);
    let roster = alice.recv_tag("cs").await;
    assert_eq!(roster["members"].as_array().unwrap().len(), 1);

    bob.send(&format!(r#"{{"t":"jc","inviteCode":"{invite}"}}"#))
        .await;
    let joined = bob.recv_tag("jcOk").await;
    assert_eq!(joined["name"], "DevTeam");
    let roster = bob.recv_tag("cs").await;
    let members = roster["members"].as_array().unwrap();
    assert_eq!(members.len(), 2);

    // Alice observes the join on the channel topic.
    let member_joined = alice.recv_tag("cj").await;
    assert_eq!(member_joined["member"]["id"], "bob");

    // Chat fans out to both members with a server timestamp.
    let channel_id = joined["channelId"].as_str().unwrap().to_string();
    bob.send(&format!(
        r#"{{"t":"cm","channelId":"{channel_id}","content":"hello"}}"#
    ))
    .await;
    let chat = alice.recv_tag("cm").await;
    assert_eq!(chat["id"], "bob");
    assert_eq!(chat["content"], "hello");
    assert!(chat["ts"].as_i64().is_some());
}

#[tokio::test]
async fn test_unknown_invite_code_and_already_member_errors() {
    let backend = backend_with_graph().await;

    let mut alice = backend.connect().await;
    alice.login("alice").await;

    alice.send(r#"{"t":"jc","inviteCode":"ZZZZZZ"}"#).await;
    let err = alice.recv_tag("error").await;
    assert_eq!(err["code"], "NOT_FOUND");

    // Re-joining an owned channel reports ALREADY_MEMBER.
    alice.send(r#"{"t":"cc","name":"DevTeam"}"#).await;
    let created = alice.recv_tag("ccOk").await;
    let invite = created["inviteCode"].as_str().unwrap().to_string();
    alice.recv_tag("cs").await;
    alice
        .send(&format!(r#"{{"t":"jc","inviteCode":"{invite}"}}"#))
        .await;
    let err = alice.recv_tag("error").await;
    assert_eq!(err["code"], "ALREADY_MEMBER");
}

#[tokio::test]
async fn test_guests_cannot_create_channels() {
    let backend = TestBackend::new().await;

    let mut guest = backend.connect().await;
    guest.send(r#"{"t":"login","username":"wanderer"}"#).await;
    let success = guest.recv().await;
    assert_eq!(success["t"], "loginSuccess");
    assert!(success.get("githubId").is_none());
    guest.recv_tag("sync").await;

    guest.send(r#"{"t":"cc","name":"NoChannel"}"#).await;
    let err = guest.recv_tag("error").await;
    assert_eq!(err["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_guest_username_in_use_by_live_connection() {
    let backend = TestBackend::new().await;

    let mut first = backend.connect().await;
    first.send(r#"{"t":"login","username":"wanderer"}"#).await;
    assert_eq!(first.recv().await["t"], "loginSuccess");
    first.recv_tag("sync").await;

    let mut second = backend.connect().await;
    second.send(r#"{"t":"login","username":"wanderer"}"#).await;
    let err = second.recv().await;
    assert_eq!(err["t"], "loginError");

    // After the first disconnects, the name is reusable.
    first.disconnect().await;
    let mut third = backend.connect().await;
    third.send(r#"{"t":"login","username":"wanderer"}"#).await;
    assert_eq!(third.recv().await["t"], "loginSuccess");
}

#[tokio::test]
async fn test_token_login_rejected_while_guest_holds_name() {
    use devpulse_entity::user::IdentityProfile;

    let backend = TestBackend::new().await;
    backend.identity.grant(
        "tok-torvalds",
        IdentityProfile {
            identity_id: 99,
            username: "torvalds".into(),
            avatar_url: None,
            followers: Vec::new(),
            following: Vec::new(),
        },
    );

    // A guest claims the name first and stays online.
    let mut guest = backend.connect().await;
    guest.send(r#"{"t":"login","username":"torvalds"}"#).await;
    assert_eq!(guest.recv().await["t"], "loginSuccess");
    guest.recv_tag("sync").await;

    // The authenticated login must not merge into the guest's windows.
    let mut imposter_victim = backend.connect().await;
    imposter_victim
        .send(r#"{"t":"login","username":"torvalds","token":"tok-torvalds"}"#)
        .await;
    assert_eq!(imposter_victim.recv().await["t"], "loginError");

    // Once the guest is gone, the identity claims the name.
    guest.disconnect().await;
    let mut owner = backend.connect().await;
    owner
        .send(r#"{"t":"login","username":"torvalds","token":"tok-torvalds"}"#)
        .await;
    assert_eq!(owner.recv().await["t"], "loginSuccess");
}

#[tokio::test]
async fn test_custom_status_set_and_clear_round_trip() {
    let backend = backend_with_graph().await;

    let mut bob = backend.connect().await;
    bob.login("bob").await;
    let mut alice = backend.connect().await;
    alice.login("alice").await;
    bob.recv_tag("o").await;

    alice
        .send(r#"{"t":"ss","text":"shipping the thing","emoji":"🚀"}"#)
        .await;
    let delta = bob.recv_tag("u").await;
    assert_eq!(delta["cs"]["text"], "shipping the thing");
    assert_eq!(delta["cs"]["emoji"], "🚀");

    alice.send(r#"{"t":"clr"}"#).await;
    let delta = bob.recv_tag("u").await;
    assert!(delta["cs"].is_null());
    assert!(delta.as_object().unwrap().contains_key("cs"));

    // A second clear is a no-op.
    alice.send(r#"{"t":"clr"}"#).await;
    bob.assert_silent().await;
}

#[tokio::test]
async fn test_invalid_frames_preserve_the_connection() {
    let backend = backend_with_graph().await;

    let mut alice = backend.connect().await;
    alice.send("{not json").await;
    assert_eq!(alice.recv().await["code"], "INVALID_FRAME");

    alice.send(r#"{"t":"warp"}"#).await;
    assert_eq!(alice.recv().await["code"], "INVALID_FRAME");

    alice.send(r#"{"t":"jc"}"#).await;
    assert_eq!(alice.recv().await["code"], "INVALID_FRAME");

    // The connection still works.
    alice.login("alice").await;
    alice.send(r#"{"t":"hb"}"#).await;
    assert_eq!(alice.recv().await["t"], "hb");
}

#[tokio::test]
async fn test_share_preference_redaction() {
    let backend = backend_with_graph().await;

    let mut bob = backend.connect().await;
    bob.login("bob").await;
    let mut alice = backend.connect().await;
    alice.login("alice").await;
    bob.recv_tag("o").await;

    alice
        .send(r#"{"t":"prefsUpdate","prefs":{"shareProjectName":false,"shareActivity":false}}"#)
        .await;
    alice
        .send(r#"{"t":"statusUpdate","a":"Coding","p":"secret-project","l":"rust"}"#)
        .await;

    let delta = bob.recv_tag("u").await;
    assert_eq!(delta["a"], "Hidden");
    assert_eq!(delta["p"], "");
    assert_eq!(delta["l"], "rust");
}
