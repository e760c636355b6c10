//! Conversational dispatcher scenarios: routing, context thresholds, the
//! handoff protocol, workspace actions, and voice handling.

mod support;

use maslow_core::capabilities::{IncomingMessage, ModelEvent, ModelUsage};
use maslow_core::model::{ChatSession, Column};
use maslow_core::Clock;
use maslow_core::test_support::{StaticVoice, card_fixture, project_fixture};
use maslow_engine::session::SessionPolicy;
use support::{harness, harness_with, wait_for};

const CHAT: &str = "chat-1";

fn text_event(session_id: &str, content: &str) -> ModelEvent {
    ModelEvent::Text {
        session_id: Some(session_id.to_string()),
        content: content.to_string(),
    }
}

fn result_event(pct: f64) -> ModelEvent {
    ModelEvent::Result {
        usage: ModelUsage {
            input_tokens: (pct * 2000.0) as u64,
            output_tokens: 0,
            context_window: 200_000,
        },
    }
}

fn existing_session(h: &support::Harness, model_session_id: &str) -> ChatSession {
    let mut session = ChatSession::fresh(CHAT, h.workspace.path().to_path_buf(), h.clock.now_utc());
    session.model_session_id = model_session_id.to_string();
    h.chats.insert(session.clone());
    session
}

// Routing rule 1: the restart command clears the session without touching
// the model.
#[tokio::test]
async fn restart_command_clears_session() {
    let h = harness(vec![project_fixture("p1", "maslow")]);
    existing_session(&h, "sess-1");

    h.engine
        .sessions
        .handle_message(IncomingMessage::text(CHAT, "/restart_claude"))
        .await;

    assert!(h.chats.session(CHAT).is_none());
    assert!(h.chats.deleted.lock().unwrap().contains(&CHAT.to_string()));
    assert!(h.chat.any_text_contains("Session cleared"));
    assert_eq!(h.model.request_count(), 0);
}

// Routing rule 2: TASK:/Brief: prefixes go straight to the heartbeat.
#[tokio::test]
async fn task_prefix_becomes_backlog_card_without_model_call() {
    let h = harness(vec![project_fixture("p1", "maslow")]);

    h.engine
        .sessions
        .handle_message(IncomingMessage::text(CHAT, "TASK: Refactor the voice layer"))
        .await;

    assert!(h.chat.any_text_contains("Autonomous mode activated"));
    assert_eq!(h.model.request_count(), 0);
    let card = h
        .kanban
        .card_by_title("TASK: Refactor the voice layer")
        .expect("card created from brief");
    assert_eq!(card.project_id, "p1");

    h.engine.runner.shutdown_all().await;
}

#[tokio::test]
async fn brief_prefix_is_equivalent_to_task_prefix() {
    let h = harness(vec![project_fixture("p1", "maslow")]);
    h.engine
        .sessions
        .handle_message(IncomingMessage::text(CHAT, "Brief: tune retry backoff"))
        .await;
    assert!(h.chat.any_text_contains("Autonomous mode activated"));
    assert_eq!(h.model.request_count(), 0);
    h.engine.runner.shutdown_all().await;
}

#[tokio::test]
async fn conversational_reply_persists_model_session_id() {
    let h = harness(vec![project_fixture("p1", "maslow")]);
    h.model
        .push_turn(vec![text_event("sess-new", "hello there"), result_event(1.0)]);

    h.engine
        .sessions
        .handle_message(IncomingMessage::text(CHAT, "hi"))
        .await;

    let session = h.chats.session(CHAT).unwrap();
    assert_eq!(session.model_session_id, "sess-new");
    assert!(h.chat.any_text_contains("hello there"));
}

#[tokio::test]
async fn conversational_reply_resumes_existing_session() {
    let h = harness(vec![project_fixture("p1", "maslow")]);
    existing_session(&h, "sess-old");
    h.model
        .push_turn(vec![text_event("sess-old", "resumed"), result_event(2.0)]);

    h.engine
        .sessions
        .handle_message(IncomingMessage::text(CHAT, "hi again"))
        .await;

    let request = h.model.last_request().unwrap();
    assert_eq!(request.resume_session_id.as_deref(), Some("sess-old"));
}

#[tokio::test]
async fn tool_events_are_forwarded_as_status_updates() {
    let h = harness(vec![project_fixture("p1", "maslow")]);
    h.model.push_turn(vec![
        text_event("s", "looking"),
        ModelEvent::ToolCall {
            name: "read_file".to_string(),
            summary: "src/main.rs".to_string(),
        },
        ModelEvent::ToolResult {
            name: "read_file".to_string(),
            summary: "120 lines".to_string(),
        },
        result_event(1.0),
    ]);

    h.engine
        .sessions
        .handle_message(IncomingMessage::text(CHAT, "check main"))
        .await;

    assert!(h.chat.any_text_contains("tool: read_file"));
    assert!(h.chat.any_text_contains("tool result: read_file"));
}

#[tokio::test]
async fn model_error_event_becomes_error_reply() {
    let h = harness(vec![project_fixture("p1", "maslow")]);
    h.model.push_turn(vec![ModelEvent::Error {
        message: "stream aborted".to_string(),
    }]);

    h.engine
        .sessions
        .handle_message(IncomingMessage::text(CHAT, "hi"))
        .await;

    assert!(h.chat.any_text_contains("Model error: stream aborted"));
}

// S6: usage at 60% of the window triggers the auto-handoff protocol.
#[tokio::test]
async fn auto_handoff_at_threshold() {
    let h = harness(vec![project_fixture("p1", "maslow")]);
    existing_session(&h, "sess-1");
    h.model.set_handoff_summary("we were fixing the build");
    h.model
        .push_turn(vec![text_event("sess-1", "working on it"), result_event(60.0)]);

    h.engine
        .sessions
        .handle_message(IncomingMessage::text(CHAT, "how is it going?"))
        .await;

    // Old session deleted, handoff generated from it.
    assert!(h.chats.deleted.lock().unwrap().contains(&CHAT.to_string()));
    assert_eq!(*h.model.handoff_calls.lock().unwrap(), vec!["sess-1"]);

    // A fresh session exists with no model session and zero usage.
    let fresh = h.chats.session(CHAT).unwrap();
    assert!(!fresh.has_model_session());
    assert_eq!(fresh.context_usage_percent, 0.0);

    // The operator saw both the auto-handoff notice and the summary.
    assert!(h.chat.any_text_contains("Auto-handoff"));
    assert!(h.chat.any_text_contains("we were fixing the build"));
}

#[tokio::test]
async fn below_threshold_no_handoff_no_warning() {
    let h = harness(vec![project_fixture("p1", "maslow")]);
    existing_session(&h, "sess-1");
    h.model
        .push_turn(vec![text_event("sess-1", "fine"), result_event(20.0)]);

    h.engine
        .sessions
        .handle_message(IncomingMessage::text(CHAT, "status?"))
        .await;

    assert!(h.model.handoff_calls.lock().unwrap().is_empty());
    assert!(!h.chat.any_text_contains("Auto-handoff"));
    assert!(!h.chat.any_text_contains("context limit"));
    let session = h.chats.session(CHAT).unwrap();
    assert_eq!(session.model_session_id, "sess-1");
}

// With a raised auto-handoff threshold the warning band becomes reachable;
// an affirmation then runs the manual handoff.
#[tokio::test]
async fn warning_then_continuation_affirmation() {
    let policy = SessionPolicy {
        auto_handoff_pct: 95.0,
        warn_pct: 50.0,
    };
    let h = harness_with(
        vec![project_fixture("p1", "maslow")],
        StaticVoice::transcribing("unused"),
        policy,
    );
    existing_session(&h, "sess-1");
    h.model.set_handoff_summary("summary of the long session");
    h.model
        .push_turn(vec![text_event("sess-1", "long answer"), result_event(60.0)]);
    // The post-handoff exchange.
    h.model
        .push_turn(vec![text_event("sess-2", "picking up"), result_event(3.0)]);

    h.engine
        .sessions
        .handle_message(IncomingMessage::text(CHAT, "keep going"))
        .await;
    assert!(h.chat.any_text_contains("context limit"));

    h.engine
        .sessions
        .handle_message(IncomingMessage::text(CHAT, "continue"))
        .await;

    assert!(h.chat.any_text_contains("Generating handoff summary"));
    assert!(h.chat.any_text_contains("summary of the long session"));
    assert_eq!(*h.model.handoff_calls.lock().unwrap(), vec!["sess-1"]);

    // Step 6: a new exchange seeded with the handoff summary.
    let seeded = h.model.last_request().unwrap();
    assert!(
        seeded
            .prompt
            .starts_with("Previous session handoff: summary of the long session")
    );
    let session = h.chats.session(CHAT).unwrap();
    assert_eq!(session.model_session_id, "sess-2");
}

#[tokio::test]
async fn continuation_without_session_says_so() {
    let h = harness(vec![project_fixture("p1", "maslow")]);
    h.engine.sessions.handle_continuation(CHAT).await;
    assert!(h.chat.any_text_contains("No active session"));
    assert!(h.model.handoff_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_handoff_keeps_old_session() {
    let h = harness(vec![project_fixture("p1", "maslow")]);
    existing_session(&h, "sess-1");
    h.model.fail_handoff();

    h.engine.sessions.handle_continuation(CHAT).await;

    assert!(h.chat.any_text_contains("Handoff failed"));
    let session = h.chats.session(CHAT).unwrap();
    assert_eq!(session.model_session_id, "sess-1");
}

// S7: one well-formed action block executes; malformed and unknown blocks
// are skipped without aborting anything.
#[tokio::test]
async fn workspace_action_parsing_tolerates_garbage() {
    let h = harness(vec![project_fixture("p1", "maslow")]);
    let reply = ":::action\n{\"type\":\"create_card\",\"title\":\"A\"}\n:::\n:::action\n{\"type\":\"invalid\"}\n:::\n:::action\n{not json}\n:::";
    h.model
        .push_turn(vec![text_event("sess-1", reply), result_event(1.0)]);

    h.engine
        .sessions
        .handle_message(IncomingMessage::text(CHAT, "queue it"))
        .await;

    let card = h.kanban.card_by_title("A").expect("create_card executed");
    assert_eq!(card.column, Column::Backlog);
    assert_eq!(
        h.kanban
            .all_cards()
            .iter()
            .filter(|c| c.project_id == "p1")
            .count(),
        1
    );
}

#[tokio::test]
async fn move_card_action_resolves_by_exact_title() {
    let h = harness(vec![project_fixture("p1", "maslow")]);
    h.kanban
        .insert(card_fixture("c1", "p1", "Polish the readme", h.clock.now_utc()));
    let reply =
        ":::action\n{\"type\":\"move_card\",\"title\":\"Polish the readme\",\"column\":\"review\"}\n:::";
    h.model
        .push_turn(vec![text_event("sess-1", reply), result_event(1.0)]);

    h.engine
        .sessions
        .handle_message(IncomingMessage::text(CHAT, "move it"))
        .await;

    assert_eq!(h.kanban.card("c1").unwrap().column, Column::Review);
}

#[tokio::test]
async fn thinking_actions_reach_the_partner() {
    let h = harness(vec![project_fixture("p1", "maslow")]);
    let reply = ":::action\n{\"type\":\"log_decision\",\"title\":\"Keep sqlite\"}\n:::\n:::action\n{\"type\":\"add_assumption\",\"assumption\":\"one operator\"}\n:::\n:::action\n{\"type\":\"update_state\",\"summary\":\"steady\"}\n:::";
    h.model
        .push_turn(vec![text_event("sess-1", reply), result_event(1.0)]);

    h.engine
        .sessions
        .handle_message(IncomingMessage::text(CHAT, "note these"))
        .await;

    assert_eq!(h.thinking.decisions.lock().unwrap().len(), 1);
    assert_eq!(h.thinking.assumptions.lock().unwrap().len(), 1);
    assert_eq!(h.thinking.summaries.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn voice_message_is_transcribed_and_answered_with_voice() {
    let h = harness_with(
        vec![project_fixture("p1", "maslow")],
        StaticVoice::transcribing("what is the status"),
        SessionPolicy::default(),
    );
    h.chat.add_file("voice-1", vec![1, 2, 3]);
    h.model
        .push_turn(vec![text_event("sess-1", "all green"), result_event(1.0)]);

    let msg = IncomingMessage {
        chat_id: CHAT.to_string(),
        voice_file_id: Some("voice-1".to_string()),
        ..IncomingMessage::default()
    };
    h.engine.sessions.handle_message(msg).await;

    let request = h.model.last_request().unwrap();
    assert_eq!(request.prompt, "what is the status");
    // Text reply goes out, and additionally a voice note.
    assert!(h.chat.any_text_contains("all green"));
    wait_for("voice note sent", || {
        !h.chat.voice_notes.lock().unwrap().is_empty()
    })
    .await;
}

#[tokio::test]
async fn transcription_failure_skips_the_model() {
    let h = harness_with(
        vec![project_fixture("p1", "maslow")],
        StaticVoice::broken(),
        SessionPolicy::default(),
    );
    h.chat.add_file("voice-1", vec![1, 2, 3]);

    let msg = IncomingMessage {
        chat_id: CHAT.to_string(),
        voice_file_id: Some("voice-1".to_string()),
        ..IncomingMessage::default()
    };
    h.engine.sessions.handle_message(msg).await;

    assert_eq!(h.model.request_count(), 0);
    assert!(h.chat.any_text_contains("Voice input is unavailable"));
}

#[tokio::test]
async fn image_only_message_gets_default_prompt() {
    let h = harness(vec![project_fixture("p1", "maslow")]);
    h.chat.add_file("img-1", vec![0xff, 0xd8]);
    h.model
        .push_turn(vec![text_event("sess-1", "a diagram"), result_event(1.0)]);

    let msg = IncomingMessage {
        chat_id: CHAT.to_string(),
        image_file_ids: vec!["img-1".to_string()],
        ..IncomingMessage::default()
    };
    h.engine.sessions.handle_message(msg).await;

    let request = h.model.last_request().unwrap();
    assert_eq!(request.prompt, "please analyze this image");
    assert_eq!(request.images.len(), 1);
}

// Property 5: persisted usage is monotonic within a session and resets to
// zero after an auto-handoff.
#[tokio::test]
async fn context_usage_monotonic_then_reset_by_handoff() {
    let h = harness(vec![project_fixture("p1", "maslow")]);
    existing_session(&h, "sess-1");
    h.model
        .push_turn(vec![text_event("sess-1", "a"), result_event(10.0)]);
    h.model
        .push_turn(vec![text_event("sess-1", "b"), result_event(30.0)]);
    h.model
        .push_turn(vec![text_event("sess-1", "c"), result_event(65.0)]);

    for text in ["one", "two", "three"] {
        h.engine
            .sessions
            .handle_message(IncomingMessage::text(CHAT, text))
            .await;
    }

    let updates: Vec<f64> = h
        .chats
        .usage_updates
        .lock()
        .unwrap()
        .iter()
        .map(|(_, pct)| *pct)
        .collect();
    assert_eq!(updates, vec![10.0, 30.0, 65.0]);
    assert!(updates.windows(2).all(|w| w[0] <= w[1]));

    // The third turn crossed the threshold; the chat now sits on a fresh
    // session with zero usage.
    let fresh = h.chats.session(CHAT).unwrap();
    assert_eq!(fresh.context_usage_percent, 0.0);
    assert!(!fresh.has_model_session());
}
