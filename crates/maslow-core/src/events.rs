//! Observability events and their fanout bus.
//!
//! Events describe _what happened_, not what should happen. They use owned
//! types so they can be serialized and forwarded over any wire unchanged.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::model::AgentKind;

/// Default fanout channel capacity. Slow subscribers drop oldest events
/// rather than blocking the engine.
const BUS_CAPACITY: usize = 256;

/// All observability events emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BroadcastEvent {
    #[serde(rename = "heartbeat.tick", rename_all = "camelCase")]
    HeartbeatTick {
        projects_scanned: usize,
        agents_running: usize,
    },

    #[serde(rename = "heartbeat.idle")]
    HeartbeatIdle,

    #[serde(rename = "heartbeat.spawned", rename_all = "camelCase")]
    HeartbeatSpawned {
        card_id: String,
        project_id: String,
        agent: AgentKind,
    },

    #[serde(rename = "heartbeat.retry", rename_all = "camelCase")]
    HeartbeatRetry {
        card_id: String,
        previous_status: String,
    },

    #[serde(rename = "heartbeat.error", rename_all = "camelCase")]
    HeartbeatError {
        project_id: Option<String>,
        message: String,
    },

    #[serde(rename = "heartbeat.cardCreated", rename_all = "camelCase")]
    HeartbeatCardCreated { source: String, title: String },

    #[serde(rename = "agent.started", rename_all = "camelCase")]
    AgentStarted {
        card_id: String,
        agent: AgentKind,
        pid: Option<u32>,
    },

    #[serde(rename = "agent.completed", rename_all = "camelCase")]
    AgentCompleted { card_id: String },

    #[serde(rename = "agent.failed", rename_all = "camelCase")]
    AgentFailed { card_id: String, reason: String },

    #[serde(rename = "agent.cancelled", rename_all = "camelCase")]
    AgentCancelled { card_id: String },
}

impl BroadcastEvent {
    /// The wire tag of this event (`heartbeat.tick`, `agent.failed`, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            BroadcastEvent::HeartbeatTick { .. } => "heartbeat.tick",
            BroadcastEvent::HeartbeatIdle => "heartbeat.idle",
            BroadcastEvent::HeartbeatSpawned { .. } => "heartbeat.spawned",
            BroadcastEvent::HeartbeatRetry { .. } => "heartbeat.retry",
            BroadcastEvent::HeartbeatError { .. } => "heartbeat.error",
            BroadcastEvent::HeartbeatCardCreated { .. } => "heartbeat.cardCreated",
            BroadcastEvent::AgentStarted { .. } => "agent.started",
            BroadcastEvent::AgentCompleted { .. } => "agent.completed",
            BroadcastEvent::AgentFailed { .. } => "agent.failed",
            BroadcastEvent::AgentCancelled { .. } => "agent.cancelled",
        }
    }
}

/// Fanout sink for [`BroadcastEvent`]s.
///
/// Cloning is cheap; all clones share one channel. Emitting never fails:
/// zero subscribers is a normal state.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<BroadcastEvent>,
}

impl BroadcastBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn emit(&self, event: BroadcastEvent) {
        debug!(event = "core.bus.emit", kind = event.kind());
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_tags() {
        let event = BroadcastEvent::HeartbeatTick {
            projects_scanned: 2,
            agents_running: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"heartbeat.tick\""));
        assert!(json.contains("\"projectsScanned\":2"));
        assert!(json.contains("\"agentsRunning\":1"));
    }

    #[test]
    fn test_event_serde_roundtrip() {
        let event = BroadcastEvent::HeartbeatRetry {
            card_id: "c1".to_string(),
            previous_status: "blocked".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("previousStatus"));
        let parsed: BroadcastEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_kind_matches_serde_tag() {
        let events = vec![
            BroadcastEvent::HeartbeatIdle,
            BroadcastEvent::HeartbeatCardCreated {
                source: "submitTaskBrief".to_string(),
                title: "t".to_string(),
            },
            BroadcastEvent::AgentCompleted {
                card_id: "c1".to_string(),
            },
            BroadcastEvent::AgentCancelled {
                card_id: "c1".to_string(),
            },
        ];
        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            assert!(
                json.contains(&format!("\"type\":\"{}\"", event.kind())),
                "tag mismatch for {json}"
            );
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_ok() {
        let bus = BroadcastBus::new();
        bus.emit(BroadcastEvent::HeartbeatIdle);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = BroadcastBus::new();
        let mut rx = bus.subscribe();
        bus.emit(BroadcastEvent::AgentCompleted {
            card_id: "c1".to_string(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "agent.completed");
    }
}
