//! The declarative heartbeat constraints document.
//!
//! Operators steer the scheduler with a Markdown checklist in the workspace
//! (`HEARTBEAT.md`). Parsing is tolerant: unknown lines are ignored, missing
//! knobs keep their defaults, and a missing file means all defaults.
//!
//! ```markdown
//! # Heartbeat
//! - [x] Builder enabled
//! - [ ] Synthesizer enabled
//! - Max concurrent agents: 3
//! - Blocked retry interval: 30
//! - Tick period: 60
//! ```

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

/// File name of the constraints document inside the workspace.
pub const HEARTBEAT_DOC: &str = "HEARTBEAT.md";

/// Scheduler knobs with their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConstraints {
    /// Global cap on concurrently live agents.
    pub max_concurrent_agents: usize,
    /// Cards blocked longer than this are returned to the backlog.
    pub blocked_retry_minutes: i64,
    /// When false, `tick()` does not spawn.
    pub builder_enabled: bool,
    /// When false, `synthesize()` is a no-op.
    pub synthesizer_enabled: bool,
    /// Cron cadence in seconds.
    pub tick_period_secs: u64,
}

impl Default for HeartbeatConstraints {
    fn default() -> Self {
        Self {
            max_concurrent_agents: 3,
            blocked_retry_minutes: 30,
            builder_enabled: true,
            synthesizer_enabled: false,
            tick_period_secs: 60,
        }
    }
}

static CHECKBOX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*]\s*\[(?<state>[ xX])\]\s*(?<label>.+)$").unwrap());

static KNOB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*]?\s*(?<label>[A-Za-z][A-Za-z ]*?)\s*:\s*(?<value>\d+)\s*$").unwrap());

/// Parse a constraints document. Unknown lines are ignored.
pub fn parse(text: &str) -> HeartbeatConstraints {
    let mut constraints = HeartbeatConstraints::default();

    for line in text.lines() {
        if let Some(caps) = CHECKBOX.captures(line) {
            let checked = !caps["state"].trim().is_empty();
            let label = caps["label"].to_lowercase();
            if label.contains("builder") {
                constraints.builder_enabled = checked;
            } else if label.contains("synthesizer") {
                constraints.synthesizer_enabled = checked;
            } else {
                debug!(event = "engine.heartbeat.unknown_toggle", label = %label);
            }
            continue;
        }

        if let Some(caps) = KNOB.captures(line) {
            let label = caps["label"].to_lowercase();
            let Ok(value) = caps["value"].parse::<u64>() else {
                continue;
            };
            if label.contains("max concurrent") {
                constraints.max_concurrent_agents = value as usize;
            } else if label.contains("blocked retry") {
                constraints.blocked_retry_minutes = value as i64;
            } else if label.contains("tick period") {
                constraints.tick_period_secs = value.max(1);
            } else {
                debug!(event = "engine.heartbeat.unknown_knob", label = %label);
            }
        }
    }

    constraints
}

/// Load the constraints document from the workspace, falling back to
/// defaults when it is absent or unreadable.
pub fn load(workspace_dir: &Path) -> HeartbeatConstraints {
    let path = workspace_dir.join(HEARTBEAT_DOC);
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            let constraints = parse(&text);
            info!(
                event = "engine.heartbeat.constraints_loaded",
                path = %path.display(),
                max_concurrent = constraints.max_concurrent_agents,
                builder = constraints.builder_enabled,
                synthesizer = constraints.synthesizer_enabled,
            );
            constraints
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(event = "engine.heartbeat.constraints_defaulted", path = %path.display());
            HeartbeatConstraints::default()
        }
        Err(e) => {
            warn!(
                event = "engine.heartbeat.constraints_read_failed",
                path = %path.display(),
                error = %e,
            );
            HeartbeatConstraints::default()
        }
    }
}
