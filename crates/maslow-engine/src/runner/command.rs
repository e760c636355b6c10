//! Per-agent command construction and the environment contract.

use std::path::Path;

use maslow_core::capabilities::SpawnSpec;
use maslow_core::model::AgentKind;

/// The conversational model's credential variable. Scrubbed from every
/// sub-agent's environment so background agents cannot authenticate against
/// the operator's personal quota.
pub const MODEL_CREDENTIAL_ENV: &str = "ANTHROPIC_API_KEY";

/// Turn ceiling passed to claude's headless mode.
const CLAUDE_MAX_TURNS: &str = "50";

/// Build the launch spec for a CLI-backed agent. Returns `None` for
/// [`AgentKind::Ollama`], which is library-mediated rather than spawned.
///
/// The working directory is always the card's worktree, never the repo root.
pub fn build_spawn_spec(
    agent: AgentKind,
    prompt: &str,
    worktree_dir: &Path,
    resume_session_id: Option<&str>,
) -> Option<SpawnSpec> {
    let spec = match agent {
        AgentKind::Claude => {
            let mut spec = SpawnSpec::new("claude", worktree_dir.to_path_buf()).args([
                "-p",
                "--verbose",
                "--output-format",
                "stream-json",
                "--permission-mode",
                "bypassPermissions",
                "--max-turns",
                CLAUDE_MAX_TURNS,
            ]);
            if let Some(session_id) = resume_session_id {
                spec = spec.args(["--resume", session_id]);
            }
            spec.arg(prompt)
        }
        AgentKind::Codex => SpawnSpec::new("codex", worktree_dir.to_path_buf())
            .args(["--approval-mode", "full-auto"])
            .arg(prompt),
        AgentKind::Gemini => SpawnSpec::new("gemini", worktree_dir.to_path_buf())
            .arg("-y")
            .arg(prompt),
        AgentKind::Ollama => return None,
    };
    Some(spec.env_remove(MODEL_CREDENTIAL_ENV))
}
