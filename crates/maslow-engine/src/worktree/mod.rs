//! Branch-scoped git worktree lifecycle.
//!
//! Each live agent gets a dedicated worktree under `<repoRoot>/.worktrees/`
//! on a branch named `agent/<agent>/<slug>-<cardId[0:8]>`. The repository
//! root is discovered through git2; all mutations run through the `git` CLI
//! so they inherit the operator's credential helpers.

mod errors;

pub use errors::WorktreeError;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use maslow_core::capabilities::{SpawnSpec, Subprocess};
use maslow_core::model::AgentKind;

use crate::subprocess::{CommandOutput, run_to_completion};

/// Directory under the repository root holding all agent worktrees.
pub const WORKTREES_DIR: &str = ".worktrees";

/// Branch namespace prefix for agent branches.
pub const BRANCH_PREFIX: &str = "agent/";

/// Maximum slug length derived from a card title.
const SLUG_MAX_LEN: usize = 50;

/// Length of the card-id prefix used in branch and directory names.
const CARD_PREFIX_LEN: usize = 8;

/// How many trailing stderr lines to keep in acquisition errors.
const ERROR_TAIL_LINES: usize = 5;

/// Slug a card title: lowercase, non-alphanumeric runs collapsed to `-`,
/// trimmed, capped at 50 characters.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= SLUG_MAX_LEN {
            break;
        }
    }
    slug.truncate(SLUG_MAX_LEN);
    slug.trim_matches('-').to_string()
}

/// The first eight characters of a card id (or the whole id when shorter).
pub fn card_prefix(card_id: &str) -> &str {
    let end = card_id
        .char_indices()
        .nth(CARD_PREFIX_LEN)
        .map(|(i, _)| i)
        .unwrap_or(card_id.len());
    &card_id[..end]
}

/// Deterministic branch name for a card: `agent/<agent>/<slug>-<cardId[0:8]>`.
pub fn branch_name(agent: AgentKind, title: &str, card_id: &str) -> String {
    format!(
        "{}{}/{}-{}",
        BRANCH_PREFIX,
        agent.as_str(),
        slugify(title),
        card_prefix(card_id)
    )
}

/// A successfully acquired worktree.
#[derive(Debug, Clone, PartialEq)]
pub struct WorktreeHandle {
    pub dir: PathBuf,
    pub branch: String,
}

pub struct WorktreeManager {
    repo_root: PathBuf,
    subprocess: Arc<dyn Subprocess>,
}

impl WorktreeManager {
    /// Discover the enclosing repository from `start` and manage its
    /// worktrees.
    pub fn discover(start: &Path, subprocess: Arc<dyn Subprocess>) -> Result<Self, WorktreeError> {
        let repo =
            git2::Repository::discover(start).map_err(|_| WorktreeError::NotInRepository {
                start: start.to_path_buf(),
            })?;
        let repo_root = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| WorktreeError::NotInRepository {
                start: start.to_path_buf(),
            })?;
        Ok(Self::new(repo_root, subprocess))
    }

    pub fn new(repo_root: PathBuf, subprocess: Arc<dyn Subprocess>) -> Self {
        Self {
            repo_root,
            subprocess,
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    fn worktrees_dir(&self) -> PathBuf {
        self.repo_root.join(WORKTREES_DIR)
    }

    /// Create (or reattach) the worktree for a card.
    ///
    /// First tries a fresh branch; when that fails (typically because the
    /// branch already exists from a previous run), retries by checking out
    /// the existing branch into a new worktree.
    pub async fn acquire(
        &self,
        card_id: &str,
        agent: AgentKind,
        title: &str,
    ) -> Result<WorktreeHandle, WorktreeError> {
        let branch = branch_name(agent, title, card_id);
        let dir = self.worktrees_dir().join(card_prefix(card_id));
        let dir_str = dir.display().to_string();

        if let Err(e) = tokio::fs::create_dir_all(self.worktrees_dir()).await {
            warn!(event = "engine.worktree.basedir_create_failed", error = %e);
        }

        info!(
            event = "engine.worktree.acquire_started",
            card_id = card_id,
            branch = %branch,
            path = %dir_str,
        );

        let fresh = self
            .run_git(&["worktree", "add", "-b", &branch, &dir_str])
            .await?;
        if fresh.success() {
            info!(event = "engine.worktree.acquire_completed", branch = %branch, reused_branch = false);
            return Ok(WorktreeHandle { dir, branch });
        }

        debug!(
            event = "engine.worktree.fresh_branch_failed",
            branch = %branch,
            stderr = %fresh.tail(ERROR_TAIL_LINES),
        );

        let existing = self.run_git(&["worktree", "add", &dir_str, &branch]).await?;
        if existing.success() {
            info!(event = "engine.worktree.acquire_completed", branch = %branch, reused_branch = true);
            return Ok(WorktreeHandle { dir, branch });
        }

        warn!(
            event = "engine.worktree.acquire_failed",
            branch = %branch,
            stderr = %existing.tail(ERROR_TAIL_LINES),
        );
        Err(WorktreeError::AcquireFailed {
            branch,
            fresh: fresh.tail(ERROR_TAIL_LINES),
            existing: existing.tail(ERROR_TAIL_LINES),
        })
    }

    /// Tear down a worktree. Idempotent: succeeds even when the directory or
    /// branch is already gone. Called from both the happy path and shutdown.
    pub async fn release(&self, dir: &Path) {
        let dir_str = dir.display().to_string();

        match self
            .run_git(&["worktree", "remove", "--force", &dir_str])
            .await
        {
            Ok(out) if out.success() => {
                debug!(event = "engine.worktree.removed", path = %dir_str);
            }
            Ok(out) => {
                // "not a working tree" after a crash or double release is
                // expected; the directory sweep below still applies.
                debug!(
                    event = "engine.worktree.remove_skipped",
                    path = %dir_str,
                    stderr = %out.tail(ERROR_TAIL_LINES),
                );
            }
            Err(e) => {
                warn!(event = "engine.worktree.remove_spawn_failed", path = %dir_str, error = %e);
            }
        }

        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => debug!(event = "engine.worktree.dir_deleted", path = %dir_str),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(event = "engine.worktree.dir_delete_failed", path = %dir_str, error = %e),
        }

        if let Ok(out) = self.run_git(&["worktree", "prune"]).await
            && !out.success()
        {
            debug!(event = "engine.worktree.prune_failed", stderr = %out.tail(ERROR_TAIL_LINES));
        }

        info!(event = "engine.worktree.release_completed", path = %dir_str);
    }

    /// Enumerate worktree directories currently on disk. Used by the startup
    /// reconciler's orphan sweep.
    pub async fn list_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(self.worktrees_dir()).await else {
            return dirs;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                dirs.push(entry.path());
            }
        }
        dirs
    }

    async fn run_git(&self, args: &[&str]) -> Result<CommandOutput, WorktreeError> {
        let spec = SpawnSpec::new("git", self.repo_root.clone()).args(args.iter().copied());
        Ok(run_to_completion(self.subprocess.as_ref(), spec).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maslow_core::test_support::{FakeSubprocess, ScriptedOutcome};
    use std::fs;
    use std::process::Command;
    use tempfile::TempDir;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Fix the build"), "fix-the-build");
        assert_eq!(slugify("Add OAuth2 support!!"), "add-oauth2-support");
        assert_eq!(slugify("  weird   spacing  "), "weird-spacing");
        assert_eq!(slugify("___"), "");
    }

    #[test]
    fn test_slugify_caps_length() {
        let long = "a".repeat(120);
        assert_eq!(slugify(&long).len(), 50);
    }

    #[test]
    fn test_card_prefix() {
        assert_eq!(card_prefix("abcdef1234567890"), "abcdef12");
        assert_eq!(card_prefix("short"), "short");
    }

    #[test]
    fn test_branch_name() {
        let branch = branch_name(AgentKind::Claude, "Fix the build", "abcdef1234567890");
        assert_eq!(branch, "agent/claude/fix-the-build-abcdef12");
        assert!(branch.starts_with(BRANCH_PREFIX));
    }

    #[test]
    fn test_branch_name_per_agent() {
        let codex = branch_name(AgentKind::Codex, "Task", "12345678");
        assert_eq!(codex, "agent/codex/task-12345678");
    }

    // --- CLI-invocation shape, via the scripted host ---

    #[tokio::test]
    async fn test_acquire_fresh_branch_invocation() {
        let host = Arc::new(FakeSubprocess::new());
        let manager = WorktreeManager::new(PathBuf::from("/repo"), host.clone());

        let handle = manager
            .acquire("abcdef1234567890", AgentKind::Claude, "Fix it")
            .await
            .unwrap();
        assert_eq!(handle.branch, "agent/claude/fix-it-abcdef12");
        assert!(handle.dir.ends_with(".worktrees/abcdef12"));

        let gits = host.records_for("git");
        assert_eq!(gits.len(), 1);
        assert_eq!(gits[0].args[..3], ["worktree", "add", "-b"]);
    }

    #[tokio::test]
    async fn test_acquire_falls_back_to_existing_branch() {
        let host = Arc::new(FakeSubprocess::new());
        host.script(
            "git",
            Some("-b"),
            ScriptedOutcome::exits_with_output(128, &["fatal: branch already exists"]),
        );
        let manager = WorktreeManager::new(PathBuf::from("/repo"), host.clone());

        let handle = manager
            .acquire("abcdef1234567890", AgentKind::Claude, "Fix it")
            .await
            .unwrap();
        assert_eq!(handle.branch, "agent/claude/fix-it-abcdef12");

        let gits = host.records_for("git");
        assert_eq!(gits.len(), 2);
        // Second attempt checks out the existing branch, no -b.
        assert!(!gits[1].args.contains(&"-b".to_string()));
        assert!(gits[1].args.contains(&handle.branch));
    }

    #[tokio::test]
    async fn test_acquire_failure_reports_both_paths() {
        let host = Arc::new(FakeSubprocess::new());
        host.script(
            "git",
            Some("worktree"),
            ScriptedOutcome::exits_with_output(128, &["fatal: nope"]),
        );
        let manager = WorktreeManager::new(PathBuf::from("/repo"), host);

        let err = manager
            .acquire("abcdef1234567890", AgentKind::Gemini, "Fix it")
            .await
            .unwrap_err();
        assert!(matches!(err, WorktreeError::AcquireFailed { .. }));
    }

    // --- real git, throwaway repositories ---

    fn init_git_repo(dir: &std::path::Path) {
        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.email", "test@test.com"],
            vec!["config", "user.name", "Test"],
        ] {
            Command::new("git")
                .args(&args)
                .current_dir(dir)
                .output()
                .expect("git invocation failed");
        }
        fs::write(dir.join("README.md"), "seed\n").unwrap();
        Command::new("git")
            .args(["add", "."])
            .current_dir(dir)
            .output()
            .unwrap();
        Command::new("git")
            .args(["commit", "-m", "initial"])
            .current_dir(dir)
            .output()
            .unwrap();
    }

    #[tokio::test]
    async fn test_acquire_and_release_against_real_repo() {
        let tmp = TempDir::new().unwrap();
        init_git_repo(tmp.path());

        let manager = WorktreeManager::discover(tmp.path(), Arc::new(crate::TokioSubprocess))
            .expect("repo discovery");

        let handle = manager
            .acquire("abcdef1234567890", AgentKind::Claude, "Fix the build")
            .await
            .unwrap();
        assert!(handle.dir.exists());
        assert!(handle.dir.join("README.md").exists());

        manager.release(&handle.dir).await;
        assert!(!handle.dir.exists());
    }

    #[tokio::test]
    async fn test_acquire_twice_reuses_branch() {
        let tmp = TempDir::new().unwrap();
        init_git_repo(tmp.path());
        let manager =
            WorktreeManager::discover(tmp.path(), Arc::new(crate::TokioSubprocess)).unwrap();

        let first = manager
            .acquire("abcdef1234567890", AgentKind::Claude, "Fix the build")
            .await
            .unwrap();
        manager.release(&first.dir).await;

        // Branch survives release; the retry path must check it out.
        let second = manager
            .acquire("abcdef1234567890", AgentKind::Claude, "Fix the build")
            .await
            .unwrap();
        assert_eq!(first.branch, second.branch);
        assert!(second.dir.exists());
        manager.release(&second.dir).await;
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        init_git_repo(tmp.path());
        let manager =
            WorktreeManager::discover(tmp.path(), Arc::new(crate::TokioSubprocess)).unwrap();

        let handle = manager
            .acquire("abcdef1234567890", AgentKind::Codex, "Task")
            .await
            .unwrap();
        manager.release(&handle.dir).await;
        manager.release(&handle.dir).await;
        manager
            .release(&tmp.path().join(".worktrees").join("never-existed"))
            .await;
    }

    #[tokio::test]
    async fn test_list_dirs() {
        let tmp = TempDir::new().unwrap();
        init_git_repo(tmp.path());
        let manager =
            WorktreeManager::discover(tmp.path(), Arc::new(crate::TokioSubprocess)).unwrap();

        assert!(manager.list_dirs().await.is_empty());

        let handle = manager
            .acquire("abcdef1234567890", AgentKind::Claude, "Task")
            .await
            .unwrap();
        let dirs = manager.list_dirs().await;
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0], handle.dir);
        manager.release(&handle.dir).await;
    }
}
