use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum WorktreeError {
    #[error("Not inside a git repository (searched from '{start}')")]
    NotInRepository { start: PathBuf },

    #[error(
        "Failed to acquire worktree for branch '{branch}': fresh-branch attempt: {fresh}; existing-branch attempt: {existing}"
    )]
    AcquireFailed {
        branch: String,
        fresh: String,
        existing: String,
    },

    #[error("Git invocation failed: {source}")]
    GitSpawn {
        #[from]
        source: maslow_core::capabilities::SpawnError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_failed_names_both_attempts() {
        let error = WorktreeError::AcquireFailed {
            branch: "agent/claude/fix-1234abcd".to_string(),
            fresh: "branch already exists".to_string(),
            existing: "branch is checked out elsewhere".to_string(),
        };
        let text = error.to_string();
        assert!(text.contains("agent/claude/fix-1234abcd"));
        assert!(text.contains("already exists"));
        assert!(text.contains("checked out elsewhere"));
    }
}
