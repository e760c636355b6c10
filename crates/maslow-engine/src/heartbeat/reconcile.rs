//! Startup reconciliation.
//!
//! After a crash or restart, the board can claim work is underway that no
//! process is doing, and `.worktrees/` can hold directories no card
//! references. Both are swept before the first tick.

use std::collections::HashSet;

use tracing::{info, warn};

use maslow_core::model::Column;

use crate::context::Collaborators;
use crate::worktree::{WorktreeManager, card_prefix};

/// Return every stuck in-progress card (agent running or blocked) to the
/// backlog. Its agent either crashed or was killed; the workflow resumes
/// from scratch, seeded by the saved context snapshot.
pub(crate) async fn reset_stuck_cards(ctx: &Collaborators) {
    let projects = match ctx.projects.get_projects().await {
        Ok(projects) => projects,
        Err(e) => {
            warn!(event = "engine.reconcile.project_scan_failed", error = %e);
            return;
        }
    };

    for project in projects.iter().filter(|p| p.is_active()) {
        let board = match ctx.kanban.get_board(&project.id).await {
            Ok(board) => board,
            Err(e) => {
                warn!(
                    event = "engine.reconcile.board_read_failed",
                    project_id = %project.id,
                    error = %e,
                );
                continue;
            }
        };

        for card in board {
            if !card.is_stuck_in_progress() {
                continue;
            }
            info!(
                event = "engine.reconcile.stuck_card_reset",
                card_id = %card.id,
                project_id = %project.id,
                agent_status = ?card.agent_status,
            );
            if let Err(e) = ctx.kanban.skip_to_back(&card.id).await {
                warn!(
                    event = "engine.reconcile.stuck_card_reset_failed",
                    card_id = %card.id,
                    error = %e,
                );
            }
        }
    }
}

/// Force-remove worktree directories not referenced by any in-progress
/// card. Runs after [`reset_stuck_cards`], so directories belonging to
/// just-reset cards are swept too.
pub(crate) async fn sweep_orphan_worktrees(ctx: &Collaborators, worktrees: &WorktreeManager) {
    let mut referenced: HashSet<String> = HashSet::new();
    if let Ok(projects) = ctx.projects.get_projects().await {
        for project in projects.iter().filter(|p| p.is_active()) {
            if let Ok(board) = ctx.kanban.get_board(&project.id).await {
                for card in board {
                    if card.column == Column::InProgress {
                        referenced.insert(card_prefix(&card.id).to_string());
                    }
                }
            }
        }
    }

    for dir in worktrees.list_dirs().await {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        if referenced.contains(&name) {
            continue;
        }
        warn!(event = "engine.reconcile.orphan_worktree", path = %dir.display());
        worktrees.release(&dir).await;
    }
}
