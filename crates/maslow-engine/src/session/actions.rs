//! Workspace-action blocks embedded in model replies.
//!
//! Replies may carry fenced blocks:
//!
//! ```text
//! :::action
//! {"type":"create_card","title":"A"}
//! :::
//! ```
//!
//! Parsing is forgiving by contract: blocks that fail to parse, carry a
//! non-string `type`, use an unknown `type`, or omit required fields are
//! silently skipped, and one bad block never stops the rest.

use serde_json::Value;
use tracing::debug;

use maslow_core::model::Column;

/// Block delimiters.
const BLOCK_OPEN: &str = ":::action";
const BLOCK_CLOSE: &str = ":::";

/// A recognized workspace action.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkspaceAction {
    CreateCard {
        title: String,
        description: Option<String>,
        column: Option<Column>,
    },
    MoveCard {
        title: String,
        column: Column,
    },
    LogDecision {
        title: String,
        detail: Option<String>,
    },
    AddAssumption {
        assumption: String,
    },
    UpdateState {
        summary: String,
    },
}

/// Split a reply into its visible text (action blocks removed) and the
/// actions it carried.
pub fn extract_actions(text: &str) -> (String, Vec<WorkspaceAction>) {
    let mut visible: Vec<&str> = Vec::new();
    let mut actions = Vec::new();
    let mut block: Option<Vec<&str>> = None;

    for line in text.lines() {
        match &mut block {
            None => {
                if line.trim() == BLOCK_OPEN {
                    block = Some(Vec::new());
                } else {
                    visible.push(line);
                }
            }
            Some(body) => {
                if line.trim() == BLOCK_CLOSE {
                    if let Some(action) = parse_block(&body.join("\n")) {
                        actions.push(action);
                    }
                    block = None;
                } else {
                    body.push(line);
                }
            }
        }
    }

    // An unterminated block is not an action; restore it as plain text.
    if let Some(body) = block {
        visible.push(BLOCK_OPEN);
        visible.extend(body);
    }

    (visible.join("\n").trim().to_string(), actions)
}

fn parse_block(body: &str) -> Option<WorkspaceAction> {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            debug!(event = "engine.session.action_parse_failed", error = %e);
            return None;
        }
    };
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        debug!(event = "engine.session.action_type_missing");
        return None;
    };

    let string_field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);
    let column_field = |name: &str| {
        value
            .get(name)
            .cloned()
            .and_then(|v| serde_json::from_value::<Column>(v).ok())
    };

    let action = match kind {
        "create_card" => WorkspaceAction::CreateCard {
            title: string_field("title")?,
            description: string_field("description"),
            column: column_field("column"),
        },
        "move_card" => WorkspaceAction::MoveCard {
            title: string_field("title")?,
            column: column_field("column")?,
        },
        "log_decision" => WorkspaceAction::LogDecision {
            title: string_field("title")?,
            detail: string_field("detail"),
        },
        "add_assumption" => WorkspaceAction::AddAssumption {
            assumption: string_field("assumption")?,
        },
        "update_state" => WorkspaceAction::UpdateState {
            summary: string_field("summary")?,
        },
        unknown => {
            debug!(event = "engine.session.action_type_unknown", kind = %unknown);
            return None;
        }
    };
    Some(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_single_create_card() {
        let text = "Sure, queuing it.\n:::action\n{\"type\":\"create_card\",\"title\":\"A\"}\n:::\nDone.";
        let (visible, actions) = extract_actions(text);
        assert_eq!(visible, "Sure, queuing it.\nDone.");
        assert_eq!(
            actions,
            vec![WorkspaceAction::CreateCard {
                title: "A".to_string(),
                description: None,
                column: None,
            }]
        );
    }

    #[test]
    fn test_malformed_and_unknown_blocks_skipped() {
        // One good block, one unknown type, one non-JSON body.
        let text = ":::action\n{\"type\":\"create_card\",\"title\":\"A\"}\n:::\n:::action\n{\"type\":\"invalid\"}\n:::\n:::action\n{not json}\n:::";
        let (visible, actions) = extract_actions(text);
        assert!(visible.is_empty());
        assert_eq!(actions.len(), 1);
        assert!(matches!(&actions[0], WorkspaceAction::CreateCard { title, .. } if title == "A"));
    }

    #[test]
    fn test_missing_required_field_skipped() {
        let text = ":::action\n{\"type\":\"create_card\"}\n:::";
        let (_, actions) = extract_actions(text);
        assert!(actions.is_empty());

        let text = ":::action\n{\"type\":\"move_card\",\"title\":\"A\"}\n:::";
        let (_, actions) = extract_actions(text);
        assert!(actions.is_empty(), "move_card without column must be skipped");
    }

    #[test]
    fn test_non_string_type_skipped() {
        let text = ":::action\n{\"type\":42,\"title\":\"A\"}\n:::";
        let (_, actions) = extract_actions(text);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_move_card_with_column() {
        let text = ":::action\n{\"type\":\"move_card\",\"title\":\"A\",\"column\":\"review\"}\n:::";
        let (_, actions) = extract_actions(text);
        assert_eq!(
            actions,
            vec![WorkspaceAction::MoveCard {
                title: "A".to_string(),
                column: Column::Review,
            }]
        );
    }

    #[test]
    fn test_all_remaining_action_shapes() {
        let text = ":::action\n{\"type\":\"log_decision\",\"title\":\"Use sqlite\"}\n:::\n:::action\n{\"type\":\"add_assumption\",\"assumption\":\"single operator\"}\n:::\n:::action\n{\"type\":\"update_state\",\"summary\":\"MVP running\"}\n:::";
        let (_, actions) = extract_actions(text);
        assert_eq!(actions.len(), 3);
        assert!(matches!(actions[0], WorkspaceAction::LogDecision { .. }));
        assert!(matches!(actions[1], WorkspaceAction::AddAssumption { .. }));
        assert!(matches!(actions[2], WorkspaceAction::UpdateState { .. }));
    }

    #[test]
    fn test_unterminated_block_stays_visible() {
        let text = "hello\n:::action\n{\"type\":\"create_card\",\"title\":\"A\"}";
        let (visible, actions) = extract_actions(text);
        assert!(actions.is_empty());
        assert!(visible.contains(":::action"));
        assert!(visible.contains("create_card"));
    }

    #[test]
    fn test_text_without_blocks_untouched() {
        let (visible, actions) = extract_actions("plain reply, nothing embedded");
        assert_eq!(visible, "plain reply, nothing embedded");
        assert!(actions.is_empty());
    }

    #[test]
    fn test_invalid_column_value_skips_create_card_column() {
        let text = ":::action\n{\"type\":\"create_card\",\"title\":\"A\",\"column\":\"launchpad\"}\n:::";
        let (_, actions) = extract_actions(text);
        // Unknown column keeps the card but drops the column override.
        assert_eq!(
            actions,
            vec![WorkspaceAction::CreateCard {
                title: "A".to_string(),
                description: None,
                column: None,
            }]
        );
    }
}
