//! Prompt assembly for background build agents.
//!
//! [`build`] is pure: the same card, project, and inputs always produce the
//! same string. Collaborator-derived pieces (steering corrections, skill
//! blocks, the prior snapshot) are gathered by the caller and passed in.

pub mod templates;

use crate::model::{Card, Project};

/// Collaborator-derived prompt pieces, gathered before assembly.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptInputs<'a> {
    /// Steering corrections block. Omitted from the prompt when empty.
    pub steering_block: &'a str,
    /// The card's previous context snapshot, if it has been worked before.
    pub previous_snapshot: Option<&'a str>,
    /// Rendered skill block. Omitted from the prompt when empty.
    pub skill_block: &'a str,
}

/// Build the final instruction string for one card.
///
/// Sections appear in a fixed order: identity, card, project, steering,
/// prior snapshot, skills, research protocol, completion checklist.
pub fn build(card: &Card, project: Option<&Project>, inputs: &PromptInputs<'_>) -> String {
    let mut sections: Vec<String> = Vec::with_capacity(8);

    sections.push(templates::IDENTITY_BLOCK.to_string());

    let mut task = format!("## Task\n\n{}", card.title);
    if !card.description.trim().is_empty() {
        task.push_str("\n\n");
        task.push_str(card.description.trim());
    }
    sections.push(task);

    if let Some(project) = project {
        let mut block = format!("## Project\n\n{}", project.name);
        if let Some(description) = project.description.as_deref()
            && !description.trim().is_empty()
        {
            block.push_str("\n\n");
            block.push_str(description.trim());
        }
        sections.push(block);
    }

    if !inputs.steering_block.trim().is_empty() {
        sections.push(format!(
            "## Steering corrections\n\n{}",
            inputs.steering_block.trim()
        ));
    }

    if let Some(snapshot) = inputs.previous_snapshot
        && !snapshot.trim().is_empty()
    {
        sections.push(format!(
            "## Previous context\n\nA prior agent worked this card. Its last state:\n\n{}",
            snapshot.trim()
        ));
    }

    if !inputs.skill_block.trim().is_empty() {
        sections.push(format!("## Skills\n\n{}", inputs.skill_block.trim()));
    }

    sections.push(templates::DEEP_RESEARCH_PROTOCOL.to_string());
    sections.push(templates::COMPLETION_CHECKLIST.to_string());

    sections.join("\n\n")
}
