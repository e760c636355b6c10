use async_trait::async_trait;

use super::errors::StoreError;
use crate::model::Card;

/// A skill selected for a task: a named block of instructions the build
/// agent should follow.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillRef {
    pub name: String,
    pub instructions: String,
}

/// Skill selection and rendering.
#[async_trait]
pub trait SkillProvider: Send + Sync {
    /// Pick the skills relevant to a card. May be empty.
    async fn select_for_task(&self, card: &Card) -> Result<Vec<SkillRef>, StoreError>;

    /// Render selected skills into a prompt block. Empty input renders to an
    /// empty string.
    fn build_prompt_block(&self, skills: &[SkillRef]) -> String;
}
