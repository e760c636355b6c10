//! Agent kind definitions.

use serde::{Deserialize, Serialize};

/// Supported background coding agents.
///
/// Each variant names an external CLI (or, for [`AgentKind::Ollama`], a
/// library-mediated local model) that can be dispatched against a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Claude,
    Codex,
    Gemini,
    Ollama,
}

impl AgentKind {
    /// Get the canonical string name for this agent kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Claude => "claude",
            AgentKind::Codex => "codex",
            AgentKind::Gemini => "gemini",
            AgentKind::Ollama => "ollama",
        }
    }

    /// Parse an agent kind from a string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "claude" => Some(AgentKind::Claude),
            "codex" => Some(AgentKind::Codex),
            "gemini" => Some(AgentKind::Gemini),
            "ollama" => Some(AgentKind::Ollama),
            _ => None,
        }
    }

    /// Get all supported agent kinds.
    pub fn all() -> &'static [AgentKind] {
        &[
            AgentKind::Claude,
            AgentKind::Codex,
            AgentKind::Gemini,
            AgentKind::Ollama,
        ]
    }
}

impl Default for AgentKind {
    fn default() -> Self {
        AgentKind::Claude
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            let supported = AgentKind::all()
                .iter()
                .map(|a| a.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            format!("Unknown agent '{}'. Supported: {}", s, supported)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_kind_as_str() {
        assert_eq!(AgentKind::Claude.as_str(), "claude");
        assert_eq!(AgentKind::Codex.as_str(), "codex");
        assert_eq!(AgentKind::Gemini.as_str(), "gemini");
        assert_eq!(AgentKind::Ollama.as_str(), "ollama");
    }

    #[test]
    fn test_agent_kind_parse() {
        assert_eq!(AgentKind::parse("claude"), Some(AgentKind::Claude));
        assert_eq!(AgentKind::parse("CLAUDE"), Some(AgentKind::Claude));
        assert_eq!(AgentKind::parse("Ollama"), Some(AgentKind::Ollama));
        assert_eq!(AgentKind::parse("unknown"), None);
        assert_eq!(AgentKind::parse(""), None);
    }

    #[test]
    fn test_agent_kind_default_is_claude() {
        assert_eq!(AgentKind::default(), AgentKind::Claude);
    }

    #[test]
    fn test_agent_kind_serde() {
        let json = serde_json::to_string(&AgentKind::Claude).unwrap();
        assert_eq!(json, "\"claude\"");
        let parsed: AgentKind = serde_json::from_str("\"gemini\"").unwrap();
        assert_eq!(parsed, AgentKind::Gemini);
    }

    #[test]
    fn test_agent_kind_from_str_error_lists_supported() {
        use std::str::FromStr;
        let err = AgentKind::from_str("unknown").unwrap_err();
        assert!(err.contains("Unknown agent 'unknown'"));
        assert!(err.contains("claude"));
        assert!(err.contains("ollama"));
    }
}
