use serde::{Deserialize, Serialize};

/// Lifecycle status of a project. Only `active` projects are scanned by the
/// heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Paused,
    Archived,
}

/// A project owning one kanban board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: ProjectStatus,
    /// Per-agent watchdog override in minutes. Falls back to the engine
    /// default (60) when absent.
    #[serde(default)]
    pub agent_timeout_minutes: Option<u64>,
    /// Downward-only override of the global agent cap. `Some(0)` parks the
    /// project; values above the fixed per-project cap of 1 have no effect.
    #[serde(default)]
    pub max_concurrent_agents: Option<usize>,
}

impl Project {
    pub fn is_active(&self) -> bool {
        self.status == ProjectStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(status: ProjectStatus) -> Project {
        Project {
            id: "p1".to_string(),
            name: "maslow".to_string(),
            description: None,
            status,
            agent_timeout_minutes: None,
            max_concurrent_agents: None,
        }
    }

    #[test]
    fn test_is_active() {
        assert!(project(ProjectStatus::Active).is_active());
        assert!(!project(ProjectStatus::Paused).is_active());
        assert!(!project(ProjectStatus::Archived).is_active());
    }

    #[test]
    fn test_status_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&ProjectStatus::Active).unwrap(),
            "\"active\""
        );
        let parsed: ProjectStatus = serde_json::from_str("\"archived\"").unwrap();
        assert_eq!(parsed, ProjectStatus::Archived);
    }

    #[test]
    fn test_project_serde_camel_case() {
        let mut p = project(ProjectStatus::Active);
        p.agent_timeout_minutes = Some(30);
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("agentTimeoutMinutes"));
        let parsed: Project = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, p);
    }
}
