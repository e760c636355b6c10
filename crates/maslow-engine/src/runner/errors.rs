#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Spawn failed: {source}")]
    Spawn {
        #[from]
        source: maslow_core::capabilities::SpawnError,
    },

    #[error("Capacity violated: {source}")]
    Capacity {
        #[from]
        source: crate::registry::CapacityError,
    },

    #[error("Store error: {source}")]
    Store {
        #[from]
        source: maslow_core::capabilities::StoreError,
    },

    #[error("No live agent for card '{card_id}'")]
    CardNotRunning { card_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_not_running_display() {
        let error = RunnerError::CardNotRunning {
            card_id: "c-9".to_string(),
        };
        assert_eq!(error.to_string(), "No live agent for card 'c-9'");
    }

    #[test]
    fn test_capacity_error_wraps() {
        let error: RunnerError = crate::registry::CapacityError::GlobalCapReached { cap: 3 }.into();
        assert!(error.to_string().contains("Global agent cap reached"));
    }
}
