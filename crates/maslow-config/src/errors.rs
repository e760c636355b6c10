#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse config file '{path}': {message}")]
    ParseFailed { path: String, message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Could not resolve the home directory for user config lookup")]
    HomeDirUnavailable,

    #[error("IO error reading config: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_failed_display() {
        let error = ConfigError::ParseFailed {
            path: "/tmp/config.toml".to_string(),
            message: "expected table".to_string(),
        };
        assert!(error.to_string().contains("/tmp/config.toml"));
        assert!(error.to_string().contains("expected table"));
    }

    #[test]
    fn test_invalid_display() {
        let error = ConfigError::Invalid {
            message: "telegram.bot_token must not be empty".to_string(),
        };
        assert!(error.to_string().contains("bot_token"));
    }
}
