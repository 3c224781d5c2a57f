use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum HuddleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("mesh error: {0}")]
    Mesh(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("peer.max_retries must be 0-5".into());
        assert_eq!(
            err.to_string(),
            "config validation error: peer.max_retries must be 0-5"
        );
    }

    #[test]
    fn huddle_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: HuddleError = config_err.into();
        assert!(matches!(err, HuddleError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn huddle_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err: HuddleError = io_err.into();
        assert!(matches!(err, HuddleError::Io(_)));
        assert!(err.to_string().contains("port taken"));
    }

    #[test]
    fn huddle_error_other_variants() {
        let err = HuddleError::Network("relay unreachable".into());
        assert_eq!(err.to_string(), "network error: relay unreachable");

        let err = HuddleError::Mesh("peer lost".into());
        assert_eq!(err.to_string(), "mesh error: peer lost");

        let err = HuddleError::Other("something went wrong".into());
        assert_eq!(err.to_string(), "something went wrong");
    }
}
