use thiserror::Error;

/// Multiarch error types
#[derive(Error, Debug)]
pub enum MultiarchError {
    /// Malformed image reference
    #[error("Invalid image reference: {0}")]
    Reference(String),

    /// Push spec (YAML or CLI arguments) could not be loaded or is invalid
    #[error("Spec error: {0}")]
    Spec(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Container registry error
    #[error("Registry error: {registry} - {message}")]
    Registry { registry: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for MultiarchError {
    fn from(err: serde_json::Error) -> Self {
        MultiarchError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for MultiarchError {
    fn from(err: serde_yaml::Error) -> Self {
        MultiarchError::Serialization(err.to_string())
    }
}

/// Result type alias for multiarch operations
pub type Result<T> = std::result::Result<T, MultiarchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_error_display() {
        let error = MultiarchError::Reference("empty reference".to_string());
        assert_eq!(error.to_string(), "Invalid image reference: empty reference");
    }

    #[test]
    fn test_spec_error_display() {
        let error = MultiarchError::Spec("missing manifests".to_string());
        assert_eq!(error.to_string(), "Spec error: missing manifests");
    }

    #[test]
    fn test_registry_error_display() {
        let error = MultiarchError::Registry {
            registry: "ghcr.io".to_string(),
            message: "authentication failed".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Registry error: ghcr.io - authentication failed"
        );
    }

    #[test]
    fn test_config_error_display() {
        let error = MultiarchError::Config("unknown manifest type".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: unknown manifest type"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: MultiarchError = io_error.into();
        assert!(matches!(error, MultiarchError::Io(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> =
            serde_json::from_str("{ invalid json }");
        let error: MultiarchError = result.unwrap_err().into();
        assert!(matches!(error, MultiarchError::Serialization(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let error: MultiarchError = result.unwrap_err().into();
        assert!(matches!(error, MultiarchError::Serialization(_)));
    }

    #[test]
    fn test_other_error_display() {
        let error = MultiarchError::Other("unexpected state".to_string());
        assert_eq!(error.to_string(), "unexpected state");
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        assert_eq!(returns_ok().unwrap(), 42);
    }
}
