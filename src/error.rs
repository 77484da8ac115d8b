//! Error types for the xyz provider.

use thiserror::Error;

/// Errors that can occur while serving provider requests.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource type is not registered with the provider.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A gRPC transport error occurred.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Binding or reading the listener failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation not implemented by the resource.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// Invalid request from the host.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::UnknownResource("xyz_missing".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: xyz_missing");

        let err = ProviderError::Unimplemented("update".to_string());
        assert_eq!(format!("{}", err), "Unimplemented: update");

        let err = ProviderError::Configuration("expected an object".to_string());
        assert_eq!(format!("{}", err), "Configuration error: expected an object");

        let err = ProviderError::InvalidRequest("bad request".to_string());
        assert_eq!(format!("{}", err), "Invalid request: bad request");
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<u32>("\"ten\"").unwrap_err();
        let err: ProviderError = json_err.into();
        assert!(matches!(err, ProviderError::Serialization(_)));
        assert!(format!("{}", err).starts_with("Serialization error:"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err: ProviderError = io_err.into();
        assert!(matches!(err, ProviderError::Io(_)));
        assert!(format!("{}", err).contains("address in use"));
    }
}
