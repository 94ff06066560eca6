//! Error types for tool-bridge provider supervision.

use thiserror::Error;

/// Errors surfaced to callers of [`crate::Supervisor`] and [`crate::ProviderSession`].
///
/// Variants are distinct and non-overlapping per provider operation.
/// `SpawnError`, `HandshakeError`, `DiscoveryError`, and `ProviderDead` are
/// side-effecting — they guarantee the session is not retained in the
/// registry as Ready. `Timeout` and `RemoteError` leave the session intact.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Provider name not present in configuration.
    #[error("provider '{0}' is not configured")]
    NotConfigured(String),

    /// Exec failed, or the child exited before the handshake completed.
    #[error("failed to spawn provider '{0}': {1}")]
    SpawnError(String, String),

    /// `initialize` response missing, malformed, or carried an `error` object.
    #[error("handshake failed for provider '{0}': {1}")]
    HandshakeError(String, String),

    /// `tools/list` response malformed.
    #[error("tool discovery failed for provider '{0}': {1}")]
    DiscoveryError(String, String),

    /// Lifecycle operation requested on a name with no session.
    #[error("provider '{0}' is not loaded")]
    NotLoaded(String),

    /// Session observed terminated during a call.
    #[error("provider '{0}' died: {1}")]
    ProviderDead(String, String),

    /// Per-call deadline elapsed with no correlated response.
    #[error("call to provider '{0}' timed out after {1:?}")]
    Timeout(String, std::time::Duration),

    /// Response framing broken, or response id did not match the issued id.
    #[error("protocol error with provider '{0}': {1}")]
    ProtocolError(String, String),

    /// The child returned a well-formed JSON-RPC error object.
    #[error("provider '{0}' returned an error: {1}")]
    RemoteError(String, String),
}

/// Result type alias for tool-bridge operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_configured_display() {
        let err = ProviderError::NotConfigured("echo".to_string());
        assert_eq!(err.to_string(), "provider 'echo' is not configured");
    }

    #[test]
    fn test_timeout_display() {
        let err = ProviderError::Timeout("echo".to_string(), std::time::Duration::from_secs(5));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_remote_error_display() {
        let err = ProviderError::RemoteError("echo".to_string(), "boom".to_string());
        assert_eq!(err.to_string(), "provider 'echo' returned an error: boom");
    }

    #[test]
    fn test_not_loaded_display() {
        let err = ProviderError::NotLoaded("echo".to_string());
        assert_eq!(err.to_string(), "provider 'echo' is not loaded");
    }
}
