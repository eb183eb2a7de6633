use thiserror::Error;

/// The seven error kinds of the gateway's error taxonomy (spec §7).
///
/// Every failure that can reach a client is converted into one of these
/// before it crosses the turn boundary; none of them carry raw provider
/// stack traces, only a sanitized message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("config timeout")]
    ConfigTimeout,

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("provider rpc error in {stage}: {message}")]
    ProviderRpcError { stage: &'static str, message: String },

    #[error("provider timeout in {stage}")]
    ProviderTimeout { stage: &'static str },

    /// Transport closed by the peer. Never surfaced as an error frame.
    #[error("client disconnected")]
    ClientDisconnect,

    #[error("internal error: {0}")]
    InternalError(String),
}

impl GatewayError {
    /// Machine-readable error kind, used as the metrics `error_kind` label
    /// and echoed (never the raw message) in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::ConfigTimeout => "config_timeout",
            GatewayError::UnsupportedLanguage(_) => "unsupported_language",
            GatewayError::ProviderUnavailable(_) => "provider_unavailable",
            GatewayError::ProviderRpcError { .. } => "provider_rpc_error",
            GatewayError::ProviderTimeout { .. } => "timeout",
            GatewayError::ClientDisconnect => "client_disconnect",
            GatewayError::InternalError(_) => "internal_error",
        }
    }

    /// Sanitized message safe to put in a client-visible error frame. Never
    /// includes the raw provider status or internal detail.
    pub fn client_message(&self) -> String {
        match self {
            GatewayError::ConfigTimeout => "Config timeout".to_string(),
            GatewayError::UnsupportedLanguage(_) => "Unsupported language".to_string(),
            GatewayError::ProviderUnavailable(_) => {
                "Upstream service is unavailable, please try again".to_string()
            }
            GatewayError::ProviderRpcError { stage, .. } => {
                format!("{stage} failed, please try again")
            }
            GatewayError::ProviderTimeout { stage } => format!("{stage} timed out"),
            GatewayError::ClientDisconnect => String::new(),
            GatewayError::InternalError(_) => "An internal error occurred".to_string(),
        }
    }

    /// Whether this error should drop the session back to IDLE rather than
    /// tear down the connection entirely.
    pub fn recoverable(&self) -> bool {
        !matches!(self, GatewayError::ConfigTimeout | GatewayError::ClientDisconnect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_disconnect_has_empty_message() {
        assert_eq!(GatewayError::ClientDisconnect.client_message(), "");
    }

    #[test]
    fn unsupported_language_message_matches_spec_wording() {
        let err = GatewayError::UnsupportedLanguage("zz-ZZ".to_string());
        assert!(err.client_message().contains("Unsupported language"));
    }

    #[test]
    fn config_timeout_is_unrecoverable() {
        assert!(!GatewayError::ConfigTimeout.recoverable());
        assert!(GatewayError::ProviderTimeout { stage: "asr" }.recoverable());
    }
}
