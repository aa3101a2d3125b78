//! Gateway error types.

use thiserror::Error;

/// Broad classification of a [`GatewayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed path, query or method.
    Parse,
    /// Invalid base64 body or malformed inbound JSON.
    Decode,
    /// Outbound serialization failure.
    Encode,
    /// Invalid environment configuration.
    Config,
    /// Listener failure in server mode.
    Io,
}

/// Errors that terminate a single invocation (or the local server).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("parse path and query into url {input:?}: {source}")]
    InvalidUrl {
        input: String,
        #[source]
        source: http::uri::InvalidUri,
    },

    #[error("malformed url {input:?}: {reason}")]
    MalformedTarget { input: String, reason: &'static str },

    #[error("building url: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid request method {0:?}")]
    InvalidMethod(String),

    #[error("creating request: {0}")]
    Request(#[from] http::Error),

    #[error("decoding base64 body: {0}")]
    Base64Body(#[from] base64::DecodeError),

    #[error("decoding inbound event: {0}")]
    MalformedEvent(#[source] serde_json::Error),

    #[error("encoding outbound event: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("server io: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::InvalidUrl { .. }
            | GatewayError::MalformedTarget { .. }
            | GatewayError::Url(_)
            | GatewayError::InvalidMethod(_)
            | GatewayError::Request(_) => ErrorKind::Parse,
            GatewayError::Base64Body(_) | GatewayError::MalformedEvent(_) => ErrorKind::Decode,
            GatewayError::Encode(_) => ErrorKind::Encode,
            GatewayError::Config(_) => ErrorKind::Config,
            GatewayError::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(GatewayError::MalformedEvent(err).kind(), ErrorKind::Decode);
        assert_eq!(GatewayError::InvalidMethod("GE T".into()).kind(), ErrorKind::Parse);
        assert_eq!(GatewayError::Config("bad".into()).kind(), ErrorKind::Config);
    }

    #[test]
    fn base64_errors_convert() {
        use base64::Engine as _;
        let err = base64::engine::general_purpose::STANDARD
            .decode("not base64!")
            .unwrap_err();
        let err: GatewayError = err.into();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.to_string().starts_with("decoding base64 body"));
    }
}
