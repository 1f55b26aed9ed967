//! Error Taxonomy
//!
//! A single error-kind enum shared by the client and the server, plus the
//! pure `classify` function that both retry loops consult. Nothing here
//! inspects error message text.

use std::fmt;

/// Every failure the voice-turn pipeline can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The capture device is unavailable or permission was refused.
    PermissionDenied,
    /// The capture engine could not start or produced no audio.
    CaptureFailed,
    /// Connection, DNS, or timeout failure reaching the orchestration server.
    NetworkUnreachable,
    /// HTTP 429/5xx or timeout from an upstream provider.
    ProviderTransient,
    /// Any other provider rejection: 4xx, safety block, empty or invalid payload.
    ProviderFatal,
    /// Malformed request, e.g. no audio uploaded.
    ValidationError,
}

/// Whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Transient,
    Fatal,
}

/// Maps an error kind to its retry disposition.
pub const fn classify(kind: ErrorKind) -> Disposition {
    match kind {
        ErrorKind::NetworkUnreachable | ErrorKind::ProviderTransient => Disposition::Transient,
        ErrorKind::PermissionDenied
        | ErrorKind::CaptureFailed
        | ErrorKind::ProviderFatal
        | ErrorKind::ValidationError => Disposition::Fatal,
    }
}

impl ErrorKind {
    /// Derives a kind from a non-2xx HTTP status.
    pub const fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorKind::ValidationError,
            408 | 429 => ErrorKind::ProviderTransient,
            500..=599 => ErrorKind::ProviderTransient,
            _ => ErrorKind::ProviderFatal,
        }
    }

    /// Short, non-technical text for the client's error state.
    pub const fn user_message(self) -> &'static str {
        match self {
            ErrorKind::PermissionDenied => {
                "Microphone access is needed. Allow it in your settings and try again."
            }
            ErrorKind::CaptureFailed => {
                "I couldn't hear anything. Check your microphone and try again."
            }
            ErrorKind::NetworkUnreachable | ErrorKind::ProviderTransient => {
                "Can't reach the tutor right now. Please try again in a moment."
            }
            ErrorKind::ProviderFatal => {
                "The tutor couldn't answer that one. Try asking it a different way."
            }
            ErrorKind::ValidationError => "Something went wrong sending your question. Please try again.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::CaptureFailed => "capture failed",
            ErrorKind::NetworkUnreachable => "network unreachable",
            ErrorKind::ProviderTransient => "provider transient failure",
            ErrorKind::ProviderFatal => "provider fatal failure",
            ErrorKind::ValidationError => "validation error",
        };
        f.write_str(name)
    }
}

/// Failure of a single provider call. Internal to the server; never sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("transient provider failure: {0}")]
    Transient(String),
    #[error("fatal provider failure: {0}")]
    Fatal(String),
}

/// Tagged per-stage result: `Ok` is success, the error variants drive retry and fallback.
pub type ProviderOutcome<T> = Result<T, ProviderError>;

impl ProviderError {
    /// Classifies a non-2xx provider response. `detail` usually carries the response body.
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        match classify(ErrorKind::from_status(status)) {
            Disposition::Transient => ProviderError::Transient(detail.into()),
            Disposition::Fatal => ProviderError::Fatal(detail.into()),
        }
    }

    /// Classifies a transport-level `reqwest` failure.
    pub fn from_reqwest(provider: &str, err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), format!("{provider}: {err}"));
        }
        if err.is_timeout() || err.is_connect() || err.is_request() {
            ProviderError::Transient(format!("{provider} unreachable: {err}"))
        } else {
            ProviderError::Fatal(format!("{provider} returned an unusable response: {err}"))
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Transient(_) => ErrorKind::ProviderTransient,
            ProviderError::Fatal(_) => ErrorKind::ProviderFatal,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ProviderError::Transient(detail) | ProviderError::Fatal(detail) => detail,
        }
    }
}

/// A classified failure crossing a component boundary.
///
/// `detail` is meant for logs; anything shown to the student comes from
/// [`ErrorKind::user_message`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct TurnError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl TurnError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, detail)
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

impl From<ProviderError> for TurnError {
    fn from(err: ProviderError) -> Self {
        let kind = err.kind();
        let detail = match err {
            ProviderError::Transient(detail) | ProviderError::Fatal(detail) => detail,
        };
        Self { kind, detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_taxonomy() {
        assert_eq!(classify(ErrorKind::NetworkUnreachable), Disposition::Transient);
        assert_eq!(classify(ErrorKind::ProviderTransient), Disposition::Transient);
        assert_eq!(classify(ErrorKind::PermissionDenied), Disposition::Fatal);
        assert_eq!(classify(ErrorKind::CaptureFailed), Disposition::Fatal);
        assert_eq!(classify(ErrorKind::ProviderFatal), Disposition::Fatal);
        assert_eq!(classify(ErrorKind::ValidationError), Disposition::Fatal);
    }

    #[test]
    fn test_from_status() {
        assert_eq!(ErrorKind::from_status(400), ErrorKind::ValidationError);
        assert_eq!(ErrorKind::from_status(401), ErrorKind::ProviderFatal);
        assert_eq!(ErrorKind::from_status(422), ErrorKind::ProviderFatal);
        assert_eq!(ErrorKind::from_status(408), ErrorKind::ProviderTransient);
        assert_eq!(ErrorKind::from_status(429), ErrorKind::ProviderTransient);
        assert_eq!(ErrorKind::from_status(500), ErrorKind::ProviderTransient);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::ProviderTransient);
    }

    #[test]
    fn test_provider_error_from_status() {
        assert_eq!(
            ProviderError::from_status(429, "slow down"),
            ProviderError::Transient("slow down".to_string())
        );
        assert_eq!(
            ProviderError::from_status(403, "bad key"),
            ProviderError::Fatal("bad key".to_string())
        );
    }

    #[test]
    fn test_turn_error_from_provider_error_keeps_kind() {
        let err: TurnError = ProviderError::Fatal("blocked".into()).into();
        assert_eq!(err.kind, ErrorKind::ProviderFatal);
        assert_eq!(err.detail, "blocked");
        assert_eq!(format!("{}", err), "provider fatal failure: blocked");
    }

    #[test]
    fn test_user_messages_hide_details() {
        let err = TurnError::new(ErrorKind::ProviderFatal, r#"{"error":{"code":400}}"#);
        assert!(!err.user_message().contains("400"));
        assert_eq!(
            ErrorKind::NetworkUnreachable.user_message(),
            ErrorKind::ProviderTransient.user_message()
        );
    }
}
