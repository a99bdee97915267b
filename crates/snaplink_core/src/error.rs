use std::fmt;

use thiserror::Error;

/// Failure classification shared by every stage of a resolution.
///
/// Kinds, not causes: each variant tells the calling layer whether the input
/// was bad, the upstream misbehaved, or its payload changed shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No recognizable source URL in the supplied text. Never retried.
    Input,
    /// Network failure, timeout, non-2xx status, or an exhausted
    /// redirect/retry budget.
    UpstreamUnavailable,
    /// The obfuscated signing configuration failed to decode or its
    /// expected key set is gone.
    SignatureDerivation,
    /// The upstream explicitly reported a processing failure code.
    /// Authoritative; never retried.
    Conversion,
    /// Progress polling exhausted its attempt budget.
    PollTimeout,
    /// The response body matched no recognized shape.
    Parse,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Input => write!(f, "input error"),
            ErrorKind::UpstreamUnavailable => write!(f, "upstream unavailable"),
            ErrorKind::SignatureDerivation => write!(f, "signature derivation failed"),
            ErrorKind::Conversion => write!(f, "conversion failed"),
            ErrorKind::PollTimeout => write!(f, "poll timeout"),
            ErrorKind::Parse => write!(f, "parse error"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ResolveError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ResolveError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Input, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamUnavailable, message)
    }

    pub fn signature(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SignatureDerivation, message)
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conversion, message)
    }

    pub fn poll_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PollTimeout, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }
}
