//! Error taxonomy.
//!
//! # Design Decisions
//! - Condition non-matches are `None`, never errors
//! - `DispatchError` is translated to a wire code in exactly one place
//!   (`DispatchError::response_code`), used by the dispatcher
//! - Handler code reports failures through `HandlerError`, optionally
//!   choosing its own response code

use std::fmt;

use bytes::Bytes;

use crate::message::media::InvalidMediaType;
use crate::message::method::UnknownMethod;
use crate::message::{Method, Response, ResponseCode};
use crate::observe::RelationKey;
use crate::routing::NoMatchReason;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure reported by application handler code.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    code: Option<ResponseCode>,
    #[source]
    source: Option<BoxError>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            source: None,
        }
    }

    /// A failure that should be answered with `code` instead of 5.00.
    pub fn with_code(code: ResponseCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
            source: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_code(ResponseCode::BadRequest, message)
    }

    pub fn from_source(source: impl Into<BoxError>) -> Self {
        let source = source.into();
        Self {
            message: source.to_string(),
            code: None,
            source: Some(source),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<ResponseCode> {
        self.code
    }
}

/// Errors raised while building routes and the mapping registry.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("invalid path pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },

    #[error(transparent)]
    InvalidMediaType(#[from] InvalidMediaType),

    #[error("invalid header expression `{0}`")]
    InvalidHeaderExpression(String),

    #[error(transparent)]
    UnknownMethod(#[from] UnknownMethod),

    #[error("ambiguous mapping: cannot map `{handler}` to {route}, `{existing}` is already mapped there")]
    DuplicateRoute {
        route: String,
        existing: String,
        handler: String,
    },
}

/// Errors surfaced by a dispatch.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no handler for {method} {path} ({reason})")]
    NoHandler {
        method: Method,
        path: String,
        reason: NoMatchReason,
    },

    #[error("ambiguous handler methods mapped for {path}: `{first}` and `{second}`")]
    AmbiguousRoute {
        path: String,
        first: String,
        second: String,
    },

    #[error("cannot resolve argument {index} of type `{declared}` for `{handler}`")]
    UnresolvableArgument {
        handler: String,
        index: usize,
        declared: String,
    },

    #[error("handler target for `{handler}` is unavailable: {source}")]
    TargetUnavailable {
        handler: String,
        #[source]
        source: BoxError,
    },

    #[error("handler `{handler}` failed: {source}")]
    HandlerInvocationFailed {
        handler: String,
        #[source]
        source: HandlerError,
    },

    #[error("observed stream for {relation} failed: {source}")]
    StreamFailed {
        relation: RelationKey,
        #[source]
        source: HandlerError,
    },

    #[error("observation {relation} was cancelled before it produced a value")]
    ObservationCancelled { relation: RelationKey },
}

impl DispatchError {
    /// Wire code for this error.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            DispatchError::NoHandler { reason, .. } => reason.response_code(),
            DispatchError::AmbiguousRoute { .. } | DispatchError::UnresolvableArgument { .. } => {
                ResponseCode::InternalServerError
            }
            DispatchError::TargetUnavailable { .. } | DispatchError::ObservationCancelled { .. } => {
                ResponseCode::ServiceUnavailable
            }
            DispatchError::HandlerInvocationFailed { source, .. }
            | DispatchError::StreamFailed { source, .. } => {
                source.code().unwrap_or(ResponseCode::InternalServerError)
            }
        }
    }

    /// Error response; the diagnostic text is only included when `expose` is set.
    pub fn to_response(&self, expose: bool) -> Response {
        let mut response = Response::with_code(self.response_code());
        if expose {
            response.payload = Bytes::from(self.to_string());
            response.content_format = Some(crate::message::ContentFormat::TEXT_PLAIN);
        }
        response
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::NoHandler { .. } => ErrorKind::NoHandler,
            DispatchError::AmbiguousRoute { .. } => ErrorKind::AmbiguousRoute,
            DispatchError::UnresolvableArgument { .. } => ErrorKind::UnresolvableArgument,
            DispatchError::TargetUnavailable { .. } => ErrorKind::TargetUnavailable,
            DispatchError::HandlerInvocationFailed { .. } => ErrorKind::HandlerInvocationFailed,
            DispatchError::StreamFailed { .. } => ErrorKind::StreamFailed,
            DispatchError::ObservationCancelled { .. } => ErrorKind::ObservationCancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoHandler,
    AmbiguousRoute,
    UnresolvableArgument,
    TargetUnavailable,
    HandlerInvocationFailed,
    StreamFailed,
    ObservationCancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NoHandler => "no_handler",
            ErrorKind::AmbiguousRoute => "ambiguous_route",
            ErrorKind::UnresolvableArgument => "unresolvable_argument",
            ErrorKind::TargetUnavailable => "target_unavailable",
            ErrorKind::HandlerInvocationFailed => "handler_invocation_failed",
            ErrorKind::StreamFailed => "stream_failed",
            ErrorKind::ObservationCancelled => "observation_cancelled",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_code_wins_over_default() {
        let err = DispatchError::HandlerInvocationFailed {
            handler: "led#set".into(),
            source: HandlerError::bad_request("state must be on or off"),
        };
        assert_eq!(err.response_code(), ResponseCode::BadRequest);

        let err = DispatchError::HandlerInvocationFailed {
            handler: "led#set".into(),
            source: HandlerError::new("boom"),
        };
        assert_eq!(err.response_code(), ResponseCode::InternalServerError);
    }

    #[test]
    fn error_payload_hidden_unless_exposed() {
        let err = DispatchError::NoHandler {
            method: Method::Get,
            path: "/nope".into(),
            reason: NoMatchReason::NoRoute,
        };
        let hidden = err.to_response(false);
        assert_eq!(hidden.code, Some(ResponseCode::NotFound));
        assert!(hidden.payload.is_empty());

        let shown = err.to_response(true);
        assert!(shown.payload_str().unwrap().contains("/nope"));
    }

    #[test]
    fn from_source_keeps_message() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "sensor offline");
        let err = HandlerError::from_source(io);
        assert_eq!(err.message(), "sensor offline");
        assert!(std::error::Error::source(&err).is_some());
    }
}
