use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::borrow::Cow;
use stow_blob::{BlobError, ErrorCode};
use stow_fileblob::FileBlobError;
use tracing::{error, warn};

/// Request failures, rendered as plain-text responses.
#[stow_derive::stow_error]
pub enum ApiError {
    #[error("Storage error{}: {source}", format_context(.context))]
    Blob { source: BlobError, context: Option<Cow<'static, str>> },

    #[error("Rejected URL{}: {source}", format_context(.context))]
    Signature { source: FileBlobError, context: Option<Cow<'static, str>> },

    #[error("Method {actual} does not match signed method {signed}{}", format_context(.context))]
    MethodMismatch { signed: String, actual: String, context: Option<Cow<'static, str>> },

    #[error("Bad request{}: {message}", format_context(.context))]
    BadRequest { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal server error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl ApiError {
    pub(crate) fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::BadRequest { message: message.into(), context: None }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Blob { source, .. } => status_for(source.code()),
            Self::Signature { .. } | Self::MethodMismatch { .. } => StatusCode::FORBIDDEN,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// HTTP status for an error class.
#[must_use]
pub const fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorCode::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
        ErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_statuses() {
        assert_eq!(status_for(ErrorCode::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorCode::InvalidArgument), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorCode::FailedPrecondition), StatusCode::PRECONDITION_FAILED);
        assert_eq!(status_for(ErrorCode::PermissionDenied), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorCode::Unavailable), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn method_mismatch_is_forbidden() {
        let err = ApiError::MethodMismatch {
            signed: "GET".to_owned(),
            actual: "DELETE".to_owned(),
            context: None,
        };
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert!(err.to_string().contains("signed method GET"));
    }
}
