use crate::driver::DriverError;
use std::borrow::Cow;
use std::io;

/// Closed set of error classes every backend maps its failures into.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    PermissionDenied,
    FailedPrecondition,
    ResourceExhausted,
    Aborted,
    Unavailable,
    Unauthenticated,
    Unimplemented,
    Internal,
    Unknown,
}

impl From<&io::Error> for ErrorCode {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => Self::NotFound,
            io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
                Self::PermissionDenied
            },
            io::ErrorKind::AlreadyExists => Self::AlreadyExists,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidFilename => Self::InvalidArgument,
            io::ErrorKind::StorageFull
            | io::ErrorKind::QuotaExceeded
            | io::ErrorKind::OutOfMemory
            | io::ErrorKind::FileTooLarge => Self::ResourceExhausted,
            io::ErrorKind::Interrupted => Self::Aborted,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Unavailable,
            io::ErrorKind::Unsupported => Self::Unimplemented,
            _ => Self::Unknown,
        }
    }
}

/// A driver error that has already been classified at the driver boundary.
///
/// Carries the operation and key it happened on; the code is never re-derived.
#[derive(Debug, thiserror::Error)]
#[error("{op} {key:?}: {source}")]
pub struct DriverFailure {
    pub code: ErrorCode,
    pub op: &'static str,
    pub key: String,
    pub source: DriverError,
}

impl From<&DriverFailure> for ErrorCode {
    fn from(failure: &DriverFailure) -> Self {
        failure.code
    }
}

/// Errors surfaced by the bucket facade.
#[stow_derive::stow_error(code = ErrorCode)]
pub enum BlobError {
    #[code(FailedPrecondition)]
    #[error("Bucket has been closed{}", format_context(.context))]
    Closed { context: Option<Cow<'static, str>> },

    #[code(InvalidArgument)]
    #[error("Invalid argument{}: {message}", format_context(.context))]
    InvalidArgument { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[code(FailedPrecondition)]
    #[error(
        "Content MD5 mismatch{}: expected {expected}, calculated {calculated}",
        format_context(.context)
    )]
    DigestMismatch { expected: String, calculated: String, context: Option<Cow<'static, str>> },

    #[code(Aborted)]
    #[error("Operation cancelled{}", format_context(.context))]
    Cancelled { context: Option<Cow<'static, str>> },

    #[code(source)]
    #[error("Storage driver error{}: {source}", format_context(.context))]
    Driver { source: DriverFailure, context: Option<Cow<'static, str>> },

    #[code(Internal)]
    #[error("Internal blob error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl BlobError {
    pub(crate) fn invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidArgument { message: message.into(), context: None }
    }

    /// Shorthand for `self.code() == ErrorCode::NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code() == ErrorCode::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_are_classified() {
        let cases = [
            (io::ErrorKind::NotFound, ErrorCode::NotFound),
            (io::ErrorKind::NotADirectory, ErrorCode::NotFound),
            (io::ErrorKind::PermissionDenied, ErrorCode::PermissionDenied),
            (io::ErrorKind::AlreadyExists, ErrorCode::AlreadyExists),
            (io::ErrorKind::StorageFull, ErrorCode::ResourceExhausted),
            (io::ErrorKind::BrokenPipe, ErrorCode::Unknown),
        ];
        for (kind, expected) in cases {
            assert_eq!(ErrorCode::from(&io::Error::from(kind)), expected, "{kind:?}");
        }
    }

    #[test]
    fn driver_failure_keeps_its_code() {
        let err = BlobError::from(DriverFailure {
            code: ErrorCode::PermissionDenied,
            op: "delete",
            key: "a/b".to_owned(),
            source: "denied".into(),
        });
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert!(err.to_string().contains("delete \"a/b\""));
    }

    #[test]
    fn codes_display_in_snake_case() {
        assert_eq!(ErrorCode::FailedPrecondition.to_string(), "failed_precondition");
        assert_eq!(ErrorCode::NotFound.to_string(), "not_found");
    }
}
