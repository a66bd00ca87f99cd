use std::borrow::Cow;
use stow_blob::ErrorCode;

/// A specialized [`FileBlobError`] enum of this crate.
#[stow_derive::stow_error(code = ErrorCode)]
pub enum FileBlobError {
    #[code(NotFound)]
    #[error("Object not found{}: {key:?}", format_context(.context))]
    NotFound { key: String, context: Option<Cow<'static, str>> },

    #[code(source)]
    #[error("Filesystem I/O failure{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },

    #[code(InvalidArgument)]
    #[error("Key {key:?} uses the reserved \".attrs\" extension{}", format_context(.context))]
    ReservedSuffix { key: String, context: Option<Cow<'static, str>> },

    #[code(InvalidArgument)]
    #[error("Invalid part {part_number} with ETag {etag:?}{}", format_context(.context))]
    InvalidPart { part_number: u32, etag: String, context: Option<Cow<'static, str>> },

    #[code(InvalidArgument)]
    #[error(
        "Part {part_number} is too small{}: {size} bytes, minimum is {min}",
        format_context(.context)
    )]
    PartTooSmall { part_number: u32, size: u64, min: u64, context: Option<Cow<'static, str>> },

    #[code(FailedPrecondition)]
    #[error(
        "Bad digest{}: expected {expected}, calculated {calculated}",
        format_context(.context)
    )]
    BadDigest { expected: String, calculated: String, context: Option<Cow<'static, str>> },

    #[code(InvalidArgument)]
    #[error("Invalid format{}: {message}", format_context(.context))]
    InvalidFormat { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[code(InvalidArgument)]
    #[error("Offset {offset} is past the end of a {size} byte object{}", format_context(.context))]
    InvalidRange { offset: u64, size: u64, context: Option<Cow<'static, str>> },

    #[code(PermissionDenied)]
    #[error("Signed URL rejected{}: {message}", format_context(.context))]
    Signature { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[code(Unimplemented)]
    #[error("Not implemented{}: {message}", format_context(.context))]
    Unimplemented { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[code(Internal)]
    #[error("Attribute serialization failure{}: {source}", format_context(.context))]
    Serialization { source: serde_json::Error, context: Option<Cow<'static, str>> },

    #[code(Internal)]
    #[error("Internal fileblob error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl FileBlobError {
    pub(crate) fn invalid_format(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidFormat { message: message.into(), context: None }
    }

    pub(crate) fn signature(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Signature { message: message.into(), context: None }
    }

    /// Turns `NotFound` io errors into [`FileBlobError::NotFound`] for `key`.
    pub(crate) fn from_io(err: std::io::Error, key: &str, context: &'static str) -> Self {
        if matches!(err.kind(), std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory) {
            Self::NotFound { key: key.to_owned(), context: Some(context.into()) }
        } else {
            Self::Io { source: err, context: Some(context.into()) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn missing_files_become_not_found() {
        let err = FileBlobError::from_io(io::ErrorKind::NotFound.into(), "a/b", "Reading object");
        assert!(matches!(&err, FileBlobError::NotFound { key, .. } if key == "a/b"));
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(err.to_string(), "Object not found (Reading object): \"a/b\"");
    }

    #[test]
    fn io_errors_keep_their_kind() {
        let err =
            FileBlobError::from_io(io::ErrorKind::PermissionDenied.into(), "k", "Opening object");
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
    }

    #[test]
    fn multipart_failures_are_invalid_arguments() {
        let small = FileBlobError::PartTooSmall { part_number: 1, size: 10, min: 20, context: None };
        assert_eq!(small.code(), ErrorCode::InvalidArgument);
        assert_eq!(small.to_string(), "Part 1 is too small: 10 bytes, minimum is 20");

        let digest = FileBlobError::BadDigest {
            expected: "aa".into(),
            calculated: "bb".into(),
            context: None,
        };
        assert_eq!(digest.code(), ErrorCode::FailedPrecondition);
    }
}
