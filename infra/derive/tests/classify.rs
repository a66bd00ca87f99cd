use std::borrow::Cow;
use stow_derive::stow_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    NotFound,
    PermissionDenied,
    InvalidArgument,
    Internal,
    Unknown,
}

impl From<&std::io::Error> for Code {
    fn from(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Unknown,
        }
    }
}

#[stow_error(code = Code)]
pub enum DemoError {
    #[code(source)]
    #[error("IO error{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },

    #[code(InvalidArgument)]
    #[error("Bad input{}: {message}", format_context(.context))]
    BadInput { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[code(Internal)]
    #[error("Internal error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Unclassified{}: {message}", format_context(.context))]
    Unclassified { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

fn open_missing() -> Result<(), DemoError> {
    std::fs::File::open("/definitely/not/here/stow-derive").context("Opening fixture")?;
    Ok(())
}

#[test]
fn source_variant_delegates_to_io_kind() {
    let err = open_missing().unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
    assert!(err.to_string().contains("(Opening fixture)"));
}

#[test]
fn fixed_codes_and_default() {
    let bad = DemoError::BadInput { message: "empty key".into(), context: None };
    assert_eq!(bad.code(), Code::InvalidArgument);

    let internal: DemoError = "boom".into();
    assert_eq!(internal.code(), Code::Internal);

    let other = DemoError::Unclassified { message: "?".into(), context: None };
    assert_eq!(other.code(), Code::Unknown);
}

#[test]
fn context_is_attached_to_domain_errors() {
    let res: Result<(), DemoError> =
        Err(DemoError::BadInput { message: "empty key".into(), context: None });
    let err = res.context("Writing object").unwrap_err();
    assert_eq!(err.to_string(), "Bad input (Writing object): empty key");
}
