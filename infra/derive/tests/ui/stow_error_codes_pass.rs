use std::borrow::Cow;
use stow_derive::stow_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    NotFound,
    Internal,
    Unknown,
}

impl From<&std::io::Error> for Code {
    fn from(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            _ => Self::Unknown,
        }
    }
}

#[stow_error(code = Code)]
pub enum DemoError {
    #[code(source)]
    #[error("IO error{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },

    #[code(NotFound)]
    #[error("Missing{}: {message}", format_context(.context))]
    Missing { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Other{}", format_context(.context))]
    Other { context: Option<Cow<'static, str>> },
}

fn main() {
    let err = DemoError::Missing { message: "x".into(), context: None };
    assert_eq!(err.code(), Code::NotFound);
    let _ = Code::Internal;
}
