#![allow(unreachable_pub)]
#![allow(clippy::needless_pass_by_value)]

//! # Macros
//!
//! Procedural macros shared by the storage crates.
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! stow-derive = { path = "../infra/derive" }
//! ```
//!
//! The examples below are `ignore`d to avoid compiling in this crate; copy them
//! into consuming crates' tests as needed.

mod macros;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// A high-level attribute macro for defining domain-specific error enums.
///
/// This macro transforms a standard enum into a fully-featured error type that
/// can be classified into a closed set of error codes.
///
/// # Features
///
/// * **Automatic Derives**: Injects `#[derive(Debug, thiserror::Error)]`.
/// * **Context Support**: Generates a companion `...Ext` trait that adds `.context()`
///   to any `Result` that can be converted into this error type.
/// * **Standard Conversions**: Implements `From<T>` for variants containing a `source` field.
/// * **Internal Fallback**: Provides `From<&str>` and `From<String>` if an `Internal`
///   variant is present.
/// * **Classification**: With `#[stow_error(code = ErrorCode)]`, generates
///   `fn code(&self) -> ErrorCode`. Each variant picks its code with `#[code(Kind)]`,
///   or `#[code(source)]` to classify via `ErrorCode::from(&source)`. Variants without
///   the attribute classify as `ErrorCode::Unknown`.
///
/// # Requirements
///
/// 1. The macro must be applied to an **enum**.
/// 2. Variants that support context must include a `context: Option<Cow<'static, str>>` field.
/// 3. Variants wrapping external errors must include a `source: T` field or a field marked
///    with `#[source]`/`#[from]` (compatible with `thiserror`).
/// 4. Tuple or unit variants are rejected to keep error wiring explicit and reliable.
///
/// # Example
///
/// ```rust,ignore
/// use stow_blob::ErrorCode;
/// use stow_derive::stow_error;
/// use std::borrow::Cow;
///
/// #[stow_error(code = ErrorCode)]
/// pub enum EngineError {
///     #[code(source)]
///     #[error("IO error{}: {source}", format_context(.context))]
///     Io { source: std::io::Error, context: Option<Cow<'static, str>> },
///
///     #[code(Internal)]
///     #[error("Internal fault{}: {message}", format_context(.context))]
///     Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
/// }
///
/// fn open(path: &str) -> Result<std::fs::File, EngineError> {
///     std::fs::File::open(path).context("Opening object")
/// }
/// ```
#[proc_macro_attribute]
pub fn stow_error(args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    macros::error::expand_derive(args.into(), input).into()
}
