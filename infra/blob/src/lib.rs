//! Portable object storage.
//!
//! Application code talks to a [`Bucket`]; a [`Driver`] implementation talks to
//! the backing medium. The bucket adds what every backend needs identically:
//! content-type sniffing, Content-MD5 verification, metadata normalization,
//! error classification and lifecycle checks.
//!
//! # Architectural Overview
//!
//! 1.  **[`Driver`]**: the backend contract (attributes, paged listing, ranged
//!     reads, typed writes, copy, delete, signed URLs, multipart uploads).
//! 2.  **[`Bucket`]**: the facade with [`Reader`], [`Writer`], [`PartWriter`] and
//!     [`ListIterator`].
//! 3.  **[`PrefixedDriver`]**: scopes a driver under a key prefix.
//! 4.  **[`ErrorCode`]**: the closed error taxonomy every driver maps into.
//!
//! With the `drivertest` feature, [`drivertest`] exposes a conformance suite
//! that any driver can run against itself.

mod bucket;
pub mod driver;
mod error;
pub mod etag;
mod list;
mod metadata;
mod prefixed;
mod reader;
pub mod sniff;
mod types;
mod writer;

#[cfg(feature = "drivertest")]
pub mod drivertest;

pub use bucket::Bucket;
pub use driver::{Cancelled, Driver, DriverError, DriverResult};
pub use error::{BlobError, BlobErrorExt, DriverFailure, ErrorCode};
pub use list::ListIterator;
pub use prefixed::PrefixedDriver;
pub use reader::Reader;
pub use types::{
    Attributes, CompletePart, CopyOptions, DEFAULT_SIGNED_URL_EXPIRY, HttpMethod, ListOptions, ListPage,
    ListPartsOptions, ListPartsPage, ObjectInfo, ObjectPartInfo, PartInfo, ReaderAttributes,
    SignedUrlOptions,
};
pub use writer::{PartWriter, Writer, WriterOptions};

pub use tokio_util::sync::CancellationToken;
