//! A [`stow_blob`] driver that keeps objects as plain files in a local directory.
//!
//! # Core Features
//!
//! - **Atomic Publishing**: content and attributes are written to unique
//!   temporary files, synced, and renamed into place; readers never see a
//!   partial object.
//! - **Reversible Key Mapping**: any key, including `..`, `//` or control
//!   characters, maps to a path strictly beneath the root (see [`escape`]).
//! - **Side-Records**: attributes live in a JSON `<file>.attrs` beside each
//!   object.
//! - **Multipart Uploads**: parts are staged under `__multipart/` and
//!   concatenated on completion with a composite `<md5>-<n>` ETag.
//! - **Signed URLs**: an optional [`UrlSigner`] such as [`UrlSignerHmac`]
//!   issues URLs an application server can verify.
//! - **Self-Healing**: temporary files abandoned by crashed writers are purged
//!   when the bucket opens.
//!
//! # Layout
//!
//! ```text
//! <root>/
//! ├── notes/today.txt          object content
//! ├── notes/today.txt.attrs    its attributes
//! └── __multipart/<sha256(key)>/<upload-id>/
//!     ├── multipart.json       manifest
//!     ├── multipart.json.attrs attributes for the final object
//!     └── 00001.<etag>.<size>  one file per uploaded part
//! ```
//!
//! # Examples
//!
//! ```rust
//! use stow_blob::{Bucket, ListOptions, WriterOptions};
//! use stow_fileblob::FileBucket;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let tmp = tempfile::tempdir()?;
//! let bucket = Bucket::new(FileBucket::builder().root(tmp.path()).open().await?);
//!
//! bucket.write_all("a/1.txt", b"one", WriterOptions::default()).await?;
//! bucket.write_all("a/2.txt", b"two", WriterOptions::default()).await?;
//! bucket.write_all("b.txt", b"three", WriterOptions::default()).await?;
//!
//! let opts = ListOptions { delimiter: "/".into(), ..ListOptions::default() };
//! let top: Vec<String> =
//!     bucket.list(opts).collect_all().await?.into_iter().map(|o| o.key).collect();
//! assert_eq!(top, ["a/", "b.txt"]);
//! # Ok(())
//! # }
//! ```

mod builder;
mod engine;
mod error;
pub mod escape;
mod list;
mod maintenance;
mod multipart;
mod reader;
mod signer;
mod writer;
mod xattrs;

pub use builder::{DEFAULT_MIN_PART_SIZE, DEFAULT_PAGE_SIZE, FileBucketBuilder};
pub use engine::{FileBucket, FileBucketInner};
pub use error::{FileBlobError, FileBlobErrorExt};
pub use signer::{UrlSigner, UrlSignerHmac};
pub use xattrs::ATTRS_EXT;
