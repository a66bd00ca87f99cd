use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use stow_blob::ReaderAttributes;
use stow_blob::driver;
use tokio::fs::File;
use tokio::io::{AsyncRead, ReadBuf, Take};

#[derive(Debug)]
enum Body {
    /// Zero-length ranges never open the content file.
    Empty,
    File(Take<File>),
}

/// A ranged read over one content file.
#[derive(Debug)]
pub(crate) struct FileReader {
    body: Body,
    attrs: ReaderAttributes,
}

impl FileReader {
    pub(crate) const fn empty(attrs: ReaderAttributes) -> Self {
        Self { body: Body::Empty, attrs }
    }

    pub(crate) const fn new(file: Take<File>, attrs: ReaderAttributes) -> Self {
        Self { body: Body::File(file), attrs }
    }
}

impl AsyncRead for FileReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().body {
            Body::Empty => Poll::Ready(Ok(())),
            Body::File(file) => Pin::new(file).poll_read(cx, buf),
        }
    }
}

impl driver::Reader for FileReader {
    fn attributes(&self) -> &ReaderAttributes {
        &self.attrs
    }
}
