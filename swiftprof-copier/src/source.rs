use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::error::{CopyError, CopyResult};

/// A stream of payload chunks handed to a backend.
pub type PayloadStream = BoxStream<'static, std::io::Result<Bytes>>;

/// A local file that is about to be copied.
///
/// The file is only opened when a backend asks for its contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The base name of the file, used as object key for flat copies.
    pub fn file_name(&self) -> CopyResult<&str> {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                self.open_error(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path has no UTF-8 file name",
                ))
            })
    }

    /// Opens the file and returns it with its current length.
    pub async fn open(&self) -> CopyResult<(File, u64)> {
        let file = File::open(&self.path).await.map_err(|cause| self.open_error(cause))?;
        let metadata = file.metadata().await.map_err(|cause| self.open_error(cause))?;
        Ok((file, metadata.len()))
    }

    /// Opens the file as a chunked stream.
    pub async fn open_stream(&self) -> CopyResult<(PayloadStream, u64)> {
        let (file, len) = self.open().await?;
        Ok((ReaderStream::new(file).boxed(), len))
    }

    fn open_error(&self, cause: std::io::Error) -> CopyError {
        CopyError::FileOpen {
            path: self.path.clone(),
            cause,
        }
    }
}

impl From<PathBuf> for FileSource {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for FileSource {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}
