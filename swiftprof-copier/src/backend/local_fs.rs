use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};

use super::common::{ContentCopier, Copier, verify_tag};
use crate::checksum::Checksums;
use crate::error::{CopyError, CopyResult, SetupResult};
use crate::naming::{NamingScheme, Placement};
use crate::source::FileSource;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Copies files into directories below a local root.
///
/// Containers map to directories, objects to files. The MD5 of the written bytes plays the role
/// of the content tag a remote store would return.
#[derive(Debug)]
pub struct LocalFsCopier {
    root: PathBuf,
    naming: NamingScheme,
}

impl LocalFsCopier {
    pub fn new(root: &Path, naming: NamingScheme) -> Self {
        Self {
            root: root.into(),
            naming,
        }
    }

    fn object_path(&self, placement: &Placement) -> PathBuf {
        self.root
            .join(&placement.container)
            .join(&placement.object_key)
    }

    /// Copies the file and returns its length and the MD5 of what was written.
    async fn store(
        &self,
        placement: &Placement,
        source: &FileSource,
    ) -> CopyResult<(u64, String)> {
        self.ensure_container(&placement.container).await?;

        let (mut reader, _len) = source.open().await?;
        let file = File::create(self.object_path(placement)).await?;
        let mut writer = BufWriter::new(file);

        let mut md5 = Md5::new();
        let mut buf = vec![0; COPY_BUFFER_SIZE];
        let mut written = 0;
        loop {
            let read = reader.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            md5.update(&buf[..read]);
            writer.write_all(&buf[..read]).await?;
            written += read as u64;
        }

        writer.flush().await?;
        let file = writer.into_inner();
        file.sync_data().await?;

        Ok((written, hex::encode(md5.finalize())))
    }

    async fn write_placed(
        &self,
        placement: Placement,
        source: &FileSource,
        md5: &str,
    ) -> CopyResult<u64> {
        let (len, tag) = self.store(&placement, source).await?;
        verify_tag(&placement.to_string(), md5, Some(&tag))?;
        Ok(len)
    }
}

#[async_trait::async_trait]
impl Copier for LocalFsCopier {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn setup(&mut self) -> SetupResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn ensure_container(&self, container: &str) -> CopyResult<()> {
        tokio::fs::create_dir_all(self.root.join(container))
            .await
            .map_err(|cause| CopyError::ContainerCreate {
                container: container.to_owned(),
                cause: Box::new(cause.into()),
            })
    }

    async fn copy(
        &self,
        source: &FileSource,
        container: &str,
        md5: Option<&str>,
    ) -> CopyResult<u64> {
        let placement = Placement {
            container: container.to_owned(),
            object_key: source.file_name()?.to_owned(),
        };

        let (len, tag) = self.store(&placement, source).await?;
        if let Some(md5) = md5 {
            verify_tag(&placement.to_string(), md5, Some(&tag))?;
        }
        Ok(len)
    }
}

#[async_trait::async_trait]
impl ContentCopier for LocalFsCopier {
    fn naming(&self) -> &NamingScheme {
        &self.naming
    }

    async fn write(
        &self,
        source: &FileSource,
        checksums: &Checksums,
        read_only: bool,
    ) -> CopyResult<u64> {
        let placement = self.destination_path(checksums, read_only);
        self.write_placed(placement, source, checksums.md5()).await
    }

    async fn write_quarantine(
        &self,
        source: &FileSource,
        checksums: &Checksums,
    ) -> CopyResult<u64> {
        let placement = self.quarantine_path(checksums);
        self.write_placed(placement, source, checksums.md5()).await
    }

    async fn size(
        &self,
        checksums: &Checksums,
        read_only: bool,
        quarantine: bool,
    ) -> CopyResult<u64> {
        let placement = if quarantine {
            self.quarantine_path(checksums)
        } else {
            self.destination_path(checksums, read_only)
        };

        match tokio::fs::metadata(self.object_path(&placement)).await {
            Ok(metadata) => Ok(metadata.len()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(CopyError::NotFound(placement.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SHA1: &str = "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";
    const TEST_MD5: &str = "098f6bcd4621d373cade4e832627b4f6";

    async fn setup() -> (tempfile::TempDir, LocalFsCopier, FileSource) {
        let tempdir = tempfile::tempdir().unwrap();
        let input = tempdir.path().join("input.bin");
        std::fs::write(&input, b"test").unwrap();

        let mut copier = LocalFsCopier::new(
            &tempdir.path().join("store"),
            NamingScheme::new("bagstore", "quarantine"),
        );
        copier.setup().await.unwrap();

        (tempdir, copier, FileSource::new(input))
    }

    #[tokio::test]
    async fn writes_to_sharded_container() {
        let (tempdir, copier, source) = setup().await;
        let checksums = Checksums::new(TEST_SHA1, TEST_MD5).unwrap();

        let written = copier.write(&source, &checksums, false).await.unwrap();
        assert_eq!(written, 4);

        let stored = tempdir.path().join("store/bagstore-a94a").join(TEST_SHA1);
        assert_eq!(std::fs::read(stored).unwrap(), b"test");
        assert_eq!(copier.size(&checksums, false, false).await.unwrap(), 4);
        assert!(matches!(
            copier.size(&checksums, false, true).await,
            Err(CopyError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn quarantine_is_unsharded() {
        let (tempdir, copier, source) = setup().await;
        let checksums = Checksums::new(TEST_SHA1, TEST_MD5).unwrap();

        copier.write_quarantine(&source, &checksums).await.unwrap();

        let stored = tempdir.path().join("store/quarantine").join(TEST_SHA1);
        assert!(stored.exists());
        assert_eq!(copier.size(&checksums, false, true).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn detects_wrong_md5() {
        let (_tempdir, copier, source) = setup().await;
        let checksums = Checksums::new(TEST_SHA1, "d41d8cd98f00b204e9800998ecf8427e").unwrap();

        let err = copier.write(&source, &checksums, false).await.unwrap_err();
        assert!(matches!(err, CopyError::IntegrityMismatch { ref actual, .. } if actual == TEST_MD5));
    }

    #[tokio::test]
    async fn flat_copy_uses_file_name() {
        let (tempdir, copier, source) = setup().await;

        copier.copy(&source, "bench", None).await.unwrap();
        copier.copy(&source, "bench", Some(TEST_MD5)).await.unwrap();

        let stored = tempdir.path().join("store/bench/input.bin");
        assert_eq!(std::fs::read(stored).unwrap(), b"test");
    }

    #[tokio::test]
    async fn missing_source() {
        let (tempdir, copier, _source) = setup().await;
        let source = FileSource::new(tempdir.path().join("nope"));

        let err = copier.copy(&source, "bench", None).await.unwrap_err();
        assert!(matches!(err, CopyError::FileOpen { .. }));
    }
}
