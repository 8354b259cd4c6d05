//! Content digests of source files.
//!
//! Every file is identified by two digests: the SHA-1 addresses the object (see
//! [`NamingScheme`](crate::NamingScheme)), and the MD5 is compared against the content tag
//! (`ETag`) the backend returns after an upload.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use futures_util::{StreamExt, stream};
use md5::Md5;
use sha1::{Digest, Sha1};

use crate::error::InvalidChecksum;

/// Name of the digest used for placement.
pub const SHA1: &str = "sha1";
/// Name of the digest used for integrity verification.
pub const MD5: &str = "md5";

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// The digests of a single file, hex encoded.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Checksums {
    sha1: String,
    md5: String,
}

impl Checksums {
    /// Creates checksums from hex strings, normalizing them to lowercase.
    pub fn new(sha1: &str, md5: &str) -> Result<Self, InvalidChecksum> {
        Ok(Self {
            sha1: validate(SHA1, sha1, 40)?,
            md5: validate(MD5, md5, 32)?,
        })
    }

    /// Hashes everything `reader` yields.
    pub fn compute<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut sha1 = Sha1::new();
        let mut md5 = Md5::new();
        let mut buf = vec![0; READ_BUFFER_SIZE];

        loop {
            let read = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            sha1.update(&buf[..read]);
            md5.update(&buf[..read]);
        }

        Ok(Self {
            sha1: hex::encode(sha1.finalize()),
            md5: hex::encode(md5.finalize()),
        })
    }

    /// Hashes a file on the blocking thread pool.
    pub async fn compute_file(path: &Path) -> io::Result<Self> {
        let path = path.to_owned();
        tokio::task::spawn_blocking(move || Self::compute(File::open(path)?))
            .await
            .map_err(io::Error::other)?
    }

    pub fn sha1(&self) -> &str {
        &self.sha1
    }

    pub fn md5(&self) -> &str {
        &self.md5
    }

    /// Looks up a digest by algorithm name.
    pub fn get(&self, algorithm: &str) -> Option<&str> {
        match algorithm {
            SHA1 => Some(&self.sha1),
            MD5 => Some(&self.md5),
            _ => None,
        }
    }
}

fn validate(algorithm: &'static str, value: &str, len: usize) -> Result<String, InvalidChecksum> {
    if value.len() != len || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(InvalidChecksum {
            algorithm,
            value: value.to_owned(),
        });
    }
    Ok(value.to_ascii_lowercase())
}

/// Precomputed checksums keyed by source path.
///
/// Built once before dispatch and only read afterwards.
#[derive(Clone, Debug, Default)]
pub struct ChecksumSet(HashMap<PathBuf, Checksums>);

impl ChecksumSet {
    pub fn get(&self, path: &Path) -> Option<&Checksums> {
        self.0.get(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hashes all `paths`, at most `concurrency` files at a time.
    ///
    /// Files that cannot be read are returned alongside the set instead of failing the whole
    /// computation.
    pub async fn precompute(
        paths: &[PathBuf],
        concurrency: usize,
    ) -> (Self, Vec<(PathBuf, io::Error)>) {
        let mut set = HashMap::with_capacity(paths.len());
        let mut failures = Vec::new();

        let mut results = stream::iter(paths)
            .map(|path| async move { (path, Checksums::compute_file(path).await) })
            .buffer_unordered(concurrency.max(1));

        while let Some((path, result)) = results.next().await {
            match result {
                Ok(checksums) => {
                    tracing::trace!(path = %path.display(), sha1 = checksums.sha1(), "hashed file");
                    set.insert(path.clone(), checksums);
                }
                Err(err) => failures.push((path.clone(), err)),
            }
        }

        (Self(set), failures)
    }
}

impl FromIterator<(PathBuf, Checksums)> for ChecksumSet {
    fn from_iter<T: IntoIterator<Item = (PathBuf, Checksums)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
