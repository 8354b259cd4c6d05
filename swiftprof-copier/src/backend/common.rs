use std::fmt::Debug;

use crate::checksum::Checksums;
use crate::error::{CopyError, CopyResult, SetupResult};
use crate::naming::{NamingScheme, Placement};
use crate::source::FileSource;

/// User agent string used for outgoing requests.
pub const USER_AGENT: &str = concat!("swiftprof/", env!("CARGO_PKG_VERSION"));

/// A type-erased [`ContentCopier`] instance.
pub type BoxedCopier = Box<dyn ContentCopier>;

/// Uploads local files into a storage backend.
///
/// This is the minimal capability set used for raw throughput benchmarks: objects go into a
/// caller-chosen container under the file's base name.
#[async_trait::async_trait]
pub trait Copier: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Establishes the backend session.
    ///
    /// Must be called exactly once before any other operation.
    async fn setup(&mut self) -> SetupResult<()>;

    /// Creates the container if it does not exist yet.
    async fn ensure_container(&self, container: &str) -> CopyResult<()>;

    /// Copies `source` into `container`, keyed by its file name.
    ///
    /// If `md5` is given, it is handed to the backend as the expected content tag and the tag
    /// returned by the backend must match it. Otherwise the backend computes its own tag and no
    /// verification happens here.
    ///
    /// Returns the number of bytes uploaded.
    async fn copy(&self, source: &FileSource, container: &str, md5: Option<&str>)
    -> CopyResult<u64>;
}

/// A [`Copier`] that places objects by their content digest.
#[async_trait::async_trait]
pub trait ContentCopier: Copier {
    /// The naming scheme used to derive placements.
    fn naming(&self) -> &NamingScheme;

    /// Where [`write`](Self::write) puts an object with these checksums.
    fn destination_path(&self, checksums: &Checksums, _read_only: bool) -> Placement {
        self.naming().placement_for(checksums.sha1(), false)
    }

    /// Where [`write_quarantine`](Self::write_quarantine) puts an object with these checksums.
    fn quarantine_path(&self, checksums: &Checksums) -> Placement {
        self.naming().placement_for(checksums.sha1(), true)
    }

    /// Uploads `source` to its content-addressed placement.
    ///
    /// Fails with [`CopyError::IntegrityMismatch`] if the content tag returned by the backend
    /// differs from the MD5 in `checksums`. The object is not removed in that case.
    async fn write(
        &self,
        source: &FileSource,
        checksums: &Checksums,
        read_only: bool,
    ) -> CopyResult<u64>;

    /// Uploads `source` into the quarantine container.
    async fn write_quarantine(&self, source: &FileSource, checksums: &Checksums)
    -> CopyResult<u64>;

    /// Returns the length of the stored object as declared by the backend.
    async fn size(&self, checksums: &Checksums, read_only: bool, quarantine: bool)
    -> CopyResult<u64>;
}

/// Compares a backend content tag against the expected digest.
pub(crate) fn verify_tag(object: &str, expected: &str, actual: Option<&str>) -> CopyResult<()> {
    match actual {
        Some(actual) if actual.trim_matches('"').eq_ignore_ascii_case(expected) => Ok(()),
        actual => Err(CopyError::IntegrityMismatch {
            object: object.to_owned(),
            expected: expected.to_owned(),
            actual: actual.unwrap_or("<none>").to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_compare_without_quotes_and_case() {
        let md5 = "098f6bcd4621d373cade4e832627b4f6";

        assert!(verify_tag("c/o", md5, Some(md5)).is_ok());
        assert!(verify_tag("c/o", md5, Some("\"098F6BCD4621D373CADE4E832627B4F6\"")).is_ok());
    }

    #[test]
    fn missing_or_wrong_tag_is_a_mismatch() {
        let md5 = "098f6bcd4621d373cade4e832627b4f6";

        let err = verify_tag("c/o", md5, None).unwrap_err();
        assert!(matches!(err, CopyError::IntegrityMismatch { ref actual, .. } if actual == "<none>"));

        let err = verify_tag("c/o", md5, Some("d41d8cd98f00b204e9800998ecf8427e")).unwrap_err();
        assert!(matches!(err, CopyError::IntegrityMismatch { ref object, .. } if object == "c/o"));
    }
}
