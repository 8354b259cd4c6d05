//! The copier layer abstracts over the object stores a benchmark run uploads into.
//!
//! A [`Copier`] copies local files into flat containers. A [`ContentCopier`] additionally places
//! objects by their content digest, using the [`NamingScheme`], and verifies the content tag the
//! backend returns against precomputed [`Checksums`].
//!
//! It is designed as a library crate to be used by the `swiftprof` binary.
#![warn(missing_debug_implementations)]

mod backend;
mod checksum;
mod error;
mod naming;
mod source;

use std::path::Path;

pub use backend::*;
pub use checksum::{ChecksumSet, Checksums, MD5, SHA1};
pub use error::*;
pub use naming::*;
pub use source::{FileSource, PayloadStream};

/// Configuration to initialize a copier.
#[derive(Debug)]
pub enum CopierConfig<'a> {
    /// Upload into an OpenStack Swift cluster.
    Swift(SwiftConfig),
    /// Copy into directories below a local path.
    FileSystem {
        /// Root directory that holds one directory per container.
        path: &'a Path,
    },
    /// Keep all objects in memory.
    InMemory,
}

/// Creates a copier for the given backend.
///
/// The copier still needs to be [set up](Copier::setup) before use.
pub fn copier(config: CopierConfig<'_>, naming: NamingScheme) -> BoxedCopier {
    match config {
        CopierConfig::Swift(config) => Box::new(SwiftCopier::new(config, naming)),
        CopierConfig::FileSystem { path } => Box::new(LocalFsCopier::new(path, naming)),
        CopierConfig::InMemory => Box::new(InMemoryCopier::new(naming)),
    }
}
