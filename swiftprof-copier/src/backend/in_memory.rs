//! In-memory backend.
//!
//! Objects live in a shared `HashMap`, which makes this backend useful for tests and for
//! measuring dispatch overhead without a remote store. The copier is [`Clone`], so a test can
//! keep a handle for inspection while the run owns a boxed copy.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;

use super::common::{ContentCopier, Copier, verify_tag};
use crate::checksum::Checksums;
use crate::error::{CopyError, CopyResult, SetupResult};
use crate::naming::{NamingScheme, Placement};
use crate::source::FileSource;

type Store = HashMap<Placement, Bytes>;

#[derive(Debug, Clone, Default)]
pub struct InMemoryCopier {
    naming: NamingScheme,
    store: Arc<Mutex<Store>>,
    containers: Arc<Mutex<HashSet<String>>>,
}

impl InMemoryCopier {
    pub fn new(naming: NamingScheme) -> Self {
        Self {
            naming,
            ..Default::default()
        }
    }

    /// Returns a clone of the stored bytes, if present.
    pub fn get(&self, placement: &Placement) -> Option<Bytes> {
        self.store.lock().unwrap().get(placement).cloned()
    }

    /// Returns `true` if an object exists at the given placement.
    pub fn contains(&self, placement: &Placement) -> bool {
        self.store.lock().unwrap().contains_key(placement)
    }

    /// Returns all placements in sorted order.
    pub fn placements(&self) -> Vec<Placement> {
        let mut placements: Vec<_> = self.store.lock().unwrap().keys().cloned().collect();
        placements.sort();
        placements
    }

    /// Returns the names of all containers created so far.
    pub fn containers(&self) -> Vec<String> {
        let mut containers: Vec<_> = self.containers.lock().unwrap().iter().cloned().collect();
        containers.sort();
        containers
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().unwrap().is_empty()
    }

    async fn store(
        &self,
        placement: &Placement,
        source: &FileSource,
    ) -> CopyResult<(u64, String)> {
        self.ensure_container(&placement.container).await?;

        let (mut file, len) = source.open().await?;
        let mut contents = Vec::with_capacity(len as usize);
        file.read_to_end(&mut contents).await?;

        let tag = hex::encode(Md5::digest(&contents));
        let written = contents.len() as u64;
        self.store
            .lock()
            .unwrap()
            .insert(placement.clone(), contents.into());

        Ok((written, tag))
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
impl Copier for InMemoryCopier {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn setup(&mut self) -> SetupResult<()> {
        Ok(())
    }

    async fn ensure_container(&self, container: &str) -> CopyResult<()> {
        self.containers
            .lock()
            .unwrap()
            .insert(container.to_owned());
        Ok(())
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
impl ContentCopier for InMemoryCopier {
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

        self.get(&placement)
            .map(|bytes| bytes.len() as u64)
            .ok_or_else(|| CopyError::NotFound(placement.to_string()))
    }
}
