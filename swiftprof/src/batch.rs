//! Drives a complete benchmark run.
//!
//! A run walks through the phases `idle → precomputing → dispatching → draining → reporting →
//! done`. Backend setup and discovery happen while idle, and any failure there aborts the run
//! before a single file is copied. Failures of individual files never abort the run; they end
//! up in the [`ThroughputReport`].

use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use swiftprof_copier::{BoxedCopier, ChecksumSet, ContentCopier, Copier, SetupError};
use thiserror::Error;

use crate::config::{Config, CopyMode};
use crate::discover::discover;
use crate::dispatch::{Dispatcher, FileTask, Target};
use crate::report::ThroughputReport;

/// Errors that abort a run before dispatching.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Content-addressed placement was requested without precomputing checksums.
    #[error("content mode requires precomputed checksums, enable `precompute_checksum`")]
    ChecksumsRequired,

    /// The backend could not be set up.
    #[error("backend setup failed")]
    Setup(#[from] SetupError),

    /// The input directory could not be listed.
    #[error("failed to read input directory `{}`", path.display())]
    Discover {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },
}

/// Stages of a run, logged as they are entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Precomputing,
    Dispatching,
    Draining,
    Reporting,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Precomputing => "precomputing",
            Phase::Dispatching => "dispatching",
            Phase::Draining => "draining",
            Phase::Reporting => "reporting",
            Phase::Done => "done",
        }
    }

    pub(crate) fn enter(self) {
        tracing::info!(phase = %self, "entering phase");
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uploads the configured input directory with the given copier.
///
/// The copier is set up here and dropped when the run is done.
pub async fn run(config: &Config, mut copier: BoxedCopier) -> Result<ThroughputReport, BatchError> {
    Phase::Idle.enter();
    if config.mode == CopyMode::Content && !config.precompute_checksum {
        return Err(BatchError::ChecksumsRequired);
    }
    if config.mode == CopyMode::Flat && config.verify_checksum {
        tracing::warn!("`verify_checksum` only applies to content mode, ignoring");
    }
    if config.mode == CopyMode::Flat && config.quarantine {
        tracing::warn!("`quarantine` only applies to content mode, ignoring");
    }

    tracing::info!(backend = copier.name(), mode = ?config.mode, "setting up backend");
    copier.setup().await?;
    if config.mode == CopyMode::Flat {
        let container = &config.dest_prefix;
        copier
            .ensure_container(container)
            .await
            .map_err(|cause| SetupError::ContainerCreate {
                container: container.clone(),
                cause: Box::new(cause),
            })?;
    }

    let files = discover(&config.input_dir, config.num_files)
        .await
        .map_err(|cause| BatchError::Discover {
            path: config.input_dir.clone(),
            cause,
        })?;
    tracing::info!(
        input_dir = %config.input_dir.display(),
        files = files.len(),
        "discovered input files"
    );

    let checksums = if config.precompute_checksum {
        Phase::Precomputing.enter();
        let paths: Vec<_> = files.iter().map(|file| file.path.clone()).collect();
        let (checksums, failures) = ChecksumSet::precompute(&paths, config.concurrency).await;
        for (path, err) in &failures {
            tracing::warn!(
                path = %path.display(),
                error = err as &dyn Error,
                "failed to precompute checksums"
            );
        }
        tracing::debug!(hashed = checksums.len(), "precomputed checksums");
        Some(checksums)
    } else {
        None
    };

    let tasks: Vec<_> = files
        .into_iter()
        .map(|file| FileTask {
            checksums: checksums
                .as_ref()
                .and_then(|checksums| checksums.get(&file.path))
                .cloned(),
            path: file.path,
            size: file.size,
        })
        .collect();

    let copier: Arc<dyn ContentCopier> = Arc::from(copier);
    let target = match config.mode {
        CopyMode::Flat => Target::Flat {
            copier: copier as Arc<dyn Copier>,
            container: config.dest_prefix.clone(),
        },
        CopyMode::Content => Target::Content {
            copier,
            quarantine: config.quarantine,
            verify: config.verify_checksum,
        },
    };

    Phase::Dispatching.enter();
    let start = Instant::now();
    let dispatched = Dispatcher::new(target, config.concurrency)
        .with_progress(config.progress)
        .run(tasks)
        .await;
    let elapsed = start.elapsed();

    Phase::Reporting.enter();
    let report = ThroughputReport::new(dispatched, elapsed);
    report.log_summary();

    Phase::Done.enter();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use swiftprof_copier::{Checksums, InMemoryCopier, NamingScheme, Placement};

    use super::*;
    use crate::config::Backend;

    fn config(input_dir: PathBuf) -> Config {
        Config {
            input_dir,
            concurrency: 2,
            progress: false,
            backend: Backend::Memory,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn content_mode_places_by_digest() {
        let tempdir = tempfile::tempdir().unwrap();
        std::fs::write(tempdir.path().join("a"), b"abc").unwrap();

        let config = Config {
            mode: CopyMode::Content,
            dest_prefix: "bagstore".into(),
            verify_checksum: true,
            ..config(tempdir.path().into())
        };
        let memory = InMemoryCopier::new(config.naming());
        let report = run(&config, Box::new(memory.clone())).await.unwrap();

        assert_eq!(report.succeeded, 1);
        let sha1 = Checksums::compute(&b"abc"[..]).unwrap().sha1().to_owned();
        assert_eq!(
            memory.placements(),
            [Placement {
                container: "bagstore-a999".into(),
                object_key: sha1,
            }]
        );
    }

    #[tokio::test]
    async fn content_mode_requires_precompute() {
        let tempdir = tempfile::tempdir().unwrap();
        let config = Config {
            mode: CopyMode::Content,
            precompute_checksum: false,
            ..config(tempdir.path().into())
        };

        let result = run(&config, Box::new(InMemoryCopier::default())).await;
        assert!(matches!(result, Err(BatchError::ChecksumsRequired)));
    }

    #[tokio::test]
    async fn flat_mode_creates_container_up_front() {
        let tempdir = tempfile::tempdir().unwrap();
        let config = config(tempdir.path().into());
        let memory = InMemoryCopier::new(NamingScheme::default());

        let report = run(&config, Box::new(memory.clone())).await.unwrap();

        assert_eq!(report.file_count, 0);
        assert_eq!(memory.containers(), ["benchmark-test"]);
    }

    #[tokio::test]
    async fn flat_mode_ignores_quarantine() {
        let tempdir = tempfile::tempdir().unwrap();
        std::fs::write(tempdir.path().join("a"), b"abc").unwrap();

        let config = Config {
            quarantine: true,
            ..config(tempdir.path().into())
        };
        let memory = InMemoryCopier::new(config.naming());
        let report = run(&config, Box::new(memory.clone())).await.unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(memory.containers(), ["benchmark-test"]);
        assert_eq!(
            memory.placements(),
            [Placement {
                container: "benchmark-test".into(),
                object_key: "a".into(),
            }]
        );
    }

    #[tokio::test]
    async fn missing_input_dir_is_fatal() {
        let tempdir = tempfile::tempdir().unwrap();
        let config = config(tempdir.path().join("nope"));

        let result = run(&config, Box::new(InMemoryCopier::default())).await;
        assert!(matches!(result, Err(BatchError::Discover { .. })));
    }

    #[test]
    fn phase_names() {
        assert_eq!(Phase::Precomputing.to_string(), "precomputing");
        assert_eq!(Phase::Done.to_string(), "done");
    }
}
