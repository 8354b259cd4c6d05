//! Concurrent dispatch of copy tasks to a fixed pool of workers.
//!
//! The producer hands [`FileTask`]s to the workers over a rendezvous channel: a send only
//! completes once a worker takes the task, so at most `concurrency` uploads are in flight and
//! no tasks pile up in a queue. Every worker reports one [`CopyOutcome`] per task on a separate
//! channel, which is drained once all workers have exited.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use swiftprof_copier::{
    Checksums, ContentCopier, CopyError, CopyResult, Copier, FailureKind, FileSource,
};

use crate::batch::Phase;

/// A single file to copy. Consumed by exactly one worker.
#[derive(Clone, Debug)]
pub struct FileTask {
    pub path: PathBuf,
    pub size: u64,
    /// Precomputed checksums, if available.
    pub checksums: Option<Checksums>,
}

/// What the workers do with each task.
#[derive(Clone, Debug)]
pub enum Target {
    /// Copy every file into `container` under its file name.
    ///
    /// Precomputed MD5s are sent as the expected content tag.
    Flat {
        copier: Arc<dyn Copier>,
        container: String,
    },
    /// Write every file to its content-addressed placement.
    Content {
        copier: Arc<dyn ContentCopier>,
        /// Write into the quarantine container instead.
        quarantine: bool,
        /// Compare the stored length against the uploaded length after each write.
        verify: bool,
    },
}

impl Target {
    async fn copy(&self, task: &FileTask) -> CopyResult<u64> {
        let source = FileSource::new(task.path.clone());

        match self {
            Target::Flat { copier, container } => {
                let md5 = task.checksums.as_ref().map(Checksums::md5);
                copier.copy(&source, container, md5).await
            }
            Target::Content {
                copier,
                quarantine,
                verify,
            } => {
                let checksums =
                    task.checksums
                        .as_ref()
                        .ok_or_else(|| CopyError::MissingChecksum {
                            path: task.path.clone(),
                        })?;

                let written = if *quarantine {
                    copier.write_quarantine(&source, checksums).await?
                } else {
                    copier.write(&source, checksums, false).await?
                };

                if *verify {
                    let stored = copier.size(checksums, false, *quarantine).await?;
                    if stored != written {
                        let placement = if *quarantine {
                            copier.quarantine_path(checksums)
                        } else {
                            copier.destination_path(checksums, false)
                        };
                        return Err(CopyError::SizeMismatch {
                            object: placement.to_string(),
                            expected: written,
                            actual: stored,
                        });
                    }
                }

                Ok(written)
            }
        }
    }
}

/// The result of copying one file.
#[derive(Debug)]
pub struct CopyOutcome {
    pub path: PathBuf,
    pub size: u64,
    pub bytes_written: u64,
    pub elapsed: Duration,
    pub error: Option<CopyError>,
}

/// Totals collected while dispatching.
#[derive(Debug, Default)]
pub struct Dispatched {
    /// Number of tasks handed to a worker.
    pub file_count: u64,
    /// Sum of the sizes of all handed off tasks.
    pub total_bytes: u64,
    /// One entry per task whose worker did not panic, in completion order.
    pub outcomes: Vec<CopyOutcome>,
}

/// A fixed-size pool of copy workers.
#[derive(Debug)]
pub struct Dispatcher {
    target: Target,
    concurrency: usize,
    progress: bool,
}

impl Dispatcher {
    /// Creates a dispatcher with `concurrency` workers, at least one.
    pub fn new(target: Target, concurrency: usize) -> Self {
        Self {
            target,
            concurrency: concurrency.max(1),
            progress: false,
        }
    }

    /// Draws a progress bar on stderr while running.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Copies all tasks and waits for every worker to finish.
    ///
    /// Tasks are pulled one at a time, and the next one only after the previous was handed off.
    pub async fn run<I>(&self, tasks: I) -> Dispatched
    where
        I: IntoIterator<Item = FileTask>,
        I::IntoIter: ExactSizeIterator,
    {
        let tasks = tasks.into_iter();
        let progress = self.progress_bar(tasks.len() as u64);

        let (task_tx, task_rx) = flume::bounded::<FileTask>(0);
        let (outcome_tx, outcome_rx) = flume::unbounded();

        let workers: Vec<_> = (0..self.concurrency)
            .map(|id| {
                let worker = Worker {
                    id,
                    target: self.target.clone(),
                    progress: progress.clone(),
                };
                tokio::spawn(worker.run(task_rx.clone(), outcome_tx.clone()))
            })
            .collect();
        drop(task_rx);
        drop(outcome_tx);

        let mut dispatched = Dispatched::default();
        for task in tasks {
            let size = task.size;
            if task_tx.send_async(task).await.is_err() {
                tracing::error!("all workers exited, stopping dispatch");
                break;
            }
            dispatched.file_count += 1;
            dispatched.total_bytes += size;
        }
        drop(task_tx);

        Phase::Draining.enter();
        for result in futures::future::join_all(workers).await {
            if let Err(err) = result {
                tracing::error!(error = &err as &dyn Error, "copy worker panicked");
            }
        }
        progress.finish_and_clear();

        dispatched.outcomes = outcome_rx.drain().collect();
        dispatched
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new(len).with_message("Copying files");
        if let Ok(style) = ProgressStyle::with_template("{msg} {wide_bar} {pos}/{len} {elapsed}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }
}

struct Worker {
    id: usize,
    target: Target,
    progress: ProgressBar,
}

impl Worker {
    async fn run(self, tasks: flume::Receiver<FileTask>, outcomes: flume::Sender<CopyOutcome>) {
        while let Ok(task) = tasks.recv_async().await {
            let start = Instant::now();
            let result = self.target.copy(&task).await;
            let elapsed = start.elapsed();
            self.progress.inc(1);

            let (bytes_written, error) = match result {
                Ok(bytes_written) => {
                    tracing::debug!(
                        worker = self.id,
                        path = %task.path.display(),
                        bytes_written,
                        ?elapsed,
                        "copied file"
                    );
                    (bytes_written, None)
                }
                Err(err) => {
                    log_failure(&task.path, &err);
                    (0, Some(err))
                }
            };

            let outcome = CopyOutcome {
                path: task.path,
                size: task.size,
                bytes_written,
                elapsed,
                error,
            };
            if outcomes.send(outcome).is_err() {
                break;
            }
        }

        tracing::trace!(worker = self.id, "worker finished");
    }
}

fn log_failure(path: &Path, err: &CopyError) {
    match err.kind() {
        FailureKind::IntegrityMismatch => tracing::error!(
            path = %path.display(),
            error = err as &dyn Error,
            "stored object does not match the source checksum"
        ),
        kind => tracing::warn!(
            path = %path.display(),
            %kind,
            error = err as &dyn Error,
            "failed to copy file"
        ),
    }
}
