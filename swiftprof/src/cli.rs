use std::path::PathBuf;

use anyhow::Result;
use argh::FromArgs;

use crate::config::{Config, CopyMode, Overrides};
use crate::{batch, observability};

/// Copies a directory of files into an object store and reports the throughput.
///
/// Flags override the configuration file and `SWIFTPROF__` environment variables.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// number of concurrent upload workers
    #[argh(option)]
    concurrency: Option<usize>,

    /// directory with the files to upload
    #[argh(option)]
    input_dir: Option<PathBuf>,

    /// destination container (flat mode) or shard prefix (content mode)
    #[argh(option)]
    dest_prefix: Option<String>,

    /// hash all files before uploading (true or false)
    #[argh(option)]
    precompute_checksum: Option<bool>,

    /// compare stored and uploaded sizes after every write (true or false)
    #[argh(option)]
    verify_checksum: Option<bool>,

    /// upload at most this many files
    #[argh(option)]
    num_files: Option<usize>,

    /// placement of uploaded files: flat or content
    #[argh(option)]
    mode: Option<CopyMode>,

    /// write into the quarantine container in content mode (true or false)
    #[argh(option)]
    quarantine: Option<bool>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            concurrency: self.concurrency,
            input_dir: self.input_dir.clone(),
            dest_prefix: self.dest_prefix.clone(),
            precompute_checksum: self.precompute_checksum,
            verify_checksum: self.verify_checksum,
            num_files: self.num_files,
            mode: self.mode,
            quarantine: self.quarantine,
        }
    }
}

/// Bootstrap the runtime and run the benchmark.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();
    let config = Config::load(args.config.as_deref(), &args.overrides())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("main-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config.logging);
    tracing::debug!(?config);

    let copier = swiftprof_copier::copier(config.backend.copier_config(), config.naming());
    let report = runtime.block_on(batch::run(&config, copier))?;
    report.print();

    Ok(())
}
