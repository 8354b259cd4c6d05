//! End-to-end benchmark runs against an in-process fake Swift cluster.

use std::path::Path;

use anyhow::Result;
use secrecy::SecretBox;
use swiftprof::batch::{self, BatchError};
use swiftprof::config::{Backend, Config, ConfigSecret, CopyMode, Swift};
use swiftprof_copier::{AuthVersion, Checksums, FailureKind, SetupError};
use swiftprof_test::swift::{FakeSwift, PASSWORD, USERNAME};

fn swift_backend(swift: &FakeSwift) -> Backend {
    Backend::Swift(Swift {
        auth_url: swift.auth_url_v1(),
        username: USERNAME.into(),
        password: SecretBox::new(Box::new(ConfigSecret::from(PASSWORD))),
        auth_version: AuthVersion::V1,
        ..Default::default()
    })
}

fn config(swift: &FakeSwift, input_dir: &Path) -> Config {
    Config {
        concurrency: 2,
        input_dir: input_dir.into(),
        progress: false,
        backend: swift_backend(swift),
        ..Default::default()
    }
}

async fn run(config: &Config) -> Result<swiftprof::report::ThroughputReport, BatchError> {
    let copier = swiftprof_copier::copier(config.backend.copier_config(), config.naming());
    batch::run(config, copier).await
}

/// Writes files named `file-0`, `file-1`, ... with the given sizes.
fn write_inputs(dir: &Path, sizes: &[usize]) {
    for (index, size) in sizes.iter().enumerate() {
        let contents: Vec<u8> = (0..*size).map(|byte| (byte + index) as u8).collect();
        std::fs::write(dir.join(format!("file-{index}")), contents).unwrap();
    }
}

#[tokio::test]
async fn test_flat_copy() -> Result<()> {
    swiftprof_test::tracing::init();
    let swift = FakeSwift::new().await;
    let input = tempfile::tempdir()?;
    write_inputs(input.path(), &[10, 20, 30]);

    let report = run(&config(&swift, input.path())).await?;

    assert_eq!(report.file_count, 3);
    assert_eq!(report.total_bytes, 60);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.bytes_written, 60);
    assert!(report.failures.is_empty());

    assert_eq!(swift.containers(), ["benchmark-test"]);
    assert_eq!(
        swift.object("benchmark-test", "file-1").unwrap().len(),
        20
    );
    Ok(())
}

#[tokio::test]
async fn test_flat_copy_without_precompute() -> Result<()> {
    let swift = FakeSwift::new().await;
    let input = tempfile::tempdir()?;
    write_inputs(input.path(), &[10, 20, 30]);
    // Without an expected tag, a wrong tag from the backend goes unnoticed.
    swift.corrupt_etag("file-0");

    let config = Config {
        precompute_checksum: false,
        ..config(&swift, input.path())
    };
    let report = run(&config).await?;

    assert_eq!(report.succeeded, 3);
    assert!(report.failures.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_flat_copy_mismatch() -> Result<()> {
    let swift = FakeSwift::new().await;
    let input = tempfile::tempdir()?;
    write_inputs(input.path(), &[10, 20, 30]);
    swift.corrupt_etag("file-2");

    let report = run(&config(&swift, input.path())).await?;

    assert_eq!(report.file_count, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].path.ends_with("file-2"));
    assert_eq!(report.failures[0].kind, FailureKind::IntegrityMismatch);
    Ok(())
}

#[tokio::test]
async fn test_content_copy() -> Result<()> {
    let swift = FakeSwift::new().await;
    let input = tempfile::tempdir()?;
    write_inputs(input.path(), &[10, 20, 30]);

    let config = Config {
        mode: CopyMode::Content,
        dest_prefix: "bagstore".into(),
        verify_checksum: true,
        ..config(&swift, input.path())
    };
    let report = run(&config).await?;

    assert_eq!(report.succeeded, 3);
    assert!(report.failures.is_empty());

    for index in 0..3 {
        let contents = std::fs::read(input.path().join(format!("file-{index}")))?;
        let checksums = Checksums::compute(contents.as_slice())?;
        let container = format!("bagstore-{}", &checksums.sha1()[..4]);
        assert_eq!(
            swift.object(&container, checksums.sha1()).unwrap().as_ref(),
            contents.as_slice()
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_content_copy_mismatch() -> Result<()> {
    let swift = FakeSwift::new().await;
    let input = tempfile::tempdir()?;
    write_inputs(input.path(), &[10, 20, 30]);

    let contents = std::fs::read(input.path().join("file-1"))?;
    let checksums = Checksums::compute(contents.as_slice())?;
    swift.corrupt_etag(checksums.sha1());

    let config = Config {
        mode: CopyMode::Content,
        ..config(&swift, input.path())
    };
    let report = run(&config).await?;

    assert_eq!(report.file_count, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(
        report.failures_by_kind().get(&FailureKind::IntegrityMismatch),
        Some(&1)
    );
    assert!(report.failures[0].path.ends_with("file-1"));
    Ok(())
}

#[tokio::test]
async fn test_quarantine() -> Result<()> {
    let swift = FakeSwift::new().await;
    let input = tempfile::tempdir()?;
    write_inputs(input.path(), &[10, 20]);

    let config = Config {
        mode: CopyMode::Content,
        quarantine: true,
        ..config(&swift, input.path())
    };
    let report = run(&config).await?;

    assert_eq!(report.succeeded, 2);
    assert_eq!(swift.containers(), ["quarantine"]);
    Ok(())
}

#[tokio::test]
async fn test_num_files_limit() -> Result<()> {
    let swift = FakeSwift::new().await;
    let input = tempfile::tempdir()?;
    write_inputs(input.path(), &[1, 2, 3, 4, 5]);

    let config = Config {
        num_files: Some(2),
        ..config(&swift, input.path())
    };
    let report = run(&config).await?;

    assert_eq!(report.file_count, 2);
    assert_eq!(report.total_bytes, 3);
    assert_eq!(swift.object_puts(), 2);
    assert_eq!(
        swift.objects(),
        [
            ("benchmark-test".to_owned(), "file-0".to_owned()),
            ("benchmark-test".to_owned(), "file-1".to_owned()),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_bad_credentials_abort() -> Result<()> {
    let swift = FakeSwift::new().await;
    let input = tempfile::tempdir()?;
    write_inputs(input.path(), &[10]);

    let config = Config {
        backend: Backend::Swift(Swift {
            auth_url: swift.auth_url_v1(),
            username: USERNAME.into(),
            password: SecretBox::new(Box::new(ConfigSecret::from("wrong"))),
            auth_version: AuthVersion::V1,
            ..Default::default()
        }),
        ..config(&swift, input.path())
    };
    let result = run(&config).await;

    assert!(matches!(
        result,
        Err(BatchError::Setup(SetupError::Auth { .. }))
    ));
    assert_eq!(swift.object_puts(), 0);
    Ok(())
}

#[tokio::test]
async fn test_filesystem_backend() -> Result<()> {
    let input = tempfile::tempdir()?;
    let output = tempfile::tempdir()?;
    write_inputs(input.path(), &[10, 20, 30]);

    let config = Config {
        concurrency: 2,
        input_dir: input.path().into(),
        progress: false,
        backend: Backend::FileSystem {
            path: output.path().into(),
        },
        ..Default::default()
    };
    let report = run(&config).await?;

    assert_eq!(report.succeeded, 3);
    assert!(output.path().join("benchmark-test/file-2").exists());
    Ok(())
}
