use std::env;
use std::io::IsTerminal;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, prelude::*};

use crate::config::{LogFormat, Logging};

pub fn init_tracing(config: &Logging) {
    let format = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let format = match resolve_format(config.format) {
        LogFormat::Json => format.json().boxed(),
        LogFormat::Simplified => format.with_ansi(false).boxed(),
        LogFormat::Pretty | LogFormat::Auto => format.with_ansi(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(format)
        .with(env_filter(config.level))
        .init();
}

fn resolve_format(format: LogFormat) -> LogFormat {
    match format {
        LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        format => format,
    }
}

/// Uses `RUST_LOG` literally if it is set, otherwise logs the swiftprof crates at `level` and
/// everything else at `WARN`.
fn env_filter(level: LevelFilter) -> EnvFilter {
    match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => EnvFilter::new(value),
        Err(_) => EnvFilter::new(format!(
            "WARN,swiftprof={level},swiftprof_copier={level}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_formats_are_kept() {
        assert_eq!(resolve_format(LogFormat::Json), LogFormat::Json);
        assert_eq!(resolve_format(LogFormat::Simplified), LogFormat::Simplified);
        assert_ne!(resolve_format(LogFormat::Auto), LogFormat::Auto);
    }
}
