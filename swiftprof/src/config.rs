//! Configuration for a benchmark run.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line flags
//! 2. Environment variables (prefixed with `SWIFTPROF__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `SWIFTPROF__` as a prefix and double underscores (`__`) to denote
//! nested configuration structures. For example:
//!
//! - `SWIFTPROF__CONCURRENCY=32` sets the number of upload workers
//! - `SWIFTPROF__BACKEND__TYPE=swift` selects the Swift backend
//! - `SWIFTPROF__BACKEND__AUTH_URL=https://keystone:5000/v3` sets the identity endpoint
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! concurrency: 32
//!
//! backend:
//!   type: swift
//!   auth_url: https://keystone:5000/v3
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, ExposeSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use swiftprof_copier::{
    AuthVersion, CopierConfig, DEFAULT_QUARANTINE_CONTAINER, DEFAULT_SHARD_PREFIX, NamingScheme,
    SwiftConfig,
};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "SWIFTPROF__";

/// Newtype around `String` that may protect against accidental
/// logging of secrets in our configuration struct. Use with
/// [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// How files are placed in the object store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyMode {
    /// Every file goes into the `dest_prefix` container, keyed by its file name.
    #[default]
    Flat,
    /// Files are placed by their SHA-1 into sharded containers, see [`NamingScheme`].
    ///
    /// Requires precomputed checksums.
    Content,
}

/// The copy mode parse error.
#[derive(Clone, Debug)]
pub struct ModeParseError(String);

impl fmt::Display for ModeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as mode: expected one of "flat", "content""#,
            self.0
        )
    }
}

impl std::error::Error for ModeParseError {}

impl std::str::FromStr for CopyMode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            s if s.eq_ignore_ascii_case("flat") => Ok(CopyMode::Flat),
            s if s.eq_ignore_ascii_case("content") => Ok(CopyMode::Content),
            s => Err(ModeParseError(s.into())),
        }
    }
}

/// Connection settings for an OpenStack Swift cluster.
///
/// Used in: [`Backend::Swift`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Swift {
    /// Identity endpoint.
    ///
    /// For Keystone this is the `/v3` URL, for v1 auth the full auth URL such as
    /// `http://swift:8080/auth/v1.0`.
    ///
    /// # Environment Variable
    ///
    /// `SWIFTPROF__BACKEND__AUTH_URL`
    pub auth_url: String,

    /// User name.
    ///
    /// # Environment Variable
    ///
    /// `SWIFTPROF__BACKEND__USERNAME`
    pub username: String,

    /// Password (v3) or API key (v1). Redacted from logs.
    ///
    /// # Environment Variable
    ///
    /// `SWIFTPROF__BACKEND__PASSWORD`
    pub password: SecretBox<ConfigSecret>,

    /// Identity API version, `v3` or `v1`.
    ///
    /// # Default
    ///
    /// `v3`
    pub auth_version: AuthVersion,

    /// Project to scope Keystone tokens to.
    pub project_name: Option<String>,

    /// Domain of the project.
    ///
    /// # Default
    ///
    /// `Default`
    pub project_domain_name: String,

    /// Domain of the user.
    ///
    /// # Default
    ///
    /// `Default`
    pub user_domain_name: String,

    /// Catalog region to take the object-store endpoint from.
    pub region: Option<String>,

    /// Catalog interface to take the object-store endpoint from.
    ///
    /// # Default
    ///
    /// `public`
    pub interface: String,

    /// Overrides the storage URL discovered during authentication.
    pub storage_url: Option<String>,

    /// Timeout for every single request, for example `30s`.
    ///
    /// # Default
    ///
    /// `None` (no timeout)
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
}

impl Default for Swift {
    fn default() -> Self {
        let defaults = SwiftConfig::default();
        Self {
            auth_url: defaults.auth_url,
            username: defaults.username,
            password: SecretBox::new(Box::default()),
            auth_version: defaults.auth_version,
            project_name: defaults.project_name,
            project_domain_name: defaults.project_domain_name,
            user_domain_name: defaults.user_domain_name,
            region: defaults.region,
            interface: defaults.interface,
            storage_url: defaults.storage_url,
            request_timeout: defaults.request_timeout,
        }
    }
}

impl Swift {
    fn copier_config(&self) -> SwiftConfig {
        SwiftConfig {
            auth_url: self.auth_url.clone(),
            username: self.username.clone(),
            password: self.password.expose_secret().as_str().to_owned(),
            auth_version: self.auth_version,
            project_name: self.project_name.clone(),
            project_domain_name: self.project_domain_name.clone(),
            user_domain_name: self.user_domain_name.clone(),
            region: self.region.clone(),
            interface: self.interface.clone(),
            storage_url: self.storage_url.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

/// Storage backend to upload into.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
///
/// Used in: [`Config::backend`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Backend {
    /// OpenStack Swift (type `"swift"`).
    ///
    /// # Example
    ///
    /// ```yaml
    /// backend:
    ///   type: swift
    ///   auth_url: https://keystone:5000/v3
    ///   username: benchmark
    ///   password: secret
    ///   project_name: benchmark
    /// ```
    Swift(Swift),

    /// Local filesystem (type `"filesystem"`).
    ///
    /// Every container becomes a directory below `path`.
    ///
    /// # Example
    ///
    /// ```yaml
    /// backend:
    ///   type: filesystem
    ///   path: /tmp/swiftprof-out
    /// ```
    FileSystem {
        /// Root directory, created if it doesn't exist.
        path: PathBuf,
    },

    /// Objects are kept in memory and dropped at exit (type `"memory"`).
    ///
    /// Measures the dispatch overhead without any remote store.
    Memory,
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Swift(Swift::default())
    }
}

impl Backend {
    /// Returns the settings to construct a copier for this backend.
    pub fn copier_config(&self) -> CopierConfig<'_> {
        match self {
            Backend::Swift(swift) => CopierConfig::Swift(swift.copier_config()),
            Backend::FileSystem { path } => CopierConfig::FileSystem { path },
            Backend::Memory => CopierConfig::InMemory,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// Dump out JSON lines.
    Json,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr, the report goes to stdout.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level of the swiftprof crates.
    ///
    /// Other crates only log warnings and errors. The `RUST_LOG` environment variable replaces
    /// this filter entirely if set.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `SWIFTPROF__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format. See [`LogFormat`] for available options.
    ///
    /// # Default
    ///
    /// `Auto` (pretty for TTY, simplified otherwise)
    ///
    /// # Environment Variable
    ///
    /// `SWIFTPROF__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Benchmark configuration.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Number of concurrent upload workers. Must be at least 1.
    ///
    /// Also bounds the number of files hashed at once during precompute.
    ///
    /// # Default
    ///
    /// `16`
    pub concurrency: usize,

    /// Directory whose regular files are uploaded. Subdirectories are ignored.
    ///
    /// # Default
    ///
    /// `/tmp/benchmark-test`
    pub input_dir: PathBuf,

    /// Destination container in flat mode, shard prefix in content mode.
    ///
    /// # Default
    ///
    /// `benchmark-test`
    pub dest_prefix: String,

    /// Hash every file with SHA-1 and MD5 before dispatching.
    ///
    /// # Default
    ///
    /// `true`
    pub precompute_checksum: bool,

    /// Compare the stored object length with the uploaded length after every write.
    ///
    /// Only applies to content mode.
    ///
    /// # Default
    ///
    /// `false`
    pub verify_checksum: bool,

    /// Upload at most this many files, in file name order.
    ///
    /// # Default
    ///
    /// `None` (all files)
    pub num_files: Option<usize>,

    /// Placement of uploaded files.
    ///
    /// # Default
    ///
    /// `flat`
    pub mode: CopyMode,

    /// Write into the quarantine container instead of the sharded containers (content mode).
    ///
    /// # Default
    ///
    /// `false`
    pub quarantine: bool,

    /// Name of the quarantine container.
    ///
    /// # Default
    ///
    /// `quarantine`
    pub quarantine_container: String,

    /// Show a progress bar while dispatching. Hidden when stderr is not a terminal.
    ///
    /// # Default
    ///
    /// `true`
    pub progress: bool,

    /// Storage backend to upload into.
    ///
    /// # Default
    ///
    /// Swift without credentials, which fails at setup until configured.
    pub backend: Backend,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 16,
            input_dir: PathBuf::from("/tmp/benchmark-test"),
            dest_prefix: DEFAULT_SHARD_PREFIX.to_owned(),
            precompute_checksum: true,
            verify_checksum: false,
            num_files: None,
            mode: CopyMode::Flat,
            quarantine: false,
            quarantine_container: DEFAULT_QUARANTINE_CONTAINER.to_owned(),
            progress: true,
            backend: Backend::default(),
            logging: Logging::default(),
        }
    }
}

/// Values given on the command line.
///
/// Unset fields leave the value from the other sources untouched.
#[derive(Debug, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precompute_checksum: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_checksum: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<CopyMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarantine: Option<bool>,
}

impl Config {
    /// Loads configuration from the given file, the environment and command line overrides.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if `path` is given)
    /// 3. Environment variables (prefixed with `SWIFTPROF__`)
    /// 4. Command line overrides
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The YAML configuration file cannot be read or parsed
    /// - Environment variables contain invalid values
    /// - `concurrency` is zero
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides))
            .extract()?;

        if config.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }

        Ok(config)
    }

    /// The naming scheme for content-addressed placement.
    pub fn naming(&self) -> NamingScheme {
        NamingScheme::new(&self.dest_prefix, &self.quarantine_container)
    }
}
