//! OpenStack Swift backend.

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use reqwest::{Body, StatusCode, Url};
use serde::{Deserialize, Serialize};

use self::auth::Session;
use super::common::{ContentCopier, Copier, USER_AGENT, verify_tag};
use crate::checksum::Checksums;
use crate::error::{CopyError, CopyResult, SetupError, SetupResult};
use crate::naming::{NamingScheme, Placement};
use crate::source::FileSource;

mod auth;

const HEADER_AUTH_TOKEN: &str = "X-Auth-Token";
const OCTET_STREAM: &str = "application/octet-stream";

/// Identity API used to obtain a token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthVersion {
    /// Swift's built-in v1 auth (TempAuth, SwAuth).
    V1,
    /// Keystone v3 password authentication.
    #[default]
    V3,
}

/// Connection settings for a Swift cluster.
#[derive(Clone)]
pub struct SwiftConfig {
    /// Identity endpoint, for example `https://keystone:5000/v3` or `http://swift/auth/v1.0`.
    pub auth_url: String,
    pub username: String,
    /// Password (v3) or API key (v1).
    pub password: String,
    pub auth_version: AuthVersion,
    /// Project to scope the v3 token to.
    pub project_name: Option<String>,
    pub project_domain_name: String,
    pub user_domain_name: String,
    /// Catalog region to pick the object-store endpoint from.
    pub region: Option<String>,
    /// Catalog interface to pick the object-store endpoint from.
    pub interface: String,
    /// Overrides the storage URL discovered during authentication.
    pub storage_url: Option<String>,
    /// Timeout applied to every request.
    pub request_timeout: Option<Duration>,
}

impl Default for SwiftConfig {
    fn default() -> Self {
        Self {
            auth_url: String::new(),
            username: String::new(),
            password: String::new(),
            auth_version: AuthVersion::V3,
            project_name: None,
            project_domain_name: "Default".into(),
            user_domain_name: "Default".into(),
            region: None,
            interface: "public".into(),
            storage_url: None,
            request_timeout: None,
        }
    }
}

impl fmt::Debug for SwiftConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwiftConfig")
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .field("auth_version", &self.auth_version)
            .field("project_name", &self.project_name)
            .field("region", &self.region)
            .field("interface", &self.interface)
            .field("storage_url", &self.storage_url)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// Copies files into Swift containers.
pub struct SwiftCopier {
    config: SwiftConfig,
    naming: NamingScheme,
    session: Option<Session>,
    /// Containers known to exist.
    containers: Mutex<HashSet<String>>,
}

impl SwiftCopier {
    pub fn new(config: SwiftConfig, naming: NamingScheme) -> Self {
        Self {
            config,
            naming,
            session: None,
            containers: Mutex::new(HashSet::new()),
        }
    }

    fn session(&self) -> CopyResult<&Session> {
        self.session.as_ref().ok_or(CopyError::NotSetUp)
    }

    fn url(session: &Session, container: &str, object: Option<&str>) -> CopyResult<Url> {
        let mut url = session.storage_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| CopyError::InvalidUrl(session.storage_url.to_string()))?;
            segments.pop_if_empty().push(container);
            if let Some(object) = object {
                segments.push(object);
            }
        }
        Ok(url)
    }

    async fn create_container(&self, session: &Session, container: &str) -> CopyResult<()> {
        let url = Self::url(session, container, None)?;

        let context = format!("HEAD {container}");
        let response = session
            .client
            .head(url.clone())
            .header(HEADER_AUTH_TOKEN, session.token())
            .send()
            .await
            .map_err(|err| CopyError::transport(&context, err))?;

        match response.status() {
            status if status.is_success() => return Ok(()),
            StatusCode::NOT_FOUND => {}
            status => return Err(CopyError::Status { context, status }),
        }

        tracing::debug!(container, "creating container");
        let context = format!("PUT {container}");
        let response = session
            .client
            .put(url)
            .header(HEADER_AUTH_TOKEN, session.token())
            .header(CONTENT_LENGTH, 0)
            .send()
            .await
            .map_err(|err| CopyError::transport(&context, err))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            status => Err(CopyError::Status { context, status }),
        }
    }

    /// Streams `source` into the given object and returns the length and the returned `ETag`.
    async fn upload(
        &self,
        placement: &Placement,
        source: &FileSource,
        request_etag: Option<&str>,
    ) -> CopyResult<(u64, Option<String>)> {
        let session = self.session()?;
        let (stream, len) = source.open_stream().await?;
        self.ensure_container(&placement.container).await?;

        let url = Self::url(session, &placement.container, Some(&placement.object_key))?;

        let mut request = session
            .client
            .put(url)
            .header(HEADER_AUTH_TOKEN, session.token())
            .header(CONTENT_TYPE, OCTET_STREAM)
            .header(CONTENT_LENGTH, len);
        if let Some(etag) = request_etag {
            request = request.header(ETAG, etag);
        }

        let context = format!("PUT {placement}");
        let response = request
            .body(Body::wrap_stream(stream))
            .send()
            .await
            .map_err(|err| CopyError::transport(&context, err))?;

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim_matches('"').to_owned());

        match response.status() {
            // Swift refuses the object when the body does not hash to the request `ETag`.
            StatusCode::UNPROCESSABLE_ENTITY => Err(CopyError::IntegrityMismatch {
                object: placement.to_string(),
                expected: request_etag.unwrap_or_default().to_owned(),
                actual: "rejected by backend".to_owned(),
            }),
            status if status.is_success() => Ok((len, etag)),
            status => Err(CopyError::Status { context, status }),
        }
    }

    async fn write_placed(
        &self,
        placement: Placement,
        source: &FileSource,
        md5: &str,
    ) -> CopyResult<u64> {
        let (len, etag) = self.upload(&placement, source, None).await?;
        verify_tag(&placement.to_string(), md5, etag.as_deref())?;
        Ok(len)
    }
}

impl fmt::Debug for SwiftCopier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwiftCopier")
            .field("config", &self.config)
            .field("naming", &self.naming)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Copier for SwiftCopier {
    fn name(&self) -> &'static str {
        "swift"
    }

    async fn setup(&mut self) -> SetupResult<()> {
        let config = &self.config;
        if config.username.is_empty() || config.password.is_empty() || config.auth_url.is_empty()
        {
            return Err(SetupError::Config(
                "username, password and authentication URL are required".into(),
            ));
        }

        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| SetupError::Config(format!("could not build http client: {err}")))?;

        let session = auth::authenticate(client, config).await?;
        tracing::info!(storage_url = %session.storage_url, "authenticated with swift");

        self.session = Some(session);
        Ok(())
    }

    async fn ensure_container(&self, container: &str) -> CopyResult<()> {
        if self.containers.lock().unwrap().contains(container) {
            return Ok(());
        }

        let session = self.session()?;
        self.create_container(session, container)
            .await
            .map_err(|cause| CopyError::ContainerCreate {
                container: container.to_owned(),
                cause: Box::new(cause),
            })?;

        self.containers.lock().unwrap().insert(container.to_owned());
        Ok(())
    }

    #[tracing::instrument(level = "trace", fields(path = %source.path().display()), skip_all)]
    async fn copy(
        &self,
        source: &FileSource,
        container: &str,
        md5: Option<&str>,
    ) -> CopyResult<u64> {
        tracing::debug!("Copying to swift backend");
        let placement = Placement {
            container: container.to_owned(),
            object_key: source.file_name()?.to_owned(),
        };

        let (len, etag) = self.upload(&placement, source, md5).await?;
        if let Some(md5) = md5 {
            verify_tag(&placement.to_string(), md5, etag.as_deref())?;
        }
        Ok(len)
    }
}

#[async_trait::async_trait]
impl ContentCopier for SwiftCopier {
    fn naming(&self) -> &NamingScheme {
        &self.naming
    }

    #[tracing::instrument(level = "trace", fields(sha1 = checksums.sha1()), skip_all)]
    async fn write(
        &self,
        source: &FileSource,
        checksums: &Checksums,
        read_only: bool,
    ) -> CopyResult<u64> {
        tracing::debug!("Writing to swift backend");
        let placement = self.destination_path(checksums, read_only);
        self.write_placed(placement, source, checksums.md5()).await
    }

    #[tracing::instrument(level = "trace", fields(sha1 = checksums.sha1()), skip_all)]
    async fn write_quarantine(
        &self,
        source: &FileSource,
        checksums: &Checksums,
    ) -> CopyResult<u64> {
        tracing::debug!("Quarantining in swift backend");
        let placement = self.quarantine_path(checksums);
        self.write_placed(placement, source, checksums.md5()).await
    }

    async fn size(
        &self,
        checksums: &Checksums,
        read_only: bool,
        quarantine: bool,
    ) -> CopyResult<u64> {
        let session = self.session()?;
        let placement = if quarantine {
            self.quarantine_path(checksums)
        } else {
            self.destination_path(checksums, read_only)
        };
        let url = Self::url(session, &placement.container, Some(&placement.object_key))?;

        let context = format!("HEAD {placement}");
        let response = session
            .client
            .head(url)
            .header(HEADER_AUTH_TOKEN, session.token())
            .send()
            .await
            .map_err(|err| CopyError::transport(&context, err))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(CopyError::NotFound(placement.to_string())),
            status if !status.is_success() => return Err(CopyError::Status { context, status }),
            _ => {}
        }

        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| CopyError::Status {
                context: format!("{context} without a content length"),
                status: response.status(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(storage_url: &str) -> Session {
        Session {
            client: reqwest::Client::new(),
            storage_url: Url::parse(storage_url).unwrap(),
            token: String::new(),
        }
    }

    #[test]
    fn object_urls_are_escaped() {
        let session = session("http://swift:8080/v1/AUTH_test");

        let url = SwiftCopier::url(&session, "bench", Some("my file#1")).unwrap();
        assert_eq!(url.as_str(), "http://swift:8080/v1/AUTH_test/bench/my%20file%231");

        let url = SwiftCopier::url(&session, "bench", None).unwrap();
        assert_eq!(url.as_str(), "http://swift:8080/v1/AUTH_test/bench");
    }

    #[test]
    fn trailing_slash_in_storage_url() {
        let session = session("http://swift:8080/v1/AUTH_test/");

        let url = SwiftCopier::url(&session, "bagstore-a94a", Some("a94a")).unwrap();
        assert_eq!(url.as_str(), "http://swift:8080/v1/AUTH_test/bagstore-a94a/a94a");
    }

    #[tokio::test]
    async fn requires_credentials() {
        let mut copier = SwiftCopier::new(SwiftConfig::default(), NamingScheme::default());

        let err = copier.setup().await.unwrap_err();
        assert!(matches!(err, SetupError::Config(_)));
    }

    #[tokio::test]
    async fn unusable_before_setup() {
        let copier = SwiftCopier::new(SwiftConfig::default(), NamingScheme::default());
        let source = FileSource::new("/does/not/matter");

        let err = copier.copy(&source, "bench", None).await.unwrap_err();
        assert!(matches!(err, CopyError::NotSetUp));
    }

    #[test]
    fn config_debug_redacts_password() {
        let config = SwiftConfig {
            password: "hunter2".into(),
            ..Default::default()
        };

        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
