//! Authentication against Keystone (v3) or Swift's built-in v1 auth.

use std::fmt;

use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;

use super::{AuthVersion, SwiftConfig};
use crate::error::{SetupError, SetupResult};

const HEADER_AUTH_USER: &str = "X-Auth-User";
const HEADER_AUTH_KEY: &str = "X-Auth-Key";
const HEADER_AUTH_TOKEN: &str = "X-Auth-Token";
const HEADER_STORAGE_URL: &str = "X-Storage-Url";
const HEADER_SUBJECT_TOKEN: &str = "X-Subject-Token";

/// Service type of Swift in the Keystone catalog.
const OBJECT_STORE: &str = "object-store";

/// An authenticated session with the object store.
///
/// Owns the HTTP client and is shared by reference between all workers.
pub(crate) struct Session {
    pub client: Client,
    pub storage_url: Url,
    pub(super) token: String,
}

impl Session {
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("storage_url", &self.storage_url.as_str())
            .field("token", &"[redacted]")
            .finish_non_exhaustive()
    }
}

struct Authenticated {
    token: String,
    storage_url: Option<String>,
}

/// Authenticates with the configured identity endpoint and resolves the storage URL.
pub(crate) async fn authenticate(client: Client, config: &SwiftConfig) -> SetupResult<Session> {
    let authenticated = match config.auth_version {
        AuthVersion::V1 => v1(&client, config).await?,
        AuthVersion::V3 => v3(&client, config).await?,
    };

    let storage_url = config
        .storage_url
        .clone()
        .or(authenticated.storage_url)
        .ok_or_else(|| SetupError::auth("no object-store endpoint was returned"))?;

    let storage_url = Url::parse(&storage_url)
        .map_err(|err| SetupError::Config(format!("invalid storage url `{storage_url}`: {err}")))?;
    if storage_url.cannot_be_a_base() {
        return Err(SetupError::Config(format!(
            "invalid storage url `{storage_url}`"
        )));
    }

    Ok(Session {
        client,
        storage_url,
        token: authenticated.token,
    })
}

async fn v1(client: &Client, config: &SwiftConfig) -> SetupResult<Authenticated> {
    let response = client
        .get(&config.auth_url)
        .header(HEADER_AUTH_USER, &config.username)
        .header(HEADER_AUTH_KEY, &config.password)
        .send()
        .await
        .map_err(|err| SetupError::auth_caused("could not reach the auth endpoint", err))?;

    check_status(response.status())?;

    let headers = response.headers();
    let token = header_string(headers, HEADER_AUTH_TOKEN)
        .ok_or_else(|| SetupError::auth("response carried no auth token"))?;
    let storage_url = header_string(headers, HEADER_STORAGE_URL);

    Ok(Authenticated { token, storage_url })
}

async fn v3(client: &Client, config: &SwiftConfig) -> SetupResult<Authenticated> {
    let mut body = json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": {
                    "user": {
                        "name": config.username,
                        "domain": { "name": config.user_domain_name },
                        "password": config.password,
                    }
                }
            }
        }
    });
    if let Some(project) = &config.project_name {
        body["auth"]["scope"] = json!({
            "project": {
                "name": project,
                "domain": { "name": config.project_domain_name },
            }
        });
    }

    let response = client
        .post(tokens_url(&config.auth_url))
        .json(&body)
        .send()
        .await
        .map_err(|err| SetupError::auth_caused("could not reach the identity endpoint", err))?;

    check_status(response.status())?;

    let token = header_string(response.headers(), HEADER_SUBJECT_TOKEN)
        .ok_or_else(|| SetupError::auth("response carried no subject token"))?;
    let response: TokenResponse = response
        .json()
        .await
        .map_err(|err| SetupError::auth_caused("could not parse the token response", err))?;

    let storage_url = select_endpoint(
        &response.token.catalog,
        &config.interface,
        config.region.as_deref(),
    )
    .map(str::to_owned);

    Ok(Authenticated { token, storage_url })
}

fn check_status(status: StatusCode) -> SetupResult<()> {
    match status {
        status if status.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SetupError::auth(format!(
            "credentials did not authenticate ({status})"
        ))),
        status => Err(SetupError::auth(format!(
            "auth endpoint responded with {status}"
        ))),
    }
}

fn header_string(headers: &reqwest::header::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Builds the token endpoint from an identity URL with or without the `/v3` suffix.
fn tokens_url(auth_url: &str) -> String {
    let base = auth_url.trim_end_matches('/');
    if base.ends_with("/v3") {
        format!("{base}/auth/tokens")
    } else {
        format!("{base}/v3/auth/tokens")
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    interface: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
    url: String,
}

fn select_endpoint<'a>(
    catalog: &'a [CatalogEntry],
    interface: &str,
    region: Option<&str>,
) -> Option<&'a str> {
    catalog
        .iter()
        .filter(|entry| entry.kind == OBJECT_STORE)
        .flat_map(|entry| &entry.endpoints)
        .filter(|endpoint| endpoint.interface == interface)
        .find(|endpoint| match region {
            Some(region) => {
                endpoint.region.as_deref() == Some(region)
                    || endpoint.region_id.as_deref() == Some(region)
            }
            None => true,
        })
        .map(|endpoint| endpoint.url.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<CatalogEntry> {
        let body = json!({
            "token": {
                "catalog": [
                    {
                        "type": "identity",
                        "endpoints": [
                            { "interface": "public", "region": "one", "url": "http://keystone" }
                        ]
                    },
                    {
                        "type": "object-store",
                        "endpoints": [
                            { "interface": "internal", "region": "one", "url": "http://internal/v1/AUTH_a" },
                            { "interface": "public", "region": "one", "url": "http://one/v1/AUTH_a" },
                            { "interface": "public", "region_id": "two", "url": "http://two/v1/AUTH_a" }
                        ]
                    }
                ]
            }
        });
        serde_json::from_value::<TokenResponse>(body).unwrap().token.catalog
    }

    #[test]
    fn selects_object_store_by_interface() {
        let catalog = catalog();

        assert_eq!(
            select_endpoint(&catalog, "public", None),
            Some("http://one/v1/AUTH_a")
        );
        assert_eq!(
            select_endpoint(&catalog, "internal", None),
            Some("http://internal/v1/AUTH_a")
        );
        assert_eq!(select_endpoint(&catalog, "admin", None), None);
    }

    #[test]
    fn selects_object_store_by_region() {
        let catalog = catalog();

        assert_eq!(
            select_endpoint(&catalog, "public", Some("two")),
            Some("http://two/v1/AUTH_a")
        );
        assert_eq!(select_endpoint(&catalog, "public", Some("three")), None);
    }

    #[test]
    fn token_url_variants() {
        assert_eq!(
            tokens_url("https://keystone:5000/v3"),
            "https://keystone:5000/v3/auth/tokens"
        );
        assert_eq!(
            tokens_url("https://keystone:5000/v3/"),
            "https://keystone:5000/v3/auth/tokens"
        );
        assert_eq!(
            tokens_url("https://keystone:5000"),
            "https://keystone:5000/v3/auth/tokens"
        );
    }

    #[test]
    fn session_debug_redacts_token() {
        let session = Session {
            client: Client::new(),
            storage_url: Url::parse("http://swift/v1/AUTH_a").unwrap(),
            token: "secret-token".into(),
        };

        let debug = format!("{session:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("http://swift/v1/AUTH_a"));
    }
}
