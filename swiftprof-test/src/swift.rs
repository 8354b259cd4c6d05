//! Exposes an in-process fake Swift cluster for use in integration tests.
//!
//! ```
//! use swiftprof_test::swift::FakeSwift;
//!
//! #[tokio::main]
//! async fn main() {
//!    let swift = FakeSwift::new().await;
//!    let auth_url = swift.auth_url_v1();
//!    // point a copier at the auth URL...
//! }
//! ```
//!
//! The server implements just enough of the Swift and Keystone APIs for the copier: v1 and v3
//! authentication, container `HEAD`/`PUT` and object `HEAD`/`PUT`. Every stored object answers
//! with its MD5 as `ETag`, unless it was marked with [`FakeSwift::corrupt_etag`].

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, head, post};
use axum::{Json, Router};
use md5::{Digest, Md5};
use serde_json::{Value, json};

/// Account segment of the storage URL.
pub const ACCOUNT: &str = "AUTH_test";
/// The only user the fake accepts.
pub const USERNAME: &str = "tester";
/// Password (v3) or key (v1) of [`USERNAME`].
pub const PASSWORD: &str = "testing";

const TOKEN: &str = "AUTH_tk_fake";
const CORRUPT_ETAG: &str = "00000000000000000000000000000000";

#[derive(Debug, Default)]
struct Inner {
    containers: BTreeSet<String>,
    objects: BTreeMap<(String, String), Bytes>,
    corrupt: HashSet<String>,
    object_puts: usize,
}

#[derive(Clone, Debug)]
struct AppState {
    inner: Arc<Mutex<Inner>>,
    storage_url: Arc<str>,
}

/// An in-process fake Swift server.
///
/// It listens on a random available port on localhost and stops when dropped.
#[derive(Debug)]
pub struct FakeSwift {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    inner: Arc<Mutex<Inner>>,
}

impl FakeSwift {
    pub async fn new() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let inner = Arc::new(Mutex::new(Inner::default()));
        let state = AppState {
            inner: Arc::clone(&inner),
            storage_url: format!("http://{socket}/v1/{ACCOUNT}").into(),
        };

        let app = Router::new()
            .route("/auth/v1.0", get(auth_v1))
            .route("/v3/auth/tokens", post(auth_v3))
            .route(
                "/v1/{account}/{container}",
                head(head_container).put(put_container),
            )
            .route(
                "/v1/{account}/{container}/{*object}",
                head(head_object).put(put_object),
            )
            .with_state(state);

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            inner,
        }
    }

    /// Returns a full URL pointing to the given path.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://{}/{}", self.socket, path)
    }

    /// Identity endpoint for v1 authentication.
    pub fn auth_url_v1(&self) -> String {
        self.url("/auth/v1.0")
    }

    /// Identity endpoint for Keystone v3 authentication.
    pub fn auth_url_v3(&self) -> String {
        self.url("/v3")
    }

    /// The storage URL handed out during authentication.
    pub fn storage_url(&self) -> String {
        self.url(&format!("/v1/{ACCOUNT}"))
    }

    /// Makes uploads of `object_key` answer with a wrong `ETag`.
    ///
    /// The object is still stored.
    pub fn corrupt_etag(&self, object_key: &str) {
        self.lock().corrupt.insert(object_key.to_owned());
    }

    /// Creates a container ahead of time.
    pub fn create_container(&self, container: &str) {
        self.lock().containers.insert(container.to_owned());
    }

    /// Returns the stored contents of an object.
    pub fn object(&self, container: &str, object_key: &str) -> Option<Bytes> {
        self.lock()
            .objects
            .get(&(container.to_owned(), object_key.to_owned()))
            .cloned()
    }

    /// Returns all containers in sorted order.
    pub fn containers(&self) -> Vec<String> {
        self.lock().containers.iter().cloned().collect()
    }

    /// Returns `(container, object_key)` of all stored objects in sorted order.
    pub fn objects(&self) -> Vec<(String, String)> {
        self.lock().objects.keys().cloned().collect()
    }

    /// Number of object uploads received, including rejected ones.
    pub fn object_puts(&self) -> usize {
        self.lock().object_puts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }
}

impl Drop for FakeSwift {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn authorized(headers: &HeaderMap) -> bool {
    header_str(headers, "x-auth-token") == Some(TOKEN)
}

async fn auth_v1(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if header_str(&headers, "x-auth-user") != Some(USERNAME)
        || header_str(&headers, "x-auth-key") != Some(PASSWORD)
    {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    (
        StatusCode::OK,
        [
            ("x-auth-token", TOKEN),
            ("x-storage-url", &*state.storage_url),
        ],
    )
        .into_response()
}

async fn auth_v3(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let user = &body["auth"]["identity"]["password"]["user"];
    if user["name"] != USERNAME || user["password"] != PASSWORD {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let catalog = json!({
        "token": {
            "catalog": [
                {
                    "type": "object-store",
                    "endpoints": [
                        {
                            "interface": "internal",
                            "region": "RegionOne",
                            "url": "http://127.0.0.1:1/v1/internal"
                        },
                        {
                            "interface": "public",
                            "region": "RegionOne",
                            "url": &*state.storage_url
                        }
                    ]
                }
            ]
        }
    });

    (
        StatusCode::CREATED,
        [("x-subject-token", TOKEN)],
        Json(catalog),
    )
        .into_response()
}

async fn head_container(
    State(state): State<AppState>,
    Path((_account, container)): Path<(String, String)>,
    headers: HeaderMap,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }

    match state.inner.lock().unwrap().containers.contains(&container) {
        true => StatusCode::NO_CONTENT,
        false => StatusCode::NOT_FOUND,
    }
}

async fn put_container(
    State(state): State<AppState>,
    Path((_account, container)): Path<(String, String)>,
    headers: HeaderMap,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }

    match state.inner.lock().unwrap().containers.insert(container) {
        true => StatusCode::CREATED,
        false => StatusCode::ACCEPTED,
    }
}

async fn head_object(
    State(state): State<AppState>,
    Path((_account, container, object)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let inner = state.inner.lock().unwrap();
    let Some(contents) = inner.objects.get(&(container, object)) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_LENGTH, contents.len().to_string()),
            (header::ETAG, hex::encode(Md5::digest(contents))),
        ],
    )
        .into_response()
}

async fn put_object(
    State(state): State<AppState>,
    Path((_account, container, object)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let mut inner = state.inner.lock().unwrap();
    inner.object_puts += 1;
    if !inner.containers.contains(&container) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let md5 = hex::encode(Md5::digest(&body));
    if let Some(expected) = header_str(&headers, "etag")
        && !expected.trim_matches('"').eq_ignore_ascii_case(&md5)
    {
        return StatusCode::UNPROCESSABLE_ENTITY.into_response();
    }

    let etag = match inner.corrupt.contains(&object) {
        true => CORRUPT_ETAG.to_owned(),
        false => md5,
    };
    inner.objects.insert((container, object), body);

    (StatusCode::CREATED, [(header::ETAG, etag)]).into_response()
}
