//! The one configured REST client.
//!
//! Every call goes through [`HttpClient`], which joins paths onto the API base,
//! rewrites legacy paths, and maps statuses onto [`ApiError`]. The wire work is
//! delegated to a [`Transport`]: `gloo-net` in the browser, an offline stub on
//! native builds, scripted fakes in tests.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Prefix that older call sites still bake into their paths.
pub const API_PREFIX: &str = "/api/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultipartFile {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(MultipartFile),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub body: RequestBody,
    /// Send cookies along (API calls always do; static assets don't need to).
    pub credentials: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Sends one request. Transport failures (no response at all) are
/// `ApiError::Network`; any response, whatever its status, is `Ok`.
pub trait Transport {
    fn send(&self, request: ApiRequest) -> LocalBoxFuture<'_, Result<ApiResponse, ApiError>>;
}

/// Rewrites paths older call sites still use onto the current API.
///
/// Pure and deterministic: a leading `/api/v1` is dropped (the base URL
/// already carries it), then known aliases are mapped. Query strings are
/// preserved; unknown paths pass through untouched.
pub fn rewrite_legacy_path(method: Method, path: &str) -> Cow<'_, str> {
    let (route, query) = match path.find('?') {
        Some(i) => path.split_at(i),
        None => (path, ""),
    };

    let stripped = match route.strip_prefix(API_PREFIX) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => Some(rest),
        _ => None,
    };
    let route_now = stripped.unwrap_or(route);

    let alias = match (method, route_now) {
        (Method::Get, "/users/me" | "/api/users/me" | "/users/me/") => Some("/auth/me"),
        (_, "/auth/login") => Some("/auth/signin"),
        (_, "/auth/logout") => Some("/auth/signout"),
        (_, "/auth/register") => Some("/auth/signup"),
        _ => None,
    };

    match (alias, stripped) {
        (None, None) => Cow::Borrowed(path),
        (Some(new), _) => Cow::Owned(format!("{new}{query}")),
        (None, Some(rest)) => Cow::Owned(format!("{rest}{query}")),
    }
}

#[derive(Clone)]
pub struct HttpClient {
    base_url: String,
    transport: Rc<dyn Transport>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, transport: Rc<dyn Transport>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
        }
    }

    /// The client the running app uses: configured base URL, platform transport.
    pub fn from_config(config: &crate::config::AppConfig) -> Self {
        Self::new(config.api_base_url.clone(), platform_transport())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, method: Method, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let path = rewrite_legacy_path(method, path);
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<ApiResponse, ApiError> {
        let request = ApiRequest {
            method,
            url: self.url_for(method, path),
            body,
            credentials: true,
        };
        log::debug!("{} {}", request.method, request.url);

        let response = self.transport.send(request).await?;
        if response.is_success() {
            Ok(response)
        } else {
            let err = ApiError::from_status(response.status, &response.text());
            log::debug!("{method} {path} -> {}: {err}", response.status);
            Err(err)
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(Method::Get, path, RequestBody::Empty).await?;
        decode(&response)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::Post, path, json_body(body)?).await?;
        decode(&response)
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::Patch, path, json_body(body)?).await?;
        decode(&response)
    }

    /// POST with no body, ignoring whatever comes back.
    pub async fn post_empty(&self, path: &str) -> Result<(), ApiError> {
        self.send(Method::Post, path, RequestBody::Empty).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(Method::Delete, path, RequestBody::Empty).await?;
        Ok(())
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        file: MultipartFile,
    ) -> Result<T, ApiError> {
        let response = self
            .send(Method::Post, path, RequestBody::Multipart(file))
            .await?;
        decode(&response)
    }

    /// Downloads raw bytes from an absolute URL (model files).
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let request = ApiRequest {
            method: Method::Get,
            url: url.to_string(),
            body: RequestBody::Empty,
            credentials: false,
        };
        let response = self.transport.send(request).await?;
        if response.is_success() {
            Ok(response.body)
        } else {
            Err(ApiError::from_status(response.status, &response.text()))
        }
    }
}

fn json_body<B: Serialize + ?Sized>(body: &B) -> Result<RequestBody, ApiError> {
    serde_json::to_value(body)
        .map(RequestBody::Json)
        .map_err(|e| ApiError::Decode(e.to_string()))
}

fn decode<T: DeserializeOwned>(response: &ApiResponse) -> Result<T, ApiError> {
    // 204s and empty bodies decode as JSON null so `()` and `Option<_>` work.
    let body: &[u8] = if response.body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        &response.body
    };
    serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))
}

// --------------------------- browser transport ---------------------------

#[cfg(target_arch = "wasm32")]
pub struct GlooTransport;

#[cfg(target_arch = "wasm32")]
impl GlooTransport {
    async fn send_inner(request: ApiRequest) -> Result<ApiResponse, ApiError> {
        use gloo_net::http::{Request, RequestBuilder};
        use web_sys::RequestCredentials;

        let builder: RequestBuilder = match request.method {
            Method::Get => Request::get(&request.url),
            Method::Post => Request::post(&request.url),
            Method::Patch => Request::patch(&request.url),
            Method::Delete => Request::delete(&request.url),
        };
        let builder = if request.credentials {
            builder.credentials(RequestCredentials::Include)
        } else {
            builder
        };

        let built = match request.body {
            RequestBody::Empty => builder.header("Accept", "application/json").build(),
            RequestBody::Json(value) => builder.header("Accept", "application/json").json(&value),
            RequestBody::Multipart(file) => {
                let form = multipart_form(&file).map_err(|e| ApiError::Network(format!("{e:?}")))?;
                builder.body(form)
            }
        };
        let built = built.map_err(to_network)?;

        let response = built.send().await.map_err(to_network)?;
        let status = response.status();
        let body = response.binary().await.map_err(to_network)?;
        Ok(ApiResponse { status, body })
    }
}

#[cfg(target_arch = "wasm32")]
impl Transport for GlooTransport {
    fn send(&self, request: ApiRequest) -> LocalBoxFuture<'_, Result<ApiResponse, ApiError>> {
        Box::pin(Self::send_inner(request))
    }
}

#[cfg(target_arch = "wasm32")]
fn multipart_form(file: &MultipartFile) -> Result<web_sys::FormData, wasm_bindgen::JsValue> {
    let parts = js_sys::Array::of1(&js_sys::Uint8Array::from(file.bytes.as_slice()));
    let options = web_sys::BlobPropertyBag::new();
    options.set_type(&file.mime);
    let blob = web_sys::Blob::new_with_u8_array_sequence_and_options(&parts, &options)?;
    let form = web_sys::FormData::new()?;
    form.append_with_blob_and_filename(&file.field, &blob, &file.file_name)?;
    Ok(form)
}

#[cfg(target_arch = "wasm32")]
fn to_network<E: fmt::Display>(e: E) -> ApiError {
    ApiError::Network(e.to_string())
}

// --------------------------- native stub ---------------------------

/// Native builds have no browser fetch; every request fails as a network error,
/// which the app already treats as "signed out" / "empty".
#[cfg(not(target_arch = "wasm32"))]
pub struct OfflineTransport;

#[cfg(not(target_arch = "wasm32"))]
impl Transport for OfflineTransport {
    fn send(&self, request: ApiRequest) -> LocalBoxFuture<'_, Result<ApiResponse, ApiError>> {
        Box::pin(async move {
            Err(ApiError::Network(format!(
                "no HTTP transport on this target ({} {})",
                request.method, request.url
            )))
        })
    }
}

pub fn platform_transport() -> Rc<dyn Transport> {
    #[cfg(target_arch = "wasm32")]
    {
        Rc::new(GlooTransport)
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        Rc::new(OfflineTransport)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;

    use super::*;

    type Responder = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse, ApiError>>;

    /// Answers every request through a closure and records what was sent.
    pub struct ScriptedTransport {
        responder: Responder,
        pub requests: RefCell<Vec<ApiRequest>>,
    }

    impl ScriptedTransport {
        pub fn new<F>(responder: F) -> Rc<Self>
        where
            F: Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + 'static,
        {
            Rc::new(Self {
                responder: Box::new(responder),
                requests: RefCell::new(Vec::new()),
            })
        }

        pub fn count(&self, method: Method, url_suffix: &str) -> usize {
            self.requests
                .borrow()
                .iter()
                .filter(|r| r.method == method && r.url.ends_with(url_suffix))
                .count()
        }

        pub fn total(&self) -> usize {
            self.requests.borrow().len()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, request: ApiRequest) -> LocalBoxFuture<'_, Result<ApiResponse, ApiError>> {
            let result = (self.responder)(&request);
            self.requests.borrow_mut().push(request);
            Box::pin(async move { result })
        }
    }

    pub fn client(transport: Rc<ScriptedTransport>) -> HttpClient {
        HttpClient::new("http://api.test/api/v1", transport)
    }
}
