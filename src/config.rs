//! Runtime configuration.
//!
//! Values are baked in at build time through `option_env!` (that is the only
//! environment a wasm bundle has). Native builds additionally let the process
//! environment override them.

use once_cell::sync::Lazy;

const DEFAULT_BACKEND_ORIGIN: &str = "http://localhost:8000";
const API_PREFIX: &str = "/api/v1";

pub const ENV_API_BASE_URL: &str = "PRINTFORGE_API_BASE_URL";
pub const ENV_BACKEND_ORIGIN: &str = "PRINTFORGE_BACKEND_ORIGIN";
pub const ENV_APP_VERSION: &str = "PRINTFORGE_APP_VERSION";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Base every REST path is joined onto, e.g. `http://localhost:8000/api/v1`.
    pub api_base_url: String,
    /// Origin serving uploaded assets (model files, avatars).
    pub backend_origin: String,
    pub app_version: String,
}

static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

/// Process-wide configuration, resolved on first use.
pub fn config() -> &'static AppConfig {
    &CONFIG
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(lookup_env)
    }

    /// Builds the config from an arbitrary variable lookup. Missing or blank
    /// values fall back to the documented defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let backend_origin = get(ENV_BACKEND_ORIGIN)
            .map(|v| trim_trailing_slash(&v))
            .unwrap_or_else(|| DEFAULT_BACKEND_ORIGIN.to_string());
        let api_base_url = get(ENV_API_BASE_URL)
            .map(|v| trim_trailing_slash(&v))
            .unwrap_or_else(|| format!("{backend_origin}{API_PREFIX}"));
        let app_version =
            get(ENV_APP_VERSION).unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

        Self {
            api_base_url,
            backend_origin,
            app_version,
        }
    }

    /// Turns a backend-relative asset path (`/uploads/x.stl`) into an absolute URL.
    /// Absolute URLs pass through.
    pub fn asset_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") || path.starts_with("data:") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{path}", self.backend_origin)
        } else {
            format!("{}/{path}", self.backend_origin)
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn trim_trailing_slash(value: &str) -> String {
    value.trim_end_matches('/').to_string()
}

fn build_time(key: &str) -> Option<String> {
    let value = match key {
        ENV_API_BASE_URL => option_env!("PRINTFORGE_API_BASE_URL"),
        ENV_BACKEND_ORIGIN => option_env!("PRINTFORGE_BACKEND_ORIGIN"),
        ENV_APP_VERSION => option_env!("PRINTFORGE_APP_VERSION"),
        _ => None,
    };
    value.map(str::to_string)
}

#[cfg(not(target_arch = "wasm32"))]
fn lookup_env(key: &str) -> Option<String> {
    std::env::var(key).ok().or_else(|| build_time(key))
}

#[cfg(target_arch = "wasm32")]
fn lookup_env(key: &str) -> Option<String> {
    build_time(key)
}
