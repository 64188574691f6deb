//! Client-side routes and browser history.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Model { id: String },
    Upload,
    Cart,
    Checkout,
    SignIn { next: Option<String> },
    SignUp,
    Account,
    Admin,
    NotFound(String),
}

impl Route {
    /// Parses a path with optional query (`/signin?next=%2Faccount`).
    pub fn parse(path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path_and_query, None),
        };
        let path = path.trim_end_matches('/');

        match path {
            "" => Self::Home,
            "/upload" => Self::Upload,
            "/cart" => Self::Cart,
            "/checkout" => Self::Checkout,
            "/signin" | "/login" => Self::SignIn {
                next: query.and_then(next_param),
            },
            "/signup" | "/register" => Self::SignUp,
            "/account" | "/settings" => Self::Account,
            "/admin" => Self::Admin,
            _ => match path.strip_prefix("/models/") {
                Some(id) if !id.is_empty() && !id.contains('/') => Self::Model { id: id.to_string() },
                _ => Self::NotFound(path_and_query.to_string()),
            },
        }
    }

    pub fn to_path(&self) -> String {
        match self {
            Self::Home => "/".into(),
            Self::Model { id } => format!("/models/{}", urlencoding::encode(id)),
            Self::Upload => "/upload".into(),
            Self::Cart => "/cart".into(),
            Self::Checkout => "/checkout".into(),
            Self::SignIn { next: None } => "/signin".into(),
            Self::SignIn { next: Some(next) } => {
                format!("/signin?next={}", urlencoding::encode(next))
            }
            Self::SignUp => "/signup".into(),
            Self::Account => "/account".into(),
            Self::Admin => "/admin".into(),
            Self::NotFound(path) => path.clone(),
        }
    }

    /// Pages that sit behind the route guard.
    pub fn is_protected(&self) -> bool {
        matches!(self, Self::Upload | Self::Checkout | Self::Account | Self::Admin)
    }

    /// The sign-in route that returns here after a successful login.
    pub fn sign_in_returning_to(origin: &Route) -> Self {
        Self::SignIn {
            next: Some(origin.to_path()),
        }
    }

    /// Where to go after signing in from this route.
    pub fn after_sign_in(&self) -> Route {
        match self {
            Self::SignIn { next: Some(next) } => Route::parse(next),
            _ => Route::Home,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_path())
    }
}

/// Extracts `next`, accepting only same-origin relative paths.
fn next_param(query: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == "next")
        .and_then(|(_, v)| urlencoding::decode(v).ok())
        .map(|v| v.into_owned())
        .filter(|v| v.starts_with('/') && !v.starts_with("//"))
}

/// The route the browser is currently showing.
#[cfg(target_arch = "wasm32")]
pub fn current_route() -> Route {
    let Some(location) = web_sys::window().map(|w| w.location()) else {
        return Route::Home;
    };
    let path = location.pathname().unwrap_or_default();
    let search = location.search().unwrap_or_default();
    Route::parse(&format!("{path}{search}"))
}

#[cfg(not(target_arch = "wasm32"))]
pub fn current_route() -> Route {
    Route::Home
}

/// Records a navigation in the browser history (no-op natively).
pub fn push_history(route: &Route) {
    #[cfg(target_arch = "wasm32")]
    {
        let history = web_sys::window().and_then(|w| w.history().ok());
        if let Some(history) = history {
            let path = route.to_path();
            if let Err(e) =
                history.push_state_with_url(&wasm_bindgen::JsValue::NULL, "", Some(&path))
            {
                log::warn!("pushState to {path} failed: {e:?}");
            }
        }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        log::debug!("navigate {route}");
    }
}

/// Full-page navigation to an external URL (checkout redirect).
pub fn open_external(url: &str) {
    #[cfg(target_arch = "wasm32")]
    {
        if let Some(window) = web_sys::window() {
            if let Err(e) = window.location().set_href(url) {
                log::error!("redirect to {url} failed: {e:?}");
            }
        }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        log::info!("external redirect to {url}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/", Route::Home)]
    #[case("", Route::Home)]
    #[case("/cart/", Route::Cart)]
    #[case("/models/42", Route::Model { id: "42".into() })]
    #[case("/login", Route::SignIn { next: None })]
    #[case("/signin?next=%2Faccount", Route::SignIn { next: Some("/account".into()) })]
    #[case("/signin?next=https%3A%2F%2Fevil.example", Route::SignIn { next: None })]
    #[case("/signin?next=%2F%2Fevil.example", Route::SignIn { next: None })]
    #[case("/models/", Route::NotFound("/models/".into()))]
    fn parse_paths(#[case] input: &str, #[case] expected: Route) {
        assert_eq!(Route::parse(input), expected);
    }

    #[test]
    fn sign_in_redirect_round_trips_origin() {
        let redirect = Route::sign_in_returning_to(&Route::Account);
        assert_eq!(redirect.to_path(), "/signin?next=%2Faccount");
        assert_eq!(Route::parse(&redirect.to_path()), redirect);
        assert_eq!(redirect.after_sign_in(), Route::Account);
        assert_eq!(Route::SignIn { next: None }.after_sign_in(), Route::Home);
    }

    #[test]
    fn protected_routes() {
        assert!(Route::Account.is_protected());
        assert!(Route::Checkout.is_protected());
        assert!(!Route::Cart.is_protected());
        assert!(!Route::SignIn { next: None }.is_protected());
    }
}
