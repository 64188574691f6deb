//! Who is signed in, and whether we have asked the server yet.
//!
//! `AuthStore` is a cheap-to-clone handle; every page that needs the session
//! gets a clone of the one the app created. State changes only go through the
//! methods below.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::role::{self, Role};
use super::user::{AuthResponse, MeResponse, ProfilePatch, User};
use crate::error::{ApiError, UploadFlowError};
use crate::http::HttpClient;
use crate::storage::{self, AUTH_KEY, AUTH_KEYS, AVATAR_URL_KEY, KeyValueStore};
use crate::upload::{self, SelectedFile};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<User>,
    pub token: Option<String>,
    /// Latched once the first hydration attempt finishes. Never goes back.
    pub resolved: bool,
    pub loading: bool,
}

/// The subset written to storage.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedAuth {
    user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AvatarResponse {
    #[serde(alias = "url", alias = "avatar")]
    avatar_url: String,
}

type Hydration = Shared<LocalBoxFuture<'static, Option<User>>>;

struct Inner {
    state: RefCell<AuthState>,
    client: HttpClient,
    storage: Rc<dyn KeyValueStore>,
    inflight: RefCell<Option<Hydration>>,
    admin_probe: Cell<Option<bool>>,
    /// Bumped by every sign-in and sign-out. A session check that started
    /// under an older generation must not overwrite the newer state.
    generation: Cell<u64>,
}

#[derive(Clone)]
pub struct AuthStore {
    inner: Rc<Inner>,
}

impl fmt::Debug for AuthStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthStore")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl AuthStore {
    /// Creates a store and restores whatever was persisted last time. The
    /// restored user is shown optimistically, but the store stays unresolved
    /// until the server has been asked.
    pub fn new(client: HttpClient, storage: Rc<dyn KeyValueStore>) -> Self {
        let store = Self {
            inner: Rc::new(Inner {
                state: RefCell::new(AuthState::default()),
                client,
                storage,
                inflight: RefCell::new(None),
                admin_probe: Cell::new(None),
                generation: Cell::new(0),
            }),
        };
        store.restore();
        store
    }

    pub fn client(&self) -> &HttpClient {
        &self.inner.client
    }

    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.inner.state.borrow().user.clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.state.borrow().resolved
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    /// False until resolved, whatever was restored from storage.
    pub fn is_authenticated(&self) -> bool {
        let state = self.inner.state.borrow();
        state.resolved && (state.user.is_some() || state.token.is_some())
    }

    pub fn role(&self) -> Role {
        if !self.is_authenticated() {
            return Role::Guest;
        }
        Role::from_user(self.inner.state.borrow().user.as_ref())
    }

    pub fn has_role(&self, name: &str) -> bool {
        if !self.is_authenticated() {
            return role::has_role(None, name);
        }
        role::has_role(self.inner.state.borrow().user.as_ref(), name)
    }

    /// Admin by payload, or confirmed by a successful admin probe.
    pub fn is_admin(&self) -> bool {
        self.role() == Role::Admin
            || (self.is_authenticated() && self.inner.admin_probe.get() == Some(true))
    }

    /// Loads the persisted `{user, token}` without resolving.
    pub fn restore(&self) {
        let Some(saved) = storage::load_json::<PersistedAuth>(&*self.inner.storage, AUTH_KEY)
        else {
            return;
        };
        let mut state = self.inner.state.borrow_mut();
        if state.resolved {
            return;
        }
        state.user = saved.user;
        state.token = saved.token;
        log::debug!("restored persisted session for display");
    }

    /// Asks the server who is signed in.
    ///
    /// Unless `force` is set, a resolved store with a user answers from memory.
    /// Never fails: any error is treated as "signed out" and still resolves.
    pub async fn fetch_user(&self, force: bool) -> Option<User> {
        if !force {
            let state = self.inner.state.borrow();
            if state.resolved && state.user.is_some() {
                return state.user.clone();
            }
        }

        let generation = self.inner.generation.get();
        self.inner.state.borrow_mut().loading = true;
        let result = self.inner.client.get_json::<MeResponse>("/auth/me").await;
        if self.inner.generation.get() != generation {
            log::debug!("session changed while checking it, keeping the newer state");
            let mut state = self.inner.state.borrow_mut();
            state.loading = false;
            state.resolved = true;
            return state.user.clone();
        }
        match result {
            Ok(me) => {
                let user = me.into_user();
                {
                    let mut state = self.inner.state.borrow_mut();
                    state.user = Some(user.clone());
                    state.loading = false;
                    state.resolved = true;
                }
                self.persist();
                log::debug!("session hydrated for {}", user.id);
                Some(user)
            }
            Err(e) => {
                match &e {
                    ApiError::Unauthorized | ApiError::Forbidden => {
                        log::debug!("no active session")
                    }
                    other => log::warn!("session check failed, treating as signed out: {other}"),
                }
                self.clear_local();
                None
            }
        }
    }

    /// `fetch_user(false)` shared between concurrent callers: whoever asks
    /// while a hydration is running gets the same future.
    pub fn hydrate(&self) -> Hydration {
        if let Some(running) = self.inner.inflight.borrow().as_ref() {
            return running.clone();
        }

        let store = self.clone();
        let generation = self.inner.generation.get();
        let hydration = async move {
            let user = store.fetch_user(false).await;
            // After a sign-in or sign-out the slot may hold a newer hydration.
            if store.inner.generation.get() == generation {
                store.inner.inflight.borrow_mut().take();
            }
            user
        }
        .boxed_local()
        .shared();

        *self.inner.inflight.borrow_mut() = Some(hydration.clone());
        hydration
    }

    /// Completes a login. Resolves unconditionally.
    pub fn set_auth(&self, user: Option<User>, token: Option<String>) {
        {
            let mut state = self.inner.state.borrow_mut();
            state.user = user;
            state.token = token;
            state.loading = false;
            state.resolved = true;
        }
        self.bump_generation();
        self.inner.admin_probe.set(None);
        self.persist();
    }

    pub async fn sign_in(&self, identifier: &str, password: &str) -> Result<User, ApiError> {
        let identifier = identifier.trim();
        let body = if identifier.contains('@') {
            json!({ "email": identifier, "password": password })
        } else {
            json!({ "username": identifier, "password": password })
        };
        // An empty 204 is a valid cookie-only answer.
        let response: Option<AuthResponse> =
            self.inner.client.post_json("/auth/signin", &body).await?;
        self.complete_login(response.unwrap_or_default()).await
    }

    pub async fn sign_up(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<User, ApiError> {
        let body = json!({
            "email": email.trim(),
            "username": username.trim(),
            "password": password,
        });
        let response: Option<AuthResponse> =
            self.inner.client.post_json("/auth/signup", &body).await?;
        self.complete_login(response.unwrap_or_default()).await
    }

    async fn complete_login(&self, response: AuthResponse) -> Result<User, ApiError> {
        let token = response.access_token;
        let user = match response.user {
            Some(user) => user,
            // Cookie was set but the body carried no user; ask for it.
            None => self
                .inner
                .client
                .get_json::<MeResponse>("/auth/me")
                .await?
                .into_user(),
        };
        self.set_auth(Some(user.clone()), token);
        log::info!("signed in as {}", user.label());
        Ok(user)
    }

    /// Signs out. The server call is best effort; local state is always cleared.
    pub async fn logout(&self) {
        if let Err(e) = self.inner.client.post_empty("/auth/signout").await {
            log::warn!("sign-out request failed, clearing local session anyway: {e}");
        }
        self.clear_local();
        log::info!("signed out");
    }

    pub async fn update_profile(&self, patch: &ProfilePatch) -> Result<User, ApiError> {
        let user: User = self.inner.client.patch_json("/users/me", patch).await?;
        self.replace_user(user.clone());
        Ok(user)
    }

    /// Validates locally, then uploads. Returns the new avatar URL.
    pub async fn upload_avatar(&self, file: SelectedFile) -> Result<String, UploadFlowError> {
        upload::validate_avatar(&file)?;
        let response: AvatarResponse = self
            .inner
            .client
            .post_multipart("/avatar/", file.into_multipart("file"))
            .await?;

        let url = response.avatar_url;
        self.inner.storage.set(AVATAR_URL_KEY, &url);
        let updated = self.user().map(|mut user| {
            user.avatar_url = Some(url.clone());
            user
        });
        if let Some(user) = updated {
            self.replace_user(user);
        }
        Ok(url)
    }

    pub async fn delete_account(&self) -> Result<(), ApiError> {
        self.inner.client.delete("/users/me").await?;
        self.clear_local();
        log::info!("account deleted");
        Ok(())
    }

    /// Probes an admin-only endpoint. 2xx means admin; anything else does not.
    pub async fn probe_admin(&self) -> bool {
        let allowed = match self
            .inner
            .client
            .get_json::<serde_json::Value>("/admin/stats")
            .await
        {
            Ok(_) => true,
            Err(e) if e.is_auth() => false,
            Err(e) => {
                log::warn!("admin probe failed: {e}");
                false
            }
        };
        self.inner.admin_probe.set(Some(allowed));
        allowed
    }

    /// The user's avatar, or the last one we saw if the payload has none.
    pub fn cached_avatar_url(&self) -> Option<String> {
        self.user()
            .and_then(|u| u.avatar_url)
            .or_else(|| self.inner.storage.get(AVATAR_URL_KEY))
    }

    /// Storage-event hook: another tab removed the session, so drop ours.
    pub fn storage_changed(&self, key: &str, new_value: Option<&str>) {
        if key == AUTH_KEY && new_value.is_none() && self.is_authenticated() {
            log::info!("session cleared in another tab");
            self.clear_local();
        }
    }

    fn replace_user(&self, user: User) {
        self.inner.state.borrow_mut().user = Some(user);
        self.persist();
    }

    fn clear_local(&self) {
        {
            let mut state = self.inner.state.borrow_mut();
            state.user = None;
            state.token = None;
            state.loading = false;
            state.resolved = true;
        }
        self.bump_generation();
        self.inner.inflight.borrow_mut().take();
        self.inner.admin_probe.set(None);
        for key in AUTH_KEYS {
            self.inner.storage.remove(key);
        }
    }

    fn bump_generation(&self) {
        self.inner.generation.set(self.inner.generation.get().wrapping_add(1));
    }

    fn persist(&self) {
        let state = self.inner.state.borrow();
        if let Some(url) = state.user.as_ref().and_then(|u| u.avatar_url.as_deref()) {
            self.inner.storage.set(AVATAR_URL_KEY, url);
        }
        let saved = PersistedAuth {
            user: state.user.clone(),
            token: state.token.clone(),
        };
        storage::save_json(&*self.inner.storage, AUTH_KEY, &saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadError;
    use crate::http::testing::{ScriptedTransport, client};
    use crate::http::{ApiRequest, ApiResponse, Method, RequestBody, Transport};
    use crate::storage::MemoryStore;
    use futures::channel::oneshot;
    use futures::executor::block_on;
    use serde_json::json;

    fn me() -> serde_json::Value {
        json!({"id": "u1", "email": "ann@example.com", "username": "ann"})
    }

    fn store_with(transport: Rc<ScriptedTransport>) -> (AuthStore, Rc<MemoryStore>) {
        let storage = Rc::new(MemoryStore::new());
        let store = AuthStore::new(client(transport), storage.clone());
        (store, storage)
    }

    fn signed_in_backend() -> Rc<ScriptedTransport> {
        ScriptedTransport::new(|_| Ok(ApiResponse::json(200, &me())))
    }

    #[test]
    fn unresolved_store_is_never_authenticated() {
        let storage = Rc::new(MemoryStore::new());
        storage.set(AUTH_KEY, &json!({"user": me(), "token": "t"}).to_string());
        let store = AuthStore::new(client(signed_in_backend()), storage);

        let state = store.state();
        assert!(state.user.is_some(), "restored for display");
        assert!(!state.resolved);
        assert!(!store.is_authenticated());
        assert_eq!(store.role(), Role::Guest);
    }

    #[test]
    fn fetch_user_resolves_and_caches() {
        let transport = signed_in_backend();
        let (store, storage) = store_with(transport.clone());

        let user = block_on(store.fetch_user(false)).unwrap();
        assert_eq!(user.username, "ann");
        assert!(store.is_authenticated());
        assert!(storage.get(AUTH_KEY).is_some());

        block_on(store.fetch_user(false));
        assert_eq!(transport.total(), 1, "second call served from memory");

        block_on(store.fetch_user(true));
        assert_eq!(transport.total(), 2, "forced call goes to the server");
    }

    #[test]
    fn failures_are_absorbed_and_still_resolve() {
        for failure in [
            Err(ApiError::Network("offline".into())),
            Ok(ApiResponse::new(401, "")),
            Ok(ApiResponse::new(500, "oops")),
        ] {
            let transport = ScriptedTransport::new(move |_| failure.clone());
            let (store, _) = store_with(transport);
            assert!(block_on(store.fetch_user(false)).is_none());
            let state = store.state();
            assert!(state.resolved);
            assert!(!state.loading);
            assert!(state.user.is_none());
            assert!(!store.is_authenticated());
        }
    }

    #[test]
    fn resolved_never_regresses() {
        let transport = ScriptedTransport::new(|req| {
            if req.url.ends_with("/auth/me") {
                Ok(ApiResponse::new(401, ""))
            } else {
                Ok(ApiResponse::new(204, ""))
            }
        });
        let (store, _) = store_with(transport);
        assert!(!store.is_resolved());

        block_on(store.fetch_user(false));
        assert!(store.is_resolved());
        store.set_auth(None, Some("tok".into()));
        assert!(store.is_resolved());
        assert!(store.is_authenticated(), "token alone authenticates");
        block_on(store.fetch_user(true));
        assert!(store.is_resolved());
        block_on(store.logout());
        assert!(store.is_resolved());
    }

    #[test]
    fn logout_clears_even_when_signout_fails() {
        let transport = ScriptedTransport::new(|req| {
            if req.url.ends_with("/auth/signout") {
                Err(ApiError::Network("connection reset".into()))
            } else {
                Ok(ApiResponse::json(200, &me()))
            }
        });
        let (store, storage) = store_with(transport.clone());
        block_on(store.fetch_user(false));
        storage.set(AVATAR_URL_KEY, "/a.png");

        block_on(store.logout());
        let state = store.state();
        assert!(state.user.is_none());
        assert!(state.resolved);
        assert!(storage.get(AUTH_KEY).is_none());
        assert!(storage.get(AVATAR_URL_KEY).is_none());
        assert_eq!(transport.count(Method::Post, "/auth/signout"), 1);
    }

    /// Holds the first `/auth/me` until the test opens the gate.
    struct SlowSessionCheck {
        me_status: u16,
        gate: RefCell<Option<oneshot::Receiver<()>>>,
    }

    impl Transport for SlowSessionCheck {
        fn send(&self, request: ApiRequest) -> LocalBoxFuture<'_, Result<ApiResponse, ApiError>> {
            if request.url.ends_with("/auth/me") {
                let gate = self.gate.borrow_mut().take();
                let status = self.me_status;
                Box::pin(async move {
                    if let Some(gate) = gate {
                        let _ = gate.await;
                    }
                    Ok(match status {
                        200 => ApiResponse::json(200, &me()),
                        other => ApiResponse::new(other, ""),
                    })
                })
            } else if request.url.ends_with("/auth/signin") {
                Box::pin(async { Ok(ApiResponse::json(200, &json!({"user": me()}))) })
            } else {
                Box::pin(async { Ok(ApiResponse::new(204, "")) })
            }
        }
    }

    fn slow_store(me_status: u16) -> (AuthStore, Rc<MemoryStore>, oneshot::Sender<()>) {
        let (open, gate) = oneshot::channel();
        let transport = Rc::new(SlowSessionCheck {
            me_status,
            gate: RefCell::new(Some(gate)),
        });
        let storage = Rc::new(MemoryStore::new());
        let store = AuthStore::new(
            HttpClient::new("http://api.test/api/v1", transport),
            storage.clone(),
        );
        (store, storage, open)
    }

    #[test]
    fn late_session_check_does_not_undo_logout() {
        let (store, storage, open) = slow_store(200);
        let hydration = store.hydrate();
        assert!(hydration.clone().now_or_never().is_none(), "request is held");

        block_on(store.logout());
        assert!(store.user().is_none());

        open.send(()).unwrap();
        block_on(hydration);
        assert!(store.user().is_none());
        assert!(!store.is_authenticated());
        assert!(store.is_resolved());
        assert!(storage.get(AUTH_KEY).is_none());
    }

    #[test]
    fn late_rejection_does_not_undo_sign_in() {
        let (store, storage, open) = slow_store(401);
        let hydration = store.hydrate();
        assert!(hydration.clone().now_or_never().is_none(), "request is held");

        block_on(store.sign_in("ann", "pw")).unwrap();
        assert!(store.is_authenticated());

        open.send(()).unwrap();
        block_on(hydration);
        assert!(store.is_authenticated());
        assert_eq!(store.user().map(|u| u.id).as_deref(), Some("u1"));
        assert!(storage.get(AUTH_KEY).is_some());
    }

    #[test]
    fn concurrent_hydrations_share_one_request() {
        let transport = signed_in_backend();
        let (store, _) = store_with(transport.clone());

        let a = store.hydrate();
        let b = store.hydrate();
        let (ua, ub) = block_on(futures::future::join(a, b));
        assert_eq!(ua, ub);
        assert_eq!(transport.count(Method::Get, "/auth/me"), 1);

        // Finished hydrations are not reused for later calls, but the cache is.
        block_on(store.hydrate());
        assert_eq!(transport.count(Method::Get, "/auth/me"), 1);
    }

    #[test]
    fn sign_in_sends_email_or_username() {
        let transport = ScriptedTransport::new(|req| {
            if req.url.ends_with("/auth/signin") {
                Ok(ApiResponse::json(200, &json!({"user": me()})))
            } else {
                Ok(ApiResponse::new(404, ""))
            }
        });
        let (store, storage) = store_with(transport.clone());

        block_on(store.sign_in("ann@example.com", "pw")).unwrap();
        block_on(store.sign_in("ann", "pw")).unwrap();
        assert!(store.is_authenticated());

        let sent = transport.requests.borrow();
        assert!(matches!(&sent[0].body, RequestBody::Json(v) if v["email"] == "ann@example.com"));
        assert!(matches!(&sent[1].body, RequestBody::Json(v) if v["username"] == "ann"));

        let persisted: serde_json::Value =
            serde_json::from_str(&storage.get(AUTH_KEY).unwrap()).unwrap();
        assert!(persisted.get("token").is_none(), "cookie sessions persist no token");
    }

    #[test]
    fn sign_in_without_user_body_fetches_me() {
        let transport = ScriptedTransport::new(|req| {
            if req.url.ends_with("/auth/signin") {
                Ok(ApiResponse::json(200, &json!({"ok": true})))
            } else {
                Ok(ApiResponse::json(200, &me()))
            }
        });
        let (store, _) = store_with(transport.clone());
        let user = block_on(store.sign_in("ann", "pw")).unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(transport.count(Method::Get, "/auth/me"), 1);
    }

    #[test]
    fn non_image_avatar_is_rejected_without_network() {
        let transport = signed_in_backend();
        let (store, _) = store_with(transport.clone());
        let file = SelectedFile::from_name("notes.txt", b"hello".to_vec());

        let err = block_on(store.upload_avatar(file)).unwrap_err();
        assert!(matches!(err, UploadFlowError::Rejected(UploadError::NotAnImage { .. })));
        assert_eq!(transport.total(), 0);
    }

    #[test]
    fn avatar_upload_updates_user_and_cache() {
        let transport = ScriptedTransport::new(|req| {
            if req.url.ends_with("/avatar/") {
                Ok(ApiResponse::json(200, &json!({"url": "/media/ann.png"})))
            } else {
                Ok(ApiResponse::json(200, &me()))
            }
        });
        let (store, storage) = store_with(transport.clone());
        block_on(store.fetch_user(false));

        let url = block_on(store.upload_avatar(SelectedFile::from_name("me.png", vec![1, 2])))
            .unwrap();
        assert_eq!(url, "/media/ann.png");
        assert_eq!(store.cached_avatar_url().as_deref(), Some("/media/ann.png"));
        assert_eq!(storage.get(AVATAR_URL_KEY).as_deref(), Some("/media/ann.png"));
        let sent = transport.requests.borrow();
        assert!(matches!(&sent[1].body, RequestBody::Multipart(f) if f.field == "file"));
    }

    #[test]
    fn admin_probe_and_payload_roles() {
        let transport = ScriptedTransport::new(|req| {
            if req.url.ends_with("/admin/stats") {
                Ok(ApiResponse::json(200, &json!({"users": 3})))
            } else {
                Ok(ApiResponse::json(200, &me()))
            }
        });
        let (store, _) = store_with(transport);
        assert!(!store.is_admin());
        block_on(store.fetch_user(false));
        assert!(!store.is_admin());
        assert!(block_on(store.probe_admin()));
        assert!(store.is_admin());
        assert!(store.has_role("user"));
    }

    #[test]
    fn other_tab_sign_out_clears_session() {
        let (store, _) = store_with(signed_in_backend());
        block_on(store.fetch_user(false));
        store.storage_changed(AUTH_KEY, Some("{}"));
        assert!(store.is_authenticated());
        store.storage_changed(AUTH_KEY, None);
        assert!(!store.is_authenticated());
        assert!(store.is_resolved());
    }

    #[test]
    fn delete_account_clears_local_state() {
        let transport = signed_in_backend();
        let (store, storage) = store_with(transport.clone());
        block_on(store.fetch_user(false));
        block_on(store.delete_account()).unwrap();
        assert!(!store.is_authenticated());
        assert!(storage.get(AUTH_KEY).is_none());
        assert_eq!(transport.count(Method::Delete, "/users/me"), 1);
    }
}
