use eframe::egui;

use super::{AsyncSlot, PageCtx, busy, error_label};
use crate::auth::User;
use crate::error::ApiError;
use crate::router::Route;

const MIN_PASSWORD_CHARS: usize = 8;

pub struct SignInPage {
    /// Where to go once signed in.
    next: Route,
    identifier: String,
    password: String,
    error: Option<String>,
    pending: AsyncSlot<Result<User, ApiError>>,
}

impl SignInPage {
    pub fn new(route: &Route) -> Self {
        Self {
            next: route.after_sign_in(),
            identifier: String::new(),
            password: String::new(),
            error: None,
            pending: AsyncSlot::default(),
        }
    }

    fn submit(&mut self, ctx: &PageCtx<'_>) {
        if self.identifier.trim().is_empty() || self.password.is_empty() {
            self.error = Some("Enter your email or username and password.".into());
            return;
        }
        self.error = None;
        let auth = ctx.auth.clone();
        let (identifier, password) = (self.identifier.clone(), self.password.clone());
        self.pending
            .start(async move { auth.sign_in(&identifier, &password).await });
    }

    fn update(&mut self, ctx: &mut PageCtx<'_>) {
        match self.pending.poll() {
            Some(Ok(user)) => {
                self.password.clear();
                ctx.toasts.success(format!("Welcome back, {}", user.label()));
                ctx.go(self.next.clone());
            }
            Some(Err(ApiError::Unauthorized)) => {
                self.error = Some("Wrong credentials.".into());
            }
            Some(Err(e)) => self.error = Some(e.to_string()),
            None => {}
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui, ctx: &mut PageCtx<'_>) {
        self.update(ctx);
        ui.heading("Sign in");
        let mut enter = false;
        egui::Grid::new("sign_in").num_columns(2).show(ui, |ui| {
            ui.label("Email or username");
            ui.text_edit_singleline(&mut self.identifier);
            ui.end_row();
            ui.label("Password");
            let response = ui.add(egui::TextEdit::singleline(&mut self.password).password(true));
            enter = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            ui.end_row();
        });
        if let Some(error) = &self.error {
            error_label(ui, error);
        }
        if self.pending.is_running() {
            busy(ui, "Signing in…");
        } else if ui.button("Sign in").clicked() || enter {
            self.submit(ctx);
        }
        if ui.link("No account yet? Sign up").clicked() {
            ctx.go(Route::SignUp);
        }
    }
}

#[derive(Default)]
pub struct SignUpPage {
    email: String,
    username: String,
    password: String,
    confirm: String,
    error: Option<String>,
    pending: AsyncSlot<Result<User, ApiError>>,
}

impl SignUpPage {
    fn check(&self) -> Result<(), &'static str> {
        if !self.email.contains('@') {
            return Err("Enter a valid email address.");
        }
        if self.username.trim().is_empty() {
            return Err("Choose a username.");
        }
        if self.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err("Passwords need at least 8 characters.");
        }
        if self.password != self.confirm {
            return Err("Passwords do not match.");
        }
        Ok(())
    }

    fn submit(&mut self, ctx: &PageCtx<'_>) {
        if let Err(message) = self.check() {
            self.error = Some(message.into());
            return;
        }
        self.error = None;
        let auth = ctx.auth.clone();
        let (email, username, password) =
            (self.email.clone(), self.username.clone(), self.password.clone());
        self.pending
            .start(async move { auth.sign_up(&email, &username, &password).await });
    }

    fn update(&mut self, ctx: &mut PageCtx<'_>) {
        match self.pending.poll() {
            Some(Ok(user)) => {
                self.password.clear();
                self.confirm.clear();
                ctx.toasts.success(format!("Welcome, {}", user.label()));
                ctx.go(Route::Home);
            }
            Some(Err(e)) => self.error = Some(e.to_string()),
            None => {}
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui, ctx: &mut PageCtx<'_>) {
        self.update(ctx);
        ui.heading("Create an account");
        egui::Grid::new("sign_up").num_columns(2).show(ui, |ui| {
            ui.label("Email");
            ui.text_edit_singleline(&mut self.email);
            ui.end_row();
            ui.label("Username");
            ui.text_edit_singleline(&mut self.username);
            ui.end_row();
            ui.label("Password");
            ui.add(egui::TextEdit::singleline(&mut self.password).password(true));
            ui.end_row();
            ui.label("Confirm password");
            ui.add(egui::TextEdit::singleline(&mut self.confirm).password(true));
            ui.end_row();
        });
        if let Some(error) = &self.error {
            error_label(ui, error);
        }
        if self.pending.is_running() {
            busy(ui, "Creating account…");
        } else if ui.button("Sign up").clicked() {
            self.submit(ctx);
        }
        if ui.link("Already registered? Sign in").clicked() {
            ctx.go(Route::SignIn { next: None });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    use super::*;
    use crate::http::testing::ScriptedTransport;
    use crate::http::{ApiRequest, ApiResponse, Method, RequestBody};
    use crate::pages::testing::Harness;
    use crate::storage::{AUTH_KEY, KeyValueStore};
    use crate::task;
    use serde_json::{Value, json};

    /// Cookie-session backend: credentials in, `Set-Cookie` out, no tokens.
    #[derive(Default)]
    struct CookieBackend {
        accounts: HashMap<String, (String, String, String)>,
        session: Option<String>,
    }

    impl CookieBackend {
        fn user_json(&self, email: &str) -> Value {
            let (username, _, id) = &self.accounts[email];
            json!({ "id": id, "email": email, "username": username })
        }

        fn handle(&mut self, req: &ApiRequest) -> ApiResponse {
            let body = match &req.body {
                RequestBody::Json(v) => v.clone(),
                _ => Value::Null,
            };
            let path = req.url.trim_start_matches("http://api.test/api/v1");
            match (req.method, path) {
                (Method::Post, "/auth/signup") => {
                    let email = body["email"].as_str().unwrap_or_default().to_string();
                    if self.accounts.contains_key(&email) {
                        return ApiResponse::json(
                            422,
                            &json!({ "detail": [{ "loc": ["body", "email"], "msg": "already registered" }] }),
                        );
                    }
                    let id = (self.accounts.len() + 1).to_string();
                    self.accounts.insert(
                        email.clone(),
                        (
                            body["username"].as_str().unwrap_or_default().to_string(),
                            body["password"].as_str().unwrap_or_default().to_string(),
                            id,
                        ),
                    );
                    self.session = Some(email.clone());
                    ApiResponse::json(201, &json!({ "user": self.user_json(&email) }))
                }
                (Method::Post, "/auth/signin") => {
                    let login = body["email"].as_str().or(body["username"].as_str()).unwrap_or_default();
                    let found = self
                        .accounts
                        .iter()
                        .find(|(email, (username, password, _))| {
                            (email.as_str() == login || username == login)
                                && Some(password.as_str()) == body["password"].as_str()
                        })
                        .map(|(email, _)| email.clone());
                    match found {
                        Some(email) => {
                            self.session = Some(email);
                            // Cookie only; the body carries no user either.
                            ApiResponse::new(204, Vec::new())
                        }
                        None => ApiResponse::json(401, &json!({ "detail": "bad credentials" })),
                    }
                }
                (Method::Post, "/auth/signout") => {
                    self.session = None;
                    ApiResponse::new(204, Vec::new())
                }
                (Method::Get, "/auth/me") => match &self.session {
                    Some(email) => ApiResponse::json(200, &self.user_json(email)),
                    None => ApiResponse::json(401, &json!({ "detail": "not signed in" })),
                },
                _ => ApiResponse::new(404, "not found"),
            }
        }
    }

    fn cookie_backend() -> (Rc<RefCell<CookieBackend>>, Rc<ScriptedTransport>) {
        let backend = Rc::new(RefCell::new(CookieBackend::default()));
        let shared = Rc::clone(&backend);
        let transport = ScriptedTransport::new(move |req| Ok(shared.borrow_mut().handle(req)));
        (backend, transport)
    }

    #[test]
    fn sign_up_sign_out_sign_in_keeps_the_session_in_the_cookie() {
        let (backend, transport) = cookie_backend();
        let mut harness = Harness::new(transport);

        let mut sign_up = SignUpPage {
            email: "maker@example.com".into(),
            username: "maker".into(),
            password: "hunter2hunter2".into(),
            confirm: "hunter2hunter2".into(),
            ..SignUpPage::default()
        };
        sign_up.submit(&harness.ctx());
        task::pump();
        let mut ctx = harness.ctx();
        sign_up.update(&mut ctx);
        assert_eq!(ctx.navigate, Some(Route::Home));
        drop(ctx);
        assert!(harness.auth.is_authenticated());

        futures::executor::block_on(harness.auth.logout());
        assert!(backend.borrow().session.is_none());
        assert!(!harness.auth.is_authenticated());

        let mut sign_in = SignInPage::new(&Route::sign_in_returning_to(&Route::Account));
        sign_in.identifier = "maker@example.com".into();
        sign_in.password = "hunter2hunter2".into();
        sign_in.submit(&harness.ctx());
        task::pump();
        let mut ctx = harness.ctx();
        sign_in.update(&mut ctx);
        assert_eq!(ctx.navigate, Some(Route::Account));
        drop(ctx);

        assert_eq!(backend.borrow().session.as_deref(), Some("maker@example.com"));
        assert!(harness.auth.is_authenticated());
        assert_eq!(harness.auth.user().map(|u| u.username), Some("maker".into()));
        assert!(harness.auth.state().token.is_none());
        let persisted: Value = serde_json::from_str(&harness.storage.get(AUTH_KEY).unwrap()).unwrap();
        assert!(persisted.get("token").is_none(), "no token in storage: {persisted}");
        assert_eq!(persisted["user"]["email"], "maker@example.com");
    }

    #[test]
    fn wrong_password_is_reported() {
        let (backend, transport) = cookie_backend();
        backend.borrow_mut().accounts.insert(
            "a@b.c".into(),
            ("a".into(), "correct-horse".into(), "1".into()),
        );
        let mut harness = Harness::new(transport);
        let mut page = SignInPage::new(&Route::SignIn { next: None });
        page.identifier = "a".into();
        page.password = "nope".into();
        page.submit(&harness.ctx());
        task::pump();
        let mut ctx = harness.ctx();
        page.update(&mut ctx);
        assert!(ctx.navigate.is_none());
        drop(ctx);
        assert_eq!(page.error.as_deref(), Some("Wrong credentials."));
        assert!(!harness.auth.is_authenticated());
    }

    #[test]
    fn duplicate_email_shows_field_message() {
        let (backend, transport) = cookie_backend();
        backend.borrow_mut().accounts.insert(
            "dup@example.com".into(),
            ("dup".into(), "whatever1".into(), "1".into()),
        );
        let mut harness = Harness::new(transport);
        let mut page = SignUpPage {
            email: "dup@example.com".into(),
            username: "dup2".into(),
            password: "longenough".into(),
            confirm: "longenough".into(),
            ..SignUpPage::default()
        };
        page.submit(&harness.ctx());
        task::pump();
        page.update(&mut harness.ctx());
        assert_eq!(page.error.as_deref(), Some("email: already registered"));
    }

    #[test]
    fn local_checks_run_before_any_request() {
        let (_, transport) = cookie_backend();
        let mut harness = Harness::new(transport);
        let mut page = SignUpPage {
            email: "x@y.z".into(),
            username: "x".into(),
            password: "short".into(),
            confirm: "short".into(),
            ..SignUpPage::default()
        };
        page.submit(&harness.ctx());
        assert!(page.error.is_some());

        let mut sign_in = SignInPage::new(&Route::SignIn { next: None });
        sign_in.submit(&harness.ctx());
        assert!(sign_in.error.is_some());
        assert_eq!(harness.transport.total(), 0);
    }
}
