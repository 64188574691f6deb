//! PrintForge storefront: browse printable models, get a price, order a print.
//!
//! The whole client is one `eframe` app. It builds to wasm for the browser and
//! natively for development, where the HTTP transport is offline.

pub mod auth;
pub mod cancel;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod estimate;
pub mod filament;
pub mod game;
pub mod http;
pub mod pages;
pub mod router;
pub mod storage;
pub mod task;
pub mod theme;
pub mod toast;
pub mod upload;
pub mod viewer;
#[cfg(target_arch = "wasm32")]
mod web;

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use eframe::egui;

use auth::{AuthStore, GuardState, RouteGuard};
use cart::LocalCart;
use config::config;
use game::BreakoutOverlay;
use http::HttpClient;
use pages::{
    AccountPage, AdminPage, AsyncSlot, CartPage, CheckoutPage, HomePage, ModelPage, PageCtx,
    SignInPage, SignUpPage, UploadPage,
};
use router::Route;
use storage::KeyValueStore;
use theme::ThemeMode;
use toast::Toasts;

/// The page behind the current route.
enum Page {
    Home(HomePage),
    Model(ModelPage),
    Upload(UploadPage),
    Cart(CartPage),
    Checkout(CheckoutPage),
    SignIn(SignInPage),
    SignUp(SignUpPage),
    Account(AccountPage),
    Admin(AdminPage),
    NotFound,
}

impl Page {
    fn for_route(route: &Route) -> Self {
        match route {
            Route::Home => Self::Home(HomePage::default()),
            Route::Model { id } => Self::Model(ModelPage::new(id.clone())),
            Route::Upload => Self::Upload(UploadPage::default()),
            Route::Cart => Self::Cart(CartPage::default()),
            Route::Checkout => Self::Checkout(CheckoutPage::default()),
            Route::SignIn { .. } => Self::SignIn(SignInPage::new(route)),
            Route::SignUp => Self::SignUp(SignUpPage::default()),
            Route::Account => Self::Account(AccountPage::default()),
            Route::Admin => Self::Admin(AdminPage::default()),
            Route::NotFound(_) => Self::NotFound,
        }
    }

    fn show(&mut self, ui: &mut egui::Ui, ctx: &mut PageCtx<'_>) {
        match self {
            Self::Home(page) => page.show(ui, ctx),
            Self::Model(page) => page.show(ui, ctx),
            Self::Upload(page) => page.show(ui, ctx),
            Self::Cart(page) => page.show(ui, ctx),
            Self::Checkout(page) => page.show(ui, ctx),
            Self::SignIn(page) => page.show(ui, ctx),
            Self::SignUp(page) => page.show(ui, ctx),
            Self::Account(page) => page.show(ui, ctx),
            Self::Admin(page) => page.show(ui, ctx),
            Self::NotFound => {
                ui.heading("Page not found");
                if ui.link("Back to the catalog").clicked() {
                    ctx.go(Route::Home);
                }
            }
        }
    }
}

pub struct StorefrontApp {
    route: Route,
    page: Page,
    /// Present while a protected route is shown.
    guard: Option<RouteGuard>,
    auth: AuthStore,
    storage: Rc<dyn KeyValueStore>,
    toasts: Toasts,
    cart: LocalCart,
    breakout: BreakoutOverlay,
    theme: ThemeMode,
    admin_probe: AsyncSlot<bool>,
    admin_probed: bool,
    signing_out: AsyncSlot<()>,
    #[cfg(target_arch = "wasm32")]
    history: web::PendingRoute,
}

impl StorefrontApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let storage = storage::platform_store();
        let auth = AuthStore::new(HttpClient::from_config(config()), Rc::clone(&storage));
        let app = Self::with_parts(auth, storage, router::current_route(), game::clock_seed());
        app.theme.apply(&cc.egui_ctx);

        #[cfg(target_arch = "wasm32")]
        {
            if let Err(e) = web::listen_popstate(Rc::clone(&app.history), cc.egui_ctx.clone()) {
                log::warn!("back/forward navigation unavailable: {e:?}");
            }
            if let Err(e) = web::listen_storage(app.auth.clone(), cc.egui_ctx.clone()) {
                log::warn!("cross-tab sign-out unavailable: {e:?}");
            }
        }
        log::info!(
            "printforge {} talking to {}",
            config().app_version,
            config().api_base_url
        );
        app
    }

    /// Builds the app around an existing session store, starting on `route`.
    pub fn with_parts(
        auth: AuthStore,
        storage: Rc<dyn KeyValueStore>,
        route: Route,
        seed: u64,
    ) -> Self {
        // Resolve the session up front so the top bar knows who is signed in.
        let hydration = auth.hydrate();
        task::spawn_local(async move {
            hydration.await;
        });

        let mut app = Self {
            page: Page::NotFound,
            route: Route::Home,
            guard: None,
            theme: ThemeMode::load(storage.as_ref()),
            breakout: BreakoutOverlay::new(Rc::clone(&storage), seed),
            auth,
            storage,
            toasts: Toasts::new(),
            cart: LocalCart::default(),
            admin_probe: AsyncSlot::default(),
            admin_probed: false,
            signing_out: AsyncSlot::default(),
            #[cfg(target_arch = "wasm32")]
            history: Default::default(),
        };
        app.enter(route);
        app
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Replaces the page without touching history.
    fn enter(&mut self, route: Route) {
        log::debug!("entering {route}");
        self.guard = route.is_protected().then(|| RouteGuard::mount(route.clone()));
        self.page = Page::for_route(&route);
        self.route = route;
    }

    pub fn navigate(&mut self, route: Route) {
        if route == self.route {
            return;
        }
        router::push_history(&route);
        self.enter(route);
    }

    /// Probes the admin endpoint once per session for accounts whose payload
    /// carries no admin role.
    fn check_admin(&mut self) {
        if !self.auth.is_authenticated() {
            self.admin_probed = false;
            return;
        }
        if !self.admin_probed && !self.auth.is_admin() {
            self.admin_probed = true;
            let auth = self.auth.clone();
            self.admin_probe
                .start(async move { auth.probe_admin().await });
        }
        if let Some(allowed) = self.admin_probe.poll() {
            log::debug!("admin probe: {allowed}");
        }
    }

    fn top_bar(&mut self, ui: &mut egui::Ui) -> Option<Route> {
        let mut go = None;
        ui.horizontal(|ui| {
            if ui.button("PrintForge").clicked() {
                go = Some(Route::Home);
            }
            ui.separator();
            if ui.button("Upload").clicked() {
                go = Some(Route::Upload);
            }
            let cart_label = match self.cart.count() {
                0 => "Cart".to_string(),
                n => format!("Cart ({n})"),
            };
            if ui.button(cart_label).clicked() {
                go = Some(Route::Cart);
            }
            if self.auth.is_admin() && ui.button("Admin").clicked() {
                go = Some(Route::Admin);
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui
                    .button(format!("Theme: {}", self.theme.as_str()))
                    .clicked()
                {
                    self.theme = self.theme.next();
                    self.theme.save(self.storage.as_ref());
                    self.theme.apply(ui.ctx());
                }
                match self.auth.user() {
                    Some(user) if self.auth.is_authenticated() => {
                        if ui.button("Sign out").clicked() && !self.signing_out.is_running() {
                            let auth = self.auth.clone();
                            self.signing_out.start(async move { auth.logout().await });
                        }
                        if ui.button(user.label()).clicked() {
                            go = Some(Route::Account);
                        }
                    }
                    _ if !self.auth.is_resolved() => {
                        ui.spinner();
                    }
                    _ => {
                        if ui.button("Sign up").clicked() {
                            go = Some(Route::SignUp);
                        }
                        if ui.button("Sign in").clicked() {
                            go = Some(Route::SignIn { next: None });
                        }
                    }
                }
            });
        });
        go
    }

    /// One frame of UI. `gl` is `None` in tests and before the GL context exists.
    fn ui(&mut self, ctx: &egui::Context, gl: Option<&Arc<glow::Context>>) {
        task::pump();

        #[cfg(target_arch = "wasm32")]
        {
            let pending = self.history.borrow_mut().take();
            if let Some(route) = pending {
                self.enter(route);
            }
        }

        self.check_admin();
        if self.signing_out.poll().is_some() {
            self.toasts.info("Signed out");
            if self.route.is_protected() {
                self.navigate(Route::Home);
            }
        }

        let mut go = None;
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            go = self.top_bar(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(guard) = &mut self.guard {
                match guard.poll(&self.auth) {
                    GuardState::Checking => {
                        ui.centered_and_justified(|ui| ui.spinner());
                        return;
                    }
                    GuardState::Redirecting { to } => {
                        go = Some(to.clone());
                        return;
                    }
                    GuardState::Authenticated => {}
                }
            }
            egui::ScrollArea::vertical().show(ui, |ui| {
                let mut page_ctx = PageCtx {
                    auth: &self.auth,
                    toasts: &self.toasts,
                    cart: &mut self.cart,
                    gl,
                    navigate: None,
                };
                self.page.show(ui, &mut page_ctx);
                if page_ctx.navigate.is_some() {
                    go = page_ctx.navigate;
                }
            });
        });

        self.toasts.show(ctx);
        self.breakout.show(ctx);

        if let Some(route) = go {
            self.navigate(route);
        }
        if task::in_flight() > 0 {
            ctx.request_repaint_after(Duration::from_millis(50));
        }
    }
}

impl eframe::App for StorefrontApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        self.ui(ctx, frame.gl());
    }
}

// ── Web entry point ──
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn start() -> Result<(), JsValue> {
    use wasm_bindgen::JsCast;

    console_log::init_with_level(log::Level::Debug).ok();
    console_error_panic_hook::set_once();

    let canvas = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id("printforge_canvas"))
        .ok_or_else(|| JsValue::from_str("missing #printforge_canvas"))?
        .dyn_into::<web_sys::HtmlCanvasElement>()?;

    let web_options = eframe::WebOptions {
        depth_buffer: 24,
        ..Default::default()
    };
    eframe::WebRunner::new()
        .start(
            canvas,
            web_options,
            Box::new(|cc| Ok(Box::new(StorefrontApp::new(cc)))),
        )
        .await
}
