//! One struct per route. Pages own their in-flight requests and report
//! failures inline or through toasts.

mod account;
mod admin;
mod auth_forms;
mod cart;
mod home;
mod model;
mod upload;

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use eframe::egui;

pub use account::AccountPage;
pub use admin::AdminPage;
pub use auth_forms::{SignInPage, SignUpPage};
pub use cart::{CartPage, CheckoutPage};
pub use home::HomePage;
pub use model::ModelPage;
pub use upload::UploadPage;

use crate::auth::AuthStore;
use crate::cancel::{CancelOnDrop, CancelToken};
use crate::cart::LocalCart;
use crate::http::HttpClient;
use crate::router::Route;
use crate::task;
use crate::toast::Toasts;
use crate::upload::SelectedFile;

/// Everything a page may touch during one frame.
pub struct PageCtx<'a> {
    pub auth: &'a AuthStore,
    pub toasts: &'a Toasts,
    pub cart: &'a mut LocalCart,
    pub gl: Option<&'a Arc<glow::Context>>,
    pub navigate: Option<Route>,
}

impl PageCtx<'_> {
    pub fn client(&self) -> &HttpClient {
        self.auth.client()
    }

    pub fn go(&mut self, route: Route) {
        self.navigate = Some(route);
    }
}

/// The result of one background request, delivered to the frame loop.
/// Dropping the slot (or starting another request) discards a late result.
pub struct AsyncSlot<T> {
    result: Rc<RefCell<Option<T>>>,
    guard: Option<CancelOnDrop>,
}

impl<T> Default for AsyncSlot<T> {
    fn default() -> Self {
        Self {
            result: Rc::new(RefCell::new(None)),
            guard: None,
        }
    }
}

impl<T: 'static> AsyncSlot<T> {
    pub fn start<F>(&mut self, future: F)
    where
        F: Future<Output = T> + 'static,
    {
        let token = CancelToken::new();
        // Replacing the guard cancels whatever was running before.
        self.guard = Some(token.drop_guard());
        self.result = Rc::new(RefCell::new(None));
        let result = Rc::clone(&self.result);
        task::spawn_local(async move {
            let value = future.await;
            if !token.is_cancelled() {
                *result.borrow_mut() = Some(value);
            }
        });
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_some()
    }

    /// Takes the finished result, if any.
    pub fn poll(&mut self) -> Option<T> {
        let value = self.result.borrow_mut().take();
        if value.is_some() {
            self.guard = None;
        }
        value
    }
}

/// Opens the native/browser file picker and reads the chosen file.
pub fn pick_file(
    slot: &mut AsyncSlot<Option<SelectedFile>>,
    filter_name: &'static str,
    extensions: &'static [&'static str],
) {
    slot.start(async move {
        let Some(handle) = rfd::AsyncFileDialog::new()
            .add_filter(filter_name, extensions)
            .pick_file()
            .await
        else {
            return None;
        };
        let bytes = handle.read().await;
        Some(SelectedFile::from_name(handle.file_name(), bytes))
    });
}

/// A spinner with a caption.
pub(crate) fn busy(ui: &mut egui::Ui, text: &str) {
    ui.horizontal(|ui| {
        ui.spinner();
        ui.weak(text);
    });
}

pub(crate) fn error_label(ui: &mut egui::Ui, text: &str) {
    ui.colored_label(ui.visuals().error_fg_color, text);
}
