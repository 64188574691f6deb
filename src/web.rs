//! Browser events the app subscribes to once at startup.

use std::cell::RefCell;
use std::rc::Rc;

use eframe::egui;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Event, StorageEvent};

use crate::auth::AuthStore;
use crate::router::{self, Route};

/// Where back/forward navigation leaves the route for the next frame.
pub type PendingRoute = Rc<RefCell<Option<Route>>>;

fn window() -> Result<web_sys::Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("no window"))
}

pub fn listen_popstate(pending: PendingRoute, egui_ctx: egui::Context) -> Result<(), JsValue> {
    let handler = Closure::wrap(Box::new(move |_event: Event| {
        *pending.borrow_mut() = Some(router::current_route());
        egui_ctx.request_repaint();
    }) as Box<dyn FnMut(_)>);
    window()?.add_event_listener_with_callback("popstate", handler.as_ref().unchecked_ref())?;
    handler.forget();
    Ok(())
}

/// Another tab signing out removes the persisted session; follow it here.
pub fn listen_storage(auth: AuthStore, egui_ctx: egui::Context) -> Result<(), JsValue> {
    let handler = Closure::wrap(Box::new(move |event: StorageEvent| {
        // `key` is null when the whole storage was cleared.
        match event.key() {
            Some(key) => auth.storage_changed(&key, event.new_value().as_deref()),
            None => {
                for key in crate::storage::AUTH_KEYS {
                    auth.storage_changed(key, None);
                }
            }
        }
        egui_ctx.request_repaint();
    }) as Box<dyn FnMut(_)>);
    window()?.add_event_listener_with_callback("storage", handler.as_ref().unchecked_ref())?;
    handler.forget();
    Ok(())
}
