//! Best-effort key/value persistence.
//!
//! In the browser this is `localStorage`; anything stored here may vanish and
//! the app re-hydrates from the server when it does.

use std::cell::RefCell;
use std::collections::BTreeMap;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsValue;

pub const AUTH_KEY: &str = "printforge.auth";
pub const AVATAR_URL_KEY: &str = "printforge.avatar_url";
pub const THEME_KEY: &str = "printforge.theme";
pub const LEADERBOARD_KEY: &str = "printforge.breakout.leaderboard";

/// Keys that hold data about the signed-in user and must go on sign-out.
pub const AUTH_KEYS: &[&str] = &[AUTH_KEY, AVATAR_URL_KEY];

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Reads and decodes a JSON value; corrupt entries are dropped.
pub fn load_json<T: serde::de::DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("discarding corrupt {key}: {e}");
            store.remove(key);
            None
        }
    }
}

pub fn save_json<T: serde::Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(raw) => store.set(key, &raw),
        Err(e) => log::warn!("could not serialize {key}: {e}"),
    }
}

/// In-process store used natively and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

/// `window.localStorage`. Every failure (private mode, quota, no window) is
/// logged and otherwise ignored.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Default)]
pub struct LocalStorage;

#[cfg(target_arch = "wasm32")]
fn storage() -> Result<web_sys::Storage, JsValue> {
    web_sys::window()
        .ok_or_else(|| JsValue::from_str("no window"))?
        .local_storage()?
        .ok_or_else(|| JsValue::from_str("no localStorage"))
}

#[cfg(target_arch = "wasm32")]
impl KeyValueStore for LocalStorage {
    fn get(&self, key: &str) -> Option<String> {
        match storage().and_then(|s| s.get_item(key)) {
            Ok(value) => value,
            Err(e) => {
                log::debug!("localStorage read of {key} failed: {e:?}");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(e) = storage().and_then(|s| s.set_item(key, value)) {
            log::warn!("localStorage write of {key} failed: {e:?}");
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = storage().and_then(|s| s.remove_item(key)) {
            log::warn!("localStorage remove of {key} failed: {e:?}");
        }
    }
}

/// The store the running app uses on this target.
pub fn platform_store() -> std::rc::Rc<dyn KeyValueStore> {
    #[cfg(target_arch = "wasm32")]
    {
        std::rc::Rc::new(LocalStorage)
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        std::rc::Rc::new(MemoryStore::new())
    }
}
