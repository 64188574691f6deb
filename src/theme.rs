use eframe::egui;
use serde::{Deserialize, Serialize};

use crate::storage::{KeyValueStore, THEME_KEY};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    System,
    Light,
    Dark,
}

impl ThemeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "system" => Some(Self::System),
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            _ => None,
        }
    }

    /// Cycles system -> light -> dark.
    pub fn next(self) -> Self {
        match self {
            Self::System => Self::Light,
            Self::Light => Self::Dark,
            Self::Dark => Self::System,
        }
    }

    pub fn load(store: &dyn KeyValueStore) -> Self {
        store
            .get(THEME_KEY)
            .and_then(|raw| Self::parse(&raw))
            .unwrap_or_default()
    }

    pub fn save(self, store: &dyn KeyValueStore) {
        store.set(THEME_KEY, self.as_str());
    }

    pub fn is_dark(self, prefers_dark: bool) -> bool {
        match self {
            Self::Dark => true,
            Self::Light => false,
            Self::System => prefers_dark,
        }
    }

    pub fn visuals(self) -> egui::Visuals {
        if self.is_dark(prefers_dark_mode()) {
            egui::Visuals::dark()
        } else {
            egui::Visuals::light()
        }
    }

    pub fn apply(self, ctx: &egui::Context) {
        ctx.set_visuals(self.visuals());
    }
}

#[cfg(target_arch = "wasm32")]
fn prefers_dark_mode() -> bool {
    use js_sys::{Function, Reflect};
    use wasm_bindgen::JsCast;

    let Some(window) = web_sys::window() else {
        return false;
    };
    let Ok(match_media) = Reflect::get(&window, &"matchMedia".into()) else {
        return false;
    };
    let Ok(match_media) = match_media.dyn_into::<Function>() else {
        return false;
    };
    let Ok(query) = match_media.call1(&window, &"(prefers-color-scheme: dark)".into()) else {
        return false;
    };
    Reflect::get(&query, &"matches".into())
        .ok()
        .and_then(|value| value.as_bool())
        .unwrap_or(false)
}

#[cfg(not(target_arch = "wasm32"))]
fn prefers_dark_mode() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn persists_and_falls_back_to_system() {
        let store = MemoryStore::new();
        assert_eq!(ThemeMode::load(&store), ThemeMode::System);
        ThemeMode::Dark.save(&store);
        assert_eq!(store.get(THEME_KEY).as_deref(), Some("dark"));
        assert_eq!(ThemeMode::load(&store), ThemeMode::Dark);
        store.set(THEME_KEY, "sepia");
        assert_eq!(ThemeMode::load(&store), ThemeMode::System);
    }

    #[test]
    fn system_follows_preference() {
        assert!(ThemeMode::System.is_dark(true));
        assert!(!ThemeMode::System.is_dark(false));
        assert!(ThemeMode::Dark.is_dark(false));
        assert_eq!(ThemeMode::Dark.next(), ThemeMode::System);
    }
}
