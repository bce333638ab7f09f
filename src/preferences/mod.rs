//! UI Preference Store
//!
//! Holds theme, language, sidebar and page selection. The whole object is
//! saved under `ui-state` on every change; theme and language are also kept
//! under their own keys so older readers can pick them up individually.

use crate::storage::{keys, StorageAdapter};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    He,
}

impl Language {
    pub fn is_rtl(&self) -> bool {
        matches!(self, Language::He)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    #[default]
    Chat,
    Settings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiPreferences {
    pub sidebar_open: bool,
    pub current_page: Page,
    pub theme: Theme,
    pub language: Language,
    /// Derived from the viewport; a stored value is only a first guess
    pub is_mobile: bool,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            sidebar_open: true,
            current_page: Page::Chat,
            theme: Theme::Light,
            language: Language::En,
            is_mobile: false,
        }
    }
}

/// Partial update; `None` fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    pub sidebar_open: Option<bool>,
    pub current_page: Option<Page>,
    pub theme: Option<Theme>,
    pub language: Option<Language>,
}

impl PreferencesPatch {
    fn apply(self, prefs: &mut UiPreferences) {
        if let Some(sidebar_open) = self.sidebar_open {
            prefs.sidebar_open = sidebar_open;
        }
        if let Some(page) = self.current_page {
            prefs.current_page = page;
        }
        if let Some(theme) = self.theme {
            prefs.theme = theme;
        }
        if let Some(language) = self.language {
            prefs.language = language;
        }
    }
}

pub struct PreferenceStore {
    storage: StorageAdapter,
    mobile_breakpoint_px: u32,
    current: RwLock<UiPreferences>,
}

impl PreferenceStore {
    pub fn new(storage: StorageAdapter, mobile_breakpoint_px: u32) -> Self {
        Self {
            storage,
            mobile_breakpoint_px,
            current: RwLock::new(UiPreferences::default()),
        }
    }

    /// Read persisted preferences. Falls back to the standalone theme and
    /// language keys when the full object is missing.
    pub async fn load(&self) -> UiPreferences {
        let prefs = match self.storage.get::<UiPreferences>(keys::UI_STATE).await {
            Some(prefs) => prefs,
            None => {
                let mut prefs = UiPreferences::default();
                if let Some(theme) = self.storage.get::<Theme>(keys::THEME).await {
                    prefs.theme = theme;
                }
                if let Some(language) = self.storage.get::<Language>(keys::LANGUAGE).await {
                    prefs.language = language;
                }
                prefs
            }
        };

        tracing::debug!("[PreferenceStore] Loaded {:?}", prefs);
        *self.current.write().await = prefs.clone();
        prefs
    }

    pub async fn current(&self) -> UiPreferences {
        self.current.read().await.clone()
    }

    pub async fn update(&self, patch: PreferencesPatch) -> UiPreferences {
        let mut current = self.current.write().await;
        patch.apply(&mut current);
        self.persist(&current).await;
        current.clone()
    }

    /// Recompute `is_mobile` from a viewport width
    pub async fn handle_resize(&self, width_px: u32) -> UiPreferences {
        let is_mobile = width_px < self.mobile_breakpoint_px;
        let mut current = self.current.write().await;
        if current.is_mobile != is_mobile {
            current.is_mobile = is_mobile;
            self.persist(&current).await;
        }
        current.clone()
    }

    /// Forget everything persisted and go back to defaults
    pub async fn reset(&self) -> UiPreferences {
        for key in [keys::UI_STATE, keys::THEME, keys::LANGUAGE] {
            self.storage.remove(key).await;
        }
        let mut current = self.current.write().await;
        *current = UiPreferences::default();
        current.clone()
    }

    async fn persist(&self, prefs: &UiPreferences) {
        self.storage.set(keys::UI_STATE, prefs).await;
        self.storage.set(keys::THEME, &prefs.theme).await;
        self.storage.set(keys::LANGUAGE, &prefs.language).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (StorageAdapter, PreferenceStore) {
        let storage = StorageAdapter::in_memory();
        (storage.clone(), PreferenceStore::new(storage, 768))
    }

    #[tokio::test]
    async fn test_defaults_when_nothing_stored() {
        let (_, prefs) = store();
        assert_eq!(prefs.load().await, UiPreferences::default());
    }

    #[tokio::test]
    async fn test_update_persists_blob_and_dedicated_keys() {
        let (storage, prefs) = store();
        let updated = prefs
            .update(PreferencesPatch {
                theme: Some(Theme::Dark),
                language: Some(Language::He),
                ..PreferencesPatch::default()
            })
            .await;

        assert_eq!(updated.theme, Theme::Dark);
        assert!(updated.sidebar_open);

        let blob: UiPreferences = storage.get(keys::UI_STATE).await.unwrap();
        assert_eq!(blob, updated);
        assert_eq!(storage.get::<Theme>(keys::THEME).await, Some(Theme::Dark));
        assert_eq!(storage.get::<Language>(keys::LANGUAGE).await, Some(Language::He));
    }

    #[tokio::test]
    async fn test_blob_uses_camel_case_keys() {
        let (storage, prefs) = store();
        prefs
            .update(PreferencesPatch {
                current_page: Some(Page::Settings),
                ..PreferencesPatch::default()
            })
            .await;

        let raw: serde_json::Value = storage.get(keys::UI_STATE).await.unwrap();
        assert_eq!(raw["currentPage"], "settings");
        assert_eq!(raw["sidebarOpen"], true);
        assert_eq!(raw["isMobile"], false);
    }

    #[tokio::test]
    async fn test_falls_back_to_dedicated_keys() {
        let (storage, prefs) = store();
        storage.set(keys::THEME, &Theme::Dark).await;
        storage.set(keys::LANGUAGE, &Language::He).await;

        let loaded = prefs.load().await;
        assert_eq!(loaded.theme, Theme::Dark);
        assert!(loaded.language.is_rtl());
        assert_eq!(loaded.current_page, Page::Chat);
    }

    #[tokio::test]
    async fn test_resize_recomputes_is_mobile() {
        let (storage, prefs) = store();
        let mut stale = UiPreferences::default();
        stale.is_mobile = true;
        storage.set(keys::UI_STATE, &stale).await;

        assert!(prefs.load().await.is_mobile);
        assert!(!prefs.handle_resize(1280).await.is_mobile);
        assert!(prefs.handle_resize(400).await.is_mobile);
        assert!(!prefs.handle_resize(768).await.is_mobile);
    }

    #[tokio::test]
    async fn test_patch_deserializes_from_partial_json() {
        let patch: PreferencesPatch =
            serde_json::from_str(r#"{"sidebarOpen": false, "theme": "dark"}"#).unwrap();
        assert_eq!(patch.sidebar_open, Some(false));
        assert_eq!(patch.theme, Some(Theme::Dark));
        assert_eq!(patch.language, None);
    }

    #[tokio::test]
    async fn test_reset_clears_storage() {
        let (storage, prefs) = store();
        prefs
            .update(PreferencesPatch {
                theme: Some(Theme::Dark),
                ..PreferencesPatch::default()
            })
            .await;

        assert_eq!(prefs.reset().await, UiPreferences::default());
        assert!(storage.get::<UiPreferences>(keys::UI_STATE).await.is_none());
        assert!(storage.get::<Theme>(keys::THEME).await.is_none());
        assert_eq!(prefs.load().await, UiPreferences::default());
    }
}
