use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ShellError;
use crate::store::SettingsStore;
use crate::theme::Theme;

pub const USER_SETTINGS_KEY: &str = "userSettings";
pub const SWITCH_SETTINGS_KEY: &str = "switchSettings";
pub const THEME_KEY: &str = "theme";

/// Process-wide user preferences, persisted write-through.
///
/// Every field has a defined default: anything missing from storage falls
/// back to it. Toggles default to `false`, the base URL to the factory
/// default and the parameter string to empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub base_url: String,
    pub url_params: String,
    /// "Full screen" switch. The session shows chrome only when this is off.
    pub full_screen: bool,
    pub auto_rotation_enabled: bool,
    pub https_required: bool,
    pub theme: Theme,
}

impl UserPreferences {
    pub fn with_factory_url(factory_base_url: &str) -> Self {
        Self {
            base_url: factory_base_url.to_string(),
            url_params: String::new(),
            full_screen: false,
            auto_rotation_enabled: false,
            https_required: false,
            theme: Theme::Light,
        }
    }

    /// Load preferences, substituting defaults for absent or unreadable keys.
    pub fn load<S: SettingsStore>(store: &S, factory_base_url: &str) -> Self {
        let mut prefs = Self::with_factory_url(factory_base_url);

        if let Some(user) = read_json::<_, StoredUserSettings>(store, USER_SETTINGS_KEY) {
            if let Some(base_url) = user.base_url {
                prefs.base_url = base_url;
            }
            if let Some(url_params) = user.url_params {
                prefs.url_params = url_params;
            }
        }

        if let Some(switches) = read_json::<_, StoredSwitchSettings>(store, SWITCH_SETTINGS_KEY) {
            prefs.full_screen = switches.is_header_enabled.unwrap_or(false);
            prefs.auto_rotation_enabled = switches.is_auto_rotation_enabled.unwrap_or(false);
            prefs.https_required = switches.is_https_required.unwrap_or(false);
        }

        match store.get(THEME_KEY) {
            Ok(Some(raw)) => match Theme::parse(&raw) {
                Some(theme) => prefs.theme = theme,
                None => warn!(value = %raw, "ignoring unknown stored theme"),
            },
            Ok(None) => {}
            Err(source) => log_storage_failure(THEME_KEY, source),
        }

        debug!(
            base_url = %prefs.base_url,
            full_screen = prefs.full_screen,
            auto_rotation = prefs.auto_rotation_enabled,
            https_required = prefs.https_required,
            theme = %prefs.theme,
            "loaded user preferences"
        );
        prefs
    }

    /// Whether startup should offer to reopen the stored site.
    pub fn has_restorable_session(&self, factory_base_url: &str) -> bool {
        let has_input = !self.base_url.is_empty() || !self.url_params.is_empty();
        has_input && self.base_url != factory_base_url
    }

    /// Persist the URL fields. Failures are logged and swallowed.
    pub fn save_user_settings<S: SettingsStore>(&self, store: &mut S) {
        let payload = StoredUserSettings {
            base_url: Some(self.base_url.clone()),
            url_params: Some(self.url_params.clone()),
        };
        write_json(store, USER_SETTINGS_KEY, &payload);
    }

    /// Merge the three switches into the stored switch object.
    pub fn save_switches<S: SettingsStore>(&self, store: &mut S) {
        let mut merged = match store.get(SWITCH_SETTINGS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            },
            Ok(None) => Map::new(),
            Err(source) => {
                log_storage_failure(SWITCH_SETTINGS_KEY, source);
                Map::new()
            }
        };
        merged.insert("isHeaderEnabled".into(), Value::Bool(self.full_screen));
        merged.insert(
            "isAutoRotationEnabled".into(),
            Value::Bool(self.auto_rotation_enabled),
        );
        merged.insert("isHttpsRequired".into(), Value::Bool(self.https_required));
        write_json(store, SWITCH_SETTINGS_KEY, &Value::Object(merged));
    }

    pub fn save_theme<S: SettingsStore>(&self, store: &mut S) {
        if let Err(source) = store.set(THEME_KEY, self.theme.as_str()) {
            log_storage_failure(THEME_KEY, source);
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredUserSettings {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    url_params: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSwitchSettings {
    #[serde(default)]
    is_header_enabled: Option<bool>,
    #[serde(default)]
    is_auto_rotation_enabled: Option<bool>,
    #[serde(default)]
    is_https_required: Option<bool>,
}

fn read_json<S, T>(store: &S, key: &str) -> Option<T>
where
    S: SettingsStore,
    T: for<'de> Deserialize<'de>,
{
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(source) => {
            log_storage_failure(key, source);
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            log_storage_failure(key, anyhow::Error::new(err).context("malformed stored JSON"));
            None
        }
    }
}

fn write_json<S: SettingsStore, T: Serialize>(store: &mut S, key: &str, value: &T) {
    let result = serde_json::to_string(value)
        .map_err(anyhow::Error::from)
        .and_then(|rendered| store.set(key, &rendered));
    if let Err(source) = result {
        log_storage_failure(key, source);
    }
}

fn log_storage_failure(key: &str, source: anyhow::Error) {
    let error = ShellError::Storage {
        key: key.to_string(),
        source,
    };
    warn!(error = %error, "settings persistence failed; using in-memory value");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySettingsStore;
    use anyhow::{Result, bail};

    const FACTORY: &str = "https://google.com";

    struct BrokenStore;

    impl SettingsStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            bail!("disk unavailable")
        }

        fn set(&mut self, _key: &str, _value: &str) -> Result<()> {
            bail!("disk unavailable")
        }

        fn clear(&mut self) -> Result<()> {
            bail!("disk unavailable")
        }
    }

    #[test]
    fn empty_store_yields_defaults() {
        let store = MemorySettingsStore::new();
        let prefs = UserPreferences::load(&store, FACTORY);
        assert_eq!(prefs, UserPreferences::with_factory_url(FACTORY));
        assert!(!prefs.has_restorable_session(FACTORY));
    }

    #[test]
    fn absent_fields_use_defaults_but_stored_empty_strings_are_kept() {
        let store = MemorySettingsStore::with_entries([
            (USER_SETTINGS_KEY, r#"{"urlParams":"?a=1"}"#),
            (SWITCH_SETTINGS_KEY, r#"{"isHttpsRequired":true}"#),
        ]);
        let prefs = UserPreferences::load(&store, FACTORY);
        assert_eq!(prefs.base_url, FACTORY);
        assert_eq!(prefs.url_params, "?a=1");
        assert!(prefs.https_required);
        assert!(!prefs.full_screen);
        assert!(!prefs.auto_rotation_enabled);

        let store = MemorySettingsStore::with_entries([(
            USER_SETTINGS_KEY,
            r#"{"baseUrl":"","urlParams":""}"#,
        )]);
        let prefs = UserPreferences::load(&store, FACTORY);
        assert_eq!(prefs.base_url, "");
        assert!(!prefs.has_restorable_session(FACTORY));
    }

    #[test]
    fn restore_is_offered_only_for_non_factory_urls() {
        let mut prefs = UserPreferences::with_factory_url(FACTORY);
        prefs.url_params = "?q=1".into();
        assert!(!prefs.has_restorable_session(FACTORY));

        prefs.base_url = "https://example.org".into();
        assert!(prefs.has_restorable_session(FACTORY));

        prefs.base_url.clear();
        assert!(prefs.has_restorable_session(FACTORY));
    }

    #[test]
    fn switch_writes_merge_with_existing_keys() {
        let mut store = MemorySettingsStore::with_entries([(
            SWITCH_SETTINGS_KEY,
            r#"{"legacyFlag":1,"isHeaderEnabled":false}"#,
        )]);
        let mut prefs = UserPreferences::with_factory_url(FACTORY);
        prefs.full_screen = true;
        prefs.save_switches(&mut store);

        let raw = store.get(SWITCH_SETTINGS_KEY).unwrap().unwrap();
        let stored: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored["legacyFlag"], 1);
        assert_eq!(stored["isHeaderEnabled"], true);
        assert_eq!(stored["isHttpsRequired"], false);

        let reloaded = UserPreferences::load(&store, FACTORY);
        assert!(reloaded.full_screen);
    }

    #[test]
    fn storage_failures_fall_back_to_defaults() {
        let mut store = BrokenStore;
        let prefs = UserPreferences::load(&store, FACTORY);
        assert_eq!(prefs, UserPreferences::with_factory_url(FACTORY));

        prefs.save_user_settings(&mut store);
        prefs.save_switches(&mut store);
        prefs.save_theme(&mut store);
    }

    #[test]
    fn malformed_json_is_ignored() {
        let store = MemorySettingsStore::with_entries([
            (USER_SETTINGS_KEY, "not json"),
            (THEME_KEY, "dark"),
        ]);
        let prefs = UserPreferences::load(&store, FACTORY);
        assert_eq!(prefs.base_url, FACTORY);
        assert_eq!(prefs.theme, Theme::Dark);
    }
}
