pub mod affordance;
pub mod cli;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod platform;
pub mod policy;
pub mod preferences;
pub mod prompt;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod theme;
pub mod validator;

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::config::{ShellSettings, default_config_path};
use crate::error::ShellError;
use crate::interceptor::Interception;
use crate::platform::ExternalLauncher;
use crate::policy::SessionConfig;
use crate::preferences::UserPreferences;
use crate::prompt::{Prompt, PromptChannel, PromptCoordinator, PromptResponse};
use crate::store::{FileSettingsStore, SettingsStore};
use crate::theme::{StatusStyle, Theme};
use crate::validator::{UrlValidator, ValidationHttp, ValidationRequest, ValidationResult};

/// Handle for one in-flight validation. Completions are matched against the
/// attempt that issued them; anything older is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationTicket {
    attempt: u64,
    request: ValidationRequest,
}

impl ValidationTicket {
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn request(&self) -> &ValidationRequest {
        &self.request
    }
}

/// Result of finishing an open attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum OpenOutcome {
    /// Validation passed; enter a session with this config.
    Navigate(SessionConfig),
    /// Navigation definitively failed and the user was told why.
    Prompted(Prompt),
    /// The completion belonged to an attempt that is no longer current.
    Stale,
}

struct PendingOpen {
    ticket: ValidationTicket,
    preferences: UserPreferences,
}

/// Configuration-screen orchestrator: owns user preferences, the busy flag
/// and the prompt coordinator, and turns open requests into session configs.
pub struct Shell<S: SettingsStore> {
    settings: ShellSettings,
    store: S,
    preferences: UserPreferences,
    prompts: PromptCoordinator,
    busy: bool,
    attempts: u64,
    pending: Option<PendingOpen>,
}

impl Shell<FileSettingsStore> {
    /// Load configuration from the default path and open the on-disk
    /// preference store.
    pub fn from_config(config_path_override: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_path_override {
            Some(path) => path,
            None => default_config_path()?,
        };
        let settings = ShellSettings::load_or_default(&config_path)?;
        let store = FileSettingsStore::new(settings.resolve_settings_store()?);
        debug!(
            config = %config_path.display(),
            store = %store.path().display(),
            "resolved shell paths"
        );
        Ok(Self::bootstrap(settings, store))
    }
}

impl<S: SettingsStore> Shell<S> {
    /// Build a shell without startup prompts.
    pub fn new(settings: ShellSettings, store: S) -> Self {
        let preferences = UserPreferences::load(&store, &settings.factory_base_url);
        Self {
            settings,
            store,
            preferences,
            prompts: PromptCoordinator::new(),
            busy: false,
            attempts: 0,
            pending: None,
        }
    }

    /// Load preferences once and offer to restore the previous site.
    pub fn bootstrap(settings: ShellSettings, store: S) -> Self {
        let mut shell = Self::new(settings, store);
        if shell
            .preferences
            .has_restorable_session(&shell.settings.factory_base_url)
        {
            info!(base_url = %shell.preferences.base_url, "offering to restore previous website");
            shell.prompts.show(Prompt::Restore {
                base_url: shell.preferences.base_url.clone(),
                url_params: shell.preferences.url_params.clone(),
            });
        }
        shell
    }

    pub fn settings(&self) -> &ShellSettings {
        &self.settings
    }

    pub fn preferences(&self) -> &UserPreferences {
        &self.preferences
    }

    pub fn prompts(&self) -> &PromptCoordinator {
        &self.prompts
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loading indicator: true while a validation is outstanding.
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn full_url(&self) -> String {
        format!("{}{}", self.preferences.base_url, self.preferences.url_params)
    }

    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.preferences.base_url = base_url.into();
        self.preferences.save_user_settings(&mut self.store);
    }

    pub fn set_url_params(&mut self, url_params: impl Into<String>) {
        self.preferences.url_params = url_params.into();
        self.preferences.save_user_settings(&mut self.store);
    }

    pub fn set_full_screen(&mut self, enabled: bool) {
        self.preferences.full_screen = enabled;
        self.preferences.save_switches(&mut self.store);
    }

    /// Switching auto-rotation on reminds the user that the device's own
    /// orientation lock still applies.
    pub fn set_auto_rotation(&mut self, enabled: bool) {
        self.preferences.auto_rotation_enabled = enabled;
        self.preferences.save_switches(&mut self.store);
        if enabled {
            self.prompts.show(Prompt::OrientationReminder);
        }
    }

    pub fn set_https_required(&mut self, required: bool) {
        self.preferences.https_required = required;
        self.preferences.save_switches(&mut self.store);
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.preferences.theme = self.preferences.theme.toggled();
        self.preferences.save_theme(&mut self.store);
        debug!(theme = %self.preferences.theme, "theme toggled");
        self.preferences.theme
    }

    /// Status bar style for the configuration screen.
    pub fn status_style(&self) -> StatusStyle {
        self.preferences.theme.status_style()
    }

    /// Start validating the current base URL. No-op while another attempt is
    /// outstanding; an empty base URL is reported without any request.
    pub fn begin_open(&mut self) -> Option<ValidationTicket> {
        if self.busy {
            debug!("open ignored while a validation is in flight");
            return None;
        }
        if self.preferences.base_url.trim().is_empty() {
            self.prompts.show(Prompt::MissingBaseUrl);
            return None;
        }

        self.attempts += 1;
        let request = ValidationRequest::new(
            self.preferences.base_url.clone(),
            self.preferences.https_required,
            self.preferences.url_params.clone(),
        );
        let ticket = ValidationTicket {
            attempt: self.attempts,
            request,
        };
        info!(
            attempt = ticket.attempt,
            url = %self.full_url(),
            full_screen = self.preferences.full_screen,
            auto_rotation = self.preferences.auto_rotation_enabled,
            https_required = self.preferences.https_required,
            "opening website"
        );
        self.busy = true;
        self.pending = Some(PendingOpen {
            ticket: ticket.clone(),
            preferences: self.preferences.clone(),
        });
        Some(ticket)
    }

    /// Open with explicit values, persisting them first.
    pub fn begin_open_with(
        &mut self,
        base_url: impl Into<String>,
        url_params: impl Into<String>,
    ) -> Option<ValidationTicket> {
        if self.busy {
            debug!("open ignored while a validation is in flight");
            return None;
        }
        self.preferences.base_url = base_url.into();
        self.preferences.url_params = url_params.into();
        self.preferences.save_user_settings(&mut self.store);
        self.begin_open()
    }

    /// Abandon the current attempt. Its completion will be reported stale.
    pub fn cancel_open(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(attempt = pending.ticket.attempt, "open attempt cancelled");
        }
        self.busy = false;
    }

    pub fn complete_validation(
        &mut self,
        ticket: &ValidationTicket,
        result: Result<ValidationResult, ShellError>,
    ) -> OpenOutcome {
        let current = self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.ticket.attempt == ticket.attempt);
        if !current {
            debug!(attempt = ticket.attempt, "ignoring stale validation result");
            return OpenOutcome::Stale;
        }
        let Some(pending) = self.pending.take() else {
            return OpenOutcome::Stale;
        };
        self.busy = false;

        let span = info_span!("shell.open", attempt = ticket.attempt, url = %ticket.request.raw_url);
        let _guard = span.enter();

        let verdict = result.and_then(|response| response.verdict(ticket.request.https_required));
        let failure = match verdict {
            Ok(canonical) => match policy::resolve(&canonical, &pending.preferences) {
                Ok(config) => {
                    info!(
                        target_url = %config.target_url,
                        chrome_visible = config.chrome_visible,
                        "validation passed; entering session"
                    );
                    return OpenOutcome::Navigate(config);
                }
                Err(err) => {
                    warn!(error = %err, "validated URL produced no session target");
                    ShellError::rejected(None)
                }
            },
            Err(err) => err,
        };

        warn!(kind = failure.kind(), error = %failure, "open attempt failed");
        let prompt = Prompt::for_error(&failure).unwrap_or(Prompt::NetworkError);
        self.prompts.show(prompt.clone());
        OpenOutcome::Prompted(prompt)
    }

    /// Run a whole open attempt against `validator` on the current thread.
    pub fn open_with<H: ValidationHttp>(&mut self, validator: &UrlValidator<H>) -> Option<OpenOutcome> {
        let ticket = self.begin_open()?;
        let result = validator.submit(ticket.request());
        Some(self.complete_validation(&ticket, result))
    }

    /// Resolve the prompt on `channel`. Confirming a restore starts an open
    /// attempt with the persisted values; the returned ticket must be driven
    /// to completion by the caller.
    pub fn respond_to_prompt(
        &mut self,
        channel: PromptChannel,
        response: PromptResponse,
    ) -> Option<ValidationTicket> {
        let (prompt, response) = self.prompts.resolve(channel, response)?;
        match (prompt, response) {
            (
                Prompt::Restore {
                    base_url,
                    url_params,
                },
                PromptResponse::Confirmed,
            ) => self.begin_open_with(base_url, url_params),
            (Prompt::Restore { .. }, PromptResponse::Cancelled) => {
                self.cancel_open();
                None
            }
            (prompt, _) => {
                debug!(?prompt, "prompt acknowledged");
                None
            }
        }
    }

    /// Hand the current URL to the system browser without validation.
    pub fn open_externally<L: ExternalLauncher + ?Sized>(&mut self, launcher: &L) -> bool {
        let url = self.full_url();
        match launcher.open_url(&url) {
            Ok(()) => {
                info!(url = %url, "opened in system browser");
                true
            }
            Err(source) => {
                let error = ShellError::ExternalLaunch { url, source };
                warn!(error = %error, "external launch failed");
                self.prompts.show(Prompt::LaunchFailure);
                false
            }
        }
    }

    /// Surface the outcome of a session-level interception.
    pub fn report_interception(&mut self, interception: &Interception) {
        if let Interception::RedirectFailed(error) = interception {
            if let Some(prompt) = Prompt::for_error(error) {
                self.prompts.show(prompt);
            }
        }
    }

    /// Wipe persisted preferences and fall back to defaults.
    pub fn clear_storage(&mut self) {
        if let Err(source) = self.store.clear() {
            let error = ShellError::Storage {
                key: "*".into(),
                source,
            };
            warn!(error = %error, "failed to clear settings store");
        } else {
            info!("settings store cleared");
        }
        self.preferences = UserPreferences::with_factory_url(&self.settings.factory_base_url);
        self.prompts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySettingsStore;
    use crate::validator::ValidationStatus;
    use anyhow::bail;
    use serde_json::{Value, json};

    fn ok_result(url: &str, https: bool) -> ValidationResult {
        ValidationResult {
            status: ValidationStatus::Ok,
            canonical_url: url.into(),
            https_supported: https,
            error_message: None,
        }
    }

    fn shell() -> Shell<MemorySettingsStore> {
        Shell::bootstrap(ShellSettings::default(), MemorySettingsStore::new())
    }

    struct RefusingLauncher;

    impl ExternalLauncher for RefusingLauncher {
        fn open_url(&self, _url: &str) -> Result<()> {
            bail!("no handler")
        }
    }

    struct EchoHttp;

    impl ValidationHttp for EchoHttp {
        fn post_form(&self, _url: &str, fields: &[(&'static str, String)]) -> Result<Value> {
            let url = fields
                .iter()
                .find(|(name, _)| *name == "url")
                .map(|(_, value)| value.clone())
                .unwrap_or_default();
            Ok(json!({"status": "ok", "valid_url": format!("{url}/"), "https": true}))
        }
    }

    #[test]
    fn fresh_install_offers_no_restore() {
        let shell = shell();
        assert!(shell.prompts().is_idle());
        assert_eq!(shell.preferences().base_url, "https://google.com");
    }

    #[test]
    fn open_is_a_noop_while_busy() {
        let mut shell = shell();
        let ticket = shell.begin_open().unwrap();
        assert!(shell.is_busy());
        assert!(shell.begin_open().is_none());
        assert!(shell.begin_open_with("https://other.test", "").is_none());
        assert_eq!(shell.preferences().base_url, "https://google.com");

        let outcome = shell.complete_validation(&ticket, Ok(ok_result("https://google.com/", true)));
        assert!(matches!(outcome, OpenOutcome::Navigate(_)));
        assert!(!shell.is_busy());
    }

    #[test]
    fn empty_base_url_prompts_without_request() {
        let mut shell = shell();
        shell.set_base_url("");
        assert!(shell.begin_open().is_none());
        assert!(!shell.is_busy());
        assert_eq!(
            shell.prompts().active(PromptChannel::Acknowledge),
            Some(&Prompt::MissingBaseUrl)
        );
    }

    #[test]
    fn network_failure_clears_busy_and_prompts() {
        let mut shell = shell();
        let before = shell.preferences().clone();
        let ticket = shell.begin_open().unwrap();
        let outcome = shell.complete_validation(
            &ticket,
            Err(ShellError::Network(anyhow::anyhow!("dns failure"))),
        );
        assert_eq!(outcome, OpenOutcome::Prompted(Prompt::NetworkError));
        assert!(!shell.is_busy());
        assert_eq!(shell.preferences(), &before);
    }

    #[test]
    fn every_failed_attempt_leaves_a_visible_prompt() {
        let mut shell = shell();
        let ticket = shell.begin_open().unwrap();
        let outcome = shell.complete_validation(
            &ticket,
            Err(ShellError::Storage {
                key: "userSettings".into(),
                source: anyhow::anyhow!("disk full"),
            }),
        );
        assert_eq!(outcome, OpenOutcome::Prompted(Prompt::NetworkError));
        assert!(!shell.is_busy());
        assert_eq!(
            shell.prompts().active(PromptChannel::Acknowledge),
            Some(&Prompt::NetworkError)
        );
    }

    #[test]
    fn server_rejection_carries_its_message() {
        let mut shell = shell();
        let ticket = shell.begin_open().unwrap();
        let result = ValidationResult {
            status: ValidationStatus::Error,
            canonical_url: String::new(),
            https_supported: false,
            error_message: Some("Domain is blocked".into()),
        };
        assert_eq!(
            shell.complete_validation(&ticket, Ok(result)),
            OpenOutcome::Prompted(Prompt::Rejected {
                message: "Domain is blocked".into()
            })
        );
    }

    #[test]
    fn cancelled_attempt_completes_stale() {
        let mut shell = shell();
        let first = shell.begin_open().unwrap();
        shell.cancel_open();
        assert!(!shell.is_busy());

        let second = shell.begin_open().unwrap();
        assert_ne!(first.attempt(), second.attempt());
        assert_eq!(
            shell.complete_validation(&first, Ok(ok_result("https://google.com/", true))),
            OpenOutcome::Stale
        );
        assert!(shell.is_busy());
        assert!(matches!(
            shell.complete_validation(&second, Ok(ok_result("https://google.com/", true))),
            OpenOutcome::Navigate(_)
        ));
        assert_eq!(
            shell.complete_validation(&second, Ok(ok_result("https://google.com/", true))),
            OpenOutcome::Stale
        );
    }

    #[test]
    fn auto_rotation_on_shows_reminder() {
        let mut shell = shell();
        shell.set_auto_rotation(false);
        assert!(shell.prompts().is_idle());
        shell.set_auto_rotation(true);
        assert_eq!(
            shell.prompts().active(PromptChannel::Acknowledge),
            Some(&Prompt::OrientationReminder)
        );
        assert!(shell.preferences().auto_rotation_enabled);
    }

    #[test]
    fn toggles_write_through() {
        let mut shell = shell();
        shell.set_full_screen(true);
        shell.set_https_required(true);
        assert_eq!(shell.toggle_theme(), Theme::Dark);
        assert_eq!(shell.status_style(), StatusStyle::LightContent);

        let reloaded = UserPreferences::load(shell.store(), "https://google.com");
        assert!(reloaded.full_screen);
        assert!(reloaded.https_required);
        assert_eq!(reloaded.theme, Theme::Dark);
    }

    #[test]
    fn external_launch_failure_prompts() {
        let mut shell = shell();
        assert!(!shell.open_externally(&RefusingLauncher));
        assert_eq!(
            shell.prompts().active(PromptChannel::Acknowledge),
            Some(&Prompt::LaunchFailure)
        );
    }

    #[test]
    fn open_with_runs_the_whole_pipeline() {
        let mut shell = shell();
        shell.set_base_url("https://example.org");
        shell.set_url_params("?a=1");
        let validator = UrlValidator::new("https://validator.test", EchoHttp);
        let outcome = shell.open_with(&validator).unwrap();
        match outcome {
            OpenOutcome::Navigate(config) => {
                assert_eq!(config.target_url, "https://example.org/?a=1");
                assert!(config.chrome_visible);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn from_config_uses_configured_store() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let store_path = dir.path().join("prefs.json");
        let mut settings = ShellSettings::default();
        settings.settings_store = Some(store_path.clone());
        settings.save(&config_path).unwrap();

        let mut store = FileSettingsStore::new(store_path.clone());
        store
            .set("userSettings", r#"{"baseUrl":"https://example.org","urlParams":""}"#)
            .unwrap();

        let shell = Shell::from_config(Some(config_path)).unwrap();
        assert_eq!(shell.store().path(), store_path.as_path());
        assert_eq!(shell.preferences().base_url, "https://example.org");
        assert!(shell.prompts().active(PromptChannel::Confirm).is_some());
    }

    #[test]
    fn clear_storage_resets_preferences() {
        let mut shell = shell();
        shell.set_base_url("https://example.org");
        shell.set_full_screen(true);
        shell.clear_storage();
        assert_eq!(shell.preferences().base_url, "https://google.com");
        assert!(!shell.preferences().full_screen);
        assert_eq!(shell.store().get("userSettings").unwrap(), None);
    }

    #[test]
    fn clear_storage_drops_pending_prompts() {
        let mut store = MemorySettingsStore::new();
        store
            .set("userSettings", r#"{"baseUrl":"https://example.org","urlParams":"?a=1"}"#)
            .unwrap();
        let mut shell = Shell::bootstrap(ShellSettings::default(), store);
        shell.set_auto_rotation(true);
        assert!(shell.prompts().active(PromptChannel::Confirm).is_some());
        assert!(shell.prompts().active(PromptChannel::Acknowledge).is_some());

        shell.clear_storage();
        assert!(shell.prompts().is_idle());
        assert!(
            shell
                .respond_to_prompt(PromptChannel::Confirm, PromptResponse::Confirmed)
                .is_none()
        );
        assert!(!shell.is_busy());
    }
}
