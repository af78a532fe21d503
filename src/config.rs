use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

pub const DEFAULT_VALIDATOR_ENDPOINT: &str = "https://mobiledetects.com/valid-url";
pub const FACTORY_BASE_URL: &str = "https://google.com";

pub(crate) fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "webframe", "Webframe")
        .context("Unable to resolve platform data directory")
}

/// Host configuration for the webframe shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellSettings {
    #[serde(default)]
    pub validator: ValidatorSettings,
    #[serde(default)]
    pub session: SessionTimingSettings,
    #[serde(default)]
    pub navigation: NavigationSettings,
    /// Base URL a fresh install starts with; never offered for restore.
    #[serde(default = "ShellSettings::default_factory_base_url")]
    pub factory_base_url: String,
    /// Optional override for where user preferences are stored.
    #[serde(default)]
    pub settings_store: Option<PathBuf>,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl ShellSettings {
    fn default_factory_base_url() -> String {
        FACTORY_BASE_URL.into()
    }

    /// Load settings from disk, writing defaults if missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Unable to read config at {}", path.display()))?;
            let parsed: Self = serde_json::from_str(&raw)
                .with_context(|| format!("Malformed config at {}", path.display()))?;
            Ok(parsed)
        } else {
            let settings = Self::default();
            settings
                .save(path)
                .with_context(|| format!("Failed to write default config to {}", path.display()))?;
            Ok(settings)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        let serialised = serde_json::to_string_pretty(self)?;
        fs::write(path, serialised)
            .with_context(|| format!("Failed to persist config to {}", path.display()))
    }

    /// Resolve the file backing the preference store.
    pub fn resolve_settings_store(&self) -> Result<PathBuf> {
        if let Some(path) = &self.settings_store {
            return Ok(path.clone());
        }
        Ok(project_dirs()?.data_dir().join("preferences.json"))
    }
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            validator: ValidatorSettings::default(),
            session: SessionTimingSettings::default(),
            navigation: NavigationSettings::default(),
            factory_base_url: Self::default_factory_base_url(),
            settings_store: None,
            telemetry: TelemetrySettings::default(),
        }
    }
}

/// Remote compliance endpoint used to vet URLs before a session opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorSettings {
    #[serde(default = "ValidatorSettings::default_endpoint")]
    pub endpoint: String,
    #[serde(default = "ValidatorSettings::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "ValidatorSettings::default_user_agent")]
    pub user_agent: String,
}

impl ValidatorSettings {
    fn default_endpoint() -> String {
        DEFAULT_VALIDATOR_ENDPOINT.into()
    }

    const fn default_timeout_secs() -> u64 {
        15
    }

    fn default_user_agent() -> String {
        concat!("Webframe/", env!("CARGO_PKG_VERSION"), " (validator)").into()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            timeout_secs: Self::default_timeout_secs(),
            user_agent: Self::default_user_agent(),
        }
    }
}

/// Timing knobs for the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTimingSettings {
    /// Delay before the portrait lock is issued a second time.
    #[serde(default = "SessionTimingSettings::default_relock_delay_ms")]
    pub relock_delay_ms: u64,
    /// Idle time before the home affordance slides away.
    #[serde(default = "SessionTimingSettings::default_inactivity_timeout_ms")]
    pub inactivity_timeout_ms: u64,
    /// Duration of the affordance slide when the host does not report completion.
    #[serde(default = "SessionTimingSettings::default_slide_duration_ms")]
    pub slide_duration_ms: u64,
}

impl SessionTimingSettings {
    const fn default_relock_delay_ms() -> u64 {
        500
    }

    const fn default_inactivity_timeout_ms() -> u64 {
        3_000
    }

    const fn default_slide_duration_ms() -> u64 {
        300
    }

    pub fn relock_delay(&self) -> Duration {
        Duration::from_millis(self.relock_delay_ms)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }

    pub fn slide_duration(&self) -> Duration {
        Duration::from_millis(self.slide_duration_ms)
    }
}

impl Default for SessionTimingSettings {
    fn default() -> Self {
        Self {
            relock_delay_ms: Self::default_relock_delay_ms(),
            inactivity_timeout_ms: Self::default_inactivity_timeout_ms(),
            slide_duration_ms: Self::default_slide_duration_ms(),
        }
    }
}

/// In-browser navigation rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationSettings {
    /// URL prefixes that must open in the system browser instead.
    #[serde(default = "NavigationSettings::default_external_prefixes")]
    pub external_prefixes: Vec<String>,
    /// Appended to the surface's default user agent.
    #[serde(default = "NavigationSettings::default_user_agent_suffix")]
    pub user_agent_suffix: String,
}

impl NavigationSettings {
    fn default_external_prefixes() -> Vec<String> {
        vec!["https://user".into()]
    }

    fn default_user_agent_suffix() -> String {
        concat!(" Webframe/", env!("CARGO_PKG_VERSION")).into()
    }
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            external_prefixes: Self::default_external_prefixes(),
            user_agent_suffix: Self::default_user_agent_suffix(),
        }
    }
}

/// Opt-in diagnostics for webframe processes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub traces: TraceSettings,
}

/// Controls structured tracing export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "TraceSettings::default_max_files")]
    pub max_files: usize,
}

impl TraceSettings {
    const fn default_max_files() -> usize {
        10
    }
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: None,
            max_files: Self::default_max_files(),
        }
    }
}

/// Compute the default path to the shell configuration file.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.json"))
}
