use tracing::{info, warn};

use crate::config::NavigationSettings;
use crate::error::ShellError;
use crate::platform::{BrowserSurface, ExternalLauncher};

/// What happened to a navigation attempt.
#[derive(Debug)]
pub enum Interception {
    Allow,
    /// Handed to the system browser; the surface was restored.
    Redirected,
    /// Blocked in-app, but the system browser refused the URL.
    RedirectFailed(ShellError),
    /// The session is tearing down; nothing was launched or reloaded.
    Dropped,
}

impl Interception {
    pub fn allows(&self) -> bool {
        matches!(self, Interception::Allow)
    }
}

/// Decides, before each load, whether a URL may render in the embedded surface.
#[derive(Debug, Clone)]
pub struct NavigationInterceptor {
    external_prefixes: Vec<String>,
}

impl NavigationInterceptor {
    pub fn new<I, S>(external_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            external_prefixes: external_prefixes
                .into_iter()
                .map(Into::into)
                .filter(|prefix: &String| !prefix.is_empty())
                .collect(),
        }
    }

    pub fn from_settings(settings: &NavigationSettings) -> Self {
        Self::new(settings.external_prefixes.iter().cloned())
    }

    pub fn is_external(&self, candidate_url: &str) -> bool {
        self.external_prefixes.iter().any(|prefix| {
            candidate_url
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        })
    }

    pub fn intercept<B, L>(&self, candidate_url: &str, surface: &mut B, launcher: &L) -> Interception
    where
        B: BrowserSurface + ?Sized,
        L: ExternalLauncher + ?Sized,
    {
        if !self.is_external(candidate_url) {
            return Interception::Allow;
        }

        let launched = launcher.open_url(candidate_url);

        // Keep the surface on the last good page instead of an error page.
        surface.stop_loading();
        surface.reload();

        match launched {
            Ok(()) => {
                info!(url = %candidate_url, "redirected navigation to system browser");
                Interception::Redirected
            }
            Err(source) => {
                warn!(url = %candidate_url, error = %source, "system browser refused URL");
                Interception::RedirectFailed(ShellError::ExternalLaunch {
                    url: candidate_url.to_string(),
                    source,
                })
            }
        }
    }

    pub fn should_allow<B, L>(&self, candidate_url: &str, surface: &mut B, launcher: &L) -> bool
    where
        B: BrowserSurface + ?Sized,
        L: ExternalLauncher + ?Sized,
    {
        self.intercept(candidate_url, surface, launcher).allows()
    }
}

impl Default for NavigationInterceptor {
    fn default() -> Self {
        Self::from_settings(&NavigationSettings::default())
    }
}
