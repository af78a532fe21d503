use anyhow::{Result, bail};
use serde::Serialize;

use crate::preferences::UserPreferences;

/// Display policy for one session. Fixed once the session starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionConfig {
    pub target_url: String,
    pub query_params: String,
    pub chrome_visible: bool,
    pub auto_rotation_enabled: bool,
}

/// Combine a validated URL with the user's toggles.
///
/// The parameter string is appended verbatim, including any leading `?` or
/// `&` the user typed. Chrome is shown only when full screen is off.
pub fn resolve(canonical_url: &str, preferences: &UserPreferences) -> Result<SessionConfig> {
    let target_url = format!("{canonical_url}{}", preferences.url_params);
    if target_url.is_empty() {
        bail!("cannot open a session without a target URL");
    }
    Ok(SessionConfig {
        target_url,
        query_params: preferences.url_params.clone(),
        chrome_visible: !preferences.full_screen,
        auto_rotation_enabled: preferences.auto_rotation_enabled,
    })
}
