use serde::Serialize;
use tracing::debug;

use crate::error::ShellError;

pub const NETWORK_ERROR_MESSAGE: &str = "Failed to validate the URL.";
pub const LAUNCH_FAILURE_MESSAGE: &str = "Failed to open URL in the system browser.";
pub const MISSING_BASE_URL_MESSAGE: &str = "Invalid URL. Please enter a valid base URL.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptChannel {
    /// Yes/no prompts that gate an action.
    Confirm,
    /// Single-button notices.
    Acknowledge,
}

/// Everything the shell can ask or tell the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Prompt {
    /// Offer to reopen the persisted site at startup.
    Restore { base_url: String, url_params: String },
    PolicyError,
    NetworkError,
    Rejected { message: String },
    LaunchFailure,
    /// Shown when auto-rotation is switched on; the device lock still wins.
    OrientationReminder,
    MissingBaseUrl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptView {
    pub title: &'static str,
    pub message: String,
    pub channel: PromptChannel,
    pub cancellable: bool,
}

impl Prompt {
    /// Map an open or launch failure to the prompt that reports it.
    ///
    /// Storage failures are never surfaced.
    pub fn for_error(error: &ShellError) -> Option<Self> {
        match error {
            ShellError::Network(_) => Some(Prompt::NetworkError),
            ShellError::ValidationRejected { message } => Some(Prompt::Rejected {
                message: message.clone(),
            }),
            ShellError::PolicyRejected => Some(Prompt::PolicyError),
            ShellError::ExternalLaunch { .. } => Some(Prompt::LaunchFailure),
            ShellError::Storage { .. } => None,
        }
    }

    pub fn channel(&self) -> PromptChannel {
        match self {
            Prompt::Restore { .. } => PromptChannel::Confirm,
            _ => PromptChannel::Acknowledge,
        }
    }

    pub fn is_cancellable(&self) -> bool {
        self.channel() == PromptChannel::Confirm
    }

    pub fn view(&self) -> PromptView {
        let (title, message) = match self {
            Prompt::Restore { .. } => (
                "Open Previous Website",
                "Do you want to open the previously saved website?".to_string(),
            ),
            Prompt::PolicyError => ("Error", ShellError::PolicyRejected.to_string()),
            Prompt::NetworkError => ("Error", NETWORK_ERROR_MESSAGE.to_string()),
            Prompt::Rejected { message } => ("Enable HTTPS", message.clone()),
            Prompt::LaunchFailure => ("Error", LAUNCH_FAILURE_MESSAGE.to_string()),
            Prompt::OrientationReminder => (
                "Lock Orientation Mode",
                "To use auto rotation, turn off the orientation lock in your device settings."
                    .to_string(),
            ),
            Prompt::MissingBaseUrl => ("Error", MISSING_BASE_URL_MESSAGE.to_string()),
        };
        PromptView {
            title,
            message,
            channel: self.channel(),
            cancellable: self.is_cancellable(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptResponse {
    Confirmed,
    Cancelled,
}

/// Holds at most one unresolved prompt per channel.
#[derive(Debug, Default)]
pub struct PromptCoordinator {
    confirm: Option<Prompt>,
    acknowledge: Option<Prompt>,
}

impl PromptCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a prompt, replacing whatever was pending on its channel.
    pub fn show(&mut self, prompt: Prompt) -> Option<Prompt> {
        let slot = self.slot_mut(prompt.channel());
        let replaced = slot.replace(prompt);
        if let Some(previous) = &replaced {
            debug!(?previous, "replaced unresolved prompt");
        }
        replaced
    }

    pub fn active(&self, channel: PromptChannel) -> Option<&Prompt> {
        match channel {
            PromptChannel::Confirm => self.confirm.as_ref(),
            PromptChannel::Acknowledge => self.acknowledge.as_ref(),
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &Prompt> {
        self.confirm.iter().chain(self.acknowledge.iter())
    }

    pub fn is_idle(&self) -> bool {
        self.confirm.is_none() && self.acknowledge.is_none()
    }

    /// Close the prompt on `channel`. Acknowledge-only prompts treat any
    /// response as a confirmation.
    pub fn resolve(
        &mut self,
        channel: PromptChannel,
        response: PromptResponse,
    ) -> Option<(Prompt, PromptResponse)> {
        let prompt = self.slot_mut(channel).take()?;
        let response = if prompt.is_cancellable() {
            response
        } else {
            PromptResponse::Confirmed
        };
        Some((prompt, response))
    }

    pub fn clear(&mut self) {
        self.confirm = None;
        self.acknowledge = None;
    }

    fn slot_mut(&mut self, channel: PromptChannel) -> &mut Option<Prompt> {
        match channel {
            PromptChannel::Confirm => &mut self.confirm,
            PromptChannel::Acknowledge => &mut self.acknowledge,
        }
    }
}
