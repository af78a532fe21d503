use thiserror::Error;

pub const DEFAULT_REJECTION_MESSAGE: &str = "Invalid URL.";
pub const POLICY_REJECTION_MESSAGE: &str = "The URL is not HTTPS-compliant.";

/// Failures the shell turns into user-facing prompts.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The validation request could not complete.
    #[error("failed to validate the URL: {0:#}")]
    Network(anyhow::Error),

    /// The compliance service marked the URL invalid.
    #[error("{message}")]
    ValidationRejected { message: String },

    /// The URL is valid but the site does not support HTTPS while it is required.
    #[error("{}", POLICY_REJECTION_MESSAGE)]
    PolicyRejected,

    #[error("failed to open {url} in the system browser: {source:#}")]
    ExternalLaunch {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    /// Persisted settings could not be read or written.
    #[error("settings storage failed for key {key}: {source:#}")]
    Storage {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ShellError {
    pub fn rejected(message: Option<&str>) -> Self {
        let message = message
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .unwrap_or(DEFAULT_REJECTION_MESSAGE);
        ShellError::ValidationRejected {
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ShellError::Network(_) => "network",
            ShellError::ValidationRejected { .. } => "validation-rejected",
            ShellError::PolicyRejected => "policy-rejected",
            ShellError::ExternalLaunch { .. } => "external-launch",
            ShellError::Storage { .. } => "storage",
        }
    }
}
