use std::{path::PathBuf, time::Duration};

use crate::{
    OpenOutcome, Shell, ValidationTicket,
    config::{ShellSettings, default_config_path},
    error::ShellError,
    platform::{HeadlessDisplay, Orientation, SystemBrowser},
    policy::SessionConfig,
    prompt::{PromptChannel, PromptResponse},
    session::SessionController,
    store::{FileSettingsStore, SettingsStore},
    telemetry,
    validator::{UrlValidator, ValidationResult},
};
use anyhow::Result;
use clap::{ArgAction, Parser};
use tokio::task::JoinError;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "webframe", version, about = "Validate a website and open it in a framed browser session", long_about = None)]
pub struct Cli {
    /// Base URL to open; stored as the new default.
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Query parameters appended verbatim to the validated URL.
    #[arg(long, value_name = "PARAMS")]
    pub params: Option<String>,

    /// Hide the header chrome for the session.
    #[arg(long, value_name = "BOOL")]
    pub full_screen: Option<bool>,

    /// Let the session rotate freely instead of locking portrait.
    #[arg(long, value_name = "BOOL")]
    pub auto_rotation: Option<bool>,

    /// Refuse sites without HTTPS support.
    #[arg(long, value_name = "BOOL")]
    pub https_required: Option<bool>,

    /// Accept the startup offer to reopen the previous website.
    #[arg(long, action = ArgAction::SetTrue)]
    pub restore: bool,

    /// Open the URL in the system browser without validation.
    #[arg(long, action = ArgAction::SetTrue)]
    pub external: bool,

    /// Print the resolved session as JSON.
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Run a headless session for SECS seconds after a successful open.
    #[arg(long, value_name = "SECS")]
    pub simulate: Option<u64>,

    /// Print trace capture state and exit.
    #[arg(long, action = ArgAction::SetTrue)]
    pub trace_report: bool,

    /// Increase logging verbosity.
    #[arg(long, action = ArgAction::SetTrue)]
    pub verbose: bool,

    /// Custom config path.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

fn resolve_config_path(override_path: Option<PathBuf>) -> Result<PathBuf> {
    match override_path {
        Some(path) => Ok(path),
        None => default_config_path(),
    }
}

fn apply_overrides<S: SettingsStore>(shell: &mut Shell<S>, cli: &Cli) {
    if let Some(enabled) = cli.full_screen {
        shell.set_full_screen(enabled);
    }
    if let Some(enabled) = cli.auto_rotation {
        shell.set_auto_rotation(enabled);
    }
    if let Some(required) = cli.https_required {
        shell.set_https_required(required);
    }
    if let Some(params) = &cli.params {
        shell.set_url_params(params.clone());
    }
}

/// Print and acknowledge the pending notice, if any. Confirm prompts are left alone.
fn drain_notices<S: SettingsStore>(shell: &mut Shell<S>) {
    if let Some(prompt) = shell.prompts().active(PromptChannel::Acknowledge) {
        let view = prompt.view();
        eprintln!("{}: {}", view.title, view.message);
        shell.respond_to_prompt(PromptChannel::Acknowledge, PromptResponse::Confirmed);
    }
}

fn start_attempt<S: SettingsStore>(shell: &mut Shell<S>, cli: &Cli) -> Option<ValidationTicket> {
    if shell.prompts().active(PromptChannel::Confirm).is_some() {
        let response = if cli.restore && cli.url.is_none() {
            PromptResponse::Confirmed
        } else {
            PromptResponse::Cancelled
        };
        debug!(?response, "answering restore prompt");
        if let Some(ticket) = shell.respond_to_prompt(PromptChannel::Confirm, response) {
            return Some(ticket);
        }
    }

    match &cli.url {
        Some(url) => {
            let params = shell.preferences().url_params.clone();
            shell.begin_open_with(url.clone(), params)
        }
        None => shell.begin_open(),
    }
}

/// Every way the validation task can fail ends the attempt as a network error,
/// so the shell always clears its busy flag and shows a prompt.
fn settle_validation(
    joined: Result<Result<Result<ValidationResult, ShellError>>, JoinError>,
) -> Result<ValidationResult, ShellError> {
    match joined {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => Err(ShellError::Network(
            err.context("failed to build validation client"),
        )),
        Err(err) => Err(ShellError::Network(
            anyhow::Error::new(err).context("validation task failed"),
        )),
    }
}

async fn simulate_session(config: SessionConfig, settings: &ShellSettings, seconds: u64) {
    let display = HeadlessDisplay::new(Orientation::PortraitUp);
    let start = tokio::time::Instant::now();
    let mut session = SessionController::enter(config, settings, display, start.into_std());
    info!(
        session = %session.id(),
        user_agent = %session.user_agent("webframe-headless"),
        "headless session running"
    );

    let deadline = start + Duration::from_secs(seconds);
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    loop {
        let now = ticker.tick().await;
        if now >= deadline {
            break;
        }
        if let Some(visibility) = session.tick(now.into_std()) {
            info!(
                ?visibility,
                offset = session.affordance().offset(),
                "home control changed"
            );
        }
    }

    session.return_home();
    info!(calls = session.platform().calls().len(), "headless session finished");
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.clone())?;
    let settings = ShellSettings::load_or_default(&config_path)?;
    telemetry::init_tracing("webframe", cli.verbose, &settings.telemetry.traces)?;
    info!(path = %config_path.display(), "using shell config");
    if let Some(trace) = telemetry::current_trace_file() {
        info!(path = %trace.display(), "capturing JSON traces");
    }

    if cli.trace_report {
        let report = telemetry::trace_report(&settings.telemetry.traces)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let store = FileSettingsStore::new(settings.resolve_settings_store()?);
    let mut shell = Shell::bootstrap(settings, store);
    apply_overrides(&mut shell, &cli);
    drain_notices(&mut shell);

    if cli.external {
        if let Some(url) = &cli.url {
            shell.set_base_url(url.clone());
        }
        shell.open_externally(&SystemBrowser);
        drain_notices(&mut shell);
        return Ok(());
    }

    let Some(ticket) = start_attempt(&mut shell, &cli) else {
        drain_notices(&mut shell);
        return Ok(());
    };

    // The blocking client owns its own runtime; build and drop it off the event loop.
    let validator_settings = shell.settings().validator.clone();
    let request = ticket.request().clone();
    let joined = tokio::task::spawn_blocking(move || {
        UrlValidator::from_settings(&validator_settings).map(|validator| validator.submit(&request))
    })
    .await;
    let result = settle_validation(joined);

    match shell.complete_validation(&ticket, result) {
        OpenOutcome::Navigate(config) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("{}", config.target_url);
            }
            if let Some(seconds) = cli.simulate {
                simulate_session(config, shell.settings(), seconds).await;
            }
        }
        OpenOutcome::Prompted(_) => drain_notices(&mut shell),
        OpenOutcome::Stale => debug!("validation result arrived after the attempt ended"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{prompt::Prompt, store::MemorySettingsStore};

    fn shell() -> Shell<MemorySettingsStore> {
        Shell::bootstrap(ShellSettings::default(), MemorySettingsStore::new())
    }

    #[test]
    fn client_build_failure_ends_the_attempt() {
        let mut shell = shell();
        let ticket = shell.begin_open().unwrap();
        let result = settle_validation(Ok(Err(anyhow::anyhow!("no TLS backend"))));
        assert!(matches!(result, Err(ShellError::Network(_))));

        let outcome = shell.complete_validation(&ticket, result);
        assert_eq!(outcome, OpenOutcome::Prompted(Prompt::NetworkError));
        assert!(!shell.is_busy());
        assert!(shell.begin_open().is_some());
    }

    #[tokio::test]
    async fn panicked_validation_task_ends_the_attempt() {
        let mut shell = shell();
        let ticket = shell.begin_open().unwrap();
        let joined = tokio::task::spawn_blocking(|| -> Result<Result<ValidationResult, ShellError>> {
            panic!("validator crashed")
        })
        .await;
        let result = settle_validation(joined);
        assert!(matches!(result, Err(ShellError::Network(_))));

        shell.complete_validation(&ticket, result);
        assert!(!shell.is_busy());
        assert_eq!(
            shell.prompts().active(PromptChannel::Acknowledge),
            Some(&Prompt::NetworkError)
        );
    }

    #[test]
    fn successful_task_passes_the_result_through() {
        let response = ValidationResult {
            status: crate::validator::ValidationStatus::Ok,
            canonical_url: "https://example.org/".into(),
            https_supported: true,
            error_message: None,
        };
        let settled = settle_validation(Ok(Ok(Ok(response.clone())))).unwrap();
        assert_eq!(settled, response);
    }
}
