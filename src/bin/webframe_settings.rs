use std::{path::PathBuf, process};

use anyhow::Result;
use clap::Parser;
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};
use serde_json::json;
use webframe::{
    Shell,
    config::{ShellSettings, TraceSettings, ValidatorSettings, default_config_path},
    preferences::UserPreferences,
    prompt::{PromptChannel, PromptResponse},
    store::FileSettingsStore,
    theme::Theme,
};

type SettingsResult<T> = Result<T>;

#[derive(Parser, Debug)]
#[command(
    name = "webframe-settings",
    about = "Interactive webframe preferences editor",
    version
)]
struct SettingsCli {
    /// Optional configuration file override.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print current settings and preferences in JSON and exit.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    print: bool,

    /// Wipe stored preferences and exit.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    clear: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("webframe-settings: {err:?}");
        process::exit(1);
    }
}

fn run() -> SettingsResult<()> {
    let args = SettingsCli::parse();
    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut settings = ShellSettings::load_or_default(&config_path)?;
    let store = FileSettingsStore::new(settings.resolve_settings_store()?);
    let mut shell = Shell::new(settings.clone(), store);

    if args.print {
        let snapshot = json!({
            "config": settings,
            "preferences": shell.preferences(),
            "store": shell.store().path(),
        });
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    if args.clear {
        shell.clear_storage();
        println!("Preferences cleared from {}", shell.store().path().display());
        return Ok(());
    }

    let theme = ColorfulTheme::default();
    let mut edited = shell.preferences().clone();

    edit_url(&theme, &mut edited);
    edit_switches(&theme, &mut edited);
    edit_theme(&theme, &mut edited);
    edit_validator(&theme, &mut settings.validator);
    edit_traces(&theme, &mut settings.telemetry.traces);

    println!("\nReview:");
    println!("  base_url        : {}", edited.base_url);
    println!("  url_params      : {}", edited.url_params);
    println!("  full_screen     : {}", edited.full_screen);
    println!("  auto_rotation   : {}", edited.auto_rotation_enabled);
    println!("  https_required  : {}", edited.https_required);
    println!("  theme           : {}", edited.theme);
    println!("  validator.endpoint: {}", settings.validator.endpoint);
    println!("  traces.enabled  : {}", settings.telemetry.traces.enabled);

    if !Confirm::with_theme(&theme)
        .with_prompt("Save changes?")
        .default(true)
        .interact()?
    {
        println!("Changes discarded.");
        return Ok(());
    }

    apply_preferences(&mut shell, &edited);
    settings.save(&config_path)?;

    println!("Settings saved to {}", config_path.display());
    println!("Preferences saved to {}", shell.store().path().display());
    Ok(())
}

fn apply_preferences(shell: &mut Shell<FileSettingsStore>, edited: &UserPreferences) {
    let current = shell.preferences().clone();
    if current.base_url != edited.base_url {
        shell.set_base_url(edited.base_url.clone());
    }
    if current.url_params != edited.url_params {
        shell.set_url_params(edited.url_params.clone());
    }
    if current.full_screen != edited.full_screen {
        shell.set_full_screen(edited.full_screen);
    }
    if current.https_required != edited.https_required {
        shell.set_https_required(edited.https_required);
    }
    if current.theme != edited.theme {
        shell.toggle_theme();
    }
    if current.auto_rotation_enabled != edited.auto_rotation_enabled {
        shell.set_auto_rotation(edited.auto_rotation_enabled);
        if let Some(prompt) = shell.prompts().active(PromptChannel::Acknowledge) {
            let view = prompt.view();
            println!("{}: {}", view.title, view.message);
            shell.respond_to_prompt(PromptChannel::Acknowledge, PromptResponse::Confirmed);
        }
    }
}

fn edit_url(theme: &ColorfulTheme, prefs: &mut UserPreferences) {
    if let Ok(value) = Input::<String>::with_theme(theme)
        .with_prompt("Base URL")
        .allow_empty(true)
        .with_initial_text(prefs.base_url.clone())
        .interact_text()
    {
        prefs.base_url = value.trim().to_string();
    }

    // Parameters are kept verbatim, including surrounding whitespace.
    if let Ok(value) = Input::<String>::with_theme(theme)
        .with_prompt("URL parameters (appended as typed)")
        .allow_empty(true)
        .with_initial_text(prefs.url_params.clone())
        .interact_text()
    {
        prefs.url_params = value;
    }
}

fn edit_switches(theme: &ColorfulTheme, prefs: &mut UserPreferences) {
    if let Ok(enabled) = Confirm::with_theme(theme)
        .with_prompt("Full screen (hide header)?")
        .default(prefs.full_screen)
        .interact()
    {
        prefs.full_screen = enabled;
    }
    if let Ok(enabled) = Confirm::with_theme(theme)
        .with_prompt("Allow auto rotation?")
        .default(prefs.auto_rotation_enabled)
        .interact()
    {
        prefs.auto_rotation_enabled = enabled;
    }
    if let Ok(required) = Confirm::with_theme(theme)
        .with_prompt("Require HTTPS?")
        .default(prefs.https_required)
        .interact()
    {
        prefs.https_required = required;
    }
}

fn edit_theme(theme: &ColorfulTheme, prefs: &mut UserPreferences) {
    let themes = [Theme::Light, Theme::Dark];
    let default_index = themes
        .iter()
        .position(|candidate| *candidate == prefs.theme)
        .unwrap_or(0);
    if let Ok(selection) = Select::with_theme(theme)
        .with_prompt("Theme")
        .items(&["light", "dark"])
        .default(default_index)
        .interact()
    {
        prefs.theme = themes[selection];
    }
}

fn edit_validator(theme: &ColorfulTheme, validator: &mut ValidatorSettings) {
    if let Ok(value) = Input::<String>::with_theme(theme)
        .with_prompt("Validation endpoint")
        .with_initial_text(validator.endpoint.clone())
        .interact_text()
    {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            validator.endpoint = trimmed.to_string();
        }
    }
}

fn edit_traces(theme: &ColorfulTheme, traces: &mut TraceSettings) {
    if let Ok(enabled) = Confirm::with_theme(theme)
        .with_prompt("Enable JSON trace capture?")
        .default(traces.enabled)
        .interact()
    {
        traces.enabled = enabled;
    }

    if !traces.enabled {
        return;
    }

    let current_dir = traces
        .directory
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_default();
    if let Ok(value) = Input::<String>::with_theme(theme)
        .with_prompt("Trace output directory (leave blank for default)")
        .allow_empty(true)
        .with_initial_text(current_dir)
        .interact_text()
    {
        let trimmed = value.trim();
        traces.directory = if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        };
    }

    if let Ok(value) = Input::<usize>::with_theme(theme)
        .with_prompt("Maximum trace files to retain (0 = unlimited)")
        .default(traces.max_files)
        .interact_text()
    {
        traces.max_files = value;
    }
}
