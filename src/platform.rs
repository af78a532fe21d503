//! Seams to the host platform: orientation and chrome control, the embedded
//! browser surface and the system browser.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::theme::StatusStyle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    PortraitUp,
    PortraitDown,
    LandscapeLeft,
    LandscapeRight,
    Unknown,
}

impl Orientation {
    pub fn is_portrait(self) -> bool {
        matches!(self, Orientation::PortraitUp | Orientation::PortraitDown)
    }
}

/// Orientation lock currently requested from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrientationLock {
    /// Platform default, as if nothing had been requested.
    Default,
    PortraitUp,
    Unlocked,
}

/// Orientation and chrome controls owned by the active session.
pub trait DisplayPlatform {
    fn lock_portrait(&mut self) -> Result<()>;
    fn unlock_orientation(&mut self) -> Result<()>;
    fn restore_default_orientation(&mut self) -> Result<()>;
    fn current_orientation(&self) -> Result<Orientation>;
    fn set_chrome_hidden(&mut self, hidden: bool);
    fn set_status_style(&mut self, style: StatusStyle);
}

/// The embedded browser widget.
pub trait BrowserSurface {
    fn stop_loading(&mut self);
    fn reload(&mut self);
    fn go_back(&mut self);
}

/// Fire-and-forget hand-off to the system browser.
pub trait ExternalLauncher {
    fn open_url(&self, url: &str) -> Result<()>;
}

/// Opens URLs with the desktop's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl ExternalLauncher for SystemBrowser {
    fn open_url(&self, url: &str) -> Result<()> {
        webbrowser::open(url).with_context(|| format!("Failed to open {url} in system browser"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "kebab-case")]
pub enum DisplayCall {
    LockPortrait,
    UnlockOrientation,
    RestoreDefaultOrientation,
    SetChromeHidden { hidden: bool },
    SetStatusStyle { style: StatusStyle },
}

/// Display platform without a screen: tracks requested state and logs it.
#[derive(Debug, Clone)]
pub struct HeadlessDisplay {
    orientation: Orientation,
    lock: OrientationLock,
    chrome_hidden: bool,
    status_style: Option<StatusStyle>,
    calls: Vec<DisplayCall>,
}

impl HeadlessDisplay {
    pub fn new(orientation: Orientation) -> Self {
        Self {
            orientation,
            lock: OrientationLock::Default,
            chrome_hidden: false,
            status_style: None,
            calls: Vec::new(),
        }
    }

    /// Simulate the device turning. A portrait lock keeps the device upright.
    pub fn rotate(&mut self, orientation: Orientation) -> Orientation {
        if self.lock != OrientationLock::PortraitUp {
            self.orientation = orientation;
        }
        self.orientation
    }

    pub fn lock(&self) -> OrientationLock {
        self.lock
    }

    pub fn chrome_hidden(&self) -> bool {
        self.chrome_hidden
    }

    pub fn status_style(&self) -> Option<StatusStyle> {
        self.status_style
    }

    pub fn calls(&self) -> &[DisplayCall] {
        &self.calls
    }

    fn record(&mut self, call: DisplayCall) {
        debug!(?call, "display platform call");
        self.calls.push(call);
    }
}

impl DisplayPlatform for HeadlessDisplay {
    fn lock_portrait(&mut self) -> Result<()> {
        self.record(DisplayCall::LockPortrait);
        self.lock = OrientationLock::PortraitUp;
        self.orientation = Orientation::PortraitUp;
        Ok(())
    }

    fn unlock_orientation(&mut self) -> Result<()> {
        self.record(DisplayCall::UnlockOrientation);
        self.lock = OrientationLock::Unlocked;
        Ok(())
    }

    fn restore_default_orientation(&mut self) -> Result<()> {
        self.record(DisplayCall::RestoreDefaultOrientation);
        self.lock = OrientationLock::Default;
        Ok(())
    }

    fn current_orientation(&self) -> Result<Orientation> {
        Ok(self.orientation)
    }

    fn set_chrome_hidden(&mut self, hidden: bool) {
        self.record(DisplayCall::SetChromeHidden { hidden });
        self.chrome_hidden = hidden;
    }

    fn set_status_style(&mut self, style: StatusStyle) {
        self.record(DisplayCall::SetStatusStyle { style });
        self.status_style = Some(style);
    }
}
