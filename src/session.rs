use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::affordance::{Affordance, AffordanceVisibility};
use crate::config::{SessionTimingSettings, ShellSettings};
use crate::interceptor::{Interception, NavigationInterceptor};
use crate::platform::{BrowserSurface, DisplayPlatform, ExternalLauncher, Orientation};
use crate::policy::SessionConfig;
use crate::theme::StatusStyle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionPhase {
    Initializing,
    OrientationLocked,
    OrientationFree,
    Exiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitReason {
    /// The floating home control was pressed.
    ReturnHome,
    /// The host popped the session (back gesture, navigation stack).
    HostNavigation,
    Dropped,
}

/// Where a back request was routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackAction {
    BrowserHistory,
    ExitSession,
}

/// Owns the embedded browser session: orientation policy, chrome, the home
/// affordance and navigation interception. Sole mutator of the display
/// platform while alive; restores platform defaults on exit or drop.
pub struct SessionController<P: DisplayPlatform> {
    id: Uuid,
    config: SessionConfig,
    timing: SessionTimingSettings,
    phase: SessionPhase,
    orientation: Orientation,
    chrome_hidden: Option<bool>,
    affordance: Affordance,
    relock_at: Option<Instant>,
    can_go_back: bool,
    interceptor: NavigationInterceptor,
    user_agent_suffix: String,
    exit_reason: Option<ExitReason>,
    platform: P,
}

impl<P: DisplayPlatform> SessionController<P> {
    pub fn enter(config: SessionConfig, settings: &ShellSettings, platform: P, now: Instant) -> Self {
        let timing = settings.session;
        let mut controller = Self {
            id: Uuid::new_v4(),
            affordance: Affordance::new(&timing, true, now),
            config,
            timing,
            phase: SessionPhase::Initializing,
            orientation: Orientation::PortraitUp,
            chrome_hidden: None,
            relock_at: None,
            can_go_back: false,
            interceptor: NavigationInterceptor::from_settings(&settings.navigation),
            user_agent_suffix: settings.navigation.user_agent_suffix.clone(),
            exit_reason: None,
            platform,
        };
        controller.initialize(now);
        controller
    }

    fn initialize(&mut self, now: Instant) {
        info!(
            session = %self.id,
            url = %self.config.target_url,
            chrome_visible = self.config.chrome_visible,
            auto_rotation = self.config.auto_rotation_enabled,
            "entering session"
        );

        if self.config.auto_rotation_enabled {
            if let Err(err) = self.platform.unlock_orientation() {
                warn!(session = %self.id, error = %err, "failed to release orientation lock");
            }
            self.phase = SessionPhase::OrientationFree;
        } else {
            self.lock_portrait();
            // Some platforms let one frame of rotation through right after a
            // lock call, so the lock is issued once more after a short delay.
            self.relock_at = Some(now + self.timing.relock_delay());
            self.phase = SessionPhase::OrientationLocked;
        }

        self.orientation = match self.platform.current_orientation() {
            Ok(orientation) => orientation,
            Err(err) => {
                warn!(session = %self.id, error = %err, "orientation query failed; assuming portrait");
                Orientation::PortraitUp
            }
        };
        self.platform.set_status_style(StatusStyle::LightContent);
        self.reconcile_chrome();
        self.affordance = Affordance::new(&self.timing, self.orientation.is_portrait(), now);
    }

    fn lock_portrait(&mut self) {
        if let Err(err) = self.platform.lock_portrait() {
            warn!(session = %self.id, error = %err, "failed to lock portrait orientation");
        }
    }

    fn reconcile_chrome(&mut self) {
        let hidden = !self.config.chrome_visible || !self.orientation.is_portrait();
        if self.chrome_hidden != Some(hidden) {
            self.platform.set_chrome_hidden(hidden);
            self.chrome_hidden = Some(hidden);
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase != SessionPhase::Exiting
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.exit_reason
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn chrome_hidden(&self) -> bool {
        self.chrome_hidden.unwrap_or(false)
    }

    pub fn affordance(&self) -> &Affordance {
        &self.affordance
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// User agent for the surface: its default plus the host suffix.
    pub fn user_agent(&self, default_user_agent: &str) -> String {
        format!("{default_user_agent}{}", self.user_agent_suffix)
    }

    /// Advance timers: the one-shot portrait re-lock and the affordance.
    pub fn tick(&mut self, now: Instant) -> Option<AffordanceVisibility> {
        if !self.is_active() {
            return None;
        }
        if let Some(at) = self.relock_at {
            if now >= at {
                self.relock_at = None;
                debug!(session = %self.id, "re-asserting portrait lock");
                self.lock_portrait();
            }
        }
        self.affordance.tick(now)
    }

    pub fn on_user_interaction(&mut self, now: Instant) -> Option<AffordanceVisibility> {
        if !self.is_active() {
            return None;
        }
        self.affordance.on_interaction(now)
    }

    pub fn on_orientation_change(
        &mut self,
        orientation: Orientation,
        now: Instant,
    ) -> Option<AffordanceVisibility> {
        if !self.is_active() {
            debug!(session = %self.id, ?orientation, "ignoring orientation change after exit");
            return None;
        }
        self.orientation = orientation;
        self.reconcile_chrome();
        self.affordance.on_orientation(orientation.is_portrait(), now)
    }

    pub fn on_slide_complete(&mut self) -> Option<AffordanceVisibility> {
        if !self.is_active() {
            return None;
        }
        self.affordance.on_slide_complete()
    }

    pub fn on_navigation_state(&mut self, can_go_back: bool) {
        self.can_go_back = can_go_back;
    }

    /// The host's swipe-back gesture competes with the page history, so it is
    /// only enabled when the page has nothing to go back to.
    pub fn back_gesture_enabled(&self) -> bool {
        !self.can_go_back
    }

    pub fn handle_back<B: BrowserSurface + ?Sized>(&mut self, surface: &mut B) -> BackAction {
        if self.can_go_back && self.is_active() {
            surface.go_back();
            return BackAction::BrowserHistory;
        }
        self.exit(ExitReason::HostNavigation);
        BackAction::ExitSession
    }

    /// Consulted before every load in the embedded surface.
    pub fn should_start_load<B, L>(
        &self,
        candidate_url: &str,
        surface: &mut B,
        launcher: &L,
    ) -> Interception
    where
        B: BrowserSurface + ?Sized,
        L: ExternalLauncher + ?Sized,
    {
        if !self.is_active() {
            debug!(session = %self.id, url = %candidate_url, "ignoring load request after exit");
            return Interception::Dropped;
        }
        self.interceptor.intercept(candidate_url, surface, launcher)
    }

    pub fn return_home(&mut self) {
        self.exit(ExitReason::ReturnHome);
    }

    /// Tear the session down and hand the platform back in its default state.
    pub fn exit(&mut self, reason: ExitReason) {
        if self.phase == SessionPhase::Exiting {
            return;
        }
        self.phase = SessionPhase::Exiting;
        self.exit_reason = Some(reason);
        self.relock_at = None;
        self.affordance.cancel();

        if let Err(err) = self.platform.restore_default_orientation() {
            warn!(session = %self.id, error = %err, "failed to restore default orientation");
        }
        self.platform.set_chrome_hidden(false);
        self.chrome_hidden = Some(false);
        info!(session = %self.id, ?reason, "session exited");
    }
}

impl<P: DisplayPlatform> Drop for SessionController<P> {
    fn drop(&mut self) {
        self.exit(ExitReason::Dropped);
    }
}
