use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::SessionTimingSettings;

/// Offset of the control when fully on screen.
pub const SHOWN_OFFSET: f32 = 0.0;
/// Offset that places the control past the surface edge.
pub const HIDDEN_OFFSET: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AffordanceVisibility {
    Visible,
    /// Slide toward `HIDDEN_OFFSET` in progress.
    Hiding,
    Hidden,
}

/// Visibility of the floating "return home" control.
///
/// Driven by three sources: user interaction, an inactivity deadline and the
/// device orientation. Outside portrait the control is always hidden.
#[derive(Debug, Clone)]
pub struct Affordance {
    visibility: AffordanceVisibility,
    portrait: bool,
    inactivity_timeout: Duration,
    slide_duration: Duration,
    deadline: Option<Instant>,
    slide_started: Option<Instant>,
    /// Touch seen while not in portrait; honoured on return to portrait.
    show_requested: bool,
}

impl Affordance {
    pub fn new(timing: &SessionTimingSettings, portrait: bool, now: Instant) -> Self {
        let inactivity_timeout = timing.inactivity_timeout();
        Self {
            visibility: if portrait {
                AffordanceVisibility::Visible
            } else {
                AffordanceVisibility::Hidden
            },
            portrait,
            inactivity_timeout,
            slide_duration: timing.slide_duration(),
            deadline: Some(now + inactivity_timeout),
            slide_started: None,
            show_requested: false,
        }
    }

    pub fn visibility(&self) -> AffordanceVisibility {
        self.visibility
    }

    /// Animation endpoint for the current state; never an intermediate value.
    pub fn offset(&self) -> f32 {
        match self.visibility {
            AffordanceVisibility::Visible => SHOWN_OFFSET,
            AffordanceVisibility::Hiding | AffordanceVisibility::Hidden => HIDDEN_OFFSET,
        }
    }

    pub fn is_rendered(&self) -> bool {
        self.portrait && self.visibility != AffordanceVisibility::Hidden
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn on_interaction(&mut self, now: Instant) -> Option<AffordanceVisibility> {
        self.deadline = Some(now + self.inactivity_timeout);
        if !self.portrait {
            self.show_requested = true;
            return None;
        }
        self.transition(AffordanceVisibility::Visible)
    }

    pub fn on_orientation(&mut self, portrait: bool, now: Instant) -> Option<AffordanceVisibility> {
        self.portrait = portrait;
        if !portrait {
            self.show_requested = false;
            return self.transition(AffordanceVisibility::Hidden);
        }
        let pending = std::mem::take(&mut self.show_requested);
        let timer_running = self.deadline.is_some_and(|deadline| deadline > now);
        if pending && timer_running {
            return self.transition(AffordanceVisibility::Visible);
        }
        None
    }

    /// Advance timers. Returns the new visibility when it changed.
    pub fn tick(&mut self, now: Instant) -> Option<AffordanceVisibility> {
        match self.visibility {
            AffordanceVisibility::Visible => {
                let expired = self.deadline.is_some_and(|deadline| now >= deadline);
                if expired {
                    self.deadline = None;
                    let changed = self.transition(AffordanceVisibility::Hiding);
                    self.slide_started = Some(now);
                    return changed;
                }
                None
            }
            AffordanceVisibility::Hiding => {
                let finished = self
                    .slide_started
                    .is_some_and(|started| now.saturating_duration_since(started) >= self.slide_duration);
                if finished {
                    return self.transition(AffordanceVisibility::Hidden);
                }
                None
            }
            AffordanceVisibility::Hidden => None,
        }
    }

    /// Host reports the hide slide finished. Ignored unless a hide is running.
    pub fn on_slide_complete(&mut self) -> Option<AffordanceVisibility> {
        if self.visibility == AffordanceVisibility::Hiding {
            return self.transition(AffordanceVisibility::Hidden);
        }
        None
    }

    /// Stop the timer and any slide in progress.
    pub fn cancel(&mut self) {
        self.deadline = None;
        self.show_requested = false;
        if self.visibility == AffordanceVisibility::Hiding {
            self.visibility = AffordanceVisibility::Hidden;
        }
        self.slide_started = None;
    }

    fn transition(&mut self, next: AffordanceVisibility) -> Option<AffordanceVisibility> {
        if self.visibility == next {
            return None;
        }
        if next != AffordanceVisibility::Hiding {
            self.slide_started = None;
        }
        self.visibility = next;
        Some(next)
    }
}
