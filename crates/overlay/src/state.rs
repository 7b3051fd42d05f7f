//! Pure per-monitor state tracking: capture recovery, two-phase overlay
//! visibility, LUT applicability, and the device-health cadence.
//!
//! Nothing here touches the OS. The session and engine drive these types
//! and perform the window/GPU side effects the returned actions call for.

use std::time::Duration;

use crate::pacing::{retry_backoff, DEVICE_HEALTH_INTERVAL_FRAMES, REVEAL_DELAY_FRAMES};

/// Capture lifecycle for one monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Duplication is alive and frames are expected.
    Active,
    /// Duplication is gone; every pass sleeps the backoff then retries.
    Backoff { failures: u32 },
}

/// Overlay window visibility phases. The window only becomes visible one
/// frame after the composition commit, so the first presented frame is
/// already on screen when alpha goes opaque and no black flash shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Hidden,
    /// Composition committed; counting frames until the reveal.
    Committed { frames_after_commit: u32 },
    Shown,
}

/// Window-side effect requested by a visibility transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityAction {
    None,
    /// Flush the context and commit the composition tree; keep alpha 0.
    Commit,
    /// Set alpha opaque and show the window without activating it.
    Show,
}

/// Which LUT the kernel may apply for a mode. SDR LUTs expect sRGB input
/// and HDR LUTs expect PQ Rec.2020; they are never interchangeable, so a
/// missing LUT for the current mode means passthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LutChoice {
    Sdr,
    Hdr,
    Passthrough,
}

pub fn lut_for_mode(hdr: bool, has_sdr_lut: bool, has_hdr_lut: bool) -> LutChoice {
    if hdr {
        if has_hdr_lut {
            LutChoice::Hdr
        } else {
            LutChoice::Passthrough
        }
    } else if has_sdr_lut {
        LutChoice::Sdr
    } else {
        LutChoice::Passthrough
    }
}

#[derive(Debug, Clone)]
pub struct MonitorFlow {
    state: CaptureState,
    visibility: Visibility,
}

impl MonitorFlow {
    /// Starts in backoff; the first successful duplication init moves to
    /// `Active`.
    pub fn new() -> Self {
        Self {
            state: CaptureState::Backoff { failures: 0 },
            visibility: Visibility::Hidden,
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_active(&self) -> bool {
        self.state == CaptureState::Active
    }

    pub fn failures(&self) -> u32 {
        match self.state {
            CaptureState::Backoff { failures } => failures,
            CaptureState::Active => 0,
        }
    }

    /// Capture lost or init failed. The window hides, the failure count
    /// advances, and the caller sleeps the returned delay before reinit.
    pub fn on_capture_lost(&mut self) -> Duration {
        self.visibility = Visibility::Hidden;
        self.next_retry()
    }

    /// One more retry pass without touching visibility. A forced reinit
    /// keeps the overlay on screen while duplication rebuilds underneath.
    pub fn next_retry(&mut self) -> Duration {
        let failures = match self.state {
            CaptureState::Backoff { failures } => failures.saturating_add(1),
            CaptureState::Active => 1,
        };
        self.state = CaptureState::Backoff { failures };
        retry_backoff(failures)
    }

    /// Capture dropped wholesale (power resume, forced refresh). Retries
    /// start from the fast end of the ladder.
    pub fn restart_capture(&mut self) {
        self.state = CaptureState::Backoff { failures: 0 };
    }

    /// Duplication rebuilt. Failures reset; visibility stays hidden so the
    /// two-phase reveal restarts from the next presented frame.
    pub fn on_reinit_success(&mut self) {
        self.state = CaptureState::Active;
    }

    /// A frame was presented. Returns the window action for this phase.
    pub fn on_present(&mut self) -> VisibilityAction {
        match self.visibility {
            Visibility::Hidden => {
                self.visibility = Visibility::Committed {
                    frames_after_commit: 0,
                };
                VisibilityAction::Commit
            }
            Visibility::Committed {
                frames_after_commit,
            } => self.advance_reveal(frames_after_commit),
            Visibility::Shown => VisibilityAction::None,
        }
    }

    /// Clean acquire timeout. Never commits, but a pending reveal still
    /// advances so a static desktop does not keep the overlay invisible.
    pub fn on_timeout(&mut self) -> VisibilityAction {
        match self.visibility {
            Visibility::Committed {
                frames_after_commit,
            } => self.advance_reveal(frames_after_commit),
            _ => VisibilityAction::None,
        }
    }

    fn advance_reveal(&mut self, frames_after_commit: u32) -> VisibilityAction {
        let frames = frames_after_commit + 1;
        if frames >= REVEAL_DELAY_FRAMES {
            self.visibility = Visibility::Shown;
            VisibilityAction::Show
        } else {
            self.visibility = Visibility::Committed {
                frames_after_commit: frames,
            };
            VisibilityAction::None
        }
    }

    /// External hide (mode flip, device recovery, display off). Both
    /// visibility phases restart afterwards.
    pub fn hide(&mut self) {
        self.visibility = Visibility::Hidden;
    }
}

impl Default for MonitorFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine-level cadence for the device-removed poll; the driver query has
/// measurable cost, so it runs once per `DEVICE_HEALTH_INTERVAL_FRAMES`
/// loop iterations.
#[derive(Debug, Default)]
pub struct HealthCadence {
    counter: u64,
}

impl HealthCadence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one loop iteration; true when the health check is due.
    pub fn tick(&mut self) -> bool {
        self.counter += 1;
        if self.counter >= DEVICE_HEALTH_INTERVAL_FRAMES {
            self.counter = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_losses_escalate_and_success_resets() {
        let mut flow = MonitorFlow::new();
        flow.on_reinit_success();
        assert!(flow.is_active());

        assert_eq!(flow.on_capture_lost(), Duration::from_millis(50));
        assert_eq!(flow.on_capture_lost(), Duration::from_millis(100));
        assert_eq!(flow.on_capture_lost(), Duration::from_millis(200));
        assert_eq!(flow.failures(), 3);

        flow.on_reinit_success();
        assert!(flow.is_active());
        assert_eq!(flow.failures(), 0);
        // The next loss starts the ladder over.
        assert_eq!(flow.on_capture_lost(), Duration::from_millis(50));
    }

    #[test]
    fn forced_restart_keeps_visibility_and_resets_the_ladder() {
        let mut flow = MonitorFlow::new();
        flow.on_reinit_success();
        assert_eq!(flow.on_present(), VisibilityAction::Commit);
        assert_eq!(flow.on_present(), VisibilityAction::Show);

        flow.restart_capture();
        assert!(!flow.is_active());
        // The overlay stays on screen while duplication rebuilds.
        assert_eq!(flow.visibility(), Visibility::Shown);
        assert_eq!(flow.next_retry(), Duration::from_millis(50));
        assert_eq!(flow.visibility(), Visibility::Shown);

        flow.on_reinit_success();
        assert_eq!(flow.on_present(), VisibilityAction::None);
    }

    #[test]
    fn reveal_takes_commit_then_show_one_frame_apart() {
        let mut flow = MonitorFlow::new();
        flow.on_reinit_success();

        assert_eq!(flow.on_present(), VisibilityAction::Commit);
        assert_eq!(flow.on_present(), VisibilityAction::Show);
        assert_eq!(flow.visibility(), Visibility::Shown);
        assert_eq!(flow.on_present(), VisibilityAction::None);
    }

    #[test]
    fn timeout_advances_a_pending_reveal_but_never_commits() {
        let mut flow = MonitorFlow::new();
        flow.on_reinit_success();

        // Static desktop before the first frame: nothing to commit yet.
        assert_eq!(flow.on_timeout(), VisibilityAction::None);
        assert_eq!(flow.visibility(), Visibility::Hidden);

        assert_eq!(flow.on_present(), VisibilityAction::Commit);
        // Desktop goes static right after the first frame; the reveal must
        // still happen.
        assert_eq!(flow.on_timeout(), VisibilityAction::Show);
    }

    #[test]
    fn loss_after_reveal_restarts_both_phases() {
        let mut flow = MonitorFlow::new();
        flow.on_reinit_success();
        flow.on_present();
        flow.on_present();
        assert_eq!(flow.visibility(), Visibility::Shown);

        flow.on_capture_lost();
        assert_eq!(flow.visibility(), Visibility::Hidden);
        flow.on_reinit_success();
        assert_eq!(flow.on_present(), VisibilityAction::Commit);
        assert_eq!(flow.on_present(), VisibilityAction::Show);
    }

    #[test]
    fn lut_choice_never_crosses_modes() {
        assert_eq!(lut_for_mode(false, true, true), LutChoice::Sdr);
        assert_eq!(lut_for_mode(true, true, true), LutChoice::Hdr);
        assert_eq!(lut_for_mode(false, false, true), LutChoice::Passthrough);
        // HDR flip with only an SDR LUT loaded: passthrough, never sRGB
        // math on PQ pixels.
        assert_eq!(lut_for_mode(true, true, false), LutChoice::Passthrough);
        assert_eq!(lut_for_mode(false, false, false), LutChoice::Passthrough);
    }

    #[test]
    fn health_check_fires_every_sixtieth_iteration() {
        let mut cadence = HealthCadence::new();
        let mut fired = Vec::new();
        for i in 1..=180u64 {
            if cadence.tick() {
                fired.push(i);
            }
        }
        assert_eq!(fired, vec![60, 120, 180]);
    }
}
