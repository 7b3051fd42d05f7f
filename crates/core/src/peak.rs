//! Dynamic peak detection parameters and the temporal smoothing step.
//!
//! The GPU kernel reduces a sparse 64x64 luminance grid to a frame peak,
//! then thread 0 folds it into the running peak with exponential smoothing
//! plus a slew limit. [`smooth_peak`] is the exact CPU mirror of that fold.

use std::time::Duration;

/// Square sampling grid edge; 64 x 64 = 4096 points per frame.
pub const SAMPLE_GRID: u32 = 64;

/// Exponential blend toward a brighter frame peak.
pub const DEFAULT_RISE_RATE: f32 = 0.3;
/// Exponential blend toward a darker frame peak. Slow on purpose: a dark
/// scene cut should not crush highlights for the next bright one.
pub const DEFAULT_FALL_RATE: f32 = 0.05;
/// Slew limits in nits per dispatch.
pub const DEFAULT_MAX_RISE_NITS: f32 = 100.0;
pub const DEFAULT_MAX_FALL_NITS: f32 = 50.0;

/// Hard ceiling; PQ tops out here, anything above is corrupt input.
pub const PEAK_CEILING_NITS: f32 = 10000.0;

/// Minimum spacing between staging-buffer readbacks of the detected peak.
pub const READBACK_MIN_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakSmoothing {
    pub rise_rate: f32,
    pub fall_rate: f32,
    pub max_rise_nits: f32,
    pub max_fall_nits: f32,
}

impl Default for PeakSmoothing {
    fn default() -> Self {
        Self {
            rise_rate: DEFAULT_RISE_RATE,
            fall_rate: DEFAULT_FALL_RATE,
            max_rise_nits: DEFAULT_MAX_RISE_NITS,
            max_fall_nits: DEFAULT_MAX_FALL_NITS,
        }
    }
}

/// One smoothing step: exponential blend toward the frame peak, clamped to
/// the slew window around the previous value, then to [0, 10000].
///
/// A non-positive previous value means no history yet; the frame peak
/// seeds the filter directly instead of ramping up from zero.
pub fn smooth_peak(prev_nits: f32, frame_peak_nits: f32, params: &PeakSmoothing) -> f32 {
    let prev = if prev_nits <= 0.0 {
        frame_peak_nits
    } else {
        prev_nits
    };

    let (target, max_delta) = if frame_peak_nits > prev {
        (
            prev + (frame_peak_nits - prev) * params.rise_rate,
            params.max_rise_nits,
        )
    } else {
        (
            prev + (frame_peak_nits - prev) * params.fall_rate,
            params.max_fall_nits,
        )
    };

    target
        .clamp(prev - max_delta, prev + max_delta)
        .clamp(0.0, PEAK_CEILING_NITS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn first_frame_seeds_without_ramp() {
        let out = smooth_peak(0.0, 500.0, &PeakSmoothing::default());
        assert_relative_eq!(out, 500.0);
        let out = smooth_peak(-1.0, 750.0, &PeakSmoothing::default());
        assert_relative_eq!(out, 750.0);
    }

    #[test]
    fn rise_blends_at_rise_rate() {
        let out = smooth_peak(100.0, 200.0, &PeakSmoothing::default());
        assert_relative_eq!(out, 130.0, epsilon = 1e-3);
    }

    #[test]
    fn large_rise_hits_the_slew_limit() {
        let out = smooth_peak(100.0, 10000.0, &PeakSmoothing::default());
        assert_relative_eq!(out, 200.0, epsilon = 1e-3);
    }

    #[test]
    fn fall_is_slower_than_rise() {
        let out = smooth_peak(1000.0, 900.0, &PeakSmoothing::default());
        assert_relative_eq!(out, 995.0, epsilon = 1e-3);
        // Collapse to black is capped at the fall slew.
        let out = smooth_peak(1000.0, 0.0, &PeakSmoothing::default());
        assert_relative_eq!(out, 950.0, epsilon = 1e-3);
    }

    #[test]
    fn output_never_exceeds_the_ceiling() {
        let out = smooth_peak(9990.0, 1_000_000.0, &PeakSmoothing::default());
        assert_relative_eq!(out, PEAK_CEILING_NITS);
    }

    #[test]
    fn repeated_steps_converge_on_a_stable_peak() {
        let params = PeakSmoothing::default();
        let mut peak = 100.0;
        for _ in 0..100 {
            peak = smooth_peak(peak, 1000.0, &params);
        }
        assert_relative_eq!(peak, 1000.0, epsilon = 1.0);

        for _ in 0..200 {
            peak = smooth_peak(peak, 300.0, &params);
        }
        assert_relative_eq!(peak, 300.0, epsilon = 1.0);
    }
}
