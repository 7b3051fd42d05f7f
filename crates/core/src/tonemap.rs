//! Tone mapping curves for HDR peak compression.
//!
//! All curves operate on the ICtCp intensity channel. BT.2390, soft clip,
//! Reinhard and hard clip run directly in the PQ domain; BT.2446 Method A
//! needs its gamma/log staircase and runs in linear light. These functions
//! mirror the GPU kernels exactly so curve behavior is testable on the CPU.

use serde::{Deserialize, Serialize};

use crate::transfer;

/// Diffuse white per BT.2408. Targets at or below this are treated as SDR:
/// knee-free compression over the full range, and dynamic peak detection
/// is replaced by the static source peak.
pub const REFERENCE_WHITE_NITS: f32 = 203.0;

/// Static source peak assumed when the user never measured their content.
/// Covers typical HDR10 mastering displays.
pub const DEFAULT_STATIC_SOURCE_PEAK: f32 = 1000.0;

/// Dynamic mode never reports a source peak below target * this factor,
/// so the curve always has real work to do when engaged.
pub const DYNAMIC_HEADROOM: f32 = 1.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TonemapCurve {
    Bt2390,
    SoftClip,
    Reinhard,
    Bt2446a,
    HardClip,
}

impl Default for TonemapCurve {
    fn default() -> Self {
        TonemapCurve::Bt2390
    }
}

impl TonemapCurve {
    /// Index used in the kernel constant buffer.
    pub fn index(self) -> u32 {
        match self {
            TonemapCurve::Bt2390 => 0,
            TonemapCurve::SoftClip => 1,
            TonemapCurve::Reinhard => 2,
            TonemapCurve::Bt2446a => 3,
            TonemapCurve::HardClip => 4,
        }
    }

    /// Inverse of [`index`](Self::index). Out-of-range values collapse to
    /// hard clip, matching the kernel's final dispatch branch.
    pub fn from_index(index: u32) -> Self {
        match index {
            0 => TonemapCurve::Bt2390,
            1 => TonemapCurve::SoftClip,
            2 => TonemapCurve::Reinhard,
            3 => TonemapCurve::Bt2446a,
            _ => TonemapCurve::HardClip,
        }
    }
}

/// Picks the effective source peak for a frame.
///
/// Dynamic detection only engages above SDR reference white; below that the
/// detected value would just be desktop UI noise. The detected peak is
/// floored twice: at reference white, and at the target plus headroom.
pub fn resolve_source_peak(
    dynamic: bool,
    detected_peak_nits: Option<f32>,
    static_peak_nits: f32,
    target_peak_nits: f32,
) -> f32 {
    if dynamic && target_peak_nits > REFERENCE_WHITE_NITS {
        let detected = detected_peak_nits
            .unwrap_or(0.0)
            .max(REFERENCE_WHITE_NITS);
        detected.max(target_peak_nits * DYNAMIC_HEADROOM)
    } else if static_peak_nits > 0.0 {
        static_peak_nits
    } else {
        DEFAULT_STATIC_SOURCE_PEAK
    }
}

/// BT.2390 EETF in the PQ domain: linear below the knee, Hermite spline
/// rolloff above it.
pub fn bt2390_pq(i: f32, pq_source_peak: f32, pq_target_peak: f32) -> f32 {
    let iw = pq_source_peak;
    let ow = pq_target_peak;

    let e = i / iw;
    let max_lum = ow / iw;
    let ks = (1.5 * max_lum - 0.5).max(0.0);

    if e <= ks {
        return e * iw;
    }

    let t = (e - ks) / (1.0 - ks);
    let t2 = t * t;
    let t3 = t2 * t;
    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    // Spline endpoints: P0 = KS with slope (1 - KS), P1 = maxLum with slope 0.
    let mapped = h00 * ks + h10 * (1.0 - ks) + h01 * max_lum;

    (mapped * iw).clamp(0.0, ow)
}

fn pq_knee(pq_target_peak: f32, target_peak_nits: f32) -> f32 {
    if target_peak_nits <= REFERENCE_WHITE_NITS {
        0.0
    } else {
        pq_target_peak * 0.8
    }
}

/// Exponential shoulder in PQ space.
pub fn soft_clip_pq(i: f32, pq_target_peak: f32, target_peak_nits: f32) -> f32 {
    let knee = pq_knee(pq_target_peak, target_peak_nits);
    if i <= knee {
        return i;
    }
    let overshoot = i - knee;
    let headroom = pq_target_peak - knee;
    knee + headroom * (1.0 - (-overshoot / headroom).exp())
}

/// Hyperbolic shoulder in PQ space.
pub fn reinhard_pq(i: f32, pq_target_peak: f32, target_peak_nits: f32) -> f32 {
    let knee = pq_knee(pq_target_peak, target_peak_nits);
    if i <= knee {
        return i;
    }
    let overshoot = i - knee;
    let headroom = pq_target_peak - knee;
    knee + headroom * overshoot / (overshoot + headroom)
}

pub fn hard_clip_pq(i: f32, pq_target_peak: f32) -> f32 {
    i.min(pq_target_peak)
}

/// ITU-R BT.2446 Method A applied to the overshoot above the knee.
///
/// Inputs are normalized to the source peak: `y` in [0, 1], `target_peak`
/// is the target as a fraction of source. Runs in linear light.
pub fn bt2446a(y: f32, target_peak: f32, target_peak_nits: f32) -> f32 {
    let knee = if target_peak_nits <= REFERENCE_WHITE_NITS {
        0.0
    } else {
        target_peak * 0.8
    };
    if y <= knee {
        return y;
    }

    let overshoot = y - knee;
    let max_overshoot = 1.0 - knee;
    let headroom = target_peak - knee;

    let normalized = overshoot / max_overshoot;
    let yg = normalized.powf(1.0 / 2.4);

    let compression_ratio = max_overshoot / headroom;
    let p_hdr = 1.0 + 32.0 * compression_ratio.powf(1.0 / 2.4);
    let p_sdr = 33.0f32;

    let yp = (1.0 + (p_hdr - 1.0) * yg).ln() / p_hdr.ln();

    let yc = if yp <= 0.7399 {
        yp * 1.0770
    } else if yp < 0.9909 {
        yp * (-1.1510 * yp + 2.7811) - 0.6302
    } else {
        yp * 0.5 + 0.5
    };

    let y_sdr = (p_sdr.powf(yc) - 1.0) / (p_sdr - 1.0);
    let compressed = y_sdr.max(0.0).powf(2.4);

    knee + compressed * headroom
}

/// Tone maps a PQ-encoded intensity value through the selected curve.
///
/// Returns the input untouched when the content already fits the display
/// (`source <= target`), so an idle desktop costs nothing.
pub fn tonemap_intensity(
    i: f32,
    curve: TonemapCurve,
    source_peak_nits: f32,
    target_peak_nits: f32,
) -> f32 {
    if i <= 0.0 {
        return i;
    }
    if source_peak_nits <= target_peak_nits {
        return i;
    }

    let pq_source = transfer::pq_from_nits(source_peak_nits);
    let pq_target = transfer::pq_from_nits(target_peak_nits);

    match curve {
        TonemapCurve::Bt2390 => bt2390_pq(i, pq_source, pq_target),
        TonemapCurve::SoftClip => soft_clip_pq(i, pq_target, target_peak_nits),
        TonemapCurve::Reinhard => reinhard_pq(i, pq_target, target_peak_nits),
        TonemapCurve::Bt2446a => {
            let nits = transfer::pq_to_nits(i);
            let normalized = nits / source_peak_nits;
            let target_normalized = target_peak_nits / source_peak_nits;
            let mapped = bt2446a(normalized, target_normalized, target_peak_nits);
            transfer::pq_from_nits(mapped * source_peak_nits)
        }
        TonemapCurve::HardClip => hard_clip_pq(i, pq_target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn passthrough_when_content_fits_display() {
        // Source below target means nothing to compress.
        let i = 0.42;
        assert_eq!(tonemap_intensity(i, TonemapCurve::Bt2390, 800.0, 1000.0), i);
        assert_eq!(tonemap_intensity(i, TonemapCurve::HardClip, 1000.0, 1000.0), i);
        assert_eq!(tonemap_intensity(0.0, TonemapCurve::Bt2390, 4000.0, 1000.0), 0.0);
    }

    #[test]
    fn hard_clip_caps_exactly_at_target() {
        let pq_target = transfer::pq_from_nits(1000.0);
        let out = tonemap_intensity(0.9, TonemapCurve::HardClip, 4000.0, 1000.0);
        assert_relative_eq!(out, pq_target, epsilon = 1e-6);
        // Below the cap nothing changes.
        let out = tonemap_intensity(0.5, TonemapCurve::HardClip, 4000.0, 1000.0);
        assert_relative_eq!(out, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn bt2390_is_linear_below_the_knee() {
        // 1000 -> 500 nits puts the knee around PQ 0.64; 0.5 is safely under.
        let out = tonemap_intensity(0.5, TonemapCurve::Bt2390, 1000.0, 500.0);
        assert_relative_eq!(out, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn bt2390_rolls_off_and_respects_target() {
        let pq_target = transfer::pq_from_nits(500.0);
        let i = transfer::pq_from_nits(1000.0);
        let out = tonemap_intensity(i, TonemapCurve::Bt2390, 1000.0, 500.0);
        assert!(out < i, "peak input must be compressed, got {out}");
        assert!(out <= pq_target + 1e-4, "out {out} exceeds target {pq_target}");
    }

    #[test]
    fn bt2390_is_monotone() {
        let mut prev = 0.0;
        for step in 0..=100 {
            let i = step as f32 / 100.0;
            let out = tonemap_intensity(i, TonemapCurve::Bt2390, 4000.0, 800.0);
            assert!(out >= prev - 1e-6, "regression at i={i}: {out} < {prev}");
            prev = out;
        }
    }

    #[test]
    fn soft_clip_has_no_knee_for_sdr_targets() {
        // At an SDR target the whole range is compressed, so even small
        // inputs move.
        let out = tonemap_intensity(0.3, TonemapCurve::SoftClip, 1000.0, 203.0);
        assert!(out < 0.3);
        // An HDR target keeps values under the 80% knee untouched.
        let out = tonemap_intensity(0.5, TonemapCurve::SoftClip, 4000.0, 1000.0);
        assert_relative_eq!(out, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn reinhard_is_continuous_at_the_knee() {
        let pq_target = transfer::pq_from_nits(1000.0);
        let knee = pq_target * 0.8;
        let below = reinhard_pq(knee - 1e-4, pq_target, 1000.0);
        let above = reinhard_pq(knee + 1e-4, pq_target, 1000.0);
        assert!((above - below).abs() < 1e-3);
    }

    #[test]
    fn reinhard_never_exceeds_target() {
        let pq_target = transfer::pq_from_nits(1000.0);
        for step in 0..=20 {
            let i = step as f32 / 20.0;
            let out = reinhard_pq(i, pq_target, 1000.0);
            assert!(out <= pq_target + 1e-6);
        }
    }

    #[test]
    fn bt2446a_passes_below_knee_and_caps_at_target() {
        let i = transfer::pq_from_nits(500.0);
        let out = tonemap_intensity(i, TonemapCurve::Bt2446a, 4000.0, 1000.0);
        // 500 nits is below the 800-nit knee for a 4000 -> 1000 mapping.
        assert_relative_eq!(out, i, epsilon = 1e-4);

        let peak = transfer::pq_from_nits(4000.0);
        let out = tonemap_intensity(peak, TonemapCurve::Bt2446a, 4000.0, 1000.0);
        assert!(out < peak);
        assert!(out <= transfer::pq_from_nits(1000.0) + 1e-3);
    }

    #[test]
    fn static_peak_resolution_falls_back_to_mastering_default() {
        assert_eq!(resolve_source_peak(false, None, 0.0, 1000.0), 1000.0);
        assert_eq!(resolve_source_peak(false, None, 4000.0, 1000.0), 4000.0);
        // Dynamic mode is ignored for SDR-range targets.
        assert_eq!(resolve_source_peak(true, Some(3000.0), 0.0, 203.0), 1000.0);
    }

    #[test]
    fn dynamic_peak_resolution_applies_floors() {
        // Detected value below reference white is floored, then the
        // headroom floor wins.
        assert_eq!(resolve_source_peak(true, Some(150.0), 0.0, 1000.0), 1250.0);
        assert_eq!(resolve_source_peak(true, None, 0.0, 1000.0), 1250.0);
        // A real detection above both floors is used as-is.
        assert_eq!(resolve_source_peak(true, Some(3000.0), 0.0, 1000.0), 3000.0);
    }

    #[test]
    fn curve_indices_roundtrip_and_saturate() {
        for curve in [
            TonemapCurve::Bt2390,
            TonemapCurve::SoftClip,
            TonemapCurve::Reinhard,
            TonemapCurve::Bt2446a,
            TonemapCurve::HardClip,
        ] {
            assert_eq!(TonemapCurve::from_index(curve.index()), curve);
        }
        assert_eq!(TonemapCurve::from_index(99), TonemapCurve::HardClip);
    }
}
