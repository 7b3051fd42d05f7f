//! Grayscale tracking correction.
//!
//! A measured curve of up to 32 points reshapes luminance while leaving
//! chromaticity alone. SDR curves are sampled on a square-root grid (dense
//! near black where tracking errors show); HDR curves are sampled evenly in
//! PQ and applied to the ICtCp intensity channel. CPU mirrors of the kernel
//! math live here so curve behavior is testable without a GPU.

use glam::Vec3;

use crate::color::REC709_LUMA;
use crate::transfer;

/// Constant buffer capacity for curve points.
pub const MAX_POINTS: usize = 32;

/// Curve sizes the editor produces. Anything else collapses to 20.
pub fn normalize_point_count(count: usize) -> usize {
    match count {
        10 | 20 | 32 => count,
        _ => 20,
    }
}

/// Identity curve for SDR: point i holds the luminance (i/(N-1))^2, the
/// value the sqrt-grid sampler expects for a no-op curve.
pub fn identity_sdr(count: usize) -> Vec<f32> {
    (0..count)
        .map(|i| {
            let t = i as f32 / (count - 1) as f32;
            t * t
        })
        .collect()
}

/// Identity curve for HDR: evenly spaced in PQ, output equals input.
pub fn identity_pq(count: usize) -> Vec<f32> {
    (0..count)
        .map(|i| i as f32 / (count - 1) as f32)
        .collect()
}

/// Packs a curve into the 32 constant-buffer slots. Unused tail slots get a
/// linear ramp so a stale point count read by the kernel degrades gracefully.
pub fn pack_curve(points: &[f32]) -> [f32; MAX_POINTS] {
    let mut packed = [0.0f32; MAX_POINTS];
    for (i, slot) in packed.iter_mut().enumerate() {
        *slot = if i < points.len() {
            points[i]
        } else {
            i as f32 / 31.0
        };
    }
    packed
}

/// SDR grayscale: sqrt-grid lookup, sqrt-domain interpolation, then all
/// channels scale by correctedY/Y so chromaticity is untouched.
pub fn apply_sdr(rgb: Vec3, points: &[f32]) -> Vec3 {
    if points.len() < 2 {
        return rgb;
    }
    let y = rgb.dot(REC709_LUMA);
    if y < 1e-6 {
        return rgb;
    }

    let count = points.len();
    let idx = y.clamp(0.0, 1.0).sqrt() * (count - 1) as f32;
    let i0 = idx.floor() as usize;
    let i1 = (i0 + 1).min(count - 1);
    let t = idx - idx.floor();

    // Interpolate in the sqrt domain to reconstruct the curve the grid
    // was sampled on.
    let s0 = points[i0].max(0.0).sqrt();
    let s1 = points[i1].max(0.0).sqrt();
    let corrected_s = s0 + (s1 - s0) * t;
    let corrected_y = corrected_s * corrected_s;

    rgb * (corrected_y / y)
}

/// SDR 2.2 -> 2.4 gamma transform for BT.1886 displays, independent of the
/// grayscale curve. Scales luminance by Y^(2.4/2.2 - 1).
pub fn apply_24_gamma(rgb: Vec3) -> Vec3 {
    let y = rgb.dot(REC709_LUMA);
    if y < 1e-6 {
        return rgb;
    }
    let corrected_y = y.max(0.0).powf(1.090909);
    rgb * (corrected_y / y)
}

/// HDR grayscale on the ICtCp intensity channel.
///
/// The curve spans [0, peak_nits] in PQ; intensity above the calibrated
/// peak keeps the last point's correction factor.
pub fn apply_hdr_intensity(i: f32, points: &[f32], peak_nits: f32) -> f32 {
    if points.len() < 2 || i < 1e-6 {
        return i;
    }

    let pq_peak = transfer::pq_from_nits(peak_nits.max(1.0));
    let scaled = i / pq_peak;
    let count = points.len();

    if scaled <= 1.0 {
        let idx = scaled * (count - 1) as f32;
        let i0 = idx.floor() as usize;
        let i1 = (i0 + 1).min(count - 1);
        let t = idx - idx.floor();
        let corrected = points[i0] + (points[i1] - points[i0]) * t;
        corrected * pq_peak
    } else {
        points[count - 1] * i
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn point_count_validation() {
        assert_eq!(normalize_point_count(10), 10);
        assert_eq!(normalize_point_count(20), 20);
        assert_eq!(normalize_point_count(32), 32);
        assert_eq!(normalize_point_count(0), 20);
        assert_eq!(normalize_point_count(7), 20);
        assert_eq!(normalize_point_count(64), 20);
    }

    #[test]
    fn identity_curve_is_a_noop_for_sdr() {
        let points = identity_sdr(20);
        for rgb in [
            Vec3::splat(0.25),
            Vec3::splat(0.8),
            Vec3::new(0.6, 0.3, 0.1),
            Vec3::new(0.02, 0.05, 0.09),
        ] {
            let out = apply_sdr(rgb, &points);
            for c in 0..3 {
                assert_relative_eq!(out[c], rgb[c], epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn identity_curve_is_a_noop_for_hdr() {
        let points = identity_pq(32);
        for i in [0.01f32, 0.25, 0.5, 0.75, 1.0] {
            assert_relative_eq!(apply_hdr_intensity(i, &points, 10000.0), i, epsilon = 1e-5);
        }
    }

    #[test]
    fn sdr_correction_preserves_chromaticity() {
        // Lift the whole curve; channel ratios must survive.
        let points: Vec<f32> = identity_sdr(20).iter().map(|v| (v * 1.2).min(1.0)).collect();
        let rgb = Vec3::new(0.5, 0.25, 0.125);
        let out = apply_sdr(rgb, &points);
        assert_relative_eq!(out.x / out.y, 2.0, epsilon = 1e-4);
        assert_relative_eq!(out.y / out.z, 2.0, epsilon = 1e-4);
        assert!(out.x > rgb.x);
    }

    #[test]
    fn black_passes_through_untouched() {
        let points = identity_sdr(10);
        assert_eq!(apply_sdr(Vec3::ZERO, &points), Vec3::ZERO);
        assert_eq!(apply_24_gamma(Vec3::ZERO), Vec3::ZERO);
        assert_eq!(apply_hdr_intensity(0.0, &identity_pq(10), 1000.0), 0.0);
    }

    #[test]
    fn gamma_24_transform_darkens_midtones() {
        let out = apply_24_gamma(Vec3::splat(0.5));
        // 0.5^(12/11) ~= 0.4694
        assert_relative_eq!(out.x, 0.4694, epsilon = 1e-3);
        // White is a fixed point.
        let white = apply_24_gamma(Vec3::ONE);
        assert_relative_eq!(white.x, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn hdr_intensity_above_peak_keeps_last_correction_factor() {
        let mut points = identity_pq(20);
        let last = points.len() - 1;
        points[last] = 0.9;
        let peak = 1000.0;
        let above = transfer::pq_from_nits(peak) + 0.1;
        assert_relative_eq!(
            apply_hdr_intensity(above, &points, peak),
            0.9 * above,
            epsilon = 1e-5
        );
    }

    #[test]
    fn hdr_peak_guard_rejects_nonpositive_peak() {
        // A zero peak would divide by zero; it is floored to 1 nit.
        let points = identity_pq(10);
        let out = apply_hdr_intensity(0.5, &points, 0.0);
        assert!(out.is_finite());
    }

    #[test]
    fn cb_packing_pads_tail_with_linear_ramp() {
        let packed = pack_curve(&identity_sdr(10));
        assert_eq!(packed[9], identity_sdr(10)[9]);
        assert_relative_eq!(packed[10], 10.0 / 31.0);
        assert_relative_eq!(packed[31], 1.0);
    }

    #[test]
    fn short_curves_pass_through() {
        let rgb = Vec3::splat(0.5);
        assert_eq!(apply_sdr(rgb, &[]), rgb);
        assert_eq!(apply_sdr(rgb, &[0.5]), rgb);
        assert_eq!(apply_hdr_intensity(0.5, &[1.0], 1000.0), 0.5);
    }
}
