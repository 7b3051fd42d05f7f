//! Transfer functions used by the correction pipeline.
//!
//! These are CPU mirrors of the math the GPU kernels run, kept in `f32` so
//! results match shader output bit-for-bit where the operations allow it.
//! PQ follows SMPTE ST 2084; sRGB follows IEC 61966-2-1.

/// PQ code value 1.0 corresponds to this luminance in nits.
pub const PQ_MAX_NITS: f32 = 10000.0;

/// scRGB 1.0 corresponds to this luminance in nits.
pub const SCRGB_WHITE_NITS: f32 = 80.0;

// SMPTE ST 2084 constants, written the way the shaders spell them.
const PQ_M1: f32 = 0.1593017578125;
const PQ_M2: f32 = 78.84375;
const PQ_C1: f32 = 0.8359375;
const PQ_C2: f32 = 18.8515625;
const PQ_C3: f32 = 18.6875;

/// Encodes normalized linear light (1.0 = 10000 nits) to a PQ code value.
#[inline]
pub fn pq_encode(linear: f32) -> f32 {
    if linear <= 0.0 {
        return 0.0;
    }
    let y = linear.min(1.0);
    let yp = y.powf(PQ_M1);
    ((PQ_C1 + PQ_C2 * yp) / (1.0 + PQ_C3 * yp)).powf(PQ_M2)
}

/// Decodes a PQ code value to normalized linear light (1.0 = 10000 nits).
#[inline]
pub fn pq_decode(signal: f32) -> f32 {
    if signal <= 0.0 {
        return 0.0;
    }
    let vp = signal.powf(1.0 / PQ_M2);
    let num = (vp - PQ_C1).max(0.0);
    let den = PQ_C2 - PQ_C3 * vp;
    (num / den).powf(1.0 / PQ_M1)
}

/// Encodes absolute luminance in nits to a PQ code value.
#[inline]
pub fn pq_from_nits(nits: f32) -> f32 {
    pq_encode(nits / PQ_MAX_NITS)
}

/// Decodes a PQ code value to absolute luminance in nits.
#[inline]
pub fn pq_to_nits(signal: f32) -> f32 {
    pq_decode(signal) * PQ_MAX_NITS
}

/// Pure power-law 2.2 decode, the transfer SDR desktops are mastered against.
#[inline]
pub fn gamma22_decode(signal: f32) -> f32 {
    signal.max(0.0).powf(2.2)
}

#[inline]
pub fn gamma22_encode(linear: f32) -> f32 {
    linear.max(0.0).powf(1.0 / 2.2)
}

/// Piecewise sRGB encode (linear to signal).
#[inline]
pub fn srgb_encode(linear: f32) -> f32 {
    let l = linear.max(0.0);
    if l <= 0.0031308 {
        12.92 * l
    } else {
        1.055 * l.powf(1.0 / 2.4) - 0.055
    }
}

/// Piecewise sRGB decode (signal to linear).
#[inline]
pub fn srgb_decode(signal: f32) -> f32 {
    let s = signal.max(0.0);
    if s <= 0.04045 {
        s / 12.92
    } else {
        ((s + 0.055) / 1.055).powf(2.4)
    }
}

/// Re-linearizes composited HDR desktop content that Windows decoded with
/// the piecewise sRGB curve when the display actually applies pure 2.2.
///
/// Works on one scRGB channel. Only the SDR-range magnitude (|v| <= 1.0,
/// i.e. up to 80 nits) is touched; brighter values and the sign of
/// wide-gamut negatives pass through unchanged.
#[inline]
pub fn desktop_srgb_to_gamma22(scrgb: f32) -> f32 {
    let magnitude = scrgb.abs();
    if magnitude > 1.0 {
        return scrgb;
    }
    let corrected = srgb_encode(magnitude).powf(2.2);
    corrected.copysign(scrgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pq_roundtrip_over_full_range() {
        for &nits in &[0.0f32, 0.1, 1.0, 10.0, 100.0, 203.0, 1000.0, 4000.0, 10000.0] {
            let signal = pq_from_nits(nits);
            let back = pq_to_nits(signal);
            assert!(
                (back - nits).abs() < nits * 0.001 + 0.001,
                "nits={nits} back={back}"
            );
        }
    }

    #[test]
    fn pq_reference_points() {
        // 100 nits encodes near 0.508, graphics white (203) near 0.58.
        assert_relative_eq!(pq_from_nits(100.0), 0.508, epsilon = 0.01);
        assert_relative_eq!(pq_from_nits(203.0), 0.5807, epsilon = 0.005);
        assert_eq!(pq_from_nits(10000.0), 1.0);
        assert_eq!(pq_encode(0.0), 0.0);
        assert_eq!(pq_decode(0.0), 0.0);
    }

    #[test]
    fn pq_clamps_above_peak() {
        assert_eq!(pq_from_nits(20000.0), 1.0);
    }

    #[test]
    fn gamma22_roundtrip() {
        for &v in &[0.0f32, 0.01, 0.18, 0.5, 1.0] {
            assert_relative_eq!(gamma22_encode(gamma22_decode(v)), v, epsilon = 1e-5);
        }
    }

    #[test]
    fn srgb_piecewise_is_continuous_at_the_knee() {
        let below = srgb_encode(0.0031308 - 1e-7);
        let above = srgb_encode(0.0031308 + 1e-7);
        assert!((below - above).abs() < 1e-4);
        assert_relative_eq!(srgb_decode(srgb_encode(0.5)), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn desktop_gamma_fixup_leaves_hdr_range_alone() {
        assert_eq!(desktop_srgb_to_gamma22(1.5), 1.5);
        assert_eq!(desktop_srgb_to_gamma22(12.5), 12.5);
    }

    #[test]
    fn desktop_gamma_fixup_preserves_sign() {
        let pos = desktop_srgb_to_gamma22(0.25);
        let neg = desktop_srgb_to_gamma22(-0.25);
        assert_relative_eq!(neg, -pos, epsilon = 1e-6);
    }

    #[test]
    fn desktop_gamma_fixup_is_identity_at_white_and_black() {
        assert_relative_eq!(desktop_srgb_to_gamma22(1.0), 1.0, epsilon = 1e-6);
        assert_eq!(desktop_srgb_to_gamma22(0.0), 0.0);
    }

    #[test]
    fn desktop_gamma_fixup_darkens_shadows() {
        // The piecewise sRGB toe sits above pure 2.2 near black, so
        // re-targeting 2.2 pushes shadow values down.
        let shadow = desktop_srgb_to_gamma22(0.05);
        assert!(shadow < 0.05, "got {shadow}");
        assert!(shadow > 0.04);

        // Midtones shift the other way, and only slightly.
        let mid = desktop_srgb_to_gamma22(0.5);
        assert!(mid > 0.5 && mid < 0.52, "got {mid}");
    }
}
