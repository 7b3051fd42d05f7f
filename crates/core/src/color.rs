//! Color space math: primaries, white points, and the matrices the
//! correction pipeline feeds to the GPU.
//!
//! Matrix construction follows the standard derivation (primaries as XYZ
//! columns, scaled so the white point maps to Y=1) with Bradford chromatic
//! adaptation between differing white points.

use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

use crate::transfer;

/// CIE xy chromaticity coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Chromaticity {
    pub x: f32,
    pub y: f32,
}

impl Chromaticity {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// XYZ with Y normalized to 1. Degenerate coordinates collapse to zero.
    pub fn to_xyz(self) -> Vec3 {
        if self.y.abs() < 1e-10 {
            Vec3::ZERO
        } else {
            Vec3::new(self.x / self.y, 1.0, (1.0 - self.x - self.y) / self.y)
        }
    }
}

/// An RGB gamut: three primaries plus a white point, all as xy chromaticity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GamutPrimaries {
    pub red: Chromaticity,
    pub green: Chromaticity,
    pub blue: Chromaticity,
    pub white: Chromaticity,
}

/// D65 white point, shared by every built-in gamut here.
pub const D65: Chromaticity = Chromaticity::new(0.3127, 0.3290);

pub const REC709: GamutPrimaries = GamutPrimaries {
    red: Chromaticity::new(0.64, 0.33),
    green: Chromaticity::new(0.30, 0.60),
    blue: Chromaticity::new(0.15, 0.06),
    white: D65,
};

pub const DISPLAY_P3: GamutPrimaries = GamutPrimaries {
    red: Chromaticity::new(0.680, 0.320),
    green: Chromaticity::new(0.265, 0.690),
    blue: Chromaticity::new(0.150, 0.060),
    white: D65,
};

pub const ADOBE_RGB: GamutPrimaries = GamutPrimaries {
    red: Chromaticity::new(0.64, 0.33),
    green: Chromaticity::new(0.21, 0.71),
    blue: Chromaticity::new(0.15, 0.06),
    white: D65,
};

pub const REC2020: GamutPrimaries = GamutPrimaries {
    red: Chromaticity::new(0.708, 0.292),
    green: Chromaticity::new(0.170, 0.797),
    blue: Chromaticity::new(0.131, 0.046),
    white: D65,
};

/// Rec.709 luma weights, used everywhere the pipeline reduces RGB to Y.
pub const REC709_LUMA: Vec3 = Vec3::new(0.2126, 0.7152, 0.0722);

const fn mat3_from_rows(r0: [f32; 3], r1: [f32; 3], r2: [f32; 3]) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(r0[0], r1[0], r2[0]),
        Vec3::new(r0[1], r1[1], r2[1]),
        Vec3::new(r0[2], r1[2], r2[2]),
    )
}

// Fixed conversions used by the HDR pipeline. The decimal spellings match
// the HLSL so CPU mirrors agree with kernel output.

pub const BT709_TO_BT2020: Mat3 = mat3_from_rows(
    [0.6274039, 0.3292830, 0.0433131],
    [0.0690973, 0.9195404, 0.0113623],
    [0.0163914, 0.0880133, 0.8955953],
);

pub const BT2020_TO_BT709: Mat3 = mat3_from_rows(
    [1.6604910, -0.5876411, -0.0728499],
    [-0.1245505, 1.1328999, -0.0083494],
    [-0.0181508, -0.1005789, 1.1187297],
);

// ICtCp infrastructure per the Dolby white paper. The LMS transform carries
// the Hunt-Pointer-Estevez crosstalk baked into the published integers.

pub const REC2020_TO_LMS: Mat3 = mat3_from_rows(
    [0.41210938, 0.52392578, 0.06396484],
    [0.16674805, 0.72045898, 0.11279297],
    [0.02416992, 0.07543945, 0.90039063],
);

pub const LMS_TO_REC2020: Mat3 = mat3_from_rows(
    [3.43661000, -2.50645000, 0.06984000],
    [-0.79133000, 1.98360000, -0.19227000],
    [-0.02595000, -0.09891000, 1.12486000],
);

pub const LMS_PQ_TO_ICTCP: Mat3 = mat3_from_rows(
    [0.50000000, 0.50000000, 0.00000000],
    [1.61376953, -3.32348633, 1.70971680],
    [4.37817383, -4.24560547, -0.13256836],
);

pub const ICTCP_TO_LMS_PQ: Mat3 = mat3_from_rows(
    [1.0, 0.00860904, 0.11102963],
    [1.0, -0.00860904, -0.11102963],
    [1.0, 0.56003134, -0.32062717],
);

/// Bradford cone response matrix (Lam 1985).
pub const BRADFORD: Mat3 = mat3_from_rows(
    [0.8951, 0.2664, -0.1614],
    [-0.7502, 1.7135, 0.0367],
    [0.0389, -0.0685, 1.0296],
);

/// White point xy distance below which chromatic adaptation is skipped.
pub const ADAPTATION_EPSILON: f32 = 0.01;

fn safe_inverse(m: Mat3) -> Option<Mat3> {
    if m.determinant().abs() < 1e-8 {
        None
    } else {
        Some(m.inverse())
    }
}

/// RGB-to-XYZ matrix for a gamut: primaries as XYZ columns, scaled so
/// (1,1,1) lands on the white point.
pub fn rgb_to_xyz_matrix(gamut: &GamutPrimaries) -> Option<Mat3> {
    let r = gamut.red.to_xyz();
    let g = gamut.green.to_xyz();
    let b = gamut.blue.to_xyz();
    let w = gamut.white.to_xyz();

    let unscaled = Mat3::from_cols(r, g, b);
    let scale = safe_inverse(unscaled)? * w;
    Some(Mat3::from_cols(r * scale.x, g * scale.y, b * scale.z))
}

pub fn xyz_to_rgb_matrix(gamut: &GamutPrimaries) -> Option<Mat3> {
    rgb_to_xyz_matrix(gamut).and_then(safe_inverse)
}

/// Bradford adaptation from one white point to another: M^-1 * S * M with
/// S the diagonal cone-response ratio.
pub fn adaptation_matrix(src_white: Vec3, dst_white: Vec3) -> Mat3 {
    let src_cone = BRADFORD * src_white;
    let dst_cone = BRADFORD * dst_white;
    if src_cone.x.abs() < 1e-10 || src_cone.y.abs() < 1e-10 || src_cone.z.abs() < 1e-10 {
        return Mat3::IDENTITY;
    }
    let scale = Mat3::from_diagonal(Vec3::new(
        dst_cone.x / src_cone.x,
        dst_cone.y / src_cone.y,
        dst_cone.z / src_cone.z,
    ));
    match safe_inverse(BRADFORD) {
        Some(bradford_inv) => bradford_inv * scale * BRADFORD,
        None => Mat3::IDENTITY,
    }
}

/// Builds the primaries-correction matrix that maps content mastered for
/// `source` onto a display whose native response is `display`.
///
/// Adaptation is skipped when the white points agree within
/// [`ADAPTATION_EPSILON`]; degenerate primaries fall back to identity so a
/// bad configuration can never black out the overlay.
pub fn gamut_correction_matrix(source: &GamutPrimaries, display: &GamutPrimaries) -> Mat3 {
    let (Some(src_to_xyz), Some(xyz_to_dst)) =
        (rgb_to_xyz_matrix(source), xyz_to_rgb_matrix(display))
    else {
        return Mat3::IDENTITY;
    };

    let whites_match = (source.white.x - display.white.x).abs() < ADAPTATION_EPSILON
        && (source.white.y - display.white.y).abs() < ADAPTATION_EPSILON;

    let m = if whites_match {
        xyz_to_dst * src_to_xyz
    } else {
        let adapt = adaptation_matrix(source.white.to_xyz(), display.white.to_xyz());
        xyz_to_dst * adapt * src_to_xyz
    };

    if m.to_cols_array().iter().all(|v| v.is_finite()) {
        m
    } else {
        Mat3::IDENTITY
    }
}

/// Row-major export padded to float4 rows, the layout the constant buffer
/// carries matrices in.
pub fn matrix_to_cb_rows(m: &Mat3) -> [[f32; 4]; 3] {
    let t = m.transpose();
    let rows = t.to_cols_array_2d();
    [
        [rows[0][0], rows[0][1], rows[0][2], 0.0],
        [rows[1][0], rows[1][1], rows[1][2], 0.0],
        [rows[2][0], rows[2][1], rows[2][2], 0.0],
    ]
}

/// Linear scRGB (Rec.709 primaries, 1.0 = 80 nits) to ICtCp.
pub fn scrgb_to_ictcp(rgb: Vec3) -> Vec3 {
    let rec2020 = BT709_TO_BT2020 * rgb;
    let lms = REC2020_TO_LMS * rec2020;
    let scale = transfer::SCRGB_WHITE_NITS / transfer::PQ_MAX_NITS;
    let lms_pq = Vec3::new(
        transfer::pq_encode(lms.x * scale),
        transfer::pq_encode(lms.y * scale),
        transfer::pq_encode(lms.z * scale),
    );
    LMS_PQ_TO_ICTCP * lms_pq
}

/// Inverse of [`scrgb_to_ictcp`].
pub fn ictcp_to_scrgb(ictcp: Vec3) -> Vec3 {
    let lms_pq = ICTCP_TO_LMS_PQ * ictcp;
    let scale = transfer::PQ_MAX_NITS / transfer::SCRGB_WHITE_NITS;
    let lms = Vec3::new(
        transfer::pq_decode(lms_pq.x) * scale,
        transfer::pq_decode(lms_pq.y) * scale,
        transfer::pq_decode(lms_pq.z) * scale,
    );
    BT2020_TO_BT709 * (LMS_TO_REC2020 * lms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_mat3_eq(a: Mat3, b: Mat3, epsilon: f32) {
        let (a, b) = (a.to_cols_array(), b.to_cols_array());
        for i in 0..9 {
            assert!(
                (a[i] - b[i]).abs() < epsilon,
                "element {i}: {} vs {}",
                a[i],
                b[i]
            );
        }
    }

    #[test]
    fn rec709_matrix_matches_published_values() {
        let m = rgb_to_xyz_matrix(&REC709).unwrap();
        let rows = m.transpose().to_cols_array_2d();
        assert_relative_eq!(rows[0][0], 0.4124564, epsilon = 1e-3);
        assert_relative_eq!(rows[1][0], 0.2126729, epsilon = 1e-3);
        assert_relative_eq!(rows[2][2], 0.9503041, epsilon = 1e-3);
    }

    #[test]
    fn white_maps_to_unit_luminance_for_every_preset() {
        for gamut in [REC709, DISPLAY_P3, ADOBE_RGB, REC2020] {
            let m = rgb_to_xyz_matrix(&gamut).unwrap();
            let white = m * Vec3::ONE;
            assert_relative_eq!(white.y, 1.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn same_gamut_correction_is_identity() {
        let m = gamut_correction_matrix(&REC709, &REC709);
        assert_mat3_eq(m, Mat3::IDENTITY, 1e-4);
    }

    #[test]
    fn derived_709_to_2020_matches_pipeline_constant() {
        let m = gamut_correction_matrix(&REC709, &REC2020);
        assert_mat3_eq(m, BT709_TO_BT2020, 1e-3);
    }

    #[test]
    fn adaptation_moves_white_point() {
        let d50 = Chromaticity::new(0.34567, 0.35850);
        let adapt = adaptation_matrix(D65.to_xyz(), d50.to_xyz());
        let moved = adapt * D65.to_xyz();
        let target = d50.to_xyz();
        assert_relative_eq!(moved.x, target.x, epsilon = 1e-3);
        assert_relative_eq!(moved.y, target.y, epsilon = 1e-3);
        assert_relative_eq!(moved.z, target.z, epsilon = 1e-3);
    }

    #[test]
    fn matching_whites_skip_adaptation() {
        let adapt = adaptation_matrix(D65.to_xyz(), D65.to_xyz());
        assert_mat3_eq(adapt, Mat3::IDENTITY, 1e-5);
    }

    #[test]
    fn degenerate_primaries_fall_back_to_identity() {
        let broken = GamutPrimaries {
            red: Chromaticity::new(0.3, 0.3),
            green: Chromaticity::new(0.3, 0.3),
            blue: Chromaticity::new(0.3, 0.3),
            white: D65,
        };
        let m = gamut_correction_matrix(&broken, &REC709);
        assert_mat3_eq(m, Mat3::IDENTITY, 1e-6);

        let zero_y = GamutPrimaries {
            red: Chromaticity::new(0.64, 0.0),
            ..REC709
        };
        let m = gamut_correction_matrix(&zero_y, &REC709);
        assert_mat3_eq(m, Mat3::IDENTITY, 1e-6);
    }

    #[test]
    fn fixed_2020_matrices_invert_each_other() {
        assert_mat3_eq(BT709_TO_BT2020 * BT2020_TO_BT709, Mat3::IDENTITY, 1e-4);
        assert_mat3_eq(REC2020_TO_LMS * LMS_TO_REC2020, Mat3::IDENTITY, 1e-4);
        assert_mat3_eq(LMS_PQ_TO_ICTCP * ICTCP_TO_LMS_PQ, Mat3::IDENTITY, 1e-4);
    }

    #[test]
    fn cb_rows_are_row_major_with_zero_w() {
        let rows = matrix_to_cb_rows(&BT709_TO_BT2020);
        assert_relative_eq!(rows[0][0], 0.6274039);
        assert_relative_eq!(rows[0][1], 0.3292830);
        assert_relative_eq!(rows[1][0], 0.0690973);
        assert_eq!(rows[0][3], 0.0);
        assert_eq!(rows[2][3], 0.0);
    }

    #[test]
    fn scrgb_white_has_neutral_chroma_in_ictcp() {
        let ictcp = scrgb_to_ictcp(Vec3::ONE);
        // 80 nits sits near PQ 0.49; chroma must vanish for neutral input.
        assert!(ictcp.x > 0.47 && ictcp.x < 0.51, "I = {}", ictcp.x);
        assert!(ictcp.y.abs() < 1e-3, "Ct = {}", ictcp.y);
        assert!(ictcp.z.abs() < 1e-3, "Cp = {}", ictcp.z);
    }

    #[test]
    fn ictcp_roundtrip_recovers_scrgb() {
        for rgb in [
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.5, 0.25, 0.75),
            Vec3::new(4.0, 3.0, 2.0),
        ] {
            let back = ictcp_to_scrgb(scrgb_to_ictcp(rgb));
            for i in 0..3 {
                assert!(
                    (back[i] - rgb[i]).abs() < rgb[i].abs() * 0.02 + 0.01,
                    "{rgb:?} came back as {back:?}"
                );
            }
        }
    }
}
