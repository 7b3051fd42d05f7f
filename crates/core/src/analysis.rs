//! Frame analysis: luminance statistics, gamut classification, and SDR
//! clipping counters.
//!
//! The GPU kernel reduces a ~4096-point sampling grid into a 16-slot u32
//! buffer; this module owns the layout of that buffer, the grid shape, and
//! CPU mirrors of the per-sample classification so the kernel's decisions
//! are testable.

use glam::{Mat3, Vec3};

use crate::color::REC709_LUMA;
use crate::transfer::SCRGB_WHITE_NITS;

/// Slots in the kernel's output buffer.
pub const RESULT_SLOTS: usize = 16;

/// Target number of grid samples per analyzed frame.
pub const SAMPLE_BUDGET: f32 = 4096.0;

/// Analysis runs every Nth rendered frame.
pub const FRAME_INTERVAL: u64 = 30;

/// The staging copy is mapped this many frames after the dispatch, giving
/// the GPU time to finish without a sync point.
pub const READBACK_DELAY: u64 = 2;

/// Luminance below ~0.1 nit carries no usable color information.
pub const CHROMA_FLOOR: f32 = 0.00125;

/// Gamut membership tolerance for numerical noise.
const GAMUT_TOLERANCE: f32 = -0.005;

// Coarse conversion matrices for gamut membership tests. Four decimals is
// plenty next to the -0.005 tolerance.
const BT709_TO_P3: Mat3 = Mat3::from_cols(
    Vec3::new(0.8225, 0.0332, 0.0171),
    Vec3::new(0.1774, 0.9669, 0.0724),
    Vec3::new(0.0000, 0.0000, 0.9108),
);

const BT709_TO_2020: Mat3 = Mat3::from_cols(
    Vec3::new(0.6274, 0.0691, 0.0164),
    Vec3::new(0.3293, 0.9195, 0.0880),
    Vec3::new(0.0433, 0.0114, 0.8956),
);

/// Aspect-ratio-aware sampling grid: samples distributed so rows and
/// columns cover the frame proportionally, never fewer than 1 each.
pub fn sample_grid(width: u32, height: u32) -> (u32, u32) {
    let aspect = width.max(1) as f32 / height.max(1) as f32;
    let grid_x = ((SAMPLE_BUDGET * aspect).sqrt() as u32).max(1);
    let grid_y = ((SAMPLE_BUDGET / aspect).sqrt() as u32).max(1);
    (grid_x, grid_y)
}

/// scRGB luminance in nits (1.0 = 80 nits).
pub fn luminance_nits(rgb: Vec3) -> f32 {
    rgb.dot(REC709_LUMA) * SCRGB_WHITE_NITS
}

/// Histogram bin edges: SDR range, then 1000/2000/4000 nit splits.
pub fn histogram_bin(nits: f32) -> usize {
    if nits < 203.0 {
        0
    } else if nits < 1000.0 {
        1
    } else if nits < 2000.0 {
        2
    } else if nits < 4000.0 {
        3
    } else {
        4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamutClass {
    Rec709,
    P3Only,
    Rec2020Only,
    OutOfGamut,
}

fn in_gamut(rgb: Vec3) -> bool {
    rgb.x >= GAMUT_TOLERANCE && rgb.y >= GAMUT_TOLERANCE && rgb.z >= GAMUT_TOLERANCE
}

/// Classifies an HDR (scRGB) sample by the narrowest gamut that can
/// represent it with non-negative primaries. Near-black samples count as
/// Rec.709; brightness above 1.0 is HDR headroom, not gamut.
pub fn classify_hdr_gamut(rgb: Vec3) -> GamutClass {
    if rgb.dot(REC709_LUMA) < CHROMA_FLOOR {
        return GamutClass::Rec709;
    }
    if in_gamut(rgb) {
        return GamutClass::Rec709;
    }
    if in_gamut(BT709_TO_P3 * rgb) {
        return GamutClass::P3Only;
    }
    if in_gamut(BT709_TO_2020 * rgb) {
        return GamutClass::Rec2020Only;
    }
    GamutClass::OutOfGamut
}

/// SDR clipping test: (crushed black, blown white).
pub fn sdr_clipping(rgb: Vec3) -> (bool, bool) {
    let black = rgb.x < 1.0 / 255.0 && rgb.y < 1.0 / 255.0 && rgb.z < 1.0 / 255.0;
    let white = rgb.x > 254.0 / 255.0 && rgb.y > 254.0 / 255.0 && rgb.z > 254.0 / 255.0;
    (black, white)
}

/// One analyzed frame, decoded from the kernel's output buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameAnalysis {
    pub peak_nits: f32,
    pub min_nits: f32,
    pub avg_nits: f32,
    pub min_nonzero_nits: f32,
    pub total_samples: u32,
    pub samples_rec709: u32,
    pub samples_p3_only: u32,
    pub samples_rec2020_only: u32,
    pub samples_out_of_gamut: u32,
    pub clipped_black: u32,
    pub clipped_white: u32,
    pub histogram: [u32; 5],
}

impl FrameAnalysis {
    /// Decodes the raw buffer. Float slots are f32 bit patterns; slot 2 is
    /// the luminance sum, divided out here into the average.
    pub fn from_raw(raw: &[u32; RESULT_SLOTS]) -> Self {
        let total_samples = raw[3];
        let sum_nits = f32::from_bits(raw[2]);
        let avg_nits = if total_samples > 0 {
            sum_nits / total_samples as f32
        } else {
            0.0
        };
        Self {
            peak_nits: f32::from_bits(raw[0]),
            min_nits: f32::from_bits(raw[1]),
            avg_nits,
            min_nonzero_nits: f32::from_bits(raw[15]),
            total_samples,
            samples_rec709: raw[4],
            samples_p3_only: raw[5],
            samples_rec2020_only: raw[6],
            samples_out_of_gamut: raw[7],
            clipped_black: raw[8],
            clipped_white: raw[9],
            histogram: [raw[10], raw[11], raw[12], raw[13], raw[14]],
        }
    }
}

/// Running MaxCLL / MaxFALL over the frames seen since the observer
/// subscribed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    pub max_cll: f32,
    pub max_fall: f32,
}

impl SessionStats {
    pub fn observe(&mut self, frame: &FrameAnalysis) {
        if frame.peak_nits > self.max_cll {
            self.max_cll = frame.peak_nits;
        }
        if frame.avg_nits > self.max_fall {
            self.max_fall = frame.avg_nits;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn grid_follows_aspect_ratio() {
        let (gx, gy) = sample_grid(1920, 1080);
        assert_eq!((gx, gy), (85, 48));
        // Portrait flips the axes.
        let (gx, gy) = sample_grid(1080, 1920);
        assert_eq!((gx, gy), (48, 85));
        // Square splits evenly.
        assert_eq!(sample_grid(1000, 1000), (64, 64));
    }

    #[test]
    fn grid_sample_count_stays_near_budget() {
        for (w, h) in [(1920, 1080), (2560, 1440), (3840, 2160), (1280, 1024)] {
            let (gx, gy) = sample_grid(w, h);
            let total = gx * gy;
            assert!(
                (3200..=4500).contains(&total),
                "{w}x{h} gave {total} samples"
            );
        }
    }

    #[test]
    fn degenerate_dimensions_never_produce_an_empty_grid() {
        let (gx, gy) = sample_grid(1, 10000);
        assert!(gx >= 1 && gy >= 1);
        let (gx, gy) = sample_grid(10000, 1);
        assert!(gx >= 1 && gy >= 1);
        let (gx, gy) = sample_grid(0, 0);
        assert!(gx >= 1 && gy >= 1);
    }

    #[test]
    fn luminance_uses_scrgb_scale() {
        assert_relative_eq!(luminance_nits(Vec3::ONE), 80.0, epsilon = 1e-3);
        assert_relative_eq!(
            luminance_nits(Vec3::new(12.5, 12.5, 12.5)),
            1000.0,
            epsilon = 0.1
        );
    }

    #[test]
    fn histogram_bins_split_at_nit_thresholds() {
        assert_eq!(histogram_bin(0.0), 0);
        assert_eq!(histogram_bin(202.9), 0);
        assert_eq!(histogram_bin(203.0), 1);
        assert_eq!(histogram_bin(999.0), 1);
        assert_eq!(histogram_bin(1000.0), 2);
        assert_eq!(histogram_bin(2000.0), 3);
        assert_eq!(histogram_bin(4000.0), 4);
        assert_eq!(histogram_bin(10000.0), 4);
    }

    #[test]
    fn positive_samples_are_rec709() {
        assert_eq!(classify_hdr_gamut(Vec3::splat(0.5)), GamutClass::Rec709);
        // Brightness above 1.0 is headroom, not gamut.
        assert_eq!(classify_hdr_gamut(Vec3::splat(8.0)), GamutClass::Rec709);
    }

    #[test]
    fn near_black_counts_as_rec709_even_when_negative() {
        let dark = Vec3::new(-0.001, 0.001, 0.0005);
        assert!(dark.dot(REC709_LUMA) < CHROMA_FLOOR);
        assert_eq!(classify_hdr_gamut(dark), GamutClass::Rec709);
    }

    #[test]
    fn wide_gamut_classification_steps_outward() {
        // Slightly outside Rec.709 toward the P3 red primary.
        let p3_red = Vec3::new(1.05, -0.02, 0.0);
        assert_eq!(classify_hdr_gamut(p3_red), GamutClass::P3Only);

        // Saturated green that P3 cannot hold but Rec.2020 can.
        let wide_green = Vec3::new(-0.2, 1.1, -0.1);
        assert_eq!(classify_hdr_gamut(wide_green), GamutClass::Rec2020Only);

        // Nonsense values escape even Rec.2020.
        let invalid = Vec3::new(-1.0, 1.0, -1.0);
        assert_eq!(classify_hdr_gamut(invalid), GamutClass::OutOfGamut);
    }

    #[test]
    fn clipping_requires_all_channels() {
        let (black, white) = sdr_clipping(Vec3::splat(0.001));
        assert!(black && !white);
        let (black, white) = sdr_clipping(Vec3::splat(0.9999));
        assert!(!black && white);
        // One bright channel defeats the black test.
        let (black, white) = sdr_clipping(Vec3::new(0.001, 0.5, 0.001));
        assert!(!black && !white);
    }

    #[test]
    fn raw_buffer_decodes_with_average() {
        let mut raw = [0u32; RESULT_SLOTS];
        raw[0] = 1500.0f32.to_bits();
        raw[1] = 0.05f32.to_bits();
        raw[2] = 81600.0f32.to_bits(); // sum
        raw[3] = 4080; // samples
        raw[4] = 4000;
        raw[5] = 60;
        raw[6] = 15;
        raw[7] = 5;
        raw[10] = 3900;
        raw[11] = 150;
        raw[12] = 20;
        raw[13] = 8;
        raw[14] = 2;
        raw[15] = 0.2f32.to_bits();

        let frame = FrameAnalysis::from_raw(&raw);
        assert_relative_eq!(frame.peak_nits, 1500.0);
        assert_relative_eq!(frame.avg_nits, 20.0);
        assert_relative_eq!(frame.min_nonzero_nits, 0.2);
        assert_eq!(frame.total_samples, 4080);
        assert_eq!(frame.samples_p3_only, 60);
        assert_eq!(frame.histogram, [3900, 150, 20, 8, 2]);
    }

    #[test]
    fn zero_samples_yield_zero_average() {
        let raw = [0u32; RESULT_SLOTS];
        let frame = FrameAnalysis::from_raw(&raw);
        assert_eq!(frame.avg_nits, 0.0);
    }

    #[test]
    fn session_stats_track_maxima_and_reset() {
        let mut stats = SessionStats::default();
        let mut frame = FrameAnalysis {
            peak_nits: 800.0,
            avg_nits: 120.0,
            ..Default::default()
        };
        stats.observe(&frame);
        frame.peak_nits = 600.0;
        frame.avg_nits = 200.0;
        stats.observe(&frame);
        assert_eq!(stats.max_cll, 800.0);
        assert_eq!(stats.max_fall, 200.0);

        stats.reset();
        assert_eq!(stats.max_cll, 0.0);
        assert_eq!(stats.max_fall, 0.0);
    }
}
