//! CPU-side feeding of the GPU kernels: constant-buffer layouts and the
//! dispatch/readback cadences.
//!
//! The pixel shader's 64-float parameter block and both compute kernels'
//! parameter blocks are filled here, slot by slot, in the exact order the
//! HLSL cbuffers declare. The session maps the D3D buffers and copies
//! these arrays in; keeping the fill pure keeps the layout testable.

use std::time::Instant;

use lumaveil_core::analysis;
use lumaveil_core::peak::{PeakSmoothing, READBACK_MIN_INTERVAL};
use lumaveil_core::settings::CorrectionData;

/// Float slots in the pipeline constant buffer (16 float4 rows).
pub const PIPELINE_SLOTS: usize = 64;

/// u32 slots in the peak kernel's parameter block.
pub const PEAK_SLOTS: usize = 8;

/// u32 slots in the analysis kernel's parameter block.
pub const ANALYSIS_SLOTS: usize = 4;

/// Everything the pipeline constants depend on for one monitor frame.
pub struct PipelineInputs<'a> {
    pub hdr: bool,
    pub sdr_white_nits: f32,
    pub max_display_nits: f32,
    /// Lattice size of the active mode's LUT; 0 when passing through.
    pub lut_size: u32,
    /// Effective desktop gamma reshape (user preference minus the
    /// process allow-list suppression).
    pub desktop_gamma: bool,
    pub tetrahedral: bool,
    pub lut_passthrough: bool,
    pub correction: &'a CorrectionData,
}

/// Fills the pipeline constant block. Slot order must match the
/// `PipelineParams` cbuffer in `shaders::CORRECTION_PS` field for field.
pub fn fill_pipeline_constants(inputs: &PipelineInputs) -> [f32; PIPELINE_SLOTS] {
    let cc = inputs.correction;
    let gs = &cc.grayscale;
    let tm = &cc.tonemap;
    let mut out = [0.0f32; PIPELINE_SLOTS];

    // Row 0: mode and display.
    out[0] = f32::from(u8::from(inputs.hdr));
    out[1] = inputs.sdr_white_nits;
    out[2] = inputs.max_display_nits;
    out[3] = inputs.lut_size as f32;
    // Row 1: toggles.
    out[4] = f32::from(u8::from(inputs.desktop_gamma));
    out[5] = f32::from(u8::from(inputs.tetrahedral));
    out[6] = f32::from(u8::from(inputs.lut_passthrough));
    out[7] = f32::from(u8::from(cc.primaries_enabled || gs.enabled));
    // Row 2: grayscale and tonemap toggles.
    out[8] = gs.point_count as f32;
    out[9] = f32::from(u8::from(gs.enabled));
    out[10] = f32::from(u8::from(inputs.hdr && tm.enabled));
    out[11] = tm.curve.index() as f32;
    // Rows 3-5: primaries matrix, one row per float4, w unused.
    for r in 0..3 {
        let row = cc.matrix.row(r);
        out[12 + r * 4] = row.x;
        out[13 + r * 4] = row.y;
        out[14 + r * 4] = row.z;
    }
    // Row 6: tonemap parameters.
    out[24] = tm.source_peak_nits;
    out[25] = tm.target_peak_nits;
    out[26] = f32::from(u8::from(tm.dynamic_peak));
    out[27] = f32::from(u8::from(gs.use_24_gamma));
    // Row 7: grayscale curve peak, rest padding.
    out[28] = gs.peak_nits;
    // Rows 8-15: grayscale curve, linear ramp past the point count.
    for (i, slot) in out[32..].iter_mut().enumerate() {
        *slot = if i < gs.point_count {
            gs.points.get(i).copied().unwrap_or(i as f32 / 31.0)
        } else {
            i as f32 / 31.0
        };
    }
    out
}

/// Fills the peak kernel's parameter block: frame dimensions as uints,
/// then the smoothing rates and slew limits as float bit patterns.
pub fn fill_peak_constants(
    width: u32,
    height: u32,
    smoothing: &PeakSmoothing,
) -> [u32; PEAK_SLOTS] {
    [
        width,
        height,
        smoothing.rise_rate.to_bits(),
        smoothing.fall_rate.to_bits(),
        smoothing.max_rise_nits.to_bits(),
        smoothing.max_fall_nits.to_bits(),
        0,
        0,
    ]
}

/// Fills the analysis kernel's parameter block.
pub fn fill_analysis_constants(width: u32, height: u32, hdr: bool) -> [u32; ANALYSIS_SLOTS] {
    [width, height, u32::from(hdr), 0]
}

/// What the analysis pass should do on this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStep {
    Idle,
    /// Dispatch the kernel and copy the result into this staging buffer.
    Dispatch { write_index: usize },
    /// Map this staging buffer. Always the one the next dispatch will
    /// overwrite, idle for a full interval, so the map never stalls.
    Readback { read_index: usize },
}

/// Dispatch-every-Nth-frame cadence with two alternating staging buffers.
/// The copy made in one cycle is mapped in the next; the reader never
/// touches the buffer written in its own cycle. Staging buffers start with
/// undefined contents, so no readback fires until both have been written.
#[derive(Debug, Default)]
pub struct AnalysisCadence {
    frame_counter: u64,
    staging_index: usize,
    dispatches: u64,
}

impl AnalysisCadence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self) -> AnalysisStep {
        self.frame_counter += 1;
        let phase = self.frame_counter % analysis::FRAME_INTERVAL;
        if phase == 0 {
            let write_index = self.staging_index;
            self.staging_index = 1 - write_index;
            self.dispatches += 1;
            AnalysisStep::Dispatch { write_index }
        } else if phase == analysis::READBACK_DELAY && self.dispatches >= 2 {
            AnalysisStep::Readback {
                read_index: self.staging_index,
            }
        } else {
            AnalysisStep::Idle
        }
    }
}

/// Spacing gate for the detected-peak staging readback. The first call
/// always passes; later calls pass once the minimum interval elapsed.
#[derive(Debug, Default)]
pub struct ReadbackThrottle {
    last: Option<Instant>,
}

impl ReadbackThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn due(&mut self, now: Instant) -> bool {
        match self.last {
            Some(prev) if now.duration_since(prev) < READBACK_MIN_INTERVAL => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat3, Vec3};
    use lumaveil_core::settings::{GrayscaleSettings, TonemapSettings};
    use lumaveil_core::tonemap::TonemapCurve;
    use std::time::Duration;

    fn correction() -> CorrectionData {
        CorrectionData {
            primaries_enabled: true,
            // Columns (1,4,7)/(2,5,8)/(3,6,9): rows read 1 2 3 / 4 5 6 / 7 8 9.
            matrix: Mat3::from_cols(
                Vec3::new(1.0, 4.0, 7.0),
                Vec3::new(2.0, 5.0, 8.0),
                Vec3::new(3.0, 6.0, 9.0),
            ),
            grayscale: GrayscaleSettings {
                enabled: true,
                point_count: 2,
                points: vec![0.25, 0.75],
                peak_nits: 2000.0,
                use_24_gamma: true,
            },
            tonemap: TonemapSettings {
                enabled: true,
                dynamic_peak: true,
                curve: TonemapCurve::Reinhard,
                source_peak_nits: 4000.0,
                target_peak_nits: 800.0,
            },
        }
    }

    #[test]
    fn pipeline_slots_follow_the_cbuffer_order() {
        let cc = correction();
        let out = fill_pipeline_constants(&PipelineInputs {
            hdr: true,
            sdr_white_nits: 190.0,
            max_display_nits: 1200.0,
            lut_size: 33,
            desktop_gamma: true,
            tetrahedral: false,
            lut_passthrough: false,
            correction: &cc,
        });

        assert_eq!(out[0], 1.0);
        assert_eq!(out[1], 190.0);
        assert_eq!(out[2], 1200.0);
        assert_eq!(out[3], 33.0);
        assert_eq!(out[4], 1.0);
        assert_eq!(out[5], 0.0);
        assert_eq!(out[6], 0.0);
        assert_eq!(out[7], 1.0);
        assert_eq!(out[8], 2.0);
        assert_eq!(out[9], 1.0);
        assert_eq!(out[10], 1.0);
        assert_eq!(out[11], TonemapCurve::Reinhard.index() as f32);
        // Matrix lands row-major with zeroed w lanes.
        assert_eq!(&out[12..16], &[1.0, 2.0, 3.0, 0.0]);
        assert_eq!(&out[16..20], &[4.0, 5.0, 6.0, 0.0]);
        assert_eq!(&out[20..24], &[7.0, 8.0, 9.0, 0.0]);
        assert_eq!(out[24], 4000.0);
        assert_eq!(out[25], 800.0);
        assert_eq!(out[26], 1.0);
        assert_eq!(out[27], 1.0);
        assert_eq!(out[28], 2000.0);
        assert_eq!(&out[29..32], &[0.0, 0.0, 0.0]);
        // Curve points, then the linear ramp.
        assert_eq!(out[32], 0.25);
        assert_eq!(out[33], 0.75);
        assert_eq!(out[34], 2.0 / 31.0);
        assert_eq!(out[63], 1.0);
    }

    #[test]
    fn tonemap_toggle_requires_hdr_mode() {
        let cc = correction();
        let sdr = fill_pipeline_constants(&PipelineInputs {
            hdr: false,
            sdr_white_nits: 80.0,
            max_display_nits: 300.0,
            lut_size: 0,
            desktop_gamma: false,
            tetrahedral: true,
            lut_passthrough: true,
            correction: &cc,
        });
        assert_eq!(sdr[0], 0.0);
        assert_eq!(sdr[5], 1.0);
        assert_eq!(sdr[6], 1.0);
        // Tonemap settings are present but the toggle stays off in SDR.
        assert_eq!(sdr[10], 0.0);
        assert_eq!(sdr[24], 4000.0);
    }

    #[test]
    fn manual_correction_follows_either_source() {
        let mut cc = correction();
        cc.primaries_enabled = false;
        let out = fill_pipeline_constants(&PipelineInputs {
            hdr: false,
            sdr_white_nits: 80.0,
            max_display_nits: 300.0,
            lut_size: 0,
            desktop_gamma: false,
            tetrahedral: false,
            lut_passthrough: true,
            correction: &cc,
        });
        // Grayscale alone still wants the manual path.
        assert_eq!(out[7], 1.0);

        cc.grayscale.enabled = false;
        let out = fill_pipeline_constants(&PipelineInputs {
            hdr: false,
            sdr_white_nits: 80.0,
            max_display_nits: 300.0,
            lut_size: 0,
            desktop_gamma: false,
            tetrahedral: false,
            lut_passthrough: true,
            correction: &cc,
        });
        assert_eq!(out[7], 0.0);
    }

    #[test]
    fn missing_curve_points_fall_back_to_the_ramp() {
        let mut cc = correction();
        cc.grayscale.point_count = 0;
        cc.grayscale.points.clear();
        let out = fill_pipeline_constants(&PipelineInputs {
            hdr: true,
            sdr_white_nits: 80.0,
            max_display_nits: 1000.0,
            lut_size: 0,
            desktop_gamma: false,
            tetrahedral: false,
            lut_passthrough: true,
            correction: &cc,
        });
        for i in 0..32 {
            assert_eq!(out[32 + i], i as f32 / 31.0);
        }
    }

    #[test]
    fn peak_constants_pack_floats_as_bit_patterns() {
        let smoothing = PeakSmoothing::default();
        let out = fill_peak_constants(2560, 1440, &smoothing);
        assert_eq!(out[0], 2560);
        assert_eq!(out[1], 1440);
        assert_eq!(f32::from_bits(out[2]), smoothing.rise_rate);
        assert_eq!(f32::from_bits(out[3]), smoothing.fall_rate);
        assert_eq!(f32::from_bits(out[4]), smoothing.max_rise_nits);
        assert_eq!(f32::from_bits(out[5]), smoothing.max_fall_nits);
        assert_eq!(&out[6..8], &[0, 0]);
    }

    #[test]
    fn analysis_constants_carry_mode() {
        assert_eq!(fill_analysis_constants(1920, 1080, true), [1920, 1080, 1, 0]);
        assert_eq!(fill_analysis_constants(800, 600, false), [800, 600, 0, 0]);
    }

    #[test]
    fn cadence_alternates_buffers_across_cycles() {
        let mut cadence = AnalysisCadence::new();
        let mut steps = Vec::new();
        for frame in 1..=92 {
            let step = cadence.advance();
            if step != AnalysisStep::Idle {
                steps.push((frame, step));
            }
        }
        // The frame-32 readback would map a buffer nothing has written yet,
        // so the first mapped result arrives a cycle later.
        assert_eq!(
            steps,
            vec![
                (30, AnalysisStep::Dispatch { write_index: 0 }),
                (60, AnalysisStep::Dispatch { write_index: 1 }),
                (62, AnalysisStep::Readback { read_index: 0 }),
                (90, AnalysisStep::Dispatch { write_index: 0 }),
                (92, AnalysisStep::Readback { read_index: 1 }),
            ]
        );
    }

    #[test]
    fn readback_maps_the_buffer_the_next_dispatch_overwrites() {
        let mut cadence = AnalysisCadence::new();
        let mut last_write = None;
        for _ in 0..180 {
            match cadence.advance() {
                AnalysisStep::Dispatch { write_index } => last_write = Some(write_index),
                AnalysisStep::Readback { read_index } => {
                    // Never the buffer written two frames earlier.
                    assert_ne!(Some(read_index), last_write);
                }
                AnalysisStep::Idle => {}
            }
        }
    }

    #[test]
    fn throttle_passes_first_then_waits_out_the_interval() {
        let mut throttle = ReadbackThrottle::new();
        let t0 = Instant::now();
        assert!(throttle.due(t0));
        assert!(!throttle.due(t0 + Duration::from_millis(499)));
        assert!(throttle.due(t0 + Duration::from_millis(500)));
        assert!(!throttle.due(t0 + Duration::from_millis(700)));
        assert!(throttle.due(t0 + Duration::from_millis(1000)));
    }
}
