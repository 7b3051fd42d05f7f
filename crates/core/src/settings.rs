//! Engine parameter structs, JSON ingestion, and validation.
//!
//! The settings document is produced by the control-panel collaborator; this
//! crate only reads it. Out-of-range values fall back to safe defaults
//! rather than failing the whole document, matching the panel's own rules,
//! so a hand-edited file degrades instead of refusing to start.

use anyhow::{bail, Context, Result};
use glam::Mat3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::color::{
    gamut_correction_matrix, Chromaticity, GamutPrimaries, ADOBE_RGB, DISPLAY_P3, REC2020, REC709,
};
use crate::grayscale;
use crate::lut::{LutImage, MAX_LUT_SIZE, MIN_LUT_SIZE};
use crate::tonemap::TonemapCurve;

/// scRGB reference white; 1.0 in the capture encoding.
pub const DEFAULT_SDR_WHITE_NITS: f32 = 80.0;

/// Accepted range for any user-supplied peak luminance.
const PEAK_NITS_MIN: f32 = 100.0;
const PEAK_NITS_MAX: f32 = 10000.0;

fn peak_nits_valid(nits: f32) -> bool {
    (PEAK_NITS_MIN..=PEAK_NITS_MAX).contains(&nits)
}

/// Starting point for user-measured primaries: sRGB red/blue/white with a
/// slightly desaturated green, typical of uncalibrated wide-gamut panels.
pub const CUSTOM_PRIMARIES_DEFAULT: GamutPrimaries = GamutPrimaries {
    red: Chromaticity::new(0.6400, 0.3300),
    green: Chromaticity::new(0.3000, 0.6000),
    blue: Chromaticity::new(0.1500, 0.0600),
    white: Chromaticity::new(0.3127, 0.3290),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimariesSelection {
    Srgb,
    DisplayP3,
    AdobeRgb,
    Rec2020,
    Custom,
}

impl Default for PrimariesSelection {
    fn default() -> Self {
        PrimariesSelection::Srgb
    }
}

/// Grayscale tracking curve for one mode of one monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrayscaleSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Control point count; 10, 20, or 32.
    #[serde(default = "default_point_count")]
    pub point_count: usize,
    /// Curve outputs in [0, 1]; length must equal `point_count`.
    #[serde(default)]
    pub points: Vec<f32>,
    /// HDR only: luminance the top of the curve maps to.
    #[serde(default = "default_curve_peak")]
    pub peak_nits: f32,
    /// SDR only: reshape encoded output from gamma 2.2 to 2.4.
    #[serde(default)]
    pub use_24_gamma: bool,
}

fn default_point_count() -> usize {
    20
}

fn default_curve_peak() -> f32 {
    10000.0
}

impl Default for GrayscaleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            point_count: 20,
            points: Vec::new(),
            peak_nits: 10000.0,
            use_24_gamma: false,
        }
    }
}

impl GrayscaleSettings {
    /// Returns a copy with every field forced into its accepted range.
    /// A curve whose length disagrees with the point count is replaced by
    /// the identity for the mode, never truncated or padded.
    pub fn validated(&self, hdr: bool) -> GrayscaleSettings {
        let mut out = self.clone();
        out.point_count = grayscale::normalize_point_count(self.point_count);
        if out.points.len() != out.point_count {
            out.points = if hdr {
                grayscale::identity_pq(out.point_count)
            } else {
                grayscale::identity_sdr(out.point_count)
            };
        }
        if !peak_nits_valid(out.peak_nits) {
            out.peak_nits = default_curve_peak();
        }
        out
    }
}

/// HDR tonemapping parameters; ignored in SDR mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TonemapSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Track the detected frame peak instead of `source_peak_nits`.
    #[serde(default)]
    pub dynamic_peak: bool,
    #[serde(default)]
    pub curve: TonemapCurve,
    #[serde(default = "default_source_peak")]
    pub source_peak_nits: f32,
    #[serde(default = "default_target_peak")]
    pub target_peak_nits: f32,
}

fn default_source_peak() -> f32 {
    10000.0
}

fn default_target_peak() -> f32 {
    1000.0
}

impl Default for TonemapSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            dynamic_peak: false,
            curve: TonemapCurve::default(),
            source_peak_nits: 10000.0,
            target_peak_nits: 1000.0,
        }
    }
}

impl TonemapSettings {
    pub fn validated(&self) -> TonemapSettings {
        let mut out = *self;
        if !peak_nits_valid(out.source_peak_nits) {
            out.source_peak_nits = default_source_peak();
        }
        if !peak_nits_valid(out.target_peak_nits) {
            out.target_peak_nits = default_target_peak();
        }
        out
    }
}

/// Reference to a raw LUT blob the panel collaborator exported: little-endian
/// RGBA f32 texels, `size`³ × 4 values, blue-major order. No format parsing
/// happens here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LutReference {
    pub size: usize,
    pub path: PathBuf,
}

impl LutReference {
    /// Read and validate the blob. Relative paths resolve against
    /// `base_dir`, normally the settings document's directory.
    pub fn load(&self, base_dir: &Path) -> Result<LutImage> {
        if !(MIN_LUT_SIZE..=MAX_LUT_SIZE).contains(&self.size) {
            bail!("LUT lattice size {} out of range", self.size);
        }
        let path = if self.path.is_absolute() {
            self.path.clone()
        } else {
            base_dir.join(&self.path)
        };
        let bytes = fs::read(&path)
            .with_context(|| format!("Failed to read LUT blob {}", path.display()))?;
        let expected = self.size * self.size * self.size * 4 * 4;
        if bytes.len() != expected {
            bail!(
                "LUT blob {} is {} bytes, expected {} for lattice size {}",
                path.display(),
                bytes.len(),
                expected,
                self.size
            );
        }
        let texels = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        LutImage::new(self.size, texels)
    }
}

/// Color correction for one mode (SDR or HDR) of one monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionSettings {
    #[serde(default)]
    pub primaries_enabled: bool,
    #[serde(default)]
    pub primaries_preset: PrimariesSelection,
    /// Kept even while a preset is selected so the panel can switch back.
    #[serde(default = "default_custom_primaries")]
    pub custom_primaries: GamutPrimaries,
    #[serde(default)]
    pub grayscale: GrayscaleSettings,
    #[serde(default)]
    pub tonemap: TonemapSettings,
    #[serde(default)]
    pub lut: Option<LutReference>,
}

fn default_custom_primaries() -> GamutPrimaries {
    CUSTOM_PRIMARIES_DEFAULT
}

impl Default for CorrectionSettings {
    fn default() -> Self {
        Self {
            primaries_enabled: false,
            primaries_preset: PrimariesSelection::default(),
            custom_primaries: CUSTOM_PRIMARIES_DEFAULT,
            grayscale: GrayscaleSettings::default(),
            tonemap: TonemapSettings::default(),
            lut: None,
        }
    }
}

impl CorrectionSettings {
    /// Anything beyond the identity: a LUT reference or an enabled stage.
    pub fn any_active(&self) -> bool {
        self.lut.is_some()
            || self.primaries_enabled
            || self.grayscale.enabled
            || self.tonemap.enabled
    }

    pub fn selected_primaries(&self) -> GamutPrimaries {
        match self.primaries_preset {
            PrimariesSelection::Srgb => REC709,
            PrimariesSelection::DisplayP3 => DISPLAY_P3,
            PrimariesSelection::AdobeRgb => ADOBE_RGB,
            PrimariesSelection::Rec2020 => REC2020,
            PrimariesSelection::Custom => self.custom_primaries,
        }
    }

    /// Validate and convert to the render-side form. The matrix maps content
    /// primaries onto the display's measured primaries: sRGB content in SDR,
    /// Rec.2020 in HDR (applied in linear Rec.2020 space by the kernel).
    pub fn resolve(&self, hdr: bool) -> CorrectionData {
        let matrix = if self.primaries_enabled {
            let content = if hdr { REC2020 } else { REC709 };
            gamut_correction_matrix(&content, &self.selected_primaries())
        } else {
            Mat3::IDENTITY
        };
        CorrectionData {
            primaries_enabled: self.primaries_enabled,
            matrix,
            grayscale: self.grayscale.validated(hdr),
            tonemap: self.tonemap.validated(),
        }
    }
}

/// Validated correction parameters with the primaries matrix resolved,
/// ready to be written into the pipeline constant buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionData {
    pub primaries_enabled: bool,
    pub matrix: Mat3,
    pub grayscale: GrayscaleSettings,
    pub tonemap: TonemapSettings,
}

impl Default for CorrectionData {
    fn default() -> Self {
        CorrectionSettings::default().resolve(false)
    }
}

/// Peak-luminance override handed to the `DisplayControl` collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakOverrideSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_override_nits")]
    pub nits: f32,
}

fn default_override_nits() -> f32 {
    1000.0
}

impl Default for PeakOverrideSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            nits: 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    pub index: usize,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub sdr: CorrectionSettings,
    #[serde(default)]
    pub hdr: CorrectionSettings,
    #[serde(default)]
    pub peak_override: PeakOverrideSettings,
}

fn default_true() -> bool {
    true
}

impl MonitorSettings {
    /// Passthrough configuration for a monitor the document does not cover.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            enabled: true,
            sdr: CorrectionSettings::default(),
            hdr: CorrectionSettings::default(),
            peak_override: PeakOverrideSettings::default(),
        }
    }

    /// True when the monitor carries any correction in either mode. Monitors
    /// that fail this are left alone entirely: no capture, no overlay.
    pub fn wants_session(&self) -> bool {
        self.enabled && (self.sdr.any_active() || self.hdr.any_active())
    }
}

/// The whole settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub monitors: Vec<MonitorSettings>,
    /// Process names that force effective gamma off while running.
    #[serde(default)]
    pub gamma_allowlist: Vec<String>,
    /// User preference for the desktop gamma reshape.
    #[serde(default = "default_true")]
    pub user_gamma: bool,
    /// Tetrahedral LUT interpolation; trilinear when off.
    #[serde(default)]
    pub tetrahedral: bool,
    #[serde(default = "default_sdr_white")]
    pub sdr_white_nits: f32,
}

fn default_sdr_white() -> f32 {
    DEFAULT_SDR_WHITE_NITS
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            monitors: Vec::new(),
            gamma_allowlist: Vec::new(),
            user_gamma: true,
            tetrahedral: false,
            sdr_white_nits: DEFAULT_SDR_WHITE_NITS,
        }
    }
}

impl EngineSettings {
    pub fn load(path: &Path) -> Result<EngineSettings> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: EngineSettings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        Ok(settings.validated())
    }

    /// Normalize everything that tolerates bad input: allow-list entries are
    /// lowercased and blank ones dropped, white level falls back to 80.
    pub fn validated(mut self) -> EngineSettings {
        self.gamma_allowlist = self
            .gamma_allowlist
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !self.sdr_white_nits.is_finite() || self.sdr_white_nits <= 0.0 {
            self.sdr_white_nits = DEFAULT_SDR_WHITE_NITS;
        }
        self
    }

    /// Settings for one monitor, falling back to passthrough defaults.
    pub fn monitor(&self, index: usize) -> MonitorSettings {
        self.monitors
            .iter()
            .find(|m| m.index == index)
            .cloned()
            .unwrap_or_else(|| MonitorSettings::new(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::BT709_TO_BT2020;
    use approx::assert_relative_eq;

    #[test]
    fn tonemap_peaks_fall_back_when_out_of_range() {
        let bad = TonemapSettings {
            source_peak_nits: 50.0,
            target_peak_nits: 20000.0,
            ..TonemapSettings::default()
        };
        let v = bad.validated();
        assert_relative_eq!(v.source_peak_nits, 10000.0);
        assert_relative_eq!(v.target_peak_nits, 1000.0);

        let nan = TonemapSettings {
            source_peak_nits: f32::NAN,
            ..TonemapSettings::default()
        };
        assert_relative_eq!(nan.validated().source_peak_nits, 10000.0);

        let good = TonemapSettings {
            source_peak_nits: 4000.0,
            target_peak_nits: 800.0,
            ..TonemapSettings::default()
        };
        assert_eq!(good.validated(), good);
    }

    #[test]
    fn grayscale_curve_length_mismatch_resets_to_identity() {
        let bad = GrayscaleSettings {
            enabled: true,
            point_count: 20,
            points: vec![0.5; 7],
            ..GrayscaleSettings::default()
        };

        let sdr = bad.validated(false);
        assert_eq!(sdr.points.len(), 20);
        assert_relative_eq!(sdr.points[19], 1.0);
        // SDR identity stores t^2 at evenly spaced sqrt positions.
        assert_relative_eq!(sdr.points[10], (10.0f32 / 19.0).powi(2), epsilon = 1e-6);

        let hdr = bad.validated(true);
        assert_relative_eq!(hdr.points[10], 10.0 / 19.0, epsilon = 1e-6);
    }

    #[test]
    fn grayscale_odd_point_count_falls_back_to_twenty() {
        let bad = GrayscaleSettings {
            point_count: 17,
            ..GrayscaleSettings::default()
        };
        assert_eq!(bad.validated(false).point_count, 20);

        let thirty_two = GrayscaleSettings {
            point_count: 32,
            points: grayscale::identity_sdr(32),
            ..GrayscaleSettings::default()
        };
        let v = thirty_two.validated(false);
        assert_eq!(v.point_count, 32);
        assert_eq!(v.points, thirty_two.points);
    }

    #[test]
    fn grayscale_peak_outside_range_resets() {
        let bad = GrayscaleSettings {
            peak_nits: 50.0,
            ..GrayscaleSettings::default()
        };
        assert_relative_eq!(bad.validated(true).peak_nits, 10000.0);
    }

    #[test]
    fn disabled_primaries_resolve_to_identity() {
        let data = CorrectionSettings::default().resolve(false);
        assert!(!data.primaries_enabled);
        assert_relative_eq!(data.matrix.determinant(), 1.0);
        assert_eq!(data.matrix, Mat3::IDENTITY);
    }

    #[test]
    fn matching_content_and_display_resolve_near_identity() {
        let settings = CorrectionSettings {
            primaries_enabled: true,
            primaries_preset: PrimariesSelection::Srgb,
            ..CorrectionSettings::default()
        };
        let m = settings.resolve(false).matrix;
        for (a, b) in m
            .to_cols_array()
            .iter()
            .zip(Mat3::IDENTITY.to_cols_array().iter())
        {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
    }

    #[test]
    fn sdr_correction_onto_wide_display_matches_709_to_2020() {
        let settings = CorrectionSettings {
            primaries_enabled: true,
            primaries_preset: PrimariesSelection::Rec2020,
            ..CorrectionSettings::default()
        };
        let m = settings.resolve(false).matrix;
        for (a, b) in m
            .to_cols_array()
            .iter()
            .zip(BT709_TO_BT2020.to_cols_array().iter())
        {
            assert_relative_eq!(a, b, epsilon = 1e-3);
        }
    }

    #[test]
    fn only_configured_monitors_want_a_session() {
        let blank = MonitorSettings::new(2);
        assert!(!blank.wants_session());

        let mut tonemapped = MonitorSettings::new(0);
        tonemapped.hdr.tonemap.enabled = true;
        assert!(tonemapped.wants_session());

        let mut lut_only = MonitorSettings::new(1);
        lut_only.sdr.lut = Some(LutReference {
            size: 65,
            path: PathBuf::from("display.lut"),
        });
        assert!(lut_only.wants_session());

        lut_only.enabled = false;
        assert!(!lut_only.wants_session());
    }

    #[test]
    fn hdr_correction_onto_2020_display_is_identity() {
        let settings = CorrectionSettings {
            primaries_enabled: true,
            primaries_preset: PrimariesSelection::Rec2020,
            ..CorrectionSettings::default()
        };
        let m = settings.resolve(true).matrix;
        for (a, b) in m
            .to_cols_array()
            .iter()
            .zip(Mat3::IDENTITY.to_cols_array().iter())
        {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
    }

    #[test]
    fn document_round_trips_through_json() {
        let mut settings = EngineSettings::default();
        settings.monitors.push(MonitorSettings::new(1));
        settings.monitors[0].hdr.tonemap.enabled = true;
        settings.monitors[0].hdr.tonemap.curve = TonemapCurve::Reinhard;
        settings.monitors[0].sdr.lut = Some(LutReference {
            size: 33,
            path: PathBuf::from("sdr.lut"),
        });
        settings.gamma_allowlist.push("game.exe".into());

        let json = serde_json::to_string_pretty(&settings).unwrap();
        let back: EngineSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn sparse_document_fills_defaults() {
        let json = r#"{ "monitors": [ { "index": 2 } ] }"#;
        let settings: EngineSettings = serde_json::from_str(json).unwrap();
        assert!(settings.user_gamma);
        assert!(!settings.tetrahedral);
        assert_relative_eq!(settings.sdr_white_nits, 80.0);
        assert_eq!(settings.monitors[0].index, 2);
        assert!(settings.monitors[0].enabled);
        assert_eq!(settings.monitors[0].sdr, CorrectionSettings::default());
    }

    #[test]
    fn validation_normalizes_allowlist_entries() {
        let settings = EngineSettings {
            gamma_allowlist: vec![" Game.EXE ".into(), "".into(), "app".into()],
            sdr_white_nits: -5.0,
            ..EngineSettings::default()
        }
        .validated();
        assert_eq!(settings.gamma_allowlist, vec!["game.exe", "app"]);
        assert_relative_eq!(settings.sdr_white_nits, 80.0);
    }

    #[test]
    fn monitor_lookup_falls_back_to_passthrough() {
        let mut settings = EngineSettings::default();
        settings.monitors.push(MonitorSettings {
            index: 1,
            enabled: false,
            ..MonitorSettings::new(1)
        });
        assert!(!settings.monitor(1).enabled);
        let fallback = settings.monitor(4);
        assert_eq!(fallback.index, 4);
        assert!(fallback.enabled);
    }

    #[test]
    fn lut_blob_round_trips_and_rejects_bad_sizes() {
        let dir = std::env::temp_dir().join(format!("lut-blob-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let image = LutImage::identity(2).unwrap();
        let mut bytes = Vec::with_capacity(image.texels().len() * 4);
        for v in image.texels() {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        fs::write(dir.join("id.lut"), &bytes).unwrap();

        let reference = LutReference {
            size: 2,
            path: PathBuf::from("id.lut"),
        };
        let loaded = reference.load(&dir).unwrap();
        assert_eq!(loaded.texels(), image.texels());

        // Truncated blob.
        fs::write(dir.join("short.lut"), &bytes[..bytes.len() - 4]).unwrap();
        let short = LutReference {
            size: 2,
            path: PathBuf::from("short.lut"),
        };
        assert!(short.load(&dir).is_err());

        // Lattice size outside the accepted range never touches the file.
        let huge = LutReference {
            size: 4096,
            path: PathBuf::from("missing.lut"),
        };
        assert!(huge.load(&dir).is_err());

        fs::remove_dir_all(&dir).ok();
    }
}
