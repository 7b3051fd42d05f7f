//! Color-correction math and shared plumbing for the overlay engine.
//!
//! Everything here is platform-neutral: transfer functions, gamut and
//! tonemap math, LUT sampling, peak smoothing, frame-analysis decoding, the
//! settings document, and the session logger. The GPU kernels mirror these
//! functions; keeping CPU copies testable is what keeps the shaders honest.

pub mod analysis;
pub mod color;
pub mod display;
pub mod error;
pub mod grayscale;
pub mod logger;
pub mod lut;
pub mod noise;
pub mod peak;
pub mod settings;
pub mod tonemap;
pub mod transfer;

pub use analysis::{FrameAnalysis, SessionStats};
pub use display::{DisplayControl, NoopDisplayControl};
pub use error::{CorrectionError, FaultAction};
pub use lut::LutImage;
pub use settings::{
    CorrectionData, CorrectionSettings, EngineSettings, GrayscaleSettings, LutReference,
    MonitorSettings, PeakOverrideSettings, TonemapSettings,
};
pub use tonemap::TonemapCurve;
