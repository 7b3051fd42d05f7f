//! Desktop color-correction overlay engine.
//!
//! Capture, correction, and presentation for every monitor run on one
//! worker thread behind [`engine::EngineHandle`]; a front end drives the
//! engine entirely through that handle and its event stream. The bundled
//! binary is a console driver over the same surface.
//!
//! Gating, pacing, kernel constant layout, and visibility sequencing are
//! platform-neutral so their rules stay testable off-Windows; everything
//! touching DXGI, Direct3D, or a window is compiled for Windows only.

pub mod allowlist;
pub mod kernels;
pub mod pacing;
pub mod shaders;
pub mod state;
pub mod updates;

#[cfg(windows)]
pub mod capture;
#[cfg(windows)]
pub mod engine;
#[cfg(windows)]
pub mod gpu;
#[cfg(windows)]
pub mod monitor;
#[cfg(windows)]
pub mod session;
#[cfg(windows)]
pub mod surface;
#[cfg(windows)]
pub mod window;

#[cfg(windows)]
pub use engine::{EngineEvent, EngineHandle};
