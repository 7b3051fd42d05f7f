//! Seam for display hardware control owned by an external collaborator.
//!
//! Peak-luminance overrides (MaxTML) and EDID primaries readout involve OS
//! and driver plumbing this crate does not carry. The engine consumes the
//! trait opportunistically: failures are logged and swallowed, and calls
//! must not block the worker loop.

use crate::color::GamutPrimaries;

pub trait DisplayControl: Send + Sync {
    /// Apply or clear a display peak-luminance override for one monitor.
    /// Values at or below zero clear the override.
    fn apply_peak_override(&self, monitor_index: usize, nits: f32) -> anyhow::Result<()>;

    /// Measured primaries for a monitor, typically parsed from EDID.
    /// `None` when the source is unavailable.
    fn display_primaries(&self, monitor_index: usize) -> Option<GamutPrimaries>;
}

/// Inert implementation used when no collaborator is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDisplayControl;

impl DisplayControl for NoopDisplayControl {
    fn apply_peak_override(&self, _monitor_index: usize, _nits: f32) -> anyhow::Result<()> {
        Ok(())
    }

    fn display_primaries(&self, _monitor_index: usize) -> Option<GamutPrimaries> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_is_usable_as_a_trait_object() {
        let control: &dyn DisplayControl = &NoopDisplayControl;
        assert!(control.apply_peak_override(0, 1000.0).is_ok());
        assert!(control.display_primaries(0).is_none());
    }
}
