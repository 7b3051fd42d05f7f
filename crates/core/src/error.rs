use std::time::Duration;
use thiserror::Error;

/// Faults raised by the capture and present pipeline.
///
/// Every variant maps to exactly one [`FaultAction`]; the render loop never
/// inspects HRESULTs directly, it matches on the classified fault.
#[derive(Debug, Error)]
pub enum CorrectionError {
    /// Desktop duplication could not be created for an output.
    #[error("desktop duplication init failed: {0}")]
    CaptureInit(String),

    /// The duplication session was invalidated (mode switch, fullscreen
    /// exclusive handoff, secure desktop).
    #[error("capture access lost")]
    CaptureLost,

    /// The output changed shape or format underneath us without an
    /// access-lost signal.
    #[error("display mode changed: {0}")]
    ModeChanged(String),

    /// The adapter was removed, reset, or hung. `reason` is the HRESULT
    /// from the device-removed query.
    #[error("graphics device removed (reason {reason:#010X})")]
    DeviceRemoved { reason: i32 },

    /// Runtime HLSL compilation failed. Carries the compiler's error blob.
    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),

    /// Swap chain or composition surface creation/resize failed.
    #[error("present surface unusable: {0}")]
    Surface(String),

    /// No frame was presented within the watchdog deadline.
    #[error("present watchdog expired after {0:?}")]
    WatchdogExpired(Duration),

    /// The monitor needs a correction resource the session does not have
    /// (an HDR-capable output with no HDR-domain correction configured).
    #[error("no usable correction for {0}")]
    MissingCorrection(String),
}

/// What the render loop should do about a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    /// Re-initialize the duplication for this monitor with backoff.
    /// Retries are unbounded; the desktop may come back at any time.
    RetryCapture,
    /// Rebuild the duplication and dependent surfaces immediately.
    ReinitCapture,
    /// Tear down and recreate the whole device arena. Attempted once.
    RecoverDevice,
    /// Leave this monitor uncorrected and keep running the rest.
    SkipMonitor,
}

impl CorrectionError {
    pub fn fault_action(&self) -> FaultAction {
        match self {
            CorrectionError::CaptureInit(_) | CorrectionError::CaptureLost => {
                FaultAction::RetryCapture
            }
            CorrectionError::ModeChanged(_) => FaultAction::ReinitCapture,
            CorrectionError::DeviceRemoved { .. }
            | CorrectionError::ShaderCompile(_)
            | CorrectionError::Surface(_)
            | CorrectionError::WatchdogExpired(_) => FaultAction::RecoverDevice,
            CorrectionError::MissingCorrection(_) => FaultAction::SkipMonitor,
        }
    }

    /// True when the overlay can keep running and retry later.
    pub fn is_recoverable(&self) -> bool {
        self.fault_action() != FaultAction::RecoverDevice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_faults_retry_without_device_recovery() {
        let lost = CorrectionError::CaptureLost;
        assert_eq!(lost.fault_action(), FaultAction::RetryCapture);
        assert!(lost.is_recoverable());

        let init = CorrectionError::CaptureInit("E_ACCESSDENIED".into());
        assert_eq!(init.fault_action(), FaultAction::RetryCapture);
    }

    #[test]
    fn device_removal_and_watchdog_escalate_to_recovery() {
        let removed = CorrectionError::DeviceRemoved { reason: 0x887A0005u32 as i32 };
        assert_eq!(removed.fault_action(), FaultAction::RecoverDevice);
        assert!(!removed.is_recoverable());

        let stalled = CorrectionError::WatchdogExpired(Duration::from_secs(5));
        assert_eq!(stalled.fault_action(), FaultAction::RecoverDevice);
    }

    #[test]
    fn mode_change_rebuilds_capture_in_place() {
        let drifted = CorrectionError::ModeChanged("format drift fp16 -> 8bit".into());
        assert_eq!(drifted.fault_action(), FaultAction::ReinitCapture);
        assert!(drifted.is_recoverable());
    }

    #[test]
    fn missing_correction_skips_the_monitor() {
        let missing = CorrectionError::MissingCorrection("\\\\.\\DISPLAY2".into());
        assert_eq!(missing.fault_action(), FaultAction::SkipMonitor);
    }

    #[test]
    fn device_removed_formats_reason_as_hresult() {
        let removed = CorrectionError::DeviceRemoved { reason: 0x887A0005u32 as i32 };
        let text = removed.to_string();
        assert!(text.contains("0x887A0005"), "got: {text}");
    }
}
