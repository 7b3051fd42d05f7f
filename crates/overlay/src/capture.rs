// Desktop duplication for a single output.
//
// Duplication is the piece that dies most often: mode switches, UAC's secure
// desktop and fullscreen exclusive handoffs all invalidate it. Nothing here
// retries; the caller owns the backoff and simply drops and reopens this
// struct.

use anyhow::{Context, Result};
use windows::core::Interface;
use windows::Win32::Foundation::E_ACCESSDENIED;
use windows::Win32::Graphics::Direct3D11::{ID3D11Device, ID3D11Texture2D};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT, DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_R10G10B10A2_UNORM,
    DXGI_FORMAT_R16G16B16A16_FLOAT,
};
use windows::Win32::Graphics::Dxgi::{
    IDXGIDevice, IDXGIOutput, IDXGIOutput1, IDXGIOutput5, IDXGIOutput6, IDXGIOutputDuplication,
    IDXGIResource, DXGI_ERROR_NOT_FOUND, DXGI_ERROR_SESSION_DISCONNECTED,
    DXGI_ERROR_UNSUPPORTED, DXGI_ERROR_WAIT_TIMEOUT, DXGI_OUTDUPL_DESC, DXGI_OUTDUPL_FRAME_INFO,
};
use windows::Win32::Graphics::Gdi::HMONITOR;

use lumaveil_core::error::CorrectionError;
use lumaveil_core::log_info;

use crate::pacing;

/// Static facts about the output, probed before duplication starts.
#[derive(Clone, Copy, Debug, Default)]
pub struct OutputCapability {
    /// Output advertises the BT.2020 PQ color space (Windows HDR on).
    pub hdr_capable: bool,
    pub max_nits: f32,
    pub max_frame_average_nits: f32,
    pub min_nits: f32,
}

pub enum AcquireStatus {
    /// New frame; the texture stays valid until [`OutputCapture::release_frame`].
    Frame(ID3D11Texture2D),
    /// No desktop change within the timeout. Not an error.
    Timeout,
    /// Duplication is gone. Drop the capture and reopen with backoff.
    Lost(windows::core::Error),
}

pub struct OutputCapture {
    duplication: IDXGIOutputDuplication,
    format: DXGI_FORMAT,
    hdr_active: bool,
    frame_time_ms: u32,
    capability: OutputCapability,
    frame_held: bool,
}

impl OutputCapture {
    /// Open duplication on the DXGI output backing `target`.
    ///
    /// Negotiates FP16 first so HDR desktops arrive as scRGB; systems without
    /// `IDXGIOutput5` fall back to the legacy 8-bit path. The negotiated
    /// format, not the capability probe, decides whether HDR processing runs.
    pub fn open(device: &ID3D11Device, target: HMONITOR, monitor_index: usize) -> Result<Self> {
        unsafe {
            let dxgi_device: IDXGIDevice = device
                .cast()
                .context("D3D11 device has no DXGI interface")?;
            let adapter = dxgi_device
                .GetAdapter()
                .context("failed to get adapter for duplication")?;

            let mut matched: Option<IDXGIOutput> = None;
            let mut output_index = 0u32;
            loop {
                match adapter.EnumOutputs(output_index) {
                    Ok(output) => {
                        let desc = output.GetDesc().context("output description failed")?;
                        if desc.Monitor == target {
                            matched = Some(output);
                            break;
                        }
                    }
                    Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
                    Err(e) => return Err(e).context("output enumeration failed"),
                }
                output_index += 1;
            }

            let output = matched.ok_or_else(|| {
                CorrectionError::CaptureInit(format!(
                    "no DXGI output matches monitor {monitor_index}"
                ))
            })?;

            let capability = probe_capability(&output, monitor_index);

            let duplication = match output.cast::<IDXGIOutput5>() {
                Ok(output5) => {
                    let formats = [
                        DXGI_FORMAT_R16G16B16A16_FLOAT,
                        DXGI_FORMAT_R10G10B10A2_UNORM,
                        DXGI_FORMAT_B8G8R8A8_UNORM,
                    ];
                    output5
                        .DuplicateOutput1(device, 0, &formats)
                        .map_err(|e| duplication_error(monitor_index, &e))?
                }
                Err(_) => {
                    log_info!(
                        "Monitor {}: no IDXGIOutput5, using legacy duplication",
                        monitor_index
                    );
                    let output1: IDXGIOutput1 =
                        output.cast().context("IDXGIOutput1 unavailable")?;
                    output1
                        .DuplicateOutput(device)
                        .map_err(|e| duplication_error(monitor_index, &e))?
                }
            };

            let mut dupl_desc = DXGI_OUTDUPL_DESC::default();
            duplication.GetDesc(&mut dupl_desc);

            let format = dupl_desc.ModeDesc.Format;
            let hdr_active = format == DXGI_FORMAT_R16G16B16A16_FLOAT;
            let refresh = dupl_desc.ModeDesc.RefreshRate;
            let frame_time_ms = pacing::frame_interval_ms(refresh.Numerator, refresh.Denominator);

            let hz = if refresh.Denominator > 0 {
                refresh.Numerator as f64 / refresh.Denominator as f64
            } else {
                0.0
            };
            log_info!(
                "Monitor {}: duplication {}x{} @ {:.3} Hz, {}, frame timeout {} ms, hdr {}",
                monitor_index,
                dupl_desc.ModeDesc.Width,
                dupl_desc.ModeDesc.Height,
                hz,
                format_name(format),
                frame_time_ms,
                if hdr_active { "on" } else { "off" }
            );

            Ok(Self {
                duplication,
                format,
                hdr_active,
                frame_time_ms,
                capability,
                frame_held: false,
            })
        }
    }

    /// Wait up to `timeout_ms` for a desktop change.
    ///
    /// A returned frame is held until [`release_frame`](Self::release_frame);
    /// acquiring again without releasing fails, so the render pass must
    /// release before the next call.
    pub fn acquire(&mut self, timeout_ms: u32) -> AcquireStatus {
        unsafe {
            let mut frame_info = DXGI_OUTDUPL_FRAME_INFO::default();
            let mut resource: Option<IDXGIResource> = None;
            match self
                .duplication
                .AcquireNextFrame(timeout_ms, &mut frame_info, &mut resource)
            {
                Ok(()) => {
                    self.frame_held = true;
                    let Some(resource) = resource else {
                        self.release_frame();
                        return AcquireStatus::Lost(windows::core::Error::from_hresult(
                            windows::Win32::Graphics::Dxgi::DXGI_ERROR_INVALID_CALL,
                        ));
                    };
                    match resource.cast::<ID3D11Texture2D>() {
                        Ok(texture) => AcquireStatus::Frame(texture),
                        Err(e) => {
                            self.release_frame();
                            AcquireStatus::Lost(e)
                        }
                    }
                }
                Err(e) if e.code() == DXGI_ERROR_WAIT_TIMEOUT => AcquireStatus::Timeout,
                Err(e) => AcquireStatus::Lost(e),
            }
        }
    }

    pub fn release_frame(&mut self) {
        if self.frame_held {
            unsafe {
                let _ = self.duplication.ReleaseFrame();
            }
            self.frame_held = false;
        }
    }

    /// Format the duplication negotiated at open time. A held frame whose
    /// texture format differs means Windows flipped HDR without signaling
    /// access lost, and the whole capture must be rebuilt.
    pub fn format(&self) -> DXGI_FORMAT {
        self.format
    }

    pub fn hdr_active(&self) -> bool {
        self.hdr_active
    }

    pub fn capability(&self) -> OutputCapability {
        self.capability
    }

    pub fn frame_time_ms(&self) -> u32 {
        self.frame_time_ms
    }
}

impl Drop for OutputCapture {
    fn drop(&mut self) {
        self.release_frame();
    }
}

fn probe_capability(output: &IDXGIOutput, monitor_index: usize) -> OutputCapability {
    use windows::Win32::Graphics::Dxgi::Common::DXGI_COLOR_SPACE_RGB_FULL_G2084_NONE_P2020;

    let output6: IDXGIOutput6 = match output.cast() {
        Ok(output6) => output6,
        Err(_) => return OutputCapability::default(),
    };

    let desc1 = match unsafe { output6.GetDesc1() } {
        Ok(desc1) => desc1,
        Err(_) => return OutputCapability::default(),
    };

    let capability = OutputCapability {
        hdr_capable: desc1.ColorSpace == DXGI_COLOR_SPACE_RGB_FULL_G2084_NONE_P2020,
        max_nits: desc1.MaxLuminance,
        max_frame_average_nits: desc1.MaxFullFrameLuminance,
        min_nits: desc1.MinLuminance,
    };
    log_info!(
        "Monitor {}: output {}, max {} nits, full-frame {} nits, min {} nits",
        monitor_index,
        if capability.hdr_capable {
            "HDR (BT.2020 PQ)"
        } else {
            "SDR (sRGB)"
        },
        capability.max_nits,
        capability.max_frame_average_nits,
        capability.min_nits
    );
    capability
}

fn duplication_error(monitor_index: usize, e: &windows::core::Error) -> anyhow::Error {
    let detail = if e.code() == E_ACCESSDENIED {
        "access denied (secure desktop or missing privileges)".to_string()
    } else if e.code() == DXGI_ERROR_UNSUPPORTED {
        "not supported on this system".to_string()
    } else if e.code() == DXGI_ERROR_SESSION_DISCONNECTED {
        "session disconnected".to_string()
    } else {
        format!("{:?}", e.code())
    };
    CorrectionError::CaptureInit(format!("monitor {monitor_index}: {detail}")).into()
}

fn format_name(format: DXGI_FORMAT) -> &'static str {
    match format {
        DXGI_FORMAT_B8G8R8A8_UNORM => "B8G8R8A8 (8-bit SDR)",
        DXGI_FORMAT_R10G10B10A2_UNORM => "R10G10B10A2 (10-bit SDR)",
        DXGI_FORMAT_R16G16B16A16_FLOAT => "R16G16B16A16 (FP16 scRGB)",
        _ => "unknown",
    }
}
