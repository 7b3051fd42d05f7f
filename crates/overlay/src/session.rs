//! One corrected monitor: capture, overlay window, present surface, LUTs,
//! and the per-frame render pass with loss recovery.
//!
//! The pass mirrors the duplication lifecycle: poll for a frame, reconcile
//! size and format drift, refresh the pipeline constants, run the optional
//! compute kernels, draw the fullscreen triangle, present, and only then
//! release the captured frame. Capture loss drops into an exponential
//! retry ladder; a dynamic-range flip rebuilds the swap chain in the new
//! format before the next frame is shown.

use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::Sender;

use lumaveil_core::{
    analysis::{FrameAnalysis, SessionStats, RESULT_SLOTS},
    log_debug, log_error, log_info, log_warn,
    logger::LogThrottle,
    lut::LutImage,
    peak::PeakSmoothing,
    settings::{CorrectionData, MonitorSettings, PeakOverrideSettings},
};

use windows::Win32::{
    Foundation::HWND,
    Graphics::{Direct3D::*, Direct3D11::*, Dwm::DwmFlush, Dxgi::Common::*, Dxgi::*},
};

use crate::{
    capture::{AcquireStatus, OutputCapture},
    engine::EngineEvent,
    gpu::GpuBackend,
    kernels::{
        fill_analysis_constants, fill_peak_constants, fill_pipeline_constants, AnalysisCadence,
        AnalysisStep, PipelineInputs, ReadbackThrottle,
    },
    monitor::MonitorTarget,
    pacing,
    state::{lut_for_mode, LutChoice, MonitorFlow, Visibility, VisibilityAction},
    surface::PresentSurface,
    window::OverlayWindow,
};

/// Loop-level inputs shared by every session on one pass.
pub struct FrameContext<'a> {
    pub desktop_gamma: bool,
    pub tetrahedral: bool,
    pub sdr_white_nits: f32,
    pub log_peak: bool,
    pub analysis_wanted: bool,
    pub events: &'a Sender<EngineEvent>,
}

/// What one render pass did, so the loop can feed the watchdog and react
/// to mode changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Frame rendered and presented.
    Presented,
    /// No desktop change within the timeout; duplication is healthy.
    Idle,
    /// Capture is down; a reinit attempt ran this pass.
    Recovering,
    /// Reinit found the monitor in the other dynamic range and rebuilt the
    /// surface; peak overrides need reapplying.
    ModeChanged,
    /// Nothing rendered: disabled, mid-rebuild, or a dead surface.
    Skipped,
    /// Present reported device removal; the session disabled itself.
    DeviceLost,
}

/// A 3D LUT with its image retained so device recovery can rebuild the
/// texture without touching the filesystem.
struct LoadedLut {
    image: LutImage,
    srv: Option<ID3D11ShaderResourceView>,
}

/// Dynamic peak detection resources, allocated on first use. The UAV and
/// SRV alias the same 1x1 texture.
struct PeakResources {
    texture: ID3D11Texture2D,
    uav: ID3D11UnorderedAccessView,
    srv: ID3D11ShaderResourceView,
    staging: Option<ID3D11Texture2D>,
    cb_size: (u32, u32),
}

/// Frame analysis resources: the result buffer plus two staging buffers
/// the readback alternates between.
struct AnalysisResources {
    buffer: ID3D11Buffer,
    uav: ID3D11UnorderedAccessView,
    staging: [ID3D11Buffer; 2],
}

pub struct MonitorSession {
    index: usize,
    target: MonitorTarget,
    settings: MonitorSettings,
    enabled: bool,
    flow: MonitorFlow,

    // GPU-side state drops before the window it belongs to.
    capture: Option<OutputCapture>,
    frame_srv: Option<ID3D11ShaderResourceView>,
    surface: Option<PresentSurface>,
    sdr_lut: Option<LoadedLut>,
    hdr_lut: Option<LoadedLut>,
    sdr_correction: CorrectionData,
    hdr_correction: CorrectionData,
    peak: Option<PeakResources>,
    analysis: Option<AnalysisResources>,

    cadence: AnalysisCadence,
    peak_throttle: ReadbackThrottle,
    stats: SessionStats,
    /// Per-frame failures repeat at refresh rate; this keeps them to one
    /// line per second.
    render_log: LogThrottle,

    /// Dynamic range the surface is currently built for.
    hdr: bool,
    /// Drift reference. Seeded from the monitor rect, updated only when an
    /// acquired frame disagrees.
    width: u32,
    height: u32,

    window: OverlayWindow,
}

impl MonitorSession {
    pub fn create(
        gpu: &GpuBackend,
        target: MonitorTarget,
        settings: MonitorSettings,
        sdr_lut_image: Option<LutImage>,
        hdr_lut_image: Option<LutImage>,
    ) -> Result<MonitorSession> {
        let index = target.index;
        let window = OverlayWindow::create(&target)
            .with_context(|| format!("overlay window for monitor {index}"))?;

        let capture = OutputCapture::open(&gpu.device, target.handle, index)
            .with_context(|| format!("desktop duplication for monitor {index}"))?;
        let hdr = capture.hdr_active();

        // An HDR desktop with neither an HDR LUT nor any enabled HDR stage
        // has nothing to correct; SDR LUTs never apply to PQ input.
        let hdr_stages = settings.hdr.primaries_enabled
            || settings.hdr.grayscale.enabled
            || settings.hdr.tonemap.enabled;
        if hdr && hdr_lut_image.is_none() && !hdr_stages {
            return Err(anyhow!(
                "monitor {index} is in HDR mode with no HDR correction configured"
            ));
        }

        let width = target.size.0 as u32;
        let height = target.size.1 as u32;
        let surface = PresentSurface::create(gpu, window.hwnd(), index, width, height, hdr)
            .with_context(|| format!("present surface for monitor {index}"))?;

        let sdr_lut = match sdr_lut_image {
            Some(image) => Some(upload_lut(gpu, index, image, "SDR")?),
            None => None,
        };
        let hdr_lut = hdr_lut_image.and_then(|image| match upload_lut(gpu, index, image, "HDR") {
            Ok(lut) => Some(lut),
            Err(err) => {
                log_warn!("Monitor {index}: HDR LUT upload failed, running without: {err:#}");
                None
            }
        });

        let sdr_correction = settings.sdr.resolve(false);
        let hdr_correction = settings.hdr.resolve(true);

        let mut flow = MonitorFlow::new();
        flow.on_reinit_success();

        log_info!(
            "Monitor {index}: session ready in {} mode, {width}x{height}",
            if hdr { "HDR" } else { "SDR" }
        );

        Ok(MonitorSession {
            index,
            target,
            settings,
            enabled: true,
            flow,
            capture: Some(capture),
            frame_srv: None,
            surface: Some(surface),
            sdr_lut,
            hdr_lut,
            sdr_correction,
            hdr_correction,
            peak: None,
            analysis: None,
            cadence: AnalysisCadence::new(),
            peak_throttle: ReadbackThrottle::new(),
            stats: SessionStats::default(),
            render_log: LogThrottle::per_second(),
            hdr,
            width,
            height,
            window,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn hdr_active(&self) -> bool {
        self.hdr
    }

    pub fn hwnd(&self) -> HWND {
        self.window.hwnd()
    }

    pub fn peak_override(&self) -> PeakOverrideSettings {
        self.settings.peak_override
    }

    pub fn reassert_topmost(&self) {
        if self.overlay_shown() {
            self.window.reassert_topmost();
        }
    }

    fn overlay_shown(&self) -> bool {
        self.flow.visibility() == Visibility::Shown
    }

    pub fn hide_overlay(&mut self) {
        if self.overlay_shown() {
            self.window.hide();
        }
        self.flow.hide();
    }

    pub fn disable(&mut self) {
        self.hide_overlay();
        self.enabled = false;
    }

    /// Live correction swap from the control thread, already resolved.
    pub fn apply_update(&mut self, hdr: bool, data: CorrectionData) {
        if hdr {
            self.hdr_correction = data;
        } else {
            self.sdr_correction = data;
        }
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Drops duplication so the next passes rebuild it from scratch with a
    /// fresh failure ladder. The overlay stays on screen meanwhile.
    pub fn drop_capture(&mut self) {
        self.capture = None;
        self.frame_srv = None;
        self.flow.restart_capture();
    }

    /// Releases everything tied to the lost device. The window survives;
    /// [`rebuild`](Self::rebuild) puts the rest back on the new device.
    pub fn release_device_resources(&mut self) {
        self.hide_overlay();
        self.frame_srv = None;
        self.peak = None;
        self.analysis = None;
        self.capture = None;
        self.surface = None;
        if let Some(lut) = self.sdr_lut.as_mut() {
            lut.srv = None;
        }
        if let Some(lut) = self.hdr_lut.as_mut() {
            lut.srv = None;
        }
    }

    /// Rebuilds capture, surface, and LUT textures on a recovered device.
    pub fn rebuild(&mut self, gpu: &GpuBackend) -> Result<()> {
        if let Some(lut) = self.sdr_lut.as_mut() {
            let (_, srv) = gpu
                .create_lut_texture(&lut.image)
                .with_context(|| format!("SDR LUT rebuild for monitor {}", self.index))?;
            lut.srv = Some(srv);
        }
        if let Some(lut) = self.hdr_lut.as_mut() {
            match gpu.create_lut_texture(&lut.image) {
                Ok((_, srv)) => lut.srv = Some(srv),
                Err(err) => {
                    log_warn!(
                        "Monitor {}: HDR LUT rebuild failed, running without: {err:#}",
                        self.index
                    );
                    lut.srv = None;
                }
            }
        }

        let capture = OutputCapture::open(&gpu.device, self.target.handle, self.index)
            .with_context(|| format!("duplication rebuild for monitor {}", self.index))?;
        self.hdr = capture.hdr_active();
        self.capture = Some(capture);

        self.surface = Some(
            PresentSurface::create(
                gpu,
                self.window.hwnd(),
                self.index,
                self.width,
                self.height,
                self.hdr,
            )
            .with_context(|| format!("surface rebuild for monitor {}", self.index))?,
        );

        self.flow.on_reinit_success();
        self.flow.hide();
        self.enabled = true;
        Ok(())
    }

    /// One pass for this monitor. Sleeps the retry ladder internally while
    /// duplication is down.
    pub fn render(&mut self, gpu: &GpuBackend, ctx: &FrameContext<'_>) -> RenderOutcome {
        if !self.enabled {
            return RenderOutcome::Skipped;
        }
        if !self.flow.is_active() || self.capture.is_none() {
            return self.recover_capture(gpu);
        }
        if !self.surface.as_ref().is_some_and(PresentSurface::render_ready) {
            return RenderOutcome::Skipped;
        }

        // Immediate poll first so menu fades and cursor moves re-present
        // right away; only an idle desktop pays the DwmFlush wait.
        let status = {
            let Some(capture) = self.capture.as_mut() else {
                return RenderOutcome::Skipped;
            };
            let frame_time = capture.frame_time_ms();
            match capture.acquire(0) {
                AcquireStatus::Timeout => {
                    unsafe {
                        let _ = DwmFlush();
                    }
                    capture.acquire(frame_time)
                }
                first => first,
            }
        };

        match status {
            AcquireStatus::Timeout => {
                if self.flow.on_timeout() == VisibilityAction::Show {
                    self.window.reveal();
                }
                RenderOutcome::Idle
            }
            AcquireStatus::Lost(err) => {
                log_warn!("Monitor {}: duplication lost: {err}", self.index);
                if self.overlay_shown() {
                    self.window.hide();
                }
                let delay = self.flow.on_capture_lost();
                self.capture = None;
                std::thread::sleep(delay);
                self.attempt_reopen(gpu)
            }
            AcquireStatus::Frame(texture) => {
                let outcome = self.render_frame(gpu, ctx, texture);
                if let Some(capture) = self.capture.as_mut() {
                    capture.release_frame();
                }
                outcome
            }
        }
    }

    /// Retry pass while duplication is down: sleep the ladder, then reopen.
    fn recover_capture(&mut self, gpu: &GpuBackend) -> RenderOutcome {
        let delay = self.flow.next_retry();
        std::thread::sleep(delay);
        self.attempt_reopen(gpu)
    }

    /// One reopen attempt, with the mode reconciled if it flipped while the
    /// capture was gone.
    fn attempt_reopen(&mut self, gpu: &GpuBackend) -> RenderOutcome {
        let failures = self.flow.failures();
        if pacing::should_log_failure(failures) {
            log_info!("Monitor {}: capture retry, attempt {failures}", self.index);
        }

        match OutputCapture::open(&gpu.device, self.target.handle, self.index) {
            Ok(capture) => {
                self.capture = Some(capture);
                self.flow.on_reinit_success();
                log_info!("Monitor {}: capture recovered", self.index);
                self.reconcile_mode(gpu)
            }
            Err(err) => {
                if pacing::should_log_failure(failures) {
                    log_debug!("Monitor {}: capture reopen failed: {err:#}", self.index);
                }
                RenderOutcome::Recovering
            }
        }
    }

    fn reconcile_mode(&mut self, gpu: &GpuBackend) -> RenderOutcome {
        match self.after_reinit(gpu) {
            Ok(true) => RenderOutcome::ModeChanged,
            Ok(false) => RenderOutcome::Recovering,
            Err(err) => {
                log_error!(
                    "Monitor {}: surface rebuild after mode change failed: {err:#}",
                    self.index
                );
                RenderOutcome::Recovering
            }
        }
    }

    /// After a successful capture reinit: if the dynamic range flipped, the
    /// surface is rebuilt in the new format before any frame is presented.
    fn after_reinit(&mut self, gpu: &GpuBackend) -> Result<bool> {
        let hdr = match self.capture.as_ref() {
            Some(capture) => capture.hdr_active(),
            None => return Ok(false),
        };
        if hdr == self.hdr {
            return Ok(false);
        }

        log_info!(
            "Monitor {}: dynamic range changed to {}, rebuilding surface",
            self.index,
            if hdr { "HDR" } else { "SDR" }
        );
        self.hdr = hdr;
        // Hide and zero the alpha before the old chain goes away; the
        // two-phase reveal restarts with the first frame in the new mode.
        if self.overlay_shown() {
            self.window.hide();
        }
        self.window.make_transparent();
        self.flow.hide();
        if let Some(surface) = self.surface.as_mut() {
            surface.recreate(gpu, self.index, self.width, self.height, hdr)?;
        }
        Ok(true)
    }

    fn render_frame(
        &mut self,
        gpu: &GpuBackend,
        ctx: &FrameContext<'_>,
        texture: ID3D11Texture2D,
    ) -> RenderOutcome {
        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { texture.GetDesc(&mut desc) };

        // Size drift: resolution changed without an access-lost signal.
        if desc.Width != self.width || desc.Height != self.height {
            log_info!(
                "Monitor {}: output now {}x{}, resizing surface",
                self.index,
                desc.Width,
                desc.Height
            );
            self.width = desc.Width;
            self.height = desc.Height;
            if let Some(surface) = self.surface.as_mut() {
                if let Err(err) = surface.resize(gpu, desc.Width, desc.Height) {
                    log_warn!("Monitor {}: swap chain resize failed: {err:#}", self.index);
                }
            }
            self.window.resize(desc.Width, desc.Height);
        }

        // Format drift: Windows can flip HDR without dropping the
        // duplication. Rebuild capture to pick up the new state.
        let capture_format = match self.capture.as_ref() {
            Some(capture) => capture.format(),
            None => return RenderOutcome::Skipped,
        };
        if desc.Format != capture_format {
            log_info!(
                "Monitor {}: capture format changed, rebuilding capture",
                self.index
            );
            self.capture = None;
            return match OutputCapture::open(&gpu.device, self.target.handle, self.index) {
                Ok(capture) => {
                    self.capture = Some(capture);
                    self.flow.on_reinit_success();
                    self.reconcile_mode(gpu)
                }
                Err(err) => {
                    log_warn!(
                        "Monitor {}: capture reopen after format change failed: {err:#}",
                        self.index
                    );
                    RenderOutcome::Recovering
                }
            };
        }

        // The frame view must be created while the frame is held.
        let srv_desc = D3D11_SHADER_RESOURCE_VIEW_DESC {
            Format: desc.Format,
            ViewDimension: D3D_SRV_DIMENSION_TEXTURE2D,
            Anonymous: D3D11_SHADER_RESOURCE_VIEW_DESC_0 {
                Texture2D: D3D11_TEX2D_SRV {
                    MostDetailedMip: 0,
                    MipLevels: 1,
                },
            },
        };
        let mut srv = None;
        let created = unsafe {
            gpu.device
                .CreateShaderResourceView(&texture, Some(&srv_desc), Some(&mut srv))
        };
        if let Err(err) = created {
            if let Some(suppressed) = self.render_log.permit() {
                log_debug!(
                    "Monitor {}: frame view creation failed ({suppressed} suppressed): {err}",
                    self.index
                );
            }
            return RenderOutcome::Skipped;
        }
        let Some(srv) = srv else {
            return RenderOutcome::Skipped;
        };
        self.frame_srv = Some(srv);

        self.upload_pipeline_constants(gpu, ctx);
        self.dispatch_peak(gpu, ctx);
        if !self.draw(gpu) {
            return RenderOutcome::Skipped;
        }
        self.run_analysis(gpu, ctx);
        self.finish_present(gpu)
    }

    fn upload_pipeline_constants(&self, gpu: &GpuBackend, ctx: &FrameContext<'_>) {
        let correction = if self.hdr {
            &self.hdr_correction
        } else {
            &self.sdr_correction
        };
        let lut = if self.hdr {
            self.hdr_lut.as_ref()
        } else {
            self.sdr_lut.as_ref()
        };
        let max_display_nits = self
            .capture
            .as_ref()
            .map(|c| c.capability().max_nits)
            .unwrap_or(0.0);

        let inputs = PipelineInputs {
            hdr: self.hdr,
            sdr_white_nits: ctx.sdr_white_nits,
            max_display_nits,
            lut_size: lut.map(|l| l.image.size() as u32).unwrap_or(0),
            desktop_gamma: ctx.desktop_gamma,
            tetrahedral: ctx.tetrahedral,
            lut_passthrough: self.active_lut_srv().is_none(),
            correction,
        };
        let constants = fill_pipeline_constants(&inputs);
        // A failed map leaves last frame's constants bound; not worth
        // skipping the frame over.
        if let Err(err) = write_constants(gpu, &gpu.pipeline_cb, &constants) {
            if let Some(suppressed) = self.render_log.permit() {
                log_debug!(
                    "Monitor {}: pipeline constants update failed ({suppressed} suppressed): {err:#}",
                    self.index
                );
            }
        }
    }

    /// The LUT view the pixel shader may sample this frame, if any.
    fn active_lut_srv(&self) -> Option<&ID3D11ShaderResourceView> {
        let has_sdr = self.sdr_lut.as_ref().is_some_and(|l| l.srv.is_some());
        let has_hdr = self.hdr_lut.as_ref().is_some_and(|l| l.srv.is_some());
        match lut_for_mode(self.hdr, has_sdr, has_hdr) {
            LutChoice::Sdr => self.sdr_lut.as_ref().and_then(|l| l.srv.as_ref()),
            LutChoice::Hdr => self.hdr_lut.as_ref().and_then(|l| l.srv.as_ref()),
            LutChoice::Passthrough => None,
        }
    }

    fn dispatch_peak(&mut self, gpu: &GpuBackend, ctx: &FrameContext<'_>) {
        let wanted = {
            let tonemap = if self.hdr {
                &self.hdr_correction.tonemap
            } else {
                &self.sdr_correction.tonemap
            };
            self.hdr && tonemap.enabled && tonemap.dynamic_peak
        };
        if !wanted {
            return;
        }
        let Some(kernel) = gpu.peak_kernel.as_ref() else {
            return;
        };

        if self.peak.is_none() {
            match create_peak_resources(gpu) {
                Ok(resources) => self.peak = Some(resources),
                Err(err) => {
                    if let Some(suppressed) = self.render_log.permit() {
                        log_warn!(
                            "Monitor {}: peak detection resources failed ({suppressed} suppressed): {err:#}",
                            self.index
                        );
                    }
                    return;
                }
            }
        }
        let Some(peak) = self.peak.as_mut() else {
            return;
        };
        let Some(frame_srv) = self.frame_srv.as_ref() else {
            return;
        };

        // The parameter block only changes with the frame dimensions.
        if peak.cb_size != (self.width, self.height) {
            let constants = fill_peak_constants(self.width, self.height, &PeakSmoothing::default());
            if write_constants(gpu, &kernel.params, &constants).is_ok() {
                peak.cb_size = (self.width, self.height);
            }
        }

        unsafe {
            gpu.context.CSSetShader(&kernel.shader, None);
            gpu.context
                .CSSetConstantBuffers(0, Some(&[Some(kernel.params.clone())]));
            gpu.context
                .CSSetShaderResources(0, Some(&[Some(frame_srv.clone())]));
            gpu.context
                .CSSetUnorderedAccessViews(0, 1, Some(&Some(peak.uav.clone())), None);
            gpu.context.Dispatch(1, 1, 1);

            // Unbind so the peak texture can rebind as an input below.
            let no_uav: Option<ID3D11UnorderedAccessView> = None;
            gpu.context.CSSetUnorderedAccessViews(0, 1, Some(&no_uav), None);
            gpu.context.CSSetShaderResources(0, Some(&[None]));
        }

        if !(ctx.log_peak || ctx.analysis_wanted) {
            return;
        }
        if !self.peak_throttle.due(Instant::now()) {
            return;
        }

        if peak.staging.is_none() {
            match create_peak_staging(gpu) {
                Ok(staging) => peak.staging = Some(staging),
                Err(err) => {
                    log_warn!("Monitor {}: peak staging failed: {err:#}", self.index);
                    return;
                }
            }
        }
        let Some(staging) = peak.staging.as_ref() else {
            return;
        };

        unsafe {
            gpu.context.CopyResource(staging, &peak.texture);
            let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
            if gpu
                .context
                .Map(staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
                .is_ok()
            {
                let nits = std::ptr::read(mapped.pData as *const f32);
                gpu.context.Unmap(staging, 0);
                if ctx.log_peak {
                    log_info!("Monitor {}: detected peak {nits:.1} nits", self.index);
                }
                let _ = ctx.events.send(EngineEvent::DetectedPeak {
                    monitor: self.index,
                    nits,
                });
            }
        }
    }

    fn run_analysis(&mut self, gpu: &GpuBackend, ctx: &FrameContext<'_>) {
        // Analysis runs on the primary output only.
        if self.index != 0 || !ctx.analysis_wanted {
            return;
        }
        let Some(kernel) = gpu.analysis_kernel.as_ref() else {
            return;
        };

        if self.analysis.is_none() {
            match create_analysis_resources(gpu) {
                Ok(resources) => self.analysis = Some(resources),
                Err(err) => {
                    if let Some(suppressed) = self.render_log.permit() {
                        log_warn!(
                            "Monitor {}: analysis resources failed ({suppressed} suppressed): {err:#}",
                            self.index
                        );
                    }
                    return;
                }
            }
        }
        let Some(resources) = self.analysis.as_ref() else {
            return;
        };
        let Some(frame_srv) = self.frame_srv.as_ref() else {
            return;
        };

        match self.cadence.advance() {
            AnalysisStep::Idle => {}
            AnalysisStep::Dispatch { write_index } => {
                let constants = fill_analysis_constants(self.width, self.height, self.hdr);
                if write_constants(gpu, &kernel.params, &constants).is_err() {
                    return;
                }
                unsafe {
                    gpu.context
                        .ClearUnorderedAccessViewUint(&resources.uav, &[0u32; 4]);
                    gpu.context.CSSetShader(&kernel.shader, None);
                    gpu.context
                        .CSSetConstantBuffers(0, Some(&[Some(kernel.params.clone())]));
                    gpu.context
                        .CSSetShaderResources(0, Some(&[Some(frame_srv.clone())]));
                    gpu.context.CSSetUnorderedAccessViews(
                        0,
                        1,
                        Some(&Some(resources.uav.clone())),
                        None,
                    );
                    gpu.context.Dispatch(1, 1, 1);

                    let no_uav: Option<ID3D11UnorderedAccessView> = None;
                    gpu.context.CSSetUnorderedAccessViews(0, 1, Some(&no_uav), None);
                    gpu.context.CSSetShaderResources(0, Some(&[None]));

                    gpu.context
                        .CopyResource(&resources.staging[write_index], &resources.buffer);
                }
            }
            AnalysisStep::Readback { read_index } => unsafe {
                let staging = &resources.staging[read_index];
                let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
                if gpu
                    .context
                    .Map(staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
                    .is_ok()
                {
                    let mut raw = [0u32; RESULT_SLOTS];
                    std::ptr::copy_nonoverlapping(
                        mapped.pData as *const u32,
                        raw.as_mut_ptr(),
                        RESULT_SLOTS,
                    );
                    gpu.context.Unmap(staging, 0);

                    let frame = FrameAnalysis::from_raw(&raw);
                    self.stats.observe(&frame);
                    let _ = ctx.events.send(EngineEvent::Analysis {
                        monitor: self.index,
                        frame,
                        stats: self.stats,
                    });
                }
            },
        }
    }

    fn draw(&self, gpu: &GpuBackend) -> bool {
        let Some(rtv) = self.surface.as_ref().and_then(PresentSurface::rtv) else {
            return false;
        };
        let Some(frame_srv) = self.frame_srv.as_ref() else {
            return false;
        };

        unsafe {
            gpu.context
                .ClearRenderTargetView(rtv, &[0.0, 0.0, 0.0, 0.0]);

            let viewport = D3D11_VIEWPORT {
                TopLeftX: 0.0,
                TopLeftY: 0.0,
                Width: self.width as f32,
                Height: self.height as f32,
                MinDepth: 0.0,
                MaxDepth: 1.0,
            };
            gpu.context.RSSetViewports(Some(&[viewport]));
            gpu.context
                .OMSetRenderTargets(Some(&[Some(rtv.clone())]), None);

            gpu.context.VSSetShader(&gpu.vertex_shader, None);
            gpu.context.PSSetShader(&gpu.pixel_shader, None);
            gpu.context
                .PSSetConstantBuffers(0, Some(&[Some(gpu.pipeline_cb.clone())]));
            gpu.context
                .PSSetShaderResources(0, Some(&[Some(frame_srv.clone())]));
            gpu.context
                .PSSetShaderResources(1, Some(&[self.active_lut_srv().cloned()]));
            gpu.context
                .PSSetShaderResources(2, Some(&[Some(gpu.noise_srv.clone())]));
            if let Some(peak) = self.peak.as_ref() {
                gpu.context
                    .PSSetShaderResources(3, Some(&[Some(peak.srv.clone())]));
            }
            gpu.context.PSSetSamplers(
                0,
                Some(&[
                    Some(gpu.sampler_point.clone()),
                    Some(gpu.sampler_linear.clone()),
                    Some(gpu.sampler_wrap.clone()),
                ]),
            );

            gpu.context
                .IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            gpu.context.Draw(3, 0);
        }
        true
    }

    fn finish_present(&mut self, gpu: &GpuBackend) -> RenderOutcome {
        let hr = match self.surface.as_ref() {
            Some(surface) => surface.present(),
            None => return RenderOutcome::Skipped,
        };

        if hr == DXGI_ERROR_DEVICE_REMOVED || hr == DXGI_ERROR_DEVICE_RESET {
            let reason = gpu.device_removed_reason().map(|r| r.0).unwrap_or(0);
            log_error!(
                "Monitor {}: device lost during present: {:#x} (reason {:#x})",
                self.index,
                hr.0,
                reason
            );
            // Hide right away so a dead overlay never blocks the desktop.
            self.disable();
            return RenderOutcome::DeviceLost;
        }

        match self.flow.on_present() {
            VisibilityAction::Commit => unsafe {
                // Make sure the frame reached the compositor before the
                // visual tree goes live.
                gpu.context.Flush();
                let _ = gpu.dcomp.Commit();
            },
            VisibilityAction::Show => self.window.reveal(),
            VisibilityAction::None => {}
        }
        RenderOutcome::Presented
    }
}

fn upload_lut(gpu: &GpuBackend, index: usize, image: LutImage, mode: &str) -> Result<LoadedLut> {
    let (_, srv) = gpu
        .create_lut_texture(&image)
        .with_context(|| format!("{mode} LUT texture for monitor {index}"))?;
    let size = image.size();
    log_info!("Monitor {index}: {mode} LUT loaded, {size}x{size}x{size}");
    Ok(LoadedLut {
        image,
        srv: Some(srv),
    })
}

fn write_constants<T: Copy>(gpu: &GpuBackend, buffer: &ID3D11Buffer, data: &[T]) -> Result<()> {
    unsafe {
        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        gpu.context
            .Map(buffer, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut mapped))
            .context("map constant buffer")?;
        std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.pData as *mut T, data.len());
        gpu.context.Unmap(buffer, 0);
    }
    Ok(())
}

fn create_peak_resources(gpu: &GpuBackend) -> Result<PeakResources> {
    unsafe {
        let desc = D3D11_TEXTURE2D_DESC {
            Width: 1,
            Height: 1,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_R32_FLOAT,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: (D3D11_BIND_SHADER_RESOURCE.0 | D3D11_BIND_UNORDERED_ACCESS.0) as u32,
            ..Default::default()
        };
        let mut texture = None;
        gpu.device
            .CreateTexture2D(&desc, None, Some(&mut texture))
            .context("peak result texture")?;
        let texture = texture.context("peak result texture")?;

        let mut uav = None;
        gpu.device
            .CreateUnorderedAccessView(&texture, None, Some(&mut uav))
            .context("peak result UAV")?;
        let uav = uav.context("peak result UAV")?;

        let mut srv = None;
        gpu.device
            .CreateShaderResourceView(&texture, None, Some(&mut srv))
            .context("peak result SRV")?;
        let srv = srv.context("peak result SRV")?;

        Ok(PeakResources {
            texture,
            uav,
            srv,
            staging: None,
            cb_size: (0, 0),
        })
    }
}

fn create_peak_staging(gpu: &GpuBackend) -> Result<ID3D11Texture2D> {
    unsafe {
        let desc = D3D11_TEXTURE2D_DESC {
            Width: 1,
            Height: 1,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_R32_FLOAT,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            ..Default::default()
        };
        let mut staging = None;
        gpu.device
            .CreateTexture2D(&desc, None, Some(&mut staging))
            .context("peak staging texture")?;
        staging.context("peak staging texture")
    }
}

fn create_analysis_resources(gpu: &GpuBackend) -> Result<AnalysisResources> {
    unsafe {
        let byte_width = (RESULT_SLOTS * std::mem::size_of::<u32>()) as u32;
        let desc = D3D11_BUFFER_DESC {
            ByteWidth: byte_width,
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: D3D11_BIND_UNORDERED_ACCESS.0 as u32,
            MiscFlags: D3D11_RESOURCE_MISC_BUFFER_STRUCTURED.0 as u32,
            StructureByteStride: std::mem::size_of::<u32>() as u32,
            ..Default::default()
        };
        let mut buffer = None;
        gpu.device
            .CreateBuffer(&desc, None, Some(&mut buffer))
            .context("analysis result buffer")?;
        let buffer = buffer.context("analysis result buffer")?;

        let uav_desc = D3D11_UNORDERED_ACCESS_VIEW_DESC {
            Format: DXGI_FORMAT_UNKNOWN,
            ViewDimension: D3D11_UAV_DIMENSION_BUFFER,
            Anonymous: D3D11_UNORDERED_ACCESS_VIEW_DESC_0 {
                Buffer: D3D11_BUFFER_UAV {
                    FirstElement: 0,
                    NumElements: RESULT_SLOTS as u32,
                    Flags: 0,
                },
            },
        };
        let mut uav = None;
        gpu.device
            .CreateUnorderedAccessView(&buffer, Some(&uav_desc), Some(&mut uav))
            .context("analysis result UAV")?;
        let uav = uav.context("analysis result UAV")?;

        let staging_desc = D3D11_BUFFER_DESC {
            ByteWidth: byte_width,
            Usage: D3D11_USAGE_STAGING,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            ..Default::default()
        };
        let mut first = None;
        gpu.device
            .CreateBuffer(&staging_desc, None, Some(&mut first))
            .context("analysis staging buffer")?;
        let mut second = None;
        gpu.device
            .CreateBuffer(&staging_desc, None, Some(&mut second))
            .context("analysis staging buffer")?;

        Ok(AnalysisResources {
            buffer,
            uav,
            staging: [
                first.context("analysis staging buffer")?,
                second.context("analysis staging buffer")?,
            ],
        })
    }
}
