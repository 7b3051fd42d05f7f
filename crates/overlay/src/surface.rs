//! Swap chain and composition plumbing for one overlay window.
//!
//! Output goes through a premultiplied-alpha flip-model swap chain bound to a
//! DirectComposition visual. The composition is never committed here; the
//! render loop commits after the first frame lands so an empty chain is never
//! on screen. Format tracks the monitor mode: FP16 scRGB in HDR, 10-bit in
//! SDR to keep the corrected gradient banding-free.

use anyhow::{Context, Result};

use lumaveil_core::{log_info, log_warn};

use windows::{
    core::*,
    Win32::{
        Foundation::{HWND, S_OK},
        Graphics::{Direct3D11::*, DirectComposition::*, Dxgi::Common::*, Dxgi::*},
    },
};

use crate::gpu::GpuBackend;

pub struct PresentSurface {
    // Field order is release order: the view drops before the chain, the
    // chain before the visual tree that displays it.
    rtv: Option<ID3D11RenderTargetView>,
    swap_chain: Option<IDXGISwapChain4>,
    visual: IDCompositionVisual,
    #[allow(dead_code)]
    target: IDCompositionTarget,
    format: DXGI_FORMAT,
    width: u32,
    height: u32,
    tearing: bool,
}

impl PresentSurface {
    pub fn create(
        gpu: &GpuBackend,
        hwnd: HWND,
        index: usize,
        width: u32,
        height: u32,
        hdr: bool,
    ) -> Result<Self> {
        let (swap_chain, rtv, format) = build_swap_chain(gpu, index, width, height, hdr)?;
        unsafe {
            let target = gpu
                .dcomp
                .CreateTargetForHwnd(hwnd, true)
                .context("composition target for overlay window")?;
            let visual = gpu.dcomp.CreateVisual().context("composition visual")?;
            visual
                .SetContent(&swap_chain)
                .context("bind swap chain to visual")?;
            target.SetRoot(&visual).context("set visual tree root")?;

            Ok(Self {
                rtv: Some(rtv),
                swap_chain: Some(swap_chain),
                visual,
                target,
                format,
                width,
                height,
                tearing: gpu.tearing_supported,
            })
        }
    }

    pub fn format(&self) -> DXGI_FORMAT {
        self.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn rtv(&self) -> Option<&ID3D11RenderTargetView> {
        self.rtv.as_ref()
    }

    /// False after a failed resize or recreate until the next attempt lands.
    pub fn render_ready(&self) -> bool {
        self.swap_chain.is_some() && self.rtv.is_some()
    }

    /// Resizes the buffers in place, keeping the current format. On failure
    /// the view stays released and the caller retries next frame.
    pub fn resize(&mut self, gpu: &GpuBackend, width: u32, height: u32) -> Result<()> {
        let chain = self
            .swap_chain
            .as_ref()
            .context("resize without a swap chain")?;
        unsafe {
            self.rtv = None;
            chain
                .ResizeBuffers(2, width, height, self.format, chain_flags(self.tearing))
                .context("resize swap chain buffers")?;
            let back_buffer: ID3D11Texture2D =
                chain.GetBuffer(0).context("back buffer after resize")?;
            let mut rtv = None;
            gpu.device
                .CreateRenderTargetView(&back_buffer, None, Some(&mut rtv))
                .context("render target view after resize")?;
            self.rtv = Some(rtv.context("render target view after resize")?);
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Tears the chain down and builds a fresh one in the other mode's
    /// format. The visual and target survive; only the content swaps.
    pub fn recreate(
        &mut self,
        gpu: &GpuBackend,
        index: usize,
        width: u32,
        height: u32,
        hdr: bool,
    ) -> Result<()> {
        unsafe {
            let _ = self.visual.SetContent(None::<&IUnknown>);
        }
        self.rtv = None;
        self.swap_chain = None;

        let (swap_chain, rtv, format) = build_swap_chain(gpu, index, width, height, hdr)?;
        unsafe {
            self.visual
                .SetContent(&swap_chain)
                .context("rebind recreated swap chain")?;
        }
        self.swap_chain = Some(swap_chain);
        self.rtv = Some(rtv);
        self.format = format;
        self.width = width;
        self.height = height;
        log_info!(
            "Monitor {index}: swap chain recreated for {} mode",
            if hdr { "HDR" } else { "SDR" }
        );
        Ok(())
    }

    /// Presents immediately. Returns the raw result so the caller can spot
    /// device removal.
    pub fn present(&self) -> HRESULT {
        let Some(chain) = self.swap_chain.as_ref() else {
            return S_OK;
        };
        let flags = if self.tearing {
            DXGI_PRESENT_ALLOW_TEARING
        } else {
            DXGI_PRESENT(0)
        };
        unsafe { chain.Present(0, flags) }
    }
}

fn chain_flags(tearing: bool) -> DXGI_SWAP_CHAIN_FLAG {
    let mut flags = DXGI_SWAP_CHAIN_FLAG_FRAME_LATENCY_WAITABLE_OBJECT;
    if tearing {
        flags |= DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING;
    }
    flags
}

fn build_swap_chain(
    gpu: &GpuBackend,
    index: usize,
    width: u32,
    height: u32,
    hdr: bool,
) -> Result<(IDXGISwapChain4, ID3D11RenderTargetView, DXGI_FORMAT)> {
    unsafe {
        let format = if hdr {
            DXGI_FORMAT_R16G16B16A16_FLOAT
        } else {
            DXGI_FORMAT_R10G10B10A2_UNORM
        };

        let desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: width,
            Height: height,
            Format: format,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: 2,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            AlphaMode: DXGI_ALPHA_MODE_PREMULTIPLIED,
            Flags: chain_flags(gpu.tearing_supported).0 as u32,
            ..Default::default()
        };

        let dxgi_device: IDXGIDevice = gpu.device.cast()?;
        let adapter = dxgi_device.GetAdapter()?;
        let factory: IDXGIFactory2 = adapter.GetParent()?;
        let chain: IDXGISwapChain1 = factory
            .CreateSwapChainForComposition(&gpu.device, &desc, None)
            .context("create composition swap chain")?;
        let chain: IDXGISwapChain4 = chain.cast()?;

        // scRGB linear in HDR, plain sRGB in SDR.
        let space = if hdr {
            DXGI_COLOR_SPACE_RGB_FULL_G10_NONE_P709
        } else {
            DXGI_COLOR_SPACE_RGB_FULL_G22_NONE_P709
        };
        match chain.CheckColorSpaceSupport(space) {
            Ok(support)
                if support & DXGI_SWAP_CHAIN_COLOR_SPACE_SUPPORT_FLAG_PRESENT.0 as u32 != 0 =>
            {
                chain.SetColorSpace1(space)?;
            }
            _ => log_warn!("Monitor {index}: requested color space not supported for present"),
        }

        if hdr {
            apply_hdr_metadata(&chain, index);
        }

        // DwmFlush paces the loop, not the waitable object. Latency 1 still
        // caps the present queue at a single frame.
        chain.SetMaximumFrameLatency(1)?;

        let back_buffer: ID3D11Texture2D = chain.GetBuffer(0).context("swap chain back buffer")?;
        let mut rtv = None;
        gpu.device
            .CreateRenderTargetView(&back_buffer, None, Some(&mut rtv))
            .context("swap chain render target view")?;
        let rtv = rtv.context("swap chain render target view")?;

        Ok((chain, rtv, format))
    }
}

/// Reports a 10000 nit content peak regardless of the configured tone map so
/// the OS compositor passes our output through untouched.
fn apply_hdr_metadata(chain: &IDXGISwapChain4, index: usize) {
    // Primaries are Rec.709 in 0.00002 units, white point D65, mastering
    // luminance in 0.0001 nits.
    let metadata = DXGI_HDR_METADATA_HDR10 {
        RedPrimary: [32_000, 16_500],
        GreenPrimary: [15_000, 30_000],
        BluePrimary: [7_500, 3_000],
        WhitePoint: [15_635, 16_450],
        MaxMasteringLuminance: 100_000_000,
        MinMasteringLuminance: 0,
        MaxContentLightLevel: 10_000,
        MaxFrameAverageLightLevel: 5_000,
    };
    let result = unsafe {
        chain.SetHDRMetaData(
            DXGI_HDR_METADATA_TYPE_HDR10,
            std::mem::size_of::<DXGI_HDR_METADATA_HDR10>() as u32,
            Some(&metadata as *const _ as *const std::ffi::c_void),
        )
    };
    match result {
        Ok(()) => log_info!("Monitor {index}: HDR metadata set, MaxCLL 10000 nits"),
        Err(err) => log_warn!("Monitor {index}: failed to set HDR metadata: {err}"),
    }
}
