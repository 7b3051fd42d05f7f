// Shared GPU arena: one D3D11 device, the compiled shaders, samplers,
// constant buffers and the blue-noise texture, used by every monitor
// session. Created whole and torn down whole so device recovery can
// rebuild everything from scratch.

use anyhow::{Context, Result};
use windows::{
    core::*,
    Win32::{
        Foundation::*,
        Graphics::{
            Direct3D::Fxc::*, Direct3D::*, Direct3D11::*, DirectComposition::*, Dxgi::Common::*,
            Dxgi::*,
        },
    },
};

use lumaveil_core::error::CorrectionError;
use lumaveil_core::lut::LutImage;
use lumaveil_core::noise::{BLUE_NOISE, NOISE_SIZE};
use lumaveil_core::{log_info, log_warn};

use crate::shaders;

/// Pipeline constant buffer: 64 floats filled by `kernels::fill_pipeline_constants`.
pub const PIPELINE_CB_BYTES: u32 = 256;
/// Peak kernel constants: two uints, four floats, two floats padding.
pub const PEAK_CB_BYTES: u32 = 32;
/// Analysis kernel constants: four uints.
pub const ANALYSIS_CB_BYTES: u32 = 16;

/// A compute shader with its constant buffer. Only exists when both
/// compiled and allocated; a missing kernel degrades the feature, not
/// the whole pipeline.
pub struct ComputeKernel {
    pub shader: ID3D11ComputeShader,
    pub params: ID3D11Buffer,
}

pub struct GpuBackend {
    pub device: ID3D11Device,
    pub context: ID3D11DeviceContext,
    pub dcomp: IDCompositionDevice,
    pub vertex_shader: ID3D11VertexShader,
    pub pixel_shader: ID3D11PixelShader,
    pub pipeline_cb: ID3D11Buffer,
    pub peak_kernel: Option<ComputeKernel>,
    pub analysis_kernel: Option<ComputeKernel>,
    pub sampler_point: ID3D11SamplerState,
    pub sampler_linear: ID3D11SamplerState,
    pub sampler_wrap: ID3D11SamplerState,
    pub noise_srv: ID3D11ShaderResourceView,
    pub tearing_supported: bool,
}

impl GpuBackend {
    pub fn new() -> Result<Self> {
        let mut device: Option<ID3D11Device> = None;
        let mut context: Option<ID3D11DeviceContext> = None;
        let mut level = D3D_FEATURE_LEVEL::default();
        let feature_levels = [
            D3D_FEATURE_LEVEL_11_1,
            D3D_FEATURE_LEVEL_11_0,
            D3D_FEATURE_LEVEL_10_1,
            D3D_FEATURE_LEVEL_10_0,
        ];
        let mut flags = D3D11_CREATE_DEVICE_BGRA_SUPPORT;
        if cfg!(debug_assertions) {
            flags |= D3D11_CREATE_DEVICE_DEBUG;
        }

        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                HMODULE::default(),
                flags,
                Some(&feature_levels),
                D3D11_SDK_VERSION,
                Some(&mut device),
                Some(&mut level),
                Some(&mut context),
            )
            .context("failed to create D3D11 device")?;
        }
        let device = device.context("D3D11CreateDevice returned no device")?;
        let context = context.context("D3D11CreateDevice returned no context")?;
        log_info!("D3D11 device created (feature level {:#x})", level.0);

        let tearing_supported = check_tearing_support(&device);
        log_info!(
            "variable refresh presentation {}",
            if tearing_supported { "available" } else { "not available" }
        );

        let vs_blob = compile_shader(shaders::FULLSCREEN_VS, shaders::SHADER_ENTRY, shaders::VS_PROFILE)
            .context("fullscreen vertex shader")?;
        let ps_blob = compile_shader(shaders::CORRECTION_PS, shaders::SHADER_ENTRY, shaders::PS_PROFILE)
            .context("correction pixel shader")?;

        let mut vertex_shader: Option<ID3D11VertexShader> = None;
        let mut pixel_shader: Option<ID3D11PixelShader> = None;
        unsafe {
            device
                .CreateVertexShader(blob_bytes(&vs_blob), None, Some(&mut vertex_shader))
                .context("failed to create vertex shader")?;
            device
                .CreatePixelShader(blob_bytes(&ps_blob), None, Some(&mut pixel_shader))
                .context("failed to create pixel shader")?;
        }
        let vertex_shader = vertex_shader.context("no vertex shader object")?;
        let pixel_shader = pixel_shader.context("no pixel shader object")?;

        // The compute kernels are optional: older hardware without
        // compute support still gets the full correction pipeline.
        let peak_kernel = build_kernel(
            &device,
            shaders::PEAK_CS,
            PEAK_CB_BYTES,
            "dynamic peak detection disabled",
        );
        let analysis_kernel = build_kernel(
            &device,
            shaders::ANALYSIS_CS,
            ANALYSIS_CB_BYTES,
            "frame analysis disabled",
        );

        let sampler_point = create_sampler(
            &device,
            D3D11_FILTER_MIN_MAG_MIP_POINT,
            D3D11_TEXTURE_ADDRESS_CLAMP,
        )?;
        let sampler_linear = create_sampler(
            &device,
            D3D11_FILTER_MIN_MAG_MIP_LINEAR,
            D3D11_TEXTURE_ADDRESS_CLAMP,
        )?;
        let sampler_wrap = create_sampler(
            &device,
            D3D11_FILTER_MIN_MAG_MIP_POINT,
            D3D11_TEXTURE_ADDRESS_WRAP,
        )?;

        let pipeline_cb = create_constant_buffer(&device, PIPELINE_CB_BYTES)
            .context("failed to create pipeline constant buffer")?;

        let noise_srv = create_noise_texture(&device)?;

        // Tie the composition device to our D3D device so swap chain
        // content reaches the compositor without an extra copy.
        let dxgi_device: IDXGIDevice = device.cast().context("device has no DXGI interface")?;
        let dcomp: IDCompositionDevice = unsafe { DCompositionCreateDevice(&dxgi_device) }
            .context("failed to create composition device")?;

        Ok(Self {
            device,
            context,
            dcomp,
            vertex_shader,
            pixel_shader,
            pipeline_cb,
            peak_kernel,
            analysis_kernel,
            sampler_point,
            sampler_linear,
            sampler_wrap,
            noise_srv,
            tearing_supported,
        })
    }

    /// Uploads a LUT as an immutable FP16 3D texture and returns it with
    /// its shader view. The texture reference keeps the SRV's resource
    /// alive across recreation, so both are handed back.
    pub fn create_lut_texture(
        &self,
        image: &LutImage,
    ) -> Result<(ID3D11Texture3D, ID3D11ShaderResourceView)> {
        let texels = image.to_f16_texels();
        let size = image.size() as u32;
        let desc = D3D11_TEXTURE3D_DESC {
            Width: size,
            Height: size,
            Depth: size,
            MipLevels: 1,
            Format: DXGI_FORMAT_R16G16B16A16_FLOAT,
            Usage: D3D11_USAGE_IMMUTABLE,
            BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32,
            CPUAccessFlags: 0,
            MiscFlags: 0,
        };
        let init = D3D11_SUBRESOURCE_DATA {
            pSysMem: texels.as_ptr() as *const _,
            SysMemPitch: size * 4 * 2,
            SysMemSlicePitch: size * size * 4 * 2,
        };
        let mut texture: Option<ID3D11Texture3D> = None;
        let mut srv: Option<ID3D11ShaderResourceView> = None;
        unsafe {
            self.device
                .CreateTexture3D(&desc, Some(&init), Some(&mut texture))
                .with_context(|| format!("failed to create {size}^3 LUT texture"))?;
            let texture = texture.context("no LUT texture object")?;
            self.device
                .CreateShaderResourceView(&texture, None, Some(&mut srv))
                .context("failed to create LUT shader view")?;
            Ok((texture, srv.context("no LUT shader view object")?))
        }
    }

    /// Reports why the device died, or None while it is healthy.
    pub fn device_removed_reason(&self) -> Option<HRESULT> {
        unsafe { self.device.GetDeviceRemovedReason() }
            .err()
            .map(|e| e.code())
    }
}

fn compile_shader(source: &str, entry_point: &str, target: &str) -> Result<ID3DBlob> {
    let entry = std::ffi::CString::new(entry_point)?;
    let profile = std::ffi::CString::new(target)?;
    let mut blob: Option<ID3DBlob> = None;
    let mut error_blob: Option<ID3DBlob> = None;
    let compiled = unsafe {
        D3DCompile(
            source.as_ptr() as *const _,
            source.len(),
            None,
            None,
            None,
            PCSTR(entry.as_ptr() as *const u8),
            PCSTR(profile.as_ptr() as *const u8),
            D3DCOMPILE_ENABLE_STRICTNESS,
            0,
            &mut blob,
            Some(&mut error_blob),
        )
    };
    if let Err(e) = compiled {
        let message = error_blob
            .map(|b| unsafe { String::from_utf8_lossy(blob_bytes(&b)).trim_end().to_string() })
            .unwrap_or_else(|| e.to_string());
        return Err(CorrectionError::ShaderCompile(message).into());
    }
    blob.ok_or_else(|| CorrectionError::ShaderCompile("compiler produced no bytecode".into()).into())
}

unsafe fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
}

/// Compiles an optional compute kernel and allocates its constant
/// buffer. Either step failing logs and yields None.
fn build_kernel(
    device: &ID3D11Device,
    source: &str,
    cb_bytes: u32,
    fallback_note: &str,
) -> Option<ComputeKernel> {
    let blob = match compile_shader(source, shaders::SHADER_ENTRY, shaders::CS_PROFILE) {
        Ok(blob) => blob,
        Err(e) => {
            log_warn!("compute kernel unavailable, {fallback_note}: {e:#}");
            return None;
        }
    };
    let mut shader: Option<ID3D11ComputeShader> = None;
    let created = unsafe { device.CreateComputeShader(blob_bytes(&blob), None, Some(&mut shader)) };
    let shader = match created.map(|()| shader) {
        Ok(Some(shader)) => shader,
        Ok(None) | Err(_) => {
            log_warn!("compute shader creation failed, {fallback_note}");
            return None;
        }
    };
    match create_constant_buffer(device, cb_bytes) {
        Ok(params) => Some(ComputeKernel { shader, params }),
        Err(e) => {
            log_warn!("kernel constant buffer failed, {fallback_note}: {e:#}");
            None
        }
    }
}

fn create_constant_buffer(device: &ID3D11Device, byte_width: u32) -> Result<ID3D11Buffer> {
    let desc = D3D11_BUFFER_DESC {
        ByteWidth: byte_width,
        Usage: D3D11_USAGE_DYNAMIC,
        BindFlags: D3D11_BIND_CONSTANT_BUFFER.0 as u32,
        CPUAccessFlags: D3D11_CPU_ACCESS_WRITE.0 as u32,
        MiscFlags: 0,
        StructureByteStride: 0,
    };
    let mut buffer: Option<ID3D11Buffer> = None;
    unsafe {
        device
            .CreateBuffer(&desc, None, Some(&mut buffer))
            .with_context(|| format!("failed to create {byte_width}-byte constant buffer"))?;
    }
    buffer.context("no constant buffer object")
}

fn create_sampler(
    device: &ID3D11Device,
    filter: D3D11_FILTER,
    address: D3D11_TEXTURE_ADDRESS_MODE,
) -> Result<ID3D11SamplerState> {
    let desc = D3D11_SAMPLER_DESC {
        Filter: filter,
        AddressU: address,
        AddressV: address,
        AddressW: address,
        ..Default::default()
    };
    let mut sampler: Option<ID3D11SamplerState> = None;
    unsafe {
        device
            .CreateSamplerState(&desc, Some(&mut sampler))
            .context("failed to create sampler state")?;
    }
    sampler.context("no sampler object")
}

/// The 64x64 blue-noise tile the pixel shader dithers with, uploaded
/// once as an immutable single-channel texture.
fn create_noise_texture(device: &ID3D11Device) -> Result<ID3D11ShaderResourceView> {
    let desc = D3D11_TEXTURE2D_DESC {
        Width: NOISE_SIZE as u32,
        Height: NOISE_SIZE as u32,
        MipLevels: 1,
        ArraySize: 1,
        Format: DXGI_FORMAT_R8_UNORM,
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Usage: D3D11_USAGE_IMMUTABLE,
        BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32,
        CPUAccessFlags: 0,
        MiscFlags: 0,
    };
    let init = D3D11_SUBRESOURCE_DATA {
        pSysMem: BLUE_NOISE.as_ptr() as *const _,
        SysMemPitch: NOISE_SIZE as u32,
        SysMemSlicePitch: 0,
    };
    let mut texture: Option<ID3D11Texture2D> = None;
    let mut srv: Option<ID3D11ShaderResourceView> = None;
    unsafe {
        device
            .CreateTexture2D(&desc, Some(&init), Some(&mut texture))
            .context("failed to create noise texture")?;
        let texture = texture.context("no noise texture object")?;
        device
            .CreateShaderResourceView(&texture, None, Some(&mut srv))
            .context("failed to create noise shader view")?;
    }
    srv.context("no noise shader view object")
}

fn check_tearing_support(device: &ID3D11Device) -> bool {
    let Ok(dxgi_device) = device.cast::<IDXGIDevice>() else {
        return false;
    };
    let Ok(adapter) = (unsafe { dxgi_device.GetAdapter() }) else {
        return false;
    };
    let Ok(factory) = (unsafe { adapter.GetParent::<IDXGIFactory5>() }) else {
        return false;
    };
    let mut allow = BOOL(0);
    let probed = unsafe {
        factory.CheckFeatureSupport(
            DXGI_FEATURE_PRESENT_ALLOW_TEARING,
            &mut allow as *mut _ as *mut std::ffi::c_void,
            std::mem::size_of::<BOOL>() as u32,
        )
    };
    probed.is_ok() && allow.as_bool()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_buffers_are_16_byte_aligned() {
        assert_eq!(PIPELINE_CB_BYTES % 16, 0);
        assert_eq!(PEAK_CB_BYTES % 16, 0);
        assert_eq!(ANALYSIS_CB_BYTES % 16, 0);
        // 64 floats, matching the pixel shader cbuffer.
        assert_eq!(PIPELINE_CB_BYTES, 64 * 4);
    }
}
