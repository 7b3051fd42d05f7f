//! 3D LUT images and CPU reference sampling.
//!
//! A [`LutImage`] is the validated, device-independent form of a calibration
//! LUT: a flat RGBA f32 grid with R varying fastest, exactly the layout the
//! GPU texture upload expects. The image is retained for the lifetime of a
//! session so LUT textures can be rebuilt after device loss without touching
//! whatever produced them.
//!
//! The samplers here mirror the kernels: trilinear matches the hardware
//! sampler on texel centers, tetrahedral matches the six-branch kernel path.

use anyhow::{bail, Result};
use glam::Vec3;
use half::f16;

/// Smallest usable LUT edge length.
pub const MIN_LUT_SIZE: usize = 2;
/// Largest edge length the pipeline accepts (128^3 is 16M texels).
pub const MAX_LUT_SIZE: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub struct LutImage {
    size: usize,
    texels: Vec<f32>,
}

impl LutImage {
    /// Wraps a flat RGBA grid. `texels` holds size^3 * 4 floats with R
    /// varying fastest, then G, then B.
    pub fn new(size: usize, texels: Vec<f32>) -> Result<Self> {
        if !(MIN_LUT_SIZE..=MAX_LUT_SIZE).contains(&size) {
            bail!(
                "LUT size {} out of range ({}-{})",
                size,
                MIN_LUT_SIZE,
                MAX_LUT_SIZE
            );
        }
        let expected = size * size * size * 4;
        if texels.len() != expected {
            bail!(
                "LUT data length {} does not match size {} (expected {})",
                texels.len(),
                size,
                expected
            );
        }
        Ok(Self { size, texels })
    }

    /// Identity mapping at the given edge length.
    pub fn identity(size: usize) -> Result<Self> {
        if !(MIN_LUT_SIZE..=MAX_LUT_SIZE).contains(&size) {
            bail!(
                "LUT size {} out of range ({}-{})",
                size,
                MIN_LUT_SIZE,
                MAX_LUT_SIZE
            );
        }
        let step = 1.0 / (size - 1) as f32;
        let mut texels = Vec::with_capacity(size * size * size * 4);
        for b in 0..size {
            for g in 0..size {
                for r in 0..size {
                    texels.push(r as f32 * step);
                    texels.push(g as f32 * step);
                    texels.push(b as f32 * step);
                    texels.push(1.0);
                }
            }
        }
        Ok(Self { size, texels })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn texels(&self) -> &[f32] {
        &self.texels
    }

    /// Converts to half floats for the R16G16B16A16_FLOAT texture upload.
    pub fn to_f16_texels(&self) -> Vec<u16> {
        self.texels
            .iter()
            .map(|&v| f16::from_f32(v).to_bits())
            .collect()
    }

    fn texel(&self, r: usize, g: usize, b: usize) -> Vec3 {
        let n = self.size;
        let r = r.min(n - 1);
        let g = g.min(n - 1);
        let b = b.min(n - 1);
        let base = ((b * n + g) * n + r) * 4;
        Vec3::new(
            self.texels[base],
            self.texels[base + 1],
            self.texels[base + 2],
        )
    }

    /// Trilinear sample, equivalent to the hardware linear sampler on
    /// texel centers.
    pub fn sample_trilinear(&self, rgb: Vec3) -> Vec3 {
        let scaled = rgb.clamp(Vec3::ZERO, Vec3::ONE) * (self.size - 1) as f32;
        let base = scaled.floor();
        let f = scaled - base;
        let (x, y, z) = (base.x as usize, base.y as usize, base.z as usize);

        let c000 = self.texel(x, y, z);
        let c100 = self.texel(x + 1, y, z);
        let c010 = self.texel(x, y + 1, z);
        let c110 = self.texel(x + 1, y + 1, z);
        let c001 = self.texel(x, y, z + 1);
        let c101 = self.texel(x + 1, y, z + 1);
        let c011 = self.texel(x, y + 1, z + 1);
        let c111 = self.texel(x + 1, y + 1, z + 1);

        let c00 = c000.lerp(c100, f.x);
        let c10 = c010.lerp(c110, f.x);
        let c01 = c001.lerp(c101, f.x);
        let c11 = c011.lerp(c111, f.x);
        let c0 = c00.lerp(c10, f.y);
        let c1 = c01.lerp(c11, f.y);
        c0.lerp(c1, f.z)
    }

    /// Tetrahedral sample: the cube cell is split into six tetrahedra on the
    /// ordering of the fractional coordinates, removing the diagonal
    /// desaturation trilinear causes on near-neutral input.
    pub fn sample_tetrahedral(&self, rgb: Vec3) -> Vec3 {
        let scaled = rgb.clamp(Vec3::ZERO, Vec3::ONE) * (self.size - 1) as f32;
        let base = scaled.floor();
        let f = scaled - base;
        let (x, y, z) = (base.x as usize, base.y as usize, base.z as usize);

        let c000 = self.texel(x, y, z);
        let c111 = self.texel(x + 1, y + 1, z + 1);

        if f.x >= f.y {
            if f.y >= f.z {
                let c100 = self.texel(x + 1, y, z);
                let c110 = self.texel(x + 1, y + 1, z);
                c000 + (c100 - c000) * f.x + (c110 - c100) * f.y + (c111 - c110) * f.z
            } else if f.x >= f.z {
                let c100 = self.texel(x + 1, y, z);
                let c101 = self.texel(x + 1, y, z + 1);
                c000 + (c100 - c000) * f.x + (c101 - c100) * f.z + (c111 - c101) * f.y
            } else {
                let c001 = self.texel(x, y, z + 1);
                let c101 = self.texel(x + 1, y, z + 1);
                c000 + (c001 - c000) * f.z + (c101 - c001) * f.x + (c111 - c101) * f.y
            }
        } else if f.z >= f.y {
            let c001 = self.texel(x, y, z + 1);
            let c011 = self.texel(x, y + 1, z + 1);
            c000 + (c001 - c000) * f.z + (c011 - c001) * f.y + (c111 - c011) * f.x
        } else if f.x >= f.z {
            let c010 = self.texel(x, y + 1, z);
            let c110 = self.texel(x + 1, y + 1, z);
            c000 + (c010 - c000) * f.y + (c110 - c010) * f.x + (c111 - c110) * f.z
        } else {
            let c010 = self.texel(x, y + 1, z);
            let c011 = self.texel(x, y + 1, z + 1);
            c000 + (c010 - c000) * f.y + (c011 - c010) * f.z + (c111 - c011) * f.x
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_vec3_eq(a: Vec3, b: Vec3, epsilon: f32) {
        for c in 0..3 {
            assert!((a[c] - b[c]).abs() < epsilon, "channel {c}: {a:?} vs {b:?}");
        }
    }

    #[test]
    fn rejects_out_of_range_sizes() {
        assert!(LutImage::new(1, vec![0.0; 4]).is_err());
        assert!(LutImage::new(129, vec![0.0; 129 * 129 * 129 * 4]).is_err());
        assert!(LutImage::identity(0).is_err());
    }

    #[test]
    fn rejects_mismatched_data_length() {
        let err = LutImage::new(17, vec![0.0; 16 * 16 * 16 * 4]).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn accepts_boundary_sizes() {
        assert!(LutImage::new(2, vec![0.0; 2 * 2 * 2 * 4]).is_ok());
        assert!(LutImage::new(128, vec![0.0; 128 * 128 * 128 * 4]).is_ok());
    }

    #[test]
    fn identity_lut_samples_to_input() {
        let lut = LutImage::identity(33).unwrap();
        for rgb in [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.25, 0.5, 0.75),
            Vec3::new(0.13, 0.82, 0.41),
        ] {
            assert_vec3_eq(lut.sample_trilinear(rgb), rgb, 1e-4);
            assert_vec3_eq(lut.sample_tetrahedral(rgb), rgb, 1e-4);
        }
    }

    #[test]
    fn out_of_range_input_is_clamped() {
        let lut = LutImage::identity(17).unwrap();
        let out = lut.sample_tetrahedral(Vec3::new(1.5, -0.5, 0.5));
        assert_vec3_eq(out, Vec3::new(1.0, 0.0, 0.5), 1e-4);
    }

    #[test]
    fn gain_lut_scales_output() {
        // 2^3 LUT that halves every channel.
        let mut texels = Vec::new();
        for b in 0..2 {
            for g in 0..2 {
                for r in 0..2 {
                    texels.extend_from_slice(&[
                        r as f32 * 0.5,
                        g as f32 * 0.5,
                        b as f32 * 0.5,
                        1.0,
                    ]);
                }
            }
        }
        let lut = LutImage::new(2, texels).unwrap();
        assert_vec3_eq(
            lut.sample_trilinear(Vec3::new(0.8, 0.4, 0.2)),
            Vec3::new(0.4, 0.2, 0.1),
            1e-5,
        );
        assert_vec3_eq(
            lut.sample_tetrahedral(Vec3::new(0.8, 0.4, 0.2)),
            Vec3::new(0.4, 0.2, 0.1),
            1e-5,
        );
    }

    #[test]
    fn tetrahedral_agrees_with_trilinear_on_separable_data() {
        // Both interpolators are exact on data that is linear per axis, so
        // every fractional ordering branch must agree.
        let lut = LutImage::identity(5).unwrap();
        for rgb in [
            Vec3::new(0.9, 0.5, 0.1), // r >= g >= b
            Vec3::new(0.9, 0.1, 0.5), // r >= b >= g
            Vec3::new(0.5, 0.1, 0.9), // b >= r >= g
            Vec3::new(0.1, 0.5, 0.9), // b >= g >= r
            Vec3::new(0.5, 0.9, 0.1), // g >= r >= b
            Vec3::new(0.1, 0.9, 0.5), // g >= b >= r
        ] {
            assert_vec3_eq(lut.sample_tetrahedral(rgb), lut.sample_trilinear(rgb), 1e-4);
        }
    }

    #[test]
    fn f16_conversion_keeps_texel_count_and_precision() {
        let lut = LutImage::identity(9).unwrap();
        let half_texels = lut.to_f16_texels();
        assert_eq!(half_texels.len(), 9 * 9 * 9 * 4);
        for (h, f) in half_texels.iter().zip(lut.texels()) {
            let back = f16::from_bits(*h).to_f32();
            assert_relative_eq!(back, *f, epsilon = 1e-3);
        }
    }
}
