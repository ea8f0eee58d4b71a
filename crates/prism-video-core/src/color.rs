//! YUV to RGB conversion matrices.
//!
//! The conversion applied by the GPU pipeline is a fixed linear transform in
//! normalized [0, 1] space: `rgb = clamp(matrix * (yuv + offset), 0, 1)`.
//! This module also serves as the CPU reference implementation the shader is
//! tested against.

use glam::{Mat3, Vec3};

/// A 3x3 color conversion matrix plus a per-channel input offset.
///
/// Luma and chroma samples are 8-bit unsigned, normalized to [0, 1] before
/// the transform. The offset recenters chroma around zero (and, for video
/// range, removes the luma footroom); the matrix then maps to RGB. Output is
/// saturated to [0, 1] with no further clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMatrix {
    /// Column-major 3x3 transform (columns multiply y, u, v respectively)
    pub matrix: Mat3,
    /// Added to (y, u, v) before the matrix is applied
    pub offset: Vec3,
}

impl ColorMatrix {
    /// BT.601 with full-range (0-255) luma. The default.
    pub fn bt601_full_range() -> Self {
        Self {
            matrix: Mat3::from_cols(
                Vec3::new(1.0, 1.0, 1.0),
                Vec3::new(0.0, -0.344_136, 1.772),
                Vec3::new(1.402, -0.714_136, 0.0),
            ),
            offset: Vec3::new(0.0, -0.5, -0.5),
        }
    }

    /// BT.601 with video-range (16-235) luma.
    pub fn bt601_video_range() -> Self {
        Self {
            matrix: Mat3::from_cols(
                Vec3::new(1.164, 1.164, 1.164),
                Vec3::new(0.0, -0.392, 2.017),
                Vec3::new(1.596, -0.813, 0.0),
            ),
            offset: Vec3::new(-16.0 / 255.0, -0.5, -0.5),
        }
    }

    /// BT.709 with video-range luma (HD content).
    pub fn bt709_video_range() -> Self {
        Self {
            matrix: Mat3::from_cols(
                Vec3::new(1.164, 1.164, 1.164),
                Vec3::new(0.0, -0.213, 2.112),
                Vec3::new(1.793, -0.533, 0.0),
            ),
            offset: Vec3::new(-16.0 / 255.0, -0.5, -0.5),
        }
    }

    /// Returns true if every coefficient is finite.
    pub fn is_finite(&self) -> bool {
        self.matrix.to_cols_array().iter().all(|c| c.is_finite())
            && self.offset.to_array().iter().all(|c| c.is_finite())
    }

    /// Applies the transform to one normalized (y, u, v) sample.
    pub fn apply(&self, yuv: Vec3) -> Vec3 {
        (self.matrix * (yuv + self.offset)).clamp(Vec3::ZERO, Vec3::ONE)
    }

    /// Applies the transform to one 8-bit (y, cb, cr) sample, returning 8-bit RGB.
    ///
    /// CPU reference for the GPU shader; used by tests to validate output.
    pub fn apply_u8(&self, y: u8, cb: u8, cr: u8) -> [u8; 3] {
        let yuv = Vec3::new(y as f32 / 255.0, cb as f32 / 255.0, cr as f32 / 255.0);
        let rgb = self.apply(yuv);
        [
            (rgb.x * 255.0).round() as u8,
            (rgb.y * 255.0).round() as u8,
            (rgb.z * 255.0).round() as u8,
        ]
    }
}

impl Default for ColorMatrix {
    fn default() -> Self {
        Self::bt601_full_range()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Channels must match within one 8-bit step.
    fn assert_rgb_close(actual: [u8; 3], expected: [u8; 3]) {
        for (a, e) in actual.iter().zip(expected.iter()) {
            let diff = (*a as i16 - *e as i16).abs();
            assert!(
                diff <= 1,
                "channel off by {diff}: actual {actual:?}, expected {expected:?}"
            );
        }
    }

    #[test]
    fn test_bt601_full_range_gray() {
        // Neutral chroma maps mid luma straight to mid gray.
        let m = ColorMatrix::bt601_full_range();
        assert_rgb_close(m.apply_u8(128, 128, 128), [128, 128, 128]);
        assert_rgb_close(m.apply_u8(0, 128, 128), [0, 0, 0]);
        assert_rgb_close(m.apply_u8(255, 128, 128), [255, 255, 255]);
    }

    #[test]
    fn test_bt601_full_range_red() {
        // Full-range encoding of pure red: Y=76, Cb=85, Cr=255.
        let m = ColorMatrix::bt601_full_range();
        assert_rgb_close(m.apply_u8(76, 85, 255), [255, 0, 1]);
    }

    #[test]
    fn test_output_saturates() {
        let m = ColorMatrix::bt601_full_range();
        // Extreme chroma must clamp, never wrap.
        let rgb = m.apply(Vec3::new(1.0, 1.0, 1.0));
        assert!(rgb.max_element() <= 1.0);
        assert!(rgb.min_element() >= 0.0);
    }

    #[test]
    fn test_is_finite() {
        assert!(ColorMatrix::bt601_full_range().is_finite());
        let mut bad = ColorMatrix::default();
        bad.offset.x = f32::NAN;
        assert!(!bad.is_finite());
    }
}
