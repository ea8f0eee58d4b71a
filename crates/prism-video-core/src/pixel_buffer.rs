//! Planar pixel buffers handed over by the media source.
//!
//! A buffer carries one full-resolution single-channel luma plane and one
//! half-resolution (both axes) two-channel interleaved chroma plane. Raw
//! plane memory is only reachable through a scoped lock guard, so the unlock
//! runs on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::PlayerError;

/// A decoded planar luma/chroma frame with CPU-accessible pixel data.
#[derive(Debug)]
pub struct PlanarPixelBuffer {
    width: u32,
    height: u32,
    presentation_time: Duration,
    luma: Vec<u8>,
    luma_stride: usize,
    chroma: Vec<u8>,
    chroma_stride: usize,
    locked: AtomicBool,
}

impl PlanarPixelBuffer {
    /// Creates a buffer from raw plane data, validating strides and lengths.
    pub fn from_planes(
        width: u32,
        height: u32,
        presentation_time: Duration,
        luma: Vec<u8>,
        luma_stride: usize,
        chroma: Vec<u8>,
        chroma_stride: usize,
    ) -> Result<Self, PlayerError> {
        if width == 0 || height == 0 {
            return Err(PlayerError::InvalidBuffer(format!(
                "zero dimension {width}x{height}"
            )));
        }
        if luma_stride < width as usize {
            return Err(PlayerError::InvalidBuffer(format!(
                "luma stride {luma_stride} shorter than row of {width}"
            )));
        }
        if luma.len() < luma_stride * height as usize {
            return Err(PlayerError::InvalidBuffer(format!(
                "luma plane {} bytes, need {}",
                luma.len(),
                luma_stride * height as usize
            )));
        }
        let chroma_width = width.div_ceil(2);
        let chroma_height = height.div_ceil(2);
        let chroma_row = chroma_width as usize * 2;
        if chroma_stride < chroma_row {
            return Err(PlayerError::InvalidBuffer(format!(
                "chroma stride {chroma_stride} shorter than row of {chroma_row}"
            )));
        }
        if chroma.len() < chroma_stride * chroma_height as usize {
            return Err(PlayerError::InvalidBuffer(format!(
                "chroma plane {} bytes, need {}",
                chroma.len(),
                chroma_stride * chroma_height as usize
            )));
        }
        Ok(Self {
            width,
            height,
            presentation_time,
            luma,
            luma_stride,
            chroma,
            chroma_stride,
            locked: AtomicBool::new(false),
        })
    }

    /// Creates a buffer filled with constant luma and chroma values.
    ///
    /// Useful for tests and synthetic sources: the conversion output of a
    /// constant buffer can be computed by hand.
    pub fn filled(width: u32, height: u32, pts: Duration, y: u8, cb: u8, cr: u8) -> Self {
        let luma_stride = width as usize;
        let luma = vec![y; luma_stride * height as usize];
        let chroma_width = width.div_ceil(2);
        let chroma_height = height.div_ceil(2);
        let chroma_stride = chroma_width as usize * 2;
        let mut chroma = Vec::with_capacity(chroma_stride * chroma_height as usize);
        for _ in 0..chroma_width as usize * chroma_height as usize {
            chroma.push(cb);
            chroma.push(cr);
        }
        Self {
            width,
            height,
            presentation_time: pts,
            luma,
            luma_stride,
            chroma,
            chroma_stride,
            locked: AtomicBool::new(false),
        }
    }

    /// Full-resolution width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Full-resolution height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Chroma plane width in sample pairs (half the luma width, rounded up).
    pub fn chroma_width(&self) -> u32 {
        self.width.div_ceil(2)
    }

    /// Chroma plane height in rows (half the luma height, rounded up).
    pub fn chroma_height(&self) -> u32 {
        self.height.div_ceil(2)
    }

    /// The media time at which this frame should be displayed.
    pub fn presentation_time(&self) -> Duration {
        self.presentation_time
    }

    /// Locks the buffer for raw memory access.
    ///
    /// The returned guard is the only way to reach plane bytes; dropping it
    /// unlocks the buffer. Locking an already-locked buffer is a programming
    /// error (asserted in debug builds).
    pub fn lock(&self) -> PixelBufferGuard<'_> {
        let was_locked = self.locked.swap(true, Ordering::AcqRel);
        debug_assert!(!was_locked, "pixel buffer locked twice");
        PixelBufferGuard { buffer: self }
    }

    /// Returns true while a lock guard is outstanding.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

/// Scoped access to a locked pixel buffer's planes.
pub struct PixelBufferGuard<'a> {
    buffer: &'a PlanarPixelBuffer,
}

impl PixelBufferGuard<'_> {
    /// Raw luma plane bytes (one byte per pixel, row stride applies).
    pub fn luma(&self) -> &[u8] {
        &self.buffer.luma
    }

    /// Luma row stride in bytes.
    pub fn luma_stride(&self) -> usize {
        self.buffer.luma_stride
    }

    /// Raw chroma plane bytes (interleaved Cb/Cr pairs, row stride applies).
    pub fn chroma(&self) -> &[u8] {
        &self.buffer.chroma
    }

    /// Chroma row stride in bytes.
    pub fn chroma_stride(&self) -> usize {
        self.buffer.chroma_stride
    }

    /// The locked buffer itself, for dimension queries.
    pub fn buffer(&self) -> &PlanarPixelBuffer {
        self.buffer
    }
}

impl Drop for PixelBufferGuard<'_> {
    fn drop(&mut self) {
        self.buffer.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_dimensions() {
        let buf = PlanarPixelBuffer::filled(7, 5, Duration::ZERO, 10, 20, 30);
        assert_eq!(buf.width(), 7);
        assert_eq!(buf.height(), 5);
        assert_eq!(buf.chroma_width(), 4);
        assert_eq!(buf.chroma_height(), 3);

        let guard = buf.lock();
        assert_eq!(guard.luma().len(), 35);
        assert_eq!(guard.chroma().len(), 4 * 2 * 3);
        assert_eq!(guard.chroma()[0], 20);
        assert_eq!(guard.chroma()[1], 30);
    }

    #[test]
    fn test_lock_unlocks_on_drop() {
        let buf = PlanarPixelBuffer::filled(2, 2, Duration::ZERO, 0, 128, 128);
        assert!(!buf.is_locked());
        {
            let _guard = buf.lock();
            assert!(buf.is_locked());
        }
        assert!(!buf.is_locked());
    }

    #[test]
    fn test_from_planes_rejects_short_luma() {
        let result = PlanarPixelBuffer::from_planes(
            4,
            4,
            Duration::ZERO,
            vec![0; 8], // needs 16
            4,
            vec![0; 8],
            4,
        );
        assert!(matches!(result, Err(PlayerError::InvalidBuffer(_))));
    }

    #[test]
    fn test_from_planes_rejects_bad_stride() {
        let result = PlanarPixelBuffer::from_planes(
            4,
            4,
            Duration::ZERO,
            vec![0; 16],
            2, // shorter than a row
            vec![0; 8],
            4,
        );
        assert!(matches!(result, Err(PlayerError::InvalidBuffer(_))));
    }

    #[test]
    fn test_from_planes_accepts_padded_stride() {
        let buf = PlanarPixelBuffer::from_planes(
            4,
            2,
            Duration::from_millis(40),
            vec![0; 16],
            8, // padded rows
            vec![0; 8],
            4,
        )
        .unwrap();
        assert_eq!(buf.presentation_time(), Duration::from_millis(40));
        assert_eq!(buf.lock().luma_stride(), 8);
    }
}
