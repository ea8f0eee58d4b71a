//! Downstream consumer seams.

use std::time::Duration;

use prism_video_core::PlanarPixelBuffer;

use super::framebuffer::Framebuffer;

/// Receives converted frames from the engine.
///
/// Called on the engine thread once per successful conversion. The engine
/// holds the frame's reference for the duration of the call; a sink that
/// keeps the frame must `retain()` it and later `release()` exactly once.
pub trait FrameSink: Send {
    /// Pushes one converted frame into the consumer's input slot.
    fn push_frame(&mut self, framebuffer: &Framebuffer, input_slot: usize);
}

/// Optional hook receiving the raw planar buffer before conversion.
///
/// For consumers that need unconverted plane data. Called on the engine
/// thread; heavy work belongs on the consumer's own threads.
pub trait RawFrameDelegate: Send {
    /// Observes the raw buffer for the frame about to be converted.
    fn raw_frame(&mut self, buffer: &PlanarPixelBuffer, pts: Duration);
}
