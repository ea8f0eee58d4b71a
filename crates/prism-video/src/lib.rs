//! prism-video: real-time video playback for image-processing graphs.
//!
//! This crate drives an external media source at display-refresh cadence,
//! converts its planar luma/chroma frames into GPU-resident RGB framebuffers
//! via a configurable matrix transform, and exposes frame-accurate timing
//! callbacks plus debounced seeking. It handles:
//! - Seek-request coalescing (at most one seek in flight, latest target wins)
//! - Time-observer scheduling (ordered, exactly-once per playback pass)
//! - YUV to RGB color space conversion on the GPU via wgpu
//! - Reference-counted framebuffer pooling keyed by orientation and size
//! - Playback control (start, resume, pause, stop, loop, trim boundaries)
//!
//! # Example
//!
//! ```ignore
//! use prism_video::{PlaybackController, PlayerConfig, SyntheticSource};
//! use std::time::Duration;
//!
//! let source = Box::new(SyntheticSource::new(640, 360, 30.0, Duration::from_secs(10)));
//! let controller = PlaybackController::open(source, &device, &queue, PlayerConfig::default())?;
//!
//! // Drive the engine from your display-refresh signal:
//! let ticks = controller.tick_handle();
//! // ... on every vsync: if !ticks.tick() { cancel the signal }
//!
//! controller.add_time_observer(Duration::from_secs(2), || println!("two seconds in"));
//! controller.start();
//! ```
//!
//! The media demuxer/decoder is an external collaborator behind the
//! [`MediaSource`] trait; downstream consumers receive frames through
//! [`FrameSink`] and must balance every `retain()` with one `release()`.

pub mod media;

// Re-export the core primitives alongside the engine types.
pub use prism_video_core::{
    ColorMatrix, ObserverId, PixelBufferGuard, PlanarPixelBuffer, PlaybackPhase, PlaybackState,
    PlayerError, SeekCompletion, SeekCoordinator, SeekRequest, TimeObserver, TimeObserverQueue,
};

pub use media::{
    ColorConversionPipeline, Framebuffer, FramebufferPool, FrameSink, MediaSource,
    MediaSourceEvent, MediaStatus, Orientation, PlaneTextureCache, PlaybackController,
    PlayerConfig, RawFrameDelegate, SeekCompletionFn, StatsSnapshot, SyntheticSource, TickHandle,
};

pub use media::controller::ObserverHandle;
