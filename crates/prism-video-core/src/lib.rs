//! prism-video-core: platform-independent playback primitives.
//!
//! This crate holds the pure data structures and math of the playback
//! engine: time-observer scheduling, seek-request coalescing, planar pixel
//! buffers, color conversion matrices, and playback state. The GPU pipeline
//! and engine composition live in the `prism-video` crate.

pub mod color;
pub mod error;
pub mod pixel_buffer;
pub mod seek;
pub mod state;
pub mod time_observer;

pub use color::ColorMatrix;
pub use error::PlayerError;
pub use pixel_buffer::{PixelBufferGuard, PlanarPixelBuffer};
pub use seek::{SeekCompletion, SeekCoordinator, SeekRequest};
pub use state::{PlaybackPhase, PlaybackState};
pub use time_observer::{ObserverCallback, ObserverId, TimeObserver, TimeObserverQueue};
