//! Playback engine modules.

pub mod controller;
pub mod conversion;
pub mod dispatcher;
pub mod framebuffer;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod texture_cache;

#[cfg(test)]
pub(crate) mod test_support;

pub use controller::{ObserverHandle, PlaybackController, PlayerConfig};
pub use conversion::ColorConversionPipeline;
pub use framebuffer::{Framebuffer, FramebufferPool, Orientation};
pub use scheduler::{StatsSnapshot, TickHandle};
pub use sink::{FrameSink, RawFrameDelegate};
pub use source::{MediaSource, MediaSourceEvent, MediaStatus, SeekCompletionFn, SyntheticSource};
pub use texture_cache::PlaneTextureCache;
