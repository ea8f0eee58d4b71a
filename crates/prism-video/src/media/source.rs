//! The external media source seam.
//!
//! The engine never decodes media itself: a `MediaSource` supplies decoded
//! planar pixel buffers for presentation times, accepts rate and seek
//! control, and reports status changes through an explicit polling
//! interface. Implementations wrap whatever demuxer/decoder stack the
//! application uses.

use std::collections::VecDeque;
use std::time::Duration;

use prism_video_core::{PlanarPixelBuffer, PlayerError};

/// Readiness of the external source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStatus {
    /// Not yet known
    Unknown,
    /// The source can produce frames and accept rate changes
    ReadyToPlay,
    /// The source failed and will not recover
    Failed,
}

/// Notifications polled from the external source.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSourceEvent {
    /// The source's actual playback rate changed
    RateChanged(f32),
    /// The source's readiness changed
    StatusChanged(MediaStatus),
    /// Playback stalled inside the source (logged, not auto-recovered)
    PlaybackStalled,
    /// The source reached the end of its media
    EndOfMedia,
}

/// Completion callback for an asynchronous seek. The flag reports success;
/// the engine advances its seek state machine either way.
pub type SeekCompletionFn = Box<dyn FnOnce(bool) + Send + 'static>;

/// An external, seekable supplier of decoded planar frames.
///
/// All calls arrive on the engine thread; implementations marshal their own
/// internal callbacks as needed. The seek completion may be invoked from any
/// thread, including synchronously from within `seek` itself.
pub trait MediaSource: Send {
    /// The source's current presentation time.
    fn current_time(&self) -> Duration;

    /// Total media duration, when known.
    fn duration(&self) -> Option<Duration> {
        None
    }

    /// The source's actual playback rate (0 while paused).
    fn rate(&self) -> f32;

    /// Sets the playback rate; 0 pauses the source.
    fn set_rate(&mut self, rate: f32);

    /// Mutes or unmutes source audio.
    fn set_muted(&mut self, _muted: bool) {}

    /// Returns true if a new presentable pixel buffer exists for `for_time`.
    fn has_new_pixel_buffer(&mut self, for_time: Duration) -> bool;

    /// Copies the decoded pixel buffer for `for_time`.
    fn copy_pixel_buffer(&mut self, for_time: Duration) -> Result<PlanarPixelBuffer, PlayerError>;

    /// Starts an asynchronous seek. `completion` must be invoked exactly
    /// once, with false on failure.
    fn seek(
        &mut self,
        target: Duration,
        tolerance_before: Duration,
        tolerance_after: Duration,
        completion: SeekCompletionFn,
    );

    /// Polls one pending notification, if any.
    fn poll_event(&mut self) -> Option<MediaSourceEvent> {
        None
    }
}

/// A procedural media source producing gradient frames at a fixed cadence.
///
/// The internal clock advances by one rate-scaled frame interval per
/// presentability poll, which makes playback fully deterministic for tests
/// and demos: N ticks always land on the same media time. Seeks complete
/// synchronously and land exactly on the clamped target.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    frame_interval: Duration,
    duration: Duration,
    time: Duration,
    rate: f32,
    muted: bool,
    frame_index: u64,
    last_emitted: Option<Duration>,
    end_reported: bool,
    events: VecDeque<MediaSourceEvent>,
}

impl SyntheticSource {
    /// Creates a source of `width`x`height` frames at `fps` over `duration`.
    pub fn new(width: u32, height: u32, fps: f32, duration: Duration) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 30.0 };
        let mut events = VecDeque::new();
        events.push_back(MediaSourceEvent::StatusChanged(MediaStatus::ReadyToPlay));
        Self {
            width,
            height,
            frame_interval: Duration::from_secs_f64(1.0 / fps as f64),
            duration,
            time: Duration::ZERO,
            rate: 0.0,
            muted: false,
            frame_index: 0,
            last_emitted: None,
            end_reported: false,
            events,
        }
    }

    /// Whether audio is currently muted.
    pub fn is_muted(&self) -> bool {
        self.muted
    }
}

impl MediaSource for SyntheticSource {
    fn current_time(&self) -> Duration {
        self.time
    }

    fn duration(&self) -> Option<Duration> {
        Some(self.duration)
    }

    fn rate(&self) -> f32 {
        self.rate
    }

    fn set_rate(&mut self, rate: f32) {
        if (rate - self.rate).abs() > f32::EPSILON {
            self.rate = rate;
            self.events.push_back(MediaSourceEvent::RateChanged(rate));
        }
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn has_new_pixel_buffer(&mut self, _for_time: Duration) -> bool {
        if self.rate > 0.0 && self.time < self.duration {
            let step = Duration::from_secs_f64(
                self.frame_interval.as_secs_f64() * self.rate as f64,
            );
            self.time = (self.time + step).min(self.duration);
            if self.time >= self.duration && !self.end_reported {
                self.end_reported = true;
                self.events.push_back(MediaSourceEvent::EndOfMedia);
            }
        }
        self.last_emitted != Some(self.time)
    }

    fn copy_pixel_buffer(&mut self, for_time: Duration) -> Result<PlanarPixelBuffer, PlayerError> {
        self.last_emitted = Some(self.time);
        self.frame_index += 1;

        let luma_stride = self.width as usize;
        let mut luma = vec![0u8; luma_stride * self.height as usize];
        for (row, chunk) in luma.chunks_exact_mut(luma_stride).enumerate() {
            for (col, sample) in chunk.iter_mut().enumerate() {
                *sample = ((row + col + self.frame_index as usize) % 256) as u8;
            }
        }
        let chroma_width = self.width.div_ceil(2);
        let chroma_height = self.height.div_ceil(2);
        let chroma_stride = chroma_width as usize * 2;
        let chroma = vec![128u8; chroma_stride * chroma_height as usize];

        PlanarPixelBuffer::from_planes(
            self.width,
            self.height,
            for_time,
            luma,
            luma_stride,
            chroma,
            chroma_stride,
        )
    }

    fn seek(
        &mut self,
        target: Duration,
        _tolerance_before: Duration,
        _tolerance_after: Duration,
        completion: SeekCompletionFn,
    ) {
        self.time = target.min(self.duration);
        self.last_emitted = None;
        self.end_reported = false;
        completion(true);
    }

    fn poll_event(&mut self) -> Option<MediaSourceEvent> {
        self.events.pop_front()
    }
}
