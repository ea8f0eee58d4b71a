//! The public playback controller.
//!
//! Composes the scheduler, seek coordinator, observer queue, conversion
//! pipeline and framebuffer pool behind a handle whose operations all
//! marshal onto the serialized engine thread. Reads (position, duration,
//! phase, stats) come from shared mirrors the engine refreshes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use prism_video_core::{
    ColorMatrix, ObserverId, PlaybackPhase, PlaybackState, PlayerError, TimeObserver,
};

use super::conversion::ColorConversionPipeline;
use super::framebuffer::{FramebufferPool, Orientation};
use super::scheduler::{
    tick_handle, EngineCommand, EngineThread, FrameScheduler, SharedState, StatsSnapshot,
    TickHandle,
};
use super::sink::{FrameSink, RawFrameDelegate};
use super::source::MediaSource;

/// Construction-time playback configuration.
///
/// Everything here can also be changed at runtime through the controller.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Playback rate (> 0)
    pub rate: f32,
    /// Start muted
    pub muted: bool,
    /// Restart from the start boundary at the end
    pub looping: bool,
    /// Optional trim-in point
    pub start_boundary: Option<Duration>,
    /// Optional trim-out point
    pub end_boundary: Option<Duration>,
    /// YUV to RGB transform
    pub matrix: ColorMatrix,
    /// Output surface orientation
    pub orientation: Orientation,
    /// Framebuffer pool budget in bytes (None for the default)
    pub pool_budget: Option<usize>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            rate: 1.0,
            muted: false,
            looping: false,
            start_boundary: None,
            end_boundary: None,
            matrix: ColorMatrix::bt601_full_range(),
            orientation: Orientation::Up,
            pool_budget: None,
        }
    }
}

impl PlayerConfig {
    /// Sets the playback rate.
    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }

    /// Sets whether audio starts muted.
    pub fn with_muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    /// Sets whether playback loops.
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Sets the trim boundaries.
    pub fn with_boundaries(
        mut self,
        start: Option<Duration>,
        end: Option<Duration>,
    ) -> Self {
        self.start_boundary = start;
        self.end_boundary = end;
        self
    }

    /// Sets the conversion matrix.
    pub fn with_matrix(mut self, matrix: ColorMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    /// Sets the output orientation.
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Sets the framebuffer pool budget in bytes.
    pub fn with_pool_budget(mut self, budget: usize) -> Self {
        self.pool_budget = Some(budget);
        self
    }
}

/// Handle returned from [`PlaybackController::add_time_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverHandle(ObserverId);

/// Drives a media source at display-refresh cadence and publishes converted
/// frames to downstream consumers.
///
/// Dropping the controller shuts the engine down, releases the held
/// framebuffer, and joins the engine and delivery threads.
pub struct PlaybackController {
    engine: EngineThread,
    shared: Arc<SharedState>,
    tick_active: Arc<AtomicBool>,
    next_observer_id: AtomicU64,
}

impl PlaybackController {
    /// Builds the engine around an opened media source.
    ///
    /// Fails when the configuration is unusable or the conversion program
    /// cannot be prepared; no half-initialized controller is ever returned.
    pub fn open(
        source: Box<dyn MediaSource>,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        config: PlayerConfig,
    ) -> Result<Self, PlayerError> {
        if !(config.rate.is_finite() && config.rate > 0.0) {
            return Err(PlayerError::OpenFailed(format!(
                "playback rate must be positive, got {}",
                config.rate
            )));
        }

        let converter =
            ColorConversionPipeline::new(device.clone(), queue.clone(), config.matrix)?;
        let pool = match config.pool_budget {
            Some(budget) => FramebufferPool::new(device.clone(), budget),
            None => FramebufferPool::with_default_budget(device.clone()),
        };
        let state = PlaybackState {
            is_playing: false,
            rate: config.rate,
            is_muted: config.muted,
            looping: config.looping,
            start_boundary: config.start_boundary,
            end_boundary: config.end_boundary,
        };

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(SharedState::default());
        let tick_active = Arc::new(AtomicBool::new(false));

        let scheduler = FrameScheduler::new(
            source,
            converter,
            pool,
            state,
            config.orientation,
            command_tx.clone(),
            Arc::clone(&shared),
            Arc::clone(&tick_active),
        );
        let engine = EngineThread::spawn(scheduler, command_tx, command_rx);

        let controller = Self {
            engine,
            shared,
            tick_active,
            next_observer_id: AtomicU64::new(1),
        };
        if config.muted {
            controller.send(EngineCommand::SetMuted(true));
        }
        Ok(controller)
    }

    fn send(&self, command: EngineCommand) {
        let _ = self.engine.command_tx().send(command);
    }

    /// Starts playback from the start boundary.
    pub fn start(&self) {
        self.send(EngineCommand::Start);
    }

    /// Resumes playback at the configured rate without seeking.
    pub fn resume(&self) {
        self.send(EngineCommand::Resume);
    }

    /// Pauses playback.
    pub fn pause(&self) {
        self.send(EngineCommand::Pause);
    }

    /// Stops playback: pauses, clears the active observer subset,
    /// deactivates the scheduler and releases the held framebuffer.
    pub fn stop(&self) {
        self.send(EngineCommand::Stop);
    }

    /// Seeks to `time`, coalescing with any seek already in flight.
    ///
    /// Resuming seeks use a small symmetric tolerance window to keep
    /// scrubbing smooth; non-resuming seeks are exact.
    pub fn seek(&self, time: Duration, resume_after_seeking: bool) {
        self.send(EngineCommand::Seek {
            target: time,
            resume_after: resume_after_seeking,
        });
    }

    /// Registers a callback fired when playback reaches `time`.
    ///
    /// The callback runs on the delivery thread, once per playback pass.
    pub fn add_time_observer(
        &self,
        time: Duration,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> ObserverHandle {
        let id = ObserverId::new(self.next_observer_id.fetch_add(1, Ordering::Relaxed));
        self.send(EngineCommand::AddObserver(TimeObserver::new(
            id,
            time,
            Arc::new(callback),
        )));
        ObserverHandle(id)
    }

    /// Unregisters a time observer; its callback will never fire afterwards.
    pub fn remove_time_observer(&self, handle: ObserverHandle) {
        self.send(EngineCommand::RemoveObserver(handle.0));
    }

    /// Attaches a downstream frame consumer.
    pub fn add_sink(&self, sink: Box<dyn FrameSink>, input_slot: usize) {
        self.send(EngineCommand::AddSink { sink, input_slot });
    }

    /// Installs (or clears) the raw-buffer delegate.
    pub fn set_raw_delegate(&self, delegate: Option<Box<dyn RawFrameDelegate>>) {
        self.send(EngineCommand::SetRawDelegate(delegate));
    }

    /// Changes the playback rate (> 0; applied immediately while playing).
    pub fn set_playback_rate(&self, rate: f32) {
        self.send(EngineCommand::SetRate(rate));
    }

    /// Mutes or unmutes source audio.
    pub fn set_muted(&self, muted: bool) {
        self.send(EngineCommand::SetMuted(muted));
    }

    /// Enables or disables looping.
    pub fn set_looping(&self, looping: bool) {
        self.send(EngineCommand::SetLooping(looping));
    }

    /// Replaces the trim boundaries. Takes effect on the next playback pass.
    pub fn set_boundaries(&self, start: Option<Duration>, end: Option<Duration>) {
        self.send(EngineCommand::SetBoundaries { start, end });
    }

    /// Replaces the conversion matrix.
    pub fn set_conversion_matrix(&self, matrix: ColorMatrix) {
        self.send(EngineCommand::SetMatrix(matrix));
    }

    /// The handle the external periodic signal should drive.
    pub fn tick_handle(&self) -> TickHandle {
        tick_handle(
            self.engine.command_tx().clone(),
            Arc::clone(&self.tick_active),
        )
    }

    /// Last observed playback position.
    pub fn position(&self) -> Duration {
        *self.shared.position.lock()
    }

    /// Media duration, when the source knows it.
    pub fn duration(&self) -> Option<Duration> {
        *self.shared.duration.lock()
    }

    /// Current playback phase.
    pub fn phase(&self) -> PlaybackPhase {
        *self.shared.phase.lock()
    }

    /// Engine counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}
