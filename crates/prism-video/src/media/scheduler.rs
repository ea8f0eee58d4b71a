//! The serialized playback engine.
//!
//! All GPU-touching and state-mutating work runs on one engine thread.
//! Foreign contexts (the external tick signal, seek completions, public API
//! calls) marshal in by sending commands; the thread drains them in arrival
//! order, so pulls and conversions never overlap and at most one conversion
//! is in flight at any time.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use prism_video_core::{
    ColorMatrix, ObserverId, PlaybackPhase, PlaybackState, SeekCoordinator, SeekRequest,
    TimeObserver, TimeObserverQueue,
};

use super::conversion::ColorConversionPipeline;
use super::dispatcher::CallbackDispatcher;
use super::framebuffer::{Framebuffer, FramebufferPool, Orientation};
use super::sink::{FrameSink, RawFrameDelegate};
use super::source::{MediaSource, MediaSourceEvent, MediaStatus};

/// Tolerance window for seeks that resume playback afterwards. Exact seeks
/// during scrubbing thrash the source; a small window keeps resumed
/// playback smooth.
pub(crate) const RESUME_SEEK_TOLERANCE: Duration = Duration::from_millis(250);

/// Slack when comparing the current time against the media duration at end
/// of media (source clocks are not sample-exact).
const END_OF_MEDIA_EPSILON: Duration = Duration::from_millis(40);

/// Commands marshalled onto the engine thread.
pub(crate) enum EngineCommand {
    /// One pulse of the external periodic signal
    Tick,
    Start,
    Resume,
    Pause,
    Stop,
    Seek {
        target: Duration,
        resume_after: bool,
    },
    /// Completion callback of an external seek, success or failure
    SeekFinished {
        request: SeekRequest,
        success: bool,
    },
    /// The synthetic end-boundary observer fired
    BoundaryReached,
    AddObserver(TimeObserver),
    RemoveObserver(ObserverId),
    AddSink {
        sink: Box<dyn FrameSink>,
        input_slot: usize,
    },
    SetRawDelegate(Option<Box<dyn RawFrameDelegate>>),
    SetRate(f32),
    SetMuted(bool),
    SetLooping(bool),
    SetBoundaries {
        start: Option<Duration>,
        end: Option<Duration>,
    },
    SetMatrix(ColorMatrix),
    Shutdown,
}

enum CommandOutcome {
    Continue,
    Shutdown,
}

/// Cloneable handle the external periodic signal drives.
///
/// Returns false once the scheduler is torn down or stopped, telling the
/// signal to cancel itself; further ticks are ignored.
#[derive(Clone)]
pub struct TickHandle {
    command_tx: crossbeam_channel::Sender<EngineCommand>,
    active: Arc<AtomicBool>,
}

impl TickHandle {
    /// Marshals one tick onto the engine thread.
    pub fn tick(&self) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        self.command_tx.send(EngineCommand::Tick).is_ok()
    }

    /// True while the scheduler accepts ticks.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Counters mirrored out of the engine thread.
#[derive(Default)]
pub(crate) struct EngineStats {
    pub(crate) frames_converted: AtomicU64,
    pub(crate) frames_dropped: AtomicU64,
    pub(crate) seeks_issued: AtomicU64,
    pub(crate) stalls: AtomicU64,
}

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Frames successfully converted and published
    pub frames_converted: u64,
    /// Frames dropped (copy, mapping, or pool failure)
    pub frames_dropped: u64,
    /// Seek requests actually issued against the source
    pub seeks_issued: u64,
    /// Stall notifications observed from the source
    pub stalls: u64,
}

impl EngineStats {
    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_converted: self.frames_converted.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            seeks_issued: self.seeks_issued.load(Ordering::Relaxed),
            stalls: self.stalls.load(Ordering::Relaxed),
        }
    }
}

/// State mirrored for lock-cheap reads from any thread: the engine writes,
/// callers read.
pub(crate) struct SharedState {
    pub(crate) position: Mutex<Duration>,
    pub(crate) duration: Mutex<Option<Duration>>,
    pub(crate) phase: Mutex<PlaybackPhase>,
    pub(crate) stats: EngineStats,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            position: Mutex::new(Duration::ZERO),
            duration: Mutex::new(None),
            phase: Mutex::new(PlaybackPhase::Stopped),
            stats: EngineStats::default(),
        }
    }
}

struct SinkBinding {
    sink: Box<dyn FrameSink>,
    input_slot: usize,
}

/// Engine-side composition: pulls frames on ticks, fires observers, converts
/// and publishes, and follows the seek coordinator's decisions.
pub(crate) struct FrameScheduler {
    source: Box<dyn MediaSource>,
    observers: TimeObserverQueue,
    seek: SeekCoordinator,
    converter: ColorConversionPipeline,
    pool: FramebufferPool,
    current: Option<Framebuffer>,
    state: PlaybackState,
    orientation: Orientation,
    sinks: Vec<SinkBinding>,
    raw_delegate: Option<Box<dyn RawFrameDelegate>>,
    dispatcher: CallbackDispatcher,
    command_tx: crossbeam_channel::Sender<EngineCommand>,
    shared: Arc<SharedState>,
    scheduler_active: bool,
    tick_active: Arc<AtomicBool>,
    source_ready: bool,
}

impl FrameScheduler {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        source: Box<dyn MediaSource>,
        converter: ColorConversionPipeline,
        pool: FramebufferPool,
        state: PlaybackState,
        orientation: Orientation,
        command_tx: crossbeam_channel::Sender<EngineCommand>,
        shared: Arc<SharedState>,
        tick_active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            observers: TimeObserverQueue::new(),
            seek: SeekCoordinator::new(),
            converter,
            pool,
            current: None,
            state,
            orientation,
            sinks: Vec::new(),
            raw_delegate: None,
            dispatcher: CallbackDispatcher::new(),
            command_tx,
            shared,
            scheduler_active: false,
            tick_active,
            source_ready: false,
        }
    }

    fn handle_command(&mut self, command: EngineCommand) -> CommandOutcome {
        match command {
            EngineCommand::Tick => self.on_tick(),
            EngineCommand::Start => self.start_playback(),
            EngineCommand::Resume => self.resume_playback(),
            EngineCommand::Pause => self.pause_playback(),
            EngineCommand::Stop => self.stop_playback(),
            EngineCommand::Seek {
                target,
                resume_after,
            } => {
                let request = if resume_after {
                    SeekRequest::with_tolerance(target, RESUME_SEEK_TOLERANCE, true)
                } else {
                    SeekRequest::exact(target, false)
                };
                self.submit_seek(request);
            }
            EngineCommand::SeekFinished { request, success } => {
                self.handle_seek_finished(request, success)
            }
            EngineCommand::BoundaryReached => self.handle_boundary_reached(),
            EngineCommand::AddObserver(observer) => self.observers.register(observer),
            EngineCommand::RemoveObserver(id) => {
                self.observers.unregister(id);
            }
            EngineCommand::AddSink { sink, input_slot } => {
                self.sinks.push(SinkBinding { sink, input_slot })
            }
            EngineCommand::SetRawDelegate(delegate) => self.raw_delegate = delegate,
            EngineCommand::SetRate(rate) => {
                if rate > 0.0 && rate.is_finite() {
                    self.state.rate = rate;
                    if self.state.is_playing {
                        self.source.set_rate(rate);
                    }
                } else {
                    tracing::warn!("ignoring invalid playback rate {rate}");
                }
            }
            EngineCommand::SetMuted(muted) => {
                self.state.is_muted = muted;
                self.source.set_muted(muted);
            }
            EngineCommand::SetLooping(looping) => self.state.looping = looping,
            EngineCommand::SetBoundaries { start, end } => {
                self.state.start_boundary = start;
                self.state.end_boundary = end;
            }
            EngineCommand::SetMatrix(matrix) => self.converter.set_matrix(matrix),
            EngineCommand::Shutdown => return CommandOutcome::Shutdown,
        }
        CommandOutcome::Continue
    }

    /// Processes one pulse of the external periodic signal.
    fn on_tick(&mut self) {
        if !self.scheduler_active {
            // Torn down; queued ticks are ignored and the handle already
            // reports false to cancel the signal.
            return;
        }

        let probe_time = self.source.current_time();
        if !self.source.has_new_pixel_buffer(probe_time) {
            // No presentable frame this tick; implicit drop, non-fatal.
            return;
        }

        let now = self.source.current_time();
        let buffer = match self.source.copy_pixel_buffer(now) {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::warn!("pixel buffer copy failed at {:?}: {e}", now);
                self.shared.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        *self.shared.position.lock() = now;

        if let Some(delegate) = self.raw_delegate.as_mut() {
            delegate.raw_frame(&buffer, now);
        }

        for observer in self.observers.take_due(now) {
            self.dispatcher.dispatch(observer);
        }

        match self
            .converter
            .convert(&self.pool, &buffer, now, self.orientation, None)
        {
            Some(framebuffer) => {
                self.shared
                    .stats
                    .frames_converted
                    .fetch_add(1, Ordering::Relaxed);
                self.publish(framebuffer);
            }
            None => {
                self.shared.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Hands the frame to every sink, then swaps it in as current.
    /// The previous current buffer is always released first.
    fn publish(&mut self, framebuffer: Framebuffer) {
        for binding in &mut self.sinks {
            binding.sink.push_frame(&framebuffer, binding.input_slot);
        }
        if let Some(previous) = self.current.take() {
            previous.release();
        }
        self.current = Some(framebuffer);
    }

    fn start_playback(&mut self) {
        tracing::debug!("start: seeking to {:?}", self.state.effective_start());
        self.state.is_playing = true;
        self.scheduler_active = true;
        self.tick_active.store(true, Ordering::Release);
        self.reset_active_observers();
        self.submit_seek(SeekRequest::with_tolerance(
            self.state.effective_start(),
            RESUME_SEEK_TOLERANCE,
            true,
        ));
    }

    fn resume_playback(&mut self) {
        self.state.is_playing = true;
        self.scheduler_active = true;
        self.tick_active.store(true, Ordering::Release);
        self.source.set_rate(self.state.rate);
    }

    fn pause_playback(&mut self) {
        self.state.is_playing = false;
        if self.source.rate() != 0.0 {
            self.source.set_rate(0.0);
        }
    }

    fn stop_playback(&mut self) {
        self.pause_playback();
        self.observers.clear_active();
        self.scheduler_active = false;
        self.tick_active.store(false, Ordering::Release);
        if let Some(current) = self.current.take() {
            current.release();
        }
    }

    /// Coalesces the request and issues it when the coordinator says so.
    fn submit_seek(&mut self, request: SeekRequest) {
        if let Some(request) = self.seek.request(request) {
            self.issue_to_source(request);
        }
    }

    fn issue_to_source(&mut self, request: SeekRequest) {
        tracing::debug!(
            "seeking source to {:?} (resume={})",
            request.target,
            request.resume_after_seek
        );
        self.shared.stats.seeks_issued.fetch_add(1, Ordering::Relaxed);
        let command_tx = self.command_tx.clone();
        let completed = request.clone();
        self.source.seek(
            request.target,
            request.tolerance_before,
            request.tolerance_after,
            Box::new(move |success| {
                let _ = command_tx.send(EngineCommand::SeekFinished {
                    request: completed,
                    success,
                });
            }),
        );
    }

    /// Follows the coordinator through a completed (or failed) seek.
    fn handle_seek_finished(&mut self, request: SeekRequest, success: bool) {
        if !success {
            // Failure advances the state machine exactly like success;
            // retry policy belongs to the source.
            tracing::warn!("source seek to {:?} reported failure", request.target);
        }
        let completion = self.seek.complete(&request);
        if completion.resume {
            self.reset_active_observers();
            self.state.is_playing = true;
            self.source.set_rate(self.state.rate);
        }
        if let Some(next) = completion.follow_up {
            self.issue_to_source(next);
        }
    }

    /// Rebuilds the active observer subset from the current boundaries,
    /// prepending the synthetic end-boundary observer when one is set.
    fn reset_active_observers(&mut self) {
        let end_observer = self.state.end_boundary.map(|end| {
            let command_tx = self.command_tx.clone();
            TimeObserver::new(
                ObserverId::END_BOUNDARY,
                end,
                Arc::new(move || {
                    let _ = command_tx.send(EngineCommand::BoundaryReached);
                }),
            )
        });
        self.observers
            .reset_active(self.state.effective_start(), end_observer);
    }

    /// End-boundary semantics: loop while playing, otherwise pause.
    fn handle_boundary_reached(&mut self) {
        if self.state.looping && self.state.is_playing {
            tracing::debug!("end boundary reached, looping");
            self.start_playback();
        } else {
            tracing::debug!("end boundary reached, pausing");
            self.pause_playback();
        }
    }

    fn handle_source_events(&mut self) {
        while let Some(event) = self.source.poll_event() {
            match event {
                MediaSourceEvent::RateChanged(actual) => self.reconcile_rate(actual),
                MediaSourceEvent::StatusChanged(status) => {
                    self.source_ready = status == MediaStatus::ReadyToPlay;
                    if status == MediaStatus::Failed {
                        tracing::error!("media source reported failure");
                    }
                    self.reconcile_rate(self.source.rate());
                }
                MediaSourceEvent::PlaybackStalled => {
                    // Logged only; recovery policy belongs to the caller.
                    tracing::warn!("playback stalled at {:?}", self.source.current_time());
                    self.shared.stats.stalls.fetch_add(1, Ordering::Relaxed);
                }
                MediaSourceEvent::EndOfMedia => self.handle_end_of_media(),
            }
        }
    }

    /// Self-healing against transient external rate resets: while playback
    /// is intended and the source is ready, the actual rate must match the
    /// configured one.
    fn reconcile_rate(&mut self, actual: f32) {
        if !self.source_ready || !self.state.is_playing || self.seek.is_seeking() {
            return;
        }
        if (actual - self.state.rate).abs() > f32::EPSILON {
            tracing::debug!("reconciling source rate {actual} -> {}", self.state.rate);
            self.source.set_rate(self.state.rate);
        }
    }

    /// Restart at end of media iff looping and playing, and either no end
    /// boundary is configured or the clock genuinely sits at the media's
    /// natural end (an explicit end-boundary observer handles the rest;
    /// this guard prevents double-handling).
    fn handle_end_of_media(&mut self) {
        if !(self.state.looping && self.state.is_playing) {
            tracing::debug!("end of media, pausing");
            self.pause_playback();
            return;
        }
        let at_natural_end = match (self.state.end_boundary, self.source.duration()) {
            (None, _) => true,
            (Some(_), Some(duration)) => {
                let now = self.source.current_time();
                let gap = if now > duration { now - duration } else { duration - now };
                gap <= END_OF_MEDIA_EPSILON
            }
            (Some(_), None) => false,
        };
        if at_natural_end {
            tracing::debug!("end of media, looping");
            self.start_playback();
        }
    }

    fn update_shared(&self) {
        *self.shared.position.lock() = self.source.current_time();
        *self.shared.duration.lock() = self.source.duration();
        *self.shared.phase.lock() = if !self.scheduler_active {
            PlaybackPhase::Stopped
        } else if self.state.is_playing {
            PlaybackPhase::Playing
        } else {
            PlaybackPhase::Paused
        };
    }

    fn teardown(&mut self) {
        self.stop_playback();
        self.pool.clear();
        *self.shared.phase.lock() = PlaybackPhase::Stopped;
    }
}

/// The engine thread's main loop: drain commands in arrival order, then
/// poll source notifications and refresh the shared mirrors.
fn engine_loop(
    mut scheduler: FrameScheduler,
    command_rx: crossbeam_channel::Receiver<EngineCommand>,
) {
    tracing::debug!("engine thread started");
    'outer: loop {
        match command_rx.recv_timeout(Duration::from_millis(20)) {
            Ok(command) => {
                if let CommandOutcome::Shutdown = scheduler.handle_command(command) {
                    break 'outer;
                }
                while let Ok(command) = command_rx.try_recv() {
                    if let CommandOutcome::Shutdown = scheduler.handle_command(command) {
                        break 'outer;
                    }
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
        scheduler.handle_source_events();
        scheduler.update_shared();
    }
    scheduler.teardown();
    tracing::debug!("engine thread exited");
}

/// Owns the engine thread; dropping it shuts the engine down and joins.
pub(crate) struct EngineThread {
    handle: Option<JoinHandle<()>>,
    command_tx: crossbeam_channel::Sender<EngineCommand>,
    tick_active: Arc<AtomicBool>,
}

impl EngineThread {
    pub(crate) fn spawn(
        scheduler: FrameScheduler,
        command_tx: crossbeam_channel::Sender<EngineCommand>,
        command_rx: crossbeam_channel::Receiver<EngineCommand>,
    ) -> Self {
        let tick_active = Arc::clone(&scheduler.tick_active);
        let handle = thread::spawn(move || engine_loop(scheduler, command_rx));
        Self {
            handle: Some(handle),
            command_tx,
            tick_active,
        }
    }

    pub(crate) fn command_tx(&self) -> &crossbeam_channel::Sender<EngineCommand> {
        &self.command_tx
    }
}

impl Drop for EngineThread {
    fn drop(&mut self) {
        self.tick_active.store(false, Ordering::Release);
        let _ = self.command_tx.send(EngineCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub(crate) fn tick_handle(
    command_tx: crossbeam_channel::Sender<EngineCommand>,
    active: Arc<AtomicBool>,
) -> TickHandle {
    TickHandle { command_tx, active }
}
