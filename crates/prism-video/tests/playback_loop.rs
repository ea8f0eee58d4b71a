//! End-to-end playback scenarios against synthetic and scripted sources.
//!
//! Each test acquires a real wgpu device and returns early when none is
//! available, so the suite passes on headless machines.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use prism_video::{
    MediaSource, PlanarPixelBuffer, PlaybackController, PlayerConfig, PlayerError,
    SeekCompletionFn, SyntheticSource,
};

fn test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::default();
    let adapter =
        pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))?;
    pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None)).ok()
}

fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

/// A source whose seeks complete only when the test triggers them.
struct ScriptedSource {
    time: Duration,
    rate: f32,
    seek_targets: Arc<Mutex<Vec<Duration>>>,
    completions: Arc<Mutex<Vec<SeekCompletionFn>>>,
    resumed_rates: Arc<Mutex<Vec<f32>>>,
}

impl ScriptedSource {
    #[allow(clippy::type_complexity)]
    fn new() -> (
        Self,
        Arc<Mutex<Vec<Duration>>>,
        Arc<Mutex<Vec<SeekCompletionFn>>>,
        Arc<Mutex<Vec<f32>>>,
    ) {
        let seek_targets = Arc::new(Mutex::new(Vec::new()));
        let completions = Arc::new(Mutex::new(Vec::new()));
        let resumed_rates = Arc::new(Mutex::new(Vec::new()));
        let source = Self {
            time: Duration::ZERO,
            rate: 0.0,
            seek_targets: Arc::clone(&seek_targets),
            completions: Arc::clone(&completions),
            resumed_rates: Arc::clone(&resumed_rates),
        };
        (source, seek_targets, completions, resumed_rates)
    }
}

impl MediaSource for ScriptedSource {
    fn current_time(&self) -> Duration {
        self.time
    }

    fn duration(&self) -> Option<Duration> {
        Some(Duration::from_secs(60))
    }

    fn rate(&self) -> f32 {
        self.rate
    }

    fn set_rate(&mut self, rate: f32) {
        self.rate = rate;
        if rate > 0.0 {
            self.resumed_rates.lock().push(rate);
        }
    }

    fn has_new_pixel_buffer(&mut self, _for_time: Duration) -> bool {
        false
    }

    fn copy_pixel_buffer(&mut self, for_time: Duration) -> Result<PlanarPixelBuffer, PlayerError> {
        Ok(PlanarPixelBuffer::filled(8, 8, for_time, 128, 128, 128))
    }

    fn seek(
        &mut self,
        target: Duration,
        _tolerance_before: Duration,
        _tolerance_after: Duration,
        completion: SeekCompletionFn,
    ) {
        self.time = target;
        self.seek_targets.lock().push(target);
        self.completions.lock().push(completion);
    }
}

#[test]
fn observers_fire_in_order_as_playback_advances() {
    let Some((device, queue)) = test_device() else {
        return;
    };
    // 1 fps: every tick advances the synthetic clock by one second, so the
    // tick sequence visits 1, 2, 3, ... seconds.
    let source = Box::new(SyntheticSource::new(8, 8, 1.0, Duration::from_secs(30)));
    let controller =
        PlaybackController::open(source, &device, &queue, PlayerConfig::default()).unwrap();
    let ticks = controller.tick_handle();

    let fired = Arc::new(Mutex::new(Vec::new()));
    for target in [2u64, 5] {
        let fired = Arc::clone(&fired);
        controller.add_time_observer(Duration::from_secs(target), move || {
            fired.lock().push(target);
        });
    }

    controller.start();
    assert!(wait_until(Duration::from_secs(2), || ticks.is_active()));

    for _ in 0..7 {
        ticks.tick();
        std::thread::sleep(Duration::from_millis(10));
    }

    assert!(wait_until(Duration::from_secs(2), || fired.lock().len() == 2));
    assert_eq!(*fired.lock(), vec![2, 5]);

    // Well past both targets: neither fires again this pass.
    ticks.tick();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(fired.lock().len(), 2);
}

#[test]
fn removed_observer_never_fires() {
    let Some((device, queue)) = test_device() else {
        return;
    };
    let source = Box::new(SyntheticSource::new(8, 8, 1.0, Duration::from_secs(30)));
    let controller =
        PlaybackController::open(source, &device, &queue, PlayerConfig::default()).unwrap();
    let ticks = controller.tick_handle();

    let fired = Arc::new(Mutex::new(Vec::new()));
    let fired_clone = Arc::clone(&fired);
    let handle = controller.add_time_observer(Duration::from_secs(8), move || {
        fired_clone.lock().push(8u64);
    });

    controller.start();
    assert!(wait_until(Duration::from_secs(2), || ticks.is_active()));

    // Advance to ~5s, then remove the 8s observer before it can fire.
    for _ in 0..5 {
        ticks.tick();
        std::thread::sleep(Duration::from_millis(10));
    }
    controller.remove_time_observer(handle);
    std::thread::sleep(Duration::from_millis(50));

    // Drive well past 8s.
    for _ in 0..6 {
        ticks.tick();
        std::thread::sleep(Duration::from_millis(10));
    }
    std::thread::sleep(Duration::from_millis(200));
    assert!(fired.lock().is_empty());
}

#[test]
fn overlapping_seeks_coalesce_with_resume_on_last() {
    let Some((device, queue)) = test_device() else {
        return;
    };
    let (source, seek_targets, completions, resumed_rates) = ScriptedSource::new();
    let controller =
        PlaybackController::open(Box::new(source), &device, &queue, PlayerConfig::default())
            .unwrap();

    controller.seek(Duration::from_millis(2900), true);
    assert!(wait_until(Duration::from_secs(2), || {
        seek_targets.lock().len() == 1
    }));

    // Second seek while the first is still in flight: coalesces to pending.
    controller.seek(Duration::from_millis(3000), true);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(seek_targets.lock().len(), 1);

    // Completing the first issues the coalesced request, without resuming.
    let completion = completions.lock().remove(0);
    completion(true);
    assert!(wait_until(Duration::from_secs(2), || {
        seek_targets.lock().len() == 2
    }));
    assert_eq!(seek_targets.lock()[1], Duration::from_millis(3000));
    assert!(resumed_rates.lock().is_empty());

    // Completing the second applies resume semantics exactly once.
    let completion = completions.lock().remove(0);
    completion(true);
    assert!(wait_until(Duration::from_secs(2), || {
        !resumed_rates.lock().is_empty()
    }));
    assert_eq!(*resumed_rates.lock(), vec![1.0]);
    assert_eq!(seek_targets.lock().len(), 2);
}

#[test]
fn loop_with_end_boundary_restarts_from_start_boundary() {
    let Some((device, queue)) = test_device() else {
        return;
    };
    // 1 fps over 30s media, playing the window [1s, 6s] on a loop.
    let source = Box::new(SyntheticSource::new(8, 8, 1.0, Duration::from_secs(30)));
    let config = PlayerConfig::default()
        .with_looping(true)
        .with_boundaries(Some(Duration::from_secs(1)), Some(Duration::from_secs(6)));
    let controller = PlaybackController::open(source, &device, &queue, config).unwrap();
    let ticks = controller.tick_handle();

    let passes = Arc::new(Mutex::new(0u32));
    let passes_clone = Arc::clone(&passes);
    controller.add_time_observer(Duration::from_secs(3), move || {
        *passes_clone.lock() += 1;
    });

    controller.start();
    assert!(wait_until(Duration::from_secs(2), || ticks.is_active()));

    // Enough ticks to cross the 6s boundary twice.
    for _ in 0..14 {
        ticks.tick();
        std::thread::sleep(Duration::from_millis(15));
    }

    // The 3s observer fired once per pass, so a second firing proves exactly
    // one restart happened per boundary crossing.
    assert!(wait_until(Duration::from_secs(2), || *passes.lock() >= 2));
    // Playback restarted from the start boundary, not from zero: the seek
    // counter shows one initial start plus one seek per loop.
    assert!(controller.stats().seeks_issued >= 2);
}

#[test]
fn stop_is_idempotent() {
    let Some((device, queue)) = test_device() else {
        return;
    };
    let source = Box::new(SyntheticSource::new(8, 8, 10.0, Duration::from_secs(10)));
    let controller =
        PlaybackController::open(source, &device, &queue, PlayerConfig::default()).unwrap();
    let ticks = controller.tick_handle();

    controller.start();
    assert!(wait_until(Duration::from_secs(2), || ticks.is_active()));
    for _ in 0..3 {
        ticks.tick();
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(wait_until(Duration::from_secs(2), || {
        controller.stats().frames_converted >= 1
    }));

    controller.stop();
    controller.stop();
    assert!(wait_until(Duration::from_secs(2), || !ticks.is_active()));
    assert!(!ticks.tick());

    // The engine is still healthy after the double stop.
    controller.start();
    assert!(wait_until(Duration::from_secs(2), || ticks.is_active()));
}
