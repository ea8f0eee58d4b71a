//! Drives a synthetic source through the full engine for a few seconds and
//! prints the resulting counters.
//!
//! Run with: cargo run --example synthetic_playback

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use prism_video::{
    Framebuffer, FrameSink, PlaybackController, PlayerConfig, SyntheticSource,
};

/// Counts the frames the engine publishes, releasing nothing it didn't keep.
struct CountingSink {
    frames: Arc<AtomicU64>,
}

impl FrameSink for CountingSink {
    fn push_frame(&mut self, framebuffer: &Framebuffer, input_slot: usize) {
        let count = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if count % 30 == 0 {
            println!(
                "frame {count}: {}x{} at {:?} (slot {input_slot})",
                framebuffer.width(),
                framebuffer.height(),
                framebuffer.presentation_time(),
            );
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prism_video=debug".into()),
        )
        .init();

    let instance = wgpu::Instance::default();
    let Some(adapter) =
        pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
    else {
        eprintln!("no GPU adapter available");
        return;
    };
    let (device, queue) =
        match pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None)) {
            Ok(pair) => pair,
            Err(e) => {
                eprintln!("device request failed: {e}");
                return;
            }
        };

    let source = Box::new(SyntheticSource::new(
        640,
        360,
        30.0,
        Duration::from_secs(4),
    ));
    let controller = match PlaybackController::open(
        source,
        &device,
        &queue,
        PlayerConfig::default().with_looping(true),
    ) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("failed to open controller: {e}");
            return;
        }
    };

    let frames = Arc::new(AtomicU64::new(0));
    controller.add_sink(
        Box::new(CountingSink {
            frames: Arc::clone(&frames),
        }),
        0,
    );
    controller.add_time_observer(Duration::from_secs(2), || {
        println!("observer: reached 2s");
    });

    controller.start();

    // Stand in for the display-refresh signal: ~30 Hz for three seconds.
    let ticks = controller.tick_handle();
    for _ in 0..90 {
        if !ticks.tick() {
            break;
        }
        std::thread::sleep(Duration::from_millis(33));
    }

    controller.stop();
    let stats = controller.stats();
    println!(
        "converted {} frames, dropped {}, issued {} seeks",
        stats.frames_converted, stats.frames_dropped, stats.seeks_issued
    );
}
