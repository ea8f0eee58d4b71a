//! Reference-counted GPU output surfaces.
//!
//! The conversion pipeline renders into pooled RGBA framebuffers. Buffers
//! are reclaimed explicitly: every acquire must be matched by exactly one
//! release, and a buffer only re-enters the pool's free list once its
//! reference count reaches zero. No destructor-driven reclamation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use prism_video_core::PlayerError;

/// Default memory budget for pooled (free) framebuffers.
const DEFAULT_POOL_BUDGET: usize = 256 * 1024 * 1024;

/// Output surface orientation. Part of the pool key: a rotated surface is
/// not interchangeable with an upright one of the same size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
    /// No rotation
    #[default]
    Up,
    /// Rotated 90 degrees counter-clockwise
    RotatedLeft,
    /// Rotated 90 degrees clockwise
    RotatedRight,
    /// Rotated 180 degrees
    UpsideDown,
}

/// Key for pooled framebuffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FramebufferKey {
    orientation: Orientation,
    width: u32,
    height: u32,
}

impl FramebufferKey {
    fn memory_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Presentation tag attached to a framebuffer after conversion.
#[derive(Default)]
struct FrameTag {
    pts: Option<Duration>,
    metadata: Option<Arc<dyn std::any::Any + Send + Sync>>,
}

struct FramebufferInner {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    key: FramebufferKey,
    ref_count: AtomicU32,
    tag: Mutex<FrameTag>,
    /// Weak so free-listed buffers don't keep an abandoned pool alive.
    pool: Weak<Mutex<PoolShared>>,
}

/// A GPU-backed RGBA surface produced by the conversion pipeline.
///
/// Cloning the handle does NOT retain: the reference count only moves
/// through [`Framebuffer::retain`] and [`Framebuffer::release`]. A consumer
/// that keeps a frame past the sink callback must retain it and later
/// release exactly once.
#[derive(Clone)]
pub struct Framebuffer {
    inner: Arc<FramebufferInner>,
}

impl Framebuffer {
    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.inner.key.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.inner.key.height
    }

    /// Surface orientation.
    pub fn orientation(&self) -> Orientation {
        self.inner.key.orientation
    }

    /// The underlying texture.
    pub fn texture(&self) -> &wgpu::Texture {
        &self.inner.texture
    }

    /// A render/sample view of the whole texture.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.inner.view
    }

    /// The presentation timestamp tagged by the conversion pipeline.
    pub fn presentation_time(&self) -> Option<Duration> {
        self.inner.tag.lock().pts
    }

    /// Caller-supplied opaque metadata, if any was attached.
    pub fn metadata(&self) -> Option<Arc<dyn std::any::Any + Send + Sync>> {
        self.inner.tag.lock().metadata.clone()
    }

    /// Current reference count. Zero means the buffer is reclaimable and
    /// must no longer be touched by this holder.
    pub fn ref_count(&self) -> u32 {
        self.inner.ref_count.load(Ordering::Acquire)
    }

    /// Increments the reference count.
    pub fn retain(&self) {
        let previous = self.inner.ref_count.fetch_add(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "retained a framebuffer after its last release");
    }

    /// Decrements the reference count; at zero the surface returns to its
    /// pool's free list (or is dropped when the pool budget is exceeded).
    ///
    /// Releasing more times than retained is a programming error: asserted
    /// in debug builds, a logged no-op in release builds (the count never
    /// goes negative).
    pub fn release(&self) {
        let previous =
            self.inner
                .ref_count
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                    count.checked_sub(1)
                });
        match previous {
            Err(_) => {
                debug_assert!(false, "framebuffer released more times than retained");
                tracing::error!(
                    "framebuffer {}x{} over-released, ignoring",
                    self.width(),
                    self.height()
                );
            }
            Ok(1) => self.reclaim(),
            Ok(_) => {}
        }
    }

    pub(crate) fn set_tag(
        &self,
        pts: Duration,
        metadata: Option<Arc<dyn std::any::Any + Send + Sync>>,
    ) {
        let mut tag = self.inner.tag.lock();
        tag.pts = Some(pts);
        tag.metadata = metadata;
    }

    /// Moves the surface back onto the free list, respecting the budget.
    fn reclaim(&self) {
        let Some(shared) = self.inner.pool.upgrade() else {
            // Pool is gone; the texture drops with the last handle.
            return;
        };
        let mut shared = shared.lock();
        let mem = self.inner.key.memory_size();
        if shared.total_memory + mem > shared.max_memory {
            tracing::debug!(
                "framebuffer pool budget reached, dropping {}x{} surface",
                self.width(),
                self.height()
            );
            return;
        }
        shared.total_memory += mem;
        shared
            .free
            .entry(self.inner.key)
            .or_default()
            .push(Arc::clone(&self.inner));
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("orientation", &self.orientation())
            .field("ref_count", &self.ref_count())
            .field("pts", &self.presentation_time())
            .finish()
    }
}

#[derive(Default)]
struct PoolShared {
    /// Reclaimable surfaces, keyed by orientation + dimensions
    free: HashMap<FramebufferKey, Vec<Arc<FramebufferInner>>>,
    /// Memory held by free surfaces
    total_memory: usize,
    /// Budget for free surfaces; beyond it, released surfaces are dropped
    max_memory: usize,
}

/// Pool of reusable GPU output surfaces keyed by (orientation, size).
pub struct FramebufferPool {
    device: wgpu::Device,
    shared: Arc<Mutex<PoolShared>>,
}

impl FramebufferPool {
    /// Creates a pool with the given budget for free surfaces.
    pub fn new(device: wgpu::Device, max_memory: usize) -> Self {
        Self {
            device,
            shared: Arc::new(Mutex::new(PoolShared {
                free: HashMap::new(),
                total_memory: 0,
                max_memory,
            })),
        }
    }

    /// Creates a pool with the default memory budget.
    pub fn with_default_budget(device: wgpu::Device) -> Self {
        Self::new(device, DEFAULT_POOL_BUDGET)
    }

    /// Acquires a surface, reusing a reclaimed one when the key matches.
    ///
    /// The returned framebuffer starts locked with a reference count of 1;
    /// the caller owns that reference and must release it exactly once.
    pub fn acquire(
        &self,
        orientation: Orientation,
        width: u32,
        height: u32,
    ) -> Result<Framebuffer, PlayerError> {
        if width == 0 || height == 0 {
            return Err(PlayerError::FramebufferAcquire(format!(
                "zero dimension {width}x{height}"
            )));
        }
        let max_dim = self.device.limits().max_texture_dimension_2d;
        if width > max_dim || height > max_dim {
            return Err(PlayerError::FramebufferAcquire(format!(
                "{width}x{height} exceeds device limit {max_dim}"
            )));
        }

        let key = FramebufferKey {
            orientation,
            width,
            height,
        };

        // Reuse a reclaimed surface when one matches.
        {
            let mut shared = self.shared.lock();
            if let Some(list) = shared.free.get_mut(&key) {
                if let Some(inner) = list.pop() {
                    shared.total_memory -= key.memory_size();
                    inner.ref_count.store(1, Ordering::Release);
                    *inner.tag.lock() = FrameTag::default();
                    return Ok(Framebuffer { inner });
                }
            }
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("prism_framebuffer"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Framebuffer {
            inner: Arc::new(FramebufferInner {
                texture,
                view,
                key,
                ref_count: AtomicU32::new(1),
                tag: Mutex::new(FrameTag::default()),
                pool: Arc::downgrade(&self.shared),
            }),
        })
    }

    /// Decrements a framebuffer's reference count (see [`Framebuffer::release`]).
    pub fn release(&self, framebuffer: &Framebuffer) {
        framebuffer.release();
    }

    /// Number of reclaimable surfaces currently pooled.
    pub fn free_count(&self) -> usize {
        self.shared.lock().free.values().map(|v| v.len()).sum()
    }

    /// Memory held by reclaimable surfaces.
    pub fn pooled_memory(&self) -> usize {
        self.shared.lock().total_memory
    }

    /// Drops every reclaimable surface.
    pub fn clear(&self) {
        let mut shared = self.shared.lock();
        shared.free.clear();
        shared.total_memory = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::test_support::test_device;

    #[test]
    fn test_acquire_release_reuses_surface() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let pool = FramebufferPool::with_default_budget(device);

        let fb = pool.acquire(Orientation::Up, 64, 32).unwrap();
        assert_eq!(fb.ref_count(), 1);
        let first = fb.clone();
        fb.release();
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.pooled_memory(), 64 * 32 * 4);

        let again = pool.acquire(Orientation::Up, 64, 32).unwrap();
        assert!(Arc::ptr_eq(&first.inner, &again.inner));
        assert_eq!(again.ref_count(), 1);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn test_key_mismatch_allocates_fresh() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let pool = FramebufferPool::with_default_budget(device);

        let fb = pool.acquire(Orientation::Up, 64, 32).unwrap();
        let old = fb.clone();
        fb.release();

        // Different orientation, same size: not interchangeable.
        let rotated = pool.acquire(Orientation::RotatedLeft, 64, 32).unwrap();
        assert!(!Arc::ptr_eq(&old.inner, &rotated.inner));
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_retain_keeps_surface_out_of_pool() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let pool = FramebufferPool::with_default_budget(device);

        let fb = pool.acquire(Orientation::Up, 16, 16).unwrap();
        fb.retain();
        assert_eq!(fb.ref_count(), 2);

        fb.release();
        assert_eq!(pool.free_count(), 0);
        fb.release();
        assert_eq!(fb.ref_count(), 0);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_budget_drops_excess_surfaces() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        // Budget fits exactly one 16x16 RGBA surface.
        let pool = FramebufferPool::new(device, 16 * 16 * 4);

        let a = pool.acquire(Orientation::Up, 16, 16).unwrap();
        let b = pool.acquire(Orientation::Up, 16, 16).unwrap();
        a.release();
        b.release();
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.pooled_memory(), 16 * 16 * 4);
    }

    #[test]
    fn test_acquire_rejects_zero_dimension() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let pool = FramebufferPool::with_default_budget(device);
        assert!(matches!(
            pool.acquire(Orientation::Up, 0, 32),
            Err(PlayerError::FramebufferAcquire(_))
        ));
    }

    #[test]
    fn test_tag_cleared_on_reuse() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let pool = FramebufferPool::with_default_budget(device);

        let fb = pool.acquire(Orientation::Up, 8, 8).unwrap();
        fb.set_tag(Duration::from_secs(1), None);
        assert_eq!(fb.presentation_time(), Some(Duration::from_secs(1)));
        fb.release();

        let again = pool.acquire(Orientation::Up, 8, 8).unwrap();
        assert_eq!(again.presentation_time(), None);
    }
}
