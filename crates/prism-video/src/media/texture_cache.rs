//! Mapping locked pixel-buffer planes to GPU-sampleable textures.
//!
//! The cache keeps one luma (R8) and one chroma (RG8) texture alive across
//! frames, recreating them only when the source dimensions change. Plane
//! rows are handed to the GPU without copying whenever the source stride
//! already satisfies wgpu's row alignment; otherwise rows are padded into a
//! scratch allocation.

use std::borrow::Cow;

use prism_video_core::{PixelBufferGuard, PlayerError};

/// wgpu requires bytes_per_row to be aligned to this value.
const COPY_BYTES_PER_ROW_ALIGNMENT: u32 = 256;

/// Aligns a value up to the nearest multiple of alignment.
fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Pads row data to meet wgpu's bytes_per_row alignment requirement.
/// Returns (aligned_bytes_per_row, data) - uses Cow to avoid copying when
/// already aligned.
fn pad_plane_rows(data: &[u8], stride: usize, rows: u32) -> (u32, Cow<'_, [u8]>) {
    let stride_u32 = stride as u32;
    let aligned_stride = align_up(stride_u32, COPY_BYTES_PER_ROW_ALIGNMENT);

    if aligned_stride == stride_u32 {
        // Already aligned - borrow without copying
        return (stride_u32, Cow::Borrowed(data));
    }

    let mut padded = Vec::with_capacity((aligned_stride * rows) as usize);
    for row in 0..rows as usize {
        let row_start = row * stride;
        let row_end = row_start + stride;
        if row_end <= data.len() {
            padded.extend_from_slice(&data[row_start..row_end]);
        } else {
            // Truncated plane data - zero-fill missing bytes
            let available = data.len().saturating_sub(row_start);
            if available > 0 {
                padded.extend_from_slice(&data[row_start..row_start + available]);
            }
            padded.resize(padded.len() + stride - available, 0);
        }
        padded.resize(padded.len() + (aligned_stride - stride_u32) as usize, 0);
    }

    (aligned_stride, Cow::Owned(padded))
}

struct PlaneTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl PlaneTexture {
    fn new(device: &wgpu::Device, width: u32, height: u32, format: wgpu::TextureFormat, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }
}

/// Views of the two mapped planes, valid until the next `map_planes` call.
pub struct MappedPlanes<'a> {
    /// Full-resolution single-channel luma
    pub luma: &'a wgpu::TextureView,
    /// Half-resolution interleaved two-channel chroma
    pub chroma: &'a wgpu::TextureView,
}

/// Caches the per-plane source textures the conversion pipeline samples from.
pub struct PlaneTextureCache {
    device: wgpu::Device,
    queue: wgpu::Queue,
    luma: Option<PlaneTexture>,
    chroma: Option<PlaneTexture>,
}

impl PlaneTextureCache {
    /// Creates an empty cache.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            luma: None,
            chroma: None,
        }
    }

    /// Maps both planes of a locked buffer to GPU-sampleable textures.
    ///
    /// Fails (frame dropped by the caller) when either plane's data is
    /// shorter than its stride and dimensions claim. Cached textures are
    /// reused unless the dimensions changed.
    pub fn map_planes(&mut self, locked: &PixelBufferGuard<'_>) -> Result<MappedPlanes<'_>, PlayerError> {
        let buffer = locked.buffer();
        let (width, height) = (buffer.width(), buffer.height());
        let (chroma_width, chroma_height) = (buffer.chroma_width(), buffer.chroma_height());

        if locked.luma_stride() < width as usize {
            return Err(PlayerError::PlaneMapping(format!(
                "luma stride {} shorter than row of {width}",
                locked.luma_stride()
            )));
        }
        if locked.luma().len() < locked.luma_stride() * height as usize {
            return Err(PlayerError::PlaneMapping(format!(
                "luma plane {} bytes, need {}",
                locked.luma().len(),
                locked.luma_stride() * height as usize
            )));
        }
        let chroma_row = chroma_width as usize * 2;
        if locked.chroma_stride() < chroma_row {
            return Err(PlayerError::PlaneMapping(format!(
                "chroma stride {} shorter than row of {chroma_row}",
                locked.chroma_stride()
            )));
        }
        if locked.chroma().len() < locked.chroma_stride() * chroma_height as usize {
            return Err(PlayerError::PlaneMapping(format!(
                "chroma plane {} bytes, need {}",
                locked.chroma().len(),
                locked.chroma_stride() * chroma_height as usize
            )));
        }

        let recreate_luma = self
            .luma
            .as_ref()
            .map(|t| t.width != width || t.height != height)
            .unwrap_or(true);
        if recreate_luma {
            tracing::debug!("creating {}x{} luma plane texture", width, height);
            self.luma = Some(PlaneTexture::new(
                &self.device,
                width,
                height,
                wgpu::TextureFormat::R8Unorm,
                "prism_luma_plane",
            ));
        }
        let recreate_chroma = self
            .chroma
            .as_ref()
            .map(|t| t.width != chroma_width || t.height != chroma_height)
            .unwrap_or(true);
        if recreate_chroma {
            self.chroma = Some(PlaneTexture::new(
                &self.device,
                chroma_width,
                chroma_height,
                wgpu::TextureFormat::Rg8Unorm,
                "prism_chroma_plane",
            ));
        }

        let (luma_bpr, luma_data) = pad_plane_rows(locked.luma(), locked.luma_stride(), height);
        let (chroma_bpr, chroma_data) =
            pad_plane_rows(locked.chroma(), locked.chroma_stride(), chroma_height);

        // Both textures exist past this point; the let-else arms are
        // unreachable but keep the accessors total.
        let Some(ref luma) = self.luma else {
            return Err(PlayerError::PlaneMapping("luma texture missing".into()));
        };
        let Some(ref chroma) = self.chroma else {
            return Err(PlayerError::PlaneMapping("chroma texture missing".into()));
        };

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &luma.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &luma_data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(luma_bpr),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &chroma.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &chroma_data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(chroma_bpr),
                rows_per_image: Some(chroma_height),
            },
            wgpu::Extent3d {
                width: chroma_width,
                height: chroma_height,
                depth_or_array_layers: 1,
            },
        );

        Ok(MappedPlanes {
            luma: &luma.view,
            chroma: &chroma.view,
        })
    }
}
