//! GPU color-space conversion pipeline.
//!
//! Consumes a locked planar pixel buffer and produces one RGB framebuffer
//! from the pool via a configurable matrix transform. Per-frame failures
//! (plane mapping, pool acquisition) drop the frame and are non-fatal;
//! pipeline preparation failures are fatal at construction time.

use std::sync::Arc;
use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use prism_video_core::{ColorMatrix, PlanarPixelBuffer, PlayerError};

use super::framebuffer::{Framebuffer, FramebufferPool, Orientation};
use super::texture_cache::PlaneTextureCache;

/// std140 layout of the shader's ColorUniform: three vec4-padded matrix
/// columns followed by the padded offset vector.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ColorUniform {
    columns: [[f32; 4]; 3],
    offset: [f32; 4],
}

impl From<&ColorMatrix> for ColorUniform {
    fn from(matrix: &ColorMatrix) -> Self {
        let cols = matrix.matrix.to_cols_array_2d();
        Self {
            columns: [
                [cols[0][0], cols[0][1], cols[0][2], 0.0],
                [cols[1][0], cols[1][1], cols[1][2], 0.0],
                [cols[2][0], cols[2][1], cols[2][2], 0.0],
            ],
            offset: [matrix.offset.x, matrix.offset.y, matrix.offset.z, 0.0],
        }
    }
}

/// Renders planar luma/chroma frames into pooled RGBA framebuffers.
pub struct ColorConversionPipeline {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    texture_cache: PlaneTextureCache,
    matrix: ColorMatrix,
}

impl ColorConversionPipeline {
    /// Prepares the conversion program.
    ///
    /// Fails when the configured matrix is unusable; a controller must not
    /// be constructed around a half-prepared pipeline.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        matrix: ColorMatrix,
    ) -> Result<Self, PlayerError> {
        if !matrix.is_finite() {
            return Err(PlayerError::PipelinePreparation(
                "conversion matrix has non-finite coefficients".to_string(),
            ));
        }

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("prism_conversion_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("conversion.wgsl").into()),
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("prism_plane_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("prism_color_uniform"),
            size: std::mem::size_of::<ColorUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("prism_conversion_bind_group_layout"),
            entries: &[
                // Color uniform
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<ColorUniform>() as u64
                        ),
                    },
                    count: None,
                },
                // Luma plane
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // Chroma plane
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // Sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("prism_conversion_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("prism_conversion_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let texture_cache = PlaneTextureCache::new(device.clone(), queue.clone());

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            uniform_buffer,
            sampler,
            texture_cache,
            matrix,
        })
    }

    /// The transform currently applied.
    pub fn matrix(&self) -> &ColorMatrix {
        &self.matrix
    }

    /// Replaces the conversion matrix. Takes effect on the next convert.
    pub fn set_matrix(&mut self, matrix: ColorMatrix) {
        if !matrix.is_finite() {
            tracing::warn!("ignoring conversion matrix with non-finite coefficients");
            return;
        }
        self.matrix = matrix;
    }

    /// Converts one frame, producing a framebuffer tagged with `pts`.
    ///
    /// Returns None when the frame had to be dropped (plane mapping or pool
    /// acquisition failed); conversion continues normally on later frames.
    /// The buffer lock is held from just before the planes are mapped until
    /// the GPU work has been dispatched, and is released on every exit path.
    pub fn convert(
        &mut self,
        pool: &FramebufferPool,
        buffer: &PlanarPixelBuffer,
        pts: Duration,
        orientation: Orientation,
        metadata: Option<Arc<dyn std::any::Any + Send + Sync>>,
    ) -> Option<Framebuffer> {
        let locked = buffer.lock();

        let planes = match self.texture_cache.map_planes(&locked) {
            Ok(planes) => planes,
            Err(e) => {
                tracing::warn!("dropping frame at {:?}: {e}", pts);
                return None;
            }
        };

        let framebuffer = match pool.acquire(orientation, buffer.width(), buffer.height()) {
            Ok(fb) => fb,
            Err(e) => {
                tracing::warn!("dropping frame at {:?}: {e}", pts);
                return None;
            }
        };

        self.queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&ColorUniform::from(&self.matrix)),
        );

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("prism_conversion_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(planes.luma),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(planes.chroma),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("prism_conversion_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("prism_conversion_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: framebuffer.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        // GPU work dispatched; the plane data has been staged, so the raw
        // memory can be unlocked before the caller sees the framebuffer.
        drop(locked);

        framebuffer.set_tag(pts, metadata);
        Some(framebuffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::test_support::{read_back_rgba, test_device};

    #[test]
    fn test_color_uniform_layout() {
        assert_eq!(std::mem::size_of::<ColorUniform>(), 64);
        let uniform = ColorUniform::from(&ColorMatrix::bt601_full_range());
        // First column multiplies luma with unit weight on every channel.
        assert_eq!(uniform.columns[0], [1.0, 1.0, 1.0, 0.0]);
        assert_eq!(uniform.offset, [0.0, -0.5, -0.5, 0.0]);
    }

    #[test]
    fn test_rejects_non_finite_matrix() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut matrix = ColorMatrix::bt601_full_range();
        matrix.offset.x = f32::INFINITY;
        assert!(matches!(
            ColorConversionPipeline::new(device, queue, matrix),
            Err(PlayerError::PipelinePreparation(_))
        ));
    }

    #[test]
    fn test_convert_constant_buffer_matches_reference() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let matrix = ColorMatrix::bt601_full_range();
        let mut pipeline =
            ColorConversionPipeline::new(device.clone(), queue.clone(), matrix).unwrap();
        let pool = FramebufferPool::with_default_budget(device.clone());

        // Full-range encoding of pure red.
        let (y, cb, cr) = (76u8, 85u8, 255u8);
        let buffer = PlanarPixelBuffer::filled(4, 4, Duration::from_millis(40), y, cb, cr);
        let fb = pipeline
            .convert(&pool, &buffer, Duration::from_millis(40), Orientation::Up, None)
            .expect("conversion should succeed");

        assert_eq!(fb.presentation_time(), Some(Duration::from_millis(40)));
        assert!(!buffer.is_locked());

        let pixels = read_back_rgba(&device, &queue, fb.texture(), 4, 4);
        let expected = matrix.apply_u8(y, cb, cr);
        for pixel in pixels.chunks_exact(4) {
            for channel in 0..3 {
                let diff = (pixel[channel] as i16 - expected[channel] as i16).abs();
                assert!(
                    diff <= 1,
                    "channel {channel} off by {diff}: got {pixel:?}, expected {expected:?}"
                );
            }
            assert_eq!(pixel[3], 255);
        }

        fb.release();
    }

    #[test]
    fn test_convert_reuses_pooled_framebuffer() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut pipeline = ColorConversionPipeline::new(
            device.clone(),
            queue.clone(),
            ColorMatrix::bt601_full_range(),
        )
        .unwrap();
        let pool = FramebufferPool::with_default_budget(device);

        let buffer = PlanarPixelBuffer::filled(8, 8, Duration::ZERO, 128, 128, 128);
        let first = pipeline
            .convert(&pool, &buffer, Duration::ZERO, Orientation::Up, None)
            .unwrap();
        first.release();
        assert_eq!(pool.free_count(), 1);

        let second = pipeline
            .convert(&pool, &buffer, Duration::from_millis(33), Orientation::Up, None)
            .unwrap();
        assert_eq!(pool.free_count(), 0);
        assert_eq!(second.presentation_time(), Some(Duration::from_millis(33)));
        second.release();
    }
}
