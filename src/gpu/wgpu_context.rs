//! `wgpu`-backed [`super::GpuContext`] implementation.
//!
//! Each op is submitted as its own command buffer — the spec models draw
//! state as "whatever the previous op left it as," which maps naturally onto
//! a sequence of independently-submitted render passes over the same
//! target rather than one big recorded pass per frame. This costs a little
//! throughput relative to batching, which is an acceptable trade for the
//! op-at-a-time contract in §4.4.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytemuck::cast_slice;
use wgpu::util::DeviceExt;

use super::shader_layout::{ShaderLayout, UniformKind};
use super::{GpuInitOptions, ShaderProgram, Texture, TextureFormat, UniformValue};
use crate::decoded_image::DecodedImage;
use crate::error::{CoreError, CoreResult};

pub struct TextureInner {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) disposed: AtomicBool,
}

pub struct ShaderInner {
    pub(crate) module: wgpu::ShaderModule,
}

struct BoundTexture {
    texture: Texture,
    sampler_name: String,
}

struct ContextState {
    canvas: Texture,
    canvas_width: u32,
    canvas_height: u32,
    render_target: Option<Texture>,
    active_program: Option<ShaderProgram>,
    bound_textures: HashMap<u32, BoundTexture>,
    pending_uniforms: HashMap<String, UniformValue>,
    pipeline_cache: HashMap<(u64, wgpu::TextureFormat), wgpu::RenderPipeline>,
    bind_group_layout_cache: HashMap<u64, wgpu::BindGroupLayout>,
    passthrough: ShaderProgram,
    quad_vertex_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
}

/// `wgpu`-backed implementation of [`super::GpuContext`]. One context per
/// [`crate::node_renderer::NodeRenderer`] (§5): there is no cross-renderer
/// sharing of GPU state.
pub struct WgpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    next_id: AtomicU64,
    state: Mutex<ContextState>,
}

const PASSTHROUGH_WGSL: &str = r#"
struct VertexOut {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) tex_coord: vec2<f32>) -> VertexOut {
    var out: VertexOut;
    out.clip_position = vec4<f32>(position, 0.0, 1.0);
    out.tex_coord = tex_coord;
    return out;
}

@group(0) @binding(1) var u_texture: texture_2d<f32>;
@group(0) @binding(2) var u_sampler: sampler;

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    return textureSample(u_texture, u_sampler, in.tex_coord);
}
"#;

fn fullscreen_quad_vertices() -> [[f32; 4]; 6] {
    // position.xy, texCoord.xy — two triangles covering clip space.
    [
        [-1.0, -1.0, 0.0, 1.0],
        [1.0, -1.0, 1.0, 1.0],
        [-1.0, 1.0, 0.0, 0.0],
        [-1.0, 1.0, 0.0, 0.0],
        [1.0, -1.0, 1.0, 1.0],
        [1.0, 1.0, 1.0, 0.0],
    ]
}

impl WgpuContext {
    /// Corresponds to §4.4 `init`. Builds the immutable fullscreen-quad
    /// geometry and passthrough shader described in the op table's closing
    /// note, then allocates the hidden offscreen canvas texture.
    pub fn init(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        _opts: GpuInitOptions,
        canvas_width: u32,
        canvas_height: u32,
    ) -> CoreResult<Self> {
        let next_id = AtomicU64::new(1);

        let canvas = create_texture_inner(&device, canvas_width, canvas_height, TextureFormat::Rgba8, &next_id)?;

        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("motion_core.fullscreen_quad"),
            contents: cast_slice(&fullscreen_quad_vertices()),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("motion_core.default_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("motion_core.passthrough"),
            source: wgpu::ShaderSource::Wgsl(PASSTHROUGH_WGSL.into()),
        });
        let passthrough_layout = super::pack_uniform_layout(&[]);
        let passthrough = ShaderProgram {
            id: next_id.fetch_add(1, Ordering::SeqCst),
            layout: ShaderLayout {
                texture_count: 1,
                ..passthrough_layout
            },
            inner: Arc::new(ShaderInner { module }),
        };

        let state = ContextState {
            canvas,
            canvas_width,
            canvas_height,
            render_target: None,
            active_program: None,
            bound_textures: HashMap::new(),
            pending_uniforms: HashMap::new(),
            pipeline_cache: HashMap::new(),
            bind_group_layout_cache: HashMap::new(),
            passthrough,
            quad_vertex_buffer,
            sampler,
        };

        Ok(WgpuContext {
            device,
            queue,
            next_id,
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ContextState> {
        self.state.lock().expect("gpu context mutex poisoned")
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn bind_group_layout_for(
        &self,
        state: &mut ContextState,
        program_id: u64,
        layout: &ShaderLayout,
    ) -> wgpu::BindGroupLayout {
        if let Some(existing) = state.bind_group_layout_cache.get(&program_id) {
            return existing.clone();
        }
        let mut entries = Vec::new();
        if layout.buffer_size() > 0 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        for i in 0..layout.texture_count {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 1 + i * 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 2 + i * 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
        let bgl = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("motion_core.effect_bind_group_layout"),
            entries: &entries,
        });
        state.bind_group_layout_cache.insert(program_id, bgl.clone());
        bgl
    }

    fn pipeline_for(
        &self,
        state: &mut ContextState,
        program: &ShaderProgram,
        target_format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline {
        let key = (program.id, target_format);
        if let Some(p) = state.pipeline_cache.get(&key) {
            return p.clone();
        }

        let bgl = self.bind_group_layout_for(state, program.id, &program.layout);
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("motion_core.effect_pipeline_layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: 4 * 4,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x2,
                    offset: 0,
                    shader_location: 0,
                },
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x2,
                    offset: 8,
                    shader_location: 1,
                },
            ],
        };

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("motion_core.effect_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &program.inner.module,
                entry_point: Some("vs_main"),
                buffers: &[vertex_layout],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &program.inner.module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    // premultiplied src-over-dst, per §4.4.
                    blend: Some(wgpu::BlendState {
                        color: wgpu::BlendComponent {
                            src_factor: wgpu::BlendFactor::One,
                            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                            operation: wgpu::BlendOperation::Add,
                        },
                        alpha: wgpu::BlendComponent {
                            src_factor: wgpu::BlendFactor::One,
                            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                            operation: wgpu::BlendOperation::Add,
                        },
                    }),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        state.pipeline_cache.insert(key, pipeline.clone());
        pipeline
    }

    fn current_target_view_and_format<'a>(
        &self,
        state: &'a ContextState,
    ) -> (&'a wgpu::TextureView, wgpu::TextureFormat) {
        match &state.render_target {
            Some(tex) => (&tex.inner.view, tex.format.to_wgpu()),
            None => (&state.canvas.inner.view, TextureFormat::Rgba8.to_wgpu()),
        }
    }

    fn pack_uniform_bytes(&self, layout: &ShaderLayout, values: &HashMap<String, UniformValue>) -> Vec<u8> {
        let mut bytes = vec![0u8; layout.buffer_size() as usize];
        for slot in &layout.uniforms {
            let Some(value) = values.get(&slot.name) else {
                continue;
            };
            let base = slot.offset as usize;
            match (slot.kind, value) {
                (UniformKind::Float, UniformValue::Float(v)) => {
                    bytes[base..base + 4].copy_from_slice(&v.to_le_bytes());
                }
                (UniformKind::Int, UniformValue::Int(v)) => {
                    bytes[base..base + 4].copy_from_slice(&v.to_le_bytes());
                }
                (UniformKind::Bool, UniformValue::Bool(v)) => {
                    let v = if *v { 1i32 } else { 0i32 };
                    bytes[base..base + 4].copy_from_slice(&v.to_le_bytes());
                }
                (UniformKind::Vec2, UniformValue::Vec2(v)) => {
                    bytes[base..base + 4].copy_from_slice(&v[0].to_le_bytes());
                    bytes[base + 4..base + 8].copy_from_slice(&v[1].to_le_bytes());
                }
                (UniformKind::Vec3, UniformValue::Vec3(v)) => {
                    for (i, c) in v.iter().enumerate() {
                        bytes[base + i * 4..base + i * 4 + 4].copy_from_slice(&c.to_le_bytes());
                    }
                }
                (UniformKind::Vec4, UniformValue::Vec4(v)) => {
                    for (i, c) in v.iter().enumerate() {
                        bytes[base + i * 4..base + i * 4 + 4].copy_from_slice(&c.to_le_bytes());
                    }
                }
                // A value set under a name whose declared kind doesn't match
                // is treated the same as an unknown name: silently ignored.
                _ => {}
            }
        }
        bytes
    }
}

fn create_texture_inner(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    format: TextureFormat,
    next_id: &AtomicU64,
) -> CoreResult<Texture> {
    if width == 0 || height == 0 {
        return Err(CoreError::OutOfMemory {
            what: format!("texture {width}x{height}"),
        });
    }
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("motion_core.texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: format.to_wgpu(),
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Ok(Texture {
        id: next_id.fetch_add(1, Ordering::SeqCst),
        width,
        height,
        format,
        inner: Arc::new(TextureInner {
            texture,
            view,
            disposed: AtomicBool::new(false),
        }),
    })
}

impl super::GpuContext for WgpuContext {
    fn create_texture(&self, width: u32, height: u32, format: TextureFormat) -> CoreResult<Texture> {
        create_texture_inner(&self.device, width, height, format, &self.next_id)
    }

    fn upload_image(&self, image: &DecodedImage, dest: Option<&Texture>) -> CoreResult<Texture> {
        let tex = match dest {
            Some(t) => t.clone(),
            None => self.create_texture(image.width, image.height, TextureFormat::Rgba8)?,
        };
        if tex.is_disposed() {
            return Err(CoreError::NotFound(format!("texture {} disposed", tex.id)));
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.inner.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &image.rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(image.width * 4),
                rows_per_image: Some(image.height),
            },
            wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(tex)
    }

    fn compile_shader(
        &self,
        vertex_src: &str,
        fragment_src: &str,
        layout: ShaderLayout,
    ) -> CoreResult<ShaderProgram> {
        let combined = format!("{vertex_src}\n{fragment_src}");
        validate_wgsl(&combined)?;

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("motion_core.effect_shader"),
            source: wgpu::ShaderSource::Wgsl(combined.into()),
        });
        Ok(ShaderProgram {
            id: self.alloc_id(),
            layout,
            inner: Arc::new(ShaderInner { module }),
        })
    }

    fn delete_shader(&self, program: ShaderProgram) {
        let mut state = self.lock();
        state.pipeline_cache.retain(|(id, _), _| *id != program.id);
        state.bind_group_layout_cache.remove(&program.id);
    }

    fn set_render_target(&self, target: Option<&Texture>) -> CoreResult<()> {
        if let Some(t) = target {
            if t.is_disposed() {
                return Err(CoreError::NotFound(format!("texture {} disposed", t.id)));
            }
        }
        let mut state = self.lock();
        state.render_target = target.cloned();
        Ok(())
    }

    fn clear(&self, r: f32, g: f32, b: f32, a: f32) {
        let state = self.lock();
        let (view, _) = self.current_target_view_and_format(&state);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("motion_core.clear"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("motion_core.clear_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.queue.submit(Some(encoder.finish()));
    }

    fn use_shader(&self, program: &ShaderProgram) {
        let mut state = self.lock();
        state.active_program = Some(program.clone());
        state.bound_textures.clear();
        state.pending_uniforms.clear();
    }

    fn set_uniform(&self, name: &str, value: UniformValue) {
        let mut state = self.lock();
        let Some(program) = state.active_program.clone() else {
            return;
        };
        // Unknown uniform name: silently ignored (optimized-out safe), §4.4.
        if program.layout.slot(name).is_none() {
            return;
        }
        state.pending_uniforms.insert(name.to_string(), value);
    }

    fn bind_texture(&self, texture: &Texture, unit: u32, sampler_name: &str) {
        let mut state = self.lock();
        state.bound_textures.insert(
            unit,
            BoundTexture {
                texture: texture.clone(),
                sampler_name: sampler_name.to_string(),
            },
        );
    }

    fn draw_fullscreen_quad(&self) -> CoreResult<()> {
        let mut state = self.lock();
        let Some(program) = state.active_program.clone() else {
            return Err(CoreError::NotCompiled("no active shader".into()));
        };

        let (_, target_format) = self.current_target_view_and_format(&state);
        let pipeline = self.pipeline_for(&mut state, &program, target_format);
        let bgl = self.bind_group_layout_for(&mut state, program.id, &program.layout);

        let uniform_bytes = self.pack_uniform_bytes(&program.layout, &state.pending_uniforms);
        let uniform_buffer = (!uniform_bytes.is_empty()).then(|| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("motion_core.uniforms"),
                contents: &uniform_bytes,
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });

        let mut entries = Vec::new();
        if let Some(buf) = &uniform_buffer {
            entries.push(wgpu::BindGroupEntry {
                binding: 0,
                resource: buf.as_entire_binding(),
            });
        }
        for i in 0..program.layout.texture_count {
            let bound = state.bound_textures.get(&i).ok_or_else(|| CoreError::InsufficientInputs {
                effect: "<shader>".into(),
                required: program.layout.texture_count as usize,
                got: state.bound_textures.len(),
            })?;
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + i * 2,
                resource: wgpu::BindingResource::TextureView(&bound.texture.inner.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: 2 + i * 2,
                resource: wgpu::BindingResource::Sampler(&state.sampler),
            });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("motion_core.effect_bind_group"),
            layout: &bgl,
            entries: &entries,
        });

        let (view, _) = self.current_target_view_and_format(&state);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("motion_core.draw"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("motion_core.draw_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, state.quad_vertex_buffer.slice(..));
            pass.draw(0..6, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn blit_to_canvas(&self, texture: &Texture) -> CoreResult<()> {
        let passthrough = self.lock().passthrough.clone();
        self.use_shader(&passthrough);
        self.set_render_target(None)?;
        self.bind_texture(texture, 0, "u_texture");
        self.draw_fullscreen_quad()
    }

    fn copy_texture(&self, src: &Texture, dst: &Texture) -> CoreResult<()> {
        let passthrough = self.lock().passthrough.clone();
        self.use_shader(&passthrough);
        self.set_render_target(Some(dst))?;
        self.bind_texture(src, 0, "u_texture");
        self.draw_fullscreen_quad()
    }

    fn read_pixels(&self, texture: &Texture) -> CoreResult<Vec<u8>> {
        let bytes_per_pixel = texture.format.bytes_per_pixel() as u32;
        let unpadded_bytes_per_row = texture.width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let buffer_size = (padded_bytes_per_row as u64) * (texture.height as u64);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("motion_core.read_pixels_staging"),
            size: buffer_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("motion_core.read_pixels"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.inner.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(texture.height),
                },
            },
            wgpu::Extent3d {
                width: texture.width,
                height: texture.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device.poll(wgpu::PollType::Wait).map_err(|e| CoreError::OutOfMemory { what: e.to_string() })?;
        rx.recv()
            .map_err(|e| CoreError::OutOfMemory { what: e.to_string() })?
            .map_err(|e| CoreError::OutOfMemory { what: e.to_string() })?;

        let data = slice.get_mapped_range();
        let mut out = Vec::with_capacity((unpadded_bytes_per_row as usize) * (texture.height as usize));
        for row in 0..texture.height as usize {
            let start = row * padded_bytes_per_row as usize;
            out.extend_from_slice(&data[start..start + unpadded_bytes_per_row as usize]);
        }
        drop(data);
        staging.unmap();
        Ok(out)
    }

    fn resize(&self, width: u32, height: u32) {
        if let Ok(new_canvas) = create_texture_inner(&self.device, width, height, TextureFormat::Rgba8, &self.next_id) {
            let mut state = self.lock();
            state.canvas = new_canvas;
            state.canvas_width = width;
            state.canvas_height = height;
        }
    }

    fn dispose_texture(&self, texture: &Texture) {
        texture.inner.disposed.store(true, Ordering::Release);
    }
}

fn validate_wgsl(source: &str) -> CoreResult<()> {
    naga::front::wgsl::parse_str(source).map_err(|e| CoreError::CompileError {
        stage: crate::error::ShaderStage::Fragment,
        diagnostic: e.to_string(),
    })?;
    Ok(())
}
