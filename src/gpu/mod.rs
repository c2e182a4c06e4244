//! Backend-neutral GPU context abstraction (C4, §4.4).
//!
//! The op table in §4.4 maps one-to-one onto [`GpuContext`]. The crate's
//! only implementation, [`WgpuContext`], targets `wgpu` directly (the
//! teacher's own GPU surface) rather than through the teacher's UI-toolkit
//! shim, since that shim exists to glue the node editor (out of scope per
//! `spec.md` §1) into `eframe`. A second backend can be added later by
//! implementing this trait again, the way the spec calls out a planned
//! explicit-GPU-API backend alongside the OpenGL-ES-3-equivalent one.

mod headless;
mod shader_layout;
mod wgpu_context;

pub use headless::HeadlessGpu;
pub use shader_layout::{pack_uniform_layout, ShaderLayout, UniformKind, UniformSlot};
pub use wgpu_context::WgpuContext;

use crate::error::CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
    Rgba16F,
    Rgba32F,
}

impl TextureFormat {
    /// Bytes per pixel, used by the texture pool's memory accounting (§4.5).
    pub fn bytes_per_pixel(self) -> u64 {
        match self {
            TextureFormat::Rgba8 => 4,
            TextureFormat::Rgba16F => 8,
            TextureFormat::Rgba32F => 16,
        }
    }

    pub(crate) fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TextureFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba16F => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Rgba32F => wgpu::TextureFormat::Rgba32Float,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Sampler(u32),
}

/// Power-preference / context-creation options (§4.4 `init`).
#[derive(Debug, Clone, Copy, Default)]
pub struct GpuInitOptions {
    pub power_preference: PowerPreference,
    pub antialias: bool,
    pub preserve_drawing_buffer: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PowerPreference {
    #[default]
    Default,
    LowPower,
    HighPerformance,
}

/// Opaque addressable GPU texture (§3). Cloning shares the same underlying
/// resource (it is a handle, not a copy); `disposed` is checked by every
/// operation so that use-after-dispose is a typed error rather than a panic.
#[derive(Clone)]
pub struct Texture {
    pub(crate) id: u64,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub(crate) inner: std::sync::Arc<wgpu_context::TextureInner>,
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Texture {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn bucket_key(&self) -> (u32, u32, TextureFormat) {
        (self.width, self.height, self.format)
    }

    pub fn memory_bytes(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.bytes_per_pixel()
    }
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Texture {}

/// A compiled shader program (§4.4 `compileShader`). Opaque; created and
/// consumed only through [`GpuContext`].
#[derive(Clone)]
pub struct ShaderProgram {
    pub(crate) id: u64,
    pub(crate) layout: ShaderLayout,
    pub(crate) inner: std::sync::Arc<wgpu_context::ShaderInner>,
}

impl std::fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderProgram").field("id", &self.id).finish()
    }
}

/// Backend-neutral GPU operations (§4.4). Every op after `init` assumes a
/// ready context. Draw state outside what an op sets is defined to be the
/// state left by the previous op, matching §4.4's closing note.
pub trait GpuContext {
    fn create_texture(&self, width: u32, height: u32, format: TextureFormat) -> CoreResult<Texture>;

    fn upload_image(
        &self,
        image: &crate::decoded_image::DecodedImage,
        dest: Option<&Texture>,
    ) -> CoreResult<Texture>;

    fn compile_shader(
        &self,
        vertex_src: &str,
        fragment_src: &str,
        layout: ShaderLayout,
    ) -> CoreResult<ShaderProgram>;

    fn delete_shader(&self, program: ShaderProgram);

    fn set_render_target(&self, target: Option<&Texture>) -> CoreResult<()>;

    fn clear(&self, r: f32, g: f32, b: f32, a: f32);

    fn use_shader(&self, program: &ShaderProgram);

    fn set_uniform(&self, name: &str, value: UniformValue);

    fn bind_texture(&self, texture: &Texture, unit: u32, sampler_name: &str);

    fn draw_fullscreen_quad(&self) -> CoreResult<()>;

    fn blit_to_canvas(&self, texture: &Texture) -> CoreResult<()>;

    fn copy_texture(&self, src: &Texture, dst: &Texture) -> CoreResult<()>;

    fn read_pixels(&self, texture: &Texture) -> CoreResult<Vec<u8>>;

    fn resize(&self, width: u32, height: u32);

    fn dispose_texture(&self, texture: &Texture);
}
