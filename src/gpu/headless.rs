//! Headless `wgpu` device/adapter acquisition, grounded in the teacher's
//! `HeadlessRenderer`/`HeadlessRendererConfig` — blocking init via
//! `pollster` so tests and offscreen render paths don't need to be async
//! themselves, the same trade the teacher makes for its test harness.

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};

use super::wgpu_context::WgpuContext;
use super::{GpuInitOptions, PowerPreference};

/// Owns the `wgpu::Instance`/`Device`/`Queue` needed to build a
/// [`WgpuContext`] without a window or surface — the default configuration
/// for node rendering, which targets an offscreen canvas texture (§4.4).
pub struct HeadlessGpu {
    pub context: WgpuContext,
}

impl HeadlessGpu {
    /// Blocks on adapter/device acquisition the way the teacher's headless
    /// renderer does; callers on an async runtime should run this via
    /// `spawn_blocking` rather than calling it from inside a task.
    pub fn new(opts: GpuInitOptions, canvas_width: u32, canvas_height: u32) -> CoreResult<Self> {
        pollster::block_on(Self::new_async(opts, canvas_width, canvas_height))
    }

    pub async fn new_async(opts: GpuInitOptions, canvas_width: u32, canvas_height: u32) -> CoreResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power_preference = match opts.power_preference {
            PowerPreference::Default => wgpu::PowerPreference::None,
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| CoreError::BackendUnavailable(e.to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("motion_core.headless_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| CoreError::BackendUnavailable(e.to_string()))?;

        let context = WgpuContext::init(Arc::new(device), Arc::new(queue), opts, canvas_width, canvas_height)?;
        Ok(HeadlessGpu { context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::GpuContext as _;
    use crate::gpu::TextureFormat;

    #[test]
    fn headless_context_creates_and_disposes_textures() {
        let gpu = match HeadlessGpu::new(GpuInitOptions::default(), 64, 64) {
            Ok(g) => g,
            Err(_) => return, // no GPU backend available in this environment
        };
        let tex = gpu.context.create_texture(16, 16, TextureFormat::Rgba8).unwrap();
        assert!(!tex.is_disposed());
        gpu.context.dispose_texture(&tex);
        assert!(tex.is_disposed());
    }
}
