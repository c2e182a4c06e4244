//! `motion_core`: the GPU render engine core of a browser-based
//! motion-graphics compositor.
//!
//! This crate owns six collaborating components (C1-C9 in module docs):
//! a content-addressed frame store, a bounded per-layer frame cache, a
//! backend-neutral GPU context, a pooled-texture allocator, a registry of
//! built-in effects, a per-node render pipeline evaluator, and the
//! node-level render orchestrator that ties them together against a
//! host-owned scene graph and timeline. Everything the editor, clipboard
//! ingestion, and persistence layers own is consumed only through the
//! [`scene::SceneGraphSource`]/[`scene::TimelineSource`]/[`frame_store::FrameStore`]
//! seams, never depended on directly.

pub mod affine;
pub mod broker;
pub mod decoded_image;
pub mod effects;
pub mod error;
pub mod frame_cache;
pub mod frame_store;
pub mod gpu;
pub mod mapping;
pub mod media_decoder;
pub mod node_renderer;
pub mod pipeline;
pub mod scene;
pub mod texture_pool;

pub use broker::CompositeBroker;
pub use decoded_image::DecodedImage;
pub use effects::{ColorAdjustEffect, Effect, EffectRegistry, GaussianBlurEffect, MergeEffect};
pub use error::{CoreError, CoreResult};
pub use frame_cache::FrameCache;
pub use frame_store::{FrameExt, FrameStore, MemoryFrameStore};
pub use gpu::{GpuContext, GpuInitOptions, HeadlessGpu, Texture, TextureFormat, WgpuContext};
pub use media_decoder::{extract, ExtractOptions, FixtureContainerDecoder, MediaDecoder};
pub use node_renderer::{CanvasSink, NodeRenderer, RendererState, RgbaCanvas};
pub use pipeline::{PipelineStats, RenderNode, RenderPipeline};
pub use scene::{SceneGraph, SceneGraphSource, TimelineSource};
pub use texture_pool::{TexturePool, TexturePoolLimits};
