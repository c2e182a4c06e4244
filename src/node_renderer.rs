//! Node Renderer (C8, §4.8).
//!
//! One instance per visible output node. Owns the GPU context, texture pool,
//! pipeline, and the node's two frame caches (primary-input and merge-input),
//! the way the teacher scopes a `HeadlessRenderer` + pass state to one render
//! target.
//! Upstream resolution is [`crate::scene::resolve_upstream_chain`]
//! (`graph::upstream_reachable`, generalized to stop at a render boundary).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{error, warn};

use crate::affine::apply_static_transform;
use crate::broker::CompositeBroker;
use crate::decoded_image::DecodedImage;
use crate::effects::{Effect, EffectRegistry, MergeEffect, ParamValue};
use crate::error::{CoreError, CoreResult};
use crate::frame_cache::FrameCache;
use crate::frame_store::FrameStore;
use crate::gpu::{GpuContext, Texture, TextureFormat};
use crate::mapping::map_global_frame_to_source;
use crate::pipeline::{RenderNode, RenderPipeline};
use crate::scene::{resolve_upstream_chain, BlendMode, SceneGraphSource, SceneNode};
use crate::texture_pool::{TexturePool, TexturePoolLimits};

/// An externally supplied 2-D canvas handle (§6). The crate ships only
/// [`RgbaCanvas`]; a host embeds a real canvas (e.g. an HTML canvas, a
/// window surface) by implementing this trait.
pub trait CanvasSink {
    fn write_rgba(&mut self, width: u32, height: u32, rgba: &[u8]);
}

/// In-memory canvas, analogous to the teacher's headless surface standing in
/// for a live `eframe` window in tests.
#[derive(Debug, Clone, Default)]
pub struct RgbaCanvas {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl CanvasSink for RgbaCanvas {
    fn write_rgba(&mut self, width: u32, height: u32, rgba: &[u8]) {
        self.width = width;
        self.height = height;
        self.rgba = rgba.to_vec();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Idle,
    Resolving,
    Loading,
    Uploading,
    Evaluating,
    Publishing,
}

/// Row-major top-left image → bottom-left-origin GPU readback, or back
/// again: flipping twice is a no-op, so this single function serves both
/// directions (§4.8 step 6).
fn flip_rows(width: u32, height: u32, rgba: &[u8]) -> Vec<u8> {
    let row_bytes = width as usize * 4;
    let mut out = vec![0u8; rgba.len()];
    for y in 0..height as usize {
        let src = &rgba[y * row_bytes..(y + 1) * row_bytes];
        let dst_row = height as usize - 1 - y;
        out[dst_row * row_bytes..(dst_row + 1) * row_bytes].copy_from_slice(src);
    }
    out
}

/// Structural vs. fallback-eligible failure, per §7's error policy.
fn is_structural(err: &CoreError) -> bool {
    matches!(err, CoreError::MissingInput { .. })
}

/// Which of a `NodeRenderer`'s two frame caches a load should go through
/// (§4.3): the 50-bound primary-input cache for the node's own upstream
/// chain, or the 30-bound cache for a merge's bg/fg side inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheKind {
    Layer,
    MergeInput,
}

pub struct NodeRenderer<G: GpuContext, C: CanvasSink> {
    node_id: String,
    gpu: G,
    pool: TexturePool,
    pipeline: RenderPipeline,
    registry: Arc<EffectRegistry>,
    broker: Arc<CompositeBroker>,
    frame_cache: FrameCache,
    merge_input_cache: FrameCache,
    source_texture: Option<Texture>,
    merge_effect: Option<MergeEffect>,
    canvas: C,
    state: RendererState,
    reported_load_failures: HashSet<(String, u64)>,
}

/// Outcome of resolving a node's upstream chain and (for a Source) loading
/// its current frame, shared by the single-input-chain path and the merge
/// bg/fg resolution path (§4.8 steps 1-2).
enum ResolvedSource {
    Ready(DecodedImage, Vec<RenderNode>),
    Inactive(Option<(u32, u32)>),
    NotReady,
}

fn blend_mode_name(mode: BlendMode) -> &'static str {
    match mode {
        BlendMode::Over => "over",
        BlendMode::Under => "under",
        BlendMode::Add => "add",
        BlendMode::Subtract => "subtract",
        BlendMode::Screen => "screen",
        BlendMode::Overlay => "overlay",
    }
}

impl<G: GpuContext, C: CanvasSink> NodeRenderer<G, C> {
    pub fn new(node_id: impl Into<String>, gpu: G, canvas: C, broker: Arc<CompositeBroker>, registry: Arc<EffectRegistry>) -> Self {
        NodeRenderer {
            node_id: node_id.into(),
            gpu,
            pool: TexturePool::new(TexturePoolLimits::default()),
            pipeline: RenderPipeline::new(),
            registry,
            broker,
            frame_cache: FrameCache::layer_default(),
            merge_input_cache: FrameCache::merge_input_default(),
            source_texture: None,
            merge_effect: None,
            canvas,
            state: RendererState::Idle,
            reported_load_failures: HashSet::new(),
        }
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn stats(&self) -> crate::pipeline::PipelineStats {
        self.pipeline.stats()
    }

    /// §4.8's per-frame rendering algorithm. Returns `Ok(true)` when a frame
    /// was published, `Ok(false)` when the renderer correctly produced no
    /// output this frame (inactive layer, incomplete upstream, or a
    /// dependency not yet ready).
    pub fn render_global_frame<S: FrameStore>(
        &mut self,
        scene: &dyn SceneGraphSource,
        store: &S,
        g: u64,
    ) -> CoreResult<bool> {
        self.state = RendererState::Resolving;
        let target_id = self.node_id.clone();
        let resolved = self.resolve_input_and_nodes(scene, store, &target_id, g, CacheKind::Layer)?;
        let (effective_input, render_nodes) = match resolved {
            ResolvedSource::Ready(image, nodes) => (image, nodes),
            ResolvedSource::Inactive(dims) => {
                if let Some(dims) = dims {
                    self.canvas
                        .write_rgba(dims.0, dims.1, &vec![0u8; dims.0 as usize * dims.1 as usize * 4]);
                }
                self.state = RendererState::Idle;
                return Ok(false);
            }
            ResolvedSource::NotReady => {
                self.state = RendererState::Idle;
                return Ok(false);
            }
        };

        match self.render_with(&effective_input, &render_nodes, g) {
            Ok(published) => {
                self.state = RendererState::Idle;
                Ok(published)
            }
            Err(err) if is_structural(&err) => {
                error!(node_id = %self.node_id, frame = g, error = %err, "structural render failure, no fallback");
                self.state = RendererState::Idle;
                Ok(false)
            }
            Err(err) => {
                warn!(node_id = %self.node_id, frame = g, error = %err, "render failed, falling back to raw input copy");
                self.canvas.write_rgba(effective_input.width, effective_input.height, &effective_input.rgba);
                self.state = RendererState::Idle;
                Ok(false)
            }
        }
    }

    /// §4.8 step 2's composite path: a Merge node has no single upstream
    /// chain to resolve. Its `bg` and `fg` ports are resolved and evaluated
    /// independently (each may itself bottom out at a Source or a nested
    /// Merge's broker output), blended by [`MergeEffect`] directly — bypassing
    /// the generic per-node pipeline dispatch, since merge needs
    /// `set_fg_size` from the node's own `fg_size` field rather than from an
    /// `EffectRegistry` lookup — and the composited bitmap is published under
    /// the merge's own id so a downstream renderer's `composite_source_node`
    /// branch can consume it.
    pub fn render_merge_global_frame<S: FrameStore>(
        &mut self,
        scene: &dyn SceneGraphSource,
        store: &S,
        merge_id: &str,
        g: u64,
    ) -> CoreResult<bool> {
        self.state = RendererState::Resolving;
        let merge = match scene.scene_graph().nodes.get(merge_id) {
            Some(SceneNode::Merge(m)) => m.clone(),
            _ => {
                self.state = RendererState::Idle;
                return Err(CoreError::NotFound(format!("merge node '{merge_id}'")));
            }
        };

        let Some(bg_id) = merge.bg.clone() else {
            self.state = RendererState::Idle;
            return Ok(false);
        };

        self.state = RendererState::Loading;
        let Some(bg_image) = self.evaluate_chain_to_image(scene, store, &bg_id, g)? else {
            self.state = RendererState::Idle;
            return Ok(false);
        };

        let fg_image = match &merge.fg {
            Some(fg_id) => self.evaluate_chain_to_image(scene, store, fg_id, g)?,
            None => None,
        };
        // §4.6/S5: an absent or not-yet-ready foreground composites as fully
        // transparent rather than blocking the merge, sized to the node's
        // declared `fg_size` (falling back to the background's dimensions).
        let fg_image = fg_image.unwrap_or_else(|| {
            let (w, h) = merge.fg_size.unwrap_or((bg_image.width, bg_image.height));
            DecodedImage::solid(w.max(1), h.max(1), [0, 0, 0, 0])
        });

        self.state = RendererState::Evaluating;
        self.gpu.resize(bg_image.width, bg_image.height);
        let bg_texture = self.pool.acquire(&self.gpu, bg_image.width, bg_image.height, TextureFormat::Rgba8)?;
        self.gpu.upload_image(&bg_image, Some(&bg_texture))?;
        let fg_texture = self.pool.acquire(&self.gpu, fg_image.width, fg_image.height, TextureFormat::Rgba8)?;
        self.gpu.upload_image(&fg_image, Some(&fg_texture))?;
        let output_texture = self.pool.acquire(&self.gpu, bg_image.width, bg_image.height, TextureFormat::Rgba8)?;

        let declared_fg_size = merge.fg_size.unwrap_or((0, 0));
        let mut params = HashMap::new();
        params.insert("mode".to_string(), ParamValue::Enum(blend_mode_name(merge.mode.resolve()).to_string()));
        params.insert("opacity".to_string(), ParamValue::Float(merge.fg_opacity));

        let effect = self.merge_effect()?;
        effect.set_fg_size(declared_fg_size.0 as f32, declared_fg_size.1 as f32);
        effect.set_parameters(params);
        let apply_result = effect.apply(&self.gpu, &[bg_texture.clone(), fg_texture.clone()], &output_texture);

        self.pool.release(&self.gpu, bg_texture);
        self.pool.release(&self.gpu, fg_texture);
        apply_result?;

        let raw_pixels = self.gpu.read_pixels(&output_texture)?;
        let flipped = flip_rows(output_texture.width, output_texture.height, &raw_pixels);
        self.pool.release(&self.gpu, output_texture);

        self.state = RendererState::Publishing;
        let bitmap = DecodedImage::new(bg_image.width, bg_image.height, flipped);
        self.canvas.write_rgba(bitmap.width, bitmap.height, &bitmap.rgba);
        self.broker.set_output(merge_id, bitmap, g);
        self.state = RendererState::Idle;
        Ok(true)
    }

    fn merge_effect(&mut self) -> CoreResult<&mut MergeEffect> {
        if self.merge_effect.is_none() {
            let mut effect = MergeEffect::new();
            effect.compile(&self.gpu)?;
            self.merge_effect = Some(effect);
        }
        Ok(self.merge_effect.as_mut().expect("just inserted"))
    }

    /// Resolves `target_id`'s upstream chain and, for a Source-rooted chain,
    /// loads and transforms its current frame; for a Merge-rooted chain,
    /// reads that merge's broker output for frame `g`. Shared by
    /// [`Self::render_global_frame`] and [`Self::evaluate_chain_to_image`].
    fn resolve_input_and_nodes<S: FrameStore>(
        &mut self,
        scene: &dyn SceneGraphSource,
        store: &S,
        target_id: &str,
        g: u64,
        cache_kind: CacheKind,
    ) -> CoreResult<ResolvedSource> {
        let chain = resolve_upstream_chain(scene.scene_graph(), target_id);
        if !chain.is_complete {
            return Ok(ResolvedSource::NotReady);
        }

        let effective_input = if let Some(source_id) = &chain.source_node {
            match self.load_source_input(scene, store, source_id, g, cache_kind)? {
                Some(image) => image,
                None => return Ok(ResolvedSource::Inactive(self.inactive_layer_dims(scene, source_id))),
            }
        } else if let Some(merge_id) = &chain.composite_source_node {
            match self.broker.get_output(merge_id) {
                Some(entry) if entry.frame_index == g => entry.bitmap,
                _ => return Ok(ResolvedSource::NotReady),
            }
        } else {
            return Ok(ResolvedSource::NotReady);
        };

        let render_nodes = self.build_render_nodes(scene, &chain.operation_nodes)?;
        Ok(ResolvedSource::Ready(effective_input, render_nodes))
    }

    /// Resolves and fully evaluates `target_id`'s chain down to a plain
    /// bitmap, for use as a merge's `bg`/`fg` input. Unlike
    /// [`Self::render_with`], the GPU texture used here is transient
    /// (acquired and released within this call) rather than the renderer's
    /// persistent `source_texture`, since a merge's two sides don't share
    /// the single per-renderer source slot that the main chain does.
    fn evaluate_chain_to_image<S: FrameStore>(
        &mut self,
        scene: &dyn SceneGraphSource,
        store: &S,
        target_id: &str,
        g: u64,
    ) -> CoreResult<Option<DecodedImage>> {
        let (effective_input, render_nodes) = match self.resolve_input_and_nodes(scene, store, target_id, g, CacheKind::MergeInput)? {
            ResolvedSource::Ready(image, nodes) => (image, nodes),
            ResolvedSource::Inactive(_) | ResolvedSource::NotReady => return Ok(None),
        };

        if render_nodes.is_empty() {
            return Ok(Some(effective_input));
        }

        self.gpu.resize(effective_input.width, effective_input.height);
        let input_texture = self.pool.acquire(&self.gpu, effective_input.width, effective_input.height, TextureFormat::Rgba8)?;

        if let Err(err) = self.gpu.upload_image(&effective_input, Some(&input_texture)) {
            self.pool.release(&self.gpu, input_texture);
            return Err(err);
        }

        let result = match self
            .pipeline
            .evaluate(&self.gpu, &mut self.pool, &self.registry, &render_nodes, &input_texture, g)
        {
            Ok(tex) => tex,
            Err(err) => {
                self.pool.release(&self.gpu, input_texture);
                return Err(err);
            }
        };

        let raw_pixels = self.gpu.read_pixels(&result)?;
        let flipped = flip_rows(result.width, result.height, &raw_pixels);
        self.pool.release(&self.gpu, input_texture);
        Ok(Some(DecodedImage::new(result.width, result.height, flipped)))
    }

    fn inactive_layer_dims(&self, scene: &dyn SceneGraphSource, source_node_id: &str) -> Option<(u32, u32)> {
        let SceneNode::Source(source) = scene.scene_graph().nodes.get(source_node_id)? else {
            return None;
        };
        let layer = scene.layer(&source.layer_id)?;
        let asset = scene.asset(&layer.asset_id)?;
        Some(asset.dimensions())
    }

    fn load_source_input<S: FrameStore>(
        &mut self,
        scene: &dyn SceneGraphSource,
        store: &S,
        source_node_id: &str,
        g: u64,
        cache_kind: CacheKind,
    ) -> CoreResult<Option<DecodedImage>> {
        let SceneNode::Source(source) = scene
            .scene_graph()
            .nodes
            .get(source_node_id)
            .ok_or_else(|| CoreError::MissingInput {
                node_id: self.node_id.clone(),
                input_id: source_node_id.to_string(),
            })?
        else {
            return Err(CoreError::MissingInput {
                node_id: self.node_id.clone(),
                input_id: source_node_id.to_string(),
            });
        };

        let layer = scene
            .layer(&source.layer_id)
            .ok_or_else(|| CoreError::NotFound(format!("layer '{}'", source.layer_id)))?;
        let asset = scene
            .asset(&layer.asset_id)
            .ok_or_else(|| CoreError::NotFound(format!("asset '{}'", layer.asset_id)))?;

        let Some(s) = map_global_frame_to_source(g, layer.time_range, asset.frame_count()) else {
            return Ok(None);
        };

        let cache = match cache_kind {
            CacheKind::Layer => &mut self.frame_cache,
            CacheKind::MergeInput => &mut self.merge_input_cache,
        };
        let image = match cache.get(&asset_key(layer.asset_id.as_str()), s) {
            Some(cached) => cached,
            None => {
                let path = crate::frame_store::frame_path(&layer.asset_id, s, crate::frame_store::FrameExt::Png);
                match store.get(&path) {
                    Ok(bytes) => {
                        let decoded = crate::media_decoder::decode_stored_bytes(&bytes)?;
                        cache.insert(&asset_key(layer.asset_id.as_str()), s, decoded.clone());
                        decoded
                    }
                    Err(CoreError::NotFound(_)) => {
                        if self.reported_load_failures.insert((layer.asset_id.clone(), s)) {
                            warn!(source = %layer.asset_id, frame = s, "frame load failed, blob not found");
                        }
                        return Ok(None);
                    }
                    Err(other) => return Err(other),
                }
            }
        };

        Ok(Some(apply_static_transform(&image, &layer.transform)))
    }

    fn build_render_nodes(&self, scene: &dyn SceneGraphSource, operation_ids: &[String]) -> CoreResult<Vec<RenderNode>> {
        let mut nodes = Vec::new();
        let mut prior: Option<String> = None;
        for id in operation_ids {
            let SceneNode::Operation(op) = scene
                .scene_graph()
                .nodes
                .get(id)
                .ok_or_else(|| CoreError::MissingInput {
                    node_id: self.node_id.clone(),
                    input_id: id.clone(),
                })?
            else {
                continue;
            };
            if !op.enabled {
                continue;
            }
            let input_ids = match &prior {
                None => vec!["source".to_string()],
                Some(p) => vec![p.clone()],
            };
            nodes.push(RenderNode {
                id: op.id.clone(),
                effect_name: op.op.effect_name().to_string(),
                params: op
                    .params
                    .iter()
                    .map(|(k, v)| (k.clone(), json_to_param_value(v)))
                    .collect(),
                input_ids,
            });
            prior = Some(op.id.clone());
        }
        Ok(nodes)
    }

    fn render_with(&mut self, input: &DecodedImage, render_nodes: &[RenderNode], g: u64) -> CoreResult<bool> {
        self.gpu.resize(input.width, input.height);
        let needs_new_source = match &self.source_texture {
            Some(t) => t.width != input.width || t.height != input.height,
            None => true,
        };
        if needs_new_source {
            if let Some(old) = self.source_texture.take() {
                self.pool.release(&self.gpu, old);
            }
            self.source_texture = Some(self.pool.acquire(&self.gpu, input.width, input.height, TextureFormat::Rgba8)?);
        }

        if render_nodes.is_empty() {
            self.canvas.write_rgba(input.width, input.height, &input.rgba);
            self.broker.set_output(&self.node_id, input.clone(), g);
            return Ok(true);
        }

        self.state = RendererState::Uploading;
        let source_texture = self.source_texture.clone().expect("ensured above");
        self.gpu.upload_image(input, Some(&source_texture))?;

        self.state = RendererState::Evaluating;
        let result = self
            .pipeline
            .evaluate(&self.gpu, &mut self.pool, &self.registry, render_nodes, &source_texture, g)?;

        self.gpu.blit_to_canvas(&result)?;
        let raw_pixels = self.gpu.read_pixels(&result)?;
        let flipped = flip_rows(result.width, result.height, &raw_pixels);

        self.state = RendererState::Publishing;
        self.canvas.write_rgba(result.width, result.height, &flipped);
        self.broker
            .set_output(&self.node_id, DecodedImage::new(result.width, result.height, flipped), g);
        Ok(true)
    }

    /// §5: disposal cancels pending loads (none outstanding — this crate's
    /// loads are synchronous), releases the source texture, clears the
    /// pipeline and frame cache, and drops the GPU context.
    pub fn dispose(mut self) {
        if let Some(tex) = self.source_texture.take() {
            self.pool.release(&self.gpu, tex);
        }
        if let Some(mut effect) = self.merge_effect.take() {
            effect.dispose(&self.gpu);
        }
        self.pipeline.clear_all(&mut self.pool, &self.gpu);
        self.pool.clear_all(&self.gpu);
        self.frame_cache.clear();
        self.merge_input_cache.clear();
    }
}

fn asset_key(asset_id: &str) -> String {
    asset_id.to_string()
}

fn json_to_param_value(value: &serde_json::Value) -> ParamValue {
    match value {
        serde_json::Value::Bool(b) => ParamValue::Bool(*b),
        serde_json::Value::Number(n) => ParamValue::Float(n.as_f64().unwrap_or(0.0) as f32),
        serde_json::Value::String(s) => ParamValue::Enum(s.clone()),
        serde_json::Value::Array(items) => {
            let floats: Vec<f32> = items.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect();
            match floats.len() {
                2 => ParamValue::Vec2([floats[0], floats[1]]),
                3 => ParamValue::Vec3([floats[0], floats[1], floats[2]]),
                4 => ParamValue::Vec4([floats[0], floats[1], floats[2], floats[3]]),
                _ => ParamValue::Float(0.0),
            }
        }
        _ => ParamValue::Float(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_rows_is_involutive() {
        let rgba: Vec<u8> = (0..(4 * 2 * 4)).map(|i| i as u8).collect();
        let once = flip_rows(4, 2, &rgba);
        let twice = flip_rows(4, 2, &once);
        assert_eq!(twice, rgba);
    }

    #[test]
    fn structural_errors_are_recognized() {
        let err = CoreError::MissingInput {
            node_id: "a".into(),
            input_id: "b".into(),
        };
        assert!(is_structural(&err));
        assert!(!is_structural(&CoreError::CycleDetected));
    }
}
