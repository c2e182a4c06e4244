//! Render Pipeline (C7, §4.7).
//!
//! Topological order comes straight from the teacher's `graph::topo_sort`
//! (Kahn's algorithm over a node/edge set), adapted from scene-DSL node ids
//! to render-node ids and edges implied by `RenderNode::input_ids` instead of
//! an explicit edge list.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::effects::{Effect, EffectRegistry, ParamValue};
use crate::error::{CoreError, CoreResult};
use crate::gpu::{GpuContext, Texture};
use crate::texture_pool::TexturePool;

pub type NodeId = String;

/// One node to evaluate this frame. `input_ids[i]` names either `"source"`
/// (the pipeline's `sourceTexture` argument) or another node's id.
#[derive(Debug, Clone)]
pub struct RenderNode {
    pub id: NodeId,
    pub effect_name: String,
    pub params: HashMap<String, ParamValue>,
    pub input_ids: Vec<String>,
}

struct CacheEntry {
    dirty: bool,
    last_frame_index: Option<u64>,
    parameter_hash: String,
    output_texture: Option<Texture>,
}

impl CacheEntry {
    fn fresh() -> Self {
        CacheEntry {
            dirty: true,
            last_frame_index: None,
            parameter_hash: String::new(),
            output_texture: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStats {
    pub nodes_evaluated: u64,
    pub nodes_cached: u64,
    pub wall_time: Duration,
}

fn hash_params(effect_name: &str, params: &HashMap<String, ParamValue>) -> String {
    let mut entries: Vec<(&String, &ParamValue)> = params.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let mut out = format!("{effect_name}(");
    for (i, (k, v)) in entries.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(k);
        out.push('=');
        out.push_str(&format!("{v:?}"));
    }
    out.push(')');
    out
}

/// Kahn's algorithm over `nodes` alone: an edge exists from producer `p` to
/// consumer `c` whenever `c`'s `input_ids` names `p`'s id. A literal
/// `"source"` input contributes no dependency. Returns `(order, had_cycle)`;
/// on a cycle the order is a partial topological prefix, matching §4.7 step 1
/// ("emit a warning and proceed with the partial order").
fn topo_sort(nodes: &[RenderNode]) -> (Vec<NodeId>, bool) {
    let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut consumers: HashMap<&str, Vec<&str>> = HashMap::new();

    for node in nodes {
        let deps = node
            .input_ids
            .iter()
            .filter(|i| i.as_str() != "source" && ids.contains(i.as_str()))
            .count();
        indegree.insert(&node.id, deps);
        for input in &node.input_ids {
            if input != "source" && ids.contains(input.as_str()) {
                consumers.entry(input.as_str()).or_default().push(&node.id);
            }
        }
    }

    let mut queue: VecDeque<&str> = nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| indegree[id] == 0)
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        if let Some(next) = consumers.get(id) {
            for &c in next {
                let d = indegree.get_mut(c).unwrap();
                *d -= 1;
                if *d == 0 {
                    queue.push_back(c);
                }
            }
        }
    }

    let had_cycle = order.len() != nodes.len();
    (order, had_cycle)
}

/// Per-GPU-context render graph evaluator. One instance per
/// [`crate::node_renderer::NodeRenderer`] — per-context effect instances are
/// never shared across pipelines (§4.9 design note).
pub struct RenderPipeline {
    cache: HashMap<NodeId, CacheEntry>,
    effect_cache: HashMap<String, Box<dyn Effect>>,
    last_stats: PipelineStats,
}

impl RenderPipeline {
    pub fn new() -> Self {
        RenderPipeline {
            cache: HashMap::new(),
            effect_cache: HashMap::new(),
            last_stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.last_stats
    }

    fn effect_for<'a>(
        &'a mut self,
        ctx: &dyn GpuContext,
        registry: &EffectRegistry,
        effect_name: &str,
    ) -> CoreResult<&'a mut Box<dyn Effect>> {
        if !self.effect_cache.contains_key(effect_name) {
            let mut instance = registry.instantiate(effect_name)?;
            instance.compile(ctx)?;
            self.effect_cache.insert(effect_name.to_string(), instance);
        }
        Ok(self.effect_cache.get_mut(effect_name).expect("just inserted"))
    }

    /// §4.7: evaluate `nodes` in topological order against `source_texture`,
    /// returning the last node's output, or `source_texture` unchanged if
    /// `nodes` is empty.
    pub fn evaluate(
        &mut self,
        ctx: &dyn GpuContext,
        pool: &mut TexturePool,
        registry: &EffectRegistry,
        nodes: &[RenderNode],
        source_texture: &Texture,
        frame_index: u64,
    ) -> CoreResult<Texture> {
        let start = Instant::now();
        if nodes.is_empty() {
            self.last_stats = PipelineStats {
                wall_time: start.elapsed(),
                ..Default::default()
            };
            return Ok(source_texture.clone());
        }

        let (order, had_cycle) = topo_sort(nodes);
        if had_cycle {
            warn!(node_count = nodes.len(), "cycle detected in render node graph; proceeding with partial order");
        }

        let by_id: HashMap<&str, &RenderNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let mut outputs: HashMap<String, Texture> = HashMap::new();
        outputs.insert("source".to_string(), source_texture.clone());

        let mut nodes_evaluated = 0u64;
        let mut nodes_cached = 0u64;
        let mut last_output = source_texture.clone();

        for id in &order {
            let node = by_id.get(id.as_str()).expect("topo order only contains known ids");
            let new_hash = hash_params(&node.effect_name, &node.params);

            let needs_render = {
                let entry = self.cache.entry(id.clone()).or_insert_with(CacheEntry::fresh);
                let stale_input = node.input_ids.iter().any(|input_id| {
                    input_id != "source"
                        && self
                            .cache
                            .get(input_id)
                            .and_then(|e| e.last_frame_index)
                            .is_some_and(|lf| entry.last_frame_index.is_none_or(|mine| lf > mine))
                });
                entry.dirty
                    || entry.last_frame_index != Some(frame_index)
                    || entry.parameter_hash != new_hash
                    || entry.output_texture.is_none()
                    || stale_input
            };

            if needs_render {
                let mut input_textures = Vec::with_capacity(node.input_ids.len());
                for input_id in &node.input_ids {
                    let tex = outputs
                        .get(input_id)
                        .ok_or_else(|| CoreError::MissingInput {
                            node_id: node.id.clone(),
                            input_id: input_id.clone(),
                        })?
                        .clone();
                    input_textures.push(tex);
                }

                let entry = self.cache.get_mut(id).expect("inserted above");
                let needs_new_texture = match &entry.output_texture {
                    Some(t) => {
                        t.width != source_texture.width
                            || t.height != source_texture.height
                            || t.format != source_texture.format
                    }
                    None => true,
                };
                if needs_new_texture {
                    if let Some(old) = entry.output_texture.take() {
                        pool.release(ctx, old);
                    }
                    entry.output_texture = Some(pool.acquire(
                        ctx,
                        source_texture.width,
                        source_texture.height,
                        source_texture.format,
                    )?);
                }
                let output_texture = entry.output_texture.clone().expect("ensured above");

                let effect = self.effect_for(ctx, registry, &node.effect_name)?;
                effect.set_parameters(node.params.clone());
                effect.apply(ctx, &input_textures, &output_texture)?;

                let entry = self.cache.get_mut(id).expect("inserted above");
                entry.parameter_hash = new_hash;
                entry.last_frame_index = Some(frame_index);
                entry.dirty = false;

                debug!(node_id = %id, frame_index, "render node evaluated");
                nodes_evaluated += 1;
                outputs.insert(id.clone(), output_texture.clone());
                last_output = output_texture;
            } else {
                let entry = self.cache.get(id).expect("inserted above");
                let output_texture = entry.output_texture.clone().expect("checked by needs_render");
                nodes_cached += 1;
                outputs.insert(id.clone(), output_texture.clone());
                last_output = output_texture;
            }
        }

        self.last_stats = PipelineStats {
            nodes_evaluated,
            nodes_cached,
            wall_time: start.elapsed(),
        };
        Ok(last_output)
    }

    /// Marks `id` and every transitively downstream node (per `nodes`'
    /// current edges) dirty.
    pub fn mark_dirty(&mut self, id: &str, nodes: &[RenderNode]) {
        let mut consumers: HashMap<&str, Vec<&str>> = HashMap::new();
        for node in nodes {
            for input in &node.input_ids {
                if input != "source" {
                    consumers.entry(input.as_str()).or_default().push(&node.id);
                }
            }
        }

        let mut queue = VecDeque::new();
        queue.push_back(id.to_string());
        let mut visited = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(entry) = self.cache.get_mut(&current) {
                entry.dirty = true;
            }
            if let Some(next) = consumers.get(current.as_str()) {
                for &c in next {
                    queue.push_back(c.to_string());
                }
            }
        }
    }

    pub fn mark_all_dirty(&mut self) {
        for entry in self.cache.values_mut() {
            entry.dirty = true;
        }
    }

    pub fn clear_node<G: GpuContext>(&mut self, pool: &mut TexturePool, gpu: &G, id: &str) {
        if let Some(entry) = self.cache.remove(id) {
            if let Some(tex) = entry.output_texture {
                pool.release(gpu, tex);
            }
        }
    }

    pub fn clear_all<G: GpuContext>(&mut self, pool: &mut TexturePool, gpu: &G) {
        for (_, entry) in self.cache.drain() {
            if let Some(tex) = entry.output_texture {
                pool.release(gpu, tex);
            }
        }
        for (_, mut effect) in self.effect_cache.drain() {
            effect.dispose(gpu);
        }
    }
}

impl Default for RenderPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, inputs: &[&str]) -> RenderNode {
        RenderNode {
            id: id.to_string(),
            effect_name: "colorAdjust".to_string(),
            params: HashMap::new(),
            input_ids: inputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn topo_order_respects_dependencies() {
        let nodes = vec![node("a", &["source"]), node("b", &["a"]), node("c", &["b"])];
        let (order, had_cycle) = topo_sort(&nodes);
        assert!(!had_cycle);
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn cycle_is_detected_and_partial_order_returned() {
        let nodes = vec![node("a", &["b"]), node("b", &["a"])];
        let (order, had_cycle) = topo_sort(&nodes);
        assert!(had_cycle);
        assert!(order.len() < nodes.len());
    }

    #[test]
    fn independent_nodes_both_depend_only_on_source() {
        let nodes = vec![node("a", &["source"]), node("b", &["source"])];
        let (order, had_cycle) = topo_sort(&nodes);
        assert!(!had_cycle);
        assert_eq!(order.len(), 2);
    }

    proptest::proptest! {
        /// For any chain built by shuffling a linear id sequence into
        /// `RenderNode`s whose `input_ids` still point back along that
        /// sequence, `topo_sort` must report no cycle and must place every
        /// node after all of its dependencies.
        #[test]
        fn topo_sort_never_places_a_node_before_its_dependency(len in 1usize..12) {
            let ids: Vec<String> = (0..len).map(|i| format!("n{i}")).collect();
            let nodes: Vec<RenderNode> = ids
                .iter()
                .enumerate()
                .map(|(i, id)| {
                    let inputs: &[&str] = if i == 0 { &["source"] } else { &[] };
                    let mut n = node(id, inputs);
                    if i > 0 {
                        n.input_ids = vec![ids[i - 1].clone()];
                    }
                    n
                })
                .collect();

            let (order, had_cycle) = topo_sort(&nodes);
            prop_assert!(!had_cycle);
            prop_assert_eq!(order.len(), nodes.len());

            let position: HashMap<&str, usize> =
                order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
            for n in &nodes {
                for input in &n.input_ids {
                    if input != "source" {
                        prop_assert!(position[input.as_str()] < position[n.id.as_str()]);
                    }
                }
            }
        }
    }
}
