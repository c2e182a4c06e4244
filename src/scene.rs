//! Scene-graph data model (§3).
//!
//! The editor owns the authoritative scene graph; this crate only ever reads
//! it through the [`SceneGraphSource`]/[`TimelineSource`] seams so that the
//! node editor, clipboard ingestion, and persistent stores named as external
//! collaborators in the specification never need to depend on render
//! internals.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub type NodeId = String;
pub type AssetId = String;
pub type LayerId = String;

/// One node of the scene graph. A closed set by design (§3): the editor may
/// add more operation kinds over time, but every kind the render core has to
/// evaluate is named here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SceneNode {
    Source(SourceNode),
    Operation(OperationNode),
    Merge(MergeNode),
}

impl SceneNode {
    pub fn id(&self) -> &str {
        match self {
            SceneNode::Source(n) => &n.id,
            SceneNode::Operation(n) => &n.id,
            SceneNode::Merge(n) => &n.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceNode {
    pub id: NodeId,
    pub layer_id: LayerId,
    pub transform: Transform,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OperationKind {
    #[serde(rename = "blur")]
    Blur,
    #[serde(rename = "color_correct")]
    ColorCorrect,
    #[serde(rename = "transform")]
    Transform,
}

impl OperationKind {
    /// The effect-registry name this operation kind dispatches to.
    pub fn effect_name(self) -> &'static str {
        match self {
            OperationKind::Blur => "gaussianBlur",
            OperationKind::ColorCorrect => "colorAdjust",
            OperationKind::Transform => "transform",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationNode {
    pub id: NodeId,
    pub op: OperationKind,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    Over,
    Under,
    Add,
    Subtract,
    Screen,
    Overlay,
}

impl BlendMode {
    /// Integer encoding used by the merge shader's `u_mode` uniform (§4.6).
    pub fn as_index(self) -> i32 {
        match self {
            BlendMode::Over => 0,
            BlendMode::Under => 1,
            BlendMode::Add => 2,
            BlendMode::Subtract => 3,
            BlendMode::Screen => 4,
            BlendMode::Overlay => 5,
        }
    }

    pub fn from_index(i: i32) -> BlendMode {
        match i {
            1 => BlendMode::Under,
            2 => BlendMode::Add,
            3 => BlendMode::Subtract,
            4 => BlendMode::Screen,
            5 => BlendMode::Overlay,
            _ => BlendMode::Over,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeNode {
    pub id: NodeId,
    pub bg: Option<NodeId>,
    pub fg: Option<NodeId>,
    #[serde(default)]
    pub mode: BlendModeOrIndex,
    #[serde(default = "default_opacity")]
    pub fg_opacity: f32,
    pub fg_size: Option<(u32, u32)>,
}

fn default_opacity() -> f32 {
    1.0
}

/// The DSL accepts either the named blend mode or its raw integer encoding,
/// matching how node parameters travel as loosely-typed JSON from the editor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlendModeOrIndex {
    Named(BlendMode),
    Index(i32),
}

impl Default for BlendModeOrIndex {
    fn default() -> Self {
        BlendModeOrIndex::Named(BlendMode::Over)
    }
}

impl BlendModeOrIndex {
    pub fn resolve(self) -> BlendMode {
        match self {
            BlendModeOrIndex::Named(m) => m,
            BlendModeOrIndex::Index(i) => BlendMode::from_index(i),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translate: (f32, f32),
    pub scale: (f32, f32),
    pub anchor: (f32, f32),
    pub rotation_radians: f32,
    pub opacity: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Transform {
            translate: (0.0, 0.0),
            scale: (1.0, 1.0),
            anchor: (0.0, 0.0),
            rotation_radians: 0.0,
            opacity: 1.0,
        }
    }
}

/// A directed edge; `input_slot` names a port on `to` (`"bg"`/`"fg"` for
/// merges, absent for single-input operations).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(default)]
    pub input_slot: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneGraph {
    pub nodes: HashMap<NodeId, SceneNode>,
    pub connections: Vec<Connection>,
}

impl SceneGraph {
    pub fn incoming(&self, node_id: &str) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.to == node_id)
    }

    pub fn incoming_on_slot<'a>(&'a self, node_id: &str, slot: &'a str) -> Option<&'a Connection> {
        self.connections
            .iter()
            .find(|c| c.to == node_id && c.input_slot.as_deref() == Some(slot))
    }

    /// The single incoming edge for a node with exactly one input (Source has
    /// none; Operation has at most one; see §3 invariants).
    pub fn single_incoming(&self, node_id: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.to == node_id)
    }
}

/// A time-bound reference to an asset (§3). Owned by the editor; the core
/// consumes a read-only view through [`SceneGraphSource`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub asset_id: AssetId,
    pub time_range: TimeRange,
    pub transform: Transform,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeRange {
    pub in_frame: u64,
    pub out_frame: u64,
    pub source_offset: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Asset {
    Video(VideoAsset),
    Image(ImageAsset),
    ImageSequence(ImageSequenceAsset),
}

impl Asset {
    pub fn frame_count(&self) -> u64 {
        match self {
            Asset::Video(v) => v.frame_count,
            Asset::Image(_) => 1,
            Asset::ImageSequence(s) => s.frame_count,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Asset::Video(v) => (v.width, v.height),
            Asset::Image(i) => (i.width, i.height),
            Asset::ImageSequence(s) => (s.width, s.height),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoAsset {
    pub id: AssetId,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
    pub mime: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAsset {
    pub id: AssetId,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSequenceAsset {
    pub id: AssetId,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
}

/// Read-only view over the editor's scene graph (§6). A host implements this
/// against its real editor state; tests and the headless demo implement it
/// against a plain in-memory graph.
pub trait SceneGraphSource {
    fn scene_graph(&self) -> &SceneGraph;
    fn layer(&self, id: &str) -> Option<&Layer>;
    fn asset(&self, id: &str) -> Option<&Asset>;
}

/// Read-only timeline clock (§6).
pub trait TimelineSource {
    fn current_frame(&self) -> u64;
    fn frame_range(&self) -> (u64, u64);
}

/// Resolved upstream chain for one node renderer (§4.8).
#[derive(Debug, Clone, Default)]
pub struct UpstreamChain {
    pub source_node: Option<NodeId>,
    pub composite_source_node: Option<NodeId>,
    pub operation_nodes: Vec<NodeId>,
    pub is_complete: bool,
}

/// Walk the graph backward from `target`, collecting operation nodes in
/// forward (source-to-sink) order and stopping at the first Source or Merge.
/// Mirrors the teacher's `graph::upstream_reachable` walk, specialized to
/// stop at a render boundary rather than collecting the full ancestor set.
pub fn resolve_upstream_chain(graph: &SceneGraph, target: &str) -> UpstreamChain {
    let mut reversed_ops: Vec<NodeId> = Vec::new();
    let mut current = target.to_string();

    loop {
        let Some(node) = graph.nodes.get(&current) else {
            return UpstreamChain {
                operation_nodes: reversed_ops.into_iter().rev().collect(),
                is_complete: false,
                ..Default::default()
            };
        };

        match node {
            SceneNode::Source(_) => {
                return UpstreamChain {
                    source_node: Some(current.clone()),
                    operation_nodes: reversed_ops.into_iter().rev().collect(),
                    is_complete: true,
                    ..Default::default()
                };
            }
            SceneNode::Merge(_) => {
                return UpstreamChain {
                    composite_source_node: Some(current.clone()),
                    operation_nodes: reversed_ops.into_iter().rev().collect(),
                    is_complete: true,
                    ..Default::default()
                };
            }
            SceneNode::Operation(_) => {
                reversed_ops.push(current.clone());
                let Some(conn) = graph.single_incoming(&current) else {
                    return UpstreamChain {
                        operation_nodes: reversed_ops.into_iter().rev().collect(),
                        is_complete: false,
                        ..Default::default()
                    };
                };
                current = conn.from.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(id: &str) -> SceneNode {
        SceneNode::Operation(OperationNode {
            id: id.to_string(),
            op: OperationKind::Blur,
            params: HashMap::new(),
            enabled: true,
        })
    }

    #[test]
    fn resolves_chain_back_to_source() {
        let mut nodes = HashMap::new();
        nodes.insert(
            "src".to_string(),
            SceneNode::Source(SourceNode {
                id: "src".into(),
                layer_id: "layer1".into(),
                transform: Transform::default(),
            }),
        );
        nodes.insert("blur1".to_string(), op("blur1"));
        nodes.insert("cc1".to_string(), op("cc1"));
        let graph = SceneGraph {
            nodes,
            connections: vec![
                Connection {
                    from: "src".into(),
                    to: "blur1".into(),
                    input_slot: None,
                },
                Connection {
                    from: "blur1".into(),
                    to: "cc1".into(),
                    input_slot: None,
                },
            ],
        };

        let chain = resolve_upstream_chain(&graph, "cc1");
        assert!(chain.is_complete);
        assert_eq!(chain.source_node.as_deref(), Some("src"));
        assert_eq!(chain.operation_nodes, vec!["blur1".to_string(), "cc1".to_string()]);
    }

    #[test]
    fn incomplete_when_edge_missing() {
        let mut nodes = HashMap::new();
        nodes.insert("cc1".to_string(), op("cc1"));
        let graph = SceneGraph {
            nodes,
            connections: vec![],
        };
        let chain = resolve_upstream_chain(&graph, "cc1");
        assert!(!chain.is_complete);
    }
}
