//! Node Renderer scenarios (§8 S1-S6): end-to-end `NodeRenderer` behavior
//! against an in-memory scene graph and frame store. Each test backs off
//! early if no `wgpu` backend is available in the CI sandbox, the same way
//! `gpu/headless.rs`'s own unit test does.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use motion_core::frame_store::MemoryFrameStore;
use motion_core::gpu::{GpuInitOptions, HeadlessGpu};
use motion_core::scene::{
    BlendModeOrIndex, Connection, MergeNode, OperationKind, OperationNode, SceneNode, SourceNode,
    Transform,
};
use motion_core::{CompositeBroker, EffectRegistry, NodeRenderer, RgbaCanvas};

use common::TestScene;

fn gpu() -> Option<HeadlessGpu> {
    HeadlessGpu::new(GpuInitOptions::default(), 8, 8).ok()
}

fn renderer(node_id: &str, gpu: HeadlessGpu) -> NodeRenderer<motion_core::gpu::WgpuContext, RgbaCanvas> {
    let HeadlessGpu { context } = gpu;
    NodeRenderer::new(
        node_id,
        context,
        RgbaCanvas::default(),
        CompositeBroker::new(),
        Arc::new(EffectRegistry::with_builtins()),
    )
}

/// S1: a bare Source node with no downstream operations publishes its frame
/// unchanged and is readable from the broker under its own id.
#[test]
fn s1_bare_source_publishes_unchanged_frame() {
    let Some(gpu) = gpu() else { return };

    let mut scene = TestScene::empty();
    scene.add_image_layer("layer1", "asset1", 4, 4, 100);
    scene.graph.nodes.insert(
        "src".to_string(),
        SceneNode::Source(SourceNode {
            id: "src".into(),
            layer_id: "layer1".into(),
            transform: Transform::default(),
        }),
    );

    let store = MemoryFrameStore::new();
    common::seed_solid_frame(&store, "asset1", 0, 4, 4, [200, 100, 50, 255]);

    let mut r = renderer("src", gpu);
    let published = r.render_global_frame(&scene, &store, 0).unwrap();
    assert!(published);
    assert_eq!(r.canvas().width, 4);
    assert_eq!(r.canvas().rgba[0..4], [200, 100, 50, 255]);
}

/// S2: Source -> blur -> colorAdjust chain runs the full pipeline and
/// publishes a result whose dimensions match the source.
#[test]
fn s2_operation_chain_runs_end_to_end() {
    let Some(gpu) = gpu() else { return };

    let mut scene = TestScene::empty();
    scene.add_image_layer("layer1", "asset1", 4, 4, 100);
    scene.graph.nodes.insert(
        "src".to_string(),
        SceneNode::Source(SourceNode {
            id: "src".into(),
            layer_id: "layer1".into(),
            transform: Transform::default(),
        }),
    );
    scene.graph.nodes.insert(
        "blur1".to_string(),
        SceneNode::Operation(OperationNode {
            id: "blur1".into(),
            op: OperationKind::Blur,
            params: HashMap::from([("radius".to_string(), serde_json::json!(4.0))]),
            enabled: true,
        }),
    );
    scene.graph.nodes.insert(
        "cc1".to_string(),
        SceneNode::Operation(OperationNode {
            id: "cc1".into(),
            op: OperationKind::ColorCorrect,
            params: HashMap::from([("brightness".to_string(), serde_json::json!(0.1))]),
            enabled: true,
        }),
    );
    scene.graph.connections = vec![
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
    ];

    let store = MemoryFrameStore::new();
    common::seed_solid_frame(&store, "asset1", 0, 4, 4, [10, 20, 30, 255]);

    let mut r = renderer("cc1", gpu);
    let published = r.render_global_frame(&scene, &store, 0).unwrap();
    assert!(published);
    assert_eq!(r.canvas().width, 4);
    assert_eq!(r.canvas().height, 4);
    assert_eq!(r.stats().nodes_evaluated, 2);
}

/// S3: a global frame outside the layer's time range renders nothing but a
/// blank canvas sized to the asset, and does not publish to the broker.
#[test]
fn s3_inactive_layer_renders_blank_without_publishing() {
    let Some(gpu) = gpu() else { return };

    let mut scene = TestScene::empty();
    scene.add_image_layer("layer1", "asset1", 4, 4, 5); // active only for g in [0, 5)
    scene.graph.nodes.insert(
        "src".to_string(),
        SceneNode::Source(SourceNode {
            id: "src".into(),
            layer_id: "layer1".into(),
            transform: Transform::default(),
        }),
    );

    let store = MemoryFrameStore::new();
    common::seed_solid_frame(&store, "asset1", 0, 4, 4, [9, 9, 9, 255]);

    let mut r = renderer("src", gpu);
    let published = r.render_global_frame(&scene, &store, 10).unwrap();
    assert!(!published);
    assert_eq!(r.canvas().width, 4);
    assert!(r.canvas().rgba.iter().all(|&b| b == 0), "inactive layer renders fully transparent black");
}

/// S4: an incomplete upstream chain (dangling edge) renders nothing and
/// reports it, rather than erroring.
#[test]
fn s4_incomplete_chain_renders_nothing() {
    let Some(gpu) = gpu() else { return };

    let mut scene = TestScene::empty();
    scene.graph.nodes.insert(
        "cc1".to_string(),
        SceneNode::Operation(OperationNode {
            id: "cc1".into(),
            op: OperationKind::ColorCorrect,
            params: HashMap::new(),
            enabled: true,
        }),
    );
    // No incoming connection for "cc1": the chain never bottoms out at a Source.

    let store = MemoryFrameStore::new();
    let mut r = renderer("cc1", gpu);
    let published = r.render_global_frame(&scene, &store, 0).unwrap();
    assert!(!published);
}

/// S5: a Merge with no foreground composites as the background unchanged
/// (a fully transparent foreground contributes nothing under "over").
#[test]
fn s5_merge_over_transparent_foreground_equals_background() {
    let Some(gpu) = gpu() else { return };

    let mut scene = TestScene::empty();
    scene.add_image_layer("bg_layer", "bg_asset", 4, 4, 100);
    scene.graph.nodes.insert(
        "bg_src".to_string(),
        SceneNode::Source(SourceNode {
            id: "bg_src".into(),
            layer_id: "bg_layer".into(),
            transform: Transform::default(),
        }),
    );
    scene.graph.nodes.insert(
        "merge1".to_string(),
        SceneNode::Merge(MergeNode {
            id: "merge1".into(),
            bg: Some("bg_src".into()),
            fg: None,
            mode: BlendModeOrIndex::default(),
            fg_opacity: 1.0,
            fg_size: None,
        }),
    );

    let store = MemoryFrameStore::new();
    common::seed_solid_frame(&store, "bg_asset", 0, 4, 4, [50, 60, 70, 255]);

    let mut r = renderer("merge1", gpu);
    let published = r.render_merge_global_frame(&scene, &store, "merge1", 0).unwrap();
    assert!(published);
    assert_eq!(r.canvas().rgba[0..4], [50, 60, 70, 255]);
}

/// S6: a downstream operation chain can consume a Merge node's broker output
/// as its composite source, once the merge has rendered for that frame.
#[test]
fn s6_downstream_chain_consumes_merge_broker_output() {
    let Some(gpu1) = gpu() else { return };

    let mut scene = TestScene::empty();
    scene.add_image_layer("bg_layer", "bg_asset", 4, 4, 100);
    scene.graph.nodes.insert(
        "bg_src".to_string(),
        SceneNode::Source(SourceNode {
            id: "bg_src".into(),
            layer_id: "bg_layer".into(),
            transform: Transform::default(),
        }),
    );
    scene.graph.nodes.insert(
        "merge1".to_string(),
        SceneNode::Merge(MergeNode {
            id: "merge1".into(),
            bg: Some("bg_src".into()),
            fg: None,
            mode: BlendModeOrIndex::default(),
            fg_opacity: 1.0,
            fg_size: None,
        }),
    );
    scene.graph.nodes.insert(
        "cc1".to_string(),
        SceneNode::Operation(OperationNode {
            id: "cc1".into(),
            op: OperationKind::ColorCorrect,
            params: HashMap::new(),
            enabled: true,
        }),
    );
    scene.graph.connections = vec![Connection {
        from: "merge1".into(),
        to: "cc1".into(),
        input_slot: None,
    }];

    let store = MemoryFrameStore::new();
    common::seed_solid_frame(&store, "bg_asset", 0, 4, 4, [80, 90, 100, 255]);

    let broker = CompositeBroker::new();
    let registry = Arc::new(EffectRegistry::with_builtins());
    let HeadlessGpu { context: merge_ctx } = gpu1;
    let mut merge_renderer =
        NodeRenderer::new("merge1", merge_ctx, RgbaCanvas::default(), broker.clone(), registry.clone());
    assert!(merge_renderer
        .render_merge_global_frame(&scene, &store, "merge1", 0)
        .unwrap());

    // Reusing the merge node's broker entry requires a *second* GPU
    // context, matching "one GpuContext per node renderer" (§5).
    let Some(gpu2) = gpu() else { return };
    let HeadlessGpu { context: cc_ctx } = gpu2;
    let mut cc_renderer = NodeRenderer::new("cc1", cc_ctx, RgbaCanvas::default(), broker, registry);
    let published = cc_renderer.render_global_frame(&scene, &store, 0).unwrap();
    assert!(published);
    assert_eq!(cc_renderer.canvas().rgba[0..4], [80, 90, 100, 255]);
}
