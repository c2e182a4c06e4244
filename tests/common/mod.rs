//! Shared scaffolding for the crate-level integration tests: a plain
//! in-memory [`SceneGraphSource`] and helpers to seed encoded frames into a
//! [`MemoryFrameStore`], playing the role the editor/ingestion layers play
//! in production (§1's "external collaborators").

use std::collections::HashMap;

use motion_core::frame_store::{frame_path, FrameExt, FrameStore, MemoryFrameStore};
use motion_core::scene::{
    Asset, ImageAsset, Layer, SceneGraph, SceneGraphSource, TimeRange, Transform,
};

pub struct TestScene {
    pub graph: SceneGraph,
    pub layers: HashMap<String, Layer>,
    pub assets: HashMap<String, Asset>,
}

impl TestScene {
    pub fn empty() -> Self {
        TestScene {
            graph: SceneGraph {
                nodes: HashMap::new(),
                connections: Vec::new(),
            },
            layers: HashMap::new(),
            assets: HashMap::new(),
        }
    }

    /// Registers a single-frame image layer/asset pair so a Source node can
    /// reference `layer_id` with an always-active `time_range`.
    pub fn add_image_layer(&mut self, layer_id: &str, asset_id: &str, width: u32, height: u32, out_frame: u64) {
        self.assets.insert(
            asset_id.to_string(),
            Asset::Image(ImageAsset {
                id: asset_id.to_string(),
                width,
                height,
            }),
        );
        self.layers.insert(
            layer_id.to_string(),
            Layer {
                id: layer_id.to_string(),
                asset_id: asset_id.to_string(),
                time_range: TimeRange {
                    in_frame: 0,
                    out_frame,
                    source_offset: 0,
                },
                transform: Transform::default(),
            },
        );
    }
}

impl SceneGraphSource for TestScene {
    fn scene_graph(&self) -> &SceneGraph {
        &self.graph
    }

    fn layer(&self, id: &str) -> Option<&Layer> {
        self.layers.get(id)
    }

    fn asset(&self, id: &str) -> Option<&Asset> {
        self.assets.get(id)
    }
}

/// Encodes a solid-color frame as PNG and writes it at the frame store path
/// an Image asset's sole frame (index 0) resolves to.
pub fn seed_solid_frame(store: &MemoryFrameStore, asset_id: &str, index: u64, width: u32, height: u32, pixel: [u8; 4]) {
    let buf = image::RgbaImage::from_raw(width, height, vec_from_pixel(width, height, pixel)).expect("valid buffer");
    let dynamic = image::DynamicImage::ImageRgba8(buf);
    let mut bytes = Vec::new();
    dynamic
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("png encode never fails for a valid in-memory buffer");
    store
        .put(&frame_path(asset_id, index, FrameExt::Png), bytes)
        .expect("in-memory store never fails a put");
}

fn vec_from_pixel(width: u32, height: u32, pixel: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(width as usize * height as usize * 4);
    for _ in 0..(width as usize * height as usize) {
        out.extend_from_slice(&pixel);
    }
    out
}
