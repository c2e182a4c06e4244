//! Composite Output Broker (C9, §4.9).
//!
//! A process-wide `Mutex<HashMap<...>>` registry, wrapped the way the
//! teacher's `AssetStore` wraps its map — the only piece of state in this
//! crate genuinely shared across [`crate::node_renderer::NodeRenderer`]
//! instances, per §5 ("the only cross-renderer shared state").

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::decoded_image::DecodedImage;

pub type NodeId = String;

#[derive(Debug, Clone)]
pub struct CompositeOutputEntry {
    pub bitmap: DecodedImage,
    pub frame_index: u64,
}

/// Shared across every [`crate::node_renderer::NodeRenderer`] that renders
/// into or depends on a composite (Merge) node's output.
#[derive(Default)]
pub struct CompositeBroker {
    entries: Mutex<HashMap<NodeId, CompositeOutputEntry>>,
}

impl CompositeBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(CompositeBroker::default())
    }

    /// Installs a new entry. Per §4.9, a prior entry with a different bitmap
    /// identity is implicitly dropped (closed) here — `DecodedImage`'s
    /// `Arc<[u8]>` backing releases on last reference, matching "close any
    /// prior entry's bitmap whose identity differs from the new one."
    pub fn set_output(&self, node_id: &str, bitmap: DecodedImage, frame_index: u64) {
        let mut entries = self.entries.lock().expect("broker mutex poisoned");
        entries.insert(node_id.to_string(), CompositeOutputEntry { bitmap, frame_index });
    }

    pub fn get_output(&self, node_id: &str) -> Option<CompositeOutputEntry> {
        let entries = self.entries.lock().expect("broker mutex poisoned");
        entries.get(node_id).cloned()
    }

    pub fn has_output_for_frame(&self, node_id: &str, g: u64) -> bool {
        let entries = self.entries.lock().expect("broker mutex poisoned");
        entries.get(node_id).is_some_and(|e| e.frame_index == g)
    }

    pub fn clear_output(&self, node_id: &str) {
        let mut entries = self.entries.lock().expect("broker mutex poisoned");
        entries.remove(node_id);
    }

    pub fn clear_all(&self) {
        let mut entries = self.entries.lock().expect("broker mutex poisoned");
        entries.clear();
    }
}
