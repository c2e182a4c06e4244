//! Content-addressed blob store (C1, §4.1).
//!
//! Mirrors the teacher's `AssetStore`: a thread-safe, clone-friendly map
//! guarded by a single mutex. Unlike `AssetStore` (which is keyed by opaque
//! asset id), this store is keyed by hierarchical `/`-separated logical
//! paths, since frame blobs need the deterministic
//! `frames/<id>/frame_NNNNNN.<ext>` addressing scheme described in §4.1/§6.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{CoreError, CoreResult};

/// Image container chosen once per source, per §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameExt {
    Png,
    Webp,
    Jpeg,
}

impl FrameExt {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameExt::Png => "png",
            FrameExt::Webp => "webp",
            FrameExt::Jpeg => "jpeg",
        }
    }
}

/// Sanitize an arbitrary source id into a path-safe segment: keep
/// alphanumerics, `-`, and `_`; everything else becomes `_`.
pub fn sanitize_path_segment(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `frames/<sanitized source id>/frame_<6-digit index>.<ext>` (§4.1).
pub fn frame_path(source_id: &str, index: u64, ext: FrameExt) -> String {
    format!(
        "frames/{}/frame_{:06}.{}",
        sanitize_path_segment(source_id),
        index,
        ext.as_str()
    )
}

/// `sequences/<timestamp>-<sanitized basename>/frame_<6-digit index>.<ext>` (§6).
pub fn sequence_frame_path(timestamp: u64, basename: &str, index: u64, ext: FrameExt) -> String {
    format!(
        "sequences/{}-{}/frame_{:06}.{}",
        timestamp,
        sanitize_path_segment(basename),
        index,
        ext.as_str()
    )
}

/// Durable blob storage, keyed by opaque logical path (§4.1).
pub trait FrameStore: Send + Sync {
    fn put(&self, path: &str, bytes: Vec<u8>) -> CoreResult<()>;
    fn get(&self, path: &str) -> CoreResult<Vec<u8>>;
    fn delete(&self, path: &str) -> CoreResult<()>;
    fn delete_directory(&self, prefix: &str) -> CoreResult<()>;
}

/// In-memory `FrameStore`. The crate ships only this implementation; a host
/// wires a real durable backend (disk, object storage) behind the trait —
/// matching the "external collaborator" posture for persistence in §1.
#[derive(Debug, Clone, Default)]
pub struct MemoryFrameStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryFrameStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameStore for MemoryFrameStore {
    fn put(&self, path: &str, bytes: Vec<u8>) -> CoreResult<()> {
        let mut map = self.inner.lock().expect("frame store mutex poisoned");
        map.insert(path.to_string(), bytes);
        Ok(())
    }

    fn get(&self, path: &str) -> CoreResult<Vec<u8>> {
        let map = self.inner.lock().expect("frame store mutex poisoned");
        map.get(path)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(path.to_string()))
    }

    fn delete(&self, path: &str) -> CoreResult<()> {
        let mut map = self.inner.lock().expect("frame store mutex poisoned");
        map.remove(path);
        Ok(())
    }

    fn delete_directory(&self, prefix: &str) -> CoreResult<()> {
        let prefix_with_slash = if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };
        let mut map = self.inner.lock().expect("frame store mutex poisoned");
        map.retain(|k, _| !k.starts_with(&prefix_with_slash) && k != prefix);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_path_is_six_digit_zero_padded() {
        assert_eq!(frame_path("cam/1", 7, FrameExt::Png), "frames/cam_1/frame_000007.png");
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = MemoryFrameStore::new();
        let err = store.get("frames/x/frame_000000.png").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn delete_is_idempotent() {
        let store = MemoryFrameStore::new();
        store.delete("frames/x/frame_000000.png").unwrap();
        store.delete("frames/x/frame_000000.png").unwrap();
    }

    #[test]
    fn delete_concurrent_with_read_yields_not_found() {
        let store = MemoryFrameStore::new();
        store.put("frames/a/frame_000000.png", vec![1, 2, 3]).unwrap();
        assert!(store.get("frames/a/frame_000000.png").is_ok());
        store.delete("frames/a/frame_000000.png").unwrap();
        assert!(matches!(
            store.get("frames/a/frame_000000.png"),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn delete_directory_removes_prefixed_blobs_only() {
        let store = MemoryFrameStore::new();
        store.put("frames/a/frame_000000.png", vec![0]).unwrap();
        store.put("frames/a/frame_000001.png", vec![0]).unwrap();
        store.put("frames/b/frame_000000.png", vec![0]).unwrap();
        store.delete_directory("frames/a").unwrap();
        assert!(store.get("frames/a/frame_000000.png").is_err());
        assert!(store.get("frames/a/frame_000001.png").is_err());
        assert!(store.get("frames/b/frame_000000.png").is_ok());
    }
}
