//! Media decoder (C2, §4.2).
//!
//! Two stages, matching the spec exactly: demux produces an ordered chunk
//! stream plus a decoder configuration, decode turns chunks into raw frames.
//! The crate ships a `FixtureContainerDecoder` whose "container" is the
//! in-process fixture format used by this crate's own tests
//! (pre-decoded RGBA8 frames, one chunk per frame) — real container/codec
//! support is a host concern behind the [`MediaDecoder`] trait, the same way
//! `FrameProvider` is left to the host in the corpus's video-editor example.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;

use crate::decoded_image::DecodedImage;
use crate::error::{CoreError, CoreResult};
use crate::frame_store::{frame_path, FrameExt, FrameStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    RawRgba8,
}

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub codec: Codec,
    pub coded_width: u32,
    pub coded_height: u32,
    pub codec_description: String,
    pub frame_rate: f64,
}

#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub index: u64,
    pub timestamp_us: u64,
    /// Already-raw RGBA8 bytes for `Codec::RawRgba8`; a real codec would
    /// store compressed bitstream bytes here instead.
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RawFrame {
    pub image: DecodedImage,
    pub timestamp_us: u64,
    pub index: u64,
}

#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub width: u32,
    pub height: u32,
    pub duration_us: u64,
    pub frame_count: u64,
    pub frame_rate: f64,
}

#[derive(Debug, Clone)]
pub struct SourceBlob {
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Caps peak memory during the concurrent encode/save stage. Default 4
    /// per §4.2.
    pub max_concurrency: usize,
    pub format: FrameExt,
    /// Ignored for `png` per §4.2.
    pub quality: u8,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            max_concurrency: 4,
            format: FrameExt::Png,
            quality: 90,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractedTrack {
    pub track_info: TrackInfo,
    /// Sorted by source index, even though the encode queue may complete
    /// out of order (§4.2).
    pub frames: Vec<ExtractedFramePaths>,
}

#[derive(Debug, Clone)]
pub struct ExtractedFramePaths {
    pub index: u64,
    pub path: String,
}

pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, current: u64, total: u64);
}

impl<F: Fn(u64, u64) + Send + Sync> ProgressSink for F {
    fn on_progress(&self, current: u64, total: u64) {
        self(current, total)
    }
}

/// Demux + decode contract (§4.2).
pub trait MediaDecoder {
    fn demux(&self, blob: &SourceBlob) -> CoreResult<(DecoderConfig, Vec<EncodedChunk>)>;

    fn decode_chunk(&self, config: &DecoderConfig, chunk: &EncodedChunk) -> CoreResult<RawFrame>;
}

/// Decodes the crate's own fixture container: a `SourceBlob` whose bytes are
/// `width:u32 | height:u32 | frame_count:u32 | frame_rate_bits:f64 |
/// (rgba bytes)*` little-endian, one "chunk" per frame, already raw RGBA8.
/// Stands in for demux/decode of a real encoded container.
pub struct FixtureContainerDecoder;

const HEADER_LEN: usize = 4 + 4 + 4 + 8;

impl MediaDecoder for FixtureContainerDecoder {
    fn demux(&self, blob: &SourceBlob) -> CoreResult<(DecoderConfig, Vec<EncodedChunk>)> {
        if blob.bytes.len() < HEADER_LEN {
            return Err(CoreError::UnsupportedContainer(
                "fixture blob shorter than header".into(),
            ));
        }
        let width = u32::from_le_bytes(blob.bytes[0..4].try_into().unwrap());
        let height = u32::from_le_bytes(blob.bytes[4..8].try_into().unwrap());
        let frame_count = u32::from_le_bytes(blob.bytes[8..12].try_into().unwrap()) as u64;
        let frame_rate = f64::from_le_bytes(blob.bytes[12..20].try_into().unwrap());

        let frame_bytes = (width as usize) * (height as usize) * 4;
        let expected_len = HEADER_LEN + frame_bytes * frame_count as usize;
        if blob.bytes.len() != expected_len {
            return Err(CoreError::DecodeError(format!(
                "fixture blob length mismatch: expected {expected_len}, got {}",
                blob.bytes.len()
            )));
        }

        let config = DecoderConfig {
            codec: Codec::RawRgba8,
            coded_width: width,
            coded_height: height,
            codec_description: "fixture/raw-rgba8".to_string(),
            frame_rate,
        };

        let mut chunks = Vec::with_capacity(frame_count as usize);
        for i in 0..frame_count {
            let start = HEADER_LEN + i as usize * frame_bytes;
            let payload = blob.bytes[start..start + frame_bytes].to_vec();
            let timestamp_us = if frame_rate > 0.0 {
                ((i as f64) * 1_000_000.0 / frame_rate) as u64
            } else {
                0
            };
            chunks.push(EncodedChunk {
                index: i,
                timestamp_us,
                payload,
            });
        }
        Ok((config, chunks))
    }

    fn decode_chunk(&self, config: &DecoderConfig, chunk: &EncodedChunk) -> CoreResult<RawFrame> {
        let expected = config.coded_width as usize * config.coded_height as usize * 4;
        if chunk.payload.len() != expected {
            return Err(CoreError::DecodeError(format!(
                "chunk {} payload length {} != expected {expected}",
                chunk.index,
                chunk.payload.len()
            )));
        }
        Ok(RawFrame {
            image: DecodedImage::new(config.coded_width, config.coded_height, chunk.payload.clone()),
            timestamp_us: chunk.timestamp_us,
            index: chunk.index,
        })
    }
}

/// Decodes a blob previously persisted by `extract` (or any `png`/`jpeg`/
/// `webp` bytes) back into a [`DecodedImage`], for the Node Renderer's frame
/// cache miss path (§4.8 step 1).
pub fn decode_stored_bytes(bytes: &[u8]) -> CoreResult<DecodedImage> {
    let dynamic = image::load_from_memory(bytes).map_err(|e| CoreError::DecodeError(e.to_string()))?;
    Ok(DecodedImage::from_dynamic_image(&dynamic))
}

fn encode_frame(image: &DecodedImage, format: FrameExt, quality: u8) -> CoreResult<Vec<u8>> {
    let buf = image::RgbaImage::from_raw(image.width, image.height, image.rgba.to_vec())
        .ok_or_else(|| CoreError::DecodeError("raw buffer does not match dimensions".into()))?;
    let dynamic = image::DynamicImage::ImageRgba8(buf);

    let mut out = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut out);
    match format {
        FrameExt::Png => dynamic
            .write_to(&mut cursor, image::ImageFormat::Png)
            .map_err(|e| CoreError::DecodeError(e.to_string()))?,
        FrameExt::Jpeg => {
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
            dynamic
                .write_with_encoder(encoder)
                .map_err(|e| CoreError::DecodeError(e.to_string()))?;
        }
        FrameExt::Webp => dynamic
            .write_to(&mut cursor, image::ImageFormat::WebP)
            .map_err(|e| CoreError::DecodeError(e.to_string()))?,
    }
    Ok(out)
}

/// Run the full extract pipeline (§4.2): demux, decode every chunk, encode
/// and persist each frame through `store`, bounded by
/// `options.max_concurrency`, reporting `(current, total)` progress after
/// each successful persistence, closing every raw frame resource on the
/// exact path (success or failure) where it is handled.
pub async fn extract<D: MediaDecoder + Sync, S: FrameStore>(
    decoder: &D,
    store: &S,
    source_id: &str,
    blob: &SourceBlob,
    options: ExtractOptions,
    progress: Option<Arc<dyn ProgressSink>>,
) -> CoreResult<ExtractedTrack> {
    let (config, chunks) = decoder.demux(blob)?;
    let total = chunks.len() as u64;

    let track_info = TrackInfo {
        width: config.coded_width,
        height: config.coded_height,
        duration_us: chunks.last().map(|c| c.timestamp_us).unwrap_or(0),
        frame_count: total,
        frame_rate: config.frame_rate,
    };

    let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
    let completed = Arc::new(std::sync::atomic::AtomicU64::new(0));

    let results: Vec<CoreResult<ExtractedFramePaths>> = stream::iter(chunks.into_iter())
        .map(|chunk| {
            let semaphore = semaphore.clone();
            let progress = progress.clone();
            let completed = completed.clone();
            let config = config.clone();
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("semaphore never closed during extract");

                // The raw frame is closed (dropped) on whichever of these two
                // paths we take, success or failure — it never outlives this
                // block.
                let raw_frame = decoder.decode_chunk(&config, &chunk)?;
                let encoded = encode_frame(&raw_frame.image, options.format, options.quality);
                drop(raw_frame);

                let encoded = encoded?;
                let path = frame_path(source_id, chunk.index, options.format);
                store.put(&path, encoded)?;

                let done = completed.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                if let Some(sink) = &progress {
                    sink.on_progress(done, total);
                }

                Ok(ExtractedFramePaths {
                    index: chunk.index,
                    path,
                })
            }
        })
        .buffer_unordered(options.max_concurrency.max(1))
        .collect()
        .await;

    let mut frames = Vec::with_capacity(results.len());
    for r in results {
        frames.push(r?);
    }
    frames.sort_by_key(|f| f.index);

    Ok(ExtractedTrack { track_info, frames })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_store::MemoryFrameStore;

    fn fixture_blob(width: u32, height: u32, frame_count: u32, fps: f64) -> SourceBlob {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes.extend_from_slice(&frame_count.to_le_bytes());
        bytes.extend_from_slice(&fps.to_le_bytes());
        for i in 0..frame_count {
            let shade = (i % 256) as u8;
            bytes.extend(std::iter::repeat([shade, shade, shade, 255]).take((width * height) as usize).flatten());
        }
        SourceBlob { bytes }
    }

    #[tokio::test]
    async fn extract_orders_frames_by_index_and_reports_progress() {
        let decoder = FixtureContainerDecoder;
        let store = MemoryFrameStore::new();
        let blob = fixture_blob(2, 2, 6, 30.0);

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let sink: Arc<dyn ProgressSink> = Arc::new(move |cur: u64, total: u64| {
            seen2.lock().unwrap().push((cur, total));
        });

        let track = extract(
            &decoder,
            &store,
            "cam-1",
            &blob,
            ExtractOptions {
                max_concurrency: 2,
                ..Default::default()
            },
            Some(sink),
        )
        .await
        .unwrap();

        assert_eq!(track.frames.len(), 6);
        let indices: Vec<u64> = track.frames.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(track.track_info.frame_rate, 30.0);

        for f in &track.frames {
            assert!(store.get(&f.path).is_ok());
        }

        let progress = seen.lock().unwrap();
        assert_eq!(progress.len(), 6);
        assert!(progress.iter().all(|(_, total)| *total == 6));
    }

    #[tokio::test]
    async fn demux_rejects_undersized_blob() {
        let decoder = FixtureContainerDecoder;
        let store = MemoryFrameStore::new();
        let blob = SourceBlob { bytes: vec![0, 1, 2] };
        let err = extract(&decoder, &store, "x", &blob, ExtractOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedContainer(_)));
    }
}
