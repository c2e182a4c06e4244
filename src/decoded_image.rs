//! Host-side decoded image buffer shared by the frame cache, media decoder,
//! and GPU upload path.

use std::sync::Arc;

/// RGBA8, row-major, unpremultiplied. Cheap to clone: the pixel buffer is
/// reference-counted, matching how the teacher's `AssetStore::get` hands out
/// clones of decoded asset bytes rather than re-reading them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Arc<[u8]>,
}

impl DecodedImage {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        debug_assert_eq!(rgba.len(), width as usize * height as usize * 4);
        DecodedImage {
            width,
            height,
            rgba: Arc::from(rgba),
        }
    }

    pub fn solid(width: u32, height: u32, rgba_pixel: [u8; 4]) -> Self {
        let mut buf = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            buf.extend_from_slice(&rgba_pixel);
        }
        DecodedImage::new(width, height, buf)
    }

    pub fn from_dynamic_image(image: &image::DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        DecodedImage::new(rgba.width(), rgba.height(), rgba.into_raw())
    }

    pub fn byte_len(&self) -> usize {
        self.rgba.len()
    }
}
