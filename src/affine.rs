//! Static per-layer affine composition (§4.8 step 1: "standard affine
//! composition: translate, rotate, scale about anchor point").
//!
//! Host-side nearest-neighbor resample rather than a GPU pass: the layer
//! transform is applied once per loaded frame, before the image ever touches
//! the GPU pipeline, so there is no compiled-shader state to manage for it.

use crate::decoded_image::DecodedImage;
use crate::scene::Transform;

/// Applies `transform` to `image`, producing a new buffer of the same
/// dimensions. Opacity multiplies the alpha channel; translate/rotate/scale
/// are composed about `anchor` (in pixel space, `(0,0)` at top-left) using an
/// inverse-mapped nearest-neighbor sample so every destination pixel is
/// written exactly once.
pub fn apply_static_transform(image: &DecodedImage, transform: &Transform) -> DecodedImage {
    if is_identity(transform) {
        return image.clone();
    }

    let (width, height) = (image.width, image.height);
    let mut out = vec![0u8; image.rgba.len()];

    let (ax, ay) = transform.anchor;
    let (tx, ty) = transform.translate;
    let (sx, sy) = transform.scale;
    let cos = transform.rotation_radians.cos();
    let sin = transform.rotation_radians.sin();

    for dy in 0..height {
        for dx in 0..width {
            // Forward: p' = R(theta) * S * (p - anchor) + anchor + translate.
            // Inverse-map from destination back to source to avoid holes.
            let px = dx as f32 - ax - tx;
            let py = dy as f32 - ay - ty;

            // Undo rotation.
            let rx = cos * px + sin * py;
            let ry = -sin * px + cos * py;

            // Undo scale.
            let sx_safe = if sx.abs() < 1e-6 { 1e-6 } else { sx };
            let sy_safe = if sy.abs() < 1e-6 { 1e-6 } else { sy };
            let src_x = rx / sx_safe + ax;
            let src_y = ry / sy_safe + ay;

            let dst_idx = (dy as usize * width as usize + dx as usize) * 4;
            if src_x < 0.0 || src_y < 0.0 || src_x >= width as f32 || src_y >= height as f32 {
                out[dst_idx..dst_idx + 4].copy_from_slice(&[0, 0, 0, 0]);
                continue;
            }

            let sx_px = src_x as u32;
            let sy_px = src_y as u32;
            let src_idx = (sy_px as usize * width as usize + sx_px as usize) * 4;
            let pixel = &image.rgba[src_idx..src_idx + 4];
            let alpha = (pixel[3] as f32 * transform.opacity).round().clamp(0.0, 255.0) as u8;
            out[dst_idx] = pixel[0];
            out[dst_idx + 1] = pixel[1];
            out[dst_idx + 2] = pixel[2];
            out[dst_idx + 3] = alpha;
        }
    }

    DecodedImage::new(width, height, out)
}

fn is_identity(t: &Transform) -> bool {
    t.translate == (0.0, 0.0) && t.scale == (1.0, 1.0) && t.rotation_radians == 0.0 && t.opacity == 1.0
}
