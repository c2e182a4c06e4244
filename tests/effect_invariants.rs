//! Property-style invariants for the built-in effects (§8): kernel
//! normalization, identity parameter round-trips, and blend-mode edge cases
//! that must hold regardless of the scene graph wired around them. Each test
//! backs off early if no `wgpu` backend is available.

use std::collections::HashMap;

use motion_core::effects::ParamValue;
use motion_core::gpu::{GpuInitOptions, HeadlessGpu, TextureFormat};
use motion_core::{ColorAdjustEffect, DecodedImage, Effect, GaussianBlurEffect, GpuContext, MergeEffect};

fn gpu() -> Option<HeadlessGpu> {
    HeadlessGpu::new(GpuInitOptions::default(), 8, 8).ok()
}

/// A Gaussian blur applied to a perfectly flat image must reproduce that
/// image exactly: the kernel weights are normalized by construction
/// (`accum / weight_sum`), so a uniform input has nothing to blend toward.
#[test]
fn gaussian_blur_kernel_is_normalized_on_flat_input() {
    let Some(gpu) = gpu() else { return };
    let ctx = &gpu.context;

    let image = DecodedImage::solid(8, 8, [120, 40, 200, 255]);
    let mut effect = GaussianBlurEffect::new();
    effect.compile(ctx).unwrap();
    effect.set_parameters(HashMap::from([("radius".to_string(), ParamValue::Float(12.0))]));

    let input = ctx.upload_image(&image, None).unwrap();
    let output = ctx.create_texture(8, 8, TextureFormat::Rgba8).unwrap();
    effect.apply(ctx, &[input], &output).unwrap();
    let pixels = ctx.read_pixels(&output).unwrap();

    for chunk in pixels.chunks_exact(4) {
        assert!((chunk[0] as i32 - 120).abs() <= 1, "r drifted: {chunk:?}");
        assert!((chunk[1] as i32 - 40).abs() <= 1, "g drifted: {chunk:?}");
        assert!((chunk[2] as i32 - 200).abs() <= 1, "b drifted: {chunk:?}");
    }
}

/// Default color-adjust parameters (brightness 0, contrast 1, saturation 1,
/// exposure 0) are an identity transform.
#[test]
fn color_adjust_default_parameters_are_identity() {
    let Some(gpu) = gpu() else { return };
    let ctx = &gpu.context;

    let image = DecodedImage::solid(4, 4, [64, 128, 200, 255]);
    let mut effect = ColorAdjustEffect::new();
    effect.compile(ctx).unwrap();

    let input = ctx.upload_image(&image, None).unwrap();
    let output = ctx.create_texture(4, 4, TextureFormat::Rgba8).unwrap();
    effect.apply(ctx, &[input], &output).unwrap();
    let pixels = ctx.read_pixels(&output).unwrap();

    for chunk in pixels.chunks_exact(4) {
        assert!((chunk[0] as i32 - 64).abs() <= 1);
        assert!((chunk[1] as i32 - 128).abs() <= 1);
        assert!((chunk[2] as i32 - 200).abs() <= 1);
    }
}

/// Merge in `add` mode with a fully transparent foreground is a no-op on the
/// background, the same identity the `over` mode gives (S5): zero-alpha
/// foreground contributes `fg.rgb * fg.a == 0` under every arithmetic blend.
#[test]
fn merge_add_with_transparent_foreground_is_identity_on_background() {
    let Some(gpu) = gpu() else { return };
    let ctx = &gpu.context;

    let bg = DecodedImage::solid(4, 4, [30, 60, 90, 255]);
    let fg = DecodedImage::solid(4, 4, [255, 255, 255, 0]);

    let mut effect = MergeEffect::new();
    effect.compile(ctx).unwrap();
    effect.set_fg_size(4.0, 4.0);
    effect.set_parameters(HashMap::from([("mode".to_string(), ParamValue::Enum("add".to_string()))]));

    let bg_tex = ctx.upload_image(&bg, None).unwrap();
    let fg_tex = ctx.upload_image(&fg, None).unwrap();
    let output = ctx.create_texture(4, 4, TextureFormat::Rgba8).unwrap();
    effect.apply(ctx, &[bg_tex, fg_tex], &output).unwrap();

    let pixels = ctx.read_pixels(&output).unwrap();
    for chunk in pixels.chunks_exact(4) {
        assert_eq!(chunk[0..3], [30, 60, 90]);
    }
}
