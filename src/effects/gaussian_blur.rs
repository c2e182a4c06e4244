//! Gaussian Blur effect (§4.6): separable two-pass blur with a temporary
//! texture held between passes and re-created only on dimension change.

use std::collections::HashMap;

use super::{sorted_hash, Effect, EffectDefinition, ParamType, Parameter, ParamValue, VERTEX_SHADER};
use crate::error::{CoreError, CoreResult};
use crate::gpu::{pack_uniform_layout, GpuContext, ShaderProgram, Texture, UniformKind, UniformValue};

const FRAGMENT_SHADER: &str = r#"
struct Uniforms {
    u_resolution: vec4<f32>,
    u_texel_size: vec4<f32>,
    u_direction: vec4<f32>,
    u_half: vec4<f32>,
    u_sigma: vec4<f32>,
};
@group(0) @binding(0) var<uniform> u: Uniforms;
@group(0) @binding(1) var u_texture: texture_2d<f32>;
@group(0) @binding(2) var u_sampler: sampler;

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    let half_count = i32(u.u_half.x);
    let sigma = u.u_sigma.x;
    let two_sigma_sq = 2.0 * sigma * sigma;

    var accum = vec4<f32>(0.0);
    var weight_sum = 0.0;
    for (var i = -half_count; i <= half_count; i = i + 1) {
        let fi = f32(i);
        let weight = exp(-(fi * fi) / two_sigma_sq);
        let offset = u.u_direction.xy * u.u_texel_size.xy * fi;
        accum = accum + textureSample(u_texture, u_sampler, in.tex_coord + offset) * weight;
        weight_sum = weight_sum + weight;
    }
    return accum / weight_sum;
}
"#;

pub fn definition() -> EffectDefinition {
    EffectDefinition {
        name: "gaussianBlur",
        display_name: "Gaussian Blur",
        category: "blur",
        input_count: 1,
        parameters: vec![Parameter::new(
            "radius",
            ParamType::Float,
            ParamValue::Float(0.0),
            0.0,
            189.0,
        )],
        fragment_shader: FRAGMENT_SHADER,
        vertex_shader: Some(VERTEX_SHADER),
    }
}

/// §4.6: sigma floor and the per-direction sample-count cap.
const MAX_HALF_SAMPLES: u32 = 63;

fn sigma_for_radius(radius: f32) -> f32 {
    (radius / 3.0).max(1e-3)
}

fn half_samples_for_radius(radius: f32) -> u32 {
    radius.ceil().max(0.0) as u32
}

pub struct GaussianBlurEffect {
    definition: EffectDefinition,
    params: HashMap<String, ParamValue>,
    program: Option<ShaderProgram>,
    /// Held between the horizontal and vertical pass; re-created only when
    /// the input's dimensions or format change (§4.6).
    temp: Option<Texture>,
}

impl GaussianBlurEffect {
    pub fn new() -> Self {
        let definition = definition();
        let mut params = HashMap::new();
        for p in &definition.parameters {
            params.insert(p.name.clone(), p.default.clone());
        }
        GaussianBlurEffect {
            definition,
            params,
            program: None,
            temp: None,
        }
    }

    fn radius(&self) -> f32 {
        self.params.get("radius").map(|v| v.as_f32()).unwrap_or(0.0)
    }

    fn ensure_temp(&mut self, ctx: &dyn GpuContext, input: &Texture) -> CoreResult<Texture> {
        let needs_new = match &self.temp {
            Some(t) => t.width != input.width || t.height != input.height || t.format != input.format,
            None => true,
        };
        if needs_new {
            if let Some(old) = self.temp.take() {
                ctx.dispose_texture(&old);
            }
            self.temp = Some(ctx.create_texture(input.width, input.height, input.format)?);
        }
        Ok(self.temp.clone().expect("just ensured"))
    }

    fn run_pass(
        &self,
        ctx: &dyn GpuContext,
        program: &ShaderProgram,
        input: &Texture,
        output: &Texture,
        direction: [f32; 2],
    ) -> CoreResult<()> {
        let radius = self.radius();
        let half = half_samples_for_radius(radius).min(MAX_HALF_SAMPLES);
        let sigma = sigma_for_radius(radius);

        ctx.set_render_target(Some(output))?;
        ctx.use_shader(program);
        ctx.set_uniform(
            "u_resolution",
            UniformValue::Vec2([output.width as f32, output.height as f32]),
        );
        ctx.set_uniform(
            "u_texel_size",
            UniformValue::Vec2([1.0 / input.width as f32, 1.0 / input.height as f32]),
        );
        ctx.set_uniform("u_direction", UniformValue::Vec2(direction));
        ctx.set_uniform("u_half", UniformValue::Float(half as f32));
        ctx.set_uniform("u_sigma", UniformValue::Float(sigma));
        ctx.bind_texture(input, 0, "u_texture");
        ctx.clear(0.0, 0.0, 0.0, 0.0);
        ctx.draw_fullscreen_quad()?;
        ctx.set_render_target(None)?;
        Ok(())
    }
}

impl Default for GaussianBlurEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for GaussianBlurEffect {
    fn definition(&self) -> &EffectDefinition {
        &self.definition
    }

    fn compile(&mut self, ctx: &dyn GpuContext) -> CoreResult<()> {
        if self.program.is_some() {
            return Ok(());
        }
        let mut layout = pack_uniform_layout(&[
            ("u_resolution", UniformKind::Vec2),
            ("u_texel_size", UniformKind::Vec2),
            ("u_direction", UniformKind::Vec2),
            ("u_half", UniformKind::Float),
            ("u_sigma", UniformKind::Float),
        ]);
        layout.texture_count = 1;
        self.program = Some(ctx.compile_shader(VERTEX_SHADER, FRAGMENT_SHADER, layout)?);
        Ok(())
    }

    fn set_parameters(&mut self, params: HashMap<String, ParamValue>) {
        self.params.extend(params);
    }

    fn parameter_hash(&self) -> String {
        sorted_hash("gaussianBlur", &self.params)
    }

    fn apply(&mut self, ctx: &dyn GpuContext, inputs: &[Texture], output: &Texture) -> CoreResult<()> {
        let program = self
            .program
            .clone()
            .ok_or_else(|| CoreError::NotCompiled("gaussianBlur".into()))?;
        if inputs.is_empty() {
            return Err(CoreError::InsufficientInputs {
                effect: "gaussianBlur".into(),
                required: 1,
                got: 0,
            });
        }
        let input = &inputs[0];

        if self.radius() <= 0.0 {
            return ctx.copy_texture(input, output);
        }

        let temp = self.ensure_temp(ctx, input)?;
        self.run_pass(ctx, &program, input, &temp, [1.0, 0.0])?;
        self.run_pass(ctx, &program, &temp, output, [0.0, 1.0])?;
        Ok(())
    }

    fn dispose(&mut self, ctx: &dyn GpuContext) {
        if let Some(program) = self.program.take() {
            ctx.delete_shader(program);
        }
        if let Some(temp) = self.temp.take() {
            ctx.dispose_texture(&temp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigma_floor_matches_spec() {
        assert!((sigma_for_radius(0.0) - 1e-3).abs() < 1e-9);
        assert!((sigma_for_radius(9.0) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn half_sample_count_is_capped_at_63() {
        assert_eq!(half_samples_for_radius(10.0), 10);
        assert_eq!(half_samples_for_radius(500.0).min(MAX_HALF_SAMPLES), 63);
    }

    #[test]
    fn zero_radius_reports_as_passthrough_eligible() {
        let effect = GaussianBlurEffect::new();
        assert_eq!(effect.radius(), 0.0);
    }

    proptest::proptest! {
        /// Whatever radius a caller passes, the clamped half-sample count
        /// used to build a uniform-sized kernel array never exceeds the
        /// shader's fixed bound, and sigma never collapses to zero.
        #[test]
        fn clamped_half_samples_and_sigma_stay_in_bounds(radius in 0f32..10_000.0) {
            let half = half_samples_for_radius(radius).min(MAX_HALF_SAMPLES);
            prop_assert!(half <= MAX_HALF_SAMPLES);

            let sigma = sigma_for_radius(radius);
            prop_assert!(sigma > 0.0);
        }
    }
}
