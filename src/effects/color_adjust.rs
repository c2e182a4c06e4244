//! Color Adjust effect (§4.6): exposure, brightness, contrast, saturation,
//! applied in that fixed order.

use std::collections::HashMap;

use super::{sorted_hash, Effect, EffectDefinition, ParamType, Parameter, ParamValue, VERTEX_SHADER};
use crate::error::{CoreError, CoreResult};
use crate::gpu::{pack_uniform_layout, GpuContext, ShaderProgram, Texture, UniformKind, UniformValue};

const FRAGMENT_SHADER: &str = r#"
struct Uniforms {
    u_resolution: vec4<f32>,
    u_exposure: vec4<f32>,
    u_brightness: vec4<f32>,
    u_contrast: vec4<f32>,
    u_saturation: vec4<f32>,
};
@group(0) @binding(0) var<uniform> u: Uniforms;
@group(0) @binding(1) var u_texture: texture_2d<f32>;
@group(0) @binding(2) var u_sampler: sampler;

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    let sample = textureSample(u_texture, u_sampler, in.tex_coord);
    var rgb = sample.rgb;

    rgb = rgb * pow(2.0, u.u_exposure.x);
    rgb = rgb + vec3<f32>(u.u_brightness.x);
    rgb = (rgb - vec3<f32>(0.5)) * u.u_contrast.x + vec3<f32>(0.5);

    let luma = dot(rgb, vec3<f32>(0.299, 0.587, 0.114));
    rgb = mix(vec3<f32>(luma), rgb, u.u_saturation.x);

    rgb = clamp(rgb, vec3<f32>(0.0), vec3<f32>(1.0));
    return vec4<f32>(rgb, sample.a);
}
"#;

pub fn definition() -> EffectDefinition {
    EffectDefinition {
        name: "colorAdjust",
        display_name: "Color Adjust",
        category: "color",
        input_count: 1,
        parameters: vec![
            Parameter::new("brightness", ParamType::Float, ParamValue::Float(0.0), -1.0, 1.0),
            Parameter::new("contrast", ParamType::Float, ParamValue::Float(1.0), 0.0, 2.0),
            Parameter::new("saturation", ParamType::Float, ParamValue::Float(1.0), 0.0, 2.0),
            Parameter::new("exposure", ParamType::Float, ParamValue::Float(0.0), -2.0, 2.0),
        ],
        fragment_shader: FRAGMENT_SHADER,
        vertex_shader: Some(VERTEX_SHADER),
    }
}

pub struct ColorAdjustEffect {
    definition: EffectDefinition,
    params: HashMap<String, ParamValue>,
    program: Option<ShaderProgram>,
}

impl ColorAdjustEffect {
    pub fn new() -> Self {
        let definition = definition();
        let mut params = HashMap::new();
        for p in &definition.parameters {
            params.insert(p.name.clone(), p.default.clone());
        }
        ColorAdjustEffect {
            definition,
            params,
            program: None,
        }
    }

    fn get(&self, name: &str, fallback: f32) -> f32 {
        self.params.get(name).map(|v| v.as_f32()).unwrap_or(fallback)
    }
}

impl Default for ColorAdjustEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for ColorAdjustEffect {
    fn definition(&self) -> &EffectDefinition {
        &self.definition
    }

    fn compile(&mut self, ctx: &dyn GpuContext) -> CoreResult<()> {
        if self.program.is_some() {
            return Ok(());
        }
        let layout = pack_uniform_layout(&[
            ("u_resolution", UniformKind::Vec2),
            ("u_exposure", UniformKind::Float),
            ("u_brightness", UniformKind::Float),
            ("u_contrast", UniformKind::Float),
            ("u_saturation", UniformKind::Float),
        ]);
        let mut layout = layout;
        layout.texture_count = 1;
        self.program = Some(ctx.compile_shader(VERTEX_SHADER, FRAGMENT_SHADER, layout)?);
        Ok(())
    }

    fn set_parameters(&mut self, params: HashMap<String, ParamValue>) {
        self.params.extend(params);
    }

    fn parameter_hash(&self) -> String {
        sorted_hash("colorAdjust", &self.params)
    }

    fn apply(&mut self, ctx: &dyn GpuContext, inputs: &[Texture], output: &Texture) -> CoreResult<()> {
        let program = self
            .program
            .clone()
            .ok_or_else(|| CoreError::NotCompiled("colorAdjust".into()))?;
        if inputs.len() < 1 {
            return Err(CoreError::InsufficientInputs {
                effect: "colorAdjust".into(),
                required: 1,
                got: inputs.len(),
            });
        }

        ctx.set_render_target(Some(output))?;
        ctx.use_shader(&program);
        ctx.set_uniform(
            "u_resolution",
            UniformValue::Vec2([output.width as f32, output.height as f32]),
        );
        ctx.set_uniform("u_exposure", UniformValue::Float(self.get("exposure", 0.0)));
        ctx.set_uniform("u_brightness", UniformValue::Float(self.get("brightness", 0.0)));
        ctx.set_uniform("u_contrast", UniformValue::Float(self.get("contrast", 1.0)));
        ctx.set_uniform("u_saturation", UniformValue::Float(self.get("saturation", 1.0)));
        ctx.bind_texture(&inputs[0], 0, "u_texture");
        ctx.clear(0.0, 0.0, 0.0, 0.0);
        ctx.draw_fullscreen_quad()?;
        ctx.set_render_target(None)?;
        Ok(())
    }

    fn dispose(&mut self, ctx: &dyn GpuContext) {
        if let Some(program) = self.program.take() {
            ctx.delete_shader(program);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_parameters_match_spec_defaults() {
        let effect = ColorAdjustEffect::new();
        assert_eq!(effect.get("brightness", -99.0), 0.0);
        assert_eq!(effect.get("contrast", -99.0), 1.0);
        assert_eq!(effect.get("saturation", -99.0), 1.0);
        assert_eq!(effect.get("exposure", -99.0), 0.0);
    }

    #[test]
    fn parameter_hash_is_order_independent() {
        let mut a = ColorAdjustEffect::new();
        let mut b = ColorAdjustEffect::new();
        let mut pa = HashMap::new();
        pa.insert("brightness".to_string(), ParamValue::Float(0.2));
        pa.insert("contrast".to_string(), ParamValue::Float(1.1));
        a.set_parameters(pa);

        let mut pb = HashMap::new();
        pb.insert("contrast".to_string(), ParamValue::Float(1.1));
        pb.insert("brightness".to_string(), ParamValue::Float(0.2));
        b.set_parameters(pb);

        assert_eq!(a.parameter_hash(), b.parameter_hash());
    }
}
