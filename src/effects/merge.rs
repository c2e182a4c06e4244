//! Merge (composite) effect (§4.6): two inputs, six blend modes, foreground
//! centered on background and clipped to its declared size.

use std::collections::HashMap;

use super::{sorted_hash, Effect, EffectDefinition, ParamType, Parameter, ParamValue, VERTEX_SHADER};
use crate::error::{CoreError, CoreResult};
use crate::gpu::{pack_uniform_layout, GpuContext, ShaderProgram, Texture, UniformKind, UniformValue};
use crate::scene::BlendMode;

const FRAGMENT_SHADER: &str = r#"
struct Uniforms {
    u_resolution: vec4<f32>,
    u_fg_size: vec4<f32>,
    u_mode: vec4<f32>,
    u_opacity: vec4<f32>,
};
@group(0) @binding(0) var<uniform> u: Uniforms;
@group(0) @binding(1) var u_texture: texture_2d<f32>;
@group(0) @binding(2) var u_sampler: sampler;
@group(0) @binding(3) var u_texture1: texture_2d<f32>;
@group(0) @binding(4) var u_sampler1: sampler;

fn overlay_channel(bg: f32, fg: f32) -> f32 {
    if (bg < 0.5) {
        return 2.0 * bg * fg;
    }
    return 1.0 - 2.0 * (1.0 - bg) * (1.0 - fg);
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    let bg = textureSample(u_texture, u_sampler, in.tex_coord);

    let bg_px = in.tex_coord * u.u_resolution.xy;
    let fg_origin = (u.u_resolution.xy - u.u_fg_size.xy) * 0.5;
    let fg_px = bg_px - fg_origin;
    let fg_tex_coord = fg_px / u.u_fg_size.xy;

    var fg = vec4<f32>(0.0);
    let in_bounds = fg_px.x >= 0.0 && fg_px.y >= 0.0 && fg_px.x < u.u_fg_size.x && fg_px.y < u.u_fg_size.y;
    if (in_bounds) {
        fg = textureSample(u_texture1, u_sampler1, fg_tex_coord);
    }
    fg.a = fg.a * u.u_opacity.x;

    let mode = i32(u.u_mode.x);
    var rgb = vec3<f32>(0.0);
    var alpha = 0.0;

    if (mode == 1) {
        // under
        rgb = bg.rgb * bg.a + fg.rgb * (1.0 - bg.a);
        alpha = bg.a + fg.a * (1.0 - bg.a);
    } else if (mode == 2) {
        // add
        rgb = min(bg.rgb + fg.rgb * fg.a, vec3<f32>(1.0));
        alpha = max(bg.a, fg.a);
    } else if (mode == 3) {
        // subtract
        rgb = max(bg.rgb - fg.rgb * fg.a, vec3<f32>(0.0));
        alpha = bg.a;
    } else if (mode == 4) {
        // screen
        rgb = mix(bg.rgb, 1.0 - (1.0 - bg.rgb) * (1.0 - fg.rgb), fg.a);
        alpha = max(bg.a, fg.a);
    } else if (mode == 5) {
        // overlay
        let blended = vec3<f32>(
            overlay_channel(bg.r, fg.r),
            overlay_channel(bg.g, fg.g),
            overlay_channel(bg.b, fg.b),
        );
        rgb = mix(bg.rgb, blended, fg.a);
        alpha = max(bg.a, fg.a);
    } else {
        // over (mode == 0, and the fallback for any unknown encoding)
        rgb = fg.rgb * fg.a + bg.rgb * (1.0 - fg.a);
        alpha = fg.a + bg.a * (1.0 - fg.a);
    }

    return vec4<f32>(rgb, alpha);
}
"#;

pub fn definition() -> EffectDefinition {
    EffectDefinition {
        name: "merge",
        display_name: "Merge",
        category: "composite",
        input_count: 2,
        parameters: vec![
            Parameter {
                name: "mode".to_string(),
                kind: ParamType::Enum,
                default: ParamValue::Enum("over".to_string()),
                min: None,
                max: None,
                step: None,
                options: Some(vec![
                    "over".into(),
                    "under".into(),
                    "add".into(),
                    "subtract".into(),
                    "screen".into(),
                    "overlay".into(),
                ]),
            },
            Parameter::new("opacity", ParamType::Float, ParamValue::Float(1.0), 0.0, 1.0),
        ],
        fragment_shader: FRAGMENT_SHADER,
        vertex_shader: Some(VERTEX_SHADER),
    }
}

fn mode_from_param(value: Option<&ParamValue>) -> BlendMode {
    match value {
        Some(ParamValue::Enum(name)) => match name.as_str() {
            "under" => BlendMode::Under,
            "add" => BlendMode::Add,
            "subtract" => BlendMode::Subtract,
            "screen" => BlendMode::Screen,
            "overlay" => BlendMode::Overlay,
            _ => BlendMode::Over,
        },
        Some(ParamValue::Int(i)) => BlendMode::from_index(*i),
        _ => BlendMode::Over,
    }
}

pub struct MergeEffect {
    definition: EffectDefinition,
    params: HashMap<String, ParamValue>,
    program: Option<ShaderProgram>,
    fg_size: (f32, f32),
}

impl MergeEffect {
    pub fn new() -> Self {
        let definition = definition();
        let mut params = HashMap::new();
        for p in &definition.parameters {
            params.insert(p.name.clone(), p.default.clone());
        }
        MergeEffect {
            definition,
            params,
            program: None,
            fg_size: (0.0, 0.0),
        }
    }

    /// The declared foreground size (`u_fgSize`, §4.6), set by the caller
    /// from the scene graph's `fg_size` before `apply`.
    pub fn set_fg_size(&mut self, width: f32, height: f32) {
        self.fg_size = (width, height);
    }
}

impl Default for MergeEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for MergeEffect {
    fn definition(&self) -> &EffectDefinition {
        &self.definition
    }

    fn compile(&mut self, ctx: &dyn GpuContext) -> CoreResult<()> {
        if self.program.is_some() {
            return Ok(());
        }
        let mut layout = pack_uniform_layout(&[
            ("u_resolution", UniformKind::Vec2),
            ("u_fg_size", UniformKind::Vec2),
            ("u_mode", UniformKind::Int),
            ("u_opacity", UniformKind::Float),
        ]);
        layout.texture_count = 2;
        self.program = Some(ctx.compile_shader(VERTEX_SHADER, FRAGMENT_SHADER, layout)?);
        Ok(())
    }

    fn set_parameters(&mut self, params: HashMap<String, ParamValue>) {
        self.params.extend(params);
    }

    fn parameter_hash(&self) -> String {
        sorted_hash("merge", &self.params)
    }

    fn apply(&mut self, ctx: &dyn GpuContext, inputs: &[Texture], output: &Texture) -> CoreResult<()> {
        let program = self
            .program
            .clone()
            .ok_or_else(|| CoreError::NotCompiled("merge".into()))?;
        if inputs.len() < 2 {
            return Err(CoreError::InsufficientInputs {
                effect: "merge".into(),
                required: 2,
                got: inputs.len(),
            });
        }
        let bg = &inputs[0];
        let fg = &inputs[1];

        let fg_size = if self.fg_size == (0.0, 0.0) {
            (fg.width as f32, fg.height as f32)
        } else {
            self.fg_size
        };

        let mode = mode_from_param(self.params.get("mode"));
        let opacity = self.params.get("opacity").map(|v| v.as_f32()).unwrap_or(1.0);

        ctx.set_render_target(Some(output))?;
        ctx.use_shader(&program);
        ctx.set_uniform(
            "u_resolution",
            UniformValue::Vec2([bg.width as f32, bg.height as f32]),
        );
        ctx.set_uniform("u_fg_size", UniformValue::Vec2([fg_size.0, fg_size.1]));
        ctx.set_uniform("u_mode", UniformValue::Int(mode.as_index()));
        ctx.set_uniform("u_opacity", UniformValue::Float(opacity));
        ctx.bind_texture(bg, 0, "u_texture");
        ctx.bind_texture(fg, 1, "u_texture1");
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
    fn unknown_mode_index_falls_back_to_over() {
        assert_eq!(BlendMode::from_index(99), BlendMode::Over);
        assert_eq!(mode_from_param(Some(&ParamValue::Int(99))), BlendMode::Over);
    }

    #[test]
    fn named_mode_round_trips_through_index() {
        for mode in [
            BlendMode::Over,
            BlendMode::Under,
            BlendMode::Add,
            BlendMode::Subtract,
            BlendMode::Screen,
            BlendMode::Overlay,
        ] {
            assert_eq!(BlendMode::from_index(mode.as_index()), mode);
        }
    }
}
