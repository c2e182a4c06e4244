//! Effect registry and concrete effects (C6, §4.6).
//!
//! Every effect compiles its fragment shader against the same fullscreen-quad
//! vertex stage (`VERTEX_SHADER`) and packs its own uniforms via
//! [`crate::gpu::pack_uniform_layout`] — the pattern is the teacher's
//! passthrough-vertex-plus-swappable-fragment shader assembly, generalized
//! from "one assembled shader graph" to "one effect, one fragment stage."

mod color_adjust;
mod gaussian_blur;
mod merge;

pub use color_adjust::ColorAdjustEffect;
pub use gaussian_blur::GaussianBlurEffect;
pub use merge::MergeEffect;

use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};
use crate::gpu::{GpuContext, Texture};

/// Shared vertex stage for every built-in effect: a fullscreen quad in clip
/// space, texcoord passed through unchanged. Concatenated with an effect's
/// fragment source by `GpuContext::compile_shader`.
pub const VERTEX_SHADER: &str = r#"
struct VertexOut {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) tex_coord: vec2<f32>) -> VertexOut {
    var out: VertexOut;
    out.clip_position = vec4<f32>(position, 0.0, 1.0);
    out.tex_coord = tex_coord;
    return out;
}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Float,
    Int,
    Bool,
    Vec2,
    Vec3,
    Vec4,
    Color,
    Angle,
    Enum,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Color([f32; 4]),
    Angle(f32),
    Enum(String),
}

impl ParamValue {
    /// Canonical text form used by `parameter_hash` — stable across runs and
    /// independent of float formatting quirks beyond Rust's own `{:?}`.
    fn canonical(&self) -> String {
        match self {
            ParamValue::Float(v) => format!("f{v:?}"),
            ParamValue::Int(v) => format!("i{v}"),
            ParamValue::Bool(v) => format!("b{v}"),
            ParamValue::Vec2(v) => format!("v2{v:?}"),
            ParamValue::Vec3(v) => format!("v3{v:?}"),
            ParamValue::Vec4(v) => format!("v4{v:?}"),
            ParamValue::Color(v) => format!("c{v:?}"),
            ParamValue::Angle(v) => format!("a{v:?}"),
            ParamValue::Enum(v) => format!("e{v}"),
        }
    }

    fn as_f32(&self) -> f32 {
        match self {
            ParamValue::Float(v) | ParamValue::Angle(v) => *v,
            ParamValue::Int(v) => *v as f32,
            ParamValue::Bool(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamType,
    pub default: ParamValue,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub options: Option<Vec<String>>,
}

impl Parameter {
    fn new(name: &str, kind: ParamType, default: ParamValue, min: f64, max: f64) -> Self {
        Parameter {
            name: name.to_string(),
            kind,
            default,
            min: Some(min),
            max: Some(max),
            step: None,
            options: None,
        }
    }
}

/// Static description of a registered effect (§4.6). Declaring this as data
/// rather than trait methods lets the registry answer `name -> definition`
/// queries without instantiating anything.
#[derive(Debug, Clone)]
pub struct EffectDefinition {
    pub name: &'static str,
    pub display_name: &'static str,
    pub category: &'static str,
    pub input_count: usize,
    pub parameters: Vec<Parameter>,
    pub fragment_shader: &'static str,
    pub vertex_shader: Option<&'static str>,
}

/// An effect instance: a compiled shader for one GPU context plus a
/// parameter map. Instances are owned by whatever caches them per-context
/// (the render pipeline); the registry only hands out definitions and
/// factory closures.
pub trait Effect: Send {
    fn definition(&self) -> &EffectDefinition;

    /// Idempotent: a second call with the same context is a no-op.
    fn compile(&mut self, ctx: &dyn GpuContext) -> CoreResult<()>;

    /// Merges `params` into the current parameter map; unnamed keys are
    /// ignored the same way an unknown uniform name is (§4.4).
    fn set_parameters(&mut self, params: HashMap<String, ParamValue>);

    fn parameter_hash(&self) -> String;

    fn apply(&mut self, ctx: &dyn GpuContext, inputs: &[Texture], output: &Texture) -> CoreResult<()>;

    fn dispose(&mut self, ctx: &dyn GpuContext);
}

fn sorted_hash(definition_name: &str, params: &HashMap<String, ParamValue>) -> String {
    let mut entries: Vec<(&String, &ParamValue)> = params.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let mut out = format!("{definition_name}(");
    for (i, (k, v)) in entries.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(k);
        out.push('=');
        out.push_str(&v.canonical());
    }
    out.push(')');
    out
}

type EffectFactory = Box<dyn Fn() -> Box<dyn Effect> + Send + Sync>;

/// Process-wide catalogue of effect definitions (§4.6). Registration is
/// startup-only state; lookup is O(1) by name.
pub struct EffectRegistry {
    definitions: HashMap<String, EffectDefinition>,
    factories: HashMap<String, EffectFactory>,
}

impl EffectRegistry {
    /// A registry with the three built-in effects pre-registered, matching
    /// the startup catalogue named in §5.
    pub fn with_builtins() -> Self {
        let mut registry = EffectRegistry {
            definitions: HashMap::new(),
            factories: HashMap::new(),
        };
        registry
            .register(color_adjust::definition(), || Box::new(ColorAdjustEffect::new()))
            .expect("built-in color adjust registers cleanly");
        registry
            .register(gaussian_blur::definition(), || Box::new(GaussianBlurEffect::new()))
            .expect("built-in gaussian blur registers cleanly");
        registry
            .register(merge::definition(), || Box::new(MergeEffect::new()))
            .expect("built-in merge registers cleanly");
        registry
    }

    pub fn register<F>(&mut self, definition: EffectDefinition, factory: F) -> CoreResult<()>
    where
        F: Fn() -> Box<dyn Effect> + Send + Sync + 'static,
    {
        if self.definitions.contains_key(definition.name) {
            return Err(CoreError::DuplicateEffect(definition.name.to_string()));
        }
        self.factories.insert(definition.name.to_string(), Box::new(factory));
        self.definitions.insert(definition.name.to_string(), definition);
        Ok(())
    }

    pub fn definition(&self, name: &str) -> Option<&EffectDefinition> {
        self.definitions.get(name)
    }

    pub fn instantiate(&self, name: &str) -> CoreResult<Box<dyn Effect>> {
        self.factories
            .get(name)
            .map(|f| f())
            .ok_or_else(|| CoreError::NotFound(format!("effect '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_three_effects() {
        let registry = EffectRegistry::with_builtins();
        assert!(registry.definition("colorAdjust").is_some());
        assert!(registry.definition("gaussianBlur").is_some());
        assert!(registry.definition("merge").is_some());
    }

    #[test]
    fn registering_duplicate_name_fails() {
        let mut registry = EffectRegistry::with_builtins();
        let err = registry
            .register(color_adjust::definition(), || Box::new(ColorAdjustEffect::new()))
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateEffect(name) if name == "colorAdjust"));
    }
}
