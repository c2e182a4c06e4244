//! Uniform layout packing, grounded in the teacher's
//! `renderer::graph_uniforms` slot-packing scheme: every field gets a
//! 16-byte-aligned slot regardless of its natural size, which keeps the
//! packer trivial and matches `std140`-style uniform buffer layout rules.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Int,
    Bool,
    Vec2,
    Vec3,
    Vec4,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformSlot {
    pub name: String,
    pub kind: UniformKind,
    pub offset: u32,
}

/// Declares the uniforms and texture-unit count a compiled shader expects.
/// A real GL-style backend reflects this from the compiled program; `wgpu`
/// has no uniform reflection, so the effect that compiles the shader
/// declares its own layout up front (see `effects::*`).
#[derive(Debug, Clone, Default)]
pub struct ShaderLayout {
    pub uniforms: Vec<UniformSlot>,
    pub texture_count: u32,
}

impl ShaderLayout {
    pub fn buffer_size(&self) -> u64 {
        self.uniforms.len() as u64 * 16
    }

    pub fn slot(&self, name: &str) -> Option<&UniformSlot> {
        self.uniforms.iter().find(|s| s.name == name)
    }
}

/// Build a [`ShaderLayout`] from `(name, kind)` pairs in declaration order.
pub fn pack_uniform_layout(fields: &[(&str, UniformKind)]) -> ShaderLayout {
    let uniforms = fields
        .iter()
        .enumerate()
        .map(|(i, (name, kind))| UniformSlot {
            name: (*name).to_string(),
            kind: *kind,
            offset: (i as u32) * 16,
        })
        .collect();
    ShaderLayout {
        uniforms,
        texture_count: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_sixteen_byte_aligned() {
        let layout = pack_uniform_layout(&[
            ("u_resolution", UniformKind::Vec2),
            ("u_brightness", UniformKind::Float),
        ]);
        assert_eq!(layout.slot("u_resolution").unwrap().offset, 0);
        assert_eq!(layout.slot("u_brightness").unwrap().offset, 16);
        assert_eq!(layout.buffer_size(), 32);
    }
}
