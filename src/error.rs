//! Crate-wide error taxonomy.
//!
//! Every kind named by the render-core specification gets its own variant so
//! callers can match on failure mode instead of parsing messages. Ambient
//! plumbing (JSON/IO failures in the scene-graph and config loaders) rides
//! along as wrapping variants rather than forcing every caller through
//! `anyhow`.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("GPU backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("GPU out of memory while allocating {what}")]
    OutOfMemory { what: String },

    #[error("framebuffer incomplete for texture {width}x{height} ({format:?})")]
    FramebufferIncomplete {
        width: u32,
        height: u32,
        format: crate::gpu::TextureFormat,
    },

    #[error("shader compile error ({stage}): {diagnostic}")]
    CompileError { stage: ShaderStage, diagnostic: String },

    #[error("shader link error: {0}")]
    LinkError(String),

    #[error("effect '{0}' used before compile()")]
    NotCompiled(String),

    #[error("render node '{node_id}' references missing input '{input_id}'")]
    MissingInput { node_id: String, input_id: String },

    #[error("effect '{effect}' requires {required} input(s), got {got}")]
    InsufficientInputs {
        effect: String,
        required: usize,
        got: usize,
    },

    #[error("effect '{0}' is already registered")]
    DuplicateEffect(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported container: {0}")]
    UnsupportedContainer(String),

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("unsupported asset type: {0}")]
    UnsupportedAssetType(String),

    #[error("cycle detected in graph (warning, partial order used)")]
    CycleDetected,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
