//! Shader programs.
//!
//! - [`ShaderKey`]: program template + variant defines
//! - [`ShaderInterface`]: binding layout shared by template, backend and draw
//! - [`ShaderLibrary`]: minijinja rendering of the embedded WGSL templates
//! - [`ShaderVariantCache`]: compile-once memoization owned by the engine

pub mod interface;
pub mod shader_cache;
pub mod shader_key;
pub mod shader_library;

pub use interface::{EXTERNAL_BLOCK_SIZE, SampleKind, ShaderInterface, UniformType};
pub use shader_cache::ShaderVariantCache;
pub use shader_key::{Program, ShaderKey, ShaderVariant};
pub use shader_library::ShaderLibrary;
