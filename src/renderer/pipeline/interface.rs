//! Shader binding interface.
//!
//! Every pass group declares its inputs once. The same declaration drives:
//!
//! - the WGSL binding block injected into the template (`binding_code`)
//! - the explicit bind group layout built by the backend
//! - the packing order of uniform values at draw time
//!
//! Binding order is fixed: textures, then one filtering sampler, then the
//! uniform struct (if any), then external blocks.

use std::fmt::Write;

use crate::renderer::resources::ExternalBlock;

/// How a texture input is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
    /// Filterable float color.
    Color,
    /// Layered filterable float color.
    ColorArray,
    /// Depth, read with `textureLoad`.
    Depth,
    /// Layered depth, read with `textureLoad` and a layer index.
    DepthArray,
}

impl SampleKind {
    #[inline]
    #[must_use]
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth | Self::DepthArray)
    }

    #[inline]
    #[must_use]
    pub fn is_layered(self) -> bool {
        matches!(self, Self::ColorArray | Self::DepthArray)
    }

    #[must_use]
    pub fn wgsl_type(self) -> &'static str {
        match self {
            Self::Color => "texture_2d<f32>",
            Self::ColorArray => "texture_2d_array<f32>",
            Self::Depth => "texture_depth_2d",
            Self::DepthArray => "texture_depth_2d_array",
        }
    }
}

/// WGSL type of a uniform member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformType {
    #[must_use]
    pub fn wgsl_type(self) -> &'static str {
        match self {
            Self::Int => "i32",
            Self::Float => "f32",
            Self::Vec2 => "vec2<f32>",
            Self::Vec3 => "vec3<f32>",
            Self::Vec4 => "vec4<f32>",
            Self::Mat4 => "mat4x4<f32>",
        }
    }

    /// Bytes occupied in the packed uniform struct. Every member starts on a
    /// 16-byte boundary.
    #[must_use]
    pub fn slot_size(self) -> usize {
        match self {
            Self::Mat4 => 64,
            _ => 16,
        }
    }
}

/// Size in bytes of every external uniform block binding.
pub const EXTERNAL_BLOCK_SIZE: usize = 4096;

/// Inputs of one shading group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ShaderInterface {
    pub textures: Vec<(&'static str, SampleKind)>,
    pub uniforms: Vec<(&'static str, UniformType)>,
    pub blocks: Vec<(&'static str, ExternalBlock)>,
}

impl ShaderInterface {
    #[inline]
    #[must_use]
    pub fn sampler_binding(&self) -> u32 {
        self.textures.len() as u32
    }

    /// Binding of the uniform struct, if the group has uniforms.
    #[must_use]
    pub fn uniform_binding(&self) -> Option<u32> {
        (!self.uniforms.is_empty()).then(|| self.sampler_binding() + 1)
    }

    #[must_use]
    pub fn first_block_binding(&self) -> u32 {
        self.sampler_binding() + 1 + u32::from(!self.uniforms.is_empty())
    }

    /// Size of the packed uniform struct.
    #[must_use]
    pub fn uniform_size(&self) -> usize {
        self.uniforms.iter().map(|(_, ty)| ty.slot_size()).sum()
    }

    /// WGSL declarations for every binding.
    #[must_use]
    pub fn binding_code(&self) -> String {
        let mut code = String::new();
        for (i, (name, kind)) in self.textures.iter().enumerate() {
            let _ = writeln!(
                code,
                "@group(0) @binding({i}) var {name}: {};",
                kind.wgsl_type()
            );
        }
        let _ = writeln!(
            code,
            "@group(0) @binding({}) var samp: sampler;",
            self.sampler_binding()
        );

        if let Some(binding) = self.uniform_binding() {
            code.push_str("struct Params {\n");
            for (name, ty) in &self.uniforms {
                let _ = writeln!(code, "    @align(16) {name}: {},", ty.wgsl_type());
            }
            code.push_str("};\n");
            let _ = writeln!(code, "@group(0) @binding({binding}) var<uniform> u: Params;");
        }

        let first = self.first_block_binding();
        for (i, (name, _)) in self.blocks.iter().enumerate() {
            let _ = writeln!(
                code,
                "@group(0) @binding({}) var<uniform> {name}: array<vec4<f32>, {}>;",
                first + i as u32,
                EXTERNAL_BLOCK_SIZE / 16
            );
        }
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_follow_fixed_order() {
        let iface = ShaderInterface {
            textures: vec![("color_buffer", SampleKind::Color), ("depth_buffer", SampleKind::Depth)],
            uniforms: vec![("samples", UniformType::Int), ("past_vp", UniformType::Mat4)],
            blocks: vec![("probe_block", ExternalBlock::Probes)],
        };
        assert_eq!(iface.sampler_binding(), 2);
        assert_eq!(iface.uniform_binding(), Some(3));
        assert_eq!(iface.first_block_binding(), 4);
        assert_eq!(iface.uniform_size(), 80);

        let code = iface.binding_code();
        assert!(code.contains("@binding(1) var depth_buffer: texture_depth_2d;"));
        assert!(code.contains("@align(16) past_vp: mat4x4<f32>,"));
        assert!(code.contains("@binding(4) var<uniform> probe_block"));
    }

    #[test]
    fn groups_without_uniforms_skip_the_struct() {
        let iface = ShaderInterface {
            textures: vec![("source", SampleKind::Color)],
            ..Default::default()
        };
        assert_eq!(iface.uniform_binding(), None);
        assert_eq!(iface.first_block_binding(), 2);
        assert!(!iface.binding_code().contains("struct Params"));
    }
}
