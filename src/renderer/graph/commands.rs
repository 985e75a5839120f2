//! Recorded command stream.
//!
//! Recording resolves every slot and indirection to the physical texture and
//! value it has *at that point of the frame*. Backends therefore execute the
//! list as-is, even if they queue it and run it later.

use glam::{Mat4, Vec2, Vec3, Vec4};
use smallvec::SmallVec;

use crate::renderer::backend::ProgramHandle;
use crate::renderer::graph::pass::PassState;
use crate::renderer::pipeline::{SampleKind, ShaderKey, UniformType};
use crate::renderer::resources::{ExternalBlock, FbSlot, TexSlot, TextureId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl UniformValue {
    #[must_use]
    pub fn ty(&self) -> UniformType {
        match self {
            Self::Int(_) => UniformType::Int,
            Self::Float(_) => UniformType::Float,
            Self::Vec2(_) => UniformType::Vec2,
            Self::Vec3(_) => UniformType::Vec3,
            Self::Vec4(_) => UniformType::Vec4,
            Self::Mat4(_) => UniformType::Mat4,
        }
    }

    /// Appends the value padded to its slot size.
    pub fn write_bytes(&self, out: &mut Vec<u8>) {
        let start = out.len();
        match self {
            Self::Int(v) => out.extend_from_slice(bytemuck::bytes_of(v)),
            Self::Float(v) => out.extend_from_slice(bytemuck::bytes_of(v)),
            Self::Vec2(v) => out.extend_from_slice(bytemuck::bytes_of(v)),
            Self::Vec3(v) => out.extend_from_slice(bytemuck::bytes_of(v)),
            Self::Vec4(v) => out.extend_from_slice(bytemuck::bytes_of(v)),
            Self::Mat4(v) => out.extend_from_slice(bytemuck::bytes_of(v)),
        }
        out.resize(start + self.ty().slot_size(), 0);
    }

    #[must_use]
    pub fn as_vec4(&self) -> Option<Vec4> {
        match self {
            Self::Vec4(v) => Some(*v),
            _ => None,
        }
    }
}

/// One mip of a texture used as a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetView {
    pub slot: TexSlot,
    pub texture: TextureId,
    pub mip: u32,
}

/// Snapshot of a framebuffer at bind time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundTarget {
    pub fb: FbSlot,
    /// Color attachments, ordered by attachment index.
    pub colors: SmallVec<[(u8, TargetView); 4]>,
    pub depth: Option<TargetView>,
    pub size: (u32, u32),
}

/// A sampled texture range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    pub name: &'static str,
    pub slot: TexSlot,
    pub texture: TextureId,
    pub base_mip: u32,
    /// `None` samples every level from `base_mip` on.
    pub mip_count: Option<u32>,
    pub kind: SampleKind,
}

impl TextureBinding {
    /// Whether the sampled range includes `mip`.
    #[must_use]
    pub fn covers_mip(&self, mip: u32) -> bool {
        mip >= self.base_mip && self.mip_count.is_none_or(|n| mip < self.base_mip + n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    /// One oversized triangle.
    Fullscreen,
    /// `count` vertex-positioned sprites, one triangle each.
    Sprites { count: u32 },
}

impl DrawKind {
    #[must_use]
    pub fn vertex_count(self) -> u32 {
        match self {
            Self::Fullscreen => 3,
            Self::Sprites { count } => count * 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub pass: &'static str,
    pub key: ShaderKey,
    pub program: ProgramHandle,
    pub state: PassState,
    /// Textures in interface order.
    pub textures: SmallVec<[TextureBinding; 8]>,
    /// Uniform values in interface order.
    pub uniforms: Vec<(&'static str, UniformValue)>,
    pub blocks: SmallVec<[ExternalBlock; 4]>,
    pub primitive: DrawKind,
    /// Color locations the fragment stage writes.
    pub outputs: u8,
}

impl DrawCall {
    #[must_use]
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    #[must_use]
    pub fn texture(&self, name: &str) -> Option<&TextureBinding> {
        self.textures.iter().find(|t| t.name == name)
    }

    /// Packs the uniform values into the interface's struct layout.
    #[must_use]
    pub fn uniform_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.uniforms.len() * 16);
        for (_, value) in &self.uniforms {
            value.write_bytes(&mut out);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PushGroup(&'static str),
    PopGroup,
    Bind(BoundTarget),
    /// Clears the bound framebuffer.
    Clear {
        color: Option<[f32; 4]>,
        depth: Option<f32>,
    },
    Draw(DrawCall),
    /// Draws to the host display target.
    Display(DrawCall),
}

#[derive(Debug, Clone, Default)]
pub struct CommandList {
    commands: Vec<Command>,
}

impl CommandList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawCall> {
        self.commands.iter().filter_map(|c| match c {
            Command::Draw(d) => Some(d),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_pad_to_their_slot() {
        let mut bytes = Vec::new();
        UniformValue::Int(3).write_bytes(&mut bytes);
        UniformValue::Vec2(Vec2::ONE).write_bytes(&mut bytes);
        UniformValue::Mat4(Mat4::IDENTITY).write_bytes(&mut bytes);
        assert_eq!(bytes.len(), 16 + 16 + 64);
        assert_eq!(&bytes[..4], &3i32.to_ne_bytes());
    }

    #[test]
    fn sprite_draws_emit_one_triangle_each() {
        assert_eq!(DrawKind::Fullscreen.vertex_count(), 3);
        assert_eq!(DrawKind::Sprites { count: 10 }.vertex_count(), 30);
    }
}
