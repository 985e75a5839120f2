//! GPU backends.
//!
//! The frame pipeline never talks to a device directly. It records a
//! [`CommandList`] and hands it to a [`GpuBackend`], which owns every
//! physical object:
//!
//! - [`WgpuBackend`] executes the stream on a `wgpu` device.
//! - [`HeadlessBackend`] validates and records the stream without a device.
//!
//! Textures are identified by the allocator's [`TextureId`]; programs by the
//! [`ProgramHandle`] returned from [`GpuBackend::compile_program`].

pub mod headless;
pub mod wgpu_backend;

pub use headless::{DrawRecord, HeadlessBackend};
pub use wgpu_backend::WgpuBackend;

use crate::errors::Result;
use crate::renderer::graph::commands::CommandList;
use crate::renderer::pipeline::ShaderInterface;
use crate::renderer::resources::{ExternalBlock, TextureDesc, TextureId};

slotmap::new_key_type! {
    /// Backend-assigned identity of a compiled program.
    pub struct ProgramHandle;
}

/// Device seam of the post-processing pipeline.
pub trait GpuBackend {
    /// Creates a texture owned by the allocator.
    fn create_texture(&mut self, id: TextureId, desc: &TextureDesc) -> Result<()>;

    /// Registers a host-owned texture under `id`.
    fn import_texture(&mut self, id: TextureId, desc: &TextureDesc) -> Result<()>;

    /// Destroys an owned texture, or unregisters an imported one.
    fn destroy_texture(&mut self, id: TextureId);

    /// Compiles a rendered WGSL program laid out as `interface` describes.
    fn compile_program(
        &mut self,
        label: &str,
        source: &str,
        interface: &ShaderInterface,
    ) -> Result<ProgramHandle>;

    fn destroy_program(&mut self, program: ProgramHandle);

    /// Replaces the contents of a host uniform block.
    fn set_uniform_block(&mut self, block: ExternalBlock, data: &[u8]);

    /// Executes a recorded frame.
    fn submit(&mut self, commands: &CommandList) -> Result<()>;
}
