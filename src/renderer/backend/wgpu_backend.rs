//! wgpu backend.
//!
//! Executes recorded [`CommandList`]s on a `wgpu` device.
//!
//! ```text
//!   Bind ───────► current target (views per attachment mip)
//!   Clear ──────► render pass with clear load ops
//!   Draw ───────► pipeline(program, state, target formats)
//!                 + bind group [textures | sampler | uniforms | blocks]
//!                 + render pass with load ops, 3 or count·3 vertices
//!   Display ────► same as Draw, into the host display target
//! ```
//!
//! # Resources
//!
//! - Owned textures are created with render, sampling and copy usages.
//! - Imported textures must be handed over with [`WgpuBackend::stage_import`]
//!   before the engine registers them. They are dropped, not destroyed,
//!   when unregistered.
//! - Pipelines are created lazily per program, fixed-function state and
//!   target layout, and cached until the program is destroyed.
//! - Uniform values of a whole submission are packed into one arena buffer.

use std::borrow::Cow;
use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;

use super::{GpuBackend, ProgramHandle};
use crate::errors::{PostFxError, Result};
use crate::renderer::graph::commands::{BoundTarget, Command, CommandList, DrawCall, TargetView};
use crate::renderer::graph::pass::PassState;
use crate::renderer::pipeline::{EXTERNAL_BLOCK_SIZE, SampleKind, ShaderInterface};
use crate::renderer::resources::{ExternalBlock, TextureDesc, TextureFlags, TextureId};

struct DeviceTexture {
    texture: wgpu::Texture,
    desc: TextureDesc,
    imported: bool,
    /// Single-mip views used as render attachments.
    mip_views: Vec<wgpu::TextureView>,
}

struct DeviceProgram {
    label: String,
    module: wgpu::ShaderModule,
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    interface: ShaderInterface,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramHandle,
    state: PassState,
    colors: SmallVec<[Option<wgpu::TextureFormat>; 4]>,
    depth: Option<wgpu::TextureFormat>,
    outputs: u8,
}

/// Render target of one draw, resolved to device views.
struct ResolvedTarget {
    colors: SmallVec<[Option<(wgpu::TextureView, wgpu::TextureFormat)>; 4]>,
    depth: Option<(wgpu::TextureView, wgpu::TextureFormat)>,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    rg11b10_renderable: bool,

    textures: FxHashMap<TextureId, DeviceTexture>,
    staged_imports: VecDeque<wgpu::Texture>,
    programs: SlotMap<ProgramHandle, DeviceProgram>,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
    blocks: FxHashMap<ExternalBlock, wgpu::Buffer>,
    sampler: wgpu::Sampler,

    uniform_arena: Option<wgpu::Buffer>,
    display: Option<(wgpu::TextureView, wgpu::TextureFormat)>,
}

impl WgpuBackend {
    #[must_use]
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let rg11b10_renderable = device
            .features()
            .contains(wgpu::Features::RG11B10UFLOAT_RENDERABLE);
        if !rg11b10_renderable {
            log::info!("Rg11b10Ufloat is not renderable, packed color targets use Rgba16Float");
        }

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("PostFX Linear Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        Self {
            device,
            queue,
            rg11b10_renderable,
            textures: FxHashMap::default(),
            staged_imports: VecDeque::new(),
            programs: SlotMap::with_key(),
            pipelines: FxHashMap::default(),
            blocks: FxHashMap::default(),
            sampler,
            uniform_arena: None,
            display: None,
        }
    }

    /// Creates a device without a surface, for offscreen rendering.
    pub fn request(power_preference: wgpu::PowerPreference) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| PostFxError::Device(e.to_string()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("PostFX Device"),
            required_features: adapter.features() & wgpu::Features::RG11B10UFLOAT_RENDERABLE,
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))
        .map_err(|e| PostFxError::Device(e.to_string()))?;

        Ok(Self::new(device, queue))
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Device texture behind `id`, for hosts rendering the scene into a slot.
    #[must_use]
    pub fn texture(&self, id: TextureId) -> Option<&wgpu::Texture> {
        self.textures.get(&id).map(|t| &t.texture)
    }

    /// Queues a host texture for the next [`GpuBackend::import_texture`].
    pub fn stage_import(&mut self, texture: wgpu::Texture) {
        self.staged_imports.push_back(texture);
    }

    /// Sets where `Display` commands render.
    pub fn set_display_target(&mut self, view: wgpu::TextureView, format: wgpu::TextureFormat) {
        self.display = Some((view, format));
    }

    fn texture_entry(&self, id: TextureId) -> Result<&DeviceTexture> {
        self.textures
            .get(&id)
            .ok_or_else(|| PostFxError::UnknownTexture(format!("{id:?}")))
    }

    fn mip_views(texture: &wgpu::Texture, desc: &TextureDesc) -> Vec<wgpu::TextureView> {
        (0..desc.mip_level_count())
            .map(|mip| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("PostFX Attachment"),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_mip_level: mip,
                    mip_level_count: Some(1),
                    base_array_layer: 0,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect()
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Packs every draw's uniforms into the arena. Returns the offset of
    /// each command's uniform struct.
    fn upload_uniforms(&mut self, commands: &CommandList) -> Vec<Option<u64>> {
        let align = u64::from(self.device.limits().min_uniform_buffer_offset_alignment);
        let mut bytes = Vec::new();
        let mut offsets = Vec::with_capacity(commands.len());

        for command in commands.iter() {
            let call = match command {
                Command::Draw(call) | Command::Display(call) if !call.uniforms.is_empty() => call,
                _ => {
                    offsets.push(None);
                    continue;
                }
            };
            let offset = (bytes.len() as u64).next_multiple_of(align);
            bytes.resize(offset as usize, 0);
            bytes.extend_from_slice(&call.uniform_bytes());
            offsets.push(Some(offset));
        }

        if bytes.is_empty() {
            return offsets;
        }

        let needed = bytes.len() as u64;
        let too_small = self.uniform_arena.as_ref().is_none_or(|b| b.size() < needed);
        if too_small {
            let size = needed.next_power_of_two().max(4096);
            log::debug!("Growing uniform arena to {size} bytes");
            self.uniform_arena = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("PostFX Uniform Arena"),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }
        if let Some(arena) = &self.uniform_arena {
            self.queue.write_buffer(arena, 0, &bytes);
        }
        offsets
    }

    fn block_buffer(&mut self, block: ExternalBlock) -> wgpu::Buffer {
        self.blocks
            .entry(block)
            .or_insert_with(|| {
                self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("PostFX Block {block:?}")),
                    size: EXTERNAL_BLOCK_SIZE as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .clone()
    }

    fn resolve_target(&self, target: &BoundTarget) -> Result<ResolvedTarget> {
        let attachment = |view: &TargetView| -> Result<(wgpu::TextureView, wgpu::TextureFormat)> {
            let texture = self.texture_entry(view.texture)?;
            let mip_view = texture.mip_views.get(view.mip as usize).ok_or_else(|| {
                PostFxError::UnboundTexture(format!("{} has no mip {}", view.slot, view.mip))
            })?;
            Ok((mip_view.clone(), texture.texture.format()))
        };

        let count = target
            .colors
            .iter()
            .map(|(index, _)| usize::from(*index) + 1)
            .max()
            .unwrap_or(0);
        let mut colors: SmallVec<[_; 4]> = (0..count).map(|_| None).collect();
        for (index, view) in &target.colors {
            colors[usize::from(*index)] = Some(attachment(view)?);
        }
        let depth = target.depth.as_ref().map(attachment).transpose()?;
        Ok(ResolvedTarget { colors, depth })
    }

    fn display_target(&self) -> Result<ResolvedTarget> {
        let (view, format) = self.display.clone().ok_or(PostFxError::MissingDisplayTarget)?;
        Ok(ResolvedTarget {
            colors: smallvec::smallvec![Some((view, format))],
            depth: None,
        })
    }

    fn encode_clear(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &ResolvedTarget,
        color: Option<[f32; 4]>,
        depth: Option<f32>,
    ) {
        let color_load = match color {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: f64::from(a),
            }),
            None => wgpu::LoadOp::Load,
        };
        let depth_load = depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear);

        let color_attachments = color_attachments(target, color_load);
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("PostFX Clear"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth_attachment(target, depth_load),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
    }

    fn encode_draw(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target: &ResolvedTarget,
        call: &DrawCall,
        uniform_offset: Option<u64>,
    ) -> Result<()> {
        let pipeline = self.pipeline(target, call)?;

        let views = call
            .textures
            .iter()
            .map(|binding| {
                let texture = self.texture_entry(binding.texture)?;
                Ok(texture.texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(binding.name),
                    dimension: Some(view_dimension(binding.kind)),
                    aspect: if binding.kind.is_depth() {
                        wgpu::TextureAspect::DepthOnly
                    } else {
                        wgpu::TextureAspect::All
                    },
                    base_mip_level: binding.base_mip,
                    mip_level_count: binding.mip_count,
                    ..Default::default()
                }))
            })
            .collect::<Result<Vec<_>>>()?;
        let blocks: SmallVec<[wgpu::Buffer; 4]> =
            call.blocks.iter().map(|b| self.block_buffer(*b)).collect();

        let program = self
            .programs
            .get(call.program)
            .ok_or_else(|| PostFxError::UnknownProgram(call.key.label()))?;
        let interface = &program.interface;

        let mut entries: Vec<wgpu::BindGroupEntry<'_>> = views
            .iter()
            .enumerate()
            .map(|(i, view)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: interface.sampler_binding(),
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        });
        if let (Some(binding), Some(offset), Some(arena)) = (
            interface.uniform_binding(),
            uniform_offset,
            self.uniform_arena.as_ref(),
        ) {
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: arena,
                    offset,
                    size: wgpu::BufferSize::new(interface.uniform_size() as u64),
                }),
            });
        }
        let first_block = interface.first_block_binding();
        for (i, buffer) in blocks.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: first_block + i as u32,
                resource: buffer.as_entire_binding(),
            });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&program.label),
            layout: &program.layout,
            entries: &entries,
        });

        let color_attachments = color_attachments(target, wgpu::LoadOp::Load);
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(call.pass),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth_attachment(target, wgpu::LoadOp::Load),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..call.primitive.vertex_count(), 0..1);
        Ok(())
    }

    fn pipeline(&mut self, target: &ResolvedTarget, call: &DrawCall) -> Result<wgpu::RenderPipeline> {
        let key = PipelineKey {
            program: call.program,
            state: call.state,
            colors: target.colors.iter().map(|c| c.as_ref().map(|(_, f)| *f)).collect(),
            depth: target.depth.as_ref().map(|(_, f)| *f),
            outputs: call.outputs,
        };
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline.clone());
        }

        let program = self
            .programs
            .get(call.program)
            .ok_or_else(|| PostFxError::UnknownProgram(call.key.label()))?;
        log::debug!("Creating pipeline for {} ({:?})", program.label, call.state);

        let blend = blend_state(call.state);
        let targets: SmallVec<[Option<wgpu::ColorTargetState>; 4]> = key
            .colors
            .iter()
            .enumerate()
            .map(|(location, format)| {
                format.map(|format| wgpu::ColorTargetState {
                    format,
                    blend,
                    // Attachments the program does not write stay untouched.
                    write_mask: if location < usize::from(call.outputs)
                        && call.state.contains(PassState::WRITE_COLOR)
                    {
                        wgpu::ColorWrites::ALL
                    } else {
                        wgpu::ColorWrites::empty()
                    },
                })
            })
            .collect();

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&program.label),
                layout: Some(&program.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.module,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.module,
                    entry_point: Some("fs_main"),
                    targets: &targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: key.depth.map(|format| wgpu::DepthStencilState {
                    format,
                    depth_write_enabled: Some(call.state.contains(PassState::WRITE_DEPTH)),
                    depth_compare: Some(wgpu::CompareFunction::Always),
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        self.pipelines.insert(key, pipeline.clone());
        Ok(pipeline)
    }
}

fn view_dimension(kind: SampleKind) -> wgpu::TextureViewDimension {
    if kind.is_layered() {
        wgpu::TextureViewDimension::D2Array
    } else {
        wgpu::TextureViewDimension::D2
    }
}

fn blend_state(state: PassState) -> Option<wgpu::BlendState> {
    let component = |src_factor, dst_factor| wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation: wgpu::BlendOperation::Add,
    };
    let blend = |c: wgpu::BlendComponent| wgpu::BlendState { color: c, alpha: c };

    use wgpu::BlendFactor as F;
    if state.contains(PassState::ADDITIVE) {
        Some(blend(component(F::One, F::One)))
    } else if state.contains(PassState::MULTIPLY) {
        Some(blend(component(F::Zero, F::Src)))
    } else if state.contains(PassState::TRANSMISSION) {
        Some(blend(component(F::One, F::SrcAlpha)))
    } else {
        None
    }
}

fn color_attachments(
    target: &ResolvedTarget,
    load: wgpu::LoadOp<wgpu::Color>,
) -> SmallVec<[Option<wgpu::RenderPassColorAttachment<'_>>; 4]> {
    target
        .colors
        .iter()
        .map(|color| {
            color.as_ref().map(|(view, _)| wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })
        })
        .collect()
}

fn depth_attachment(
    target: &ResolvedTarget,
    load: wgpu::LoadOp<f32>,
) -> Option<wgpu::RenderPassDepthStencilAttachment<'_>> {
    target
        .depth
        .as_ref()
        .map(|(view, _)| wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: Some(wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        })
}

fn layout_entries(interface: &ShaderInterface) -> Vec<wgpu::BindGroupLayoutEntry> {
    let visibility = wgpu::ShaderStages::VERTEX_FRAGMENT;
    let uniform = |binding: u32, size: u64| wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size),
        },
        count: None,
    };

    let mut entries: Vec<_> = interface
        .textures
        .iter()
        .enumerate()
        .map(|(i, (_, kind))| wgpu::BindGroupLayoutEntry {
            binding: i as u32,
            visibility,
            ty: wgpu::BindingType::Texture {
                sample_type: if kind.is_depth() {
                    wgpu::TextureSampleType::Depth
                } else {
                    wgpu::TextureSampleType::Float { filterable: true }
                },
                view_dimension: view_dimension(*kind),
                multisampled: false,
            },
            count: None,
        })
        .collect();

    entries.push(wgpu::BindGroupLayoutEntry {
        binding: interface.sampler_binding(),
        visibility,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    });
    if let Some(binding) = interface.uniform_binding() {
        entries.push(uniform(binding, interface.uniform_size() as u64));
    }
    let first = interface.first_block_binding();
    for i in 0..interface.blocks.len() {
        entries.push(uniform(first + i as u32, EXTERNAL_BLOCK_SIZE as u64));
    }
    entries
}

impl GpuBackend for WgpuBackend {
    fn create_texture(&mut self, id: TextureId, desc: &TextureDesc) -> Result<()> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("PostFX Texture"),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.layers,
            },
            mip_level_count: desc.mip_level_count(),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format.to_wgpu(self.rg11b10_renderable),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        if desc.flags.contains(TextureFlags::TEMP) {
            log::trace!("Created transient texture {}x{}", desc.width, desc.height);
        }

        let mip_views = Self::mip_views(&texture, desc);
        self.textures.insert(
            id,
            DeviceTexture {
                texture,
                desc: *desc,
                imported: false,
                mip_views,
            },
        );
        Ok(())
    }

    fn import_texture(&mut self, id: TextureId, desc: &TextureDesc) -> Result<()> {
        let texture = self.staged_imports.pop_front().ok_or_else(|| {
            PostFxError::UnknownTexture(format!("{id:?}: no staged host texture"))
        })?;
        let size = texture.size();
        if (size.width, size.height) != (desc.width, desc.height) {
            return Err(PostFxError::Device(format!(
                "imported texture is {}x{}, expected {}x{}",
                size.width, size.height, desc.width, desc.height
            )));
        }

        let mip_views = if texture.usage().contains(wgpu::TextureUsages::RENDER_ATTACHMENT) {
            Self::mip_views(&texture, desc)
        } else {
            Vec::new()
        };
        self.textures.insert(
            id,
            DeviceTexture {
                texture,
                desc: *desc,
                imported: true,
                mip_views,
            },
        );
        Ok(())
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if let Some(entry) = self.textures.remove(&id)
            && !entry.imported
        {
            log::trace!("Destroying texture {}x{}", entry.desc.width, entry.desc.height);
            entry.texture.destroy();
        }
    }

    fn compile_program(
        &mut self,
        label: &str,
        source: &str,
        interface: &ShaderInterface,
    ) -> Result<ProgramHandle> {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
            });

        let info = pollster::block_on(module.get_compilation_info());
        let errors: Vec<String> = info
            .messages
            .iter()
            .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
            .map(|m| m.message.clone())
            .collect();
        if !errors.is_empty() {
            return Err(PostFxError::ShaderCompilation {
                program: label.to_string(),
                message: errors.join("\n"),
            });
        }

        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &layout_entries(interface),
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[Some(&layout)],
                immediate_size: 0,
            });

        Ok(self.programs.insert(DeviceProgram {
            label: label.to_string(),
            module,
            layout,
            pipeline_layout,
            interface: interface.clone(),
        }))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(program);
        self.pipelines.retain(|key, _| key.program != program);
    }

    fn set_uniform_block(&mut self, block: ExternalBlock, data: &[u8]) {
        let buffer = self.block_buffer(block);
        let len = data.len().min(EXTERNAL_BLOCK_SIZE);
        if len < data.len() {
            log::warn!("Uniform block {block:?} truncated to {EXTERNAL_BLOCK_SIZE} bytes");
        }
        let mut bytes = data[..len].to_vec();
        bytes.resize(len.next_multiple_of(4), 0);
        self.queue.write_buffer(&buffer, 0, &bytes);
    }

    fn submit(&mut self, commands: &CommandList) -> Result<()> {
        let uniform_offsets = self.upload_uniforms(commands);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("PostFX Encoder"),
            });

        let mut bound: Option<ResolvedTarget> = None;
        let mut groups = 0usize;
        for (command, offset) in commands.iter().zip(uniform_offsets) {
            match command {
                Command::PushGroup(name) => {
                    encoder.push_debug_group(name);
                    groups += 1;
                }
                Command::PopGroup => {
                    groups = groups.checked_sub(1).ok_or_else(|| {
                        PostFxError::NoBoundFramebuffer("unbalanced debug group".to_string())
                    })?;
                    encoder.pop_debug_group();
                }
                Command::Bind(target) => bound = Some(self.resolve_target(target)?),
                Command::Clear { color, depth } => {
                    let target = bound
                        .as_ref()
                        .ok_or_else(|| PostFxError::NoBoundFramebuffer("clear".to_string()))?;
                    self.encode_clear(&mut encoder, target, *color, *depth);
                }
                Command::Draw(call) => {
                    let target = bound
                        .take()
                        .ok_or_else(|| PostFxError::NoBoundFramebuffer(call.pass.to_string()))?;
                    let result = self.encode_draw(&mut encoder, &target, call, offset);
                    bound = Some(target);
                    result?;
                }
                Command::Display(call) => {
                    let target = self.display_target()?;
                    self.encode_draw(&mut encoder, &target, call, offset)?;
                }
            }
        }
        for _ in 0..groups {
            encoder.pop_debug_group();
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}
