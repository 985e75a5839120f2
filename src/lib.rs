#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Screen-space post-processing for real-time renderers.
//!
//! The crate owns everything between "the scene is rendered into a color
//! and depth target" and "a texture is presented": Hi-Z pyramids,
//! screen-space reflections, froxel volumetrics, motion blur, depth of
//! field and bloom, scheduled over a ping-pong color buffer with a color
//! history for temporal effects.
//!
//! ```rust,ignore
//! use myth_postfx::{EffectSettings, FrameInput, PostFxConfig, PostFxEngine, ViewState};
//!
//! let backend = myth_postfx::WgpuBackend::request(wgpu::PowerPreference::HighPerformance)?;
//! let mut engine = PostFxEngine::new(backend, PostFxConfig::default())?;
//! let viewport = engine.create_viewport();
//!
//! let settings = EffectSettings::load("effects.json")?;
//! let input = FrameInput::new(&settings, ViewState::new(1280, 720, view, projection));
//! let output = engine.render_frame(viewport, &input)?;
//! ```

pub mod errors;
pub mod renderer;
pub mod settings;

pub use errors::{PostFxError, Result};
pub use renderer::backend::{GpuBackend, HeadlessBackend, WgpuBackend};
pub use renderer::context::{CameraLens, CameraRig, FrameInput, SceneState, ViewState, WorldVolume};
pub use renderer::effects::{EffectFlags, EffectsState, FrameChanges};
pub use renderer::resources::{
    ExternalBlock, ExternalTexture, FbSlot, TexFormat, TexSlot, TextureDesc, TextureFlags,
    TextureId,
};
pub use renderer::{FrameOutput, PostFxEngine, ViewportEffects, ViewportId};
pub use settings::{DebugView, EffectSettings, PostFxConfig};
