//! Effect Settings & Engine Configuration
//!
//! Strongly-typed option set read once per frame by the effect resolver.
//!
//! Every option group is its own struct with `#[serde(default)]`, so a JSON
//! file only needs to name the options it changes:
//!
//! ```rust,ignore
//! use myth_postfx::settings::EffectSettings;
//!
//! let settings = EffectSettings::from_json_str(r#"{
//!     "bloom": { "enabled": true, "radius": 6.0 },
//!     "ssr":   { "enabled": true, "ray_count": 2 }
//! }"#)?;
//! ```
//!
//! [`PostFxConfig`] holds the engine-wide limits that do not change per
//! frame (maximum bloom steps, pyramid depths, pool trimming).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

// ---------------------------------------------------------------------------
// Motion Blur
// ---------------------------------------------------------------------------

/// Camera motion blur options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionBlurSettings {
    pub enabled: bool,
    /// Shutter time, in frames, between the past and current camera pose.
    pub shutter: f32,
    /// Samples taken along the reprojected motion vector.
    pub samples: i32,
}

impl Default for MotionBlurSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            shutter: 1.0,
            samples: 8,
        }
    }
}

// ---------------------------------------------------------------------------
// Bloom
// ---------------------------------------------------------------------------

/// Bloom options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomSettings {
    pub enabled: bool,
    /// Luminance above which pixels contribute to bloom.
    pub threshold: f32,
    /// Width of the soft transition around the threshold.
    pub knee: f32,
    /// Strength of the final additive composite.
    pub intensity: f32,
    /// Blur radius. Together with the image size this fixes the chain length.
    pub radius: f32,
    /// Selects the anti-flicker and 13-tap variants.
    pub high_quality: bool,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.8,
            knee: 0.5,
            intensity: 0.05,
            radius: 6.5,
            high_quality: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Depth of Field
// ---------------------------------------------------------------------------

/// Depth of field options.
///
/// Focal length, sensor size and focus distance come from the active camera
/// (see [`CameraLens`](crate::renderer::context::CameraLens)).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthOfFieldSettings {
    pub enabled: bool,
    pub f_stop: f32,
    /// Aperture blade count. Values below 3 give a round bokeh.
    pub blades: f32,
    /// Blade rotation in radians.
    pub rotation: f32,
    /// Anamorphic ratio (width / height).
    pub ratio: f32,
    /// Largest bokeh sprite, in pixels.
    pub max_bokeh_size: f32,
}

impl Default for DepthOfFieldSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            f_stop: 2.8,
            blades: 6.0,
            rotation: 0.0,
            ratio: 1.0,
            max_bokeh_size: 100.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Screen Space Reflections
// ---------------------------------------------------------------------------

/// Screen-space reflection options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsrSettings {
    pub enabled: bool,
    /// Rays traced per pixel. Clamped to `1..=4`.
    pub ray_count: i32,
    /// Trace at half resolution.
    pub half_res: bool,
    /// Normalize the resolve weights across rays.
    pub normalize_weight: bool,
    /// Tracing precision in `[0, 1]`. Higher is finer.
    pub quality: f32,
    /// Surface thickness assumed behind each depth sample.
    pub thickness: f32,
    /// Surfaces rougher than this do not receive reflections.
    pub max_roughness: f32,
    /// Screen-border fade width.
    pub border_fade: f32,
    /// Per-ray radiance clamp. Values near zero disable clamping.
    pub firefly_clamp: f32,
}

impl Default for SsrSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ray_count: 1,
            half_res: true,
            normalize_weight: true,
            quality: 0.25,
            thickness: 0.2,
            max_roughness: 0.5,
            border_fade: 0.075,
            firefly_clamp: 10.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Volumetrics
// ---------------------------------------------------------------------------

/// World volumetric options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumetricSettings {
    pub enabled: bool,
    /// Integration start distance from the camera.
    pub start: f32,
    /// Integration end distance from the camera.
    pub end: f32,
    pub samples: i32,
    pub shadow_samples: i32,
    /// Blend between linear (0) and exponential (1) sample spacing.
    pub sample_distribution: f32,
    /// Maximum light contribution. Zero disables clamping.
    pub light_clamp: f32,
    pub lights: bool,
    pub shadows: bool,
    /// Integrate RGB transmittance instead of a single channel.
    pub colored_transmittance: bool,
}

impl Default for VolumetricSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            start: 0.1,
            end: 100.0,
            samples: 64,
            shadow_samples: 16,
            sample_distribution: 0.8,
            light_clamp: 0.0,
            lights: true,
            shadows: true,
            colored_transmittance: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Ambient Occlusion
// ---------------------------------------------------------------------------

/// Ground-truth ambient occlusion parameters, consumed by the SSR trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientOcclusionSettings {
    pub distance: f32,
    pub samples: i32,
    pub factor: f32,
}

impl Default for AmbientOcclusionSettings {
    fn default() -> Self {
        Self {
            distance: 0.2,
            samples: 2,
            factor: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Debug View
// ---------------------------------------------------------------------------

/// Intermediate buffer routed to display instead of the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugView {
    /// Mip 0 of the Hi-Z min pyramid.
    HizMin,
    /// First SSR hit buffer.
    SsrHit,
    /// SSR normal input.
    SsrNormal,
    /// SSR specular color and roughness input.
    SsrSpecRough,
    /// Color history.
    ColorHistory,
}

impl DebugView {
    /// Maps a debug level to a view. Levels outside `1..=5` show the composite.
    #[must_use]
    pub fn from_level(level: i32) -> Option<Self> {
        match level {
            1 => Some(Self::HizMin),
            2 => Some(Self::SsrHit),
            3 => Some(Self::SsrNormal),
            4 => Some(Self::SsrSpecRough),
            5 => Some(Self::ColorHistory),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// EffectSettings
// ---------------------------------------------------------------------------

/// The full per-scene option set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectSettings {
    pub motion_blur: MotionBlurSettings,
    pub bloom: BloomSettings,
    pub dof: DepthOfFieldSettings,
    pub ssr: SsrSettings,
    pub volumetrics: VolumetricSettings,
    pub ambient_occlusion: AmbientOcclusionSettings,
    /// Selects a [`DebugView`]. Zero shows the composite.
    pub debug_level: i32,
}

impl EffectSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn debug_view(&self) -> Option<DebugView> {
        DebugView::from_level(self.debug_level)
    }
}

// ---------------------------------------------------------------------------
// PostFxConfig
// ---------------------------------------------------------------------------

/// Engine-wide limits, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostFxConfig {
    /// Upper bound of the bloom downsample chain.
    pub max_bloom_step: u32,
    /// Total Hi-Z pyramid levels, mip 0 included.
    pub hiz_max_levels: u32,
    /// Total levels of the pre-filtered color history, mip 0 included.
    pub history_max_levels: u32,
    /// Frames a released transient texture may sit unused before it is destroyed.
    pub transient_max_idle_frames: u32,
}

/// Default upper bound of the bloom chain.
pub const MAX_BLOOM_STEP: u32 = 16;
/// Reflection cubemap capacity, baked into every shader variant.
pub const MAX_PROBE: u32 = 32;
/// Irradiance grid capacity, baked into every shader variant.
pub const MAX_GRID: u32 = 64;
/// Planar reflection capacity, baked into every shader variant.
pub const MAX_PLANAR: u32 = 16;
/// Rays traced per pixel by screen-space reflections, at most.
pub const MAX_SSR_RAYS: i32 = 4;

impl Default for PostFxConfig {
    fn default() -> Self {
        Self {
            max_bloom_step: MAX_BLOOM_STEP,
            hiz_max_levels: 8,
            history_max_levels: 9,
            transient_max_idle_frames: 4,
        }
    }
}
