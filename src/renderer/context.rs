//! Frame inputs supplied by the host.
//!
//! The post-processing pipeline treats the scene, the camera and the world
//! material as black boxes. Each frame the host fills a [`FrameInput`] with
//! the matrices, lens data and counters the effects need.
//!
//! Projection matrices follow the `wgpu` clip convention (depth in `[0, 1]`).

use std::borrow::Cow;

use glam::Mat4;

use crate::settings::EffectSettings;

/// Physical lens of the active camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraLens {
    /// Near clip distance, positive.
    pub clip_start: f32,
    /// Far clip distance, positive.
    pub clip_end: f32,
    /// Focal length in millimetres.
    pub focal_length: f32,
    /// Sensor size along the fitted axis, in millimetres.
    pub sensor_size: f32,
    /// Distance to the focus plane in scene units.
    pub focus_distance: f32,
    /// Horizontal scale from the viewport to the camera frame. `1.0` when the
    /// camera frame fills the viewport.
    pub frame_scale: f32,
}

impl Default for CameraLens {
    fn default() -> Self {
        Self {
            clip_start: 0.1,
            clip_end: 100.0,
            focal_length: 50.0,
            sensor_size: 36.0,
            focus_distance: 10.0,
            frame_scale: 1.0,
        }
    }
}

/// An animated camera the effects can re-evaluate.
pub trait CameraRig {
    /// World-to-clip matrix of the camera at scene time `time`.
    fn view_projection_at(&self, time: f32) -> Mat4;

    fn lens(&self) -> CameraLens;
}

/// A world material that participates in volumetric integration.
///
/// `shader_code` must define
/// `fn volume_properties(world_pos: vec3<f32>) -> VolumeProperties`.
pub trait WorldVolume {
    /// Changes whenever `shader_code` changes. Compiled programs are cached
    /// per id.
    fn id(&self) -> u64;

    fn shader_code(&self) -> Cow<'_, str>;
}

/// The view being rendered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub width: u32,
    pub height: u32,
    /// Live world-to-clip matrix.
    pub view_projection: Mat4,
    pub projection: Mat4,
    /// The view looks through the scene camera.
    pub camera_view: bool,
}

impl ViewState {
    #[must_use]
    pub fn new(width: u32, height: u32, view: Mat4, projection: Mat4) -> Self {
        Self {
            width,
            height,
            view_projection: projection * view,
            projection,
            camera_view: false,
        }
    }

    #[must_use]
    pub fn through_camera(mut self) -> Self {
        self.camera_view = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn is_perspective(&self) -> bool {
        self.projection.w_axis.w == 0.0
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width.max(1), self.height.max(1))
    }
}

/// Scene-level data for one frame.
#[derive(Clone, Copy, Default)]
pub struct SceneState<'a> {
    /// Current scene time, in frames.
    pub frame_time: f32,
    /// Metres per scene unit when a unit system is active.
    pub unit_scale: Option<f32>,
    pub light_count: i32,
    pub probe_count: i32,
    pub planar_count: i32,
    pub grid_count: i32,
    pub lod_cube_max: f32,
    pub lod_planar_max: f32,
    pub world_volume: Option<&'a dyn WorldVolume>,
}

/// Everything the pipeline reads for one frame.
#[derive(Clone, Copy)]
pub struct FrameInput<'a> {
    pub settings: &'a EffectSettings,
    pub view: ViewState,
    pub camera: Option<&'a dyn CameraRig>,
    pub scene: SceneState<'a>,
    /// Rendering a final image rather than an interactive preview.
    pub image_render: bool,
}

impl<'a> FrameInput<'a> {
    #[must_use]
    pub fn new(settings: &'a EffectSettings, view: ViewState) -> Self {
        Self {
            settings,
            view,
            camera: None,
            scene: SceneState::default(),
            image_render: false,
        }
    }

    /// The active camera, when the view looks through it.
    #[must_use]
    pub fn active_camera(&self) -> Option<&'a dyn CameraRig> {
        self.camera.filter(|_| self.view.camera_view)
    }
}
