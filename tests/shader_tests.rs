//! Shader Template Tests
//!
//! Tests for:
//! - Every embedded template rendering for the variants the passes use
//! - Generated binding code ordering
//! - A frame with every effect compiling all of its programs

use std::borrow::Cow;

use glam::{Mat4, Vec3};
use minijinja::Value;
use myth_postfx::renderer::pipeline::{
    Program, SampleKind, ShaderInterface, ShaderKey, ShaderLibrary, ShaderVariant, UniformType,
};
use myth_postfx::{
    CameraLens, CameraRig, EffectFlags, EffectSettings, FrameInput, HeadlessBackend, PostFxConfig,
    PostFxEngine, ViewState, WorldVolume,
};

fn library() -> ShaderLibrary {
    ShaderLibrary::new(PostFxConfig::default().max_bloom_step).unwrap()
}

fn used_keys() -> Vec<ShaderKey> {
    let mut keys = vec![
        ShaderKey::plain(Program::Downsample),
        ShaderKey::plain(Program::MotionBlur),
        ShaderKey::plain(Program::Display),
        ShaderKey::new(Program::Display, ShaderVariant::INPUT_DEPTH),
        ShaderKey::new(Program::DepthOfField, ShaderVariant::STEP_DOWNSAMPLE),
        ShaderKey::new(Program::DepthOfField, ShaderVariant::STEP_SCATTER),
        ShaderKey::new(Program::DepthOfField, ShaderVariant::STEP_RESOLVE),
        ShaderKey::new(Program::Volumetric, ShaderVariant::STEP_UPSAMPLE),
        ShaderKey::new(
            Program::Volumetric,
            ShaderVariant::STEP_UPSAMPLE | ShaderVariant::COLORED_TRANSMITTANCE,
        ),
    ];
    for min in [true, false] {
        keys.push(ShaderKey::minmaxz(min, false, false));
        keys.push(ShaderKey::minmaxz(min, true, false));
        keys.push(ShaderKey::minmaxz(min, true, true));
    }
    for hq in [true, false] {
        for step in [
            ShaderVariant::STEP_BLIT,
            ShaderVariant::STEP_DOWNSAMPLE,
            ShaderVariant::STEP_UPSAMPLE,
            ShaderVariant::STEP_RESOLVE,
        ] {
            keys.push(ShaderKey::bloom(step, hq));
        }
    }
    for full_res in [true, false] {
        keys.push(ShaderKey::ssr(false, full_res));
        keys.push(ShaderKey::ssr(true, full_res));
    }
    keys
}

#[test]
fn every_template_variant_renders() {
    let lib = library();
    let iface = ShaderInterface::default();
    for key in used_keys() {
        let source = lib
            .render(&key, &iface)
            .unwrap_or_else(|e| panic!("{} failed to render: {e}", key.label()));
        assert!(source.contains("@fragment"), "{} has no fragment stage", key.label());
        assert!(source.contains("@vertex"), "{} has no vertex stage", key.label());
        assert!(!source.contains("{$"), "{} left a block tag", key.label());
        assert!(!source.contains("$$"), "{} left a line statement", key.label());
    }
}

#[test]
fn integration_variants_embed_material_code() {
    let lib = library();
    let code = "fn volume_properties(world_pos: vec3<f32>) -> VolumeProperties { var p: VolumeProperties; return p; }";
    for lights in [true, false] {
        for shadows in [true, false] {
            for colored in [true, false] {
                let mut variant = ShaderVariant::STEP_INTEGRATE;
                variant.set(ShaderVariant::VOLUME_LIGHTS, lights);
                variant.set(ShaderVariant::VOLUME_SHADOWS, shadows);
                variant.set(ShaderVariant::COLORED_TRANSMITTANCE, colored);
                let key = ShaderKey::new(Program::Volumetric, variant);
                let source = lib
                    .render_with(
                        &key,
                        &ShaderInterface::default(),
                        &[("material_code", Value::from(code))],
                    )
                    .unwrap();
                assert!(source.contains(code));
                assert!(source.contains("struct VolumeProperties"));
            }
        }
    }
}

#[test]
fn variant_defines_select_code_paths() {
    let lib = library();
    let iface = ShaderInterface::default();
    let hq = lib
        .render(&ShaderKey::bloom(ShaderVariant::STEP_DOWNSAMPLE, true), &iface)
        .unwrap();
    let lq = lib
        .render(&ShaderKey::bloom(ShaderVariant::STEP_DOWNSAMPLE, false), &iface)
        .unwrap();
    assert_ne!(hq, lq);
    assert!(hq.starts_with("// bloom[STEP_DOWNSAMPLE,HIGH_QUALITY]"));
}

#[test]
fn binding_code_follows_interface_order() {
    let iface = ShaderInterface {
        textures: vec![
            ("color_buffer", SampleKind::Color),
            ("depth_buffer", SampleKind::Depth),
        ],
        uniforms: vec![("samples", UniformType::Int), ("past_view_proj", UniformType::Mat4)],
        ..Default::default()
    };
    let code = iface.binding_code();
    let color = code.find("var color_buffer").unwrap();
    let depth = code.find("var depth_buffer").unwrap();
    let sampler = code.find("var samp").unwrap();
    let params = code.find("var<uniform> u").unwrap();
    assert!(color < depth);
    assert!(depth < sampler);
    assert!(sampler < params);
    assert!(code.contains("texture_depth_2d"));
}

// ============================================================================
// Whole-frame compilation
// ============================================================================

struct FixedCamera(Mat4);

impl CameraRig for FixedCamera {
    fn view_projection_at(&self, _time: f32) -> Mat4 {
        self.0
    }

    fn lens(&self) -> CameraLens {
        CameraLens::default()
    }
}

struct UniformFog;

impl WorldVolume for UniformFog {
    fn id(&self) -> u64 {
        3
    }

    fn shader_code(&self) -> Cow<'_, str> {
        Cow::Borrowed(
            "fn volume_properties(world_pos: vec3<f32>) -> VolumeProperties {
    return VolumeProperties(vec3<f32>(0.05), vec3<f32>(0.01), vec3<f32>(0.0), 0.0);
}",
        )
    }
}

#[test]
fn every_effect_compiles_in_one_frame() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut engine = PostFxEngine::new(HeadlessBackend::new(), PostFxConfig::default()).unwrap();
    let viewport = engine.create_viewport();

    let settings = EffectSettings::from_json_str(
        r#"{
            "motion_blur": { "enabled": true },
            "bloom": { "enabled": true },
            "dof": { "enabled": true },
            "ssr": { "enabled": true, "ray_count": 3 },
            "volumetrics": { "enabled": true }
        }"#,
    )
    .unwrap();

    let view = ViewState::new(
        256,
        128,
        Mat4::look_at_rh(Vec3::new(0.0, 2.0, 6.0), Vec3::ZERO, Vec3::Y),
        Mat4::perspective_rh(0.9, 2.0, 0.1, 50.0),
    )
    .through_camera();
    let camera = FixedCamera(view.view_projection);
    let fog = UniformFog;
    let mut input = FrameInput::new(&settings, view);
    input.camera = Some(&camera);
    input.scene.world_volume = Some(&fog);

    for _ in 0..2 {
        let out = engine.render_frame(viewport, &input).unwrap();
        assert_eq!(
            out.enabled,
            EffectFlags::all(),
            "some effect failed to build"
        );
        assert_eq!(out.swaps, 3);
        assert_eq!(out.exchanges, 1);
    }
    assert!(engine.shader_cache().compile_count() > 0);
    assert_eq!(
        engine.shader_cache().compile_count(),
        engine.backend().compiled_program_count()
    );
}
