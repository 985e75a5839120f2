//! Shader variant keys.
//!
//! A [`ShaderKey`] pairs a [`Program`] (one template) with the
//! [`ShaderVariant`] defines it is rendered with. Keys are small and `Copy`,
//! so the cache can key directly on them.

use bitflags::bitflags;

/// A post-processing program template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Program {
    /// Single-texture box downsample.
    Downsample,
    /// Hi-Z min/max copy and reduction.
    MinMaxZ,
    /// World volume integration (`STEP_INTEGRATE`) and upsample (`STEP_UPSAMPLE`).
    Volumetric,
    MotionBlur,
    Bloom,
    DepthOfField,
    ScreenSpaceReflection,
    /// Final blit to the host display target.
    Display,
}

impl Program {
    /// Template file name, without extension.
    #[must_use]
    pub fn template_name(self) -> &'static str {
        match self {
            Self::Downsample => "downsample",
            Self::MinMaxZ => "minmaxz",
            Self::Volumetric => "volumetric",
            Self::MotionBlur => "motion_blur",
            Self::Bloom => "bloom",
            Self::DepthOfField => "dof",
            Self::ScreenSpaceReflection => "ssr",
            Self::Display => "display",
        }
    }
}

bitflags! {
    /// Variant defines. Each set flag becomes a boolean template variable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct ShaderVariant: u32 {
        const MIN_PASS        = 1 << 0;
        const MAX_PASS        = 1 << 1;
        const INPUT_DEPTH     = 1 << 2;
        const LAYERED         = 1 << 3;

        const STEP_BLIT       = 1 << 5;
        const STEP_DOWNSAMPLE = 1 << 6;
        const STEP_UPSAMPLE   = 1 << 7;
        const STEP_RESOLVE    = 1 << 8;
        const STEP_SCATTER    = 1 << 9;
        const STEP_RAYTRACE   = 1 << 10;
        const STEP_INTEGRATE  = 1 << 11;

        const HIGH_QUALITY    = 1 << 12;
        const FULL_RES        = 1 << 13;

        const VOLUME_LIGHTS   = 1 << 14;
        const VOLUME_SHADOWS  = 1 << 15;
        const COLORED_TRANSMITTANCE = 1 << 16;
    }
}

impl ShaderVariant {
    /// `(name, defined)` pairs for every flag, in declaration order.
    pub fn defines(self) -> impl Iterator<Item = (&'static str, bool)> {
        Self::all()
            .iter_names()
            .map(move |(name, flag)| (name, self.contains(flag)))
    }
}

/// Identity of one compiled program variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderKey {
    pub program: Program,
    pub variant: ShaderVariant,
}

impl ShaderKey {
    #[inline]
    #[must_use]
    pub const fn new(program: Program, variant: ShaderVariant) -> Self {
        Self { program, variant }
    }

    #[inline]
    #[must_use]
    pub const fn plain(program: Program) -> Self {
        Self::new(program, ShaderVariant::empty())
    }

    /// SSR: `resolve` selects the resolve step over the raytrace step.
    #[must_use]
    pub fn ssr(resolve: bool, full_res: bool) -> Self {
        let mut variant = if resolve {
            ShaderVariant::STEP_RESOLVE
        } else {
            ShaderVariant::STEP_RAYTRACE
        };
        variant.set(ShaderVariant::FULL_RES, full_res);
        Self::new(Program::ScreenSpaceReflection, variant)
    }

    #[must_use]
    pub fn bloom(step: ShaderVariant, high_quality: bool) -> Self {
        let mut variant = step;
        variant.set(ShaderVariant::HIGH_QUALITY, high_quality);
        Self::new(Program::Bloom, variant)
    }

    /// Hi-Z: `min` picks the min reduction. `copy` seeds the half-resolution
    /// mip 0 from a full-resolution depth texture, optionally a single
    /// `layered` slice.
    #[must_use]
    pub fn minmaxz(min: bool, copy: bool, layered: bool) -> Self {
        let mut variant = if min {
            ShaderVariant::MIN_PASS
        } else {
            ShaderVariant::MAX_PASS
        };
        if copy {
            variant |= ShaderVariant::INPUT_DEPTH;
            variant.set(ShaderVariant::LAYERED, layered);
        }
        Self::new(Program::MinMaxZ, variant)
    }

    /// Human-readable label used for backend objects and diagnostics.
    #[must_use]
    pub fn label(&self) -> String {
        let names: Vec<&str> = self.variant.iter_names().map(|(n, _)| n).collect();
        if names.is_empty() {
            self.program.template_name().to_string()
        } else {
            format!("{}[{}]", self.program.template_name(), names.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssr_variants_are_distinct() {
        let keys = [
            ShaderKey::ssr(false, false),
            ShaderKey::ssr(false, true),
            ShaderKey::ssr(true, false),
            ShaderKey::ssr(true, true),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn copy_variant_carries_input_depth() {
        let key = ShaderKey::minmaxz(true, true, true);
        assert!(key.variant.contains(
            ShaderVariant::MIN_PASS | ShaderVariant::INPUT_DEPTH | ShaderVariant::LAYERED
        ));
        assert!(!ShaderKey::minmaxz(true, false, true)
            .variant
            .contains(ShaderVariant::LAYERED));
    }

    #[test]
    fn label_lists_defines() {
        assert_eq!(ShaderKey::plain(Program::Downsample).label(), "downsample");
        assert_eq!(
            ShaderKey::bloom(ShaderVariant::STEP_BLIT, true).label(),
            "bloom[STEP_BLIT,HIGH_QUALITY]"
        );
    }
}
