//! Recursive Downsample Driver
//!
//! Builds a mip chain in place: for each level the *same* texture's next mip
//! is attached to the framebuffer, sampling is restricted to the previous
//! mip, and a caller-supplied draw renders the reduction.
//!
//! ```text
//!   level 0 ──draw(1)──► level 1 ──draw(2)──► level 2 ... ──► 1×1 or cap
//! ```
//!
//! Hi-Z min/max pyramids and color history pre-filtering use the same
//! driver; only the draw differs.

use super::recorder::Recorder;
use crate::errors::{PostFxError, Result};
use crate::renderer::resources::{AttachPoint, FbSlot, TexSlot, mip_extent};

/// Extents of the levels a chain of at most `max_levels` (mip 0 included)
/// holds for a `width`×`height` base.
fn level_extents(width: u32, height: u32, max_levels: u32) -> Vec<(u32, u32)> {
    let mut levels = Vec::new();
    for level in 0..max_levels {
        let extent = mip_extent(width, height, level);
        levels.push(extent);
        if extent == (1, 1) {
            break;
        }
    }
    levels
}

/// Renders mips `1..` of `tex` through `fb`.
///
/// `max_levels` counts mip 0, and the chain is further capped by the mips
/// the texture was created with. Returns the number of valid levels, mip 0
/// included. `fb` is emptied first and `tex` is detached on return.
pub fn recursive_downsample<F>(
    rec: &mut Recorder<'_>,
    fb: FbSlot,
    tex: TexSlot,
    max_levels: u32,
    mut draw: F,
) -> Result<u32>
where
    F: FnMut(&mut Recorder<'_>, u32) -> Result<()>,
{
    let desc = *rec
        .allocator()
        .desc(tex)
        .ok_or_else(|| PostFxError::UnboundTexture(tex.to_string()))?;
    let point = if desc.format.is_depth() {
        AttachPoint::Depth
    } else {
        AttachPoint::Color(0)
    };

    rec.detach_all(fb);
    let extents = level_extents(
        desc.width,
        desc.height,
        max_levels.min(desc.mip_level_count()),
    );
    let levels = extents.len().max(1) as u32;
    for level in 1..levels {
        rec.restrict_lod(tex, level - 1);
        rec.attach(fb, point, tex, level);
        rec.bind(fb)?;
        draw(rec, level)?;
    }

    rec.clear_lod_restriction();
    rec.detach(tex);
    Ok(levels)
}
