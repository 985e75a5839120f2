//! Frame Scheduler
//!
//! Records the post-processing chain and the color buffer ping-pong.
//!
//! ```text
//!             swap()                     swap()
//!   ┌──────────────────────┐   ┌──────────────────────┐
//!   │ source: Color        │──►│ source: ColorPost    │──► ...
//!   │ target: Effect fb    │◄──│ target: Main fb      │
//!   └──────────────────────┘   └──────────────────────┘
//! ```
//!
//! Each enabled effect reads `source_buffer`, writes `target_buffer`, and is
//! followed by one [`BufferSwapper::swap`]. When the frame keeps a color
//! history, the first swap (or the closing [`BufferSwapper::finish`] if no
//! effect ran) also exchanges `Color` with `ColorDoubleBuffer`, so the
//! history ends up holding the scene color before post-processing.

use super::passes::{BloomPasses, CommonPasses, DofPasses, MotionBlurPasses};
use super::recorder::Recorder;
use crate::errors::Result;
use crate::renderer::effects::{EffectFlags, EffectsState};
use crate::renderer::resources::{AttachPoint, FbSlot, TexSlot, TextureId};
use crate::settings::DebugView;

/// Which color buffer currently holds the latest result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapState {
    /// `Color` is the source; effects render into `ColorPost`.
    SourceIsMain,
    /// `ColorPost` is the source; effects render into `Color`.
    SourceIsPostBuffer,
}

/// Ping-pong state machine of one frame.
#[derive(Debug, Clone)]
pub struct BufferSwapper {
    state: SwapState,
    pending_exchange: bool,
    swaps: u32,
    exchanges: u32,
}

impl BufferSwapper {
    /// Resets `fx` to the initial roles. `double_buffer` arms the history
    /// exchange.
    #[must_use]
    pub fn begin(fx: &mut EffectsState, double_buffer: bool) -> Self {
        fx.reset_ping_pong();
        Self {
            state: SwapState::SourceIsMain,
            pending_exchange: double_buffer,
            swaps: 0,
            exchanges: 0,
        }
    }

    /// Called after every effect block that ran.
    pub fn swap(&mut self, rec: &mut Recorder<'_>, fx: &mut EffectsState) {
        self.swaps += 1;
        self.exchange_history(rec);

        self.state = match self.state {
            SwapState::SourceIsMain => {
                fx.source_buffer = TexSlot::ColorPost;
                fx.target_buffer = FbSlot::Main;
                SwapState::SourceIsPostBuffer
            }
            SwapState::SourceIsPostBuffer => {
                fx.source_buffer = TexSlot::Color;
                fx.target_buffer = FbSlot::Effect;
                SwapState::SourceIsMain
            }
        };
    }

    /// Closes the chain. Only the pending exchange, if any, happens here.
    pub fn finish(&mut self, rec: &mut Recorder<'_>) {
        self.exchange_history(rec);
    }

    fn exchange_history(&mut self, rec: &mut Recorder<'_>) {
        if std::mem::take(&mut self.pending_exchange) {
            rec.exchange(TexSlot::Color, TexSlot::ColorDoubleBuffer);
            self.exchanges += 1;
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> SwapState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn swaps(&self) -> u32 {
        self.swaps
    }

    #[inline]
    #[must_use]
    pub fn exchanges(&self) -> u32 {
        self.exchanges
    }
}

/// Passes `draw_effects` may run. Missing entries skip their block.
pub struct PostChain<'a> {
    pub common: Option<&'a CommonPasses>,
    pub motion_blur: Option<&'a MotionBlurPasses>,
    pub dof: Option<&'a DofPasses>,
    pub bloom: Option<&'a BloomPasses>,
}

/// What the post chain did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainOutcome {
    /// Texture sent to display, or that would have been.
    pub final_color: TextureId,
    /// Slot it was displayed from.
    pub displayed: TexSlot,
    pub swaps: u32,
    pub exchanges: u32,
    /// The host should render another frame to converge the history.
    pub redraw_requested: bool,
}

/// Records the post chain and the display.
pub fn draw_effects(
    rec: &mut Recorder<'_>,
    fx: &mut EffectsState,
    chain: &PostChain<'_>,
    debug: Option<DebugView>,
) -> Result<ChainOutcome> {
    let double_buffer = fx.is_enabled(EffectFlags::DOUBLE_BUFFER);
    let mut swapper = BufferSwapper::begin(fx, double_buffer);

    rec.detach(TexSlot::SceneDepth);

    if fx.is_enabled(EffectFlags::MOTION_BLUR)
        && let Some(passes) = chain.motion_blur
    {
        passes.record(rec, fx)?;
        swapper.swap(rec, fx);
    }
    if fx.is_enabled(EffectFlags::DOF)
        && let Some(passes) = chain.dof
    {
        passes.record(rec, fx)?;
        swapper.swap(rec, fx);
    }
    if fx.is_enabled(EffectFlags::BLOOM)
        && let Some(passes) = chain.bloom
    {
        passes.record(rec, fx)?;
        swapper.swap(rec, fx);
    }

    rec.attach(FbSlot::Default, AttachPoint::Depth, TexSlot::SceneDepth, 0);
    rec.bind(FbSlot::Default)?;

    let displayed = debug
        .map(debug_slot)
        .filter(|slot| rec.allocator().is_bound(*slot))
        .unwrap_or(fx.source_buffer);
    let final_color = rec.allocator().require_texture(displayed)?;
    match chain.common {
        Some(common) => common.display(rec, displayed)?,
        None => log::warn!("Display program unavailable, frame not presented"),
    }

    swapper.finish(rec);

    let redraw_requested = !fx.valid_double_buffer && double_buffer && !fx.image_render;
    fx.prev_view_projection = fx.view_projection;

    Ok(ChainOutcome {
        final_color,
        displayed,
        swaps: swapper.swaps(),
        exchanges: swapper.exchanges(),
        redraw_requested,
    })
}

/// Buffer a debug view shows.
#[must_use]
pub fn debug_slot(view: DebugView) -> TexSlot {
    match view {
        DebugView::HizMin => TexSlot::MinZ,
        DebugView::SsrHit => TexSlot::SsrHit(0),
        DebugView::SsrNormal => TexSlot::SsrNormalInput,
        DebugView::SsrSpecRough => TexSlot::SsrSpecRoughInput,
        DebugView::ColorHistory => TexSlot::ColorDoubleBuffer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::HeadlessBackend;
    use crate::renderer::graph::commands::CommandList;
    use crate::renderer::resources::{ResourceAllocator, TexFormat, TextureDesc, TextureFlags};

    fn allocator_with_history(backend: &mut HeadlessBackend) -> ResourceAllocator {
        let mut alloc = ResourceAllocator::new();
        let desc = TextureDesc::new(8, 8, TexFormat::Rgba16, TextureFlags::FILTER);
        alloc.ensure_texture(backend, TexSlot::Color, desc).unwrap();
        alloc
            .ensure_texture(backend, TexSlot::ColorDoubleBuffer, desc)
            .unwrap();
        alloc
    }

    #[test]
    fn swaps_alternate_roles() {
        let mut backend = HeadlessBackend::new();
        let mut alloc = allocator_with_history(&mut backend);
        let mut commands = CommandList::new();
        let mut rec = Recorder::new(&mut alloc, &mut commands, (8, 8));
        let mut fx = EffectsState::new();

        let mut swapper = BufferSwapper::begin(&mut fx, false);
        swapper.swap(&mut rec, &mut fx);
        assert_eq!(swapper.state(), SwapState::SourceIsPostBuffer);
        assert_eq!(fx.source_buffer, TexSlot::ColorPost);
        assert_eq!(fx.target_buffer, FbSlot::Main);

        swapper.swap(&mut rec, &mut fx);
        assert_eq!(fx.source_buffer, TexSlot::Color);
        assert_eq!(fx.target_buffer, FbSlot::Effect);
        swapper.finish(&mut rec);
        assert_eq!(swapper.exchanges(), 0);
    }

    #[test]
    fn history_is_exchanged_exactly_once() {
        let mut backend = HeadlessBackend::new();
        let mut alloc = allocator_with_history(&mut backend);
        let color = alloc.texture(TexSlot::Color).unwrap();
        let history = alloc.texture(TexSlot::ColorDoubleBuffer).unwrap();

        let mut commands = CommandList::new();
        let mut rec = Recorder::new(&mut alloc, &mut commands, (8, 8));
        let mut fx = EffectsState::new();
        let mut swapper = BufferSwapper::begin(&mut fx, true);
        for _ in 0..3 {
            swapper.swap(&mut rec, &mut fx);
        }
        swapper.finish(&mut rec);
        assert_eq!(swapper.swaps(), 3);
        assert_eq!(swapper.exchanges(), 1);

        assert_eq!(alloc.texture(TexSlot::Color), Some(history));
        assert_eq!(alloc.texture(TexSlot::ColorDoubleBuffer), Some(color));
    }

    #[test]
    fn finish_exchanges_when_no_effect_ran() {
        let mut backend = HeadlessBackend::new();
        let mut alloc = allocator_with_history(&mut backend);
        let color = alloc.texture(TexSlot::Color).unwrap();

        let mut commands = CommandList::new();
        let mut rec = Recorder::new(&mut alloc, &mut commands, (8, 8));
        let mut fx = EffectsState::new();
        let mut swapper = BufferSwapper::begin(&mut fx, true);
        swapper.finish(&mut rec);
        assert_eq!(swapper.exchanges(), 1);
        assert_eq!(fx.source_buffer, TexSlot::Color);
        assert_eq!(alloc.texture(TexSlot::ColorDoubleBuffer), Some(color));
    }
}
