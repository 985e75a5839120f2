//! Effect passes.
//!
//! Each module declares the passes of one effect (`build`) and records the
//! effect's block of the frame (`record`). Building compiles programs and
//! fixes the pass topology; recording only retargets indirections and
//! attachments.

mod bloom;
mod common;
mod dof;
mod hiz;
mod motion_blur;
mod ssr;
mod volumetric;

pub use bloom::BloomPasses;
pub use common::{CommonPasses, DisplayProgram};
pub use dof::DofPasses;
pub use hiz::HizPasses;
pub use motion_blur::MotionBlurPasses;
pub use ssr::SsrPasses;
pub use volumetric::VolumetricPasses;
