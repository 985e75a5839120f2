//! Error Types
//!
//! This module defines the error types used throughout the post-processing
//! pipeline.
//!
//! # Overview
//!
//! The frame pipeline itself never fails for content reasons: a shader that
//! does not compile clears the owning effect for the frame, a missing camera
//! skips the camera-driven effects, and invalid temporal history falls back
//! to a sentinel clear. [`PostFxError`] therefore only surfaces from:
//!
//! - setup APIs (engine construction, settings loading, resource import)
//! - backends that detect a broken command stream on submit
//!
//! # Usage
//!
//! ```rust,ignore
//! use myth_postfx::errors::{PostFxError, Result};
//!
//! fn load() -> Result<EffectSettings> {
//!     EffectSettings::load("effects.json")
//! }
//! ```

use thiserror::Error;

/// The main error type for the post-processing pipeline.
#[derive(Error, Debug)]
pub enum PostFxError {
    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// A shader template could not be loaded or rendered.
    #[error("Shader template error: {0}")]
    Template(#[from] minijinja::Error),

    /// The backend rejected a generated shader.
    #[error("Shader compilation failed for '{program}': {message}")]
    ShaderCompilation {
        /// Label of the program variant that failed
        program: String,
        /// Compiler diagnostics
        message: String,
    },

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// A texture slot was referenced while nothing is bound to it.
    #[error("Texture slot {0} is not allocated")]
    UnboundTexture(String),

    /// A framebuffer slot was bound before it was created.
    #[error("Framebuffer slot {0} is not allocated")]
    UnboundFramebuffer(String),

    /// A texture id reached the backend without a physical texture behind it.
    #[error("Backend has no texture for {0}")]
    UnknownTexture(String),

    /// A viewport handle was used after release.
    #[error("Viewport {0} does not exist")]
    UnknownViewport(String),

    /// A program handle reached the backend after teardown.
    #[error("Backend has no program for {0}")]
    UnknownProgram(String),

    // ========================================================================
    // Command Stream Errors
    // ========================================================================
    /// A draw samples a texture mip that is also a render target.
    #[error("Feedback loop in pass '{pass}': {texture} is sampled while attached")]
    FeedbackLoop {
        /// Pass issuing the draw
        pass: String,
        /// The offending texture
        texture: String,
    },

    /// A draw or clear was recorded with no framebuffer bound.
    #[error("'{0}' was recorded without a bound framebuffer")]
    NoBoundFramebuffer(String),

    /// The display step ran before the host supplied a display target.
    #[error("No display target has been set")]
    MissingDisplayTarget,

    /// The device reported a validation or out-of-memory error.
    #[error("GPU device error: {0}")]
    Device(String),

    // ========================================================================
    // Settings Errors
    // ========================================================================
    /// Effect settings could not be (de)serialized.
    #[error("Settings parse error: {0}")]
    SettingsParse(#[from] serde_json::Error),

    /// File I/O error while loading or saving settings.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Alias for `Result<T, PostFxError>`.
pub type Result<T> = std::result::Result<T, PostFxError>;
