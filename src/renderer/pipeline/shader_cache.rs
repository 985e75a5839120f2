//! Shader Variant Cache
//!
//! Compile-once memoization of program variants, owned by the engine.
//!
//! ```text
//!   get_or_compile(key)
//!       │
//!       ├── Ready(handle) ──► Some(handle)
//!       ├── Failed        ──► None            (never retried)
//!       └── miss ──► library.render ──► backend.compile_program
//!                        └── error ──► Failed, warn once
//! ```
//!
//! Entries are never invalidated while the engine runs. [`ShaderVariantCache::teardown`]
//! destroys every compiled program at shutdown.
//!
//! Programs that embed host material code (the world volume) are keyed by
//! the variant *and* the material id, so a changed material compiles a new
//! entry instead of replacing an old one.

use minijinja::Value;
use rustc_hash::FxHashMap;

use super::interface::ShaderInterface;
use super::shader_key::ShaderKey;
use super::shader_library::ShaderLibrary;
use crate::renderer::backend::{GpuBackend, ProgramHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheEntry {
    Ready(ProgramHandle),
    Failed,
}

impl CacheEntry {
    #[inline]
    fn handle(self) -> Option<ProgramHandle> {
        match self {
            Self::Ready(handle) => Some(handle),
            Self::Failed => None,
        }
    }
}

#[derive(Default)]
pub struct ShaderVariantCache {
    entries: FxHashMap<ShaderKey, CacheEntry>,
    materials: FxHashMap<(ShaderKey, u64), CacheEntry>,
    compile_count: usize,
}

impl ShaderVariantCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the program for `key`, compiling it on first request.
    ///
    /// `None` means the variant failed to render or compile; the failure is
    /// remembered and logged only once.
    pub fn get_or_compile(
        &mut self,
        backend: &mut dyn GpuBackend,
        library: &ShaderLibrary,
        key: ShaderKey,
        interface: &ShaderInterface,
    ) -> Option<ProgramHandle> {
        if let Some(entry) = self.entries.get(&key) {
            return entry.handle();
        }

        self.compile_count += 1;
        let label = key.label();
        let compiled = library
            .render(&key, interface)
            .and_then(|source| backend.compile_program(&label, &source, interface));

        let entry = Self::entry_from(&label, compiled);
        self.entries.insert(key, entry);
        entry.handle()
    }

    /// Like [`Self::get_or_compile`] for a variant that embeds host material
    /// code, exposed to the template as `material_code`.
    pub fn get_or_compile_material(
        &mut self,
        backend: &mut dyn GpuBackend,
        library: &ShaderLibrary,
        key: ShaderKey,
        material_id: u64,
        material_code: &str,
        interface: &ShaderInterface,
    ) -> Option<ProgramHandle> {
        if let Some(entry) = self.materials.get(&(key, material_id)) {
            return entry.handle();
        }

        self.compile_count += 1;
        let label = format!("{}#{material_id}", key.label());
        let compiled = library
            .render_with(
                &key,
                interface,
                &[("material_code", Value::from(material_code))],
            )
            .and_then(|source| backend.compile_program(&label, &source, interface));

        let entry = Self::entry_from(&label, compiled);
        self.materials.insert((key, material_id), entry);
        entry.handle()
    }

    fn entry_from(label: &str, compiled: crate::errors::Result<ProgramHandle>) -> CacheEntry {
        match compiled {
            Ok(handle) => {
                log::debug!("Compiled shader variant {label}");
                CacheEntry::Ready(handle)
            }
            Err(e) => {
                log::warn!("Shader variant {label} unavailable: {e}");
                CacheEntry::Failed
            }
        }
    }

    #[must_use]
    pub fn contains(&self, key: &ShaderKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Compilation attempts so far, failures included.
    #[must_use]
    pub fn compile_count(&self) -> usize {
        self.compile_count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len() + self.materials.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.materials.is_empty()
    }

    /// Destroys every compiled program.
    pub fn teardown(&mut self, backend: &mut dyn GpuBackend) {
        let entries = self.entries.drain().map(|(_, e)| e);
        let materials = self.materials.drain().map(|(_, e)| e);
        for handle in entries.chain(materials).filter_map(CacheEntry::handle) {
            backend.destroy_program(handle);
        }
    }
}
