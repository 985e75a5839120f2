//! Shader Template Library
//!
//! Renders WGSL program variants from minijinja templates embedded in the
//! binary.
//!
//! Templates use the engine's custom syntax so they stay readable next to
//! WGSL braces:
//!
//! | Construct | Syntax |
//! |-----------|--------|
//! | Block     | `{$ if STEP_BLIT $} ... {$ endif $}` |
//! | Variable  | `{{ binding_code }}` |
//! | Line      | `$$ if HIGH_QUALITY` |
//!
//! Every variant sees its [`ShaderVariant`](super::ShaderVariant) flags as
//! booleans, the global capacity constants (`MAX_PROBE`, `MAX_GRID`,
//! `MAX_PLANAR`, `MAX_BLOOM_STEP`), and the generated `binding_code`.

use std::borrow::Cow;
use std::collections::BTreeMap;

use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, Error, ErrorKind, Value};
use rust_embed::RustEmbed;

use super::interface::ShaderInterface;
use super::shader_key::ShaderKey;
use crate::errors::Result;
use crate::settings::{MAX_GRID, MAX_PLANAR, MAX_PROBE};

#[derive(RustEmbed)]
#[folder = "src/renderer/pipeline/shaders"]
struct ShaderAssets;

fn embedded_loader(name: &str) -> std::result::Result<Option<String>, Error> {
    let filename = if std::path::Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wgsl"))
    {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.wgsl"))
    };

    match ShaderAssets::get(&filename) {
        Some(file) => std::str::from_utf8(file.data.as_ref())
            .map(|s| Some(s.to_string()))
            .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("{filename}: {e}"))),
        None => Ok(None),
    }
}

/// Template environment owned by the engine.
pub struct ShaderLibrary {
    env: Environment<'static>,
    max_bloom_step: u32,
}

impl ShaderLibrary {
    /// Library backed by the embedded templates.
    pub fn new(max_bloom_step: u32) -> Result<Self> {
        let mut env = Self::base_env()?;
        env.set_loader(embedded_loader);
        env.set_path_join_callback(|name, _parent| format!("chunks/{name}").into());
        Ok(Self {
            env,
            max_bloom_step,
        })
    }

    /// Library backed by in-memory templates, keyed by template name.
    pub fn from_sources(
        sources: impl IntoIterator<Item = (&'static str, String)>,
        max_bloom_step: u32,
    ) -> Result<Self> {
        let mut env = Self::base_env()?;
        for (name, source) in sources {
            env.add_template_owned(name, source)?;
        }
        Ok(Self {
            env,
            max_bloom_step,
        })
    }

    fn base_env() -> Result<Environment<'static>> {
        let mut env = Environment::new();
        let syntax = SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()?;
        env.set_syntax(syntax);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(minijinja::UndefinedBehavior::SemiStrict);
        Ok(env)
    }

    /// Renders the WGSL source of one variant.
    pub fn render(&self, key: &ShaderKey, interface: &ShaderInterface) -> Result<String> {
        self.render_with(key, interface, &[])
    }

    /// Renders a variant with additional template variables, such as host
    /// material code.
    pub fn render_with(
        &self,
        key: &ShaderKey,
        interface: &ShaderInterface,
        extra: &[(&'static str, Value)],
    ) -> Result<String> {
        let template = self.env.get_template(key.program.template_name())?;

        let mut ctx: BTreeMap<&str, Value> = key
            .variant
            .defines()
            .map(|(name, on)| (name, Value::from(on)))
            .collect();
        ctx.insert("MAX_PROBE", Value::from(MAX_PROBE));
        ctx.insert("MAX_GRID", Value::from(MAX_GRID));
        ctx.insert("MAX_PLANAR", Value::from(MAX_PLANAR));
        ctx.insert("MAX_BLOOM_STEP", Value::from(self.max_bloom_step));
        ctx.insert("binding_code", Value::from(interface.binding_code()));
        for (name, value) in extra {
            ctx.insert(*name, value.clone());
        }

        let source = template.render(ctx)?;
        Ok(format!("// {}\n{source}", key.label()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::pipeline::interface::SampleKind;
    use crate::renderer::pipeline::shader_key::{Program, ShaderVariant};

    fn library() -> ShaderLibrary {
        ShaderLibrary::from_sources(
            [(
                "bloom",
                "{{ binding_code }}\n$$ if STEP_BLIT\nblit\n$$ endif\n{$ if HIGH_QUALITY $}hq{$ endif $} {{ MAX_BLOOM_STEP }}"
                    .to_string(),
            )],
            16,
        )
        .unwrap()
    }

    #[test]
    fn variant_flags_drive_template_branches() {
        let lib = library();
        let iface = ShaderInterface {
            textures: vec![("source", SampleKind::Color)],
            ..Default::default()
        };
        let src = lib
            .render(&ShaderKey::bloom(ShaderVariant::STEP_BLIT, true), &iface)
            .unwrap();
        assert!(src.contains("blit"));
        assert!(src.contains("hq 16"));
        assert!(src.contains("var source: texture_2d<f32>;"));

        let src = lib
            .render(&ShaderKey::bloom(ShaderVariant::STEP_DOWNSAMPLE, false), &iface)
            .unwrap();
        assert!(!src.contains("blit"));
        assert!(!src.contains("hq"));
    }

    #[test]
    fn extra_variables_reach_the_template() {
        let lib = ShaderLibrary::from_sources(
            [("volumetric", "{{ volume_code }}".to_string())],
            16,
        )
        .unwrap();
        let src = lib
            .render_with(
                &ShaderKey::new(Program::Volumetric, ShaderVariant::STEP_INTEGRATE),
                &ShaderInterface::default(),
                &[("volume_code", Value::from("fn volume_properties() {}"))],
            )
            .unwrap();
        assert!(src.contains("fn volume_properties() {}"));
    }

    #[test]
    fn missing_template_is_an_error() {
        let lib = library();
        assert!(lib
            .render(&ShaderKey::plain(Program::Display), &ShaderInterface::default())
            .is_err());
    }
}
