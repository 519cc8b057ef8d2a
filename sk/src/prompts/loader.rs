//! Prompt Loader
//!
//! Loads prompt templates from the override directory or falls back to
//! embedded defaults, and renders them with Handlebars.

use std::path::{Path, PathBuf};

use eyre::{Context, Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, info};

use super::embedded;
use crate::config::PromptsConfig;
use crate::domain::DecisionRequest;

/// Every template the service renders
pub const TEMPLATE_NAMES: [&str; 4] = ["orchestrator", "worker", "synthesis", "chat"];

/// The decision fields shared by every template
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DecisionView<'a> {
    pub context: &'a str,
    pub preferences: &'a [String],
    pub constraints: &'a [String],
}

impl<'a> From<&'a DecisionRequest> for DecisionView<'a> {
    fn from(request: &'a DecisionRequest) -> Self {
        Self {
            context: &request.context,
            preferences: &request.preferences,
            constraints: &request.constraints,
        }
    }
}

/// Loads and renders prompt templates
///
/// All templates are read and compiled once at construction, so a broken
/// override fails at startup rather than mid-request.
#[derive(Debug)]
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    override_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader, preferring `.pmt` files in `override_dir`
    pub fn new(override_dir: Option<&Path>) -> Result<Self> {
        debug!(?override_dir, "PromptLoader::new: called");
        let override_dir = match override_dir {
            Some(dir) if dir.is_dir() => Some(dir.to_path_buf()),
            Some(dir) => {
                debug!(?dir, "PromptLoader::new: override directory missing, using embedded prompts");
                None
            }
            None => None,
        };

        let mut loader = Self {
            hbs: Self::registry(),
            override_dir,
        };
        for name in TEMPLATE_NAMES {
            let template = loader.load_template(name)?;
            loader
                .hbs
                .register_template_string(name, template)
                .map_err(|e| eyre!("Failed to compile prompt template {}: {}", name, e))?;
        }
        Ok(loader)
    }

    /// Create a loader from the `prompts` config section
    pub fn from_config(config: &PromptsConfig) -> Result<Self> {
        debug!("PromptLoader::from_config: called");
        Self::new(config.dir.as_deref())
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        let mut hbs = Self::registry();
        for name in TEMPLATE_NAMES {
            if let Some(template) = embedded::get_embedded(name)
                && let Err(e) = hbs.register_template_string(name, template)
            {
                tracing::error!(%name, error = %e, "PromptLoader::embedded_only: embedded template does not compile");
            }
        }
        Self {
            hbs,
            override_dir: None,
        }
    }

    fn registry() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name
    ///
    /// Checks in order:
    /// 1. Override: `{override_dir}/{name}.pmt`
    /// 2. Embedded fallback
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref dir) = self.override_dir {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                info!(?path, "Using prompt override");
                return std::fs::read_to_string(&path)
                    .context(format!("Failed to read prompt override {}", path.display()));
            }
            debug!(?path, "PromptLoader::load_template: not found in override directory");
        }

        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| eyre!("Prompt template not found: {}", name))
    }

    /// Render a registered template with the given context
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        self.hbs
            .render(template_name, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }
}
