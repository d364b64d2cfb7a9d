//! Template rendering against the execution context.
//!
//! Node configurations embed `{{path.to.value}}` placeholders that resolve
//! against the accumulated context at execution time. A `json` helper
//! pretty-prints a subtree, which is how a whole upstream response gets
//! spliced into a request body or prompt.

use crate::context::ExecutionContext;
use crate::error::TemplateError;
use handlebars::{Handlebars, handlebars_helper};
use serde_json::Value;

handlebars_helper!(json_helper: |value: Value| {
    serde_json::to_string_pretty(&value).unwrap_or_default()
});

/// Renders node configuration templates.
///
/// HTML escaping is disabled: the rendered output feeds URLs, JSON bodies
/// and prompts, never markup.
pub struct TemplateEngine {
    registry: Handlebars<'static>,
}

impl TemplateEngine {
    /// Creates an engine with the `json` helper registered.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_helper("json", Box::new(json_helper));
        Self { registry }
    }

    /// Renders `template` against the context.
    ///
    /// Unknown paths render as empty strings rather than failing, matching
    /// how partially-filled contexts behave mid-run.
    ///
    /// # Errors
    ///
    /// Returns an error if the template fails to parse or render.
    pub fn render(
        &self,
        template: &str,
        context: &ExecutionContext,
    ) -> Result<String, TemplateError> {
        self.registry
            .render_template(template, &context.as_value())
            .map_err(|err| match err.reason() {
                handlebars::RenderErrorReason::TemplateError(parse) => TemplateError::Parse {
                    detail: parse.to_string(),
                },
                _ => TemplateError::Render {
                    detail: err.to_string(),
                },
            })
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}
