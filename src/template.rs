use std::collections::BTreeMap;

use minijinja::{context, AutoEscape, Environment};

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template source is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error(transparent)]
    Render(#[from] minijinja::Error),
}

/// Variables exposed to startup templating, captured from the process
/// environment once and never mutated afterwards.
///
/// Templates see three bindings: per-variable access (`{{ env.API_URL }}`),
/// the whole mapping as JSON (`{{ Json }}`), and the same JSON escaped for
/// embedding inside a double-quoted string literal (`{{ EscapedJson }}`).
pub struct TemplateContext {
    vars: BTreeMap<String, String>,
    json: String,
    escaped_json: String,
    engine: Environment<'static>,
}

impl TemplateContext {
    /// Snapshot environment variables starting with `prefix`, stripping the
    /// prefix from the exposed name (`VITE_API_URL` becomes `env.API_URL`).
    pub fn from_env(prefix: &str) -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .filter_map(|(k, v)| Some((k.strip_prefix(prefix)?.to_string(), v)))
            .collect();
        Self::from_vars(vars)
    }

    pub fn from_vars(vars: BTreeMap<String, String>) -> Self {
        // BTreeMap keeps the JSON aggregate stable across runs
        let json = serde_json::to_string(&vars).unwrap_or_else(|_| "{}".to_string());
        let quoted = serde_json::to_string(&json).unwrap_or_else(|_| "\"\"".to_string());
        let escaped_json = quoted[1..quoted.len() - 1].to_string();

        let mut engine = Environment::new();
        // Values are interpolated verbatim; HTML escaping would mangle the
        // Json aggregate and any markup-bearing variable.
        engine.set_auto_escape_callback(|_| AutoEscape::None);

        Self {
            vars,
            json,
            escaped_json,
            engine,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn json(&self) -> &str {
        &self.json
    }

    pub fn escaped_json(&self) -> &str {
        &self.escaped_json
    }

    /// Interpolate `{{ ... }}` expressions in `source`. Identical inputs
    /// yield identical output; the caller decides what to do on failure.
    pub fn render(&self, name: &str, source: &[u8]) -> Result<Vec<u8>, TemplateError> {
        let source = std::str::from_utf8(source)?;
        let rendered = self.engine.render_named_str(
            name,
            source,
            context! {
                env => &self.vars,
                Json => &self.json,
                EscapedJson => &self.escaped_json,
            },
        )?;
        Ok(rendered.into_bytes())
    }
}

impl std::fmt::Debug for TemplateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateContext")
            .field("vars", &self.vars.keys().collect::<Vec<_>>())
            .finish()
    }
}
