use std::fmt::Debug;
use std::sync::Arc;

/// Errors produced when filling a [`Template`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// The number of supplied parameters does not match the template.
    #[error("template expects {expected} parameters; got {actual}")]
    ParamCount { expected: usize, actual: usize },
}

/// A placeholder syntax.
///
/// Implementations must be `Send` and `Sync` so a template can be shared
/// between submitters via `Arc`.
pub trait Placeholders: Debug + Send + Sync {
    /// Number of placeholders in `template`.
    fn count(&self, template: &str) -> usize;

    /// Replace placeholders in order.
    ///
    /// Surplus `params` are ignored and surplus placeholders are left as is;
    /// [`Template`] checks the counts before calling this.
    fn fill(&self, template: &str, params: &[&str]) -> String;
}

/// Positional `{}` placeholders, filled left to right.
#[derive(Debug, Default, Clone, Copy)]
pub struct Braces;

impl Placeholders for Braces {
    fn count(&self, template: &str) -> usize {
        template.matches("{}").count()
    }

    fn fill(&self, template: &str, params: &[&str]) -> String {
        let extra: usize = params.iter().map(|p| p.len()).sum();
        let mut out = String::with_capacity(template.len() + extra);
        let mut last = 0;

        for ((start, _), param) in template.match_indices("{}").zip(params) {
            out.push_str(&template[last..start]);
            out.push_str(param);
            last = start + 2;
        }
        out.push_str(&template[last..]);
        out
    }
}

/// An endpoint URL with positional placeholders.
///
/// The placeholder count is computed once, up front.
#[derive(Debug, Clone)]
pub struct Template {
    raw: Arc<str>,
    params: usize,
    placeholders: Arc<dyn Placeholders>,
}

impl Template {
    /// Creates a `{}` template.
    pub fn new(raw: impl Into<String>) -> Self {
        Self::with_placeholders(raw, Braces)
    }

    /// Creates a template using a custom placeholder syntax.
    pub fn with_placeholders<P>(raw: impl Into<String>, placeholders: P) -> Self
    where
        P: Placeholders + 'static,
    {
        let raw: String = raw.into();
        let raw: Arc<str> = Arc::from(raw);
        let params = placeholders.count(&raw);
        Self {
            raw,
            params,
            placeholders: Arc::new(placeholders),
        }
    }

    /// The template as given, placeholders included.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of parameters `render` expects.
    pub fn param_count(&self) -> usize {
        self.params
    }

    /// Fill the template.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::ParamCount`] unless exactly
    /// [`param_count`](Self::param_count) parameters are supplied.
    pub fn render<P: AsRef<str>>(&self, params: &[P]) -> Result<String, TemplateError> {
        if params.len() != self.params {
            return Err(TemplateError::ParamCount {
                expected: self.params,
                actual: params.len(),
            });
        }
        let params: Vec<&str> = params.iter().map(AsRef::as_ref).collect();
        Ok(self.placeholders.fill(&self.raw, &params))
    }
}
