//! Named-placeholder substitution for user-edited templates.
//!
//! Placeholders are written `{{name}}`. Rendering is strict: a placeholder
//! without a value is an error ([`RenderError::MissingKey`]), never a silent
//! blank, so a typo in a template fails every document of a run the same way.

use handlebars::{Handlebars, RenderErrorReason, no_escape};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::RenderError;

lazy_static! {
    static ref PLACEHOLDER_REGEX: Regex =
        Regex::new(r"\{\{\s*([A-Za-z_\p{L}][\w\p{L}]*)\s*\}\}").unwrap();
}

/// Placeholder name to substituted text.
pub type Values = BTreeMap<String, String>;

pub struct TemplateRenderer {
    registry: Handlebars<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        // Values are markdown, not HTML
        registry.register_escape_fn(no_escape);
        TemplateRenderer { registry }
    }

    /// Substitute every placeholder of `template` with its value.
    ///
    /// # Examples
    /// ```
    /// use surveillances::{TemplateRenderer, Values};
    ///
    /// let renderer = TemplateRenderer::new();
    /// let mut values = Values::new();
    /// values.insert("enseignant".into(), "Dupont".into());
    /// let text = renderer.render("Mr. **{{enseignant}}**", &values).unwrap();
    /// assert_eq!(text, "Mr. **Dupont**");
    /// ```
    pub fn render(&self, template: &str, values: &Values) -> Result<String, RenderError> {
        self.registry
            .render_template(template, values)
            .map_err(|e| match e.reason() {
                RenderErrorReason::MissingVariable(name) => RenderError::MissingKey {
                    name: name.clone().unwrap_or_default(),
                },
                _ => RenderError::Syntax(e.to_string()),
            })
    }

    /// Names referenced by simple `{{name}}` placeholders, sorted.
    pub fn placeholders(template: &str) -> BTreeSet<String> {
        PLACEHOLDER_REGEX
            .captures_iter(template)
            .map(|caps| caps[1].to_string())
            .collect()
    }

    /// Placeholders of `template` that `available` does not provide.
    pub fn unknown_placeholders<'a>(
        template: &str,
        available: impl IntoIterator<Item = &'a str>,
    ) -> Vec<String> {
        let known: BTreeSet<&str> = available.into_iter().collect();
        Self::placeholders(template)
            .into_iter()
            .filter(|name| !known.contains(name.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> Values {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_and_leaves_the_rest_alone() {
        let renderer = TemplateRenderer::new();
        let template = "# Titre\n\n<span style=\"color:red\">{{a}}</span> & {{b}}\n";
        let out = renderer
            .render(template, &values(&[("a", "<x>"), ("b", "| 1 | 2 |")]))
            .unwrap();
        assert_eq!(out, "# Titre\n\n<span style=\"color:red\"><x></span> & | 1 | 2 |\n");
    }

    #[test]
    fn rendering_is_idempotent() {
        let renderer = TemplateRenderer::new();
        let v = values(&[("epreuve", "Maths")]);
        let first = renderer.render("Matière : {{epreuve}}", &v).unwrap();
        let second = renderer.render("Matière : {{epreuve}}", &v).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_placeholder_is_an_error() {
        let renderer = TemplateRenderer::new();
        let err = renderer
            .render("{{enseignant}} {{salle}}", &values(&[("enseignant", "Dupont")]))
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::MissingKey {
                name: "salle".to_string()
            }
        );
    }

    #[test]
    fn broken_syntax_is_reported() {
        let renderer = TemplateRenderer::new();
        let err = renderer.render("{{#if}", &Values::new()).unwrap_err();
        assert!(matches!(err, RenderError::Syntax(_)));
    }

    #[test]
    fn lists_placeholders() {
        let found = TemplateRenderer::placeholders("{{ date }} {{epreuve}} {{date}}");
        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec!["date", "epreuve"]);
        assert_eq!(
            TemplateRenderer::unknown_placeholders("{{a}} {{b}}", ["a"]),
            vec!["b".to_string()]
        );
    }
}
