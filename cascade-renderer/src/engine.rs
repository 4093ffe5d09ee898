//! Version template evaluation.

use tera::Tera;

use crate::context::VersionContext;
use crate::error::RenderError;

/// Evaluates `versionTemplate` expressions.
///
/// Templates are plain text, so autoescaping is off. Output is trimmed: a
/// template spread over several lines still yields a single version.
#[derive(Debug, Default, Clone, Copy)]
pub struct VersionTemplater;

impl VersionTemplater {
    pub fn new() -> Self {
        Self
    }

    /// Render `template` against `ctx`.
    pub fn evaluate(&self, template: &str, ctx: &VersionContext<'_>) -> Result<String, RenderError> {
        let tera_ctx = ctx.to_tera_context()?;
        let rendered = Tera::one_off(template, &tera_ctx, false).map_err(|source| RenderError::Evaluate {
            git_url: ctx.git_url.to_string(),
            source,
        })?;
        Ok(rendered.trim().to_string())
    }

    /// The version to write for one target: `template` when set, else `version`.
    pub fn resolve(&self, template: &str, ctx: &VersionContext<'_>) -> Result<String, RenderError> {
        if template.is_empty() {
            return Ok(ctx.version.to_string());
        }
        self.evaluate(template, ctx)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TemplateData;
    use rstest::rstest;

    #[rstest]
    #[case("{{ version }}", "1.2.3")]
    #[case("v{{ version }}", "v1.2.3")]
    #[case("{{ version | replace(from='.', to='-') }}", "1-2-3")]
    #[case("  {{ version }}\n", "1.2.3")]
    fn evaluates_expressions(#[case] template: &str, #[case] expected: &str) {
        let data = TemplateData::default();
        let ctx = VersionContext::new("1.2.3", "https://github.com/acme/env", &data);
        assert_eq!(VersionTemplater::new().evaluate(template, &ctx).unwrap(), expected);
    }

    #[test]
    fn empty_template_resolves_to_literal_version() {
        let data = TemplateData::default();
        let ctx = VersionContext::new("1.2.3", "https://github.com/acme/env", &data);
        assert_eq!(VersionTemplater::new().resolve("", &ctx).unwrap(), "1.2.3");
    }

    #[test]
    fn pull_request_sha_is_addressable() {
        let mut data = TemplateData::default();
        data.record_pull_request("jx-build-controller", "4f2a9c1");
        let ctx = VersionContext::new("1.2.3", "https://github.com/acme/env", &data);
        let out = VersionTemplater::new()
            .evaluate("{{ pull_requests['jx-build-controller'].sha }}", &ctx)
            .unwrap();
        assert_eq!(out, "4f2a9c1");
    }

    #[test]
    fn unknown_variable_names_the_repository() {
        let data = TemplateData::default();
        let ctx = VersionContext::new("1.2.3", "https://github.com/acme/env", &data);
        let err = VersionTemplater::new()
            .evaluate("{{ pull_requests['missing'].sha }}", &ctx)
            .unwrap_err();
        assert!(matches!(err, RenderError::Evaluate { .. }));
        assert!(err.to_string().contains("https://github.com/acme/env"), "got: {err}");
    }
}
