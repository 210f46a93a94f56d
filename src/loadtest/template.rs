//! Request target templates with `${NAME}` placeholders.
//!
//! The target host is usually supplied from outside the config file (for
//! example a load balancer DNS name). Placeholders are resolved once, before
//! the run starts, into an explicit [`TemplateParams`] map; nothing reads the
//! process environment after that.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::loadtest::error::LoadTestError;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid")
    })
}

/// A URL pattern such as `http://${ALB_DNS}/load?duration=1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    raw: String,
    params: Vec<String>,
}

impl UrlTemplate {
    /// Parse a template, collecting its distinct placeholder names in order
    /// of first appearance.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let mut params: Vec<String> = Vec::new();
        for caps in placeholder_regex().captures_iter(&raw) {
            let name = caps[1].to_string();
            if !params.contains(&name) {
                params.push(name);
            }
        }
        Self { raw, params }
    }

    /// The template source string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder names referenced by the template.
    pub fn param_names(&self) -> &[String] {
        &self.params
    }

    /// Substitute every placeholder from `params`.
    ///
    /// Fails with [`LoadTestError::UnresolvedParam`] naming the first missing
    /// placeholder.
    pub fn render(&self, params: &TemplateParams) -> Result<String, LoadTestError> {
        if let Some(missing) = self.params.iter().find(|name| params.get(name).is_none()) {
            return Err(LoadTestError::UnresolvedParam {
                name: missing.clone(),
            });
        }
        let rendered = placeholder_regex().replace_all(&self.raw, |caps: &regex::Captures<'_>| {
            params.get(&caps[1]).unwrap_or_default().to_string()
        });
        Ok(rendered.into_owned())
    }

    /// Render and check that the result is an absolute `http`/`https` URL.
    pub fn render_url(&self, params: &TemplateParams) -> Result<url::Url, LoadTestError> {
        let rendered = self.render(params)?;
        let parsed = url::Url::parse(&rendered).map_err(|e| LoadTestError::InvalidUrl {
            url: rendered.clone(),
            message: e.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => {},
            other => {
                return Err(LoadTestError::InvalidUrl {
                    url: rendered,
                    message: format!("unsupported scheme '{other}'"),
                })
            },
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(LoadTestError::InvalidUrl {
                url: rendered,
                message: "missing host".to_string(),
            });
        }
        Ok(parsed)
    }
}

/// Run-scoped template parameter values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateParams(BTreeMap<String, String>);

impl TemplateParams {
    /// Creates an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter value, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Looks up a parameter value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Iterates parameters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Resolve every placeholder of `template`.
    ///
    /// Explicit `overrides` win; otherwise `lookup` is consulted (the CLI
    /// passes a process-environment lookup). Fails on the first placeholder
    /// with no value.
    pub fn resolve<F>(
        template: &UrlTemplate,
        overrides: &[(String, String)],
        lookup: F,
    ) -> Result<Self, LoadTestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut params = Self::new();
        for (name, value) in overrides {
            params.insert(name.clone(), value.clone());
        }
        for name in template.param_names() {
            if params.get(name).is_some() {
                continue;
            }
            match lookup(name) {
                Some(value) => params.insert(name.clone(), value),
                None => {
                    return Err(LoadTestError::UnresolvedParam { name: name.clone() });
                },
            }
        }
        Ok(params)
    }
}

impl FromIterator<(String, String)> for TemplateParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Parse a `NAME=VALUE` assignment (used for `--param`).
pub fn parse_param_assignment(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("parameter name is empty in '{s}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> TemplateParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_collects_distinct_names() {
        let t = UrlTemplate::parse("http://${HOST}:${PORT}/a?h=${HOST}");
        assert_eq!(t.param_names(), &["HOST".to_string(), "PORT".to_string()]);
    }

    #[test]
    fn test_render_substitutes_all() {
        let t = UrlTemplate::parse("http://${ALB_DNS}/load?duration=1");
        let out = t.render(&params(&[("ALB_DNS", "lb.example.com")])).unwrap();
        assert_eq!(out, "http://lb.example.com/load?duration=1");
    }

    #[test]
    fn test_render_without_placeholders() {
        let t = UrlTemplate::parse("http://localhost:8080/health");
        assert!(t.param_names().is_empty());
        assert_eq!(
            t.render(&TemplateParams::new()).unwrap(),
            "http://localhost:8080/health"
        );
    }

    #[test]
    fn test_render_missing_param_fails() {
        let t = UrlTemplate::parse("http://${ALB_DNS}/load");
        let err = t.render(&TemplateParams::new()).unwrap_err();
        assert!(matches!(err, LoadTestError::UnresolvedParam { ref name } if name == "ALB_DNS"));
    }

    #[test]
    fn test_render_url_rejects_non_http_scheme() {
        let t = UrlTemplate::parse("ftp://${H}/x");
        let err = t.render_url(&params(&[("H", "example.com")])).unwrap_err();
        assert!(matches!(err, LoadTestError::InvalidUrl { .. }));
    }

    #[test]
    fn test_render_url_rejects_empty_host() {
        let t = UrlTemplate::parse("http://${H}/load");
        let err = t.render_url(&params(&[("H", "")])).unwrap_err();
        assert!(matches!(err, LoadTestError::InvalidUrl { .. }));
    }

    #[test]
    fn test_resolve_prefers_overrides_over_lookup() {
        let t = UrlTemplate::parse("http://${HOST}/");
        let overrides = vec![("HOST".to_string(), "cli-host".to_string())];
        let resolved =
            TemplateParams::resolve(&t, &overrides, |_| Some("env-host".to_string())).unwrap();
        assert_eq!(resolved.get("HOST"), Some("cli-host"));
    }

    #[test]
    fn test_resolve_falls_back_to_lookup() {
        let t = UrlTemplate::parse("http://${HOST}/");
        let resolved = TemplateParams::resolve(&t, &[], |name| {
            (name == "HOST").then(|| "env-host".to_string())
        })
        .unwrap();
        assert_eq!(resolved.get("HOST"), Some("env-host"));
    }

    #[test]
    fn test_resolve_unresolved_fails() {
        let t = UrlTemplate::parse("http://${HOST}/");
        let err = TemplateParams::resolve(&t, &[], |_| None).unwrap_err();
        assert!(matches!(err, LoadTestError::UnresolvedParam { .. }));
    }

    #[test]
    fn test_parse_param_assignment() {
        assert_eq!(
            parse_param_assignment("ALB_DNS=a.b:80").unwrap(),
            ("ALB_DNS".to_string(), "a.b:80".to_string())
        );
        assert_eq!(
            parse_param_assignment("Q=x=y").unwrap(),
            ("Q".to_string(), "x=y".to_string())
        );
        assert!(parse_param_assignment("novalue").is_err());
        assert!(parse_param_assignment("=v").is_err());
    }
}
