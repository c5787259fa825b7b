//! API-route classification.
//!
//! A request is an API request when its path starts with one of the
//! configured prefixes. The test is textual: `/apisupport` is under `/api`.

use std::fmt;

/// A route prefix with exactly one leading slash and no trailing slash.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct RoutePrefix(String);

impl RoutePrefix {
    /// Normalizes raw configuration input: surrounding whitespace is trimmed,
    /// leading and trailing slashes are collapsed. Blank input becomes `/`,
    /// which matches every path.
    pub fn new(raw: &str) -> Self {
        let core = raw.trim().trim_matches('/');
        Self(format!("/{core}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// ASCII case-insensitive textual prefix test.
    pub fn matches(&self, path: &str) -> bool {
        let prefix = self.0.as_bytes();
        path.len() >= prefix.len() && path.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix)
    }
}

impl fmt::Display for RoutePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoutePrefix {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// True when `path` falls under any of `prefixes`. First match wins.
pub fn classify(path: &str, prefixes: &[RoutePrefix]) -> bool {
    prefixes.iter().any(|p| p.matches(path))
}

/// The configured API prefixes, in configuration order.
#[derive(Clone, Debug, Default)]
pub struct PathClassifier {
    prefixes: Vec<RoutePrefix>,
}

impl PathClassifier {
    pub fn new<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self { prefixes: raw.into_iter().map(|s| RoutePrefix::new(s.as_ref())).collect() }
    }

    pub fn prefixes(&self) -> &[RoutePrefix] {
        &self.prefixes
    }

    pub fn is_api(&self, path: &str) -> bool {
        classify(path, &self.prefixes)
    }
}
