//! Which requests the pipeline runs for at all.
//!
//! API routes and framework-internal assets never enter the pipeline. A path
//! is excluded when, after its leading `/`, it starts with one of the
//! excluded prefixes.

/// Prefixes excluded by default.
pub const DEFAULT_EXCLUDED_PREFIXES: &[&str] = &[
    "api",
    "_next/static",
    "_next/image",
    "favicon.ico",
    "logo.svg",
];

/// Decides whether the pipeline applies to a request path.
///
/// # Example
///
/// ```
/// use portico_middleware::PathMatcher;
///
/// let matcher = PathMatcher::default();
/// assert!(matcher.applies("/dashboard"));
/// assert!(!matcher.applies("/api/users"));
/// assert!(!matcher.applies("/_next/static/chunk.js"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatcher {
    excluded_prefixes: Vec<String>,
}

impl PathMatcher {
    /// Creates a matcher excluding the given prefixes.
    ///
    /// A leading `/` on a prefix is ignored.
    pub fn new<I, S>(excluded_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            excluded_prefixes: excluded_prefixes
                .into_iter()
                .map(|p| p.as_ref().trim_start_matches('/').to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Returns `true` if the pipeline should run for `path`.
    #[must_use]
    pub fn applies(&self, path: &str) -> bool {
        let Some(rest) = path.strip_prefix('/') else {
            return false;
        };
        !self
            .excluded_prefixes
            .iter()
            .any(|prefix| rest.starts_with(prefix.as_str()))
    }

    /// Returns the excluded prefixes.
    #[must_use]
    pub fn excluded_prefixes(&self) -> &[String] {
        &self.excluded_prefixes
    }
}

impl Default for PathMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDED_PREFIXES)
    }
}
