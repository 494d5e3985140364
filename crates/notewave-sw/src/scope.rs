//! Scope computation for the caching agent.
//!
//! The agent owns a URL prefix derived from its own script location, never a
//! hardcoded site root. The same agent therefore serves a site deployed at a
//! domain root (`https://notes.example/`) or under a project sub-path
//! (`https://user.github.example/My-Notes/home/`).

use url::Url;

use crate::SwError;

/// URL path prefix owned by one agent registration.
///
/// The base URL always ends in `/`; a URL is in scope when it shares the
/// base's origin and its path starts with the base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    base: Url,
}

impl Scope {
    /// Build a scope from an explicit base URL. A missing trailing separator
    /// is appended; query and fragment are dropped.
    pub fn new(mut base: Url) -> Result<Self, SwError> {
        if base.cannot_be_a_base() {
            return Err(SwError::InvalidUrl(format!(
                "scope base must be hierarchical: {base}"
            )));
        }
        base.set_query(None);
        base.set_fragment(None);
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    /// Derive the scope from the agent script's own URL: the directory the
    /// script was served from.
    pub fn from_script_url(script: &Url) -> Result<Self, SwError> {
        let base = script
            .join(".")
            .map_err(|e| SwError::InvalidUrl(format!("{script}: {e}")))?;
        Self::new(base)
    }

    /// The scope base URL.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// The scope path component, e.g. `/My-Notes/home/`.
    pub fn path(&self) -> &str {
        self.base.path()
    }

    /// Resolve a scope-relative path. The empty string resolves to the scope
    /// root itself.
    pub fn resolve(&self, relative: &str) -> Result<Url, SwError> {
        self.base
            .join(relative)
            .map_err(|e| SwError::InvalidUrl(format!("{relative}: {e}")))
    }

    /// Whether a URL falls under this scope.
    pub fn contains(&self, url: &Url) -> bool {
        url.origin() == self.base.origin() && url.path().starts_with(self.base.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_scope_from_script_at_domain_root() {
        let scope = Scope::from_script_url(&url("https://notes.example/sw.js")).unwrap();
        assert_eq!(scope.base().as_str(), "https://notes.example/");
        assert_eq!(scope.path(), "/");
    }

    #[test]
    fn test_scope_from_script_under_sub_path() {
        let scope =
            Scope::from_script_url(&url("https://user.github.example/My-Notes/home/sw.js"))
                .unwrap();
        assert_eq!(
            scope.base().as_str(),
            "https://user.github.example/My-Notes/home/"
        );
    }

    #[test]
    fn test_new_appends_trailing_separator() {
        let scope = Scope::new(url("https://notes.example/app")).unwrap();
        assert_eq!(scope.path(), "/app/");
    }

    #[test]
    fn test_resolve_relative_assets() {
        let scope = Scope::new(url("https://notes.example/app/")).unwrap();

        assert_eq!(
            scope.resolve("").unwrap().as_str(),
            "https://notes.example/app/"
        );
        assert_eq!(
            scope.resolve("index.html").unwrap().as_str(),
            "https://notes.example/app/index.html"
        );
        assert_eq!(
            scope.resolve("images/icon-192x192.png").unwrap().as_str(),
            "https://notes.example/app/images/icon-192x192.png"
        );
    }

    #[test]
    fn test_contains_respects_origin_and_path() {
        let scope = Scope::new(url("https://notes.example/app/")).unwrap();

        assert!(scope.contains(&url("https://notes.example/app/index.html")));
        assert!(scope.contains(&url("https://notes.example/app/")));
        assert!(!scope.contains(&url("https://notes.example/other/index.html")));
        assert!(!scope.contains(&url("https://notes.example/app")));
        assert!(!scope.contains(&url("https://evil.example/app/index.html")));
    }

    #[test]
    fn test_rejects_non_hierarchical_base() {
        assert!(Scope::new(url("data:text/plain,hello")).is_err());
    }
}
