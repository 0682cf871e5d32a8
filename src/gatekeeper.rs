//! Navigation gatekeeper.
//!
//! Single authorization point for every navigation the surface attempts:
//! top-level loads, subframe loads and requests to open a new surface all
//! go through [`Gatekeeper::authorize`], with one and the same origin check.
//!
//! The check is a prefix match on the normalized serialization of the
//! target URL against the [`TrustedOrigin`]. Path and query changes inside
//! the site are allowed; a different scheme, host or port is not.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, info};
use url::Url;

/// Number of recently blocked URLs kept for diagnostics.
const BLOCKED_HISTORY_LEN: usize = 32;

// ─────────────────────────────────────────────────────────────────────────────
// TrustedOrigin
// ─────────────────────────────────────────────────────────────────────────────

/// The one site the surface may navigate within.
///
/// Stored as the normalized `scheme://host[:port]/` prefix. Built once at
/// startup from configuration and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedOrigin {
    prefix: String,
    url: Url,
}

/// Reasons a configured origin string is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginError {
    Empty,
    Malformed(String),
    UnsupportedScheme(String),
    MissingHost,
    HasPath(String),
    HasQueryOrFragment,
}

impl fmt::Display for OriginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginError::Empty => write!(f, "trusted origin is empty"),
            OriginError::Malformed(msg) => write!(f, "trusted origin is not a valid URL: {msg}"),
            OriginError::UnsupportedScheme(scheme) => {
                write!(f, "trusted origin must be http or https, got {scheme}")
            }
            OriginError::MissingHost => write!(f, "trusted origin has no host"),
            OriginError::HasPath(path) => {
                write!(f, "trusted origin is scheme and host only, got path {path}")
            }
            OriginError::HasQueryOrFragment => {
                write!(f, "trusted origin must not carry a query or fragment")
            }
        }
    }
}

impl std::error::Error for OriginError {}

impl TrustedOrigin {
    /// Validates and normalizes an origin such as `https://example.app`.
    ///
    /// Only scheme, host and port are accepted. The prefix always ends with
    /// the root `/`, so `https://example.app` can never match
    /// `https://example.app.evil.com/`.
    pub fn parse(input: &str) -> Result<Self, OriginError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(OriginError::Empty);
        }

        let url = Url::parse(trimmed).map_err(|e| OriginError::Malformed(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(OriginError::UnsupportedScheme(url.scheme().to_owned()));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(OriginError::MissingHost);
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(OriginError::HasQueryOrFragment);
        }
        if url.path() != "/" {
            return Err(OriginError::HasPath(url.path().to_owned()));
        }

        Ok(Self {
            prefix: url.as_str().to_owned(),
            url,
        })
    }

    /// The normalized prefix string.
    pub fn as_str(&self) -> &str {
        &self.prefix
    }

    /// The origin as a URL, for loading and for joining relative paths.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Prefix match on an already parsed URL.
    pub fn contains(&self, url: &Url) -> bool {
        url.as_str().starts_with(&self.prefix)
    }
}

impl fmt::Display for TrustedOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// NavigationRequest
// ─────────────────────────────────────────────────────────────────────────────

/// Which path the navigation attempt came through. Informational only:
/// every kind gets the same origin check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    TopLevel,
    Subframe,
    NewSurface,
}

/// One navigation attempt, alive for the duration of a decision call.
#[derive(Debug, Clone, Copy)]
pub struct NavigationRequest<'a> {
    pub url: Option<&'a str>,
    pub kind: NavigationKind,
}

impl<'a> NavigationRequest<'a> {
    pub fn top_level(url: &'a str) -> Self {
        Self {
            url: Some(url),
            kind: NavigationKind::TopLevel,
        }
    }

    pub fn subframe(url: &'a str) -> Self {
        Self {
            url: Some(url),
            kind: NavigationKind::Subframe,
        }
    }

    /// A request for a new surface. The engine may not know the target yet.
    pub fn new_surface(url: Option<&'a str>) -> Self {
        Self {
            url,
            kind: NavigationKind::NewSurface,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gatekeeper
// ─────────────────────────────────────────────────────────────────────────────

/// Host-side allow/deny decision for navigation attempts.
///
/// Lives on the host's UI thread; the blocked-URL log uses `RefCell`/`Cell`
/// because the decision call only gets `&self`.
pub struct Gatekeeper {
    origin: TrustedOrigin,
    blocked: RefCell<VecDeque<String>>,
    blocked_total: Cell<u64>,
}

impl Gatekeeper {
    pub fn new(origin: TrustedOrigin) -> Self {
        Self {
            origin,
            blocked: RefCell::new(VecDeque::with_capacity(BLOCKED_HISTORY_LEN)),
            blocked_total: Cell::new(0),
        }
    }

    pub fn origin(&self) -> &TrustedOrigin {
        &self.origin
    }

    /// Returns `true` iff the request targets the trusted origin.
    ///
    /// Missing or unparseable URLs are denied. Denials are recorded.
    pub fn authorize(&self, request: &NavigationRequest<'_>) -> bool {
        let Some(raw) = request.url else {
            self.record_blocked("<no url>", request.kind);
            return false;
        };

        let allowed = Url::parse(raw)
            .map(|url| self.origin.contains(&url))
            .unwrap_or(false);

        if allowed {
            debug!(url = raw, kind = ?request.kind, "Navigation allowed");
        } else {
            self.record_blocked(raw, request.kind);
        }
        allowed
    }

    /// Most recent blocked URLs, oldest first.
    pub fn recently_blocked(&self) -> Vec<String> {
        self.blocked.borrow().iter().cloned().collect()
    }

    /// Total number of denials since startup.
    pub fn blocked_total(&self) -> u64 {
        self.blocked_total.get()
    }

    fn record_blocked(&self, url: &str, kind: NavigationKind) {
        info!(url, ?kind, "Blocked external URL");
        self.blocked_total.set(self.blocked_total.get() + 1);

        let mut blocked = self.blocked.borrow_mut();
        if blocked.len() == BLOCKED_HISTORY_LEN {
            blocked.pop_front();
        }
        blocked.push_back(url.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gatekeeper() -> Gatekeeper {
        Gatekeeper::new(TrustedOrigin::parse("https://example.app/").unwrap())
    }

    #[test]
    fn test_allows_paths_inside_origin() {
        let gk = gatekeeper();
        assert!(gk.authorize(&NavigationRequest::top_level("https://example.app/movie/42")));
        assert!(gk.authorize(&NavigationRequest::top_level("https://example.app/")));
        assert!(gk.authorize(&NavigationRequest::top_level(
            "https://example.app/search?q=dune#top"
        )));
    }

    #[test]
    fn test_denies_other_hosts() {
        let gk = gatekeeper();
        assert!(!gk.authorize(&NavigationRequest::top_level("https://ads.example.com/")));
        assert!(!gk.authorize(&NavigationRequest::top_level("https://example.app.evil.com/")));
    }

    #[test]
    fn test_denies_scheme_mismatch() {
        let gk = gatekeeper();
        assert!(!gk.authorize(&NavigationRequest::top_level("http://example.app/")));
    }

    #[test]
    fn test_denies_userinfo_trick() {
        let gk = gatekeeper();
        assert!(!gk.authorize(&NavigationRequest::top_level("https://example.app@evil.com/")));
    }

    #[test]
    fn test_missing_or_malformed_url_is_denied() {
        let gk = gatekeeper();
        assert!(!gk.authorize(&NavigationRequest::new_surface(None)));
        assert!(!gk.authorize(&NavigationRequest::top_level("")));
        assert!(!gk.authorize(&NavigationRequest::top_level("not a url")));
        assert_eq!(gk.blocked_total(), 3);
    }

    #[test]
    fn test_same_policy_for_every_kind() {
        let gk = gatekeeper();
        let inside = "https://example.app/x";
        let outside = "https://popunder.example.net/";
        for kind in [
            NavigationKind::TopLevel,
            NavigationKind::Subframe,
            NavigationKind::NewSurface,
        ] {
            assert!(gk.authorize(&NavigationRequest {
                url: Some(inside),
                kind
            }));
            assert!(!gk.authorize(&NavigationRequest {
                url: Some(outside),
                kind
            }));
        }
    }

    #[test]
    fn test_host_case_is_normalized() {
        let gk = gatekeeper();
        assert!(gk.authorize(&NavigationRequest::top_level("HTTPS://Example.APP/Movie")));
    }

    #[test]
    fn test_blocked_history_is_bounded() {
        let gk = gatekeeper();
        for i in 0..(BLOCKED_HISTORY_LEN + 5) {
            let url = format!("https://ads{i}.example.com/");
            gk.authorize(&NavigationRequest::subframe(&url));
        }
        let recent = gk.recently_blocked();
        assert_eq!(recent.len(), BLOCKED_HISTORY_LEN);
        assert_eq!(recent[0], "https://ads5.example.com/");
        assert_eq!(gk.blocked_total(), (BLOCKED_HISTORY_LEN + 5) as u64);
    }

    #[test]
    fn test_origin_gets_trailing_slash() {
        let origin = TrustedOrigin::parse("https://example.app").unwrap();
        assert_eq!(origin.as_str(), "https://example.app/");
        let origin = TrustedOrigin::parse("http://localhost:8080").unwrap();
        assert_eq!(origin.as_str(), "http://localhost:8080/");
    }

    #[test]
    fn test_origin_with_path_is_rejected() {
        assert_eq!(
            TrustedOrigin::parse("https://example.app/watch"),
            Err(OriginError::HasPath("/watch".into()))
        );
        assert_eq!(
            TrustedOrigin::parse("https://example.app/watch/"),
            Err(OriginError::HasPath("/watch/".into()))
        );
    }

    #[test]
    fn test_origin_allows_its_own_root() {
        let gk = Gatekeeper::new(TrustedOrigin::parse("https://example.app").unwrap());
        assert!(gk.authorize(&NavigationRequest::top_level("https://example.app")));
        assert!(gk.authorize(&NavigationRequest::top_level("https://example.app/watch")));
        assert_eq!(gk.blocked_total(), 0);
    }

    #[test]
    fn test_new_surface_denials_are_recorded() {
        let gk = gatekeeper();
        assert!(!gk.authorize(&NavigationRequest::new_surface(None)));
        assert!(!gk.authorize(&NavigationRequest::new_surface(Some(
            "https://popunder.example.net/"
        ))));
        assert_eq!(gk.blocked_total(), 2);
        assert_eq!(
            gk.recently_blocked(),
            ["<no url>", "https://popunder.example.net/"]
        );
    }

    #[test]
    fn test_origin_validation() {
        assert_eq!(TrustedOrigin::parse("  "), Err(OriginError::Empty));
        assert!(matches!(
            TrustedOrigin::parse("example"),
            Err(OriginError::Malformed(_))
        ));
        assert!(matches!(
            TrustedOrigin::parse("ftp://example.app/"),
            Err(OriginError::UnsupportedScheme(_))
        ));
        assert_eq!(
            TrustedOrigin::parse("https://example.app/?a=1"),
            Err(OriginError::HasQueryOrFragment)
        );
    }
}
