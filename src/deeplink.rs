//! Deep-link resolution.
//!
//! Turns a command-line argument or an app-scheme URL (`sanpix://movie/42`)
//! into a URL inside the trusted origin. Anything that would leave the
//! origin is rejected.

use tracing::{debug, warn};
use url::Url;

use crate::gatekeeper::TrustedOrigin;

/// Resolves `raw` against `origin`.
///
/// - `<app_scheme>://<path>` maps onto the origin: `<origin><path>`.
/// - An `http(s)` URL inside the origin is returned unchanged.
/// - A bare host and path gets `https://` prepended.
///
/// Returns `None` (and logs) for everything else.
pub fn resolve(raw: &str, origin: &TrustedOrigin, app_scheme: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let candidate = match Url::parse(raw) {
        Ok(url) if url.scheme().eq_ignore_ascii_case(app_scheme) => map_app_url(&url, origin),
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
        Ok(url) if url.cannot_be_a_base() && !raw.contains("://") => {
            // `host:port/path` parses with the host as scheme.
            Url::parse(&format!("https://{raw}")).ok()
        }
        Ok(url) => {
            warn!(scheme = url.scheme(), "Deep link with unsupported scheme ignored");
            return None;
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("https://{raw}")).ok(),
        Err(error) => {
            warn!(link = raw, %error, "Malformed deep link ignored");
            return None;
        }
    };

    match candidate {
        Some(url) if origin.contains(&url) => {
            debug!(%url, "Deep link resolved");
            Some(url)
        }
        Some(url) => {
            warn!(%url, "Deep link outside the trusted origin ignored");
            None
        }
        None => {
            warn!(link = raw, "Deep link could not be resolved");
            None
        }
    }
}

fn map_app_url(url: &Url, origin: &TrustedOrigin) -> Option<Url> {
    // `sanpix://movie/42` puts "movie" in the host slot.
    let mut relative = String::new();
    if let Some(host) = url.host_str() {
        relative.push_str(host);
    }
    relative.push_str(url.path());
    let relative = relative.trim_start_matches('/');

    let mut mapped = origin.url().join(relative).ok()?;
    mapped.set_query(url.query());
    mapped.set_fragment(url.fragment());
    Some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> TrustedOrigin {
        TrustedOrigin::parse("https://www.cineby.app/").unwrap()
    }

    fn resolve_str(raw: &str) -> Option<String> {
        resolve(raw, &origin(), "sanpix").map(String::from)
    }

    #[test]
    fn test_app_scheme_maps_onto_origin() {
        assert_eq!(
            resolve_str("sanpix://movie/42?x=1").as_deref(),
            Some("https://www.cineby.app/movie/42?x=1")
        );
        assert_eq!(
            resolve_str("SANPIX://tv/7#s2").as_deref(),
            Some("https://www.cineby.app/tv/7#s2")
        );
        assert_eq!(
            resolve_str("sanpix://").as_deref(),
            Some("https://www.cineby.app/")
        );
    }

    #[test]
    fn test_origin_urls_pass_through() {
        assert_eq!(
            resolve_str("https://www.cineby.app/movie/1").as_deref(),
            Some("https://www.cineby.app/movie/1")
        );
    }

    #[test]
    fn test_bare_host_gets_https() {
        assert_eq!(
            resolve_str("www.cineby.app/movie/1").as_deref(),
            Some("https://www.cineby.app/movie/1")
        );
    }

    #[test]
    fn test_outside_origin_is_rejected() {
        assert_eq!(resolve_str("https://ads.example.com/"), None);
        assert_eq!(resolve_str("http://www.cineby.app/"), None);
        assert_eq!(resolve_str("javascript:alert(1)"), None);
        assert_eq!(resolve_str("file:///etc/passwd"), None);
        assert_eq!(resolve_str(""), None);
        assert_eq!(resolve_str("http://[::1"), None);
    }

    #[test]
    fn test_app_scheme_cannot_escape_origin() {
        for link in ["sanpix:////evil.example.com/x", "sanpix://..//evil.example.com/"] {
            if let Some(url) = resolve_str(link) {
                assert!(url.starts_with("https://www.cineby.app/"), "{link} -> {url}");
            }
        }
    }
}
