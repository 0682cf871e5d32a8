//! Renders the injected filter script.
//!
//! The script source lives in `content_filter.js`; selector list, bridge
//! endpoint and completion payload are substituted as JSON literals so any
//! quote or backslash in a configured selector stays inside its string.

use crate::bridge;

const TEMPLATE: &str = include_str!("content_filter.js");

const SELECTORS_SLOT: &str = "__SANPIX_SELECTORS__";
const BRIDGE_SLOT: &str = "__SANPIX_BRIDGE__";
const PAGE_LOADED_SLOT: &str = "__SANPIX_PAGE_LOADED__";

/// Builds the self-contained script for the given selectors.
pub fn render(selectors: &[String]) -> String {
    TEMPLATE
        .replace(SELECTORS_SLOT, &json_literal(selectors))
        .replace(BRIDGE_SLOT, &json_literal(bridge::BRIDGE_ENDPOINT))
        .replace(PAGE_LOADED_SLOT, &json_literal(bridge::PAGE_LOADED))
}

fn json_literal<T: serde::Serialize + ?Sized>(value: &T) -> String {
    // Serializing strings and string slices cannot fail.
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_slots_filled() {
        let script = render(&[".ad".to_string()]);
        assert!(!script.contains("__SANPIX_"));
        assert!(script.contains(r#"var SELECTORS = [".ad"];"#));
        assert!(script.contains(r#"var BRIDGE = "https://bridge.sanpix.invalid/post";"#));
        assert!(script.contains(r#"var PAGE_LOADED = "PAGE_LOADED";"#));
    }

    #[test]
    fn test_ends_with_truthy_expression() {
        let script = render(&[]);
        assert!(script.trim_end().ends_with("true;"));
    }

    #[test]
    fn test_selectors_are_escaped() {
        let script = render(&[r#"[class*="ad-"]"#.to_string(), "a\\b".to_string()]);
        assert!(script.contains(r#"["[class*=\"ad-\"]","a\\b"]"#));
    }

    #[test]
    fn test_reinjection_guard_present() {
        let script = render(&[]);
        assert!(script.contains("if (window.__sanpixFilter)"));
        assert!(script.contains("childList: true"));
        assert!(script.contains("subtree: true"));
    }
}
