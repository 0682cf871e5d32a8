//! In-page content filter.
//!
//! [`FilterRules`] is configuration data: an ordered list of selector
//! strings for ad-like and popup-like elements. [`ContentFilter`] turns it
//! into the page-side behaviour, in two forms:
//!
//! - [`ContentFilter::script`]: JavaScript injected into every document the
//!   engine loads.
//! - [`ContentFilter::install`]: the same behaviour on the headless
//!   [`Document`] model.
//!
//! Both remove matching elements, keep doing so on every subtree mutation
//! of `<body>`, neuter `window.open`, discard writes to `document.location`
//! and post `PAGE_LOADED` to the host once per document.

pub mod script;

use std::cell::Cell;
use std::rc::Rc;

use scraper::Selector;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::bridge;
use crate::page::{Document, LocationAccessor, ObserveOptions, OpenPrimitive, ReadyState};

/// Window flag set by an installed filter; guards against double injection.
const INSTALL_MARKER: &str = "__sanpixFilter";

/// Static selector list. No runtime learning or mutation.
///
/// Each entry is a CSS selector list, as accepted by `querySelectorAll`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterRules(Vec<String>);

impl Default for FilterRules {
    fn default() -> Self {
        Self(
            [
                ".ad",
                ".advertisement",
                ".banner-ad",
                ".ad-container",
                "[class*=\"ad-\"]",
                "[id*=\"ad-\"]",
                "iframe[src*=\"ad\"]",
                "div[data-ad]",
                "iframe",
                "popup",
                "video-ad",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        )
    }
}

impl FilterRules {
    pub fn new(selectors: Vec<String>) -> Self {
        Self(selectors)
    }

    pub fn selectors(&self) -> &[String] {
        &self.0
    }
}

struct Rule {
    source: String,
    compiled: Result<Selector, String>,
}

/// The filter, compiled once and shared by every document.
#[derive(Clone)]
pub struct ContentFilter {
    rules: Rc<[Rule]>,
    script: Rc<str>,
}

impl ContentFilter {
    pub fn new(rules: &FilterRules) -> Self {
        let compiled: Vec<Rule> = rules
            .selectors()
            .iter()
            .map(|source| Rule {
                source: source.clone(),
                compiled: Selector::parse(source).map_err(|error| error.to_string()),
            })
            .collect();

        let invalid = compiled.iter().filter(|r| r.compiled.is_err()).count();
        info!(rules = compiled.len(), invalid, "Content filter compiled");

        Self {
            rules: compiled.into(),
            script: script::render(rules.selectors()).into(),
        }
    }

    /// Script source to inject into each engine document.
    pub fn script(&self) -> &str {
        &self.script
    }

    /// One removal pass over `document`. Returns the number of elements
    /// removed. A rule that fails is skipped for this pass only.
    pub fn remove_ads(&self, document: &mut Document) -> usize {
        remove_with(&self.rules, document)
    }

    /// Installs the filter on a freshly created document.
    ///
    /// Re-installing on the same document is a no-op.
    pub fn install(&self, document: &mut Document) {
        if !document.set_window_flag(INSTALL_MARKER) {
            debug!(url = %document.url(), "Content filter already installed");
            return;
        }

        self.remove_ads(document);
        document.replace_open(Box::new(SuppressedOpen));
        document.replace_location_accessor(Box::new(GuardedLocation));

        let rules = self.rules.clone();
        let body = document.body();
        document.observe(
            body,
            ObserveOptions {
                child_list: true,
                subtree: true,
            },
            Rc::new(move |document, _records| {
                remove_with(&rules, document);
            }),
        );

        if document.ready_state() == ReadyState::Complete {
            document.post_to_host(bridge::PAGE_LOADED);
        } else {
            let signalled = Cell::new(false);
            document.add_load_listener(Box::new(move |outbox| {
                if !signalled.replace(true) {
                    outbox.post(bridge::PAGE_LOADED);
                }
            }));
        }
    }
}

fn remove_with(rules: &[Rule], document: &mut Document) -> usize {
    let mut removed = 0;
    for rule in rules {
        let selector = match &rule.compiled {
            Ok(selector) => selector,
            Err(error) => {
                debug!(rule = %rule.source, %error, "Filter rule skipped");
                continue;
            }
        };
        for id in document.select(selector) {
            // An ancestor matched by an earlier selector may have taken it.
            if document.is_connected(id) && document.remove(id) {
                removed += 1;
            }
        }
    }
    if removed > 0 {
        debug!(removed, "Ads removed");
    }
    removed
}

struct SuppressedOpen;

impl OpenPrimitive for SuppressedOpen {
    fn open(&mut self, url: &str) -> Option<String> {
        info!(url, "Blocked a popup");
        None
    }
}

struct GuardedLocation;

impl LocationAccessor for GuardedLocation {
    fn get(&self, current: &Url) -> Url {
        current.clone()
    }

    fn set(&mut self, _current: &Url, value: &str) -> Option<Url> {
        info!(target_url = value, "Blocked redirect");
        None
    }
}
