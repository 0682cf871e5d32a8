//! Page → host message bridge.
//!
//! The engine offers no script message handler, so page scripts talk to the
//! host by requesting a URL on a reserved `.invalid` host. The embedder
//! intercepts and cancels these requests in `load_web_resource` before they
//! reach the network; the message travels in the `m` query parameter.
//!
//! Any script in the page can reach the bridge. Load failures therefore
//! carry an [`ErrorPageToken`] that only the built-in network error page
//! knows; a failure report without it is treated as an unknown message.

use url::Url;
use uuid::Uuid;

/// Reserved host; `.invalid` never resolves.
pub const BRIDGE_HOST: &str = "bridge.sanpix.invalid";

pub const BRIDGE_ENDPOINT: &str = "https://bridge.sanpix.invalid/post";

/// Posted once per document after the page `load` event.
pub const PAGE_LOADED: &str = "PAGE_LOADED";

/// Posted by the network error page, followed by its token, `:` and the
/// failure description.
pub const LOAD_FAILED_PREFIX: &str = "LOAD_FAILED:";

const MESSAGE_PARAM: &str = "m";

/// Per-process secret embedded in the network error page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPageToken(String);

impl ErrorPageToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// What the error page prepends to the failure description.
    pub fn failure_prefix(&self) -> String {
        format!("{LOAD_FAILED_PREFIX}{}:", self.0)
    }
}

/// A decoded page → host message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMessage {
    PageLoaded,
    LoadFailed(Option<String>),
    Unknown(String),
}

impl HostMessage {
    /// Decodes `raw`. A failure report is recognised only when it carries
    /// `token`.
    pub fn parse(raw: &str, token: &ErrorPageToken) -> Self {
        if raw == PAGE_LOADED {
            return Self::PageLoaded;
        }
        if let Some(reason) = raw.strip_prefix(token.failure_prefix().as_str()) {
            let reason = reason.trim();
            return Self::LoadFailed((!reason.is_empty()).then(|| reason.to_owned()));
        }
        Self::Unknown(raw.to_owned())
    }
}

pub fn is_bridge_request(url: &Url) -> bool {
    url.host_str() == Some(BRIDGE_HOST)
}

/// Extracts the message carried by a bridge request.
pub fn decode_request(url: &Url) -> Option<String> {
    if !is_bridge_request(url) {
        return None;
    }
    url.query_pairs()
        .find(|(key, _)| key == MESSAGE_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// Builds the request URL a page script would fetch for `message`.
pub fn encode_request(message: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(MESSAGE_PARAM, message)
        .finish();
    format!("{BRIDGE_ENDPOINT}?{query}")
}
