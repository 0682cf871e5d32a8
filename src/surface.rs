//! Rendering surface abstraction.
//!
//! The host drives a [`Surface`] (load, reload, history back, script
//! injection) and reacts to the [`SurfaceEvent`]s it reports. The desktop
//! embedder implements it for a Servo `WebView`; [`HeadlessSurface`] runs
//! the same protocol over the in-process [`page`](crate::page) model.

use std::cell::RefCell;
use std::collections::VecDeque;

use tracing::{debug, warn};
use url::Url;

use crate::filter::ContentFilter;
use crate::gatekeeper::NavigationRequest;
use crate::page::Document;

/// Operations the host performs on a surface.
///
/// Methods take `&self`: surfaces are handles shared with engine callbacks.
pub trait Surface {
    fn load(&self, url: &Url);
    fn reload(&self);
    fn go_back(&self);
    /// Injects the content filter into the current document.
    fn install_filter(&self, filter: &ContentFilter);
}

/// What a surface reports back to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    LoadStarted,
    /// A fresh document exists and accepts script injection.
    DocumentReady,
    LoadFinished,
    LoadFailed(Option<String>),
    HistoryChanged { can_go_back: bool, loading: bool },
    /// Page → host message payload.
    Message(String),
}

#[derive(Default)]
struct Inner {
    document: Option<Document>,
    history: Vec<Url>,
    index: usize,
    events: VecDeque<SurfaceEvent>,
    failures: VecDeque<Option<String>>,
    documents_created: usize,
}

impl Inner {
    fn navigate_current(&mut self) {
        let Some(url) = self.history.get(self.index).cloned() else {
            return;
        };
        self.events.push_back(SurfaceEvent::LoadStarted);

        if let Some(reason) = self.failures.pop_front() {
            debug!(%url, "Simulated network failure");
            self.document = None;
            self.events.push_back(SurfaceEvent::LoadFailed(reason));
            return;
        }

        self.document = Some(Document::new(url));
        self.documents_created += 1;
        self.events.push_back(SurfaceEvent::DocumentReady);
        self.events.push_back(SurfaceEvent::HistoryChanged {
            can_go_back: self.index > 0,
            loading: true,
        });
        self.events.push_back(SurfaceEvent::LoadFinished);
    }

    fn drain_messages(&mut self) {
        if let Some(document) = self.document.as_mut() {
            for message in document.take_messages() {
                self.events.push_back(SurfaceEvent::Message(message));
            }
        }
    }
}

/// A [`Surface`] over the headless page model.
///
/// Loads complete synchronously into the event queue; the caller pumps
/// [`HeadlessSurface::next_event`] and hands each event to the host. The
/// page `load` event fires when `LoadFinished` is dequeued, so scripts
/// installed on `DocumentReady` observe it.
#[derive(Default)]
pub struct HeadlessSurface {
    inner: RefCell<Inner>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next navigation fail with `reason`.
    pub fn fail_next_load(&self, reason: Option<&str>) {
        self.inner
            .borrow_mut()
            .failures
            .push_back(reason.map(str::to_owned));
    }

    pub fn next_event(&self) -> Option<SurfaceEvent> {
        let mut inner = self.inner.borrow_mut();
        let event = inner.events.pop_front()?;
        if event == SurfaceEvent::LoadFinished
            && let Some(document) = inner.document.as_mut()
        {
            document.fire_load();
            document.flush_mutations();
            let messages = document.take_messages();
            for message in messages.into_iter().rev() {
                inner.events.push_front(SurfaceEvent::Message(message));
            }
        }
        Some(event)
    }

    /// Runs `f` against the current document, then delivers pending
    /// mutations and collects posted messages. `None` when no document is
    /// loaded (initial state or after a failed load).
    pub fn with_document<R>(&self, f: impl FnOnce(&mut Document) -> R) -> Option<R> {
        let mut inner = self.inner.borrow_mut();
        let document = inner.document.as_mut()?;
        let result = f(document);
        document.flush_mutations();
        inner.drain_messages();
        Some(result)
    }

    /// Dispatches another `load` event on the current document.
    pub fn dispatch_load_event(&self) {
        let mut inner = self.inner.borrow_mut();
        if let Some(document) = inner.document.as_mut() {
            document.fire_load();
        }
        inner.drain_messages();
    }

    /// Follows a link from the page, subject to `gate`.
    /// Returns whether the navigation happened.
    pub fn follow_link(&self, url: &str, gate: impl Fn(&NavigationRequest<'_>) -> bool) -> bool {
        if !gate(&NavigationRequest::top_level(url)) {
            return false;
        }
        match Url::parse(url) {
            Ok(url) => {
                self.load(&url);
                true
            }
            Err(error) => {
                warn!(url, %error, "Unparseable link");
                false
            }
        }
    }

    pub fn documents_created(&self) -> usize {
        self.inner.borrow().documents_created
    }

    pub fn current_url(&self) -> Option<Url> {
        let inner = self.inner.borrow();
        inner.history.get(inner.index).cloned()
    }
}

impl Surface for HeadlessSurface {
    fn load(&self, url: &Url) {
        let mut inner = self.inner.borrow_mut();
        if !inner.history.is_empty() {
            let keep = inner.index + 1;
            inner.history.truncate(keep);
        }
        inner.history.push(url.clone());
        inner.index = inner.history.len() - 1;
        inner.navigate_current();
    }

    fn reload(&self) {
        self.inner.borrow_mut().navigate_current();
    }

    fn go_back(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.index == 0 {
            debug!("go_back with no history");
            return;
        }
        inner.index -= 1;
        inner.navigate_current();
    }

    fn install_filter(&self, filter: &ContentFilter) {
        let mut inner = self.inner.borrow_mut();
        if let Some(document) = inner.document.as_mut() {
            filter.install(document);
            document.flush_mutations();
        }
        inner.drain_messages();
    }
}
