//! Headless page model.
//!
//! A small in-process stand-in for the page context of a rendering
//! surface. The element tree is a `scraper` document, so selectors are
//! full CSS as parsed by `selectors`/`cssparser`. Around it sit mutation
//! observers, the window-opening primitive, the `document.location`
//! accessor, the load event and the page → host message outbox. The content filter can be installed natively on it
//! ([`crate::filter::ContentFilter::install`]) and the headless surface
//! ([`crate::surface::HeadlessSurface`]) creates one per document load.
//!
//! Mutation delivery follows the DOM model: tree changes queue
//! [`MutationRecord`]s, and [`Document::flush_mutations`] (the microtask
//! checkpoint) hands them to matching observers. Records produced by an
//! observer callback are delivered in a later round.

use std::collections::HashSet;
use std::rc::Rc;

use ego_tree::NodeMut;
use html5ever::tendril::StrTendril;
use html5ever::{Attribute, LocalName, QualName, ns};
use scraper::node::Element;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, warn};
use url::Url;

/// Handle of a node in the document tree.
pub use ego_tree::NodeId;

/// Upper bound on observer delivery rounds per flush.
const MAX_MUTATION_ROUNDS: usize = 64;

/// Element to insert, built fluently.
#[derive(Debug, Clone)]
pub struct ElementSpec {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<ElementSpec>,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        let name = name.to_ascii_lowercase();
        self.attributes.retain(|(existing, _)| *existing != name);
        self.attributes.push((name, value.to_owned()));
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }

    fn element(&self) -> Node {
        let attributes = self
            .attributes
            .iter()
            .map(|(name, value)| Attribute {
                name: QualName::new(None, ns!(), LocalName::from(name.as_str())),
                value: StrTendril::from_slice(value),
            })
            .collect();
        Node::Element(Element::new(
            QualName::new(None, ns!(html), LocalName::from(self.tag.as_str())),
            attributes,
        ))
    }

    fn build_under(self, parent: &mut NodeMut<'_, Node>) -> NodeId {
        let mut node = parent.append(self.element());
        for child in self.children {
            child.build_under(&mut node);
        }
        node.id()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mutation observers
// ─────────────────────────────────────────────────────────────────────────────

/// One child-list change: nodes added to or removed from `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// What an observer wants to hear about.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObserveOptions {
    pub child_list: bool,
    pub subtree: bool,
}

/// Callback invoked with the document and the batch of matching records.
pub type MutationCallback = Rc<dyn Fn(&mut Document, &[MutationRecord])>;

/// Handle returned by [`Document::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct Observer {
    id: ObserverId,
    target: NodeId,
    options: ObserveOptions,
    callback: MutationCallback,
}

// ─────────────────────────────────────────────────────────────────────────────
// Window primitives
// ─────────────────────────────────────────────────────────────────────────────

/// The window-opening primitive (`window.open`).
pub trait OpenPrimitive {
    /// Returns the URL of the spawned surface, or `None` if nothing opened.
    fn open(&mut self, url: &str) -> Option<String>;
}

/// Engine default: every call spawns a surface.
struct NativeOpen;

impl OpenPrimitive for NativeOpen {
    fn open(&mut self, url: &str) -> Option<String> {
        Some(url.to_owned())
    }
}

/// Getter/setter pair behind `document.location`.
pub trait LocationAccessor {
    fn get(&self, current: &Url) -> Url;
    /// Returns the navigation target to apply, or `None` to discard the write.
    fn set(&mut self, current: &Url, value: &str) -> Option<Url>;
}

/// Engine default: reads return the location, writes navigate.
struct NativeLocation;

impl LocationAccessor for NativeLocation {
    fn get(&self, current: &Url) -> Url {
        current.clone()
    }

    fn set(&mut self, current: &Url, value: &str) -> Option<Url> {
        current.join(value).ok()
    }
}

/// Page → host message channel.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<String>,
}

impl Outbox {
    pub fn post(&mut self, message: &str) {
        self.messages.push(message.to_owned());
    }
}

/// Listener for the page `load` event.
pub type LoadListener = Box<dyn FnMut(&mut Outbox)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Complete,
}

// ─────────────────────────────────────────────────────────────────────────────
// Document
// ─────────────────────────────────────────────────────────────────────────────

/// One loaded document and its window.
pub struct Document {
    url: Url,
    html: Html,
    root: NodeId,
    body: NodeId,
    ready_state: ReadyState,
    pending: Vec<MutationRecord>,
    observers: Vec<Observer>,
    next_observer: u64,
    open: Box<dyn OpenPrimitive>,
    location: Box<dyn LocationAccessor>,
    pending_navigation: Option<Url>,
    opened_surfaces: Vec<String>,
    load_listeners: Vec<LoadListener>,
    outbox: Outbox,
    window_flags: HashSet<String>,
}

impl Document {
    /// Fresh document with an empty `<html><body>` tree.
    pub fn new(url: Url) -> Self {
        let mut html = Html::new_document();
        let mut document_node = html.tree.root_mut();
        let mut root = document_node.append(ElementSpec::new("html").element());
        let body = root.append(ElementSpec::new("body").element()).id();
        let root = root.id();

        Self {
            url,
            html,
            root,
            body,
            ready_state: ReadyState::Loading,
            pending: Vec::new(),
            observers: Vec::new(),
            next_observer: 0,
            open: Box::new(NativeOpen),
            location: Box::new(NativeLocation),
            pending_navigation: None,
            opened_surfaces: Vec::new(),
            load_listeners: Vec::new(),
            outbox: Outbox::default(),
            window_flags: HashSet::new(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    /// The element behind `id`, attached or not.
    pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.html.tree.get(id).and_then(ElementRef::wrap)
    }

    /// Builds `spec` (with its children) and appends it under `parent`.
    /// Queues a single mutation record on `parent`.
    pub fn append(&mut self, parent: NodeId, spec: ElementSpec) -> Option<NodeId> {
        if self.element(parent).is_none() {
            warn!(?parent, "append on unknown node");
            return None;
        }
        let mut parent_node = self.html.tree.get_mut(parent)?;
        let id = spec.build_under(&mut parent_node);
        self.pending.push(MutationRecord {
            target: parent,
            added: vec![id],
            removed: Vec::new(),
        });
        Some(id)
    }

    /// Detaches `id` from its parent (`Element.remove()`).
    ///
    /// Returns `false` if the node had no parent; the root and body cannot
    /// be removed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if id == self.root || id == self.body {
            return false;
        }
        let Some(parent) = self.html.tree.get(id).and_then(|n| n.parent()).map(|p| p.id()) else {
            return false;
        };
        let Some(mut node) = self.html.tree.get_mut(id) else {
            return false;
        };
        node.detach();
        self.pending.push(MutationRecord {
            target: parent,
            added: Vec::new(),
            removed: vec![id],
        });
        true
    }

    /// Whether the node is reachable from the document root.
    pub fn is_connected(&self, id: NodeId) -> bool {
        let document_node = self.html.tree.root().id();
        self.is_inclusive_ancestor(document_node, id)
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor
            || self
                .html
                .tree
                .get(node)
                .is_some_and(|n| n.ancestors().any(|a| a.id() == ancestor))
    }

    /// Connected elements, in document order.
    pub fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.html
            .tree
            .root()
            .descendants()
            .filter_map(ElementRef::wrap)
    }

    /// Connected elements matching `selector`, in document order
    /// (`querySelectorAll`).
    pub fn select(&self, selector: &Selector) -> Vec<NodeId> {
        self.elements()
            .filter(|element| selector.matches(element))
            .map(|element| element.id())
            .collect()
    }

    /// Number of connected elements, including `<html>` and `<body>`.
    pub fn connected_count(&self) -> usize {
        self.elements().count()
    }

    // ── Mutation observers ──────────────────────────────────────────────

    pub fn observe(
        &mut self,
        target: NodeId,
        options: ObserveOptions,
        callback: MutationCallback,
    ) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push(Observer {
            id,
            target,
            options,
            callback,
        });
        id
    }

    pub fn disconnect(&mut self, id: ObserverId) {
        self.observers.retain(|o| o.id != id);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Delivers queued mutation records until the tree is quiescent.
    pub fn flush_mutations(&mut self) {
        for _ in 0..MAX_MUTATION_ROUNDS {
            if self.pending.is_empty() {
                return;
            }
            let records = std::mem::take(&mut self.pending);

            let deliveries: Vec<(MutationCallback, Vec<MutationRecord>)> = self
                .observers
                .iter()
                .filter(|o| o.options.child_list)
                .filter_map(|o| {
                    let batch: Vec<MutationRecord> = records
                        .iter()
                        .filter(|r| {
                            r.target == o.target
                                || (o.options.subtree
                                    && self.is_inclusive_ancestor(o.target, r.target))
                        })
                        .cloned()
                        .collect();
                    (!batch.is_empty()).then(|| (o.callback.clone(), batch))
                })
                .collect();

            for (callback, batch) in deliveries {
                callback(self, &batch);
            }
        }
        if !self.pending.is_empty() {
            debug!(
                pending = self.pending.len(),
                "Mutation delivery did not settle, deferring"
            );
        }
    }

    // ── Window ──────────────────────────────────────────────────────────

    /// `window.open(url)`. Returns whether a new surface was spawned.
    pub fn window_open(&mut self, url: &str) -> bool {
        match self.open.open(url) {
            Some(spawned) => {
                self.opened_surfaces.push(spawned);
                true
            }
            None => false,
        }
    }

    pub fn replace_open(&mut self, primitive: Box<dyn OpenPrimitive>) {
        self.open = primitive;
    }

    /// URLs of surfaces spawned through `window.open`.
    pub fn opened_surfaces(&self) -> &[String] {
        &self.opened_surfaces
    }

    /// Reads `document.location`.
    pub fn location(&self) -> Url {
        self.location.get(&self.url)
    }

    /// Writes `document.location`. An accepted write becomes the pending
    /// navigation for the surface to act on.
    pub fn assign_location(&mut self, value: &str) {
        if let Some(target) = self.location.set(&self.url, value) {
            self.pending_navigation = Some(target);
        }
    }

    pub fn replace_location_accessor(&mut self, accessor: Box<dyn LocationAccessor>) {
        self.location = accessor;
    }

    pub fn take_pending_navigation(&mut self) -> Option<Url> {
        self.pending_navigation.take()
    }

    /// Sets an expando flag on the window. Returns `false` if already set.
    pub fn set_window_flag(&mut self, name: &str) -> bool {
        self.window_flags.insert(name.to_owned())
    }

    // ── Load event and host channel ─────────────────────────────────────

    pub fn add_load_listener(&mut self, listener: LoadListener) {
        self.load_listeners.push(listener);
    }

    /// Dispatches the `load` event. Can fire more than once (the model does
    /// not prevent duplicate dispatch; listeners must).
    pub fn fire_load(&mut self) {
        self.ready_state = ReadyState::Complete;
        for listener in self.load_listeners.iter_mut() {
            listener(&mut self.outbox);
        }
    }

    /// Posts a message to the host directly (outside of a listener).
    pub fn post_to_host(&mut self, message: &str) {
        self.outbox.post(message);
    }

    pub fn take_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbox.messages)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn document() -> Document {
        Document::new(Url::parse("https://example.app/").unwrap())
    }

    fn css(source: &str) -> Selector {
        Selector::parse(source).unwrap()
    }

    #[test]
    fn test_append_and_select_in_document_order() {
        let mut doc = document();
        let body = doc.body();
        let outer = doc
            .append(body, ElementSpec::new("div").child(ElementSpec::new("span")))
            .unwrap();
        let last = doc.append(body, ElementSpec::new("span")).unwrap();
        let spans = doc.select(&css("span"));
        assert_eq!(spans.len(), 2);
        assert_eq!(doc.element(spans[0]).unwrap().parent().unwrap().id(), outer);
        assert_eq!(spans[1], last);
    }

    #[test]
    fn test_selectors_use_full_css() {
        let mut doc = document();
        let body = doc.body();
        doc.append(
            body,
            ElementSpec::new("aside")
                .attr("class", "sidebar")
                .child(ElementSpec::new("div").attr("class", "ad")),
        );
        doc.append(body, ElementSpec::new("div").attr("class", "ad keep"));
        doc.append(body, ElementSpec::new("p").attr("class", "广告"));

        assert_eq!(doc.select(&css(".sidebar .ad")).len(), 1);
        assert_eq!(doc.select(&css("aside > .ad, p")).len(), 2);
        assert_eq!(doc.select(&css(".ad:not(.keep)")).len(), 1);
        assert_eq!(doc.select(&css(".广告")).len(), 1);
        assert_eq!(doc.select(&css("BODY > DIV")).len(), 1);
    }

    #[test]
    fn test_removed_subtree_is_disconnected() {
        let mut doc = document();
        let body = doc.body();
        let outer = doc
            .append(body, ElementSpec::new("div").child(ElementSpec::new("p")))
            .unwrap();
        let inner = doc.select(&css("p"))[0];
        assert!(doc.is_connected(inner));
        assert!(doc.remove(outer));
        assert!(!doc.is_connected(inner));
        assert!(!doc.remove(outer));
        assert_eq!(doc.connected_count(), 2);
        assert!(doc.select(&css("p")).is_empty());
        assert_eq!(doc.element(inner).unwrap().value().name(), "p");
    }

    #[test]
    fn test_body_cannot_be_removed() {
        let mut doc = document();
        let body = doc.body();
        assert!(!doc.remove(body));
    }

    #[test]
    fn test_attributes_are_readable() {
        let mut doc = document();
        let body = doc.body();
        let id = doc
            .append(body, ElementSpec::new("IFRAME").attr("SRC", "https://ads.example.net/"))
            .unwrap();
        let element = doc.element(id).unwrap();
        assert_eq!(element.value().name(), "iframe");
        assert_eq!(element.value().attr("src"), Some("https://ads.example.net/"));
    }

    #[test]
    fn test_observer_sees_subtree_changes_only_when_asked() {
        let mut doc = document();
        let body = doc.body();
        let container = doc.append(body, ElementSpec::new("div")).unwrap();
        doc.flush_mutations();

        let direct = Rc::new(Cell::new(0));
        let deep = Rc::new(Cell::new(0));
        let d = direct.clone();
        doc.observe(
            body,
            ObserveOptions {
                child_list: true,
                subtree: false,
            },
            Rc::new(move |_, records| d.set(d.get() + records.len())),
        );
        let s = deep.clone();
        doc.observe(
            body,
            ObserveOptions {
                child_list: true,
                subtree: true,
            },
            Rc::new(move |_, records| s.set(s.get() + records.len())),
        );

        doc.append(container, ElementSpec::new("span"));
        doc.flush_mutations();
        assert_eq!(direct.get(), 0);
        assert_eq!(deep.get(), 1);
    }

    #[test]
    fn test_disconnected_observer_is_silent() {
        let mut doc = document();
        let body = doc.body();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let id = doc.observe(
            body,
            ObserveOptions {
                child_list: true,
                subtree: true,
            },
            Rc::new(move |_, _| h.set(h.get() + 1)),
        );
        doc.disconnect(id);
        doc.append(body, ElementSpec::new("div"));
        doc.flush_mutations();
        assert_eq!(hits.get(), 0);
        assert_eq!(doc.observer_count(), 0);
    }

    #[test]
    fn test_native_location_and_open() {
        let mut doc = document();
        assert_eq!(doc.location().as_str(), "https://example.app/");
        doc.assign_location("/movie/1");
        assert_eq!(
            doc.take_pending_navigation().unwrap().as_str(),
            "https://example.app/movie/1"
        );
        assert!(doc.window_open("https://popup.example.com/"));
        assert_eq!(doc.opened_surfaces(), ["https://popup.example.com/"]);
    }

    #[test]
    fn test_load_listeners_receive_outbox() {
        let mut doc = document();
        doc.add_load_listener(Box::new(|outbox| outbox.post("hello")));
        assert_eq!(doc.ready_state(), ReadyState::Loading);
        doc.fire_load();
        assert_eq!(doc.ready_state(), ReadyState::Complete);
        assert_eq!(doc.take_messages(), vec!["hello".to_string()]);
        assert!(doc.take_messages().is_empty());
    }
}
