//! Host controller.
//!
//! Wires the gatekeeper, the load-lifecycle coordinator and the content
//! filter to one rendering surface. The embedder (or a test) feeds every
//! [`SurfaceEvent`] to [`Host::handle`] and routes navigation attempts
//! through [`Host::authorize`].

use std::cell::{Cell, RefCell};

use tracing::{debug, info, warn};
use url::Url;

use crate::back_navigation::{self, BackPress};
use crate::bridge::{self, ErrorPageToken, HostMessage};
use crate::config::Config;
use crate::filter::ContentFilter;
use crate::gatekeeper::{Gatekeeper, NavigationRequest, OriginError, TrustedOrigin};
use crate::lifecycle::{Effect, LoadCoordinator, LoadEvent, SurfaceLoadState, Transition};
use crate::notifications::{self, Notification};
use crate::surface::{Surface, SurfaceEvent};

pub struct Host {
    gatekeeper: Gatekeeper,
    coordinator: RefCell<LoadCoordinator>,
    filter: ContentFilter,
    error_page_token: ErrorPageToken,
    pages_loaded: Cell<u64>,
    window_focused: Cell<bool>,
}

impl Host {
    pub fn new(origin: TrustedOrigin, filter: ContentFilter) -> Self {
        Self {
            gatekeeper: Gatekeeper::new(origin),
            coordinator: RefCell::new(LoadCoordinator::new()),
            filter,
            error_page_token: ErrorPageToken::generate(),
            pages_loaded: Cell::new(0),
            window_focused: Cell::new(true),
        }
    }

    /// Builds the host from `[general]` and `[filter]`. Fails only on an
    /// invalid trusted origin.
    pub fn from_config(config: &Config) -> Result<Self, OriginError> {
        let origin = TrustedOrigin::parse(&config.general.trusted_origin)?;
        Ok(Self::new(origin, ContentFilter::new(&config.filter.selectors)))
    }

    /// Opens `url` on `surface`, or the origin root if `url` is not allowed.
    pub fn start<S: Surface + ?Sized>(&self, surface: &S, url: &Url) {
        if self.authorize(&NavigationRequest::top_level(url.as_str())) {
            surface.load(url);
        } else {
            surface.load(self.gatekeeper.origin().url());
        }
    }

    /// Applies one surface event. Returns the lifecycle transition, if the
    /// event was a lifecycle event.
    pub fn handle<S: Surface + ?Sized>(&self, surface: &S, event: SurfaceEvent) -> Option<Transition> {
        let load_event = match event {
            SurfaceEvent::LoadStarted => LoadEvent::LoadStarted,
            SurfaceEvent::DocumentReady => {
                surface.install_filter(&self.filter);
                return None;
            }
            SurfaceEvent::LoadFinished => LoadEvent::LoadFinished,
            SurfaceEvent::LoadFailed(reason) => LoadEvent::LoadFailed(reason),
            SurfaceEvent::HistoryChanged {
                can_go_back,
                loading,
            } => LoadEvent::NavigationStateChanged {
                can_go_back,
                loading,
            },
            SurfaceEvent::Message(raw) => match HostMessage::parse(&raw, &self.error_page_token) {
                HostMessage::PageLoaded => {
                    self.pages_loaded.set(self.pages_loaded.get() + 1);
                    info!(total = self.pages_loaded.get(), "Page loaded");
                    return None;
                }
                HostMessage::LoadFailed(reason) => LoadEvent::LoadFailed(reason),
                HostMessage::Unknown(raw) if raw.starts_with(bridge::LOAD_FAILED_PREFIX) => {
                    warn!(message = %raw, "Unverified load failure report ignored");
                    return None;
                }
                HostMessage::Unknown(raw) => {
                    debug!(message = %raw, "Unrecognized page message ignored");
                    return None;
                }
            },
        };
        Some(self.apply(surface, load_event))
    }

    pub fn authorize(&self, request: &NavigationRequest<'_>) -> bool {
        self.gatekeeper.authorize(request)
    }

    /// User-initiated retry. Reloads only if the surface is in `Failed`.
    pub fn retry<S: Surface + ?Sized>(&self, surface: &S) -> Transition {
        self.apply(surface, LoadEvent::Retry)
    }

    pub fn back_pressed<S: Surface + ?Sized>(&self, surface: &S) -> BackPress {
        let coordinator = self.coordinator.borrow();
        back_navigation::handle_back_press(&coordinator, surface)
    }

    fn apply<S: Surface + ?Sized>(&self, surface: &S, event: LoadEvent) -> Transition {
        let transition = self.coordinator.borrow_mut().apply(event);
        if transition.effect == Some(Effect::Reload) {
            surface.reload();
        }
        if transition.changed() {
            self.notify_if_unfocused(&transition.to);
        }
        transition
    }

    fn notify_if_unfocused(&self, state: &SurfaceLoadState) {
        if self.window_focused.get() {
            return;
        }
        let notification = match state {
            SurfaceLoadState::Loaded => Notification::new("Ready", "The site finished loading."),
            SurfaceLoadState::Failed(reason) => Notification::new("Load failed", reason.clone()),
            _ => return,
        };
        if let Err(e) = notifications::deliver(&notification) {
            debug!(error = %e, "Notification not delivered");
        }
    }

    pub fn set_window_focused(&self, focused: bool) {
        self.window_focused.set(focused);
    }

    pub fn state(&self) -> SurfaceLoadState {
        self.coordinator.borrow().state().clone()
    }

    pub fn can_go_back(&self) -> bool {
        self.coordinator.borrow().can_go_back()
    }

    /// `PAGE_LOADED` signals received so far.
    pub fn pages_loaded(&self) -> u64 {
        self.pages_loaded.get()
    }

    /// Window-title text reflecting the load state.
    pub fn status_line(&self, title: &str) -> String {
        match self.coordinator.borrow().state() {
            SurfaceLoadState::Loading => format!("{title} | Loading..."),
            SurfaceLoadState::Failed(reason) => format!("{title} | {reason} (F5 to retry)"),
            SurfaceLoadState::Idle | SurfaceLoadState::Loaded => title.to_owned(),
        }
    }

    /// Token the network error page must present with a failure report.
    pub fn error_page_token(&self) -> &ErrorPageToken {
        &self.error_page_token
    }

    pub fn gatekeeper(&self) -> &Gatekeeper {
        &self.gatekeeper
    }

    pub fn filter(&self) -> &ContentFilter {
        &self.filter
    }
}
