//! Servo integration layer.
//!
//! 1. **[`Waker`] / [`AppEvent`]**: the `Send + Sync` bridge from Servo's
//!    internal threads (and the notification center) to the winit main
//!    thread.
//!
//! 2. **[`Surface`] for [`WebView`]**: the host's view of the engine.
//!
//! 3. **[`WebViewDelegate`] for [`AppState`]**: maps Servo callbacks to
//!    [`SurfaceEvent`]s for the [`Host`](crate::host::Host), routes top-level
//!    navigation and new-window requests through the gatekeeper and decodes
//!    page → host bridge requests.

use servo::{
    CreateNewWebViewRequest, LoadStatus, WebResourceLoad, WebResourceResponse, WebView,
    WebViewDelegate,
};
use servo::NavigationRequest as ServoNavigationRequest;
use tracing::{debug, info, warn};
use url::Url;
use winit::event_loop::{EventLoop, EventLoopProxy};

use crate::bridge;
use crate::browser::AppState;
use crate::filter::ContentFilter;
use crate::gatekeeper::NavigationRequest;
use crate::notifications::{Notification, Presentation};
use crate::surface::{Surface, SurfaceEvent};

// ─────────────────────────────────────────────────────────────────────────────
// Waker : Servo → winit
// ─────────────────────────────────────────────────────────────────────────────

/// Events delivered to the winit loop through its `EventLoopProxy`.
#[derive(Debug)]
pub enum AppEvent {
    /// Servo has work for the main thread; answer with `spin_event_loop()`.
    Wake,
    /// A local notification to present.
    Notification {
        notification: Notification,
        presentation: Presentation,
    },
}

/// `EventLoopWaker` backed by the winit proxy.
///
/// `Clone + Send + Sync` because `EventLoopProxy` is, as required by
/// `EventLoopWaker: 'static + Send + Sync`.
#[derive(Clone)]
pub struct Waker(EventLoopProxy<AppEvent>);

impl Waker {
    pub fn new(event_loop: &EventLoop<AppEvent>) -> Self {
        Self(event_loop.create_proxy())
    }

    pub fn proxy(&self) -> EventLoopProxy<AppEvent> {
        self.0.clone()
    }
}

impl embedder_traits::EventLoopWaker for Waker {
    fn clone_box(&self) -> Box<dyn embedder_traits::EventLoopWaker> {
        Box::new(Self(self.0.clone()))
    }

    fn wake(&self) {
        if let Err(error) = self.0.send_event(AppEvent::Wake) {
            warn!(?error, "Failed to wake the winit event loop");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Surface for WebView
// ─────────────────────────────────────────────────────────────────────────────

impl Surface for WebView {
    fn load(&self, url: &Url) {
        WebView::load(self, url.clone());
    }

    fn reload(&self) {
        WebView::reload(self);
    }

    fn go_back(&self) {
        WebView::go_back(self, 1);
    }

    fn install_filter(&self, filter: &ContentFilter) {
        self.evaluate_javascript(filter.script(), |result| {
            if let Err(error) = result {
                debug!(?error, "Content filter injection failed");
            }
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WebViewDelegate
// ─────────────────────────────────────────────────────────────────────────────

/// Every callback runs under `catch_unwind`: a panic must not cross back
/// into Servo.
impl WebViewDelegate for AppState {
    fn notify_new_frame_ready(&self, _webview: WebView) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.window.request_redraw();
        }));
    }

    /// `HeadParsed` is the earliest point where script injection sticks to
    /// the new document.
    fn notify_load_status_changed(&self, webview: WebView, status: LoadStatus) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let event = match status {
                LoadStatus::Started => SurfaceEvent::LoadStarted,
                LoadStatus::HeadParsed => SurfaceEvent::DocumentReady,
                LoadStatus::Complete => SurfaceEvent::LoadFinished,
            };
            self.dispatch(&webview, event);
        }));
    }

    fn notify_history_changed(&self, webview: WebView, entries: Vec<Url>, current: usize) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            debug!(entries = entries.len(), current, "History changed");
            let loading = webview.load_status() != LoadStatus::Complete;
            self.dispatch(
                &webview,
                SurfaceEvent::HistoryChanged {
                    can_go_back: current > 0,
                    loading,
                },
            );
        }));
    }

    fn notify_crashed(&self, webview: WebView, reason: String, _backtrace: Option<String>) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            warn!(%reason, "Content process crashed");
            self.dispatch(&webview, SurfaceEvent::LoadFailed(Some(reason)));
        }));
    }

    /// Top-level navigations are allowed only inside the trusted origin.
    fn request_navigation(&self, _webview: WebView, navigation_request: ServoNavigationRequest) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let url = navigation_request.url.to_string();
            if self.host.authorize(&NavigationRequest::top_level(&url)) {
                navigation_request.allow();
            } else {
                navigation_request.deny();
            }
        }));
    }

    /// Window-opening requests that got past the page script. The target is
    /// not known yet, so the gatekeeper denies and records it. Dropping the
    /// request without building a webview refuses it.
    fn request_create_new(&self, _parent_webview: WebView, request: CreateNewWebViewRequest) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            if !self.host.authorize(&NavigationRequest::new_surface(None)) {
                info!("New window refused");
            }
            drop(request);
        }));
    }

    /// Decodes and cancels bridge requests; every other load proceeds.
    fn load_web_resource(&self, webview: WebView, load: WebResourceLoad) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let request = load.request();
            if !bridge::is_bridge_request(&request.url) {
                return;
            }
            let url = request.url.clone();
            let message = bridge::decode_request(&url);
            load.intercept(WebResourceResponse::new(url)).cancel();

            match message {
                Some(message) => self.dispatch(&webview, SurfaceEvent::Message(message)),
                None => debug!("Bridge request without a message"),
            }
        }));
    }
}
