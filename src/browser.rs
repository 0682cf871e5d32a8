//! winit event loop and window lifecycle.
//!
//! ## Two-phase app
//!
//! winit 0.30 only allows window creation inside `resumed()`, and Servo needs
//! the window to build its rendering context:
//!
//! ```text
//! App::Initial { .. }  →  [resumed()]  →  App::Running(Rc<AppState>)
//! ```
//!
//! ## Event flow
//!
//! ```text
//! Servo threads ── wake() ──▶ EventLoopProxy::send_event(AppEvent::Wake)
//!                                   │
//!                                   ▼
//!                 user_event() → servo.spin_event_loop()
//!                                   └─ WebViewDelegate callbacks
//!                                        └─ Host::handle(SurfaceEvent)
//! ```
//!
//! The page fills the whole window; the title bar doubles as the status
//! line (loading, failure reason and the retry hint).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use euclid::Scale;
use servo::{InputEvent, WheelDelta, WheelEvent, WheelMode};
use servo::{MouseButton as ServoMouseButton, MouseButtonAction, MouseButtonEvent};
use servo::{MouseLeftViewportEvent, MouseMoveEvent};
use servo::{RenderingContext, Servo, ServoBuilder, WebView, WebViewBuilder, WindowRenderingContext};
use tracing::{debug, error, info, warn};
use url::Url;
use webrender_api::units::DevicePoint;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseButton as WinitMouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, ModifiersState, NamedKey};
use winit::raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::{UserAttentionType, Window, WindowId};

use crate::back_navigation::BackPress;
use crate::config::Config;
use crate::host::Host;
use crate::notifications::{self, Subscription};
use crate::servo_glue::{AppEvent, Waker};
use crate::surface::{Surface, SurfaceEvent};
use crate::{keyutils, preferences, rendering};

/// Pixels per wheel "line".
const LINE_HEIGHT: f32 = 76.0;

// ─────────────────────────────────────────────────────────────────────────────
// AppState
// ─────────────────────────────────────────────────────────────────────────────

/// Application state shared by winit and Servo, created in `resumed()`.
///
/// `Rc` because Servo takes the delegate as `Rc<dyn WebViewDelegate>`;
/// everything lives on the main thread.
pub struct AppState {
    pub window: Window,
    pub servo: Servo,
    pub rendering_context: Rc<WindowRenderingContext>,
    /// Created right after the state, as the webview needs the delegate.
    pub webview: RefCell<Option<WebView>>,
    pub host: Host,
    pub title: String,
    pub cursor_position: Cell<DevicePoint>,
    pub modifiers: Cell<ModifiersState>,
    /// Forwards notifications to the event loop; dropped on exit.
    notification_subscription: RefCell<Option<Subscription>>,
}

impl AppState {
    fn webview(&self) -> Option<WebView> {
        self.webview.borrow().clone()
    }

    /// Hands a surface event to the host and refreshes the title.
    pub(crate) fn dispatch(&self, webview: &WebView, event: SurfaceEvent) {
        self.host.handle(webview, event);
        self.refresh_title();
    }

    fn refresh_title(&self) {
        self.window.set_title(&self.host.status_line(&self.title));
    }

    fn retry(&self) {
        let Some(webview) = self.webview() else { return };
        if self.host.state().failure_reason().is_some() {
            self.host.retry(&webview);
        } else {
            Surface::reload(&webview);
        }
        self.refresh_title();
    }

    fn back(&self) {
        let Some(webview) = self.webview() else { return };
        if self.host.back_pressed(&webview) == BackPress::NotConsumed {
            debug!("Back press with no history");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// App
// ─────────────────────────────────────────────────────────────────────────────

pub enum App {
    /// Waiting for winit to call `resumed()`.
    Initial {
        waker: Waker,
        config: Config,
        host: Option<Host>,
        start_url: Url,
    },
    Running(Rc<AppState>),
}

impl App {
    pub fn new(event_loop: &EventLoop<AppEvent>, config: Config, host: Host, start_url: Url) -> Self {
        Self::Initial {
            waker: Waker::new(event_loop),
            config,
            host: Some(host),
            start_url,
        }
    }

    fn state(&self) -> Option<&Rc<AppState>> {
        match self {
            Self::Running(state) => Some(state),
            Self::Initial { .. } => None,
        }
    }
}

fn servo_button(button: WinitMouseButton) -> ServoMouseButton {
    match button {
        WinitMouseButton::Left => ServoMouseButton::Left,
        WinitMouseButton::Right => ServoMouseButton::Right,
        WinitMouseButton::Middle => ServoMouseButton::Middle,
        WinitMouseButton::Back => ServoMouseButton::Back,
        WinitMouseButton::Forward => ServoMouseButton::Forward,
        WinitMouseButton::Other(id) => ServoMouseButton::Other(id),
    }
}

fn is_retry_shortcut(key: &Key, mods: ModifiersState) -> bool {
    match key {
        Key::Named(NamedKey::F5) => true,
        Key::Character(c) => mods.control_key() && c.eq_ignore_ascii_case("r"),
        _ => false,
    }
}

fn is_back_shortcut(key: &Key, mods: ModifiersState) -> bool {
    match key {
        Key::Named(NamedKey::BrowserBack) => true,
        Key::Named(NamedKey::ArrowLeft) => mods.alt_key(),
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ApplicationHandler
// ─────────────────────────────────────────────────────────────────────────────

impl ApplicationHandler<AppEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Self::Initial {
            waker,
            config,
            host,
            start_url,
        } = self
        else {
            return;
        };
        let Some(host) = host.take() else { return };

        // ── 1. Window ──────────────────────────────────────────────────
        let window_attributes = Window::default_attributes()
            .with_title(&config.general.window_title)
            .with_inner_size(winit::dpi::LogicalSize::new(
                config.window.width as f64,
                config.window.height as f64,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => window,
            Err(e) => {
                error!(error = %e, "Cannot create the window");
                event_loop.exit();
                return;
            }
        };

        // ── 2. Rendering context ───────────────────────────────────────
        let handles = event_loop
            .display_handle()
            .map_err(|e| e.to_string())
            .and_then(|display| {
                window
                    .window_handle()
                    .map(|handle| (display, handle))
                    .map_err(|e| e.to_string())
            });
        let rendering_context = match handles.map_err(rendering::RenderingError::from).and_then(
            |(display, handle)| rendering::create_rendering_context(display, handle, window.inner_size()),
        ) {
            Ok(context) => context,
            Err(e) => {
                error!(error = %e, "Cannot set up rendering");
                event_loop.exit();
                return;
            }
        };

        // ── 3. Servo ───────────────────────────────────────────────────
        let servo = ServoBuilder::default()
            .preferences(preferences::build_servo_preferences(&config.engine))
            .event_loop_waker(Box::new(waker.clone()))
            .build();

        // ── 4. Notifications → event loop ──────────────────────────────
        let proxy = waker.proxy();
        let notification_subscription = notifications::subscribe(move |notification, presentation| {
            let event = AppEvent::Notification {
                notification: notification.clone(),
                presentation,
            };
            if let Err(error) = proxy.send_event(event) {
                warn!(?error, "Notification dropped, event loop closed");
            }
        })
        .inspect_err(|e| warn!(error = %e, "Notifications unavailable"))
        .ok();

        let app_state = Rc::new(AppState {
            window,
            servo,
            rendering_context: rendering_context.clone(),
            webview: RefCell::new(None),
            host,
            title: config.general.window_title.clone(),
            cursor_position: Cell::new(DevicePoint::zero()),
            modifiers: Cell::new(ModifiersState::default()),
            notification_subscription: RefCell::new(notification_subscription),
        });

        // ── 5. WebView ─────────────────────────────────────────────────
        let scale_factor = app_state.window.scale_factor() as f32;
        let webview = WebViewBuilder::new(
            &app_state.servo,
            rendering_context as Rc<dyn RenderingContext>,
        )
        .hidpi_scale_factor(Scale::new(scale_factor))
        .delegate(app_state.clone())
        .build();

        app_state.host.start(&webview, start_url);
        *app_state.webview.borrow_mut() = Some(webview);
        app_state.refresh_title();
        info!(url = %start_url, "Window ready");

        *self = Self::Running(app_state);
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: AppEvent) {
        let Some(state) = self.state() else { return };
        match event {
            AppEvent::Wake => state.servo.spin_event_loop(),
            AppEvent::Notification {
                notification,
                presentation,
            } => {
                info!(title = %notification.title, body = %notification.body, "Notification");
                if presentation.alert || presentation.badge {
                    state
                        .window
                        .request_user_attention(Some(UserAttentionType::Informational));
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(state) = self.state() else { return };
        state.servo.spin_event_loop();

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }

            WindowEvent::RedrawRequested => {
                if let Some(webview) = state.webview() {
                    webview.paint();
                }
                state.rendering_context.present();
            }

            WindowEvent::Resized(new_size) => {
                state.rendering_context.resize(new_size);
                if let Some(webview) = state.webview() {
                    webview.resize(new_size);
                }
            }

            WindowEvent::Focused(focused) => {
                state.host.set_window_focused(focused);
                if focused {
                    state.window.request_user_attention(None);
                }
            }

            WindowEvent::ModifiersChanged(new_modifiers) => {
                state.modifiers.set(new_modifiers.state());
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let Some(webview) = state.webview() else { return };
                let (x, y, mode) = match delta {
                    MouseScrollDelta::LineDelta(dx, dy) => (
                        (dx * LINE_HEIGHT) as f64,
                        (dy * LINE_HEIGHT) as f64,
                        WheelMode::DeltaLine,
                    ),
                    MouseScrollDelta::PixelDelta(delta) => (delta.x, delta.y, WheelMode::DeltaPixel),
                };
                webview.notify_input_event(InputEvent::Wheel(WheelEvent::new(
                    WheelDelta { x, y, z: 0.0, mode },
                    state.cursor_position.get().into(),
                )));
            }

            WindowEvent::CursorMoved { position, .. } => {
                let point = DevicePoint::new(position.x as f32, position.y as f32);
                state.cursor_position.set(point);
                if let Some(webview) = state.webview() {
                    webview.notify_input_event(InputEvent::MouseMove(MouseMoveEvent::new(point.into())));
                }
            }

            WindowEvent::CursorLeft { .. } => {
                if let Some(webview) = state.webview() {
                    webview.notify_input_event(InputEvent::MouseLeftViewport(
                        MouseLeftViewportEvent::default(),
                    ));
                }
            }

            WindowEvent::MouseInput {
                state: button_state,
                button,
                ..
            } => {
                if button == WinitMouseButton::Back {
                    if button_state == ElementState::Pressed {
                        state.back();
                    }
                    return;
                }
                let Some(webview) = state.webview() else { return };
                let action = match button_state {
                    ElementState::Pressed => MouseButtonAction::Down,
                    ElementState::Released => MouseButtonAction::Up,
                };
                webview.notify_input_event(InputEvent::MouseButton(MouseButtonEvent::new(
                    action,
                    servo_button(button),
                    state.cursor_position.get().into(),
                )));
            }

            WindowEvent::KeyboardInput { event, .. } => {
                let mods = state.modifiers.get();
                if event.state == ElementState::Pressed {
                    if is_retry_shortcut(&event.logical_key, mods) {
                        state.retry();
                        return;
                    }
                    if is_back_shortcut(&event.logical_key, mods) {
                        state.back();
                        return;
                    }
                }
                if let Some(webview) = state.webview() {
                    let keyboard_event = keyutils::keyboard_event_from_winit(&event, mods);
                    webview.notify_input_event(InputEvent::Keyboard(keyboard_event));
                }
            }

            _ => (),
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = self.state() {
            state.notification_subscription.borrow_mut().take();
            info!(
                pages_loaded = state.host.pages_loaded(),
                blocked = state.host.gatekeeper().blocked_total(),
                "Shutting down"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_shortcuts() {
        let none = ModifiersState::empty();
        assert!(is_retry_shortcut(&Key::Named(NamedKey::F5), none));
        assert!(is_retry_shortcut(&Key::Character("r".into()), ModifiersState::CONTROL));
        assert!(is_retry_shortcut(&Key::Character("R".into()), ModifiersState::CONTROL));
        assert!(!is_retry_shortcut(&Key::Character("r".into()), none));
    }

    #[test]
    fn test_back_shortcuts() {
        let none = ModifiersState::empty();
        assert!(is_back_shortcut(&Key::Named(NamedKey::BrowserBack), none));
        assert!(is_back_shortcut(&Key::Named(NamedKey::ArrowLeft), ModifiersState::ALT));
        assert!(!is_back_shortcut(&Key::Named(NamedKey::ArrowLeft), none));
        assert!(!is_back_shortcut(&Key::Character("b".into()), ModifiersState::ALT));
    }
}
