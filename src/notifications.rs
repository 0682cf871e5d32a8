//! Local notification center.
//!
//! A [`NotificationCenter`] fans notifications out to subscribed listeners,
//! each receiving the [`Presentation`] allowed by the configured
//! [`NotificationPolicy`]. Subscriptions are RAII: dropping the
//! [`Subscription`] unregisters the listener.
//!
//! The application uses one center per process, installed explicitly with
//! [`init`] at startup and removed with [`teardown`] on exit. The slot lives
//! on the UI thread, like the rest of the host state.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which presentation options a notification may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPolicy {
    pub show_alert: bool,
    pub play_sound: bool,
    pub set_badge: bool,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            show_alert: true,
            play_sound: true,
            set_badge: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// How a listener should present one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presentation {
    pub alert: bool,
    pub sound: bool,
    pub badge: bool,
}

impl From<NotificationPolicy> for Presentation {
    fn from(policy: NotificationPolicy) -> Self {
        Self {
            alert: policy.show_alert,
            sound: policy.play_sound,
            badge: policy.set_badge,
        }
    }
}

pub type Listener = Rc<dyn Fn(&Notification, Presentation)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationError {
    AlreadyInitialized,
    NotInitialized,
}

impl fmt::Display for NotificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationError::AlreadyInitialized => {
                write!(f, "notification center already initialized")
            }
            NotificationError::NotInitialized => write!(f, "notification center not initialized"),
        }
    }
}

impl std::error::Error for NotificationError {}

pub struct NotificationCenter {
    policy: NotificationPolicy,
    listeners: RefCell<Vec<(u64, Listener)>>,
    next_id: Cell<u64>,
}

impl NotificationCenter {
    pub fn new(policy: NotificationPolicy) -> Rc<Self> {
        Rc::new(Self {
            policy,
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        })
    }

    pub fn policy(&self) -> NotificationPolicy {
        self.policy
    }

    pub fn subscribe(self: &Rc<Self>, listener: impl Fn(&Notification, Presentation) + 'static) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        Subscription {
            center: Rc::downgrade(self),
            id,
        }
    }

    /// Hands `notification` to every listener. Returns how many were reached.
    pub fn deliver(&self, notification: &Notification) -> usize {
        // Snapshot so a listener may subscribe or unsubscribe while running.
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        let presentation = Presentation::from(self.policy);
        for listener in &listeners {
            listener(notification, presentation);
        }
        debug!(title = %notification.title, listeners = listeners.len(), "Notification delivered");
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    fn unsubscribe(&self, id: u64) {
        self.listeners.borrow_mut().retain(|(other, _)| *other != id);
    }
}

/// Keeps a listener registered. Dropping it unregisters the listener; after
/// the center is gone this is a no-op.
#[must_use = "dropping a Subscription unregisters the listener"]
pub struct Subscription {
    center: Weak<NotificationCenter>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(center) = self.center.upgrade() {
            center.unsubscribe(self.id);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Process-wide center
// ─────────────────────────────────────────────────────────────────────────────

thread_local! {
    static CENTER: RefCell<Option<Rc<NotificationCenter>>> = const { RefCell::new(None) };
}

/// Installs the process-wide center.
pub fn init(policy: NotificationPolicy) -> Result<(), NotificationError> {
    CENTER.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return Err(NotificationError::AlreadyInitialized);
        }
        *slot = Some(NotificationCenter::new(policy));
        info!(?policy, "Notification center initialized");
        Ok(())
    })
}

fn current() -> Result<Rc<NotificationCenter>, NotificationError> {
    CENTER.with(|slot| slot.borrow().clone().ok_or(NotificationError::NotInitialized))
}

pub fn subscribe(
    listener: impl Fn(&Notification, Presentation) + 'static,
) -> Result<Subscription, NotificationError> {
    Ok(current()?.subscribe(listener))
}

pub fn deliver(notification: &Notification) -> Result<usize, NotificationError> {
    Ok(current()?.deliver(notification))
}

/// Removes the process-wide center. Returns whether one was installed.
pub fn teardown() -> bool {
    let removed = CENTER.with(|slot| slot.borrow_mut().take()).is_some();
    if removed {
        info!("Notification center torn down");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Rc<Cell<usize>>, impl Fn(&Notification, Presentation) + 'static) {
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        (hits, move |_: &Notification, _: Presentation| h.set(h.get() + 1))
    }

    #[test]
    fn test_subscription_drop_unregisters() {
        let center = NotificationCenter::new(NotificationPolicy::default());
        let (hits, listener) = counter();
        let subscription = center.subscribe(listener);
        assert_eq!(center.deliver(&Notification::new("a", "b")), 1);
        drop(subscription);
        assert_eq!(center.deliver(&Notification::new("a", "b")), 0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_presentation_follows_policy() {
        let center = NotificationCenter::new(NotificationPolicy {
            show_alert: true,
            play_sound: false,
            set_badge: false,
        });
        let seen = Rc::new(Cell::new(None));
        let s = seen.clone();
        let _sub = center.subscribe(move |_, presentation| s.set(Some(presentation)));
        center.deliver(&Notification::new("t", ""));
        assert_eq!(
            seen.get(),
            Some(Presentation {
                alert: true,
                sound: false,
                badge: false
            })
        );
    }

    #[test]
    fn test_subscription_outliving_center_is_harmless() {
        let center = NotificationCenter::new(NotificationPolicy::default());
        let (_, listener) = counter();
        let subscription = center.subscribe(listener);
        drop(center);
        drop(subscription);
    }

    #[test]
    fn test_process_wide_lifecycle() {
        // Each test runs on its own thread, so the slot starts empty.
        assert_eq!(
            deliver(&Notification::new("x", "y")),
            Err(NotificationError::NotInitialized)
        );
        init(NotificationPolicy::default()).unwrap();
        assert_eq!(
            init(NotificationPolicy::default()),
            Err(NotificationError::AlreadyInitialized)
        );

        let (hits, listener) = counter();
        let subscription = subscribe(listener).unwrap();
        assert_eq!(deliver(&Notification::new("x", "y")), Ok(1));

        assert!(teardown());
        assert!(!teardown());
        drop(subscription);
        assert_eq!(hits.get(), 1);
        assert!(subscribe(|_, _| {}).is_err());
    }
}
