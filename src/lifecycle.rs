//! Load-lifecycle coordinator.
//!
//! One [`LoadCoordinator`] per rendering surface. It owns the
//! [`SurfaceLoadState`] and the mirrored `can_go_back` flag, and is the
//! only thing that mutates them. The transition function is total: every
//! state accepts every [`LoadEvent`].
//!
//! ```text
//!            LoadStarted                LoadFinished
//!   Idle ──────────────▶ Loading ───────────────────▶ Loaded
//!                          │  ▲                          │
//!               LoadFailed │  │ Retry (Effect::Reload)   │ LoadStarted /
//!                          ▼  │                          │ nav-state loading
//!                         Failed ◀───────────────────────┘ (back to Loading)
//! ```

use std::fmt;

use tracing::{debug, info, warn};

/// Reason used when the engine reports an error without a description.
pub const DEFAULT_FAILURE_REASON: &str = "Failed to load the website";

/// Load state of a rendering surface.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SurfaceLoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

impl SurfaceLoadState {
    pub fn is_loading(&self) -> bool {
        matches!(self, SurfaceLoadState::Loading)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            SurfaceLoadState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for SurfaceLoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceLoadState::Idle => write!(f, "idle"),
            SurfaceLoadState::Loading => write!(f, "loading"),
            SurfaceLoadState::Loaded => write!(f, "loaded"),
            SurfaceLoadState::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Events from the surface (and the retry action from the user).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadEvent {
    LoadStarted,
    LoadFinished,
    /// Engine-reported error, with its description if it gave one.
    LoadFailed(Option<String>),
    Retry,
    NavigationStateChanged { can_go_back: bool, loading: bool },
}

/// Side effect the host must carry out after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Re-issue the load with a fresh document.
    Reload,
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: SurfaceLoadState,
    pub to: SurfaceLoadState,
    pub effect: Option<Effect>,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Host-side state machine over [`SurfaceLoadState`].
#[derive(Debug, Default)]
pub struct LoadCoordinator {
    state: SurfaceLoadState,
    can_go_back: bool,
}

impl LoadCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SurfaceLoadState {
        &self.state
    }

    /// Mirrored from the surface's history on every navigation-state change.
    pub fn can_go_back(&self) -> bool {
        self.can_go_back
    }

    pub fn apply(&mut self, event: LoadEvent) -> Transition {
        use SurfaceLoadState::*;

        let from = self.state.clone();
        let mut effect = None;

        let to = match (&self.state, event) {
            (_, LoadEvent::LoadStarted) => Loading,

            (Loading | Loaded, LoadEvent::LoadFinished) => Loaded,
            // Engines finish loading their own error page; keep the failure.
            (Failed(reason), LoadEvent::LoadFinished) => Failed(reason.clone()),
            (Idle, LoadEvent::LoadFinished) => {
                debug!("Load end without a load start, ignored");
                Idle
            }

            (_, LoadEvent::LoadFailed(description)) => {
                let reason = description
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_owned());
                warn!(%reason, "Surface load failed");
                Failed(reason)
            }

            (Failed(_), LoadEvent::Retry) => {
                effect = Some(Effect::Reload);
                Loading
            }
            (state, LoadEvent::Retry) => {
                debug!(%state, "Retry outside of a failed state, ignored");
                state.clone()
            }

            (state, LoadEvent::NavigationStateChanged {
                can_go_back,
                loading,
            }) => {
                self.can_go_back = can_go_back;
                match state {
                    Loaded | Idle if loading => Loading,
                    other => other.clone(),
                }
            }
        };

        if from != to {
            info!(%from, %to, "Surface load state changed");
        }
        self.state = to.clone();

        Transition { from, to, effect }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_states() -> Vec<SurfaceLoadState> {
        vec![
            SurfaceLoadState::Idle,
            SurfaceLoadState::Loading,
            SurfaceLoadState::Loaded,
            SurfaceLoadState::Failed("dns".into()),
        ]
    }

    fn all_events() -> Vec<LoadEvent> {
        vec![
            LoadEvent::LoadStarted,
            LoadEvent::LoadFinished,
            LoadEvent::LoadFailed(Some("timeout".into())),
            LoadEvent::LoadFailed(None),
            LoadEvent::Retry,
            LoadEvent::NavigationStateChanged {
                can_go_back: true,
                loading: false,
            },
            LoadEvent::NavigationStateChanged {
                can_go_back: false,
                loading: true,
            },
        ]
    }

    fn coordinator_in(state: SurfaceLoadState) -> LoadCoordinator {
        LoadCoordinator {
            state,
            can_go_back: false,
        }
    }

    #[test]
    fn test_every_state_accepts_every_event() {
        for state in all_states() {
            for event in all_events() {
                let mut c = coordinator_in(state.clone());
                let t = c.apply(event.clone());
                assert_eq!(t.from, state);
                assert_eq!(&t.to, c.state(), "{state:?} + {event:?}");
            }
        }
    }

    #[test]
    fn test_happy_path() {
        let mut c = LoadCoordinator::new();
        assert_eq!(c.state(), &SurfaceLoadState::Idle);
        c.apply(LoadEvent::LoadStarted);
        assert_eq!(c.state(), &SurfaceLoadState::Loading);
        c.apply(LoadEvent::LoadFinished);
        assert_eq!(c.state(), &SurfaceLoadState::Loaded);
    }

    #[test]
    fn test_failure_keeps_engine_reason() {
        let mut c = coordinator_in(SurfaceLoadState::Loading);
        c.apply(LoadEvent::LoadFailed(Some("net::ERR_NAME_NOT_RESOLVED".into())));
        assert_eq!(
            c.state().failure_reason(),
            Some("net::ERR_NAME_NOT_RESOLVED")
        );
    }

    #[test]
    fn test_failure_defaults_reason() {
        let mut c = coordinator_in(SurfaceLoadState::Loading);
        c.apply(LoadEvent::LoadFailed(None));
        assert_eq!(c.state().failure_reason(), Some(DEFAULT_FAILURE_REASON));

        let mut c = coordinator_in(SurfaceLoadState::Loading);
        c.apply(LoadEvent::LoadFailed(Some("   ".into())));
        assert_eq!(c.state().failure_reason(), Some(DEFAULT_FAILURE_REASON));
    }

    #[test]
    fn test_retry_from_failed_reloads() {
        let mut c = coordinator_in(SurfaceLoadState::Failed("x".into()));
        let t = c.apply(LoadEvent::Retry);
        assert_eq!(t.to, SurfaceLoadState::Loading);
        assert_eq!(t.effect, Some(Effect::Reload));
    }

    #[test]
    fn test_retry_elsewhere_is_a_no_op() {
        for state in [
            SurfaceLoadState::Idle,
            SurfaceLoadState::Loading,
            SurfaceLoadState::Loaded,
        ] {
            let mut c = coordinator_in(state.clone());
            let t = c.apply(LoadEvent::Retry);
            assert_eq!(t.to, state);
            assert_eq!(t.effect, None);
            assert!(!t.changed());
        }
    }

    #[test]
    fn test_error_page_completion_keeps_failure() {
        let mut c = coordinator_in(SurfaceLoadState::Failed("offline".into()));
        c.apply(LoadEvent::LoadFinished);
        assert_eq!(c.state(), &SurfaceLoadState::Failed("offline".into()));
    }

    #[test]
    fn test_loaded_reenters_loading() {
        let mut c = coordinator_in(SurfaceLoadState::Loaded);
        c.apply(LoadEvent::NavigationStateChanged {
            can_go_back: true,
            loading: true,
        });
        assert_eq!(c.state(), &SurfaceLoadState::Loading);
        assert!(c.can_go_back());

        let mut c = coordinator_in(SurfaceLoadState::Loaded);
        c.apply(LoadEvent::LoadStarted);
        assert_eq!(c.state(), &SurfaceLoadState::Loading);
    }

    #[test]
    fn test_navigation_state_mirrors_back_flag() {
        let mut c = coordinator_in(SurfaceLoadState::Failed("x".into()));
        c.apply(LoadEvent::NavigationStateChanged {
            can_go_back: true,
            loading: true,
        });
        assert!(c.can_go_back());
        assert!(matches!(c.state(), SurfaceLoadState::Failed(_)));

        c.apply(LoadEvent::NavigationStateChanged {
            can_go_back: false,
            loading: false,
        });
        assert!(!c.can_go_back());
    }
}
