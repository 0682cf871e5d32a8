//! Hardware back button handling.

use tracing::debug;

use crate::lifecycle::LoadCoordinator;
use crate::surface::Surface;

/// Outcome of a back press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackPress {
    /// The surface went back in its history.
    Consumed,
    /// Nothing to go back to; the platform default applies.
    NotConsumed,
}

/// Navigates `surface` back if its history allows it.
pub fn handle_back_press<S: Surface + ?Sized>(coordinator: &LoadCoordinator, surface: &S) -> BackPress {
    if coordinator.can_go_back() {
        debug!("Back press consumed");
        surface.go_back();
        BackPress::Consumed
    } else {
        BackPress::NotConsumed
    }
}
