//! Rendering context factory.
//!
//! Isolates the surfman/OpenGL `WindowRenderingContext` setup from the rest
//! of the embedder.

use std::fmt;
use std::rc::Rc;

use servo::{RenderingContext, WindowRenderingContext};
use winit::dpi::PhysicalSize;
use winit::raw_window_handle::{DisplayHandle, WindowHandle};

/// The GL context could not be created or made current.
#[derive(Debug)]
pub struct RenderingError(String);

impl fmt::Display for RenderingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rendering context unavailable: {}", self.0)
    }
}

impl std::error::Error for RenderingError {}

impl From<String> for RenderingError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// Creates a hardware-accelerated context bound to the winit window and
/// makes it current, as `WebViewBuilder` requires.
pub fn create_rendering_context(
    display_handle: DisplayHandle<'_>,
    window_handle: WindowHandle<'_>,
    size: PhysicalSize<u32>,
) -> Result<Rc<WindowRenderingContext>, RenderingError> {
    let rendering_context = WindowRenderingContext::new(display_handle, window_handle, size)
        .map_err(|e| RenderingError(format!("{e:?} (check GPU drivers)")))?;

    rendering_context
        .make_current()
        .map_err(|e| RenderingError(format!("make_current failed: {e:?}")))?;

    Ok(Rc::new(rendering_context))
}
