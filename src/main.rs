//! SanPix entry point.
//!
//! Usage:
//!   sanpix [DEEP_LINK]
//!
//! Examples:
//!   sanpix                                  → opens the trusted origin
//!   sanpix sanpix://movie/42                → <origin>movie/42
//!   sanpix https://www.cineby.app/tv/7      → opened as is
//!   sanpix www.cineby.app/tv/7              → https:// added
//!
//! Links outside the trusted origin are ignored and the origin root opens.

use std::env;
use std::error::Error;

use sanpix::config::Config;
use sanpix::host::Host;
use sanpix::{deeplink, notifications};
use winit::event_loop::EventLoop;

fn main() -> Result<(), Box<dyn Error>> {
    // ── 1. Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    #[cfg(debug_assertions)]
    tracing::warn!("Running a debug build; pages load slowly. Use `cargo run --release`.");

    // ── 2. TLS crypto provider (before Servo touches the network) ─────
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| "rustls crypto provider already installed")?;

    // ── 3. Configuration and host ──────────────────────────────────────
    let config = Config::load();
    let host = Host::from_config(&config)?;
    let origin = host.gatekeeper().origin().clone();

    let start_url = env::args()
        .nth(1)
        .and_then(|raw| deeplink::resolve(&raw, &origin, &config.general.app_scheme))
        .unwrap_or_else(|| origin.url().clone());

    // ── 4. Servo resources and notifications ───────────────────────────
    sanpix::resources::init(host.error_page_token().clone())?;
    notifications::init(config.notifications)?;

    // ── 5. Event loop ──────────────────────────────────────────────────
    let event_loop = EventLoop::with_user_event().build()?;
    let mut app = sanpix::browser::App::new(&event_loop, config, host, start_url);
    let result = event_loop.run_app(&mut app);

    drop(app);
    notifications::teardown();
    Ok(result?)
}
