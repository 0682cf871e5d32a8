//! Servo engine preferences.
//!
//! Built from the `[engine]` section:
//! - Thread pools sized to available CPU cores (clamped)
//! - The configured user agent and HTTP cache size
//! - APIs the wrapped site has no use for turned off (geolocation,
//!   Bluetooth, WebRTC, web notifications)

use tracing::info;

use crate::config::EngineConfig;

/// Layout threads when `layout_threads = 0`: one per core, at most 8.
fn auto_layout_threads(cpus: i64) -> i64 {
    cpus.clamp(1, 8)
}

#[allow(clippy::field_reassign_with_default)]
pub fn build_servo_preferences(engine: &EngineConfig) -> servo::Preferences {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get() as i64)
        .unwrap_or(4);

    let mut prefs = servo::Preferences::default();

    // ── Performance ───────────────────────────────────────────────────────
    prefs.layout_threads = match engine.layout_threads {
        n if n > 0 => n,
        _ => auto_layout_threads(cpus),
    };
    prefs.threadpools_async_runtime_workers_max = (cpus * 2).min(16);
    prefs.threadpools_image_cache_workers_max = cpus.min(8);
    prefs.threadpools_webrender_workers_max = (cpus / 2).clamp(2, 8);
    prefs.threadpools_resource_workers_max = cpus.min(8);
    prefs.network_http_cache_size = engine.cache_size;

    // ── Identity ──────────────────────────────────────────────────────────
    if !engine.user_agent.is_empty() {
        prefs.user_agent = engine.user_agent.clone();
    }

    // ── Unused web APIs ───────────────────────────────────────────────────
    prefs.dom_geolocation_enabled = false;
    prefs.dom_bluetooth_enabled = false;
    // Site notifications are not forwarded; local ones go through
    // `notifications`.
    prefs.dom_notification_enabled = false;
    prefs.dom_webrtc_enabled = false;

    info!(
        cpus,
        layout_threads = prefs.layout_threads,
        cache_size = prefs.network_http_cache_size,
        "Servo preferences configured"
    );

    prefs
}
