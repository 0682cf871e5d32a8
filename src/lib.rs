//! # SanPix
//!
//! Single-site desktop wrapper around one streaming website, built on Servo.
//! The window only ever shows the trusted origin: navigation elsewhere is
//! refused, ad-like elements are stripped from every document, popups and
//! script redirects are neutralised, and load failures surface with a retry.
//!
//! ## Modules
//!
//! Engine-independent core:
//!
//! - [`gatekeeper`]: allow/deny decision for navigation attempts.
//! - [`lifecycle`]: load-state machine of a surface.
//! - [`filter`]: the in-page content filter (injected script and native form).
//! - [`back_navigation`]: hardware back button handling.
//! - [`host`]: ties the above to one [`surface::Surface`].
//! - [`surface`], [`page`]: the surface abstraction and its headless backend.
//! - [`bridge`]: page → host messages over intercepted requests.
//! - [`deeplink`], [`notifications`], [`config`].
//!
//! Desktop embedder (feature `embedder`): [`browser`], [`servo_glue`],
//! [`rendering`], [`resources`], [`preferences`], [`keyutils`].

pub mod back_navigation;
pub mod bridge;
pub mod config;
pub mod deeplink;
pub mod filter;
pub mod gatekeeper;
pub mod host;
pub mod lifecycle;
pub mod notifications;
pub mod page;
pub mod surface;

#[cfg(feature = "embedder")]
pub mod browser;
#[cfg(feature = "embedder")]
pub mod keyutils;
#[cfg(feature = "embedder")]
pub mod preferences;
#[cfg(feature = "embedder")]
pub mod rendering;
#[cfg(feature = "embedder")]
pub mod resources;
#[cfg(feature = "embedder")]
pub mod servo_glue;
