//! Web front end for an external media-extraction engine.
//!
//! A request names a URL, a media kind and optionally a quality tier. The
//! [`format`] resolver turns that into a [`format::FormatPlan`], an
//! [`engine::MediaEngine`] executes it into a request-scoped directory, and
//! [`reconcile`] matches the engine's predicted filename with what is on
//! disk. [`preview`] answers metadata-only queries.

pub mod capability;
pub mod config;
pub mod cors;
pub mod engine;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod preview;
pub mod reconcile;
pub mod retention;
pub mod routes;
pub mod sanitize;

pub use config::AppConfig;
pub use error::{ApiError, StartupError};
pub use routes::{AppState, build_router};
