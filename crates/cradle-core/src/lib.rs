//! Domain layer: per-category log repositories, the live feed aggregator,
//! the child registry and the identity adapter. Everything here talks to
//! storage through an injected [`cradle_store::DocumentStore`].

pub mod children;
pub mod error;
pub mod feed;
pub mod identity;
pub mod logs;

pub use error::{CoreError, CoreResult};

/// Top-level collection holding child profiles; log collections hang off
/// each child document.
pub const CHILDREN: &str = "children";

/// Top-level collection holding the user profile written at sign-up.
pub const USERS: &str = "users";

/// Current time in the ISO-8601 form clients write (`2026-10-15T07:30:00.000Z`).
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
