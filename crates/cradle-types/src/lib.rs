//! Types shared by every Cradle crate: domain models, REST bodies and
//! gateway events.

pub mod api;
pub mod events;
pub mod feed;
pub mod logs;
pub mod models;
