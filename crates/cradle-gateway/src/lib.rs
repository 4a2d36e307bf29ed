//! WebSocket gateway streaming a child's live feed to connected clients.

pub mod connection;

pub use connection::{GatewayContext, handle_connection};
