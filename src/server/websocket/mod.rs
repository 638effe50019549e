//! WebSocket streaming of activity log entries.

mod handler;
pub mod messages;

pub use handler::ws_handler;
