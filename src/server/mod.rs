mod automation_routes;
pub mod config;
mod http_layers;
mod log_routes;
pub mod metrics;
#[allow(clippy::module_inception)]
pub mod server;
mod server_routes;
pub mod state;
pub mod websocket;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, make_metrics_app, run_server};
