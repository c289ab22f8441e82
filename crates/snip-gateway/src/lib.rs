//! HTTP surface of snip.

pub mod app;
pub mod cipher;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod model;
pub mod state;
pub mod telemetry;

pub use app::App;
pub use state::AppState;
