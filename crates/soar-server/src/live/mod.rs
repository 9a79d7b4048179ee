//! Live Progress Channel transport (spec §4.6): authenticated, tenant-scoped
//! WebSocket rooms broadcasting step-level execution progress.

mod auth;
mod handler;
mod messages;
mod rooms;

pub use auth::{LiveAuthConfig, LiveAuthenticator};
pub use handler::{live_ws_handler, LiveState};
