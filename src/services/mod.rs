//! Domain services used by the websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! - `event_log` / `replay`: persistence and reconstruction of the canvas.
//! - `relay`: cross-instance publish/subscribe with the origin loop guard.
//! - `fanout`: delivery to clients connected to this instance.
//! - `session`: per-connection gateway tying the above together.

pub mod event_log;
pub mod fanout;
pub mod relay;
pub mod replay;
pub mod session;
