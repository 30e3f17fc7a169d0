//! HTTP control surface.
//!
//! The server, its request/response types and the log broadcaster every
//! pipeline step reports through.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, start_server, AppState};
pub use types::*;
