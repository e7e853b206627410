//! HTTP surface: listener stream and control API

pub mod handlers;
pub mod server;
pub mod stream;

pub use server::{bind, build_router, serve, AppContext};
