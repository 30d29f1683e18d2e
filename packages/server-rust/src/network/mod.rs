//! HTTP surface: configuration, lifecycle control, middleware, and handlers.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::*;
pub use handlers::{consumer_router, AppState};
pub use module::NetworkModule;
pub use shutdown::*;
