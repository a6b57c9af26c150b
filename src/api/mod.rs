//! API module
//!
//! HTTP endpoints, the session gate, and request logging middleware.

pub mod middleware;
pub mod routes;

pub use routes::create_router;
