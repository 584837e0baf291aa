//! HTTP surface: job control, health, admin cache operations, and reads.

pub mod admin;
pub mod districts;
pub mod error;
pub mod routes;
pub mod status;
pub mod trigger;

pub use routes::create_router;
