//! Database models and queries.

pub mod facts;
pub mod health;
