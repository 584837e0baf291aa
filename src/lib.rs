//! Scheduled ingestion of MGNREGA district-month reports from India's Open
//! Government Data platform into Postgres, with a read-through cache kept
//! consistent by post-ingestion invalidation.

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod fmt;
pub mod ingest;
pub mod logging;
pub mod ogd;
pub mod services;
pub mod state;
pub mod utils;
pub mod web;
