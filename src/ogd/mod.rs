//! Client and ingress schema for the Open Government Data (OGD) platform.

pub mod client;
pub mod errors;
pub mod json;
pub mod models;

pub use client::OgdClient;
pub use errors::FetchError;
pub use models::{NaturalKey, RawRecord, RegionScope, ReportingPeriod};
