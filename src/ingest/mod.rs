//! The ingestion pipeline: paginated fetch, reconciliation, upsert, and the
//! orchestration and scheduling around them.

pub mod fetch;
pub mod orchestrator;
pub mod parse;
pub mod reconcile;
pub mod schedule;
pub mod scheduler;
pub mod status;
pub mod writer;

pub use orchestrator::{ConcurrencyRejected, Orchestrator, PipelineConfig, RunSummary};
pub use status::{JobStatus, RunOutcome, RunReport, TriggerSource};
