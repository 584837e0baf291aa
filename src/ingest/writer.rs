//! Converts reconciled records to fact rows and writes them one by one.

use crate::data::facts::{FactRow, FactStore, WriteError};
use crate::ingest::parse::metrics_from_record;
use crate::ogd::RawRecord;
use crate::ogd::models::month_number;
use tracing::{debug, warn};

/// Values that every row of a run shares.
#[derive(Debug, Clone)]
pub struct RowContext {
    /// Used when a record carries no `state_code` of its own.
    pub default_state_code: String,
    pub source_url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub attempted: usize,
    pub written: usize,
    pub failed: usize,
    /// Metric fields that were missing or unparseable and written as zero.
    pub defaulted_fields: usize,
}

/// Build the row for `record`, returning how many metrics were defaulted.
pub fn build_fact_row(
    record: &RawRecord,
    context: &RowContext,
) -> Result<(FactRow, usize), WriteError> {
    let key = record.natural_key();
    let month = month_number(&record.month).ok_or_else(|| WriteError::InvalidKey {
        key: key.to_string(),
        reason: "unrecognised month label",
    })?;
    if key.region_code.is_empty() {
        return Err(WriteError::InvalidKey {
            key: key.to_string(),
            reason: "blank district code",
        });
    }

    let (metrics, parse_errors) = metrics_from_record(record);
    for error in &parse_errors {
        debug!(key = %key, error = %error, "Defaulted metric to zero");
    }

    let state_code = record
        .state_code
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(&context.default_state_code)
        .to_string();

    let row = FactRow {
        state_code,
        district_code: key.region_code,
        district_name: record
            .district_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned),
        fin_year: key.fiscal_year,
        month: month as i16,
        metrics,
        source_url: context.source_url.clone(),
    };
    Ok((row, parse_errors.len()))
}

/// Upsert every record; a failing record is logged and counted, never fatal.
pub async fn write_batch(
    store: &dyn FactStore,
    records: &[RawRecord],
    context: &RowContext,
) -> WriteSummary {
    let mut summary = WriteSummary {
        attempted: records.len(),
        ..WriteSummary::default()
    };

    for record in records {
        let result = match build_fact_row(record, context) {
            Ok((row, defaulted)) => {
                summary.defaulted_fields += defaulted;
                store.upsert(&row).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => summary.written += 1,
            Err(e) => {
                summary.failed += 1;
                warn!(key = %record.natural_key(), error = ?e, "Failed to write record");
            }
        }
    }

    summary
}
