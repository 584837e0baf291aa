//! Collapse republished records so each natural key appears once.

use crate::ingest::parse::expenditure;
use crate::ogd::{NaturalKey, RawRecord};
use indexmap::IndexMap;
use indexmap::map::Entry;

#[derive(Debug)]
pub struct Reconciled {
    /// One record per natural key, in first-seen key order.
    pub records: Vec<RawRecord>,
    pub duplicates_dropped: usize,
}

/// Keep the record with the larger total expenditure for every natural key.
///
/// Ties keep the record seen first, so output is stable for any arrival order
/// that preserves the relative order of equally ranked duplicates.
pub fn reconcile(records: Vec<RawRecord>) -> Reconciled {
    let total = records.len();
    let mut best: IndexMap<NaturalKey, (f64, RawRecord)> = IndexMap::with_capacity(total);

    for record in records {
        let rank = expenditure(&record);
        match best.entry(record.natural_key()) {
            Entry::Vacant(slot) => {
                slot.insert((rank, record));
            }
            Entry::Occupied(mut slot) => {
                if rank > slot.get().0 {
                    slot.insert((rank, record));
                }
            }
        }
    }

    let records: Vec<RawRecord> = best.into_values().map(|(_, record)| record).collect();
    Reconciled {
        duplicates_dropped: total - records.len(),
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(district: &str, month: &str, total_exp: &str, name: &str) -> RawRecord {
        serde_json::from_value(serde_json::json!({
            "district_code": district,
            "district_name": name,
            "fin_year": "2024-2025",
            "month": month,
            "Total_Exp": total_exp,
        }))
        .unwrap()
    }

    #[test]
    fn larger_expenditure_wins() {
        let out = reconcile(vec![
            record("007", "Oct", "98.0", "old"),
            record("007", "Oct", "120.5", "new"),
        ]);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.duplicates_dropped, 1);
        assert_eq!(out.records[0].total_expenditure.as_deref(), Some("120.5"));
    }

    #[test]
    fn result_is_independent_of_arrival_order() {
        let a = record("007", "Oct", "98.0", "a");
        let b = record("007", "October", "120.5", "b");
        let c = record("008", "Oct", "5", "c");

        let forward = reconcile(vec![a.clone(), b.clone(), c.clone()]);
        let backward = reconcile(vec![c, b, a]);

        let names = |r: &Reconciled| {
            let mut names: Vec<_> = r
                .records
                .iter()
                .map(|r| r.district_name.clone().unwrap_or_default())
                .collect();
            names.sort();
            names
        };
        assert_eq!(names(&forward), vec!["b", "c"]);
        assert_eq!(names(&forward), names(&backward));
    }

    #[test]
    fn ties_and_unparseable_keep_first_seen() {
        let out = reconcile(vec![
            record("007", "Oct", "50", "first"),
            record("007", "Oct", "50.0", "second"),
        ]);
        assert_eq!(out.records[0].district_name.as_deref(), Some("first"));

        // Unparseable expenditure ranks as zero.
        let out = reconcile(vec![
            record("009", "Oct", "garbage", "first"),
            record("009", "Oct", "0", "second"),
        ]);
        assert_eq!(out.records[0].district_name.as_deref(), Some("first"));

        let out = reconcile(vec![
            record("009", "Oct", "garbage", "first"),
            record("009", "Oct", "0.01", "second"),
        ]);
        assert_eq!(out.records[0].district_name.as_deref(), Some("second"));
    }

    #[test]
    fn keeps_first_seen_key_order() {
        let out = reconcile(vec![
            record("003", "Oct", "1", "x"),
            record("001", "Oct", "1", "y"),
            record("003", "Oct", "2", "z"),
            record("002", "Oct", "1", "w"),
        ]);
        let codes: Vec<_> = out.records.iter().map(|r| r.district_code.as_str()).collect();
        assert_eq!(codes, vec!["003", "001", "002"]);
        assert_eq!(out.duplicates_dropped, 1);
    }
}
