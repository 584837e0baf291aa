//! Cache key shapes shared by readers and by post-ingestion invalidation.

pub const DISTRICT_SUMMARY_PREFIX: &str = "district_summary_";
pub const RANKINGS_PREFIX: &str = "rankings_";
pub const TREND_PREFIX: &str = "trend_";
pub const DETECT_PREFIX: &str = "detect_";

/// District list for a state, e.g. `districts_haryana_all`.
pub fn districts_all(state_name: &str) -> String {
    format!("districts_{}_all", state_name.trim().to_lowercase())
}

pub fn district_summary(district_code: &str, fin_year: &str, month: u32) -> String {
    format!("{DISTRICT_SUMMARY_PREFIX}{district_code}_{fin_year}_{month}")
}

pub fn rankings(fin_year: &str, month: u32) -> String {
    format!("{RANKINGS_PREFIX}{fin_year}_{month}")
}

pub fn trend(district_code: &str) -> String {
    format!("{TREND_PREFIX}{district_code}_last6months")
}

/// The keys a completed ingestion makes stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub exact: Vec<String>,
    pub prefixes: Vec<String>,
}

impl InvalidationPlan {
    /// Global aggregate for the ingested state plus every per-region key family.
    pub fn after_ingestion(state_name: &str) -> Self {
        Self {
            exact: vec![districts_all(state_name)],
            prefixes: [
                DISTRICT_SUMMARY_PREFIX,
                RANKINGS_PREFIX,
                TREND_PREFIX,
                DETECT_PREFIX,
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        }
    }
}

/// Outcome of applying an [`InvalidationPlan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    pub deleted: usize,
    /// Keys or prefixes whose deletion failed.
    pub failures: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes() {
        assert_eq!(districts_all("HARYANA"), "districts_haryana_all");
        assert_eq!(
            district_summary("007", "2024-2025", 10),
            "district_summary_007_2024-2025_10"
        );
        assert_eq!(rankings("2024-2025", 4), "rankings_2024-2025_4");
        assert_eq!(trend("007"), "trend_007_last6months");
    }

    #[test]
    fn plan_covers_every_region_family() {
        let plan = InvalidationPlan::after_ingestion("Haryana");
        assert_eq!(plan.exact, vec!["districts_haryana_all"]);
        for key in [
            district_summary("001", "2024-2025", 1),
            rankings("2024-2025", 1),
            trend("001"),
            "detect_anomalies_001".to_string(),
        ] {
            assert!(
                plan.prefixes.iter().any(|p| key.starts_with(p.as_str())),
                "{key} not covered"
            );
        }
    }
}
