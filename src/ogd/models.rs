//! Ingress schema for MGNREGA district-month records published on the OGD
//! platform, plus the period and key types derived from them.
//!
//! Metric fields are kept as the text the platform sent. Converting them to
//! numbers happens in [`crate::ingest::parse`], the only place that decides
//! how much to trust the upstream shape.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeriodParseError {
    #[error("invalid fiscal year '{0}', expected YYYY-YYYY with consecutive years")]
    FiscalYear(String),
    #[error("unrecognised month '{0}'")]
    Month(String),
}

/// A fiscal year label such as `2024-2025`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FiscalYear(String);

impl FiscalYear {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for FiscalYear {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || PeriodParseError::FiscalYear(s.to_string());
        let (first, second) = s.split_once('-').ok_or_else(invalid)?;
        if first.len() != 4 || second.len() != 4 {
            return Err(invalid());
        }
        let first: u32 = first.parse().map_err(|_| invalid())?;
        let second: u32 = second.parse().map_err(|_| invalid())?;
        if second != first + 1 {
            return Err(invalid());
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for FiscalYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of ingestion work: a fiscal year, optionally narrowed to a month.
///
/// Written as `2024-2025` or `2024-2025/October`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportingPeriod {
    pub fiscal_year: FiscalYear,
    /// Upstream month label used as a request filter, if any.
    pub month: Option<String>,
}

impl ReportingPeriod {
    pub fn fiscal_year(fiscal_year: FiscalYear) -> Self {
        Self {
            fiscal_year,
            month: None,
        }
    }
}

impl FromStr for ReportingPeriod {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = match s.trim().split_once('/') {
            Some((year, month)) => (year, Some(month.trim())),
            None => (s, None),
        };
        let fiscal_year = year.parse()?;
        let month = match month {
            Some(label) if month_number(label).is_some() => Some(label.to_string()),
            Some(label) => return Err(PeriodParseError::Month(label.to_string())),
            None => None,
        };
        Ok(Self { fiscal_year, month })
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.month {
            Some(month) => write!(f, "{}/{month}", self.fiscal_year),
            None => write!(f, "{}", self.fiscal_year),
        }
    }
}

/// Parse a comma-separated period list, skipping empty entries.
pub fn parse_periods(list: &str) -> Result<Vec<ReportingPeriod>, PeriodParseError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

/// Calendar month number for an upstream month label.
///
/// The platform has published both abbreviated and full names over time.
pub fn month_number(label: &str) -> Option<u32> {
    let month = match label.trim().to_ascii_lowercase().as_str() {
        "jan" | "january" => 1,
        "feb" | "february" => 2,
        "mar" | "march" => 3,
        "apr" | "april" => 4,
        "may" => 5,
        "jun" | "june" => 6,
        "jul" | "july" => 7,
        "aug" | "august" => 8,
        "sep" | "sept" | "september" => 9,
        "oct" | "october" => 10,
        "nov" | "november" => 11,
        "dec" | "december" => 12,
        _ => return None,
    };
    Some(month)
}

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub fn month_name(month: u32) -> Option<&'static str> {
    MONTH_NAMES.get(month.checked_sub(1)? as usize).copied()
}

/// Which slice of the national dataset to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionScope {
    /// Value of the `filters[state_name]` request parameter, e.g. `HARYANA`.
    pub state_name: String,
}

/// The identity of one logical district-month fact, however many times the
/// platform republished it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub region_code: String,
    pub fiscal_year: String,
    /// Canonical month name when recognised, otherwise the trimmed label.
    pub period: String,
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.region_code, self.fiscal_year, self.period)
    }
}

/// One record exactly as the platform returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, deserialize_with = "lenient_text")]
    pub state_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub state_name: Option<String>,
    #[serde(deserialize_with = "required_text")]
    pub district_code: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub district_name: Option<String>,
    #[serde(deserialize_with = "required_text")]
    pub fin_year: String,
    #[serde(deserialize_with = "required_text")]
    pub month: String,

    #[serde(rename = "Total_Households_Worked", default, deserialize_with = "lenient_text")]
    pub households_worked: Option<String>,
    #[serde(
        rename = "Persondays_of_Central_Liability_so_far",
        default,
        deserialize_with = "lenient_text"
    )]
    pub person_days: Option<String>,
    #[serde(
        rename = "Average_days_of_employment_provided_per_Household",
        default,
        deserialize_with = "lenient_text"
    )]
    pub avg_days_per_household: Option<String>,
    #[serde(
        rename = "Average_Wage_rate_per_day_per_person",
        default,
        deserialize_with = "lenient_text"
    )]
    pub avg_wage_rate: Option<String>,
    #[serde(rename = "Total_No_of_Works_Takenup", default, deserialize_with = "lenient_text")]
    pub works_taken_up: Option<String>,
    #[serde(rename = "Number_of_Ongoing_Works", default, deserialize_with = "lenient_text")]
    pub works_ongoing: Option<String>,
    #[serde(rename = "Number_of_Completed_Works", default, deserialize_with = "lenient_text")]
    pub works_completed: Option<String>,
    #[serde(rename = "Women_Persondays", default, deserialize_with = "lenient_text")]
    pub women_persondays: Option<String>,
    #[serde(rename = "SC_persondays", default, deserialize_with = "lenient_text")]
    pub sc_persondays: Option<String>,
    #[serde(rename = "ST_persondays", default, deserialize_with = "lenient_text")]
    pub st_persondays: Option<String>,
    #[serde(rename = "Wages", default, deserialize_with = "lenient_text")]
    pub wages: Option<String>,
    #[serde(rename = "Material_and_skilled_Wages", default, deserialize_with = "lenient_text")]
    pub material_wages: Option<String>,
    #[serde(rename = "Total_Adm_Expenditure", default, deserialize_with = "lenient_text")]
    pub admin_expenditure: Option<String>,
    #[serde(rename = "Total_Exp", default, deserialize_with = "lenient_text")]
    pub total_expenditure: Option<String>,
}

impl RawRecord {
    pub fn natural_key(&self) -> NaturalKey {
        let period = month_number(&self.month)
            .and_then(month_name)
            .map(str::to_owned)
            .unwrap_or_else(|| self.month.trim().to_owned());
        NaturalKey {
            region_code: self.district_code.trim().to_owned(),
            fiscal_year: self.fin_year.trim().to_owned(),
            period,
        }
    }
}

/// The JSON envelope around one page of records.
///
/// A body without a `records` array is rejected rather than read as an empty
/// page, so an upstream error document never ends pagination as a success.
#[derive(Debug, Deserialize)]
pub struct RecordsEnvelope {
    pub records: Vec<RawRecord>,
}

/// Accept strings, bare numbers, and booleans as text; `null` becomes `None`.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

fn required_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    lenient_text(deserializer)?.ok_or_else(|| serde::de::Error::custom("expected text, got null"))
}
