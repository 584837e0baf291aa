//! Lenient conversion of raw metric text into typed fact metrics.
//!
//! A field that is missing, blank, or not numeric becomes zero and is reported
//! as a [`ParseError`]; the record itself is never rejected here.

use crate::data::facts::FactMetrics;
use crate::ogd::RawRecord;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("field '{field}' is missing")]
    Missing { field: &'static str },
    #[error("field '{field}' is not numeric: '{value}'")]
    NotNumeric { field: &'static str, value: String },
}

impl ParseError {
    pub fn field(&self) -> &'static str {
        match self {
            ParseError::Missing { field } | ParseError::NotNumeric { field, .. } => field,
        }
    }
}

/// Parse a finite decimal. Thousands separators are not accepted.
pub fn parse_decimal(field: &'static str, raw: Option<&str>) -> Result<f64, ParseError> {
    let text = raw.map(str::trim).filter(|s| !s.is_empty());
    let Some(text) = text else {
        return Err(ParseError::Missing { field });
    };
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ParseError::NotNumeric {
            field,
            value: text.to_string(),
        }),
    }
}

/// Parse a whole count; decimal text is truncated toward zero.
pub fn parse_count(field: &'static str, raw: Option<&str>) -> Result<i64, ParseError> {
    if let Some(value) = raw.map(str::trim).and_then(|s| s.parse::<i64>().ok()) {
        return Ok(value);
    }
    let value = parse_decimal(field, raw)?;
    if value.abs() >= i64::MAX as f64 {
        return Err(ParseError::NotNumeric {
            field,
            value: raw.unwrap_or_default().trim().to_string(),
        });
    }
    Ok(value.trunc() as i64)
}

/// Total expenditure used to rank duplicate records; unparseable counts as 0.
pub fn expenditure(record: &RawRecord) -> f64 {
    parse_decimal("Total_Exp", record.total_expenditure.as_deref()).unwrap_or(0.0)
}

#[derive(Default)]
struct FieldParser {
    errors: Vec<ParseError>,
}

impl FieldParser {
    fn count(&mut self, field: &'static str, raw: &Option<String>) -> i64 {
        parse_count(field, raw.as_deref()).unwrap_or_else(|e| {
            self.errors.push(e);
            0
        })
    }

    fn decimal(&mut self, field: &'static str, raw: &Option<String>) -> f64 {
        parse_decimal(field, raw.as_deref()).unwrap_or_else(|e| {
            self.errors.push(e);
            0.0
        })
    }
}

/// Convert every metric of `record`, returning the defaulted fields alongside.
pub fn metrics_from_record(record: &RawRecord) -> (FactMetrics, Vec<ParseError>) {
    let mut p = FieldParser::default();
    let metrics = FactMetrics {
        households_provided: p.count("Total_Households_Worked", &record.households_worked),
        person_days: p.decimal("Persondays_of_Central_Liability_so_far", &record.person_days),
        avg_days_per_household: p.count(
            "Average_days_of_employment_provided_per_Household",
            &record.avg_days_per_household,
        ),
        avg_wage_rate: p.decimal("Average_Wage_rate_per_day_per_person", &record.avg_wage_rate),
        works_started: p.count("Total_No_of_Works_Takenup", &record.works_taken_up),
        works_ongoing: p.count("Number_of_Ongoing_Works", &record.works_ongoing),
        works_completed: p.count("Number_of_Completed_Works", &record.works_completed),
        women_persondays: p.decimal("Women_Persondays", &record.women_persondays),
        sc_persondays: p.decimal("SC_persondays", &record.sc_persondays),
        st_persondays: p.decimal("ST_persondays", &record.st_persondays),
        total_wages_paid: p.decimal("Wages", &record.wages),
        material_expenditure: p.decimal("Material_and_skilled_Wages", &record.material_wages),
        admin_expenditure: p.decimal("Total_Adm_Expenditure", &record.admin_expenditure),
        total_expenditure: p.decimal("Total_Exp", &record.total_expenditure),
    };
    (metrics, p.errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: serde_json::Value) -> RawRecord {
        let mut base = serde_json::json!({
            "district_code": "007",
            "fin_year": "2024-2025",
            "month": "Oct",
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), json.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value(base).unwrap()
    }

    #[test]
    fn decimal_accepts_numbers_and_rejects_junk() {
        assert_eq!(parse_decimal("x", Some(" 120.5 ")), Ok(120.5));
        assert_eq!(parse_decimal("x", Some("-3")), Ok(-3.0));
        assert_eq!(parse_decimal("x", None), Err(ParseError::Missing { field: "x" }));
        assert_eq!(parse_decimal("x", Some("  ")), Err(ParseError::Missing { field: "x" }));
        assert!(matches!(
            parse_decimal("x", Some("NA")),
            Err(ParseError::NotNumeric { .. })
        ));
        assert!(parse_decimal("x", Some("NaN")).is_err());
        assert!(parse_decimal("x", Some("inf")).is_err());
        assert!(parse_decimal("x", Some("1,234")).is_err());
    }

    #[test]
    fn count_truncates_decimal_text() {
        assert_eq!(parse_count("x", Some("12")), Ok(12));
        assert_eq!(parse_count("x", Some("12.7")), Ok(12));
        assert_eq!(parse_count("x", Some("-0.9")), Ok(0));
        assert!(parse_count("x", Some("1e30")).is_err());
    }

    #[test]
    fn blank_and_junk_fields_default_to_zero() {
        let raw = record(serde_json::json!({
            "Total_Households_Worked": "1500",
            "Wages": "",
            "SC_persondays": "NA",
            "Total_Exp": 120.5,
        }));
        let (metrics, errors) = metrics_from_record(&raw);

        assert_eq!(metrics.households_provided, 1500);
        assert_eq!(metrics.total_expenditure, 120.5);
        assert_eq!(metrics.total_wages_paid, 0.0);
        assert_eq!(metrics.sc_persondays, 0.0);

        let fields: Vec<_> = errors.iter().map(ParseError::field).collect();
        assert!(fields.contains(&"Wages"));
        assert!(fields.contains(&"SC_persondays"));
        assert!(!fields.contains(&"Total_Exp"));
        // Every absent metric is reported too.
        assert_eq!(errors.len(), 14 - 2);
    }

    #[test]
    fn expenditure_of_unparseable_record_is_zero() {
        assert_eq!(expenditure(&record(serde_json::json!({"Total_Exp": "98.0"}))), 98.0);
        assert_eq!(expenditure(&record(serde_json::json!({"Total_Exp": "n/a"}))), 0.0);
        assert_eq!(expenditure(&record(serde_json::json!({}))), 0.0);
    }
}
