//! Decode boundary: loosely-typed documents → typed records.
//!
//! Numeric coercion happens only where a zero default is safe (balances,
//! weights). Returns are never coerced: a missing or non-numeric
//! `resultReturnPct` stays `None`.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::data::document::timestamp_parts;
use crate::data::{Collection, Document};
use crate::domain::ids::{split_weekly_key, WeekId};

/// A document that cannot be turned into a record. Such documents are skipped
/// and counted by the snapshot loader; they never abort analytics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("{collection}/{id}: missing field '{field}'")]
    MissingField {
        collection: Collection,
        id: String,
        field: &'static str,
    },

    #[error("{collection}/{id}: invalid field '{field}': {detail}")]
    InvalidField {
        collection: Collection,
        id: String,
        field: &'static str,
        detail: String,
    },
}

impl RecordError {
    pub fn missing(collection: Collection, doc: &Document, field: &'static str) -> Self {
        Self::MissingField {
            collection,
            id: doc.id.clone(),
            field,
        }
    }

    pub fn invalid(
        collection: Collection,
        doc: &Document,
        field: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            collection,
            id: doc.id.clone(),
            field,
            detail: detail.into(),
        }
    }
}

/// Lenient numeric read: numbers and numeric strings, anything else is 0.
/// Non-finite values also become 0.
pub fn coerce_f64(v: Option<&Value>) -> f64 {
    let x = match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

/// Strict numeric read: a finite JSON number, otherwise `None`.
pub fn finite_f64(v: Option<&Value>) -> Option<f64> {
    v.and_then(Value::as_f64).filter(|x| x.is_finite())
}

/// Non-empty string field.
pub fn string_field(doc: &Document, field: &str) -> Option<String> {
    doc.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Instant from an RFC 3339 string, a `YYYY-MM-DD` date (midnight UTC),
/// epoch milliseconds, or a `{seconds, nanoseconds}` object.
pub fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|ndt| ndt.and_utc())
            }),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::Object(_) => {
            let (secs, nanos) = timestamp_parts(v)?;
            let nanos = u32::try_from(nanos).ok()?;
            Utc.timestamp_opt(secs, nanos).single()
        }
        _ => None,
    }
}

/// Optional timestamp field; unparseable values read as absent.
pub fn timestamp_field(doc: &Document, field: &str) -> Option<DateTime<Utc>> {
    doc.get(field).and_then(parse_timestamp)
}

/// `(weekId, uid)` of a weekly-keyed record. Fields win; the
/// `${weekId}_${uid}` document key fills whatever is missing.
pub fn weekly_identity(
    collection: Collection,
    doc: &Document,
) -> Result<(WeekId, String), RecordError> {
    let from_key = split_weekly_key(&doc.id);

    let week_id = match string_field(doc, "weekId") {
        Some(raw) => raw
            .parse::<WeekId>()
            .map_err(|e| RecordError::invalid(collection, doc, "weekId", e.to_string()))?,
        None => from_key
            .as_ref()
            .map(|(w, _)| *w)
            .ok_or_else(|| RecordError::missing(collection, doc, "weekId"))?,
    };

    let uid = match string_field(doc, "uid") {
        Some(uid) => uid,
        None => from_key
            .map(|(_, uid)| uid)
            .ok_or_else(|| RecordError::missing(collection, doc, "uid"))?,
    };

    Ok((week_id, uid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lenient_numbers() {
        assert_eq!(coerce_f64(Some(&json!(2.5))), 2.5);
        assert_eq!(coerce_f64(Some(&json!("3"))), 3.0);
        assert_eq!(coerce_f64(Some(&json!("abc"))), 0.0);
        assert_eq!(coerce_f64(Some(&json!(null))), 0.0);
        assert_eq!(coerce_f64(None), 0.0);
    }

    #[test]
    fn strict_numbers_keep_missing_distinct() {
        assert_eq!(finite_f64(Some(&json!(0))), Some(0.0));
        assert_eq!(finite_f64(Some(&json!("5"))), None);
        assert_eq!(finite_f64(None), None);
    }

    #[test]
    fn timestamps_in_every_accepted_form() {
        let expected = Utc.with_ymd_and_hms(2025, 10, 3, 20, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&json!("2025-10-03T20:00:00Z")), Some(expected));
        assert_eq!(
            parse_timestamp(&json!(expected.timestamp_millis())),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&json!({"seconds": expected.timestamp(), "nanoseconds": 0})),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&json!("2025-10-03")),
            Some(Utc.with_ymd_and_hms(2025, 10, 3, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp(&json!("not a date")), None);
        assert_eq!(parse_timestamp(&json!(true)), None);
    }

    #[test]
    fn identity_from_fields_or_key() {
        let doc = Document::from_value("2025-W40_u1", json!({}));
        let (w, uid) = weekly_identity(Collection::Allocations, &doc).unwrap();
        assert_eq!(w.to_string(), "2025-W40");
        assert_eq!(uid, "u1");

        let doc = Document::from_value("random", json!({"uid": "u2", "weekId": "2025-W41"}));
        let (w, uid) = weekly_identity(Collection::Allocations, &doc).unwrap();
        assert_eq!(w.to_string(), "2025-W41");
        assert_eq!(uid, "u2");
    }

    #[test]
    fn identity_without_any_source_is_malformed() {
        let doc = Document::from_value("random", json!({"uid": "u2"}));
        let err = weekly_identity(Collection::WeeklyBalances, &doc).unwrap_err();
        assert!(matches!(err, RecordError::MissingField { field: "weekId", .. }));

        let doc = Document::from_value("x", json!({"uid": "u2", "weekId": "W40"}));
        assert!(matches!(
            weekly_identity(Collection::WeeklyBalances, &doc),
            Err(RecordError::InvalidField { .. })
        ));
    }
}
