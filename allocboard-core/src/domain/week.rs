//! Contest weeks and their lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::decode::{string_field, timestamp_field, RecordError};
use super::ids::WeekId;
use crate::data::{Collection, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStatus {
    Upcoming,
    Open,
    Closed,
    Settled,
}

impl WeekStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Settled => "settled",
        }
    }
}

impl fmt::Display for WeekStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeekStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upcoming" => Ok(Self::Upcoming),
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "settled" => Ok(Self::Settled),
            other => Err(format!("unknown week status '{other}'")),
        }
    }
}

/// One contest week. Returns for the week are only meaningful once settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Week {
    pub id: WeekId,
    pub status: WeekStatus,
    pub open_at: Option<DateTime<Utc>>,
    pub close_at: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl Week {
    pub fn new(id: WeekId, status: WeekStatus) -> Self {
        Self {
            id,
            status,
            open_at: None,
            close_at: None,
            start_date: None,
            end_date: None,
        }
    }

    pub fn from_document(doc: &Document) -> Result<Self, RecordError> {
        const C: Collection = Collection::Weeks;

        let raw_id = string_field(doc, "id").unwrap_or_else(|| doc.id.clone());
        let id = raw_id
            .parse::<WeekId>()
            .map_err(|e| RecordError::invalid(C, doc, "id", e.to_string()))?;

        let status = string_field(doc, "status")
            .ok_or_else(|| RecordError::missing(C, doc, "status"))?
            .parse::<WeekStatus>()
            .map_err(|e| RecordError::invalid(C, doc, "status", e))?;

        Ok(Self {
            id,
            status,
            open_at: timestamp_field(doc, "openAt"),
            close_at: timestamp_field(doc, "closeAt"),
            start_date: timestamp_field(doc, "startDate"),
            end_date: timestamp_field(doc, "endDate"),
        })
    }

    pub fn is_settled(&self) -> bool {
        self.status == WeekStatus::Settled
    }

    /// Recency key: end date first (missing sorts oldest), week id as tiebreak.
    pub fn recency_key(&self) -> (Option<DateTime<Utc>>, WeekId) {
        (self.end_date, self.id)
    }
}

/// Settled weeks, most recent first.
pub fn settled_most_recent_first(weeks: &[Week]) -> Vec<&Week> {
    let mut settled: Vec<&Week> = weeks.iter().filter(|w| w.is_settled()).collect();
    settled.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
    settled
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn decodes_week_document() {
        let doc = Document::from_value(
            "2025-W40",
            json!({
                "status": "settled",
                "openAt": "2025-09-29T00:00:00Z",
                "endDate": {"seconds": 1_759_521_600_i64, "nanoseconds": 0}
            }),
        );
        let week = Week::from_document(&doc).unwrap();
        assert_eq!(week.id.to_string(), "2025-W40");
        assert!(week.is_settled());
        assert!(week.open_at.is_some());
        assert_eq!(
            week.end_date,
            Some(Utc.timestamp_opt(1_759_521_600, 0).unwrap())
        );
        assert_eq!(week.close_at, None);
    }

    #[test]
    fn unknown_status_is_malformed() {
        let doc = Document::from_value("2025-W40", json!({"status": "archived"}));
        assert!(Week::from_document(&doc).is_err());
        let doc = Document::from_value("2025-W40", json!({}));
        assert!(matches!(
            Week::from_document(&doc),
            Err(RecordError::MissingField { field: "status", .. })
        ));
    }

    #[test]
    fn settled_weeks_ordered_by_end_date() {
        let mut a = Week::new("2025-W39".parse().unwrap(), WeekStatus::Settled);
        a.end_date = Some(Utc.with_ymd_and_hms(2025, 9, 26, 20, 0, 0).unwrap());
        let mut b = Week::new("2025-W40".parse().unwrap(), WeekStatus::Settled);
        b.end_date = Some(Utc.with_ymd_and_hms(2025, 10, 3, 20, 0, 0).unwrap());
        let c = Week::new("2025-W41".parse().unwrap(), WeekStatus::Open);

        let weeks = vec![a, c, b];
        let order: Vec<String> = settled_most_recent_first(&weeks)
            .iter()
            .map(|w| w.id.to_string())
            .collect();
        assert_eq!(order, vec!["2025-W40", "2025-W39"]);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&WeekStatus::Settled).unwrap(), "\"settled\"");
    }
}
