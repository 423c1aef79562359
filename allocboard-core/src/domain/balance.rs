//! Settled per-week balances and the rolling per-user balance.

use serde::{Deserialize, Serialize};

use super::decode::{coerce_f64, finite_f64, string_field, weekly_identity, RecordError};
use super::ids::WeekId;
use crate::data::{Collection, Document};

/// Immutable settlement output for one (user, week).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyBalance {
    pub uid: String,
    pub week_id: WeekId,
    pub base_balance: f64,
    pub end_balance: f64,
    /// Percentage return for the week. `None` until the week is settled, and
    /// never replaced by 0.
    pub result_return_pct: Option<f64>,
}

impl WeeklyBalance {
    pub fn from_document(doc: &Document) -> Result<Self, RecordError> {
        let (week_id, uid) = weekly_identity(Collection::WeeklyBalances, doc)?;
        Ok(Self {
            uid,
            week_id,
            base_balance: coerce_f64(doc.get("baseBalance")),
            end_balance: coerce_f64(doc.get("endBalance")),
            result_return_pct: finite_f64(doc.get("resultReturnPct")),
        })
    }
}

/// Rolling balance snapshot, keyed by uid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub uid: String,
    pub latest_balance: f64,
    pub latest_week_id: Option<WeekId>,
}

impl Balance {
    /// `seed` stands in for a missing or non-numeric `latestBalance`.
    pub fn from_document(doc: &Document, seed: f64) -> Result<Self, RecordError> {
        let uid = string_field(doc, "uid").unwrap_or_else(|| doc.id.clone());
        if uid.is_empty() {
            return Err(RecordError::missing(Collection::Balances, doc, "uid"));
        }
        Ok(Self {
            uid,
            latest_balance: finite_f64(doc.get("latestBalance")).unwrap_or(seed),
            latest_week_id: string_field(doc, "latestWeekId").and_then(|s| s.parse().ok()),
        })
    }
}
