use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::decode::{coerce_f64, weekly_identity, RecordError};
use super::ids::WeekId;
use crate::data::{Collection, Document};

/// One user's weights for one week, keyed `${weekId}_${uid}` in the store.
///
/// Weights are fractions in `[0, 1]`. Their sum is an upstream contract and is
/// not re-checked here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub uid: String,
    pub week_id: WeekId,
    pub pairs: BTreeMap<String, f64>,
}

impl Allocation {
    pub fn from_document(doc: &Document) -> Result<Self, RecordError> {
        const C: Collection = Collection::Allocations;
        let (week_id, uid) = weekly_identity(C, doc)?;

        let pairs = match doc.get("pairs") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(code, w)| (code.clone(), coerce_f64(Some(w))))
                .collect(),
            Some(Value::Null) | None => BTreeMap::new(),
            Some(other) => {
                return Err(RecordError::invalid(
                    C,
                    doc,
                    "pairs",
                    format!("expected an object, got {other}"),
                ))
            }
        };

        Ok(Self {
            uid,
            week_id,
            pairs,
        })
    }

    /// Instruments actually held (weight > 0).
    pub fn held(&self) -> impl Iterator<Item = (&str, f64)> {
        self.pairs
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .map(|(code, w)| (code.as_str(), *w))
    }

    pub fn instrument_count(&self) -> usize {
        self.held().count()
    }

    /// Largest single weight, 0 for an empty allocation.
    pub fn max_weight(&self) -> f64 {
        self.pairs.values().copied().fold(0.0, f64::max)
    }
}
