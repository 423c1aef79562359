//! Fetch strategies: the four tiers of the degradation ladder.
//!
//! Each strategy answers the same question (the documents a `Query` selects, in
//! its order, up to its limit) with a different amount of help from the store:
//!
//! 1. `IndexedQuery`: the whole query runs server-side. Needs a composite index
//!    when it combines a filter with an order on another field.
//! 2. `FilteredQuery`: filters run server-side, ordering and limit in memory.
//! 3. `ScanQuery`: the whole collection is read, everything else in memory.
//! 4. `KeyLookupQuery`: `${weekId}_${uid}` keys are rebuilt for a bounded set of
//!    candidate weeks and read one by one.
//!
//! `FetchStrategy::plan` picks the applicable tiers for a query, in order.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::document::{Document, Query};
use super::memory::DEFAULT_BATCH_LIMIT;
use super::store::{DocumentStore, StoreError};
use crate::domain::ids::{weekly_key, WeekId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchStrategy {
    IndexedQuery,
    FilteredQuery,
    ScanQuery,
    KeyLookupQuery,
}

/// Which tiers may run, and their bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchPolicy {
    /// Allow tier 3 (full collection read).
    pub full_scan: bool,
    /// Allow tier 4 (key reconstruction).
    pub key_lookup: bool,
    /// Candidate weeks for tier 4 when the hint carries none: current week and
    /// the ones before it.
    pub key_lookup_weeks: usize,
    /// Largest `in` set sent in one query.
    pub batch_limit: usize,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            full_scan: true,
            key_lookup: true,
            key_lookup_weeks: 2,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }
}

impl FetchStrategy {
    /// Ordered ladder for `query`. Tiers that would repeat an earlier tier's read
    /// are left out: tier 2 only exists when the query filters and orders, tier 3
    /// only when it filters or orders at all.
    pub fn plan(query: &Query, policy: &FetchPolicy) -> Vec<FetchStrategy> {
        let mut ladder = vec![Self::IndexedQuery];
        let filtered = !query.filters.is_empty();
        let ordered = query.order.is_some();

        if filtered && ordered {
            ladder.push(Self::FilteredQuery);
        }
        if policy.full_scan && (filtered || ordered) {
            ladder.push(Self::ScanQuery);
        }
        if policy.key_lookup && query.key_hint.is_some() && query.collection.is_weekly_keyed() {
            ladder.push(Self::KeyLookupQuery);
        }
        ladder
    }

    /// Run this tier once. No retries: a failure is reported to the caller, who
    /// decides whether to move down the ladder.
    pub fn execute(
        &self,
        store: &dyn DocumentStore,
        query: &Query,
        policy: &FetchPolicy,
        today: NaiveDate,
    ) -> Result<Vec<Document>, StoreError> {
        match self {
            Self::IndexedQuery => store.run_query(query),
            Self::FilteredQuery => {
                let mut docs = store.run_query(&query.without_order())?;
                query.sort_and_limit(&mut docs);
                Ok(docs)
            }
            Self::ScanQuery => {
                let docs = store.run_query(&query.unfiltered())?;
                Ok(query.apply_in_memory(docs))
            }
            Self::KeyLookupQuery => {
                let Some(hint) = &query.key_hint else {
                    return Ok(Vec::new());
                };
                let mut docs = Vec::new();
                for week in key_candidates(&hint.week_ids, policy, today) {
                    if let Some(doc) = store.get(query.collection, &weekly_key(&week, &hint.uid))? {
                        docs.push(doc);
                    }
                }
                Ok(query.apply_in_memory(docs))
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::IndexedQuery => "indexed",
            Self::FilteredQuery => "filtered",
            Self::ScanQuery => "scan",
            Self::KeyLookupQuery => "key-lookup",
        }
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Week ids to probe in tier 4: the hint's own ids, or `key_lookup_weeks` weeks
/// counting back from the week containing `today`.
pub fn key_candidates(hinted: &[WeekId], policy: &FetchPolicy, today: NaiveDate) -> Vec<WeekId> {
    if !hinted.is_empty() {
        return hinted.to_vec();
    }
    WeekId::from_date(today).trailing(policy.key_lookup_weeks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::document::{Collection, Filter, KeyHint, OrderBy};
    use crate::data::memory::MemoryStore;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store() -> MemoryStore {
        let docs = vec![
            Document::from_value("2025-W39_u1", json!({"uid": "u1", "weekId": "2025-W39"})),
            Document::from_value("2025-W40_u1", json!({"uid": "u1", "weekId": "2025-W40"})),
            Document::from_value("2025-W40_u2", json!({"uid": "u2", "weekId": "2025-W40"})),
        ];
        MemoryStore::new().with_documents(Collection::WeeklyBalances, docs)
    }

    fn user_query() -> Query {
        Query::collection(Collection::WeeklyBalances)
            .filter(Filter::eq("uid", "u1"))
            .order_by(OrderBy::desc("weekId"))
            .limit(1)
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn plan_for_compound_query_has_all_tiers() {
        let q = user_query().key_hint(KeyHint {
            uid: "u1".into(),
            week_ids: vec![],
        });
        let plan = FetchStrategy::plan(&q, &FetchPolicy::default());
        assert_eq!(
            plan,
            vec![
                FetchStrategy::IndexedQuery,
                FetchStrategy::FilteredQuery,
                FetchStrategy::ScanQuery,
                FetchStrategy::KeyLookupQuery,
            ]
        );
    }

    #[test]
    fn plan_for_plain_read_is_single_tier() {
        let q = Query::collection(Collection::Users);
        assert_eq!(
            FetchStrategy::plan(&q, &FetchPolicy::default()),
            vec![FetchStrategy::IndexedQuery]
        );
    }

    #[test]
    fn plan_respects_policy_switches() {
        let policy = FetchPolicy {
            full_scan: false,
            key_lookup: false,
            ..FetchPolicy::default()
        };
        let q = user_query().key_hint(KeyHint {
            uid: "u1".into(),
            week_ids: vec![],
        });
        assert_eq!(
            FetchStrategy::plan(&q, &policy),
            vec![FetchStrategy::IndexedQuery, FetchStrategy::FilteredQuery]
        );
    }

    #[test]
    fn key_lookup_only_for_weekly_keyed_collections() {
        let q = Query::collection(Collection::Users)
            .filter(Filter::eq("uid", "u1"))
            .key_hint(KeyHint {
                uid: "u1".into(),
                week_ids: vec![],
            });
        assert!(!FetchStrategy::plan(&q, &FetchPolicy::default())
            .contains(&FetchStrategy::KeyLookupQuery));
    }

    #[test]
    fn indexed_tier_fails_without_index() {
        let s = store();
        let r = FetchStrategy::IndexedQuery.execute(&s, &user_query(), &FetchPolicy::default(), day(2025, 10, 1));
        assert!(matches!(r, Err(StoreError::IndexUnavailable { .. })));
    }

    #[test]
    fn filtered_tier_sorts_in_memory() {
        let s = store();
        let docs = FetchStrategy::FilteredQuery
            .execute(&s, &user_query(), &FetchPolicy::default(), day(2025, 10, 1))
            .unwrap();
        assert_eq!(ids(&docs), vec!["2025-W40_u1"]);
    }

    #[test]
    fn scan_tier_filters_in_memory() {
        let s = store();
        let docs = FetchStrategy::ScanQuery
            .execute(&s, &user_query(), &FetchPolicy::default(), day(2025, 10, 1))
            .unwrap();
        assert_eq!(ids(&docs), vec!["2025-W40_u1"]);
    }

    #[test]
    fn key_lookup_probes_current_and_previous_week() {
        let s = store();
        let q = Query::collection(Collection::WeeklyBalances)
            .filter(Filter::eq("uid", "u1"))
            .order_by(OrderBy::desc("weekId"))
            .key_hint(KeyHint {
                uid: "u1".into(),
                week_ids: vec![],
            });
        // 2025-10-01 falls in 2025-W40
        let docs = FetchStrategy::KeyLookupQuery
            .execute(&s, &q, &FetchPolicy::default(), day(2025, 10, 1))
            .unwrap();
        assert_eq!(ids(&docs), vec!["2025-W40_u1", "2025-W39_u1"]);
        assert_eq!(s.reads(), 2);
    }

    #[test]
    fn key_lookup_uses_hinted_weeks() {
        let s = store();
        let q = Query::collection(Collection::WeeklyBalances).key_hint(KeyHint {
            uid: "u2".into(),
            week_ids: vec!["2025-W40".parse().unwrap()],
        });
        let docs = FetchStrategy::KeyLookupQuery
            .execute(&s, &q, &FetchPolicy::default(), day(2030, 1, 1))
            .unwrap();
        assert_eq!(ids(&docs), vec!["2025-W40_u2"]);
    }

    #[test]
    fn candidates_cross_year_boundary() {
        let policy = FetchPolicy {
            key_lookup_weeks: 3,
            ..FetchPolicy::default()
        };
        let c = key_candidates(&[], &policy, day(2025, 1, 2));
        let shown: Vec<String> = c.iter().map(|w| w.to_string()).collect();
        assert_eq!(shown, vec!["2025-W01", "2024-W52", "2024-W51"]);
    }
}
