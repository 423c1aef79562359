//! Resilient fetcher: walks the degradation ladder for a query.
//!
//! Policy per tier result:
//! - non-empty documents → done, served by this tier
//! - empty documents, `NotFound`, `IndexUnavailable`, `Unavailable`,
//!   `InvalidQuery` → log the transition, try the next tier
//! - `PermissionDenied` → log, stop, return an empty result
//!
//! `fetch` never returns an error. Every attempt is recorded in the
//! `FetchReport` so callers can see how degraded a read was.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::document::{Collection, Document, Filter, Query};
use super::store::DocumentStore;
use super::strategy::{FetchPolicy, FetchStrategy};

/// Result of one tier attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    Served(usize),
    Empty,
    Failed { kind: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchAttempt {
    pub strategy: FetchStrategy,
    pub outcome: AttemptOutcome,
}

/// What happened while fetching one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchReport {
    pub collection: Collection,
    pub attempts: Vec<FetchAttempt>,
    /// Tier that produced the documents; `None` when every tier came back empty.
    pub served_by: Option<FetchStrategy>,
    pub permission_denied: bool,
}

impl FetchReport {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            attempts: Vec::new(),
            served_by: None,
            permission_denied: false,
        }
    }

    /// True when anything other than a first-tier success happened.
    pub fn degraded(&self) -> bool {
        self.permission_denied
            || self.served_by.is_some_and(|s| s != FetchStrategy::IndexedQuery)
            || self
                .attempts
                .iter()
                .any(|a| matches!(a.outcome, AttemptOutcome::Failed { .. }))
    }

    /// Fold another report for the same collection into this one (batched reads).
    pub fn absorb(&mut self, other: FetchReport) {
        self.attempts.extend(other.attempts);
        self.permission_denied |= other.permission_denied;
        self.served_by = match (self.served_by, other.served_by) {
            (Some(a), Some(b)) => Some(if tier_rank(b) > tier_rank(a) { b } else { a }),
            (a, b) => a.or(b),
        };
    }
}

fn tier_rank(s: FetchStrategy) -> u8 {
    match s {
        FetchStrategy::IndexedQuery => 0,
        FetchStrategy::FilteredQuery => 1,
        FetchStrategy::ScanQuery => 2,
        FetchStrategy::KeyLookupQuery => 3,
    }
}

/// Documents plus the report describing how they were obtained.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub documents: Vec<Document>,
    pub report: FetchReport,
}

/// Query runner with graceful degradation over a caller-supplied store handle.
pub struct ResilientFetcher<S> {
    store: S,
    policy: FetchPolicy,
    today: Option<NaiveDate>,
}

impl<S: DocumentStore> ResilientFetcher<S> {
    pub fn new(store: S, policy: FetchPolicy) -> Self {
        Self {
            store,
            policy,
            today: None,
        }
    }

    /// Pin "today" for tier-4 candidate weeks. Defaults to the UTC date.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Fetch the documents `query` selects, degrading tier by tier.
    pub fn fetch(&self, query: &Query) -> FetchOutcome {
        let ladder = FetchStrategy::plan(query, &self.policy);
        let mut report = FetchReport::new(query.collection);
        let today = self.today();

        for (i, strategy) in ladder.iter().enumerate() {
            let next = ladder.get(i + 1);
            match strategy.execute(&self.store, query, &self.policy, today) {
                Ok(docs) if !docs.is_empty() => {
                    if i > 0 {
                        info!(
                            collection = %query.collection,
                            tier = %strategy,
                            documents = docs.len(),
                            "degraded fetch served"
                        );
                    }
                    report.attempts.push(FetchAttempt {
                        strategy: *strategy,
                        outcome: AttemptOutcome::Served(docs.len()),
                    });
                    report.served_by = Some(*strategy);
                    return FetchOutcome {
                        documents: docs,
                        report,
                    };
                }
                Ok(_) => {
                    report.attempts.push(FetchAttempt {
                        strategy: *strategy,
                        outcome: AttemptOutcome::Empty,
                    });
                    if let Some(next) = next {
                        warn!(
                            collection = %query.collection,
                            from = %strategy,
                            to = %next,
                            cause = "empty result",
                            "fetch fallback"
                        );
                    }
                }
                Err(e) if e.is_terminal() => {
                    warn!(
                        collection = %query.collection,
                        tier = %strategy,
                        error = %e,
                        "permission denied, returning empty result"
                    );
                    report.attempts.push(FetchAttempt {
                        strategy: *strategy,
                        outcome: AttemptOutcome::Failed {
                            kind: e.kind().into(),
                            message: e.to_string(),
                        },
                    });
                    report.permission_denied = true;
                    break;
                }
                Err(e) => {
                    report.attempts.push(FetchAttempt {
                        strategy: *strategy,
                        outcome: AttemptOutcome::Failed {
                            kind: e.kind().into(),
                            message: e.to_string(),
                        },
                    });
                    match next {
                        Some(next) => warn!(
                            collection = %query.collection,
                            from = %strategy,
                            to = %next,
                            cause = %e,
                            "fetch fallback"
                        ),
                        None => warn!(
                            collection = %query.collection,
                            tier = %strategy,
                            cause = %e,
                            "fetch ladder exhausted"
                        ),
                    }
                }
            }
        }

        FetchOutcome {
            documents: Vec::new(),
            report,
        }
    }

    /// Point-read `ids` from `collection`, the tier-4 read without a query in
    /// front of it. Missing ids are skipped. A denied read stops and returns
    /// nothing; any other failure stops and keeps what was already read.
    pub fn fetch_keys(&self, collection: Collection, ids: &[String]) -> FetchOutcome {
        let mut report = FetchReport::new(collection);
        let mut documents = Vec::new();

        for id in ids {
            match self.store.get(collection, id) {
                Ok(Some(doc)) => documents.push(doc),
                Ok(None) => {}
                Err(e) => {
                    warn!(collection = %collection, id = %id, error = %e, "key read failed");
                    report.attempts.push(FetchAttempt {
                        strategy: FetchStrategy::KeyLookupQuery,
                        outcome: AttemptOutcome::Failed {
                            kind: e.kind().into(),
                            message: e.to_string(),
                        },
                    });
                    if e.is_terminal() {
                        report.permission_denied = true;
                        documents.clear();
                    }
                    break;
                }
            }
        }

        if !documents.is_empty() {
            report.attempts.push(FetchAttempt {
                strategy: FetchStrategy::KeyLookupQuery,
                outcome: AttemptOutcome::Served(documents.len()),
            });
            report.served_by = Some(FetchStrategy::KeyLookupQuery);
        } else if report.attempts.is_empty() {
            report.attempts.push(FetchAttempt {
                strategy: FetchStrategy::KeyLookupQuery,
                outcome: AttemptOutcome::Empty,
            });
        }
        FetchOutcome { documents, report }
    }

    /// Fetch documents whose `field` is any of `values`, splitting the set into
    /// `batch_limit`-sized `in` queries. Results are merged, then the base query's
    /// order and limit are applied to the merged set.
    pub fn fetch_in_batches(&self, base: &Query, field: &str, values: &[Value]) -> FetchOutcome {
        let mut report = FetchReport::new(base.collection);
        let mut documents = Vec::new();
        let batch = self.policy.batch_limit.max(1);

        for chunk in values.chunks(batch) {
            let mut q = base.clone();
            q.limit = None;
            q.key_hint = None;
            q.filters.push(Filter::In(field.to_string(), chunk.to_vec()));
            let outcome = self.fetch(&q);
            documents.extend(outcome.documents);
            report.absorb(outcome.report);
        }

        base.sort_and_limit(&mut documents);
        FetchOutcome { documents, report }
    }
}
