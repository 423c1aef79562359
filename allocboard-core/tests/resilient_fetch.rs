//! Integration tests for the fetch ladder.
//!
//! The central check is fallback equivalence: a store missing the composite
//! index must, through the ladder, return the same documents the indexed
//! store returns directly.

use std::collections::BTreeSet;

use allocboard_core::data::{
    AttemptOutcome, Collection, Document, DocumentStore, FetchPolicy, FetchStrategy, Filter,
    KeyHint, MemoryStore, OrderBy, Query, ResilientFetcher,
};
use chrono::NaiveDate;
use proptest::prelude::*;
use serde_json::json;

fn weekly_balance(week: u32, uid: &str, pct: f64) -> Document {
    let week_id = format!("2025-W{week:02}");
    Document::from_value(
        format!("{week_id}_{uid}"),
        json!({"uid": uid, "weekId": week_id, "resultReturnPct": pct}),
    )
}

fn fixture_pair(docs: Vec<Document>) -> (MemoryStore, MemoryStore) {
    let indexed = MemoryStore::new()
        .named("indexed")
        .with_documents(Collection::WeeklyBalances, docs.clone())
        .with_index(Collection::WeeklyBalances, &["weekId", "resultReturnPct"])
        .with_index(Collection::WeeklyBalances, &["uid", "weekId"]);
    let bare = MemoryStore::new()
        .named("bare")
        .with_documents(Collection::WeeklyBalances, docs);
    (indexed, bare)
}

fn ids(docs: &[Document]) -> BTreeSet<String> {
    docs.iter().map(|d| d.id.clone()).collect()
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 1).unwrap()
}

#[test]
fn scan_tier_matches_indexed_query_for_week() {
    let docs = vec![
        weekly_balance(39, "u1", 1.0),
        weekly_balance(40, "u1", 5.0),
        weekly_balance(40, "u2", -2.0),
        weekly_balance(40, "u3", 0.5),
    ];
    let (indexed, bare) = fixture_pair(docs);
    let query = Query::collection(Collection::WeeklyBalances)
        .filter(Filter::eq("weekId", "2025-W40"))
        .order_by(OrderBy::desc("resultReturnPct"));

    let expected = indexed.run_query(&query).unwrap();
    let policy = FetchPolicy::default();
    let scanned = FetchStrategy::ScanQuery
        .execute(&bare, &query, &policy, today())
        .unwrap();

    assert_eq!(ids(&scanned), ids(&expected));
    // same order too, since the in-memory sort is the store's sort
    assert_eq!(scanned, expected);
}

#[test]
fn ladder_on_bare_store_matches_indexed_store() {
    let docs: Vec<Document> = (30..=40)
        .flat_map(|w| {
            ["u1", "u2"]
                .into_iter()
                .map(move |u| weekly_balance(w, u, w as f64 - 35.0))
        })
        .collect();
    let (indexed, bare) = fixture_pair(docs);
    let query = Query::collection(Collection::WeeklyBalances)
        .filter(Filter::eq("uid", "u2"))
        .order_by(OrderBy::desc("weekId"))
        .limit(3);

    let a = ResilientFetcher::new(&indexed, FetchPolicy::default()).fetch(&query);
    let b = ResilientFetcher::new(&bare, FetchPolicy::default()).fetch(&query);

    assert_eq!(a.documents, b.documents);
    assert_eq!(a.report.served_by, Some(FetchStrategy::IndexedQuery));
    assert_eq!(b.report.served_by, Some(FetchStrategy::FilteredQuery));
    assert!(!a.report.degraded());
    assert!(b.report.degraded());
}

#[test]
fn every_transition_is_recorded() {
    let store = MemoryStore::new()
        .with_documents(
            Collection::WeeklyBalances,
            vec![weekly_balance(40, "u1", 5.0)],
        )
        .fail_queries(Collection::WeeklyBalances);
    let query = Query::collection(Collection::WeeklyBalances)
        .filter(Filter::eq("uid", "u1"))
        .order_by(OrderBy::desc("weekId"))
        .key_hint(KeyHint {
            uid: "u1".into(),
            week_ids: vec![],
        });
    let out = ResilientFetcher::new(store, FetchPolicy::default())
        .with_today(today())
        .fetch(&query);

    let tiers: Vec<FetchStrategy> = out.report.attempts.iter().map(|a| a.strategy).collect();
    assert_eq!(
        tiers,
        vec![
            FetchStrategy::IndexedQuery,
            FetchStrategy::FilteredQuery,
            FetchStrategy::ScanQuery,
            FetchStrategy::KeyLookupQuery,
        ]
    );
    assert!(matches!(
        out.report.attempts[0].outcome,
        AttemptOutcome::Failed { ref kind, .. } if kind == "unavailable"
    ));
    assert_eq!(out.report.attempts[3].outcome, AttemptOutcome::Served(1));
}

#[test]
fn disabled_tiers_are_not_attempted() {
    let store = MemoryStore::new()
        .with_documents(Collection::WeeklyBalances, vec![weekly_balance(40, "u1", 5.0)])
        .fail_queries(Collection::WeeklyBalances);
    let policy = FetchPolicy {
        full_scan: false,
        key_lookup: false,
        ..FetchPolicy::default()
    };
    let query = Query::collection(Collection::WeeklyBalances)
        .filter(Filter::eq("uid", "u1"))
        .order_by(OrderBy::desc("weekId"))
        .key_hint(KeyHint {
            uid: "u1".into(),
            week_ids: vec![],
        });
    let out = ResilientFetcher::new(store, policy).fetch(&query);
    assert!(out.documents.is_empty());
    assert_eq!(out.report.attempts.len(), 2);
}

fn arb_docs() -> impl Strategy<Value = Vec<Document>> {
    prop::collection::vec((30u32..=40, 0usize..5, -20.0f64..20.0), 0..60).prop_map(|rows| {
        let mut seen = BTreeSet::new();
        rows.into_iter()
            .filter(|(w, u, _)| seen.insert((*w, *u)))
            .map(|(w, u, pct)| weekly_balance(w, &format!("u{u}"), pct))
            .collect()
    })
}

proptest! {
    #[test]
    fn fallback_equivalence_for_any_week(docs in arb_docs(), week in 30u32..=40) {
        let (indexed, bare) = fixture_pair(docs);
        let query = Query::collection(Collection::WeeklyBalances)
            .filter(Filter::eq("weekId", format!("2025-W{week:02}")))
            .order_by(OrderBy::desc("resultReturnPct"));

        let expected = indexed.run_query(&query).unwrap();
        let out = ResilientFetcher::new(&bare, FetchPolicy::default()).fetch(&query);
        prop_assert_eq!(ids(&out.documents), ids(&expected));
    }
}
