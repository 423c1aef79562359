//! Analytics snapshot: every source collection fetched once per request.
//!
//! The loader fetches the collections concurrently on the rayon pool and joins
//! before returning, so derivations always see a complete (if degraded)
//! snapshot. Each collection runs its own fallback ladder; a collection that
//! comes back empty never blocks the others.
//!
//! A windowed load reads weekly balances last: it needs the settled weeks to
//! pick the window and the known uids to point-read records that carry their
//! identity only in the `${weekId}_${uid}` key.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::document::{Collection, Document, Query};
use super::fetch::{FetchOutcome, FetchReport, ResilientFetcher};
use super::store::DocumentStore;
use crate::domain::{
    settled_most_recent_first, weekly_key, Allocation, Balance, Instrument, RecordError, User,
    Week, WeekId, WeeklyBalance,
};
use crate::SEED_BALANCE;

/// In-memory arena of decoded records. Built once, read by every derivation.
#[derive(Debug, Clone, Default)]
pub struct AnalyticsSnapshot {
    pub weeks: Vec<Week>,
    pub allocations: Vec<Allocation>,
    pub weekly_balances: Vec<WeeklyBalance>,
    pub balances: Vec<Balance>,
    pub users: Vec<User>,
    pub instruments: Vec<Instrument>,
    /// One report per fetched collection, in `Collection::ALL` order.
    pub reports: Vec<FetchReport>,
    /// Documents dropped at decode time (malformed or duplicate), per collection.
    pub skipped: BTreeMap<Collection, usize>,
    /// Weeks weekly balances were loaded for, most recent first. `None` when
    /// the whole collection was read.
    pub balance_weeks: Option<Vec<WeekId>>,
}

impl AnalyticsSnapshot {
    pub fn report(&self, collection: Collection) -> Option<&FetchReport> {
        self.reports.iter().find(|r| r.collection == collection)
    }

    /// True when any collection was served by a fallback tier or denied.
    pub fn degraded(&self) -> bool {
        self.reports.iter().any(FetchReport::degraded)
    }

    pub fn skipped(&self, collection: Collection) -> usize {
        self.skipped.get(&collection).copied().unwrap_or(0)
    }

    pub fn len(&self, collection: Collection) -> usize {
        match collection {
            Collection::Weeks => self.weeks.len(),
            Collection::Allocations => self.allocations.len(),
            Collection::WeeklyBalances => self.weekly_balances.len(),
            Collection::Balances => self.balances.len(),
            Collection::Users => self.users.len(),
            Collection::Instruments => self.instruments.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        Collection::ALL.iter().all(|c| self.len(*c) == 0)
    }

    /// uid → display name (username, falling back to uid).
    /// Every uid some collection other than weekly balances mentions.
    pub fn known_uids(&self) -> BTreeSet<&str> {
        self.users
            .iter()
            .map(|u| u.uid.as_str())
            .chain(self.balances.iter().map(|b| b.uid.as_str()))
            .chain(self.allocations.iter().map(|a| a.uid.as_str()))
            .collect()
    }

    pub fn display_names(&self) -> HashMap<&str, &str> {
        self.users
            .iter()
            .map(|u| (u.uid.as_str(), u.display_name()))
            .collect()
    }

    /// Deterministic BLAKE3 hash over all records in canonical order.
    ///
    /// Fetch order does not matter: each collection is sorted by its key
    /// before hashing. Fetch reports are not part of the hash.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();

        let mut weeks: Vec<&Week> = self.weeks.iter().collect();
        weeks.sort_by_key(|w| w.id);
        hash_section(&mut hasher, "weeks", &weeks);

        let mut allocations: Vec<&Allocation> = self.allocations.iter().collect();
        allocations.sort_by(|a, b| (a.week_id, &a.uid).cmp(&(b.week_id, &b.uid)));
        hash_section(&mut hasher, "allocations", &allocations);

        let mut weekly: Vec<&WeeklyBalance> = self.weekly_balances.iter().collect();
        weekly.sort_by(|a, b| (a.week_id, &a.uid).cmp(&(b.week_id, &b.uid)));
        hash_section(&mut hasher, "weeklyBalances", &weekly);

        let mut balances: Vec<&Balance> = self.balances.iter().collect();
        balances.sort_by(|a, b| a.uid.cmp(&b.uid));
        hash_section(&mut hasher, "balances", &balances);

        let mut users: Vec<&User> = self.users.iter().collect();
        users.sort_by(|a, b| a.uid.cmp(&b.uid));
        hash_section(&mut hasher, "users", &users);

        let mut instruments: Vec<&Instrument> = self.instruments.iter().collect();
        instruments.sort_by(|a, b| a.code.cmp(&b.code));
        hash_section(&mut hasher, "instruments", &instruments);

        hasher.finalize().to_hex().to_string()
    }
}

fn hash_section<T: Serialize>(hasher: &mut blake3::Hasher, name: &str, records: &[&T]) {
    hasher.update(name.as_bytes());
    hasher.update(&(records.len() as u64).to_le_bytes());
    for record in records {
        // Records are plain data with string keys; serialization cannot fail.
        if let Ok(bytes) = serde_json::to_vec(record) {
            hasher.update(&bytes);
        }
    }
}

/// Loads an `AnalyticsSnapshot` through a `ResilientFetcher`.
#[derive(Debug, Clone)]
pub struct SnapshotLoader {
    window: Option<usize>,
    seed_balance: f64,
}

impl Default for SnapshotLoader {
    fn default() -> Self {
        Self {
            window: None,
            seed_balance: SEED_BALANCE,
        }
    }
}

impl SnapshotLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load weekly balances only for the `weeks` most recently settled weeks.
    pub fn with_window(mut self, weeks: Option<usize>) -> Self {
        self.window = weeks;
        self
    }

    pub fn with_seed_balance(mut self, seed: f64) -> Self {
        self.seed_balance = seed;
        self
    }

    pub fn load<S: DocumentStore>(&self, fetcher: &ResilientFetcher<S>) -> AnalyticsSnapshot {
        let fetch_all = |c: Collection| fetcher.fetch(&Query::collection(c));

        let (((weeks_out, alloc_out), (balance_out, (user_out, instr_out))), full_weekly) =
            rayon::join(
                || {
                    rayon::join(
                        || {
                            rayon::join(
                                || fetch_all(Collection::Weeks),
                                || fetch_all(Collection::Allocations),
                            )
                        },
                        || {
                            rayon::join(
                                || fetch_all(Collection::Balances),
                                || {
                                    rayon::join(
                                        || fetch_all(Collection::Users),
                                        || fetch_all(Collection::Instruments),
                                    )
                                },
                            )
                        },
                    )
                },
                || {
                    self.window
                        .is_none()
                        .then(|| fetch_all(Collection::WeeklyBalances))
                },
            );

        let mut snap = AnalyticsSnapshot::default();
        let seed = self.seed_balance;

        snap.weeks = decode(&mut snap, weeks_out, Week::from_document, |w| w.id.to_string());
        snap.allocations = decode(&mut snap, alloc_out, Allocation::from_document, |a| {
            format!("{}_{}", a.week_id, a.uid)
        });
        snap.balances = decode(
            &mut snap,
            balance_out,
            |d| Balance::from_document(d, seed),
            |b| b.uid.clone(),
        );
        snap.users = decode(&mut snap, user_out, User::from_document, |u| u.uid.clone());
        snap.instruments = decode(&mut snap, instr_out, Instrument::from_document, |i| {
            i.code.clone()
        });

        let weekly_out = match self.window {
            Some(window) => self.fetch_window(fetcher, window, &mut snap),
            None => full_weekly.unwrap_or_else(|| fetch_all(Collection::WeeklyBalances)),
        };
        snap.weekly_balances = decode(&mut snap, weekly_out, WeeklyBalance::from_document, |b| {
            format!("{}_{}", b.week_id, b.uid)
        });
        snap.reports.sort_by_key(|r| r.collection);

        debug!(
            weeks = snap.weeks.len(),
            allocations = snap.allocations.len(),
            weekly_balances = snap.weekly_balances.len(),
            balances = snap.balances.len(),
            users = snap.users.len(),
            instruments = snap.instruments.len(),
            window = ?snap.balance_weeks.as_ref().map(Vec::len),
            degraded = snap.degraded(),
            fingerprint = %snap.fingerprint(),
            "analytics snapshot loaded"
        );
        snap
    }

    /// Weekly balances for the `window` most recently settled weeks: a batched
    /// `in` read on `weekId`, then key reads for every known uid the `in` read
    /// did not return. Records `balance_weeks` on the snapshot.
    fn fetch_window<S: DocumentStore>(
        &self,
        fetcher: &ResilientFetcher<S>,
        window: usize,
        snap: &mut AnalyticsSnapshot,
    ) -> FetchOutcome {
        let base = Query::collection(Collection::WeeklyBalances);
        let weeks: Vec<WeekId> = settled_most_recent_first(&snap.weeks)
            .into_iter()
            .take(window)
            .map(|w| w.id)
            .collect();
        if weeks.is_empty() {
            debug!("no settled weeks for windowed load, reading all weekly balances");
            return fetcher.fetch(&base);
        }

        let ids: Vec<Value> = weeks.iter().map(|w| Value::String(w.to_string())).collect();
        let mut outcome = fetcher.fetch_in_batches(&base, "weekId", &ids);

        if !outcome.report.permission_denied {
            let found: HashSet<&str> = outcome.documents.iter().map(|d| d.id.as_str()).collect();
            let keys: Vec<String> = snap
                .known_uids()
                .into_iter()
                .flat_map(|uid| weeks.iter().map(move |w| weekly_key(w, uid)))
                .filter(|key| !found.contains(key.as_str()))
                .collect();
            if !keys.is_empty() {
                let by_key = fetcher.fetch_keys(Collection::WeeklyBalances, &keys);
                debug!(
                    probed = keys.len(),
                    found = by_key.documents.len(),
                    "key reads for windowed weekly balances"
                );
                outcome.documents.extend(by_key.documents);
                outcome.report.absorb(by_key.report);
            }
        }

        snap.balance_weeks = Some(weeks);
        outcome
    }
}

/// Decode one collection, dropping malformed documents and duplicate keys
/// (first occurrence wins).
fn decode<T>(
    snap: &mut AnalyticsSnapshot,
    outcome: FetchOutcome,
    parse: impl Fn(&Document) -> Result<T, RecordError>,
    key: impl Fn(&T) -> String,
) -> Vec<T> {
    let collection = outcome.report.collection;
    let mut seen = BTreeSet::new();
    let mut records = Vec::with_capacity(outcome.documents.len());
    let mut skipped = 0usize;

    for doc in &outcome.documents {
        match parse(doc) {
            Ok(record) => {
                if seen.insert(key(&record)) {
                    records.push(record);
                } else {
                    warn!(collection = %collection, id = %doc.id, "duplicate record skipped");
                    skipped += 1;
                }
            }
            Err(e) => {
                warn!(collection = %collection, error = %e, "malformed record skipped");
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        snap.skipped.insert(collection, skipped);
    }
    snap.reports.push(outcome.report);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemoryStore;
    use crate::data::strategy::FetchPolicy;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_documents(
                Collection::Weeks,
                vec![
                    Document::from_value(
                        "2025-W39",
                        json!({"status": "settled", "endDate": "2025-09-26T20:00:00Z"}),
                    ),
                    Document::from_value(
                        "2025-W40",
                        json!({"status": "settled", "endDate": "2025-10-03T20:00:00Z"}),
                    ),
                    Document::from_value("2025-W41", json!({"status": "open"})),
                ],
            )
            .with_documents(
                Collection::WeeklyBalances,
                vec![
                    Document::from_value(
                        "2025-W39_u1",
                        json!({"uid": "u1", "weekId": "2025-W39", "resultReturnPct": 1.0}),
                    ),
                    Document::from_value(
                        "2025-W40_u1",
                        json!({"uid": "u1", "weekId": "2025-W40", "resultReturnPct": 2.0}),
                    ),
                    // key-only record: identity comes from the document id
                    Document::from_value("2025-W40_u2", json!({"resultReturnPct": -1.0})),
                    Document::from_value("garbage", json!({"resultReturnPct": 9.0})),
                ],
            )
            .with_documents(
                Collection::Users,
                vec![
                    Document::from_value("u1", json!({"username": "alice"})),
                    Document::from_value("u2", json!({})),
                ],
            )
    }

    #[test]
    fn loads_all_collections_and_counts_skips() {
        let fetcher = ResilientFetcher::new(store(), FetchPolicy::default());
        let snap = SnapshotLoader::new().load(&fetcher);
        assert_eq!(snap.weeks.len(), 3);
        assert_eq!(snap.weekly_balances.len(), 3);
        assert_eq!(snap.skipped(Collection::WeeklyBalances), 1);
        assert_eq!(snap.reports.len(), Collection::ALL.len());
        assert_eq!(snap.display_names().get("u1"), Some(&"alice"));
        assert!(!snap.degraded());
    }

    #[test]
    fn windowed_load_reads_recent_weeks_only() {
        let fetcher = ResilientFetcher::new(store(), FetchPolicy::default());
        let snap = SnapshotLoader::new().with_window(Some(1)).load(&fetcher);
        let mut uids: Vec<&str> = snap.weekly_balances.iter().map(|b| b.uid.as_str()).collect();
        uids.sort_unstable();
        assert_eq!(uids, vec!["u1", "u2"]);
        assert!(snap
            .weekly_balances
            .iter()
            .all(|b| b.week_id.to_string() == "2025-W40"));
        assert_eq!(
            snap.balance_weeks,
            Some(vec!["2025-W40".parse::<WeekId>().unwrap()])
        );
    }

    #[test]
    fn windowed_load_keeps_key_only_records_of_known_users() {
        let fetcher = ResilientFetcher::new(store(), FetchPolicy::default());
        let full = SnapshotLoader::new().load(&fetcher);
        let windowed = SnapshotLoader::new().with_window(Some(1)).load(&fetcher);

        let w40 = |snap: &AnalyticsSnapshot| {
            let mut rows: Vec<(String, Option<f64>)> = snap
                .weekly_balances
                .iter()
                .filter(|b| b.week_id.to_string() == "2025-W40")
                .map(|b| (b.uid.clone(), b.result_return_pct))
                .collect();
            rows.sort_by(|a, b| a.0.cmp(&b.0));
            rows
        };
        assert_eq!(w40(&windowed), w40(&full));
        assert_eq!(full.balance_weeks, None);
        // the key-only record was served by a point read
        assert_eq!(
            windowed.report(Collection::WeeklyBalances).unwrap().served_by,
            Some(crate::data::strategy::FetchStrategy::KeyLookupQuery)
        );
    }

    #[test]
    fn denied_collection_degrades_without_aborting() {
        let fetcher = ResilientFetcher::new(store().deny(Collection::Users), FetchPolicy::default());
        let snap = SnapshotLoader::new().load(&fetcher);
        assert!(snap.users.is_empty());
        assert_eq!(snap.weekly_balances.len(), 3);
        assert!(snap.report(Collection::Users).unwrap().permission_denied);
        assert!(snap.degraded());
    }

    #[test]
    fn duplicate_weekly_balance_keeps_first() {
        let s = store().with_documents(
            Collection::WeeklyBalances,
            vec![Document::from_value(
                "dup",
                json!({"uid": "u1", "weekId": "2025-W40", "resultReturnPct": 50.0}),
            )],
        );
        let snap = SnapshotLoader::new().load(&ResilientFetcher::new(s, FetchPolicy::default()));
        let u1_w40: Vec<_> = snap
            .weekly_balances
            .iter()
            .filter(|b| b.uid == "u1" && b.week_id.to_string() == "2025-W40")
            .collect();
        assert_eq!(u1_w40.len(), 1);
        assert_eq!(u1_w40[0].result_return_pct, Some(2.0));
    }

    #[test]
    fn fingerprint_ignores_fetch_order() {
        let a = SnapshotLoader::new().load(&ResilientFetcher::new(store(), FetchPolicy::default()));
        let mut b = a.clone();
        b.weekly_balances.reverse();
        b.weeks.reverse();
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.weekly_balances[0].result_return_pct = Some(99.0);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn empty_store_gives_empty_snapshot() {
        let snap = SnapshotLoader::new().load(&ResilientFetcher::new(MemoryStore::new(), FetchPolicy::default()));
        assert!(snap.is_empty());
        assert_eq!(snap.fingerprint().len(), 64);
    }
}
