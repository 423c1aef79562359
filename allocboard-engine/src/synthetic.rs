//! Synthetic contest generator for demos, benchmarks and tests.
//!
//! Produces a `MemoryStore` populated the way the settlement pipeline would
//! leave it: settled weeks with immutable weekly balances, allocations for
//! every played week, one rolling balance per user, plus one open week with
//! allocations but no results yet. Output is fully determined by the seed.

use std::collections::BTreeMap;

use allocboard_core::domain::weekly_key;
use allocboard_core::{Collection, Document, MemoryStore, WeekId, SEED_BALANCE};
use chrono::{Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};

/// Instruments offered in synthetic contests: (code, name, category).
pub const INSTRUMENTS: [(&str, &str, &str); 12] = [
    ("AAPL", "Apple Inc.", "equity"),
    ("MSFT", "Microsoft Corp.", "equity"),
    ("NVDA", "NVIDIA Corp.", "equity"),
    ("AMZN", "Amazon.com Inc.", "equity"),
    ("TSLA", "Tesla Inc.", "equity"),
    ("SPY", "SPDR S&P 500 ETF", "etf"),
    ("QQQ", "Invesco QQQ Trust", "etf"),
    ("GLD", "SPDR Gold Shares", "commodity"),
    ("TLT", "iShares 20+ Year Treasury", "bond"),
    ("BTC", "Bitcoin", "crypto"),
    ("ETH", "Ether", "crypto"),
    ("EURUSD", "Euro / US Dollar", "fx"),
];

/// Last settled week of the default contest.
pub const LAST_SETTLED: WeekId = WeekId::clamped(2025, 40);

#[derive(Debug, Clone)]
pub struct SyntheticContest {
    pub seed: String,
    pub users: usize,
    /// Settled weeks ending at `last_settled`.
    pub settled_weeks: usize,
    pub last_settled: WeekId,
    /// Probability a user sits out a given week.
    pub skip_probability: f64,
    /// Declare the composite indexes the engine's queries use.
    pub with_indexes: bool,
}

impl Default for SyntheticContest {
    fn default() -> Self {
        Self {
            seed: "allocboard".into(),
            users: 25,
            settled_weeks: 12,
            last_settled: LAST_SETTLED,
            skip_probability: 0.1,
            with_indexes: true,
        }
    }
}

impl SyntheticContest {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            ..Self::default()
        }
    }

    pub fn with_users(mut self, users: usize) -> Self {
        self.users = users;
        self
    }

    pub fn with_weeks(mut self, weeks: usize) -> Self {
        self.settled_weeks = weeks;
        self
    }

    /// Deterministic RNG from the seed string.
    fn rng(&self) -> StdRng {
        let seed_bytes = blake3::hash(self.seed.as_bytes());
        StdRng::from_seed(*seed_bytes.as_bytes())
    }

    pub fn generate(&self) -> MemoryStore {
        let mut rng = self.rng();
        let mut store = MemoryStore::new().named(format!("synthetic:{}", self.seed));

        for (code, name, category) in INSTRUMENTS {
            store.insert(
                Collection::Instruments,
                Document::from_value(code, json!({"name": name, "category": category})),
            );
        }

        let uids: Vec<String> = (1..=self.users).map(|i| format!("user{i:03}")).collect();
        for (i, uid) in uids.iter().enumerate() {
            // every seventh user has no profile, so display falls back to uid
            if i % 7 == 6 {
                continue;
            }
            store.insert(
                Collection::Users,
                Document::from_value(
                    uid.as_str(),
                    json!({"uid": uid, "username": format!("trader_{}", i + 1), "email": format!("{uid}@example.com")}),
                ),
            );
        }

        let mut weeks = self.last_settled.trailing(self.settled_weeks);
        weeks.reverse();
        let open_week = WeekId::from_date(self.last_settled.monday() + Duration::days(7));

        let mut balances: BTreeMap<&str, (f64, Option<WeekId>)> = uids
            .iter()
            .map(|u| (u.as_str(), (SEED_BALANCE, None)))
            .collect();

        for week in &weeks {
            store.insert(Collection::Weeks, week_document(*week, "settled"));

            let moves: BTreeMap<&str, f64> = INSTRUMENTS
                .iter()
                .map(|(code, _, _)| (*code, rng.gen_range(-6.0..6.0)))
                .collect();

            for uid in &uids {
                if rng.gen_bool(self.skip_probability.clamp(0.0, 1.0)) {
                    continue;
                }
                let pairs = random_pairs(&mut rng);
                let return_pct: f64 = pairs.iter().map(|(code, w)| w * moves[code.as_str()]).sum();

                let key = weekly_key(week, uid);
                store.insert(
                    Collection::Allocations,
                    Document::from_value(
                        key.as_str(),
                        json!({"uid": uid, "weekId": week.to_string(), "pairs": pairs_value(&pairs)}),
                    ),
                );

                let entry = balances.entry(uid.as_str()).or_insert((SEED_BALANCE, None));
                let base = entry.0;
                let end = base * (1.0 + return_pct / 100.0);
                *entry = (end, Some(*week));
                store.insert(
                    Collection::WeeklyBalances,
                    Document::from_value(
                        key.as_str(),
                        json!({
                            "uid": uid,
                            "weekId": week.to_string(),
                            "baseBalance": round2(base),
                            "endBalance": round2(end),
                            "resultReturnPct": return_pct,
                        }),
                    ),
                );
            }
        }

        store.insert(Collection::Weeks, week_document(open_week, "open"));
        for uid in uids.iter().take(self.users / 2) {
            let pairs = random_pairs(&mut rng);
            store.insert(
                Collection::Allocations,
                Document::from_value(
                    weekly_key(&open_week, uid),
                    json!({"uid": uid, "weekId": open_week.to_string(), "pairs": pairs_value(&pairs)}),
                ),
            );
        }

        for (uid, (balance, latest)) in &balances {
            let Some(latest) = latest else {
                continue;
            };
            store.insert(
                Collection::Balances,
                Document::from_value(
                    *uid,
                    json!({"latestBalance": round2(*balance), "latestWeekId": latest.to_string()}),
                ),
            );
        }

        if self.with_indexes {
            store = store
                .with_index(Collection::WeeklyBalances, &["uid", "weekId"])
                .with_index(Collection::WeeklyBalances, &["weekId", "resultReturnPct"])
                .with_index(Collection::Allocations, &["uid", "weekId"]);
        }
        store
    }
}

fn week_document(week: WeekId, status: &str) -> Document {
    let monday = week.monday();
    let at = |days: i64, hour: u32| {
        monday
            .and_hms_opt(hour, 0, 0)
            .map(|t| Utc.from_utc_datetime(&t) + Duration::days(days))
            .map(|t| t.to_rfc3339())
    };
    Document::from_value(
        week.to_string(),
        json!({
            "status": status,
            "openAt": at(-3, 0),
            "closeAt": at(0, 13),
            "startDate": at(0, 13),
            "endDate": at(4, 20),
        }),
    )
}

/// One to five instruments with weights summing to 1.
fn random_pairs(rng: &mut StdRng) -> Vec<(String, f64)> {
    let count = rng.gen_range(1..=5);
    let mut codes: Vec<&str> = INSTRUMENTS.iter().map(|(c, _, _)| *c).collect();
    codes.shuffle(rng);
    let raw: Vec<f64> = (0..count).map(|_| rng.gen_range(0.05..1.0)).collect();
    let total: f64 = raw.iter().sum();
    codes
        .into_iter()
        .take(count)
        .zip(raw)
        .map(|(code, w)| (code.to_string(), w / total))
        .collect()
}

fn pairs_value(pairs: &[(String, f64)]) -> Value {
    let map: Map<String, Value> = pairs.iter().map(|(c, w)| (c.clone(), json!(w))).collect();
    Value::Object(map)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
