//! Diversification and concentration-risk analysis over allocations.
//!
//! `AllocationStats::collect` makes one pass over the allocation set and keeps
//! per-user and per-instrument accumulators; every table and index below is
//! derived from those accumulators. No per-user lookups.

use std::collections::{BTreeMap, HashMap};

use allocboard_core::{Allocation, Instrument};
use serde::{Deserialize, Serialize};

// ─── Accumulators ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
struct UserAccumulator {
    allocations: usize,
    held_total: usize,
    max_weight: f64,
}

/// Per-instrument usage across all allocations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Popularity {
    /// Sum of weights across allocations holding the instrument.
    pub total_weight: f64,
    /// Allocations holding the instrument (weight > 0).
    pub count: usize,
    pub avg_weight: f64,
}

/// Single-pass accumulation over an allocation set.
#[derive(Debug, Clone, Default)]
pub struct AllocationStats {
    users: Vec<(String, UserAccumulator)>,
    /// uid → position in `users`.
    index: HashMap<String, usize>,
    popularity: BTreeMap<String, Popularity>,
}

impl AllocationStats {
    pub fn collect<'a>(allocations: impl IntoIterator<Item = &'a Allocation>) -> Self {
        let mut index: HashMap<&'a str, usize> = HashMap::new();
        let mut users: Vec<(String, UserAccumulator)> = Vec::new();
        let mut popularity: BTreeMap<String, Popularity> = BTreeMap::new();

        for a in allocations {
            let slot = *index.entry(a.uid.as_str()).or_insert_with(|| {
                users.push((a.uid.clone(), UserAccumulator::default()));
                users.len() - 1
            });
            let acc = &mut users[slot].1;
            acc.allocations += 1;
            acc.max_weight = acc.max_weight.max(a.max_weight());

            for (code, weight) in a.held() {
                acc.held_total += 1;
                let p = popularity.entry(code.to_string()).or_default();
                p.total_weight += weight;
                p.count += 1;
            }
        }

        for p in popularity.values_mut() {
            p.avg_weight = p.total_weight / p.count as f64;
        }

        let index = index
            .into_iter()
            .map(|(uid, slot)| (uid.to_string(), slot))
            .collect();
        Self {
            users,
            index,
            popularity,
        }
    }

    /// Users with at least one allocation, in first-seen order.
    pub fn users(&self) -> impl Iterator<Item = &str> {
        self.users.iter().map(|(uid, _)| uid.as_str())
    }

    pub fn popularity(&self) -> &BTreeMap<String, Popularity> {
        &self.popularity
    }

    pub fn usage_counts(&self) -> Vec<usize> {
        self.popularity.values().map(|p| p.count).collect()
    }

    fn user(&self, uid: &str) -> Option<&UserAccumulator> {
        self.index.get(uid).map(|&slot| &self.users[slot].1)
    }

    /// Concentration summary over all instruments.
    pub fn concentration(&self) -> ConcentrationSummary {
        let counts = self.usage_counts();
        ConcentrationSummary {
            unique_instruments: counts.len(),
            total_usage: counts.iter().sum(),
            top3_share: top3_share_from_counts(&counts),
            concentration_index: concentration_index_from_counts(&counts),
        }
    }

    /// One row per user in `uids` (users without allocations get `None`),
    /// followed by any allocating user missing from `uids`.
    pub fn diversification_table<'u>(
        &self,
        uids: impl IntoIterator<Item = &'u str>,
    ) -> Vec<DiversificationRow> {
        let mut seen = std::collections::HashSet::new();
        let mut rows = Vec::new();

        let listed = uids.into_iter().map(str::to_string);
        let allocating = self.users.iter().map(|(u, _)| u.clone());
        for uid in listed.chain(allocating) {
            if !seen.insert(uid.clone()) {
                continue;
            }
            let acc = self.user(&uid);
            rows.push(DiversificationRow {
                allocations: acc.map_or(0, |a| a.allocations),
                avg_instrument_count: acc.and_then(avg_from_accumulator),
                uid,
            });
        }
        rows
    }

    /// Risk rows for every allocating user, highest max weight first.
    pub fn risk_table(&self) -> Vec<RiskRow> {
        let mut rows: Vec<RiskRow> = self
            .users
            .iter()
            .map(|(uid, acc)| RiskRow {
                uid: uid.clone(),
                max_single_weight: acc.max_weight,
                risk_tier: risk_tier(acc.max_weight),
            })
            .collect();
        rows.sort_by(|a, b| {
            b.max_single_weight
                .partial_cmp(&a.max_single_weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rows
    }

    /// Popularity rows decorated with reference data, most used first.
    pub fn popularity_table(&self, instruments: &[Instrument]) -> Vec<PopularityRow> {
        let reference: HashMap<&str, &Instrument> =
            instruments.iter().map(|i| (i.code.as_str(), i)).collect();
        let mut rows: Vec<PopularityRow> = self
            .popularity
            .iter()
            .map(|(code, p)| {
                let info = reference.get(code.as_str());
                PopularityRow {
                    code: code.clone(),
                    name: info.and_then(|i| i.name.clone()),
                    category: info.and_then(|i| i.category.clone()),
                    total_weight: p.total_weight,
                    count: p.count,
                    avg_weight: p.avg_weight,
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.count.cmp(&a.count).then(
                b.total_weight
                    .partial_cmp(&a.total_weight)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });
        rows
    }

    pub fn avg_instrument_count(&self, uid: &str) -> Option<f64> {
        self.user(uid).and_then(avg_from_accumulator)
    }

    pub fn max_single_weight(&self, uid: &str) -> Option<f64> {
        self.user(uid).map(|acc| acc.max_weight)
    }
}

fn avg_from_accumulator(acc: &UserAccumulator) -> Option<f64> {
    if acc.allocations == 0 {
        return None;
    }
    Some(acc.held_total as f64 / acc.allocations as f64)
}

// ─── Output rows ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversificationRow {
    pub uid: String,
    pub allocations: usize,
    /// `None` when the user has no allocations to average over.
    pub avg_instrument_count: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularityRow {
    pub code: String,
    pub name: Option<String>,
    pub category: Option<String>,
    pub total_weight: f64,
    pub count: usize,
    pub avg_weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationSummary {
    pub unique_instruments: usize,
    pub total_usage: usize,
    pub top3_share: f64,
    pub concentration_index: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    None,
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRow {
    pub uid: String,
    pub max_single_weight: f64,
    pub risk_tier: RiskTier,
}

// ─── Pure metric functions ──────────────────────────────────────────

/// Mean number of held instruments (weight > 0) per allocation.
/// `None` when there is nothing to average.
pub fn avg_instrument_count(user_allocations: &[&Allocation]) -> Option<f64> {
    if user_allocations.is_empty() {
        return None;
    }
    let held: usize = user_allocations.iter().map(|a| a.instrument_count()).sum();
    Some(held as f64 / user_allocations.len() as f64)
}

/// Per-instrument total weight, usage count and average weight.
pub fn instrument_popularity(allocations: &[Allocation]) -> BTreeMap<String, Popularity> {
    AllocationStats::collect(allocations).popularity
}

/// Usage-count Herfindahl index: `Σ(share²) × 100` with
/// `share = count / Σ count`. 0 when nothing is used.
pub fn concentration_index_from_counts(counts: &[usize]) -> f64 {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    counts
        .iter()
        .map(|&c| {
            let share = c as f64 / total;
            share * share
        })
        .sum::<f64>()
        * 100.0
}

pub fn concentration_index(allocations: &[Allocation]) -> f64 {
    concentration_index_from_counts(&AllocationStats::collect(allocations).usage_counts())
}

/// Share of total usage taken by the three most used instruments, in percent.
pub fn top3_share_from_counts(counts: &[usize]) -> f64 {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let mut sorted = counts.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    let top: usize = sorted.iter().take(3).sum();
    top as f64 / total as f64 * 100.0
}

pub fn top3_share(allocations: &[Allocation]) -> f64 {
    top3_share_from_counts(&AllocationStats::collect(allocations).usage_counts())
}

/// `> 0.8` high, `> 0.6` medium, `> 0.5` low, otherwise none.
pub fn risk_tier(max_single_weight: f64) -> RiskTier {
    if max_single_weight > 0.8 {
        RiskTier::High
    } else if max_single_weight > 0.6 {
        RiskTier::Medium
    } else if max_single_weight > 0.5 {
        RiskTier::Low
    } else {
        RiskTier::None
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
