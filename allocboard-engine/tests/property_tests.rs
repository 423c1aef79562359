//! Property tests for analytics invariants.
//!
//! 1. Every leaderboard mode ranks best first, with ranks 1..=n, even when
//!    returns overflow the compounding product
//! 2. Compounding identities (single week, appending a flat week)
//! 3. Win rate stays within 0..=100
//! 4. Concentration index and top-3 share stay within their bounds

use std::collections::BTreeMap;

use allocboard_core::{AnalyticsSnapshot, Allocation, WeekId, WeeklyBalance};
use allocboard_engine::diversification::{
    concentration_index_from_counts, risk_tier, top3_share_from_counts, AllocationStats, RiskTier,
};
use allocboard_engine::returns::{compounded_return, win_rate};
use allocboard_engine::{EngineConfig, LeaderboardMode, RankingEngine};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_return() -> impl Strategy<Value = f64> {
    (-50.0..50.0_f64).prop_map(|r| (r * 100.0).round() / 100.0)
}

fn week(n: u32) -> WeekId {
    WeekId::new(2025, n).unwrap()
}

/// Ordinary returns mixed with total losses and returns large enough to
/// overflow a compounding product.
fn arb_extreme_return() -> impl Strategy<Value = f64> {
    prop_oneof![arb_return(), Just(-100.0), 1e200..1e300_f64]
}

fn arb_weekly_balances() -> impl Strategy<Value = Vec<WeeklyBalance>> {
    weekly_balances_from(arb_return())
}

/// (uid index, week number, return) triples, deduplicated on (uid, week).
fn weekly_balances_from(
    returns: impl Strategy<Value = f64>,
) -> impl Strategy<Value = Vec<WeeklyBalance>> {
    prop::collection::vec((0..6usize, 30..40u32, returns), 0..60).prop_map(|rows| {
        let mut unique = BTreeMap::new();
        for (u, w, r) in rows {
            unique.entry((u, w)).or_insert(r);
        }
        unique
            .into_iter()
            .map(|((u, w), r)| WeeklyBalance {
                uid: format!("u{u}"),
                week_id: week(w),
                base_balance: 100_000.0,
                end_balance: 100_000.0 * (1.0 + r / 100.0),
                result_return_pct: Some(r),
            })
            .collect()
    })
}

fn arb_mode() -> impl Strategy<Value = LeaderboardMode> {
    prop_oneof![
        Just(LeaderboardMode::LatestWeek),
        Just(LeaderboardMode::OverallBalance),
        (1..12usize).prop_map(|weeks| LeaderboardMode::RecentWeeks { weeks }),
        (30..40u32).prop_map(|w| LeaderboardMode::ByWeek { week: week(w) }),
        (1..12usize).prop_map(|weeks| LeaderboardMode::WinRate { weeks }),
        (1..12usize).prop_map(|weeks| LeaderboardMode::AnnualizedReturn { weeks }),
    ]
}

// ── 1. Descending order ──────────────────────────────────────────────

proptest! {
    #[test]
    fn every_mode_ranks_descending(balances in arb_weekly_balances(), mode in arb_mode()) {
        let snap = AnalyticsSnapshot {
            weekly_balances: balances,
            ..AnalyticsSnapshot::default()
        };
        let engine = RankingEngine::new(&snap, EngineConfig::default());
        let board = engine.leaderboard(mode);

        for pair in board.rows.windows(2) {
            prop_assert!(pair[0].metric >= pair[1].metric);
        }
        for (i, row) in board.rows.iter().enumerate() {
            prop_assert_eq!(row.rank, i + 1);
        }
    }
}

proptest! {
    #[test]
    fn extreme_returns_keep_boards_ordered(
        balances in weekly_balances_from(arb_extreme_return()),
        mode in arb_mode(),
    ) {
        let snap = AnalyticsSnapshot {
            weekly_balances: balances,
            ..AnalyticsSnapshot::default()
        };
        let engine = RankingEngine::new(&snap, EngineConfig::default());
        let board = engine.leaderboard(mode);

        for row in &board.rows {
            prop_assert!(!row.metric.is_nan());
        }
        for pair in board.rows.windows(2) {
            prop_assert!(pair[0].metric >= pair[1].metric);
        }
    }
}

// ── 2. Compounding ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn single_week_compounds_to_itself(r in arb_return()) {
        prop_assert_eq!(compounded_return(&[r]), Some(r));
    }

    #[test]
    fn flat_week_does_not_change_compounded_return(
        returns in prop::collection::vec(arb_return(), 2..10),
    ) {
        let base = compounded_return(&returns).unwrap();
        let mut extended = returns.clone();
        extended.push(0.0);
        let with_flat = compounded_return(&extended).unwrap();
        prop_assert!((base - with_flat).abs() < 1e-9);
    }

    #[test]
    fn compounded_return_never_below_total_loss(
        returns in prop::collection::vec(arb_return(), 1..20),
    ) {
        // each week loses at most 50%, so the balance never reaches zero
        prop_assert!(compounded_return(&returns).unwrap() > -100.0);
    }
}

// ── 3. Win rate ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn win_rate_is_a_percentage(returns in prop::collection::vec(arb_return(), 1..30)) {
        let rate = win_rate(&returns).unwrap();
        prop_assert!((0.0..=100.0).contains(&rate));
    }
}

// ── 4. Concentration ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn concentration_bounds(counts in prop::collection::vec(0..50usize, 1..20)) {
        let index = concentration_index_from_counts(&counts);
        let top3 = top3_share_from_counts(&counts);
        let used = counts.iter().filter(|&&c| c > 0).count();

        if used == 0 {
            prop_assert_eq!(index, 0.0);
        } else {
            // between a uniform spread and a single instrument
            prop_assert!(index >= 100.0 / used as f64 - 1e-9);
            prop_assert!(index <= 100.0 + 1e-9);
            prop_assert!(top3 > 0.0 && top3 <= 100.0 + 1e-9);
        }
    }

    #[test]
    fn risk_rows_match_max_weight(
        weights in prop::collection::vec(prop::collection::vec(0.0..1.0_f64, 1..5), 1..10),
    ) {
        let allocations: Vec<Allocation> = weights
            .iter()
            .enumerate()
            .map(|(i, ws)| Allocation {
                uid: "u1".into(),
                week_id: week(30 + i as u32),
                pairs: ws.iter().enumerate().map(|(j, w)| (format!("I{j}"), *w)).collect(),
            })
            .collect();
        let stats = AllocationStats::collect(&allocations);
        let expected = weights.iter().flatten().copied().fold(0.0_f64, f64::max);

        let rows = stats.risk_table();
        prop_assert_eq!(rows.len(), 1);
        prop_assert_eq!(rows[0].max_single_weight, expected);
        prop_assert_eq!(rows[0].risk_tier, risk_tier(expected));
        if expected <= 0.5 {
            prop_assert_eq!(rows[0].risk_tier, RiskTier::None);
        }
    }
}
