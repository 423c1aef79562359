//! Ranking engine: one operation per leaderboard mode, all over one snapshot.
//!
//! Every mode is a pure function of the `AnalyticsSnapshot`; nothing here
//! touches the store. Rows are sorted by metric, best first, with a stable
//! sort so tied rows keep fetch order.

use std::collections::{HashMap, HashSet};

use allocboard_core::domain::settled_most_recent_first;
use allocboard_core::{AnalyticsSnapshot, WeekId, WeeklyBalance};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::diversification::AllocationStats;
use crate::leaderboard::{Leaderboard, LeaderboardMode, LeaderboardRow};
use crate::returns::{
    annualized_return_with, compounded_return, group_by_user, win_rate, ReturnSeries,
};
use crate::summary::{Performer, UserPerformance, WeekSummary};

pub struct RankingEngine<'a> {
    snapshot: &'a AnalyticsSnapshot,
    config: EngineConfig,
    names: HashMap<&'a str, &'a str>,
}

impl<'a> RankingEngine<'a> {
    pub fn new(snapshot: &'a AnalyticsSnapshot, config: EngineConfig) -> Self {
        Self {
            snapshot,
            config,
            names: snapshot.display_names(),
        }
    }

    pub fn snapshot(&self) -> &AnalyticsSnapshot {
        self.snapshot
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn display_name<'s>(&'s self, uid: &'s str) -> &'s str {
        self.names.get(uid).copied().unwrap_or(uid)
    }

    /// Dispatch on `mode`.
    pub fn leaderboard(&self, mode: LeaderboardMode) -> Leaderboard {
        let board = match mode {
            LeaderboardMode::LatestWeek => self.latest_week(),
            LeaderboardMode::OverallBalance => self.overall_balance(),
            LeaderboardMode::RecentWeeks { weeks } => self.recent_weeks(weeks),
            LeaderboardMode::ByWeek { week } => self.by_week(week),
            LeaderboardMode::WinRate { weeks } => self.win_rate(weeks),
            LeaderboardMode::AnnualizedReturn { weeks } => self.annualized_return(weeks),
        };
        debug!(mode = %mode, rows = board.rows.len(), weeks = board.weeks.len(), "leaderboard built");
        board
    }

    // ─── Week selection ─────────────────────────────────────────────

    /// The `k` most recently settled weeks, newest first.
    ///
    /// Without a weeks collection (denied or empty) the week ids present in
    /// settled weekly balances stand in, newest id first.
    pub fn recent_settled_weeks(&self, k: usize) -> Vec<WeekId> {
        let mut weeks = self.settled_weeks(k);
        if let Some(loaded) = &self.snapshot.balance_weeks {
            let requested = weeks.len();
            weeks.retain(|w| loaded.contains(w));
            if weeks.len() < requested {
                warn!(
                    requested = k,
                    loaded = loaded.len(),
                    "window wider than the loaded weeks, capped"
                );
            }
        }
        weeks
    }

    fn settled_weeks(&self, k: usize) -> Vec<WeekId> {
        let from_weeks: Vec<WeekId> = settled_most_recent_first(&self.snapshot.weeks)
            .into_iter()
            .map(|w| w.id)
            .take(k)
            .collect();
        if !from_weeks.is_empty() || !self.snapshot.weeks.is_empty() {
            return from_weeks;
        }

        let mut ids: Vec<WeekId> = self
            .snapshot
            .weekly_balances
            .iter()
            .filter(|b| b.result_return_pct.is_some())
            .map(|b| b.week_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.truncate(k);
        ids
    }

    /// Settled week with the latest end date.
    pub fn latest_settled_week(&self) -> Option<WeekId> {
        self.recent_settled_weeks(1).first().copied()
    }

    // ─── Modes ──────────────────────────────────────────────────────

    pub fn latest_week(&self) -> Leaderboard {
        match self.latest_settled_week() {
            Some(week) => self.single_week(LeaderboardMode::LatestWeek, week),
            None => Leaderboard::ranked(LeaderboardMode::LatestWeek, Vec::new(), Vec::new()),
        }
    }

    pub fn by_week(&self, week: WeekId) -> Leaderboard {
        self.single_week(LeaderboardMode::ByWeek { week }, week)
    }

    /// Every known user, ranked by latest balance. Users without a balance
    /// record get the seed balance.
    pub fn overall_balance(&self) -> Leaderboard {
        let balances: HashMap<&str, &allocboard_core::Balance> = self
            .snapshot
            .balances
            .iter()
            .map(|b| (b.uid.as_str(), b))
            .collect();

        let rows = self
            .known_users()
            .into_iter()
            .map(|uid| {
                let balance = balances.get(uid);
                LeaderboardRow {
                    rank: 0,
                    uid: uid.to_string(),
                    display_name: self.display_name(uid).to_string(),
                    metric: balance.map_or(self.config.seed_balance, |b| b.latest_balance),
                    weeks_counted: 0,
                    base_balance: None,
                    end_balance: balance.map(|b| b.latest_balance),
                    latest_week: balance.and_then(|b| b.latest_week_id),
                }
            })
            .collect();
        Leaderboard::ranked(LeaderboardMode::OverallBalance, Vec::new(), rows)
    }

    pub fn recent_weeks(&self, k: usize) -> Leaderboard {
        self.windowed(LeaderboardMode::RecentWeeks { weeks: k }, k, compounded_return)
    }

    pub fn win_rate(&self, k: usize) -> Leaderboard {
        self.windowed(LeaderboardMode::WinRate { weeks: k }, k, win_rate)
    }

    pub fn annualized_return(&self, k: usize) -> Leaderboard {
        let per_year = self.config.weeks_per_year;
        self.windowed(
            LeaderboardMode::AnnualizedReturn { weeks: k },
            k,
            |r: &[f64]| annualized_return_with(r, per_year),
        )
    }

    fn single_week(&self, mode: LeaderboardMode, week: WeekId) -> Leaderboard {
        let rows = self
            .snapshot
            .weekly_balances
            .iter()
            .filter(|b| b.week_id == week)
            .filter_map(|b| {
                let pct = b.result_return_pct?;
                Some(self.row(b.uid.as_str(), pct, 1, Some(b), Some(b)))
            })
            .collect();
        Leaderboard::ranked(mode, vec![week], rows)
    }

    fn windowed(
        &self,
        mode: LeaderboardMode,
        k: usize,
        metric: impl Fn(&[f64]) -> Option<f64>,
    ) -> Leaderboard {
        let weeks = self.recent_settled_weeks(k);
        let window: HashSet<WeekId> = weeks.iter().copied().collect();
        let rows = group_by_user(&self.snapshot.weekly_balances, |w| window.contains(&w))
            .iter()
            .filter_map(|series| {
                let returns = series.returns();
                let value = metric(&returns)?;
                Some(self.row(series.uid, value, returns.len(), series.first(), series.latest()))
            })
            .collect();
        Leaderboard::ranked(mode, weeks, rows)
    }

    fn row(
        &self,
        uid: &str,
        metric: f64,
        weeks_counted: usize,
        first: Option<&WeeklyBalance>,
        last: Option<&WeeklyBalance>,
    ) -> LeaderboardRow {
        LeaderboardRow {
            rank: 0,
            uid: uid.to_string(),
            display_name: self.display_name(uid).to_string(),
            metric,
            weeks_counted,
            base_balance: first.map(|b| b.base_balance),
            end_balance: last.map(|b| b.end_balance),
            latest_week: last.map(|b| b.week_id),
        }
    }

    /// Users collection first, then uids only seen in balances or weekly
    /// balances, each once, in first-seen order.
    pub fn known_users(&self) -> Vec<&'a str> {
        let snap = self.snapshot;
        let mut seen = HashSet::new();
        snap.users
            .iter()
            .map(|u| u.uid.as_str())
            .chain(snap.balances.iter().map(|b| b.uid.as_str()))
            .chain(snap.weekly_balances.iter().map(|b| b.uid.as_str()))
            .filter(|uid| seen.insert(*uid))
            .collect()
    }

    // ─── Summaries ──────────────────────────────────────────────────

    /// All-time performance for `uid`. `None` for a uid the snapshot has
    /// never seen.
    pub fn user_performance(&self, uid: &str) -> Option<UserPerformance> {
        if !self.known_users().iter().any(|u| *u == uid) {
            return None;
        }
        let series: Vec<ReturnSeries<'_>> = group_by_user(&self.snapshot.weekly_balances, |_| true)
            .into_iter()
            .filter(|s| s.uid == uid)
            .collect();
        let latest_balance = self
            .snapshot
            .balances
            .iter()
            .find(|b| b.uid == uid)
            .map_or(self.config.seed_balance, |b| b.latest_balance);
        Some(UserPerformance::from_series(
            uid,
            self.display_name(uid),
            series.first(),
            latest_balance,
            self.config.weeks_per_year,
        ))
    }

    pub fn week_summary(&self, week: WeekId) -> WeekSummary {
        let results: Vec<Performer> = self
            .snapshot
            .weekly_balances
            .iter()
            .filter(|b| b.week_id == week)
            .filter_map(|b| {
                Some(Performer {
                    uid: b.uid.clone(),
                    display_name: self.display_name(&b.uid).to_string(),
                    return_pct: b.result_return_pct?,
                })
            })
            .collect();
        WeekSummary::from_results(week, &results)
    }

    /// Allocation accumulators for the diversification, popularity,
    /// concentration and risk tables.
    pub fn allocation_stats(&self) -> AllocationStats {
        AllocationStats::collect(&self.snapshot.allocations)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
