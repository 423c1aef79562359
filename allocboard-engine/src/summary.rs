//! Per-user and per-week summaries built from the same return series the
//! leaderboard modes use.

use allocboard_core::WeekId;
use serde::{Deserialize, Serialize};

use crate::returns::{
    annualized_return_with, compounded_return, current_streak, mean, median, win_rate,
    ReturnSeries,
};

/// A (week, return) point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeekReturn {
    pub week_id: WeekId,
    pub return_pct: f64,
}

/// All-time performance of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPerformance {
    pub uid: String,
    pub display_name: String,
    pub weeks_played: usize,
    pub wins: usize,
    pub losses: usize,
    pub flat: usize,
    pub best_week: Option<WeekReturn>,
    pub worst_week: Option<WeekReturn>,
    pub compounded_return: Option<f64>,
    pub win_rate: Option<f64>,
    pub annualized_return: Option<f64>,
    /// Positive: consecutive winning weeks at the end; negative: losing.
    pub current_streak: i32,
    pub latest_balance: f64,
}

impl UserPerformance {
    /// Summarise `series`. An empty series yields zero counts and `None`
    /// aggregates.
    pub fn from_series(
        uid: &str,
        display_name: &str,
        series: Option<&ReturnSeries<'_>>,
        latest_balance: f64,
        weeks_per_year: u32,
    ) -> Self {
        let points: Vec<WeekReturn> = series
            .map(|s| {
                s.entries
                    .iter()
                    .filter_map(|b| {
                        b.result_return_pct.map(|r| WeekReturn {
                            week_id: b.week_id,
                            return_pct: r,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        let returns: Vec<f64> = points.iter().map(|p| p.return_pct).collect();

        let best_week = points
            .iter()
            .copied()
            .reduce(|best, p| if p.return_pct > best.return_pct { p } else { best });
        let worst_week = points
            .iter()
            .copied()
            .reduce(|worst, p| if p.return_pct < worst.return_pct { p } else { worst });

        Self {
            uid: uid.to_string(),
            display_name: display_name.to_string(),
            weeks_played: returns.len(),
            wins: returns.iter().filter(|&&r| r > 0.0).count(),
            losses: returns.iter().filter(|&&r| r < 0.0).count(),
            flat: returns.iter().filter(|&&r| r == 0.0).count(),
            best_week,
            worst_week,
            compounded_return: compounded_return(&returns),
            win_rate: win_rate(&returns),
            annualized_return: annualized_return_with(&returns, weeks_per_year),
            current_streak: current_streak(&returns),
            latest_balance,
        }
    }
}

/// A participant's result in one week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performer {
    pub uid: String,
    pub display_name: String,
    pub return_pct: f64,
}

/// Cross-user statistics for one week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekSummary {
    pub week_id: WeekId,
    pub participants: usize,
    pub mean_return: Option<f64>,
    pub median_return: Option<f64>,
    /// Share of participants with a positive return, in percent.
    pub win_rate: Option<f64>,
    pub best: Option<Performer>,
    pub worst: Option<Performer>,
}

impl WeekSummary {
    /// `results` in fetch order; the first of equal returns wins best/worst.
    pub fn from_results(week_id: WeekId, results: &[Performer]) -> Self {
        let returns: Vec<f64> = results.iter().map(|p| p.return_pct).collect();
        let best = results
            .iter()
            .reduce(|best, p| if p.return_pct > best.return_pct { p } else { best })
            .cloned();
        let worst = results
            .iter()
            .reduce(|worst, p| if p.return_pct < worst.return_pct { p } else { worst })
            .cloned();
        Self {
            week_id,
            participants: results.len(),
            mean_return: mean(&returns),
            median_return: median(&returns),
            win_rate: win_rate(&returns),
            best,
            worst,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
