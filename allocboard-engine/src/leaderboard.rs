//! Leaderboard modes and result rows.

use std::fmt;
use std::str::FromStr;

use allocboard_core::WeekId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Window used by `recent`, `win-rate` and `annualized` when none is given.
pub const DEFAULT_WINDOW: usize = 4;

/// Which leaderboard to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LeaderboardMode {
    /// Return of the most recently settled week.
    LatestWeek,
    /// Latest rolling balance, seed balance for users without one.
    OverallBalance,
    /// Compounded return over the `weeks` most recently settled weeks.
    RecentWeeks { weeks: usize },
    /// Return of one specific week.
    ByWeek { week: WeekId },
    WinRate { weeks: usize },
    /// Linear annualized return over the window.
    AnnualizedReturn { weeks: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeParseError {
    #[error("unknown leaderboard mode '{0}' (expected latest-week, overall, recent[:N], week:YYYY-Www, win-rate[:N], annualized[:N])")]
    Unknown(String),

    #[error("invalid window '{0}': expected a positive integer")]
    Window(String),

    #[error("mode 'week' needs a week id, e.g. week:2025-W40")]
    MissingWeek,

    #[error(transparent)]
    Week(#[from] allocboard_core::domain::WeekIdError),
}

impl LeaderboardMode {
    /// Parse `name[:arg]`, filling windowed modes without an argument from
    /// `default_window`.
    pub fn parse_with_default(s: &str, default_window: usize) -> Result<Self, ModeParseError> {
        let s = s.trim();
        let (name, arg) = match s.split_once(':') {
            Some((n, a)) => (n, Some(a.trim())),
            None => (s, None),
        };
        let window = |arg: Option<&str>| -> Result<usize, ModeParseError> {
            match arg {
                None => Ok(default_window),
                Some(a) => match a.parse::<usize>() {
                    Ok(n) if n > 0 => Ok(n),
                    _ => Err(ModeParseError::Window(a.to_string())),
                },
            }
        };

        match name.to_ascii_lowercase().replace('_', "-").as_str() {
            "latest-week" | "latest" => Ok(Self::LatestWeek),
            "overall" | "overall-balance" | "balance" => Ok(Self::OverallBalance),
            "recent" | "recent-weeks" => Ok(Self::RecentWeeks { weeks: window(arg)? }),
            "week" | "by-week" => {
                let week = arg.ok_or(ModeParseError::MissingWeek)?.parse::<WeekId>()?;
                Ok(Self::ByWeek { week })
            }
            "win-rate" | "winrate" => Ok(Self::WinRate { weeks: window(arg)? }),
            "annualized" | "annualized-return" => {
                Ok(Self::AnnualizedReturn { weeks: window(arg)? })
            }
            _ => Err(ModeParseError::Unknown(s.to_string())),
        }
    }

    /// Name of the metric column for this mode.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::LatestWeek | Self::ByWeek { .. } => "return_pct",
            Self::OverallBalance => "balance",
            Self::RecentWeeks { .. } => "compounded_return_pct",
            Self::WinRate { .. } => "win_rate_pct",
            Self::AnnualizedReturn { .. } => "annualized_return_pct",
        }
    }

    /// Window size for windowed modes.
    pub fn window(&self) -> Option<usize> {
        match self {
            Self::RecentWeeks { weeks } | Self::WinRate { weeks } | Self::AnnualizedReturn { weeks } => {
                Some(*weeks)
            }
            _ => None,
        }
    }
}

impl FromStr for LeaderboardMode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with_default(s, DEFAULT_WINDOW)
    }
}

impl fmt::Display for LeaderboardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LatestWeek => write!(f, "latest-week"),
            Self::OverallBalance => write!(f, "overall"),
            Self::RecentWeeks { weeks } => write!(f, "recent:{weeks}"),
            Self::ByWeek { week } => write!(f, "week:{week}"),
            Self::WinRate { weeks } => write!(f, "win-rate:{weeks}"),
            Self::AnnualizedReturn { weeks } => write!(f, "annualized:{weeks}"),
        }
    }
}

/// One ranked participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    /// 1-based position. Tied metrics keep fetch order, so ranks are distinct.
    pub rank: usize,
    pub uid: String,
    /// Username, or the uid when the profile is unavailable.
    pub display_name: String,
    pub metric: f64,
    /// Settled weeks that contributed to the metric.
    pub weeks_counted: usize,
    pub base_balance: Option<f64>,
    pub end_balance: Option<f64>,
    pub latest_week: Option<WeekId>,
}

/// Ordered result set for one mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub mode: LeaderboardMode,
    /// Weeks the metric was computed over, most recent first. Empty for
    /// `OverallBalance`.
    pub weeks: Vec<WeekId>,
    pub rows: Vec<LeaderboardRow>,
}

impl Leaderboard {
    /// Sort rows by metric, best first, and assign ranks. The sort is stable.
    /// Rows whose metric is NaN have no place in the order and are dropped.
    pub fn ranked(mode: LeaderboardMode, weeks: Vec<WeekId>, mut rows: Vec<LeaderboardRow>) -> Self {
        rows.retain(|row| {
            if row.metric.is_nan() {
                warn!(mode = %mode, uid = %row.uid, "row without a comparable metric dropped");
            }
            !row.metric.is_nan()
        });
        rows.sort_by(|a, b| b.metric.total_cmp(&a.metric));
        for (i, row) in rows.iter_mut().enumerate() {
            row.rank = i + 1;
        }
        Self { mode, weeks, rows }
    }

    /// The single week a per-week mode ranked, if any.
    pub fn week(&self) -> Option<WeekId> {
        match self.mode {
            LeaderboardMode::LatestWeek | LeaderboardMode::ByWeek { .. } => self.weeks.first().copied(),
            _ => None,
        }
    }

    pub fn top(&self, n: usize) -> &[LeaderboardRow] {
        &self.rows[..n.min(self.rows.len())]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, uid: &str) -> Option<&LeaderboardRow> {
        self.rows.iter().find(|r| r.uid == uid)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn row(uid: &str, metric: f64) -> LeaderboardRow {
        LeaderboardRow {
            rank: 0,
            uid: uid.into(),
            display_name: uid.into(),
            metric,
            weeks_counted: 1,
            base_balance: None,
            end_balance: None,
            latest_week: None,
        }
    }

    #[test]
    fn parses_cli_forms() {
        assert_eq!("latest-week".parse(), Ok(LeaderboardMode::LatestWeek));
        assert_eq!("overall".parse(), Ok(LeaderboardMode::OverallBalance));
        assert_eq!("recent".parse(), Ok(LeaderboardMode::RecentWeeks { weeks: 4 }));
        assert_eq!("recent:12".parse(), Ok(LeaderboardMode::RecentWeeks { weeks: 12 }));
        assert_eq!("win-rate:4".parse(), Ok(LeaderboardMode::WinRate { weeks: 4 }));
        assert_eq!("annualized:8".parse(), Ok(LeaderboardMode::AnnualizedReturn { weeks: 8 }));
        assert_eq!(
            "week:2025-W40".parse(),
            Ok(LeaderboardMode::ByWeek { week: "2025-W40".parse().unwrap() })
        );
    }

    #[test]
    fn default_window_applies() {
        assert_eq!(
            LeaderboardMode::parse_with_default("win-rate", 6),
            Ok(LeaderboardMode::WinRate { weeks: 6 })
        );
    }

    #[test]
    fn rejects_bad_modes() {
        assert!(matches!("top".parse::<LeaderboardMode>(), Err(ModeParseError::Unknown(_))));
        assert!(matches!("recent:0".parse::<LeaderboardMode>(), Err(ModeParseError::Window(_))));
        assert!(matches!("recent:x".parse::<LeaderboardMode>(), Err(ModeParseError::Window(_))));
        assert!(matches!("week".parse::<LeaderboardMode>(), Err(ModeParseError::MissingWeek)));
        assert!(matches!("week:40".parse::<LeaderboardMode>(), Err(ModeParseError::Week(_))));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for mode in [
            LeaderboardMode::LatestWeek,
            LeaderboardMode::OverallBalance,
            LeaderboardMode::RecentWeeks { weeks: 3 },
            LeaderboardMode::WinRate { weeks: 5 },
            LeaderboardMode::AnnualizedReturn { weeks: 8 },
        ] {
            assert_eq!(mode.to_string().parse(), Ok(mode));
        }
    }

    #[test]
    fn ranking_is_descending_and_stable() {
        let board = Leaderboard::ranked(
            LeaderboardMode::LatestWeek,
            vec![],
            vec![row("a", 1.0), row("b", 3.0), row("c", 1.0), row("d", -2.0)],
        );
        let order: Vec<&str> = board.rows.iter().map(|r| r.uid.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c", "d"]);
        let ranks: Vec<usize> = board.rows.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        assert_eq!(board.top(2).len(), 2);
        assert_eq!(board.top(10).len(), 4);
    }

    #[test]
    fn nan_metrics_are_dropped_before_ranking() {
        let board = Leaderboard::ranked(
            LeaderboardMode::RecentWeeks { weeks: 5 },
            vec![],
            vec![row("a", 1.0), row("n", f64::NAN), row("b", 5.0)],
        );
        let order: Vec<&str> = board.rows.iter().map(|r| r.uid.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
        assert_eq!(board.rows[1].rank, 2);
    }

    #[test]
    fn mode_serializes_tagged() {
        let json = serde_json::to_string(&LeaderboardMode::RecentWeeks { weeks: 4 }).unwrap();
        assert_eq!(json, r#"{"mode":"recent_weeks","weeks":4}"#);
    }
}
