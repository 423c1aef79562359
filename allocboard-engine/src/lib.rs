//! Allocboard Engine: returns, diversification, leaderboards, reports.
//!
//! Everything here is computed from one `AnalyticsSnapshot`:
//! - Return aggregation (compounding, win rate, annualized return, streaks)
//! - Allocation diversification, instrument popularity, concentration, risk tiers
//! - Leaderboards in six modes, ranked with a stable descending sort
//! - Per-user and per-week summaries
//! - CSV and versioned JSON exports
//! - TOML engine configuration and a deterministic synthetic contest

pub mod config;
pub mod diversification;
pub mod export;
pub mod leaderboard;
pub mod ranking;
pub mod returns;
pub mod summary;
pub mod synthetic;

pub use config::{ConfigError, EngineConfig};
pub use diversification::{AllocationStats, ConcentrationSummary, RiskTier};
pub use leaderboard::{Leaderboard, LeaderboardMode, LeaderboardRow};
pub use ranking::RankingEngine;
pub use summary::{UserPerformance, WeekSummary};
pub use synthetic::SyntheticContest;
