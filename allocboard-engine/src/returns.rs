//! Return aggregation: pure functions over one user's weekly returns.
//!
//! Inputs are percentage returns (5.0 means +5%) ordered by week id. Weeks
//! without a settled return are absent from the slice; they are never
//! zero-filled, so they neither dilute means nor break the compounding product.
//!
//! Two return conventions coexist on purpose:
//! - `compounded_return` is geometric: `(∏(1 + r/100) − 1) × 100`
//! - `annualized_return` is linear: `mean(r) × weeks_per_year`

use std::collections::HashMap;

use allocboard_core::{WeekId, WeeklyBalance};

/// Default annualization factor.
pub const WEEKS_PER_YEAR: u32 = 52;

// ─── Aggregators ────────────────────────────────────────────────────

/// Geometric compounding of percentage returns. `None` for no data, or when
/// the growth factor leaves the finite range.
///
/// A single return is passed through unchanged.
pub fn compounded_return(returns: &[f64]) -> Option<f64> {
    match returns {
        [] => None,
        [only] => only.is_finite().then_some(*only),
        _ => {
            let growth: f64 = returns.iter().map(|r| 1.0 + r / 100.0).product();
            growth.is_finite().then(|| (growth - 1.0) * 100.0)
        }
    }
}

/// Share of strictly positive weeks, in percent. `None` for no data.
///
/// Flat weeks (exactly 0) count toward the denominator only.
pub fn win_rate(returns: &[f64]) -> Option<f64> {
    if returns.is_empty() {
        return None;
    }
    let wins = returns.iter().filter(|&&r| r > 0.0).count();
    Some(wins as f64 / returns.len() as f64 * 100.0)
}

/// Linear annualization: `mean × 52`. `None` for no data.
pub fn annualized_return(returns: &[f64]) -> Option<f64> {
    annualized_return_with(returns, WEEKS_PER_YEAR)
}

pub fn annualized_return_with(returns: &[f64], weeks_per_year: u32) -> Option<f64> {
    mean(returns)
        .map(|m| m * weeks_per_year as f64)
        .filter(|a| a.is_finite())
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Length of the run at the end of the series: positive for consecutive
/// wins, negative for consecutive losses, 0 when the last week was flat or
/// there is no data.
pub fn current_streak(returns: &[f64]) -> i32 {
    let Some(&last) = returns.last() else {
        return 0;
    };
    if last == 0.0 {
        return 0;
    }
    let winning = last > 0.0;
    let run = returns
        .iter()
        .rev()
        .take_while(|&&r| if winning { r > 0.0 } else { r < 0.0 })
        .count() as i32;
    if winning {
        run
    } else {
        -run
    }
}

// ─── Series grouping ────────────────────────────────────────────────

/// One user's settled weeks, ordered by week id.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSeries<'a> {
    pub uid: &'a str,
    pub entries: Vec<&'a WeeklyBalance>,
}

impl ReturnSeries<'_> {
    /// Defined returns in week order.
    pub fn returns(&self) -> Vec<f64> {
        self.entries
            .iter()
            .filter_map(|b| b.result_return_pct)
            .collect()
    }

    pub fn weeks(&self) -> Vec<WeekId> {
        self.entries.iter().map(|b| b.week_id).collect()
    }

    pub fn latest(&self) -> Option<&WeeklyBalance> {
        self.entries.last().copied()
    }

    pub fn first(&self) -> Option<&WeeklyBalance> {
        self.entries.first().copied()
    }
}

/// Group weekly balances by user, keeping only records with a defined return
/// whose week passes `include`. Users appear in order of their first record,
/// so ties downstream keep fetch order.
pub fn group_by_user<'a>(
    balances: &'a [WeeklyBalance],
    include: impl Fn(WeekId) -> bool,
) -> Vec<ReturnSeries<'a>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut out: Vec<ReturnSeries<'a>> = Vec::new();

    for b in balances {
        if b.result_return_pct.is_none() || !include(b.week_id) {
            continue;
        }
        let slot = *index.entry(b.uid.as_str()).or_insert_with(|| {
            out.push(ReturnSeries {
                uid: b.uid.as_str(),
                entries: Vec::new(),
            });
            out.len() - 1
        });
        out[slot].entries.push(b);
    }

    for series in &mut out {
        series.entries.sort_by_key(|b| b.week_id);
    }
    out
}

// ─── Tests ───────────────────────────────────────────────────────────
