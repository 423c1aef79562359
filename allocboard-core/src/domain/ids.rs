use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing an ISO week id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid ISO week id '{0}' (expected YYYY-Www)")]
pub struct WeekIdError(pub String);

/// ISO week id, e.g. `2025-W40`.
///
/// Ordering is chronological: by ISO year, then week number. Serialized as the
/// canonical `YYYY-Www` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WeekId {
    year: i32,
    week: u32,
}

impl WeekId {
    /// Build from ISO year and week number. Rejects weeks the calendar does not have.
    pub fn new(year: i32, week: u32) -> Result<Self, WeekIdError> {
        if NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).is_none() {
            return Err(WeekIdError(format!("{year}-W{week:02}")));
        }
        Ok(Self { year, week })
    }

    /// Build at compile time. Weeks outside 1..=52 are clamped into that range,
    /// which every ISO year has, so the result is always a real week.
    pub const fn clamped(year: i32, week: u32) -> Self {
        let week = if week < 1 {
            1
        } else if week > 52 {
            52
        } else {
            week
        };
        Self { year, week }
    }

    /// The ISO week containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn week(&self) -> u32 {
        self.week
    }

    /// Monday of this week.
    pub fn monday(&self) -> NaiveDate {
        // Validated on construction, so the lookup cannot miss.
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon).unwrap_or(NaiveDate::MIN)
    }

    /// The week immediately before this one (crosses ISO year boundaries).
    pub fn previous(&self) -> Self {
        Self::from_date(self.monday() - Duration::days(7))
    }

    /// `count` week ids counting back from this one, this week first.
    pub fn trailing(&self, count: usize) -> Vec<Self> {
        let mut out = Vec::with_capacity(count);
        let mut current = *self;
        for _ in 0..count {
            out.push(current);
            current = current.previous();
        }
        out
    }
}

impl fmt::Display for WeekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

impl FromStr for WeekId {
    type Err = WeekIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || WeekIdError(s.to_string());
        let (year, week) = s.trim().split_once("-W").ok_or_else(bad)?;
        if year.len() != 4 || week.len() != 2 {
            return Err(bad());
        }
        let year: i32 = year.parse().map_err(|_| bad())?;
        let week: u32 = week.parse().map_err(|_| bad())?;
        Self::new(year, week).map_err(|_| bad())
    }
}

impl TryFrom<String> for WeekId {
    type Error = WeekIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WeekId> for String {
    fn from(id: WeekId) -> Self {
        id.to_string()
    }
}

/// Document key for per-user, per-week records: `${weekId}_${uid}`.
pub fn weekly_key(week: &WeekId, uid: &str) -> String {
    format!("{week}_{uid}")
}

/// Split a `${weekId}_${uid}` key. Week ids never contain `_`, so the first
/// underscore is the separator and the uid may contain further underscores.
pub fn split_weekly_key(key: &str) -> Option<(WeekId, String)> {
    let (week, uid) = key.split_once('_')?;
    if uid.is_empty() {
        return None;
    }
    Some((week.parse().ok()?, uid.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wk(s: &str) -> WeekId {
        s.parse().unwrap()
    }

    #[test]
    fn parses_and_displays() {
        let id = wk("2025-W40");
        assert_eq!(id.year(), 2025);
        assert_eq!(id.week(), 40);
        assert_eq!(id.to_string(), "2025-W40");
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!("2025-40".parse::<WeekId>().is_err());
        assert!("2025-W4".parse::<WeekId>().is_err());
        assert!("25-W40".parse::<WeekId>().is_err());
        assert!("2025-W00".parse::<WeekId>().is_err());
        // 2025 has 52 ISO weeks, 2026 has 53
        assert!("2025-W53".parse::<WeekId>().is_err());
        assert!("2026-W53".parse::<WeekId>().is_ok());
    }

    #[test]
    fn orders_chronologically() {
        let mut ids = vec![wk("2025-W02"), wk("2024-W52"), wk("2025-W10"), wk("2025-W01")];
        ids.sort();
        let shown: Vec<String> = ids.iter().map(|w| w.to_string()).collect();
        assert_eq!(shown, vec!["2024-W52", "2025-W01", "2025-W02", "2025-W10"]);
    }

    #[test]
    fn clamped_weeks_are_real_weeks() {
        assert_eq!(WeekId::clamped(2025, 40), WeekId::new(2025, 40).unwrap());
        assert_eq!(WeekId::clamped(2025, 0).to_string(), "2025-W01");
        assert_eq!(WeekId::clamped(2025, 60).to_string(), "2025-W52");
    }

    #[test]
    fn previous_crosses_year_boundary() {
        assert_eq!(wk("2025-W01").previous(), wk("2024-W52"));
        assert_eq!(wk("2021-W01").previous(), wk("2020-W53"));
        assert_eq!(wk("2025-W40").previous(), wk("2025-W39"));
    }

    #[test]
    fn trailing_starts_with_self() {
        let ids = wk("2025-W02").trailing(3);
        assert_eq!(ids, vec![wk("2025-W02"), wk("2025-W01"), wk("2024-W52")]);
        assert!(wk("2025-W02").trailing(0).is_empty());
    }

    #[test]
    fn from_date_uses_iso_calendar() {
        // 2024-12-30 is a Monday belonging to ISO week 2025-W01
        let d = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap();
        assert_eq!(WeekId::from_date(d), wk("2025-W01"));
    }

    #[test]
    fn serde_uses_string_form() {
        let json = serde_json::to_string(&wk("2025-W40")).unwrap();
        assert_eq!(json, "\"2025-W40\"");
        let back: WeekId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wk("2025-W40"));
        assert!(serde_json::from_str::<WeekId>("\"bogus\"").is_err());
    }

    #[test]
    fn weekly_key_roundtrip_with_underscored_uid() {
        let key = weekly_key(&wk("2025-W40"), "user_42");
        assert_eq!(key, "2025-W40_user_42");
        let (week, uid) = split_weekly_key(&key).unwrap();
        assert_eq!(week, wk("2025-W40"));
        assert_eq!(uid, "user_42");
        assert!(split_weekly_key("2025-W40_").is_none());
        assert!(split_weekly_key("nounderscore").is_none());
    }
}
