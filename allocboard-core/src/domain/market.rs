//! Market snapshot schema.
//!
//! Stored market documents used to mix metadata keys (`window`, `fetchedAt`,
//! `source`) with arbitrary ticker codes at the top level. `MarketSnapshot`
//! separates them: a fixed `meta` block plus an `instruments` map. Legacy
//! documents are converted once, at the ingestion boundary, and every quote is
//! validated there.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::decode::{finite_f64, parse_timestamp};

/// Top-level keys of a legacy document that are metadata, not tickers.
pub const RESERVED_KEYS: [&str; 4] = ["window", "fetchedAt", "source", "updatedAt"];

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("market document is not a JSON object")]
    NotAnObject,

    #[error("invalid quote for '{code}': {detail}")]
    InvalidQuote { code: String, detail: String },

    #[error("invalid metadata field '{field}': {detail}")]
    InvalidMeta { field: &'static str, detail: String },

    #[error("market snapshot has no instruments")]
    Empty,

    #[error("market JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketMeta {
    /// Pricing window label, e.g. a week id or `"1w"`.
    pub window: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub open: f64,
    pub close: f64,
    pub return_pct: f64,
}

impl Quote {
    /// Quote with the return derived from open and close.
    pub fn from_prices(open: f64, close: f64) -> Self {
        Self {
            open,
            close,
            return_pct: (close / open - 1.0) * 100.0,
        }
    }

    fn validate(&self, code: &str) -> Result<(), MarketDataError> {
        let bad = |detail: &str| MarketDataError::InvalidQuote {
            code: code.to_string(),
            detail: detail.to_string(),
        };
        if !(self.open.is_finite() && self.open > 0.0) {
            return Err(bad("open must be a positive number"));
        }
        if !(self.close.is_finite() && self.close > 0.0) {
            return Err(bad("close must be a positive number"));
        }
        if !self.return_pct.is_finite() {
            return Err(bad("returnPct must be finite"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub meta: MarketMeta,
    pub instruments: BTreeMap<String, Quote>,
}

impl MarketSnapshot {
    /// Parse a document in either layout. Objects with an `instruments` map are
    /// taken as the structured form; anything else is treated as legacy.
    pub fn from_json_str(s: &str) -> Result<Self, MarketDataError> {
        let value: Value = serde_json::from_str(s)?;
        let Value::Object(map) = value else {
            return Err(MarketDataError::NotAnObject);
        };
        if map.get("instruments").is_some_and(Value::is_object) {
            let snapshot: MarketSnapshot = serde_json::from_value(Value::Object(map))?;
            snapshot.validate()?;
            Ok(snapshot)
        } else {
            Self::from_legacy_document(&map)
        }
    }

    /// Convert a legacy flat document. Reserved keys go to `meta`; every other
    /// key must be a quote object with positive `open`/`close`. A missing
    /// `returnPct` is derived from the prices.
    pub fn from_legacy_document(doc: &Map<String, Value>) -> Result<Self, MarketDataError> {
        let meta = MarketMeta {
            window: meta_string(doc, "window")?,
            fetched_at: match doc.get("fetchedAt") {
                None | Some(Value::Null) => None,
                Some(v) => Some(parse_timestamp(v).ok_or_else(|| MarketDataError::InvalidMeta {
                    field: "fetchedAt",
                    detail: format!("unrecognised timestamp {v}"),
                })?),
            },
            source: meta_string(doc, "source")?,
        };

        let mut instruments = BTreeMap::new();
        for (code, value) in doc {
            if RESERVED_KEYS.contains(&code.as_str()) {
                continue;
            }
            let quote = legacy_quote(code, value)?;
            instruments.insert(code.clone(), quote);
        }

        let snapshot = Self { meta, instruments };
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn validate(&self) -> Result<(), MarketDataError> {
        if self.instruments.is_empty() {
            return Err(MarketDataError::Empty);
        }
        for (code, quote) in &self.instruments {
            quote.validate(code)?;
        }
        Ok(())
    }

    pub fn quote(&self, code: &str) -> Option<&Quote> {
        self.instruments.get(code)
    }

    /// Instruments ordered by return, best first.
    pub fn ranked(&self) -> Vec<(&str, &Quote)> {
        let mut rows: Vec<(&str, &Quote)> =
            self.instruments.iter().map(|(c, q)| (c.as_str(), q)).collect();
        rows.sort_by(|a, b| b.1.return_pct.total_cmp(&a.1.return_pct));
        rows
    }
}

fn meta_string(doc: &Map<String, Value>, field: &'static str) -> Result<Option<String>, MarketDataError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(MarketDataError::InvalidMeta {
            field,
            detail: format!("expected a string, got {other}"),
        }),
    }
}

fn legacy_quote(code: &str, value: &Value) -> Result<Quote, MarketDataError> {
    let obj = value.as_object().ok_or_else(|| MarketDataError::InvalidQuote {
        code: code.to_string(),
        detail: format!("expected an object, got {value}"),
    })?;
    let field = |name: &str| {
        finite_f64(obj.get(name)).ok_or_else(|| MarketDataError::InvalidQuote {
            code: code.to_string(),
            detail: format!("missing or non-numeric '{name}'"),
        })
    };
    let open = field("open")?;
    let close = field("close")?;
    let quote = match finite_f64(obj.get("returnPct")) {
        Some(return_pct) => Quote {
            open,
            close,
            return_pct,
        },
        None => Quote::from_prices(open, close),
    };
    quote.validate(code)?;
    Ok(quote)
}
