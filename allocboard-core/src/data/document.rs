//! Schema-agnostic documents and the query shape used against the store.
//!
//! Records arrive as loosely-typed JSON maps keyed by document id. Typed
//! decoding happens in `domain`; this module only knows about fields, filters
//! and ordering.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::WeekId;

/// Source collections consumed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Weeks,
    Allocations,
    WeeklyBalances,
    Balances,
    Users,
    Instruments,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Weeks,
        Collection::Allocations,
        Collection::WeeklyBalances,
        Collection::Balances,
        Collection::Users,
        Collection::Instruments,
    ];

    /// Store-side collection name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Weeks => "weeks",
            Self::Allocations => "allocations",
            Self::WeeklyBalances => "weeklyBalances",
            Self::Balances => "balances",
            Self::Users => "users",
            Self::Instruments => "instruments",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Collections whose documents are keyed `${weekId}_${uid}`.
    pub fn is_weekly_keyed(&self) -> bool {
        matches!(self, Self::Allocations | Self::WeeklyBalances)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stored document: its key plus a free-form field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Build from a JSON object value. Non-object values yield an empty field map.
    pub fn from_value(id: impl Into<String>, value: Value) -> Self {
        let data = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(id, data)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }
}

/// A single equality or membership predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Eq(f, _) | Self::In(f, _) => f,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Eq(field, expected) => doc.get(field).is_some_and(|v| values_equal(v, expected)),
            Self::In(field, expected) => doc
                .get(field)
                .is_some_and(|v| expected.iter().any(|e| values_equal(v, e))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Descending,
        }
    }

    /// Compare two documents by this ordering. Documents missing the field sort first
    /// (ascending), matching how the store treats absent values.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let ord = compare_optional(a.get(&self.field), b.get(&self.field));
        match self.direction {
            Direction::Ascending => ord,
            Direction::Descending => ord.reverse(),
        }
    }
}

/// Candidate keys for tier-4 reconstruction of `${weekId}_${uid}` lookups.
///
/// When `week_ids` is empty the fetcher derives candidates from the current week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyHint {
    pub uid: String,
    pub week_ids: Vec<WeekId>,
}

/// A read against one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub collection: Collection,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
    pub key_hint: Option<KeyHint>,
}

impl Query {
    pub fn collection(collection: Collection) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order: None,
            limit: None,
            key_hint: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn key_hint(mut self, hint: KeyHint) -> Self {
        self.key_hint = Some(hint);
        self
    }

    /// Same query without ordering or limit.
    pub fn without_order(&self) -> Self {
        Self {
            order: None,
            limit: None,
            ..self.clone()
        }
    }

    /// Collection-only read.
    pub fn unfiltered(&self) -> Self {
        Self::collection(self.collection)
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Apply filters, ordering and limit in memory. Sorting is stable, so
    /// documents that compare equal keep their input order.
    pub fn apply_in_memory(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut out: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();
        self.sort_and_limit(&mut out);
        out
    }

    /// Apply ordering and limit only (filters already applied by the store).
    pub fn sort_and_limit(&self, docs: &mut Vec<Document>) {
        if let Some(order) = &self.order {
            docs.sort_by(|a, b| order.compare(a, b));
        }
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.collection)?;
        for filter in &self.filters {
            match filter {
                Filter::Eq(field, v) => write!(f, " where {field} == {v}")?,
                Filter::In(field, vs) => write!(f, " where {field} in [{} values]", vs.len())?,
            }
        }
        if let Some(order) = &self.order {
            write!(f, " order by {} {:?}", order.field, order.direction)?;
        }
        if let Some(limit) = self.limit {
            write!(f, " limit {limit}")?;
        }
        Ok(())
    }
}

// ─── Value comparison ───────────────────────────────────────────────

/// Equality that treats `1` and `1.0` as the same number.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_optional(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare_values(x, y),
    }
}

/// Total order over JSON values as the store sorts them:
/// null < bool < number < timestamp < string < everything else.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Object(_), Value::Object(_)) => timestamp_parts(a).cmp(&timestamp_parts(b)),
        _ => Ordering::Equal,
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::Object(_) if timestamp_parts(v).is_some() => 3,
        Value::String(_) => 4,
        _ => 5,
    }
}

/// `{seconds, nanoseconds}` timestamp objects as written by the store.
pub(crate) fn timestamp_parts(v: &Value) -> Option<(i64, i64)> {
    let obj = v.as_object()?;
    let seconds = obj
        .get("seconds")
        .or_else(|| obj.get("_seconds"))?
        .as_i64()?;
    let nanos = obj
        .get("nanoseconds")
        .or_else(|| obj.get("_nanoseconds"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    Some((seconds, nanos))
}
