//! JSON fixture directories as a document store.
//!
//! Layout: one `{collection}.json` file per collection (e.g.
//! `weeklyBalances.json`), each either an array of objects carrying an `id`
//! field or an object mapping document id to fields. Missing files are empty
//! collections. An optional `indexes.json` declares composite indexes:
//!
//! ```json
//! [{"collection": "weeklyBalances", "fields": ["uid", "weekId"]}]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::document::{Collection, Document};
use super::memory::{CompositeIndex, MemoryStore};

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("fixture directory not found: {0}")]
    MissingDir(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}: {detail}")]
    Layout { path: PathBuf, detail: String },
}

impl MemoryStore {
    /// Load every collection file found in `dir`.
    pub fn from_json_dir(dir: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(FixtureError::MissingDir(dir.to_path_buf()));
        }

        let mut store = MemoryStore::new().named(dir.display().to_string());
        for collection in Collection::ALL {
            let path = dir.join(format!("{}.json", collection.name()));
            if !path.exists() {
                continue;
            }
            let docs = documents_from_value(&path, read_json(&path)?)?;
            debug!(collection = %collection, count = docs.len(), "loaded fixture collection");
            store = store.with_documents(collection, docs);
        }

        let index_path = dir.join("indexes.json");
        if index_path.exists() {
            let indexes: Vec<CompositeIndex> = serde_json::from_value(read_json(&index_path)?)
                .map_err(|source| FixtureError::Json {
                    path: index_path.clone(),
                    source,
                })?;
            for index in indexes {
                store.add_index(index);
            }
        }
        Ok(store)
    }

    /// Write every collection to `dir` in the array layout `from_json_dir` reads.
    pub fn write_json_dir(&self, dir: impl AsRef<Path>) -> Result<(), FixtureError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| FixtureError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        for collection in Collection::ALL {
            let docs = self.documents(collection);
            if docs.is_empty() {
                continue;
            }
            let rows: Vec<Value> = docs
                .iter()
                .map(|d| {
                    let mut map = d.data.clone();
                    map.insert("id".into(), Value::String(d.id.clone()));
                    Value::Object(map)
                })
                .collect();
            let path = dir.join(format!("{}.json", collection.name()));
            write_json(&path, &Value::Array(rows))?;
        }
        if !self.indexes().is_empty() {
            let path = dir.join("indexes.json");
            let value = serde_json::to_value(self.indexes()).map_err(|source| FixtureError::Json {
                path: path.clone(),
                source,
            })?;
            write_json(&path, &value)?;
        }
        Ok(())
    }
}

fn read_json(path: &Path) -> Result<Value, FixtureError> {
    let text = fs::read_to_string(path).map_err(|source| FixtureError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| FixtureError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json(path: &Path, value: &Value) -> Result<(), FixtureError> {
    let text = serde_json::to_string_pretty(value).map_err(|source| FixtureError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text).map_err(|source| FixtureError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn documents_from_value(path: &Path, value: Value) -> Result<Vec<Document>, FixtureError> {
    let layout = |detail: String| FixtureError::Layout {
        path: path.to_path_buf(),
        detail,
    };
    match value {
        Value::Array(rows) => rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let Value::Object(mut map) = row else {
                    return Err(layout(format!("entry {i} is not an object")));
                };
                let id = match map.remove("id") {
                    Some(Value::String(id)) if !id.is_empty() => id,
                    _ => return Err(layout(format!("entry {i} has no string 'id'"))),
                };
                Ok(Document::new(id, map))
            })
            .collect(),
        Value::Object(map) => map
            .into_iter()
            .map(|(id, fields)| match fields {
                Value::Object(fields) => Ok(Document::new(id, fields)),
                _ => Err(layout(format!("document '{id}' is not an object"))),
            })
            .collect(),
        _ => Err(layout("expected an array or an object".into())),
    }
}
