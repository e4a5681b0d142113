//! Tabular batch input for the importer.
//!
//! A batch is one file's worth of rows. Column names are plain strings and
//! values are loosely typed; normalization happens in the importer.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CuratorError, CuratorResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Number(f64),
    Text(String),
    List(Vec<String>),
    Timestamp(DateTime<Utc>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(n) => n.is_nan(),
            _ => false,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<DateTime<Utc>> for CellValue {
    fn from(ts: DateTime<Utc>) -> Self {
        CellValue::Timestamp(ts)
    }
}

impl From<Vec<String>> for CellValue {
    fn from(list: Vec<String>) -> Self {
        CellValue::List(list)
    }
}

pub type Row = BTreeMap<String, CellValue>;

/// Builds a row from `(column, value)` pairs.
pub fn row<I, K, V>(cells: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<CellValue>,
{
    cells
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Batch {
    /// File key or any label identifying where the rows came from
    pub name: String,
    pub rows: Vec<Row>,
}

impl Batch {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Union of column names across all rows, lowercased. Null-only cells still count.
    pub fn columns(&self) -> BTreeSet<String> {
        self.rows
            .iter()
            .flat_map(|r| r.keys())
            .map(|k| k.trim().to_lowercase())
            .collect()
    }
}

/// Lists and reads batches from wherever the files live.
#[async_trait]
pub trait BatchSource: Send + Sync {
    fn name(&self) -> &str;

    /// Keys under `prefix`, in the order they should be imported.
    async fn list(&self, prefix: &str) -> CuratorResult<Vec<String>>;

    async fn read(&self, key: &str) -> CuratorResult<Batch>;
}

/// Reads `*.json` files holding an array of row objects from one directory.
#[derive(Clone, Debug)]
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl BatchSource for JsonDirSource {
    fn name(&self) -> &str {
        "json_dir"
    }

    async fn list(&self, prefix: &str) -> CuratorResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            CuratorError::Configuration(format!("cannot list {}: {}", self.dir.display(), e))
        })?;

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            CuratorError::Configuration(format!("cannot list {}: {}", self.dir.display(), e))
        })? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(prefix) && name.ends_with(".json") {
                keys.push(name);
            }
        }
        keys.sort();
        debug!("[IMPORT] {} batch files under {}", keys.len(), self.dir.display());
        Ok(keys)
    }

    async fn read(&self, key: &str) -> CuratorResult<Batch> {
        let path = self.dir.join(key);
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            CuratorError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        let rows: Vec<Row> = serde_json::from_str(text)
            .map_err(|e| CuratorError::Validation(format!("{} is not a row array: {}", key, e)))?;
        Ok(Batch::new(key, rows))
    }
}
