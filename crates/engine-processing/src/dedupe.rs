//! Offline duplicate analysis over a JSON export of a collection.

use crate::error::DedupeError;
use serde_json::Value;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

pub const DUPLICATES_FILE: &str = "duplicates.json";
pub const DELETE_IDS_FILE: &str = "duplicated_ids_to_delete.txt";
pub const STATS_FILE: &str = "stats.txt";

const TOP_VALUES: usize = 10;

/// Documents sharing one value of the analysed field, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueGroup {
    pub value: String,
    pub ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DuplicateAnalysis {
    pub field: String,
    pub total_documents: usize,
    /// Every distinct value, in order of first appearance.
    pub groups: Vec<ValueGroup>,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> DedupeError + '_ {
    move |source| DedupeError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Reads a JSON array of documents (a `mongoexport --jsonArray` dump).
pub fn load_documents(path: &Path) -> Result<Vec<Value>, DedupeError> {
    let raw = fs::read_to_string(path).map_err(io_error(path))?;
    match serde_json::from_str(&raw)? {
        Value::Array(docs) => {
            info!(path = %path.display(), documents = docs.len(), "Loaded document dump");
            Ok(docs)
        }
        _ => Err(DedupeError::NotAnArray),
    }
}

/// Text form of a field value used as grouping key.
fn value_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Text form of an identifier; extended JSON ObjectIds become their hex string.
fn id_text(value: &Value) -> String {
    match value {
        Value::Object(map) => match map.get("$oid") {
            Some(Value::String(oid)) => oid.clone(),
            _ => value.to_string(),
        },
        other => value_key(other),
    }
}

pub fn analyze(documents: &[Value], field: &str) -> DuplicateAnalysis {
    let mut groups: Vec<ValueGroup> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (index, doc) in documents.iter().enumerate() {
        let value = match doc.get(field) {
            None | Some(Value::Null) => continue,
            Some(value) => value_key(value),
        };
        let Some(id) = doc.get("_id") else {
            warn!(index, "Document without _id ignored");
            continue;
        };

        let position = *positions.entry(value.clone()).or_insert_with(|| {
            groups.push(ValueGroup {
                value,
                ids: Vec::new(),
            });
            groups.len() - 1
        });
        groups[position].ids.push(id_text(id));
    }

    let analysis = DuplicateAnalysis {
        field: field.to_string(),
        total_documents: documents.len(),
        groups,
    };
    info!(
        field,
        groups = analysis.duplicates().count(),
        "Duplicate analysis done"
    );
    analysis
}

impl DuplicateAnalysis {
    pub fn unique_values(&self) -> usize {
        self.groups.len()
    }

    pub fn duplicates(&self) -> impl Iterator<Item = &ValueGroup> {
        self.groups.iter().filter(|g| g.ids.len() > 1)
    }

    /// Every id of a duplicate group except the first one.
    pub fn ids_to_delete(&self) -> Vec<&str> {
        self.duplicates()
            .flat_map(|g| g.ids.iter().skip(1).map(String::as_str))
            .collect()
    }

    /// Most duplicated values, ties kept in order of first appearance.
    pub fn most_duplicated(&self, n: usize) -> Vec<(&str, usize)> {
        let mut top: Vec<(&str, usize)> = self
            .duplicates()
            .map(|g| (g.value.as_str(), g.ids.len()))
            .collect();
        top.sort_by(|a, b| b.1.cmp(&a.1));
        top.truncate(n);
        top
    }

    pub fn stats(&self) -> String {
        let duplicated_ids: usize = self.duplicates().map(|g| g.ids.len()).sum();
        let mut out = format!(
            "Total documents: {}\nUnique {field} values: {}\nDuplicated {field} entries: {}\n\
             Total duplicated IDs: {}\nTotal IDs to delete: {}\nTop {TOP_VALUES} most duplicated values:\n",
            self.total_documents,
            self.unique_values(),
            self.duplicates().count(),
            duplicated_ids,
            self.ids_to_delete().len(),
            field = self.field,
        );
        for (value, count) in self.most_duplicated(TOP_VALUES) {
            out.push_str(&format!("  {value} ({count} times)\n"));
        }
        out
    }

    /// Writes the three analysis files into `dir` and returns their paths.
    pub fn write_outputs(&self, dir: &Path) -> Result<Vec<PathBuf>, DedupeError> {
        fs::create_dir_all(dir).map_err(io_error(dir))?;

        let groups: serde_json::Map<String, Value> = self
            .duplicates()
            .map(|g| {
                let ids = g.ids.iter().cloned().map(Value::String).collect();
                (g.value.clone(), Value::Array(ids))
            })
            .collect();
        let duplicates_path = dir.join(DUPLICATES_FILE);
        let json = serde_json::to_string_pretty(&groups).map_err(DedupeError::Serialization)?;
        fs::write(&duplicates_path, json).map_err(io_error(&duplicates_path))?;

        let delete_path = dir.join(DELETE_IDS_FILE);
        let mut delete = String::new();
        for id in self.ids_to_delete() {
            delete.push_str(id);
            delete.push('\n');
        }
        fs::write(&delete_path, delete).map_err(io_error(&delete_path))?;

        let stats_path = dir.join(STATS_FILE);
        fs::write(&stats_path, self.stats()).map_err(io_error(&stats_path))?;

        info!(dir = %dir.display(), "Duplicate reports written");
        Ok(vec![duplicates_path, delete_path, stats_path])
    }
}
