use bson::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a renamed field ends up in the rebuilt document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreserveOrder {
    #[default]
    KeepInPlace,
    MoveToEnd,
}

/// What to do when a rename target already exists in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    #[default]
    Overwrite,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    #[default]
    Copy,
    Move,
}

/// Behaviour when the transferred document already exists in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Insert only documents missing from the target.
    #[default]
    Skip,
    /// Replace (upsert) the target document.
    Replace,
}

fn default_duplicate_flag() -> String {
    "duplicated".to_string()
}

/// Per-document transformation applied by a run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MutationSpec {
    /// Sets the given fields to their defaults when absent.
    AddFields {
        fields: Document,
        #[serde(default)]
        overwrite: bool,
        #[serde(default)]
        timestamp_field: Option<String>,
    },
    RemoveFields {
        fields: Vec<String>,
    },
    RenameFields {
        fields: BTreeMap<String, String>,
        #[serde(default)]
        preserve_order: PreserveOrder,
        #[serde(default)]
        on_collision: CollisionPolicy,
    },
    /// Unconditionally sets fixed values.
    UpdateFields {
        set: Document,
        #[serde(default)]
        timestamp_field: Option<String>,
    },
    /// Copies fields from the source collection onto the matching target documents.
    CopyFields {
        fields: Vec<String>,
    },
    Transfer {
        #[serde(default)]
        mode: TransferMode,
        #[serde(default)]
        fields: Option<Vec<String>>,
        #[serde(default)]
        on_conflict: ConflictPolicy,
    },
    Delete,
    /// Flags source documents whose `field` value also appears in the target collection.
    MarkDuplicates {
        field: String,
        #[serde(default = "default_duplicate_flag")]
        flag: String,
    },
}

impl MutationSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            MutationSpec::AddFields { .. } => "add_fields",
            MutationSpec::RemoveFields { .. } => "remove_fields",
            MutationSpec::RenameFields { .. } => "rename_fields",
            MutationSpec::UpdateFields { .. } => "update_fields",
            MutationSpec::CopyFields { .. } => "copy_fields",
            MutationSpec::Transfer { .. } => "transfer",
            MutationSpec::Delete => "delete",
            MutationSpec::MarkDuplicates { .. } => "mark_duplicates",
        }
    }

    /// Whether the operation reads from or writes to a second collection.
    pub fn requires_target(&self) -> bool {
        matches!(
            self,
            MutationSpec::CopyFields { .. }
                | MutationSpec::Transfer { .. }
                | MutationSpec::MarkDuplicates { .. }
        )
    }

    /// Whether the operation deletes documents from the source collection.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            MutationSpec::Delete
                | MutationSpec::Transfer {
                    mode: TransferMode::Move,
                    ..
                }
        )
    }
}
