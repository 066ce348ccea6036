use super::{Selected, SelectionStream, Selector};
use crate::error::SelectError;
use async_trait::async_trait;
use futures::{StreamExt, stream};
use model::{
    core::identifiers::{DocId, IdFormat},
    execution::selection::InvalidIdPolicy,
    records::{batch::SelectedDoc, outcome::Rejection},
};
use std::{collections::HashSet, path::PathBuf};
use tracing::{info, warn};

/// Reads the working set from a newline-delimited identifier file.
///
/// Lines are trimmed and blank lines ignored. Repeated identifiers are
/// kept once, at their first position. Lines that do not parse as
/// `id_format` are rejected or abort the selection depending on `on_invalid`.
#[derive(Debug, Clone)]
pub struct IdListSelector {
    path: PathBuf,
    id_format: IdFormat,
    on_invalid: InvalidIdPolicy,
}

impl IdListSelector {
    pub fn new(path: PathBuf, id_format: IdFormat, on_invalid: InvalidIdPolicy) -> Self {
        Self {
            path,
            id_format,
            on_invalid,
        }
    }

    /// Parses the file content into the ordered selection.
    pub fn parse(&self, content: &str) -> Result<Vec<Selected>, SelectError> {
        let mut seen: HashSet<DocId> = HashSet::new();
        let mut selected = Vec::new();
        let mut duplicates = 0usize;

        for (index, raw) in content.lines().enumerate() {
            let line = index + 1;
            let value = raw.trim();
            if value.is_empty() {
                continue;
            }

            match DocId::parse(value, self.id_format) {
                Ok(id) => {
                    if seen.insert(id.clone()) {
                        selected.push(Selected::Doc(SelectedDoc::id(id)));
                    } else {
                        duplicates += 1;
                    }
                }
                Err(err) => match self.on_invalid {
                    InvalidIdPolicy::Abort => {
                        return Err(SelectError::InvalidIdentifier {
                            line,
                            value: value.to_string(),
                            reason: err.to_string(),
                        });
                    }
                    InvalidIdPolicy::Skip => {
                        warn!(line, value, "Skipping invalid identifier");
                        selected.push(Selected::Rejected(Rejection {
                            line: Some(line),
                            value: value.to_string(),
                            reason: err.to_string(),
                        }));
                    }
                },
            }
        }

        if duplicates > 0 {
            info!(duplicates, "Dropped repeated identifiers from id list");
        }
        Ok(selected)
    }
}

#[async_trait]
impl Selector for IdListSelector {
    fn describe(&self) -> String {
        format!("id list {} ({})", self.path.display(), self.id_format)
    }

    async fn select(&self) -> Result<SelectionStream, SelectError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SelectError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        let selected = self.parse(&content)?;
        info!(
            path = %self.path.display(),
            entries = selected.len(),
            "Loaded id list"
        );
        Ok(stream::iter(selected.into_iter().map(Ok)).boxed())
    }
}
