use super::{DocContext, DocumentNeed, MutationOp, Plan};
use crate::error::MutationError;
use connectors::store::{DocumentStore, FindOptions, WriteIntent};
use futures::TryStreamExt;
use model::{
    core::document::{Bson, Document, Namespace, doc, projection_for},
    records::outcome::SkipReason,
};
use std::collections::HashSet;
use tracing::info;

/// Canonical form of a field value, comparable across collections.
fn value_key(value: &Bson) -> String {
    value.clone().into_relaxed_extjson().to_string()
}

/// Distinct values of `field` present in the target collection.
#[derive(Debug, Default)]
pub struct ValueIndex {
    values: HashSet<String>,
}

impl ValueIndex {
    pub fn contains(&self, value: &Bson) -> bool {
        self.values.contains(&value_key(value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<Bson> for ValueIndex {
    fn from_iter<I: IntoIterator<Item = Bson>>(iter: I) -> Self {
        ValueIndex {
            values: iter.into_iter().map(|v| value_key(&v)).collect(),
        }
    }
}

pub async fn load_values(
    store: &dyn DocumentStore,
    target: &Namespace,
    field: &str,
) -> Result<ValueIndex, MutationError> {
    let stream = store
        .find(
            target,
            doc! { field: { "$exists": true } },
            FindOptions::projected(projection_for(&[field])),
        )
        .await?;
    let values: Vec<Document> = stream.try_collect().await?;
    let index: ValueIndex = values
        .into_iter()
        .filter_map(|mut d| d.remove(field))
        .collect();

    info!(target_ns = %target, field, distinct = index.len(), "Loaded duplicate index");
    Ok(index)
}

/// Flags source documents whose `field` value already exists in the target.
pub struct MarkDuplicatesOp {
    ns: Namespace,
    field: String,
    flag: String,
    index: ValueIndex,
}

impl MarkDuplicatesOp {
    pub fn new(ns: Namespace, field: String, flag: String, index: ValueIndex) -> Self {
        Self {
            ns,
            field,
            flag,
            index,
        }
    }
}

impl MutationOp for MarkDuplicatesOp {
    fn name(&self) -> &'static str {
        "mark_duplicates"
    }

    fn document_need(&self) -> DocumentNeed {
        DocumentNeed::Document {
            projection: Some(projection_for(&[self.field.as_str()])),
        }
    }

    fn lookup_namespace(&self) -> &Namespace {
        &self.ns
    }

    fn plan(&self, ctx: &DocContext<'_>) -> Result<Plan, MutationError> {
        let current = ctx.require_document()?;
        match current.get(&self.field) {
            Some(value) if self.index.contains(value) => {
                Ok(Plan::Write(vec![WriteIntent::Set {
                    ns: self.ns.clone(),
                    id: ctx.id.clone(),
                    fields: doc! { self.flag.as_str(): true },
                }]))
            }
            _ => Ok(Plan::Skip(SkipReason::NoMatch)),
        }
    }
}
