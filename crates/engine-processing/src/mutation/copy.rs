use super::{DocContext, DocumentNeed, MutationOp, Plan};
use crate::error::MutationError;
use connectors::store::WriteIntent;
use model::{
    core::document::{Document, Namespace, projection_for},
    records::outcome::SkipReason,
};

/// Copies fields from a source document onto the document with the same
/// `_id` in the target collection.
pub struct CopyFieldsOp {
    source: Namespace,
    target: Namespace,
    fields: Vec<String>,
}

impl CopyFieldsOp {
    pub fn new(source: Namespace, target: Namespace, fields: Vec<String>) -> Self {
        Self {
            source,
            target,
            fields,
        }
    }
}

impl MutationOp for CopyFieldsOp {
    fn name(&self) -> &'static str {
        "copy_fields"
    }

    fn document_need(&self) -> DocumentNeed {
        DocumentNeed::Document {
            projection: Some(projection_for(&self.fields)),
        }
    }

    fn lookup_namespace(&self) -> &Namespace {
        &self.source
    }

    fn plan(&self, ctx: &DocContext<'_>) -> Result<Plan, MutationError> {
        let current = ctx.require_document()?;

        let mut set = Document::new();
        for field in &self.fields {
            if let Some(value) = current.get(field) {
                set.insert(field.as_str(), value.clone());
            }
        }
        if set.is_empty() {
            return Ok(Plan::Skip(SkipReason::SourceFieldMissing));
        }

        Ok(Plan::Write(vec![WriteIntent::Set {
            ns: self.target.clone(),
            id: ctx.id.clone(),
            fields: set,
        }]))
    }
}
