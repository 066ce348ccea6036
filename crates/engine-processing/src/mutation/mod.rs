//! Per-document operations.
//!
//! An operation never talks to the store itself: given the identifier and
//! (when it asked for one) the current document, it returns a [`Plan`], an
//! ordered list of write intents or a reason to leave the document alone.
//! The batch processor executes the plan under retry.

use crate::error::MutationError;
use chrono::{DateTime, Utc};
use connectors::store::WriteIntent;
use engine_core::connection::ConnectionManager;
use model::{
    core::{
        document::{Document, Namespace},
        identifiers::DocId,
    },
    execution::mutation::MutationSpec,
    records::outcome::SkipReason,
};
use std::sync::Arc;

pub mod copy;
pub mod duplicates;
pub mod fields;
pub mod rename;
pub mod transfer;

use copy::CopyFieldsOp;
use duplicates::MarkDuplicatesOp;
use fields::{AddFieldsOp, RemoveFieldsOp, UpdateFieldsOp};
use rename::RenameFieldsOp;
use transfer::{DeleteOp, TransferOp};

/// What an operation needs to know about a document before planning.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentNeed {
    /// The identifier is enough.
    IdOnly,
    /// The current document, reduced to `projection` (`None` = whole document).
    Document { projection: Option<Document> },
}

#[derive(Debug, Clone)]
pub struct DocContext<'a> {
    pub id: &'a DocId,
    pub document: Option<&'a Document>,
    /// Run clock, used for timestamp fields.
    pub now: DateTime<Utc>,
}

impl<'a> DocContext<'a> {
    pub fn new(id: &'a DocId, document: Option<&'a Document>) -> Self {
        Self {
            id,
            document,
            now: Utc::now(),
        }
    }

    /// The document, or an error when the operation did not ask for one.
    pub fn require_document(&self) -> Result<&'a Document, MutationError> {
        self.document
            .ok_or_else(|| MutationError::Invalid(format!("document {} was not loaded", self.id)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Write(Vec<WriteIntent>),
    Skip(SkipReason),
}

pub trait MutationOp: Send + Sync {
    fn name(&self) -> &'static str;

    fn document_need(&self) -> DocumentNeed;

    /// Collection the document is read from when it has to be looked up.
    fn lookup_namespace(&self) -> &Namespace;

    fn plan(&self, ctx: &DocContext<'_>) -> Result<Plan, MutationError>;
}

fn require_target<'a>(
    spec: &MutationSpec,
    target: Option<&'a Namespace>,
) -> Result<&'a Namespace, MutationError> {
    target.ok_or_else(|| MutationError::Invalid(format!("{} requires a target", spec.kind())))
}

/// Turns a validated spec into its operation. Operations that depend on
/// data outside the selection (duplicate marking) load it here.
pub async fn build_mutation(
    spec: &MutationSpec,
    source: &Namespace,
    target: Option<&Namespace>,
    connections: &ConnectionManager,
) -> Result<Arc<dyn MutationOp>, MutationError> {
    let op: Arc<dyn MutationOp> = match spec {
        MutationSpec::AddFields {
            fields,
            overwrite,
            timestamp_field,
        } => Arc::new(AddFieldsOp::new(
            source.clone(),
            fields.clone(),
            *overwrite,
            timestamp_field.clone(),
        )),
        MutationSpec::RemoveFields { fields } => {
            Arc::new(RemoveFieldsOp::new(source.clone(), fields.clone()))
        }
        MutationSpec::RenameFields {
            fields,
            preserve_order,
            on_collision,
        } => Arc::new(RenameFieldsOp::new(
            source.clone(),
            fields.clone(),
            *preserve_order,
            *on_collision,
        )),
        MutationSpec::UpdateFields {
            set,
            timestamp_field,
        } => Arc::new(UpdateFieldsOp::new(
            source.clone(),
            set.clone(),
            timestamp_field.clone(),
        )),
        MutationSpec::CopyFields { fields } => Arc::new(CopyFieldsOp::new(
            source.clone(),
            require_target(spec, target)?.clone(),
            fields.clone(),
        )),
        MutationSpec::Transfer {
            mode,
            fields,
            on_conflict,
        } => Arc::new(TransferOp::new(
            source.clone(),
            require_target(spec, target)?.clone(),
            *mode,
            fields.clone(),
            *on_conflict,
        )),
        MutationSpec::Delete => Arc::new(DeleteOp::new(source.clone())),
        MutationSpec::MarkDuplicates { field, flag } => {
            let target = require_target(spec, target)?;
            let session = connections.acquire().await?;
            let index = duplicates::load_values(&*session, target, field).await?;
            Arc::new(MarkDuplicatesOp::new(
                source.clone(),
                field.clone(),
                flag.clone(),
                index,
            ))
        }
    };
    Ok(op)
}
