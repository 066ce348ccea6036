use super::{DocContext, DocumentNeed, MutationOp, Plan};
use crate::error::MutationError;
use connectors::store::WriteIntent;
use model::{
    core::document::{Namespace, projection_for, retain_fields},
    execution::mutation::{ConflictPolicy, TransferMode},
};

/// Copies or moves whole documents (or a field subset) into the target
/// collection. In move mode the source is deleted only after the target
/// write was applied.
pub struct TransferOp {
    source: Namespace,
    target: Namespace,
    mode: TransferMode,
    fields: Option<Vec<String>>,
    on_conflict: ConflictPolicy,
}

impl TransferOp {
    pub fn new(
        source: Namespace,
        target: Namespace,
        mode: TransferMode,
        fields: Option<Vec<String>>,
        on_conflict: ConflictPolicy,
    ) -> Self {
        Self {
            source,
            target,
            mode,
            fields,
            on_conflict,
        }
    }
}

impl MutationOp for TransferOp {
    fn name(&self) -> &'static str {
        match self.mode {
            TransferMode::Copy => "copy",
            TransferMode::Move => "move",
        }
    }

    fn document_need(&self) -> DocumentNeed {
        DocumentNeed::Document {
            projection: self.fields.as_deref().map(projection_for),
        }
    }

    fn lookup_namespace(&self) -> &Namespace {
        &self.source
    }

    fn plan(&self, ctx: &DocContext<'_>) -> Result<Plan, MutationError> {
        let current = ctx.require_document()?;
        let document = match &self.fields {
            Some(fields) => retain_fields(current, fields),
            None => current.clone(),
        };

        let mut intents = Vec::with_capacity(2);
        intents.push(match self.on_conflict {
            ConflictPolicy::Skip => WriteIntent::Insert {
                ns: self.target.clone(),
                document,
            },
            ConflictPolicy::Replace => WriteIntent::Replace {
                ns: self.target.clone(),
                id: ctx.id.clone(),
                document,
                upsert: true,
            },
        });
        if self.mode == TransferMode::Move {
            intents.push(WriteIntent::Delete {
                ns: self.source.clone(),
                id: ctx.id.clone(),
            });
        }
        Ok(Plan::Write(intents))
    }
}

/// Deletes the selected documents.
pub struct DeleteOp {
    ns: Namespace,
}

impl DeleteOp {
    pub fn new(ns: Namespace) -> Self {
        Self { ns }
    }
}

impl MutationOp for DeleteOp {
    fn name(&self) -> &'static str {
        "delete"
    }

    fn document_need(&self) -> DocumentNeed {
        DocumentNeed::IdOnly
    }

    fn lookup_namespace(&self) -> &Namespace {
        &self.ns
    }

    fn plan(&self, ctx: &DocContext<'_>) -> Result<Plan, MutationError> {
        Ok(Plan::Write(vec![WriteIntent::Delete {
            ns: self.ns.clone(),
            id: ctx.id.clone(),
        }]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::{document::doc, identifiers::DocId};

    fn source() -> Namespace {
        Namespace::new("shop", "orders")
    }

    fn target() -> Namespace {
        Namespace::new("shop", "orders_archive")
    }

    #[test]
    fn test_move_inserts_then_deletes() {
        let op = TransferOp::new(source(), target(), TransferMode::Move, None, ConflictPolicy::Skip);
        let id = DocId::Int(1);
        let current = doc! { "_id": 1, "total": 10 };

        assert_eq!(op.name(), "move");
        assert_eq!(
            op.plan(&DocContext::new(&id, Some(&current))).unwrap(),
            Plan::Write(vec![
                WriteIntent::Insert {
                    ns: target(),
                    document: current.clone(),
                },
                WriteIntent::Delete {
                    ns: source(),
                    id: id.clone(),
                },
            ])
        );
    }

    #[test]
    fn test_copy_with_fields_and_replace() {
        let op = TransferOp::new(
            source(),
            target(),
            TransferMode::Copy,
            Some(vec!["total".into()]),
            ConflictPolicy::Replace,
        );
        assert_eq!(
            op.document_need(),
            DocumentNeed::Document {
                projection: Some(doc! { "_id": 1, "total": 1 })
            }
        );

        let id = DocId::Int(1);
        let current = doc! { "_id": 1, "total": 10, "notes": "x" };
        assert_eq!(
            op.plan(&DocContext::new(&id, Some(&current))).unwrap(),
            Plan::Write(vec![WriteIntent::Replace {
                ns: target(),
                id: id.clone(),
                document: doc! { "_id": 1, "total": 10 },
                upsert: true,
            }])
        );
    }

    #[test]
    fn test_delete_needs_only_id() {
        let op = DeleteOp::new(source());
        assert_eq!(op.document_need(), DocumentNeed::IdOnly);
        let id = DocId::String("abc".into());
        assert_eq!(
            op.plan(&DocContext::new(&id, None)).unwrap(),
            Plan::Write(vec![WriteIntent::Delete { ns: source(), id: id.clone() }])
        );
    }
}
