use super::{DocContext, DocumentNeed, MutationOp, Plan};
use crate::error::MutationError;
use chrono::{DateTime, Utc};
use connectors::store::WriteIntent;
use model::{
    core::document::{Bson, Document, Namespace, projection_for},
    records::outcome::SkipReason,
};

pub(crate) fn timestamp(now: DateTime<Utc>) -> Bson {
    Bson::DateTime(bson::DateTime::from_millis(now.timestamp_millis()))
}

/// Sets fields to default values when they are absent.
pub struct AddFieldsOp {
    ns: Namespace,
    fields: Document,
    overwrite: bool,
    timestamp_field: Option<String>,
}

impl AddFieldsOp {
    pub fn new(
        ns: Namespace,
        fields: Document,
        overwrite: bool,
        timestamp_field: Option<String>,
    ) -> Self {
        Self {
            ns,
            fields,
            overwrite,
            timestamp_field,
        }
    }
}

impl MutationOp for AddFieldsOp {
    fn name(&self) -> &'static str {
        "add_fields"
    }

    fn document_need(&self) -> DocumentNeed {
        let keys: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        DocumentNeed::Document {
            projection: Some(projection_for(&keys)),
        }
    }

    fn lookup_namespace(&self) -> &Namespace {
        &self.ns
    }

    fn plan(&self, ctx: &DocContext<'_>) -> Result<Plan, MutationError> {
        let current = ctx.require_document()?;

        let mut set = Document::new();
        for (key, value) in &self.fields {
            let apply = match current.get(key) {
                None => true,
                Some(existing) => self.overwrite && existing != value,
            };
            if apply {
                set.insert(key.as_str(), value.clone());
            }
        }

        if set.is_empty() {
            return Ok(Plan::Skip(SkipReason::Unchanged));
        }
        if let Some(field) = &self.timestamp_field {
            set.insert(field.as_str(), timestamp(ctx.now));
        }

        Ok(Plan::Write(vec![WriteIntent::Set {
            ns: self.ns.clone(),
            id: ctx.id.clone(),
            fields: set,
        }]))
    }
}

/// Unsets fields server-side, without reading the document.
pub struct RemoveFieldsOp {
    ns: Namespace,
    fields: Vec<String>,
}

impl RemoveFieldsOp {
    pub fn new(ns: Namespace, fields: Vec<String>) -> Self {
        Self { ns, fields }
    }
}

impl MutationOp for RemoveFieldsOp {
    fn name(&self) -> &'static str {
        "remove_fields"
    }

    fn document_need(&self) -> DocumentNeed {
        DocumentNeed::IdOnly
    }

    fn lookup_namespace(&self) -> &Namespace {
        &self.ns
    }

    fn plan(&self, ctx: &DocContext<'_>) -> Result<Plan, MutationError> {
        Ok(Plan::Write(vec![WriteIntent::Unset {
            ns: self.ns.clone(),
            id: ctx.id.clone(),
            fields: self.fields.clone(),
        }]))
    }
}

/// Unconditionally sets fixed values.
pub struct UpdateFieldsOp {
    ns: Namespace,
    set: Document,
    timestamp_field: Option<String>,
}

impl UpdateFieldsOp {
    pub fn new(ns: Namespace, set: Document, timestamp_field: Option<String>) -> Self {
        Self {
            ns,
            set,
            timestamp_field,
        }
    }
}

impl MutationOp for UpdateFieldsOp {
    fn name(&self) -> &'static str {
        "update_fields"
    }

    fn document_need(&self) -> DocumentNeed {
        DocumentNeed::IdOnly
    }

    fn lookup_namespace(&self) -> &Namespace {
        &self.ns
    }

    fn plan(&self, ctx: &DocContext<'_>) -> Result<Plan, MutationError> {
        let mut fields = self.set.clone();
        if let Some(field) = &self.timestamp_field {
            fields.insert(field.as_str(), timestamp(ctx.now));
        }
        Ok(Plan::Write(vec![WriteIntent::Set {
            ns: self.ns.clone(),
            id: ctx.id.clone(),
            fields,
        }]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::{document::doc, identifiers::DocId};

    fn ns() -> Namespace {
        Namespace::new("db", "items")
    }

    #[test]
    fn test_add_fields_only_missing() {
        let op = AddFieldsOp::new(ns(), doc! { "a": 0, "tags": [] }, false, None);
        let id = DocId::Int(1);
        let current = doc! { "_id": 1, "a": 5 };

        let plan = op.plan(&DocContext::new(&id, Some(&current))).unwrap();
        assert_eq!(
            plan,
            Plan::Write(vec![WriteIntent::Set {
                ns: ns(),
                id: id.clone(),
                fields: doc! { "tags": [] },
            }])
        );

        let complete = doc! { "_id": 1, "a": 5, "tags": ["x"] };
        assert_eq!(
            op.plan(&DocContext::new(&id, Some(&complete))).unwrap(),
            Plan::Skip(SkipReason::Unchanged)
        );
    }

    #[test]
    fn test_add_fields_overwrite_and_timestamp() {
        let op = AddFieldsOp::new(ns(), doc! { "a": 0 }, true, Some("updated_at".into()));
        let id = DocId::Int(1);
        let current = doc! { "_id": 1, "a": 5 };

        match op.plan(&DocContext::new(&id, Some(&current))).unwrap() {
            Plan::Write(intents) => match &intents[0] {
                WriteIntent::Set { fields, .. } => {
                    assert_eq!(fields.get_i32("a").unwrap(), 0);
                    assert!(fields.get_datetime("updated_at").is_ok());
                }
                other => panic!("unexpected intent: {other:?}"),
            },
            other => panic!("unexpected plan: {other:?}"),
        }

        let already = doc! { "_id": 1, "a": 0 };
        assert_eq!(
            op.plan(&DocContext::new(&id, Some(&already))).unwrap(),
            Plan::Skip(SkipReason::Unchanged)
        );
    }

    #[test]
    fn test_add_fields_requires_document() {
        let op = AddFieldsOp::new(ns(), doc! { "a": 0 }, false, None);
        let id = DocId::Int(1);
        assert!(op.plan(&DocContext::new(&id, None)).is_err());
        assert_eq!(
            op.document_need(),
            DocumentNeed::Document {
                projection: Some(doc! { "_id": 1, "a": 1 })
            }
        );
    }

    #[test]
    fn test_remove_fields_is_blind_unset() {
        let op = RemoveFieldsOp::new(ns(), vec!["tmp".into()]);
        assert_eq!(op.document_need(), DocumentNeed::IdOnly);
        let id = DocId::String("k".into());
        assert_eq!(
            op.plan(&DocContext::new(&id, None)).unwrap(),
            Plan::Write(vec![WriteIntent::Unset {
                ns: ns(),
                id: id.clone(),
                fields: vec!["tmp".into()],
            }])
        );
    }
}
