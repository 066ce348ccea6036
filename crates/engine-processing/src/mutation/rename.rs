use super::{DocContext, DocumentNeed, MutationOp, Plan};
use crate::error::MutationError;
use connectors::store::WriteIntent;
use model::{
    core::document::{Document, Namespace},
    execution::mutation::{CollisionPolicy, PreserveOrder},
    records::outcome::SkipReason,
};
use std::collections::{BTreeMap, HashSet};

/// Renames top-level fields by rewriting the whole document, so the
/// resulting key order is under our control.
pub struct RenameFieldsOp {
    ns: Namespace,
    renames: BTreeMap<String, String>,
    preserve_order: PreserveOrder,
    on_collision: CollisionPolicy,
}

impl RenameFieldsOp {
    pub fn new(
        ns: Namespace,
        renames: BTreeMap<String, String>,
        preserve_order: PreserveOrder,
        on_collision: CollisionPolicy,
    ) -> Self {
        Self {
            ns,
            renames,
            preserve_order,
            on_collision,
        }
    }

    /// Builds the renamed document, or `None` when no source field is present.
    pub fn rename(&self, current: &Document) -> Result<Option<Document>, MutationError> {
        let active: Vec<(&str, &str)> = current
            .keys()
            .filter_map(|key| {
                self.renames
                    .get(key)
                    .map(|to| (key.as_str(), to.as_str()))
            })
            .collect();
        if active.is_empty() {
            return Ok(None);
        }

        let mut displaced = HashSet::new();
        for (from, to) in &active {
            if current.contains_key(to) {
                if self.on_collision == CollisionPolicy::Error {
                    return Err(MutationError::Collision {
                        from: from.to_string(),
                        to: to.to_string(),
                    });
                }
                displaced.insert(*to);
            }
        }

        let mut out = Document::new();
        let mut moved = Vec::new();
        for (key, value) in current {
            if displaced.contains(key.as_str()) {
                continue;
            }
            match self.renames.get(key) {
                Some(to) => match self.preserve_order {
                    PreserveOrder::KeepInPlace => {
                        out.insert(to.as_str(), value.clone());
                    }
                    PreserveOrder::MoveToEnd => moved.push((to.as_str(), value.clone())),
                },
                None => {
                    out.insert(key.as_str(), value.clone());
                }
            }
        }
        for (to, value) in moved {
            out.insert(to, value);
        }
        Ok(Some(out))
    }
}

impl MutationOp for RenameFieldsOp {
    fn name(&self) -> &'static str {
        "rename_fields"
    }

    fn document_need(&self) -> DocumentNeed {
        DocumentNeed::Document { projection: None }
    }

    fn lookup_namespace(&self) -> &Namespace {
        &self.ns
    }

    fn plan(&self, ctx: &DocContext<'_>) -> Result<Plan, MutationError> {
        let current = ctx.require_document()?;
        match self.rename(current)? {
            None => Ok(Plan::Skip(SkipReason::Unchanged)),
            Some(document) => Ok(Plan::Write(vec![WriteIntent::Replace {
                ns: self.ns.clone(),
                id: ctx.id.clone(),
                document,
                upsert: false,
            }])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::{document::doc, identifiers::DocId};

    fn op(pairs: &[(&str, &str)], order: PreserveOrder, collision: CollisionPolicy) -> RenameFieldsOp {
        RenameFieldsOp::new(
            Namespace::new("db", "people"),
            pairs
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            order,
            collision,
        )
    }

    fn keys(doc: &Document) -> Vec<&str> {
        doc.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_keep_in_place() {
        let op = op(&[("a", "c")], PreserveOrder::KeepInPlace, CollisionPolicy::Overwrite);
        let out = op.rename(&doc! { "a": 1, "b": 2 }).unwrap().unwrap();
        assert_eq!(out, doc! { "c": 1, "b": 2 });
        assert_eq!(keys(&out), vec!["c", "b"]);
    }

    #[test]
    fn test_move_to_end() {
        let op = op(&[("a", "c")], PreserveOrder::MoveToEnd, CollisionPolicy::Overwrite);
        let out = op.rename(&doc! { "a": 1, "b": 2 }).unwrap().unwrap();
        assert_eq!(keys(&out), vec!["b", "c"]);
        assert_eq!(out.get_i32("c").unwrap(), 1);
    }

    #[test]
    fn test_collision_overwrite_drops_old_target() {
        let op = op(&[("a", "b")], PreserveOrder::KeepInPlace, CollisionPolicy::Overwrite);
        let out = op
            .rename(&doc! { "_id": 7, "a": 1, "b": 2, "z": 0 })
            .unwrap()
            .unwrap();
        assert_eq!(keys(&out), vec!["_id", "b", "z"]);
        assert_eq!(out.get_i32("b").unwrap(), 1);
    }

    #[test]
    fn test_collision_error() {
        let op = op(&[("a", "b")], PreserveOrder::KeepInPlace, CollisionPolicy::Error);
        let err = op.rename(&doc! { "a": 1, "b": 2 }).unwrap_err();
        assert!(matches!(err, MutationError::Collision { ref from, ref to } if from == "a" && to == "b"));
    }

    #[test]
    fn test_missing_source_is_unchanged() {
        let op = op(&[("a", "c")], PreserveOrder::KeepInPlace, CollisionPolicy::Overwrite);
        let id = DocId::Int(1);
        let current = doc! { "_id": 1, "b": 2 };
        assert_eq!(
            op.plan(&DocContext::new(&id, Some(&current))).unwrap(),
            Plan::Skip(SkipReason::Unchanged)
        );
    }

    #[test]
    fn test_plan_replaces_document() {
        let op = op(&[("old", "new")], PreserveOrder::KeepInPlace, CollisionPolicy::Overwrite);
        let id = DocId::Int(1);
        let current = doc! { "_id": 1, "old": "x" };
        match op.plan(&DocContext::new(&id, Some(&current))).unwrap() {
            Plan::Write(intents) => assert_eq!(
                intents,
                vec![WriteIntent::Replace {
                    ns: Namespace::new("db", "people"),
                    id: id.clone(),
                    document: doc! { "_id": 1, "new": "x" },
                    upsert: false,
                }]
            ),
            other => panic!("unexpected plan: {other:?}"),
        }
    }
}
