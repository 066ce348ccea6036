#[cfg(test)]
mod tests {
    use crate::utils::{
        Harness, id_selection, ids_in, keys, numbered, query_selection, read_lines, source_ns,
        target_ns,
    };
    use connectors::memory::{Fault, FaultKind, MemoryConnector};
    use engine_core::error::ConnectionError;
    use engine_runtime::error::RunError;
    use model::{
        core::{document::doc, identifiers::DocId},
        records::outcome::{FailureKind, SkipReason},
    };
    use serde_json::json;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    // Scenario: 10 ids in a file, batch size 3, concurrency 2, delete.
    // Expected Outcome:
    // - 4 batches, every document accounted for exactly once.
    // - No more than 2 batches touch the store at the same time.
    // - The report lands on disk with an empty retry list.
    #[traced_test]
    #[tokio::test]
    async fn test_delete_by_id_file() {
        let h = Harness::new();
        h.seed_source(numbered(10));
        h.set_latency(Duration::from_millis(2));

        let ids: Vec<String> = (1..=10).map(|i| i.to_string()).collect();
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        let path = h.id_file("ids.txt", &ids);

        let outcome = h
            .run(h.config(id_selection(&path), json!({ "op": "delete" }), json!({})))
            .await;
        let report = &outcome.report;

        assert_eq!(report.total, 10);
        assert_eq!(report.succeeded, 10);
        assert_eq!(report.batches, 4);
        assert_eq!(outcome.stats.scheduled, 4);
        assert!(h.store.peak_concurrency() <= 2);
        assert!(h.store.is_empty(&source_ns()));

        let paths = outcome.paths.as_ref().expect("report written");
        assert!(paths.report.exists());
        assert!(read_lines(&paths.retry_ids).is_empty());
        assert!(logs_contain("Run finished"));
    }

    // Scenario: one document fails permanently on delete.
    // Expected Outcome:
    // - Only that document fails, the rest of its batch and the other batches succeed.
    // - Its id is written to the retry list.
    #[traced_test]
    #[tokio::test]
    async fn test_failed_document_is_isolated() {
        let h = Harness::new();
        h.seed_source(numbered(10));
        h.store
            .inject(Fault::new(FaultKind::Permanent).on("delete").for_id(DocId::Int(2)));

        let outcome = h
            .run(h.config(query_selection(json!({})), json!({ "op": "delete" }), json!({})))
            .await;
        let report = &outcome.report;

        assert_eq!(report.total, 10);
        assert_eq!(report.succeeded, 9);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].id, DocId::Int(2));
        assert_eq!(report.failures[0].kind, FailureKind::Write);
        let paths = outcome.paths.as_ref().expect("report written");
        assert_eq!(read_lines(&paths.retry_ids), vec!["2".to_string()]);
        assert_eq!(ids_in(&h.store, &source_ns()), vec![DocId::Int(2)]);
    }

    // Scenario: the mutation panics halfway through the first batch.
    // Expected Outcome: the first batch fails as a whole, the other batches still run.
    #[traced_test]
    #[tokio::test]
    async fn test_panicking_batch_does_not_stop_the_run() {
        let h = Harness::new();
        h.seed_source(numbered(10));
        h.store
            .inject(Fault::new(FaultKind::Panic).on("delete").for_id(DocId::Int(2)));

        let outcome = h
            .run(h.config(query_selection(json!({})), json!({ "op": "delete" }), json!({})))
            .await;
        let report = &outcome.report;

        assert_eq!(outcome.stats.panicked, 1);
        assert_eq!(report.total, 10);
        assert_eq!(report.failed, 3);
        assert_eq!(report.succeeded, 7);
        assert!(report.failures.iter().all(|f| f.kind == FailureKind::Aborted));
        assert!(logs_contain("Batch task panicked"));
    }

    // Scenario: a transient error on one delete, cleared by the second retry.
    // Expected Outcome: every document succeeds and the retries are counted.
    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let h = Harness::new();
        h.seed_source(numbered(6));
        h.store.inject(
            Fault::new(FaultKind::Transient)
                .on("delete")
                .for_id(DocId::Int(5))
                .times(2),
        );

        let outcome = h
            .run(h.config(query_selection(json!({})), json!({ "op": "delete" }), json!({})))
            .await;

        assert_eq!(outcome.report.succeeded, 6);
        assert_eq!(outcome.report.retries, 2);
        assert!(h.store.is_empty(&source_ns()));
    }

    // Scenario: move four documents; the insert into the target fails for one of them.
    // Expected Outcome:
    // - The failing document stays in the source and is absent from the target.
    // - The others are moved.
    #[tokio::test]
    async fn test_move_keeps_source_when_target_write_fails() {
        let h = Harness::new();
        h.seed_source(numbered(4));
        h.store.inject(
            Fault::new(FaultKind::Permanent)
                .in_namespace(target_ns())
                .on("insert")
                .for_id(DocId::Int(3)),
        );

        let outcome = h
            .run(h.config(
                query_selection(json!({})),
                json!({ "op": "transfer", "mode": "move" }),
                json!({}),
            ))
            .await;

        assert_eq!(outcome.report.succeeded, 3);
        assert_eq!(outcome.report.failed, 1);
        assert_eq!(ids_in(&h.store, &source_ns()), vec![DocId::Int(3)]);
        assert_eq!(
            ids_in(&h.store, &target_ns()),
            vec![DocId::Int(1), DocId::Int(2), DocId::Int(4)]
        );
        assert_eq!(
            h.store.get(&target_ns(), &DocId::Int(4)),
            Some(doc! { "_id": 4_i64, "n": 4_i64 })
        );
    }

    // Scenario: a move whose source delete fails once for id 2, then a second
    // run over the failed id list it produced.
    // Expected Outcome:
    // - The first run leaves id 2 in both collections and lists it for retry.
    // - The second run finds the identical target copy, deletes the source
    //   and counts the document as moved.
    #[traced_test]
    #[tokio::test]
    async fn test_failed_move_completes_on_retry_run() {
        let h = Harness::new();
        h.seed_source(numbered(3));
        h.store.inject(
            Fault::new(FaultKind::Permanent)
                .in_namespace(source_ns())
                .on("delete")
                .for_id(DocId::Int(2))
                .times(1),
        );
        let mutation = json!({ "op": "transfer", "mode": "move" });
        let path = h.id_file("ids.txt", &["1", "2", "3"]);

        let first = h
            .run(h.config(id_selection(&path), mutation.clone(), json!({})))
            .await;
        assert_eq!(first.report.succeeded, 2);
        assert_eq!(first.report.failed, 1);
        assert_eq!(ids_in(&h.store, &source_ns()), vec![DocId::Int(2)]);

        let retry_file = first.paths.expect("report written").retry_ids;
        assert_eq!(read_lines(&retry_file), vec!["2".to_string()]);

        let second = h
            .run(h.config(id_selection(&retry_file), mutation, json!({})))
            .await;
        assert_eq!(second.report.total, 1);
        assert_eq!(second.report.succeeded, 1);
        assert_eq!(second.report.skipped, 0);
        assert!(h.store.is_empty(&source_ns()));
        assert_eq!(
            ids_in(&h.store, &target_ns()),
            vec![DocId::Int(1), DocId::Int(2), DocId::Int(3)]
        );
        assert!(logs_contain("Identical document already written"));
    }

    // Scenario: the report directory is a regular file.
    // Expected Outcome: the run fails before executing and no document is deleted.
    #[tokio::test]
    async fn test_unusable_report_dir_fails_before_mutating() {
        let h = Harness::new();
        h.seed_source(numbered(3));
        let occupied = h.id_file("reports-here", &["not a directory"]);

        let config = h.config(
            query_selection(json!({})),
            json!({ "op": "delete" }),
            json!({ "output": { "report_dir": occupied } }),
        );
        let result = h.try_run(config).await;

        assert!(matches!(result, Err(RunError::Report(_))));
        assert_eq!(h.store.len(&source_ns()), 3);
    }

    // Scenario: the same move is run twice over the same id file.
    // Expected Outcome: the second run writes nothing and reports every id as not found.
    #[tokio::test]
    async fn test_second_move_reports_not_found() {
        let h = Harness::new();
        h.seed_source(numbered(4));
        let path = h.id_file("ids.txt", &["1", "2", "3", "4"]);
        let mutation = json!({ "op": "transfer", "mode": "move" });

        let first = h
            .run(h.config(id_selection(&path), mutation.clone(), json!({})))
            .await;
        assert_eq!(first.report.succeeded, 4);

        let second = h
            .run(h.config(id_selection(&path), mutation, json!({})))
            .await;
        assert_eq!(second.report.succeeded, 0);
        assert_eq!(second.report.failed, 0);
        assert_eq!(second.report.skipped_by_reason.get(&SkipReason::NotFound), Some(&4));
        assert_eq!(second.report.not_found.len(), 4);
        assert_eq!(h.store.len(&target_ns()), 4);
    }

    // Scenario: copy into a target that already holds one of the documents.
    // Expected Outcome: the existing target document is left alone and reported as a skip.
    #[tokio::test]
    async fn test_copy_skips_existing_target_documents() {
        let h = Harness::new();
        h.seed_source(numbered(3));
        h.seed_target(vec![doc! { "_id": 2_i64, "n": 200_i64 }]);

        let outcome = h
            .run(h.config(
                query_selection(json!({})),
                json!({ "op": "transfer", "mode": "copy" }),
                json!({}),
            ))
            .await;

        assert_eq!(outcome.report.succeeded, 2);
        assert_eq!(
            outcome.report.skipped_by_reason.get(&SkipReason::AlreadyExists),
            Some(&1)
        );
        assert_eq!(h.store.len(&source_ns()), 3);
        assert_eq!(
            h.store.get(&target_ns(), &DocId::Int(2)),
            Some(doc! { "_id": 2_i64, "n": 200_i64 })
        );
    }

    // Scenario: rename a -> c on {a:1, b:2} with both ordering policies.
    // Expected Outcome: keep_in_place gives {c:1, b:2}, move_to_end gives {b:2, c:1}.
    // A second pass changes nothing.
    #[tokio::test]
    async fn test_rename_field_order() {
        let h = Harness::new();
        h.seed_source(vec![
            doc! { "_id": 1_i64, "a": 1, "b": 2 },
            doc! { "_id": 2_i64, "a": 1, "b": 2 },
        ]);

        let keep = h.config(
            query_selection(json!({ "_id": 1 })),
            json!({ "op": "rename_fields", "fields": { "a": "c" } }),
            json!({}),
        );
        assert_eq!(h.run(keep.clone()).await.report.succeeded, 1);

        let to_end = h.config(
            query_selection(json!({ "_id": 2 })),
            json!({ "op": "rename_fields", "fields": { "a": "c" }, "preserve_order": "move_to_end" }),
            json!({}),
        );
        assert_eq!(h.run(to_end).await.report.succeeded, 1);

        let first = h.store.get(&source_ns(), &DocId::Int(1)).unwrap();
        let second = h.store.get(&source_ns(), &DocId::Int(2)).unwrap();
        assert_eq!(keys(&first), vec!["_id", "c", "b"]);
        assert_eq!(keys(&second), vec!["_id", "b", "c"]);
        assert_eq!(first.get_i32("c").unwrap(), 1);

        let again = h.run(keep).await;
        assert_eq!(again.report.succeeded, 0);
        assert_eq!(again.report.skipped_by_reason.get(&SkipReason::Unchanged), Some(&1));
        assert_eq!(h.store.get(&source_ns(), &DocId::Int(1)), Some(first));
    }

    // Scenario: add a field with a default, then run the same operation again.
    // Expected Outcome: documents that already carry the field keep their value;
    // the second pass is a no-op.
    #[tokio::test]
    async fn test_add_fields_is_idempotent() {
        let h = Harness::new();
        h.seed_source(vec![
            doc! { "_id": 1_i64 },
            doc! { "_id": 2_i64, "status": "closed" },
        ]);
        let config = h.config(
            query_selection(json!({})),
            json!({ "op": "add_fields", "fields": { "status": "open" } }),
            json!({}),
        );

        let first = h.run(config.clone()).await;
        assert_eq!(first.report.succeeded, 1);
        assert_eq!(first.report.skipped, 1);
        assert_eq!(
            h.store.get(&source_ns(), &DocId::Int(1)).unwrap().get_str("status").unwrap(),
            "open"
        );
        assert_eq!(
            h.store.get(&source_ns(), &DocId::Int(2)).unwrap().get_str("status").unwrap(),
            "closed"
        );

        let second = h.run(config).await;
        assert_eq!(second.report.succeeded, 0);
        assert_eq!(second.report.skipped, 2);
    }

    // Scenario: remove a field, then update another one with a timestamp.
    #[tokio::test]
    async fn test_remove_and_update_fields() {
        let h = Harness::new();
        h.seed_source(vec![doc! { "_id": 1_i64, "legacy": true, "n": 1 }]);

        h.run(h.config(
            query_selection(json!({})),
            json!({ "op": "remove_fields", "fields": ["legacy"] }),
            json!({}),
        ))
        .await;
        h.run(h.config(
            query_selection(json!({})),
            json!({ "op": "update_fields", "set": { "n": 2 }, "timestamp_field": "updated_at" }),
            json!({}),
        ))
        .await;

        let stored = h.store.get(&source_ns(), &DocId::Int(1)).unwrap();
        assert!(!stored.contains_key("legacy"));
        assert_eq!(stored.get_i32("n").unwrap(), 2);
        assert!(stored.get_datetime("updated_at").is_ok());
    }

    // Scenario: copy a field from the source onto matching target documents.
    // Expected Outcome: source documents without the field are skipped.
    #[tokio::test]
    async fn test_copy_fields_onto_target() {
        let h = Harness::new();
        h.seed_source(vec![
            doc! { "_id": 1_i64, "email": "a@example.com" },
            doc! { "_id": 2_i64 },
        ]);
        h.seed_target(vec![doc! { "_id": 1_i64 }, doc! { "_id": 2_i64 }]);

        let outcome = h
            .run(h.config(
                query_selection(json!({})),
                json!({ "op": "copy_fields", "fields": ["email"] }),
                json!({}),
            ))
            .await;

        assert_eq!(outcome.report.succeeded, 1);
        assert_eq!(
            outcome.report.skipped_by_reason.get(&SkipReason::SourceFieldMissing),
            Some(&1)
        );
        assert_eq!(
            h.store.get(&target_ns(), &DocId::Int(1)).unwrap().get_str("email").unwrap(),
            "a@example.com"
        );
    }

    // Scenario: flag source documents whose email also appears in the target.
    #[tokio::test]
    async fn test_mark_duplicates() {
        let h = Harness::new();
        h.seed_source(vec![
            doc! { "_id": 1_i64, "email": "a@example.com" },
            doc! { "_id": 2_i64, "email": "b@example.com" },
            doc! { "_id": 3_i64 },
        ]);
        h.seed_target(vec![doc! { "_id": 10_i64, "email": "a@example.com" }]);

        let outcome = h
            .run(h.config(
                query_selection(json!({})),
                json!({ "op": "mark_duplicates", "field": "email" }),
                json!({}),
            ))
            .await;

        assert_eq!(outcome.report.succeeded, 1);
        assert_eq!(outcome.report.skipped_by_reason.get(&SkipReason::NoMatch), Some(&2));
        assert!(
            h.store
                .get(&source_ns(), &DocId::Int(1))
                .unwrap()
                .get_bool("duplicated")
                .unwrap()
        );
        assert!(!h.store.get(&source_ns(), &DocId::Int(2)).unwrap().contains_key("duplicated"));
    }

    // Scenario: id file with a repeated id and a malformed line.
    // Expected Outcome: exactly one rejection, the repeated id is processed once.
    #[tokio::test]
    async fn test_id_file_duplicates_and_malformed_lines() {
        let h = Harness::new();
        h.seed_source(numbered(3));
        let path = h.id_file("ids.txt", &["1", "2", "two", "2", "3"]);

        let outcome = h
            .run(h.config(id_selection(&path), json!({ "op": "delete" }), json!({})))
            .await;
        let report = &outcome.report;

        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].line, Some(3));
        assert_eq!(report.rejected[0].value, "two");
        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.skipped, 0);
    }

    // Scenario: invalid lines with the abort policy.
    // Expected Outcome: the run fails before anything is written.
    #[tokio::test]
    async fn test_id_file_abort_policy_fails_the_run() {
        let h = Harness::new();
        h.seed_source(numbered(3));
        let path = h.id_file("ids.txt", &["1", "bogus", "3"]);

        let config = h.config(
            id_selection(&path),
            json!({ "op": "delete" }),
            json!({ "selection": { "on_invalid": "abort" } }),
        );
        let result = h.try_run(config).await;

        assert!(matches!(result, Err(RunError::Selection(_))));
        assert_eq!(h.store.len(&source_ns()), 3);
        assert!(!h.report_dir().exists());
    }

    // Scenario: the filter matches nothing.
    // Expected Outcome: a report with all counters at zero.
    #[tokio::test]
    async fn test_empty_selection() {
        let h = Harness::new();
        h.seed_source(numbered(3));

        let outcome = h
            .run(h.config(
                query_selection(json!({ "n": { "$gt": 100 } })),
                json!({ "op": "delete" }),
                json!({}),
            ))
            .await;
        let report = &outcome.report;

        assert_eq!(report.total, 0);
        assert_eq!(report.batches, 0);
        assert_eq!(report.succeeded + report.failed + report.skipped, 0);
        assert!(report.interrupted.is_none());
        assert!(outcome.paths.is_some_and(|paths| paths.report.exists()));
    }

    // Scenario: dry run of a delete.
    // Expected Outcome: the report counts what would happen, the store is untouched.
    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let h = Harness::new();
        h.seed_source(numbered(5));

        let outcome = h
            .run(h.config(
                query_selection(json!({})),
                json!({ "op": "delete" }),
                json!({ "execution": { "dry_run": true } }),
            ))
            .await;

        assert!(outcome.report.dry_run);
        assert_eq!(outcome.report.succeeded, 5);
        assert_eq!(h.store.len(&source_ns()), 5);
    }

    // Scenario: shutdown is requested while batches are still being scheduled.
    // Expected Outcome:
    // - The run stops early and says so in the report.
    // - Every document reported as succeeded is gone, every other one is still there.
    #[traced_test]
    #[tokio::test]
    async fn test_cancellation_stops_scheduling() {
        let h = Harness::new();
        h.seed_source(numbered(20));
        h.set_latency(Duration::from_millis(20));

        let config = h.config(
            query_selection(json!({})),
            json!({ "op": "delete" }),
            json!({ "execution": { "batch_size": 2, "concurrency": 1 } }),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            trigger.cancel();
        });

        let outcome = h.try_run_with(config, cancel).await.unwrap();
        let report = &outcome.report;

        assert!(report.is_consistent());
        assert!(report.interrupted.is_some());
        assert!(report.succeeded < 20);
        assert_eq!(report.succeeded as usize + h.store.len(&source_ns()), 20);
        // Only batches the pool accepted are counted; a refused batch is dropped.
        assert_eq!(report.total, outcome.stats.scheduled as u64 * 2);
        assert!(logs_contain("Shutdown requested"));
    }

    // Scenario: the first two connection attempts fail.
    // Expected Outcome: the connection manager retries and the run completes.
    #[tokio::test]
    async fn test_connection_failures_are_retried() {
        let h = Harness::with_connector(|store| MemoryConnector::new(store).failing_first(2));
        h.seed_source(numbered(3));

        let outcome = h
            .run(h.config(query_selection(json!({})), json!({ "op": "delete" }), json!({})))
            .await;

        assert_eq!(outcome.report.succeeded, 3);
        assert!(h.connector.connects() >= 1);
    }

    // Scenario: more connection failures than the retry budget allows.
    // Expected Outcome: the run fails during setup and nothing is touched.
    #[tokio::test]
    async fn test_unreachable_database_fails_the_run() {
        let h = Harness::with_connector(|store| MemoryConnector::new(store).failing_first(10));
        h.seed_source(numbered(3));

        let result = h
            .try_run(h.config(query_selection(json!({})), json!({ "op": "delete" }), json!({})))
            .await;

        assert!(matches!(
            result,
            Err(RunError::Connection(ConnectionError::Exhausted { attempts: 3, .. }))
        ));
        assert_eq!(h.store.len(&source_ns()), 3);
    }

    // Scenario: the server accepts sessions but does not answer pings.
    #[tokio::test]
    async fn test_failed_ping_fails_the_run() {
        let h = Harness::new();
        h.seed_source(numbered(3));
        h.store.set_down(true);

        let result = h
            .try_run(h.config(query_selection(json!({})), json!({ "op": "delete" }), json!({})))
            .await;

        assert!(matches!(result, Err(RunError::Connection(_))));
        assert_eq!(h.store.len(&source_ns()), 3);
    }

    // Scenario: count resolves the selection without touching documents.
    #[tokio::test]
    async fn test_count_selection() {
        let h = Harness::new();
        h.seed_source(numbered(5));
        let path = h.id_file("ids.txt", &["1", "2", "x", "9"]);

        let config = h.config(id_selection(&path), json!({ "op": "delete" }), json!({}));
        let count = engine_runtime::count(&config, h.connector.clone()).await.unwrap();

        assert_eq!(count.selected, 3);
        assert_eq!(count.rejected, 1);
        assert_eq!(h.store.len(&source_ns()), 5);
    }
}
