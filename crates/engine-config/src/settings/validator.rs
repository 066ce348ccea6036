use crate::settings::{
    RetrySettings, RunConfig, SelectionSettings,
    error::SettingsError,
    validated::{ValidatedConfig, ValidatedSelection},
};
use bson::Bson;
use engine_core::retry::RetryPolicy;
use model::{
    core::{document::Namespace, identifiers::ID_FIELD},
    execution::mutation::MutationSpec,
};
use std::{collections::BTreeSet, time::Duration};
use tracing::{info, warn};

const LARGE_BATCH_WARNING: usize = 100_000;

/// Checks a run configuration before anything touches the database.
pub struct SettingsValidator<'a> {
    config: &'a RunConfig,
}

impl<'a> SettingsValidator<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self) -> Result<ValidatedConfig, SettingsError> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_execution(&mut errors);
        validate_namespaces(self.config, &mut errors);
        validate_mutation(
            &self.config.mutation,
            &self.config.source,
            self.config.target.as_ref(),
            &mut errors,
        );
        let selection = self.validate_selection(&mut errors);

        if !errors.is_empty() {
            return Err(SettingsError::ValidationFailed(errors));
        }
        let selection = selection.ok_or_else(|| SettingsError::Missing("selection".into()))?;

        let execution = &self.config.execution;
        let mut connection = self.config.connection.clone();
        if connection.max_pool_size.is_none() {
            // One extra driver connection for the selection cursor.
            connection.max_pool_size = Some(execution.concurrency as u32 + 1);
        }

        let validated = ValidatedConfig {
            connection,
            source: self.config.source.clone(),
            target: self.config.target.clone(),
            selection,
            mutation: self.config.mutation.clone(),
            batch_size: execution.batch_size,
            concurrency: execution.concurrency,
            retry: retry_policy(execution.retry),
            connect_retry: retry_policy(execution.connect_retry),
            acquire_timeout: Duration::from_secs(execution.acquire_timeout_secs),
            drain_timeout: Duration::from_secs(execution.drain_timeout_secs),
            dry_run: execution.dry_run,
            fail_on_error: execution.fail_on_error,
            report_dir: self.config.output.report_dir.clone(),
        };

        info!(
            operation = validated.mutation.kind(),
            source = %validated.source,
            batch_size = validated.batch_size,
            concurrency = validated.concurrency,
            dry_run = validated.dry_run,
            "Run configuration validated"
        );
        Ok(validated)
    }

    fn validate_execution(&self, errors: &mut Vec<String>) {
        let execution = &self.config.execution;
        if execution.batch_size == 0 {
            errors.push("execution.batch_size must be greater than zero".into());
        } else if execution.batch_size > LARGE_BATCH_WARNING {
            warn!(
                batch_size = execution.batch_size,
                "Batch size is very large, may cause memory issues"
            );
        }
        if execution.concurrency == 0 {
            errors.push("execution.concurrency must be greater than zero".into());
        }
        if execution.retry.max_attempts == 0 {
            errors.push("execution.retry.max_attempts must be greater than zero".into());
        }
        if execution.connect_retry.max_attempts == 0 {
            errors.push("execution.connect_retry.max_attempts must be greater than zero".into());
        }
    }

    fn validate_selection(&self, errors: &mut Vec<String>) -> Option<ValidatedSelection> {
        match &self.config.selection {
            SelectionSettings::Query { filter, limit } => {
                if limit.is_some_and(|l| l <= 0) {
                    errors.push("selection.limit must be positive".into());
                }
                match Bson::try_from(filter.clone()) {
                    Ok(Bson::Document(filter)) => Some(ValidatedSelection::Query {
                        filter,
                        limit: *limit,
                    }),
                    Ok(other) => {
                        errors.push(format!(
                            "selection.filter must be an object, got {:?}",
                            other.element_type()
                        ));
                        None
                    }
                    Err(err) => {
                        errors.push(format!("selection.filter is not valid extended JSON: {err}"));
                        None
                    }
                }
            }
            SelectionSettings::IdFile {
                path,
                id_format,
                on_invalid,
            } => {
                if path.as_os_str().is_empty() {
                    errors.push("selection.path must not be empty".into());
                }
                Some(ValidatedSelection::IdFile {
                    path: path.clone(),
                    id_format: *id_format,
                    on_invalid: *on_invalid,
                })
            }
        }
    }
}

fn retry_policy(settings: RetrySettings) -> RetryPolicy {
    RetryPolicy::new(
        settings.max_attempts,
        Duration::from_millis(settings.base_delay_ms),
        Duration::from_millis(settings.max_delay_ms),
    )
}

fn validate_namespaces(config: &RunConfig, errors: &mut Vec<String>) {
    for (name, ns) in std::iter::once(("source", Some(&config.source)))
        .chain(std::iter::once(("target", config.target.as_ref())))
    {
        if let Some(ns) = ns
            && (ns.database.is_empty() || ns.collection.is_empty())
        {
            errors.push(format!("{name} needs both a database and a collection"));
        }
    }

    if let Some(target) = &config.target
        && !config.mutation.requires_target()
    {
        warn!(
            target = %target,
            operation = config.mutation.kind(),
            "Target namespace is ignored by this operation"
        );
    }
}

/// Checks on the mutation definition; any finding is fatal before execution.
pub fn validate_mutation(
    spec: &MutationSpec,
    source: &Namespace,
    target: Option<&Namespace>,
    errors: &mut Vec<String>,
) {
    if spec.requires_target() {
        match target {
            None => errors.push(format!("{} requires a target namespace", spec.kind())),
            Some(target) if target == source => errors.push(format!(
                "{} source and target are the same namespace ({source})",
                spec.kind()
            )),
            Some(_) => {}
        }
    }

    match spec {
        MutationSpec::AddFields { fields, .. } => {
            if fields.is_empty() {
                errors.push("add_fields.fields must not be empty".into());
            }
            if fields.contains_key(ID_FIELD) {
                errors.push("add_fields cannot set _id".into());
            }
        }
        MutationSpec::UpdateFields { set, .. } => {
            if set.is_empty() {
                errors.push("update_fields.set must not be empty".into());
            }
            if set.contains_key(ID_FIELD) {
                errors.push("update_fields cannot set _id".into());
            }
        }
        MutationSpec::RemoveFields { fields } => {
            check_field_list("remove_fields.fields", fields, errors);
        }
        MutationSpec::CopyFields { fields } => {
            check_field_list("copy_fields.fields", fields, errors);
        }
        MutationSpec::Transfer {
            fields: Some(fields),
            ..
        } => {
            if fields.is_empty() {
                errors.push("transfer.fields must not be empty when given".into());
            }
        }
        MutationSpec::Transfer { fields: None, .. } | MutationSpec::Delete => {}
        MutationSpec::RenameFields { fields, .. } => {
            if fields.is_empty() {
                errors.push("rename_fields.fields must not be empty".into());
            }
            let mut targets = BTreeSet::new();
            for (from, to) in fields {
                if from.is_empty() || to.is_empty() {
                    errors.push("rename_fields entries must not be empty".into());
                }
                if from == ID_FIELD || to == ID_FIELD {
                    errors.push(format!("rename_fields cannot rename _id ({from} -> {to})"));
                }
                if from == to {
                    errors.push(format!("rename_fields maps {from} onto itself"));
                }
                if fields.contains_key(to) && from != to {
                    errors.push(format!(
                        "rename_fields target {to} is also a rename source"
                    ));
                }
                if !targets.insert(to) {
                    errors.push(format!("rename_fields has several sources renamed to {to}"));
                }
            }
        }
        MutationSpec::MarkDuplicates { field, flag } => {
            if field.is_empty() {
                errors.push("mark_duplicates.field must not be empty".into());
            }
            if flag.is_empty() || flag == ID_FIELD {
                errors.push("mark_duplicates.flag must be a regular field name".into());
            }
        }
    }
}

fn check_field_list(name: &str, fields: &[String], errors: &mut Vec<String>) {
    if fields.is_empty() {
        errors.push(format!("{name} must not be empty"));
    }
    if fields.iter().any(|f| f.is_empty()) {
        errors.push(format!("{name} contains an empty field name"));
    }
    if fields.iter().any(|f| f == ID_FIELD) {
        errors.push(format!("{name} cannot include _id"));
    }
}
