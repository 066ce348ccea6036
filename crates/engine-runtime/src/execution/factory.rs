use crate::error::RunError;
use engine_config::settings::validated::{ValidatedConfig, ValidatedSelection};
use engine_core::connection::ConnectionManager;
use engine_processing::{
    mutation::{DocumentNeed, MutationOp, build_mutation},
    selector::{IdListSelector, QuerySelector, Selector},
};
use model::core::document::doc;
use std::sync::Arc;

pub async fn create_operation(
    config: &ValidatedConfig,
    connections: &ConnectionManager,
) -> Result<Arc<dyn MutationOp>, RunError> {
    Ok(build_mutation(
        &config.mutation,
        &config.source,
        config.target.as_ref(),
        connections,
    )
    .await?)
}

/// Builds the selector for the run. Query selections fetch exactly what the
/// operation needs, so documents rarely have to be looked up again.
pub fn create_selector(
    config: &ValidatedConfig,
    connections: Arc<ConnectionManager>,
    need: &DocumentNeed,
) -> Box<dyn Selector> {
    match &config.selection {
        ValidatedSelection::Query { filter, limit } => {
            let projection = match need {
                DocumentNeed::IdOnly => Some(doc! { "_id": 1 }),
                DocumentNeed::Document { projection } => projection.clone(),
            };
            Box::new(
                QuerySelector::new(connections, config.source.clone(), filter.clone())
                    .with_projection(projection)
                    .with_limit(*limit)
                    .with_fetch_size(u32::try_from(config.batch_size).ok()),
            )
        }
        ValidatedSelection::IdFile {
            path,
            id_format,
            on_invalid,
        } => Box::new(IdListSelector::new(path.clone(), *id_format, *on_invalid)),
    }
}
