use super::settings::MongoSettings;
use crate::{
    error::StoreError,
    store::{Connector, DocumentStore, DocumentStream, FindOptions, WriteIntent, WriteOutcome},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use model::core::{
    document::{Document, Namespace, doc},
    identifiers::DocId,
};
use mongodb::{
    Client, Collection,
    options::{FindOneOptions, FindOptions as DriverFindOptions, ReplaceOptions},
    results::UpdateResult,
};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Builds one driver client per connector and hands out store handles on it.
/// The driver pools connections internally, so every handle shares the
/// client's pool.
pub struct MongoConnector {
    settings: MongoSettings,
    client: OnceCell<Client>,
}

impl MongoConnector {
    pub fn new(settings: MongoSettings) -> Self {
        MongoConnector {
            settings,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<Client, StoreError> {
        let client = self
            .client
            .get_or_try_init(|| async {
                let options = self.settings.client_options().await?;
                info!(endpoint = %self.settings.describe(), "Creating MongoDB client");
                Client::with_options(options).map_err(StoreError::from)
            })
            .await?;
        Ok(client.clone())
    }
}

#[async_trait]
impl Connector for MongoConnector {
    fn describe(&self) -> String {
        self.settings.describe()
    }

    async fn connect(&self) -> Result<Arc<dyn DocumentStore>, StoreError> {
        let store = MongoStore::new(self.client().await?);
        store.ping().await?;
        Ok(Arc::new(store))
    }
}

#[derive(Clone)]
pub struct MongoStore {
    client: Client,
}

impl MongoStore {
    pub fn new(client: Client) -> Self {
        MongoStore { client }
    }

    fn collection(&self, ns: &Namespace) -> Collection<Document> {
        self.client
            .database(&ns.database)
            .collection::<Document>(&ns.collection)
    }
}

fn by_id(id: &DocId) -> Document {
    doc! { "_id": id.to_bson() }
}

fn update_outcome(result: UpdateResult) -> WriteOutcome {
    if result.upserted_id.is_some() {
        WriteOutcome::Applied
    } else if result.matched_count == 0 {
        WriteOutcome::NotFound
    } else if result.modified_count == 0 {
        WriteOutcome::Unchanged
    } else {
        WriteOutcome::Applied
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await?;
        Ok(())
    }

    async fn find(
        &self,
        ns: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> Result<DocumentStream, StoreError> {
        let mut driver_options = DriverFindOptions::default();
        driver_options.projection = options.projection;
        driver_options.limit = options.limit;
        driver_options.batch_size = options.batch_size;

        debug!(namespace = %ns, filter = %filter, "Opening cursor");
        let cursor = self
            .collection(ns)
            .find(filter, Some(driver_options))
            .await?;
        Ok(cursor.map(|item| item.map_err(StoreError::from)).boxed())
    }

    async fn find_one(
        &self,
        ns: &Namespace,
        id: &DocId,
        projection: Option<Document>,
    ) -> Result<Option<Document>, StoreError> {
        let mut options = FindOneOptions::default();
        options.projection = projection;
        Ok(self
            .collection(ns)
            .find_one(by_id(id), Some(options))
            .await?)
    }

    async fn count(&self, ns: &Namespace, filter: Document) -> Result<u64, StoreError> {
        Ok(self.collection(ns).count_documents(filter, None).await?)
    }

    async fn apply(&self, intent: &WriteIntent) -> Result<WriteOutcome, StoreError> {
        match intent {
            WriteIntent::Insert { ns, document } => {
                match self.collection(ns).insert_one(document.clone(), None).await {
                    Ok(_) => Ok(WriteOutcome::Applied),
                    Err(err) => match StoreError::from(err) {
                        StoreError::DuplicateKey(msg) if msg.contains("_id_") => {
                            Ok(WriteOutcome::AlreadyExists)
                        }
                        other => Err(other),
                    },
                }
            }
            WriteIntent::Replace {
                ns,
                id,
                document,
                upsert,
            } => {
                let mut options = ReplaceOptions::default();
                options.upsert = Some(*upsert);
                let result = self
                    .collection(ns)
                    .replace_one(by_id(id), document.clone(), Some(options))
                    .await?;
                Ok(update_outcome(result))
            }
            WriteIntent::Set { ns, id, fields } => {
                let result = self
                    .collection(ns)
                    .update_one(by_id(id), doc! { "$set": fields.clone() }, None)
                    .await?;
                Ok(update_outcome(result))
            }
            WriteIntent::Unset { ns, id, fields } => {
                let mut unset = Document::new();
                for field in fields {
                    unset.insert(field.as_str(), "");
                }
                let result = self
                    .collection(ns)
                    .update_one(by_id(id), doc! { "$unset": unset }, None)
                    .await?;
                Ok(update_outcome(result))
            }
            WriteIntent::Delete { ns, id } => {
                let result = self.collection(ns).delete_one(by_id(id), None).await?;
                if result.deleted_count == 0 {
                    Ok(WriteOutcome::NotFound)
                } else {
                    Ok(WriteOutcome::Applied)
                }
            }
        }
    }
}
