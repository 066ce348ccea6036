use crate::error::SelectError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use model::records::{batch::SelectedDoc, outcome::Rejection};

pub mod id_list;
pub mod query;

pub use id_list::IdListSelector;
pub use query::QuerySelector;

/// One entry of the working set.
#[derive(Debug, Clone, PartialEq)]
pub enum Selected {
    Doc(SelectedDoc),
    /// An entry that could not be turned into an addressable document.
    Rejected(Rejection),
}

/// Lazy, single-pass working set. An `Err` item means the underlying
/// source failed mid-way; nothing after it is produced.
pub type SelectionStream = BoxStream<'static, Result<Selected, SelectError>>;

#[async_trait]
pub trait Selector: Send + Sync {
    fn describe(&self) -> String;

    async fn select(&self) -> Result<SelectionStream, SelectError>;
}
