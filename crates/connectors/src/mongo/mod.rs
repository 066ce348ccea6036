mod error;
pub mod settings;
pub mod store;

pub use settings::MongoSettings;
pub use store::{MongoConnector, MongoStore};
