use serde::{Deserialize, Serialize};

/// What an id-list selection does with a line that is not a valid identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidIdPolicy {
    /// Report the line as rejected and keep going.
    #[default]
    Skip,
    /// Fail the run before any document is touched.
    Abort,
}
