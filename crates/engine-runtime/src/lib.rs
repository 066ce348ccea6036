pub mod error;
pub mod execution;

pub use execution::executor::{RunOutcome, count, run, test_connection};
