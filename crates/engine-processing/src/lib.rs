pub mod batch_processor;
pub mod batcher;
pub mod dedupe;
pub mod error;
pub mod mutation;
pub mod report_writer;
pub mod retry;
pub mod selector;
