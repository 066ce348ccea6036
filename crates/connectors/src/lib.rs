pub mod error;
pub mod memory;
pub mod mongo;
pub mod store;
