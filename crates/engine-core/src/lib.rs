pub mod connection;
pub mod context;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod state;
