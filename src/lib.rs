pub mod audit;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod journal;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod runtime;
pub mod store;
pub mod wal;
