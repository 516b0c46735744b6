pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod launcher;
pub mod ledger;
pub mod pipeline;
pub mod store;
pub mod types;
