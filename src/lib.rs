pub mod commands;
pub mod config;
pub mod error;
pub mod extractor;
pub mod interactions;
pub mod keys;
pub mod keys_api;
pub mod routes;

pub use routes::app;
