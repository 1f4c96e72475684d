pub mod api;
pub mod clients;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod policy;
pub mod utils;
