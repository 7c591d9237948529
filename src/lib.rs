#![forbid(unsafe_code)]

pub mod app;
pub mod app_state;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod probe;
pub mod query;
pub mod server;
pub mod store;
pub mod telemetry;
