//! Sequential response-time benchmark for widget-based web applications.
//!
//! Discovers widgets and layout pages from an application checkout, requests
//! each one once over a single authenticated session, and reports timings,
//! sizes, validity and optional profiler samples.

pub mod auth;
pub mod bench;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod http_client;
pub mod layout;
pub mod metrics;
pub mod profiler;
pub mod report;
pub mod target;

#[cfg(test)]
mod fakes;

pub use bench::{run, run_with_client, RunSummary};
pub use config::BenchConfig;
pub use error::{BenchError, Result};
