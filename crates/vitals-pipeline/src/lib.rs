//! Vitals Pipeline Library
//!
//! Periodic ETL for state public-health statistics: fetch source documents
//! (delimited text, spreadsheet, PDF bulletin), normalize them into time
//! series, compute derived metrics, and publish content-addressed JSON
//! artifacts behind a CDN.
//!
//! # Architecture
//!
//! - Fetch: HTTP client with bounded retry ([`fetch`])
//! - Parse: one parser per source format ([`parsers`])
//! - Detect: timestamp-based change detection ([`detect`])
//! - Derive: rolling averages and cumulative totals ([`series`], [`reports`])
//! - Publish: content-addressed S3 writes plus metadata and CDN
//!   invalidation ([`pipeline`], [`storage`], [`notify`])
//!
//! # Example
//!
//! ```no_run
//! use vitals_pipeline::{config::PublishConfig, pipeline::Pipeline, regions};
//! use vitals_pipeline::{notify::RecordingInvalidator, storage::MemoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = Pipeline::builder()
//!         .store(Arc::new(MemoryStore::new()))
//!         .invalidator(Arc::new(RecordingInvalidator::new()))
//!         .publish(PublishConfig {
//!             bucket: "vitals".to_string(),
//!             public_base_url: "https://vitals.example.org".to_string(),
//!             distribution_id: None,
//!         })
//!         .build()?;
//!     pipeline.run_region(&regions::california()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod detect;
pub mod fetch;
pub mod metadata;
pub mod notify;
pub mod parsers;
pub mod pipeline;
pub mod regions;
pub mod reports;
pub mod series;
pub mod storage;

// Re-export the shared error type alongside the library surface
pub use vitals_common::{Result, VitalsError};
