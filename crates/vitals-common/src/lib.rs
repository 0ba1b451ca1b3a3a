//! Vitals Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the vitals workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the `VitalsError` enum and `Result` alias used by
//!   every pipeline component
//! - **Fingerprints**: MD5 content fingerprinting for content-addressed
//!   artifact keys, report deduplication, and upload integrity headers
//! - **Logging**: tracing initialization shared by all binaries
//!
//! # Example
//!
//! ```no_run
//! use vitals_common::{Result, fingerprint};
//!
//! fn artifact_key(prefix: &str, body: &[u8]) -> Result<String> {
//!     Ok(format!("{}/epi_{}.json", prefix, fingerprint::hex_md5(body)))
//! }
//! ```

pub mod error;
pub mod fingerprint;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, VitalsError};
