//! Cache invalidation gateway.
//!
//! After a region's metadata document changes, its CDN path must be
//! invalidated so clients see the new artifact URLs. Modeled as a trait so
//! tests can observe invalidations without touching CloudFront.

use async_trait::async_trait;
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use vitals_common::{Result, VitalsError};

/// Invalidate cached copies of the given absolute paths.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, paths: &[String]) -> Result<()>;
}

/// CloudFront-backed invalidator for one distribution.
pub struct CloudFrontInvalidator {
    client: aws_sdk_cloudfront::Client,
    distribution_id: String,
}

impl CloudFrontInvalidator {
    pub fn new(client: aws_sdk_cloudfront::Client, distribution_id: String) -> Self {
        Self {
            client,
            distribution_id,
        }
    }
}

#[async_trait]
impl CacheInvalidator for CloudFrontInvalidator {
    async fn invalidate(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }

        // Caller reference must be unique per request; wall-clock seconds
        // are unique at this pipeline's cadence.
        let caller_reference = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| VitalsError::Invalidation(e.to_string()))?
            .as_secs_f64()
            .to_string();

        let batch_paths = Paths::builder()
            .quantity(paths.len() as i32)
            .set_items(Some(paths.to_vec()))
            .build()
            .map_err(|e| VitalsError::Invalidation(e.to_string()))?;

        let batch = InvalidationBatch::builder()
            .paths(batch_paths)
            .caller_reference(caller_reference)
            .build()
            .map_err(|e| VitalsError::Invalidation(e.to_string()))?;

        self.client
            .create_invalidation()
            .distribution_id(&self.distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| VitalsError::Invalidation(e.to_string()))?;

        info!(
            distribution = %self.distribution_id,
            count = paths.len(),
            "Issued CDN invalidation"
        );

        Ok(())
    }
}

/// Records invalidated paths instead of calling out; used by tests and by
/// setups without a CDN distribution.
#[derive(Default)]
pub struct RecordingInvalidator {
    paths: Mutex<Vec<String>>,
}

impl RecordingInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidated(&self) -> Vec<String> {
        match self.paths.lock() {
            Ok(paths) => paths.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl CacheInvalidator for RecordingInvalidator {
    async fn invalidate(&self, paths: &[String]) -> Result<()> {
        let mut recorded = self
            .paths
            .lock()
            .map_err(|e| VitalsError::Invalidation(e.to_string()))?;
        recorded.extend(paths.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_invalidator_accumulates() {
        let invalidator = RecordingInvalidator::new();
        invalidator
            .invalidate(&["/static/data/ca/metadata.json".to_string()])
            .await
            .unwrap();
        invalidator
            .invalidate(&["/static/data/wa/metadata.json".to_string()])
            .await
            .unwrap();

        assert_eq!(
            invalidator.invalidated(),
            vec![
                "/static/data/ca/metadata.json".to_string(),
                "/static/data/wa/metadata.json".to_string()
            ]
        );
    }
}
