//! Publication configuration: bucket, public URL base, CDN distribution,
//! and the object-key layout for raw and processed artifacts.

use serde::{Deserialize, Serialize};
use vitals_common::{Result, VitalsError};

/// Where processed artifacts land and how they are addressed publicly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// S3 bucket all reads and writes go to
    pub bucket: String,

    /// Public base URL the CDN serves the bucket from
    /// (e.g. "https://vitals.example.org")
    pub public_base_url: String,

    /// CloudFront distribution to invalidate after metadata updates.
    /// None disables invalidation (local/MinIO setups).
    pub distribution_id: Option<String>,
}

impl PublishConfig {
    /// Build from `VITALS_S3_BUCKET`, `VITALS_PUBLIC_URL`, and
    /// `VITALS_CLOUDFRONT_DISTRIBUTION`.
    pub fn from_env() -> Result<Self> {
        let bucket = std::env::var("VITALS_S3_BUCKET")
            .map_err(|_| VitalsError::Config("VITALS_S3_BUCKET must be set".to_string()))?;
        let public_base_url = std::env::var("VITALS_PUBLIC_URL")
            .map_err(|_| VitalsError::Config("VITALS_PUBLIC_URL must be set".to_string()))?;
        let distribution_id = std::env::var("VITALS_CLOUDFRONT_DISTRIBUTION").ok();

        let config = Self {
            bucket,
            public_base_url,
            distribution_id,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(VitalsError::Config("bucket cannot be empty".to_string()));
        }
        if self.public_base_url.is_empty() {
            return Err(VitalsError::Config(
                "public base URL cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Prefix for a region's processed artifacts.
    pub fn processed_prefix(&self, region: &str) -> String {
        format!("static/data/{}", region)
    }

    /// Key of a region's metadata document.
    pub fn metadata_key(&self, region: &str) -> String {
        format!("{}/metadata.json", self.processed_prefix(region))
    }

    /// Content-addressed key for a processed series artifact.
    pub fn series_key(&self, region: &str, series: &str, md5: &str) -> String {
        format!("{}/{}_{}.json", self.processed_prefix(region), series, md5)
    }

    /// Prefix under which raw report documents (and their parse caches)
    /// are archived.
    pub fn report_prefix(&self, region: &str) -> String {
        format!("static/reports/{}/", region)
    }

    /// Content-addressed key for a raw parsed-series snapshot.
    pub fn epi_snapshot_key(&self, region: &str, md5: &str) -> String {
        format!("static/epi/{}/epi_deaths_data.{}.json", region, md5)
    }

    /// Public (CDN) URL for an object key.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PublishConfig {
        PublishConfig {
            bucket: "vitals-data".to_string(),
            public_base_url: "https://vitals.example.org/".to_string(),
            distribution_id: None,
        }
    }

    #[test]
    fn test_key_layout() {
        let c = config();
        assert_eq!(c.metadata_key("ca"), "static/data/ca/metadata.json");
        assert_eq!(
            c.series_key("ca", "epi", "abc123"),
            "static/data/ca/epi_abc123.json"
        );
        assert_eq!(c.report_prefix("wa"), "static/reports/wa/");
        assert_eq!(
            c.epi_snapshot_key("wa", "abc123"),
            "static/epi/wa/epi_deaths_data.abc123.json"
        );
    }

    #[test]
    fn test_public_url_trims_trailing_slash() {
        let c = config();
        assert_eq!(
            c.public_url("static/data/ca/metadata.json"),
            "https://vitals.example.org/static/data/ca/metadata.json"
        );
    }

    #[test]
    fn test_validate_rejects_empty_bucket() {
        let mut c = config();
        c.bucket.clear();
        assert!(c.validate().is_err());
    }
}
