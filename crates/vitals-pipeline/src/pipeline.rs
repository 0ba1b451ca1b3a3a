//! Pipeline orchestration.
//!
//! One run walks the configured regions in order. For each region it loads
//! the metadata document, refreshes every declared series from its source,
//! and, when a series carries newer data than the metadata records,
//! publishes a content-addressed artifact, rewrites the metadata, and
//! invalidates the CDN path. Debug runs go through the full fetch/parse/
//! derive path but never write or invalidate.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vitals_common::{fingerprint, Result, VitalsError};

use crate::config::PublishConfig;
use crate::detect::is_newer;
use crate::fetch::Fetcher;
use crate::metadata::RegionMetadata;
use crate::notify::CacheInvalidator;
use crate::parsers::{delimited, spreadsheet, BulletinParser};
use crate::regions::{RegionConfig, SeriesSource};
use crate::reports::{derive_reports, ReportArchive};
use crate::series::{self, DailyRecord};
use crate::storage::BlobStore;

/// Series names every metadata document tracks.
const SERIES_NAMES: [&str; 2] = ["epi", "breakthrough"];

/// How many trailing records a debug run prints per series.
const DEBUG_TAIL: usize = 25;

/// Outcome of one pipeline run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub regions_run: usize,
    pub regions_updated: usize,
}

/// A refreshed series, ready to compare against recorded state.
struct SeriesRefresh {
    /// Maximum source timestamp in the series
    update_time: i64,
    /// Serialized artifact body
    body: Vec<u8>,
    /// JSON preview of the trailing records, for debug runs
    tail: String,
}

pub struct Pipeline {
    store: Arc<dyn BlobStore>,
    invalidator: Arc<dyn CacheInvalidator>,
    fetcher: Fetcher,
    publish: PublishConfig,
    debug: bool,
    force_refresh: bool,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Run every region in order, stopping at the first failure.
    pub async fn run(&self, regions: &[RegionConfig]) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for region in regions {
            summary.regions_run += 1;
            if self.run_region(region).await? {
                summary.regions_updated += 1;
            }
        }
        info!(
            regions = summary.regions_run,
            updated = summary.regions_updated,
            "Pipeline run complete"
        );
        Ok(summary)
    }

    /// Refresh one region. Returns whether anything was published.
    pub async fn run_region(&self, region: &RegionConfig) -> Result<bool> {
        info!(region = region.slug, "Refreshing region");

        let metadata_key = self.publish.metadata_key(region.slug);
        let mut metadata = self.load_metadata(&metadata_key).await?;
        metadata.state_label = Some(region.state_label.to_string());
        metadata.human_label = Some(region.human_label.to_string());

        let mut updated = false;
        let sources = [("epi", &region.epi), ("breakthrough", &region.breakthrough)];
        for (name, source) in sources {
            let Some(source) = source else {
                debug!(region = region.slug, series = name, "No source configured");
                continue;
            };

            let refresh = self.refresh_source(region, source).await?;
            if self.debug {
                info!(
                    region = region.slug,
                    series = name,
                    update_time = refresh.update_time,
                    tail = %refresh.tail,
                    "Debug series preview"
                );
            }

            let recorded = metadata.series_state(name).update_time;
            if !is_newer(refresh.update_time, recorded, self.force_refresh, self.debug) {
                debug!(
                    region = region.slug,
                    series = name,
                    update_time = refresh.update_time,
                    recorded,
                    "Series unchanged"
                );
                continue;
            }

            let url = self.publish_artifact(region.slug, name, &refresh.body).await?;
            metadata.record_publication(name, refresh.update_time, url);
            updated = true;
        }

        if updated && !self.debug {
            self.store
                .put(&metadata_key, serde_json::to_vec(&metadata)?, "application/json")
                .await?;
            self.invalidator
                .invalidate(&[format!("/{}", metadata_key)])
                .await?;
            info!(region = region.slug, "Published metadata and invalidated CDN path");
        }

        Ok(updated)
    }

    async fn load_metadata(&self, key: &str) -> Result<RegionMetadata> {
        match self.store.get(key).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.is_not_found() => {
                info!(key, "No metadata document; starting from defaults");
                Ok(RegionMetadata::with_defaults(&SERIES_NAMES))
            },
            Err(e) => Err(e),
        }
    }

    async fn refresh_source(
        &self,
        region: &RegionConfig,
        source: &SeriesSource,
    ) -> Result<SeriesRefresh> {
        match source {
            SeriesSource::Delimited(config) => {
                let bytes = self.fetcher.fetch(&config.url).await?;
                self.refresh_daily(delimited::parse(config, &bytes)?)
            },
            SeriesSource::Spreadsheet(config) => {
                let bytes = self.fetcher.fetch(&config.url).await?;
                let records = spreadsheet::parse(config, &bytes)?;
                self.archive_raw_series(region.slug, &records).await?;
                self.refresh_daily(records)
            },
            SeriesSource::Report(config) => {
                let parser = BulletinParser::new(config)?;
                let archive = ReportArchive::new(
                    self.store.clone(),
                    Arc::new(parser),
                    self.publish.report_prefix(region.slug),
                    config.archive_name_template.clone(),
                    self.debug,
                    self.force_refresh,
                );

                let mut records = archive.load().await?;
                let latest = self.fetcher.fetch(&config.url).await?;
                archive.merge_latest(&mut records, &latest).await?;

                let update_time = records
                    .last()
                    .map(|r| r.report_date)
                    .ok_or_else(|| VitalsError::Parse("report archive is empty".to_string()))?;
                let derived = derive_reports(&records)?;
                render(update_time, &derived)
            },
        }
    }

    /// Archive the raw parsed series under a content-addressed snapshot
    /// key with an `.md5` sidecar. A snapshot whose key already exists is
    /// left alone, so unchanged source data costs one existence check.
    async fn archive_raw_series(&self, region: &str, records: &[DailyRecord]) -> Result<()> {
        if self.debug {
            return Ok(());
        }

        let body = serde_json::to_vec(records)?;
        let md5 = fingerprint::hex_md5(&body);
        let key = self.publish.epi_snapshot_key(region, &md5);

        match self.store.get(&key).await {
            Ok(_) => {
                debug!(key, "Raw series snapshot already archived");
                return Ok(());
            },
            Err(e) if e.is_not_found() => {},
            Err(e) => return Err(e),
        }

        self.store.put(&key, body, "application/json").await?;
        self.store
            .put(&format!("{}.md5", key), md5.into_bytes(), "text/plain")
            .await?;
        info!(key, "Archived raw series snapshot");
        Ok(())
    }

    fn refresh_daily(&self, records: Vec<DailyRecord>) -> Result<SeriesRefresh> {
        let update_time = series::latest_date(&records)
            .ok_or_else(|| VitalsError::Parse("source yielded no records".to_string()))?;
        render(update_time, &series::derive(&records))
    }

    /// Content-addressed artifact write. Debug runs skip the write but
    /// still report the URL the artifact would have.
    async fn publish_artifact(&self, region: &str, name: &str, body: &[u8]) -> Result<String> {
        let key = self
            .publish
            .series_key(region, name, &fingerprint::hex_md5(body));

        if self.debug {
            warn!(key, "Debug run; skipping artifact write");
        } else {
            self.store.put(&key, body.to_vec(), "application/json").await?;
            info!(key, bytes = body.len(), "Published artifact");
        }

        Ok(self.publish.public_url(&key))
    }
}

fn render<T: Serialize>(update_time: i64, records: &[T]) -> Result<SeriesRefresh> {
    let body = serde_json::to_vec(records)?;
    let tail_start = records.len().saturating_sub(DEBUG_TAIL);
    let tail = serde_json::to_string(&records[tail_start..])?;
    Ok(SeriesRefresh {
        update_time,
        body,
        tail,
    })
}

/// Builder for [`Pipeline`]. Store, invalidator, and publish configuration
/// are required; the fetcher defaults to a 120s timeout with 3 attempts.
#[derive(Default)]
pub struct PipelineBuilder {
    store: Option<Arc<dyn BlobStore>>,
    invalidator: Option<Arc<dyn CacheInvalidator>>,
    fetcher: Option<Fetcher>,
    publish: Option<PublishConfig>,
    debug: bool,
    force_refresh: bool,
}

impl PipelineBuilder {
    pub fn store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn invalidator(mut self, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        self.invalidator = Some(invalidator);
        self
    }

    pub fn fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn publish(mut self, publish: PublishConfig) -> Self {
        self.publish = Some(publish);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let store = self
            .store
            .ok_or_else(|| VitalsError::Config("pipeline requires a blob store".to_string()))?;
        let invalidator = self.invalidator.ok_or_else(|| {
            VitalsError::Config("pipeline requires a cache invalidator".to_string())
        })?;
        let publish = self.publish.ok_or_else(|| {
            VitalsError::Config("pipeline requires publish configuration".to_string())
        })?;
        publish.validate()?;
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Fetcher::new(120, 3)?,
        };

        Ok(Pipeline {
            store,
            invalidator,
            fetcher,
            publish,
            debug: self.debug,
            force_refresh: self.force_refresh,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingInvalidator;
    use crate::storage::MemoryStore;

    fn publish_config() -> PublishConfig {
        PublishConfig {
            bucket: "vitals".to_string(),
            public_base_url: "https://vitals.example.org".to_string(),
            distribution_id: None,
        }
    }

    #[test]
    fn test_builder_requires_store() {
        let result = Pipeline::builder()
            .invalidator(Arc::new(RecordingInvalidator::new()))
            .publish(publish_config())
            .build();
        assert!(matches!(result, Err(VitalsError::Config(_))));
    }

    #[test]
    fn test_builder_requires_publish_config() {
        let result = Pipeline::builder()
            .store(Arc::new(MemoryStore::new()))
            .invalidator(Arc::new(RecordingInvalidator::new()))
            .build();
        assert!(matches!(result, Err(VitalsError::Config(_))));
    }

    #[tokio::test]
    async fn test_raw_series_snapshot_archived_once() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::builder()
            .store(store.clone())
            .invalidator(Arc::new(RecordingInvalidator::new()))
            .publish(publish_config())
            .build()
            .unwrap();
        let records = vec![
            DailyRecord { date: 1_640_995_200, deaths: 3 },
            DailyRecord { date: 1_641_081_600, deaths: 7 },
        ];

        pipeline.archive_raw_series("wa", &records).await.unwrap();
        // snapshot + md5 sidecar
        assert_eq!(store.len(), 2);
        let keys = store.list("static/epi/wa/").await.unwrap();
        assert!(keys[0].starts_with("static/epi/wa/epi_deaths_data."));
        assert!(keys.iter().any(|k| k.ends_with(".json.md5")));

        // Re-archiving identical content is an existence check, not a write.
        pipeline.archive_raw_series("wa", &records).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_debug_skips_raw_series_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::builder()
            .store(store.clone())
            .invalidator(Arc::new(RecordingInvalidator::new()))
            .publish(publish_config())
            .debug(true)
            .build()
            .unwrap();

        let records = vec![DailyRecord { date: 1_640_995_200, deaths: 3 }];
        pipeline.archive_raw_series("wa", &records).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_region_without_sources_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let invalidator = Arc::new(RecordingInvalidator::new());
        let pipeline = Pipeline::builder()
            .store(store.clone())
            .invalidator(invalidator.clone())
            .publish(publish_config())
            .build()
            .unwrap();

        let updated = pipeline.run_region(&crate::regions::oregon()).await.unwrap();

        assert!(!updated);
        assert!(store.is_empty());
        assert!(invalidator.invalidated().is_empty());
    }
}
