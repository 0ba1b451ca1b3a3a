//! Bulletin report archive.
//!
//! The bulletin source URL is overwritten in place by the publisher, so the
//! pipeline keeps its own archive of every release it has seen: the raw
//! document under a dated key, an `.md5` sidecar, and a parsed `.json`
//! cache next to each. [`ReportArchive::load`] rebuilds the full series
//! from the archive, [`ReportArchive::merge_latest`] folds in a freshly
//! fetched document when its fingerprint is new, and [`derive_reports`]
//! turns the merged series into the published artifact.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use vitals_common::{Result, VitalsError};

use crate::parsers::report::{archive_filename, ReportParser, ReportRecord};
use crate::storage::BlobStore;

const SECONDS_PER_DAY: i64 = 86_400;

/// One published report entry: the parsed record plus derived metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedReport {
    #[serde(flatten)]
    pub report: ReportRecord,
    /// Deaths per day over the span this release covers
    pub rolling_average: f64,
    pub cumulative_deaths: i64,
}

/// Archive of bulletin releases under one storage prefix.
pub struct ReportArchive {
    store: Arc<dyn BlobStore>,
    parser: Arc<dyn ReportParser>,
    prefix: String,
    archive_name_template: String,
    debug: bool,
    force_refresh: bool,
}

impl ReportArchive {
    pub fn new(
        store: Arc<dyn BlobStore>,
        parser: Arc<dyn ReportParser>,
        prefix: impl Into<String>,
        archive_name_template: impl Into<String>,
        debug: bool,
        force_refresh: bool,
    ) -> Self {
        Self {
            store,
            parser,
            prefix: prefix.into(),
            archive_name_template: archive_name_template.into(),
            debug,
            force_refresh,
        }
    }

    /// Rebuild the report series from every archived document, ordered by
    /// report date. Parses are cached in `.json` entries next to each
    /// document; `force_refresh` bypasses the cache.
    pub async fn load(&self) -> Result<Vec<ReportRecord>> {
        let mut records = Vec::new();
        for key in self.store.list(&self.prefix).await? {
            if !key.ends_with(".pdf") {
                continue;
            }
            records.push(self.load_one(&key).await?);
        }
        records.sort_by_key(|r| r.report_date);

        debug!(prefix = %self.prefix, reports = records.len(), "Loaded report archive");

        Ok(records)
    }

    async fn load_one(&self, key: &str) -> Result<ReportRecord> {
        let cache_key = cache_key_for(key);

        if !self.force_refresh {
            match self.store.get(&cache_key).await {
                Ok(cached) => return Ok(serde_json::from_slice(&cached)?),
                Err(e) if e.is_not_found() => {},
                Err(e) => return Err(e),
            }
        }

        let bytes = self.store.get(key).await?;
        let record = self.parser.parse(&bytes)?;

        if !self.debug {
            self.store
                .put(&cache_key, serde_json::to_vec(&record)?, "application/json")
                .await?;
        }

        Ok(record)
    }

    /// Fold a freshly fetched document into `records`. A document whose
    /// fingerprint is already present is a no-op, which makes repeated runs
    /// against an unchanged source idempotent.
    pub async fn merge_latest(
        &self,
        records: &mut Vec<ReportRecord>,
        bytes: &[u8],
    ) -> Result<()> {
        let latest = self.parser.parse(bytes)?;
        if records.iter().any(|r| r.report_md5 == latest.report_md5) {
            debug!(md5 = %latest.report_md5, "Latest report already archived");
            return Ok(());
        }

        info!(md5 = %latest.report_md5, report_date = latest.report_date, "Archiving new report");

        if !self.debug {
            self.archive(&latest, bytes).await?;
        }
        records.push(latest);
        records.sort_by_key(|r| r.report_date);
        Ok(())
    }

    async fn archive(&self, record: &ReportRecord, bytes: &[u8]) -> Result<()> {
        let name = archive_filename(&self.archive_name_template, record.report_date)?;
        let key = format!("{}/{}", self.prefix.trim_end_matches('/'), name);

        self.store.put(&key, bytes.to_vec(), "application/pdf").await?;
        self.store
            .put(
                &format!("{}.md5", key),
                record.report_md5.clone().into_bytes(),
                "text/plain",
            )
            .await?;
        self.store
            .put(&cache_key_for(&key), serde_json::to_vec(record)?, "application/json")
            .await?;
        Ok(())
    }
}

fn cache_key_for(pdf_key: &str) -> String {
    format!("{}.json", pdf_key.trim_end_matches(".pdf"))
}

/// Derive published metrics from an ordered report series.
///
/// Consecutive releases that cover the same end date are collapsed to the
/// later one (interior entries only; the first and last are always kept).
/// The first entry averages its deaths over the weeks its coverage window
/// spans; each later entry averages the death delta from its predecessor
/// over the days between their end dates, clamped at zero when the source
/// revises a figure downward.
pub fn derive_reports(records: &[ReportRecord]) -> Result<Vec<DerivedReport>> {
    let mut kept: Vec<&ReportRecord> = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        let interior = i > 0 && i < records.len() - 1;
        if interior && record.end_date == records[i + 1].end_date {
            continue;
        }
        kept.push(record);
    }

    let mut derived = Vec::with_capacity(kept.len());
    for (i, record) in kept.iter().enumerate() {
        let rolling_average = if i == 0 {
            let days = day_span(record.start_date, record.end_date)?;
            record.death_count as f64 / (days as f64 / 7.0)
        } else {
            let days = day_span(kept[i - 1].end_date, record.end_date)?;
            let delta = (record.death_count - kept[i - 1].death_count).max(0);
            delta as f64 / days as f64
        };

        derived.push(DerivedReport {
            report: (*record).clone(),
            rolling_average,
            cumulative_deaths: record.death_count,
        });
    }

    Ok(derived)
}

/// Whole days between two Pacific-midnight timestamps. Truncating division
/// absorbs the hour lost or gained across a DST transition.
fn day_span(start: i64, end: i64) -> Result<i64> {
    let days = (end - start) / SECONDS_PER_DAY;
    if days <= 0 {
        return Err(VitalsError::Parse(format!(
            "report coverage spans no full day ({} -> {})",
            start, end
        )));
    }
    Ok(days)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use vitals_common::fingerprint;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Maps document bytes to canned records, counting parses.
    struct StubParser {
        by_fingerprint: HashMap<String, ReportRecord>,
        parses: Mutex<usize>,
    }

    impl StubParser {
        fn new(records: Vec<(&[u8], ReportRecord)>) -> Self {
            Self {
                by_fingerprint: records
                    .into_iter()
                    .map(|(bytes, r)| (fingerprint::hex_md5(bytes), r))
                    .collect(),
                parses: Mutex::new(0),
            }
        }

        fn parse_count(&self) -> usize {
            *self.parses.lock().unwrap()
        }
    }

    impl ReportParser for StubParser {
        fn parse(&self, bytes: &[u8]) -> Result<ReportRecord> {
            *self.parses.lock().unwrap() += 1;
            self.by_fingerprint
                .get(&fingerprint::hex_md5(bytes))
                .cloned()
                .ok_or_else(|| VitalsError::Parse("unknown document".to_string()))
        }
    }

    fn record(report_date: i64, start: i64, end: i64, deaths: i64, md5: &str) -> ReportRecord {
        ReportRecord {
            report_date,
            start_date: start,
            end_date: end,
            case_count: deaths * 100,
            hospitalized_count: deaths * 2,
            death_count: deaths,
            report_md5: md5.to_string(),
        }
    }

    const DAY: i64 = 86_400;

    fn archive_with(
        parser: Arc<StubParser>,
        store: Arc<MemoryStore>,
        force_refresh: bool,
    ) -> ReportArchive {
        ReportArchive::new(
            store,
            parser,
            "static/reports/wa",
            "{date}-report.pdf",
            false,
            force_refresh,
        )
    }

    #[tokio::test]
    async fn test_merge_then_load_round_trips_through_cache() {
        let first = record(100 * DAY, 0, 14 * DAY, 14, "");
        let doc: &[u8] = b"release one";
        let expected = ReportRecord {
            report_md5: fingerprint::hex_md5(doc),
            ..first
        };
        let parser = Arc::new(StubParser::new(vec![(doc, expected.clone())]));
        let store = Arc::new(MemoryStore::new());
        let archive = archive_with(parser.clone(), store.clone(), false);

        let mut records = archive.load().await.unwrap();
        assert!(records.is_empty());

        archive.merge_latest(&mut records, doc).await.unwrap();
        assert_eq!(records, vec![expected.clone()]);
        // pdf + md5 sidecar + json cache
        assert_eq!(store.len(), 3);

        // Second merge of the same bytes is a no-op.
        archive.merge_latest(&mut records, doc).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(store.len(), 3);

        // A fresh load is served from the json cache, not the parser.
        let parses_before = parser.parse_count();
        let reloaded = archive.load().await.unwrap();
        assert_eq!(reloaded, vec![expected]);
        assert_eq!(parser.parse_count(), parses_before);
    }

    #[tokio::test]
    async fn test_force_refresh_reparses_archived_documents() {
        let doc: &[u8] = b"release one";
        let rec = record(100 * DAY, 0, 14 * DAY, 14, &fingerprint::hex_md5(doc));
        let parser = Arc::new(StubParser::new(vec![(doc, rec)]));
        let store = Arc::new(MemoryStore::new());

        let archive = archive_with(parser.clone(), store.clone(), false);
        let mut records = Vec::new();
        archive.merge_latest(&mut records, doc).await.unwrap();

        let refreshing = archive_with(parser.clone(), store, true);
        let parses_before = parser.parse_count();
        refreshing.load().await.unwrap();
        assert_eq!(parser.parse_count(), parses_before + 1);
    }

    #[test]
    fn test_derive_first_entry_averages_over_weeks() {
        let records = vec![record(100 * DAY, 0, 14 * DAY, 14, "a")];
        let derived = derive_reports(&records).unwrap();

        assert_eq!(derived.len(), 1);
        // 14 deaths over 2 weeks.
        assert!((derived[0].rolling_average - 7.0).abs() < 1e-9);
        assert_eq!(derived[0].cumulative_deaths, 14);
    }

    #[test]
    fn test_derive_later_entries_average_delta_per_day() {
        let records = vec![
            record(100 * DAY, 0, 14 * DAY, 14, "a"),
            record(107 * DAY, 0, 21 * DAY, 28, "b"),
        ];
        let derived = derive_reports(&records).unwrap();

        // (28 - 14) deaths over 7 days.
        assert!((derived[1].rolling_average - 2.0).abs() < 1e-9);
        assert_eq!(derived[1].cumulative_deaths, 28);
    }

    #[test]
    fn test_derive_clamps_downward_revisions() {
        let records = vec![
            record(100 * DAY, 0, 14 * DAY, 14, "a"),
            record(107 * DAY, 0, 21 * DAY, 10, "b"),
        ];
        let derived = derive_reports(&records).unwrap();

        assert_eq!(derived[1].rolling_average, 0.0);
        assert_eq!(derived[1].cumulative_deaths, 10);
    }

    #[test]
    fn test_derive_collapses_interior_duplicate_end_dates() {
        let records = vec![
            record(100 * DAY, 0, 14 * DAY, 14, "a"),
            record(103 * DAY, 0, 21 * DAY, 20, "b"),
            record(107 * DAY, 0, 21 * DAY, 28, "c"),
        ];
        let derived = derive_reports(&records).unwrap();

        assert_eq!(derived.len(), 2);
        assert_eq!(derived[1].report.report_md5, "c");
    }

    #[test]
    fn test_derive_zero_day_span_is_fatal() {
        let records = vec![
            record(100 * DAY, 0, 14 * DAY, 14, "a"),
            record(101 * DAY, 0, 14 * DAY + 60, 15, "b"),
        ];
        assert!(derive_reports(&records).is_err());
    }
}
