//! Per-region publication metadata: the single source of truth for "is
//! there new data to publish".
//!
//! Stored as `static/data/{region}/metadata.json`. Created with zeroed
//! defaults on first run, read at the start of every pipeline run, and
//! rewritten (one atomic put) at the end of any run that published.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Publication state for one named series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SeriesState {
    /// Maximum source timestamp at the time of the last publication;
    /// zero means never published.
    pub update_time: i64,

    /// Public URL of the last published artifact.
    pub url: Option<String>,
}

/// A region's metadata document.
///
/// Series states serialize flattened at the top level alongside the display
/// labels, e.g. `{"epi": {...}, "breakthrough": {...}, "state_label": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RegionMetadata {
    #[serde(flatten)]
    pub series: BTreeMap<String, SeriesState>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_label: Option<String>,
}

impl RegionMetadata {
    /// First-run defaults for the given series names: update_time 0,
    /// no URL.
    pub fn with_defaults(series_names: &[&str]) -> Self {
        Self {
            series: series_names
                .iter()
                .map(|name| (name.to_string(), SeriesState::default()))
                .collect(),
            state_label: None,
            human_label: None,
        }
    }

    /// State for a series, defaulting if it has never been tracked (a new
    /// series added after the document was first written).
    pub fn series_state(&self, name: &str) -> SeriesState {
        self.series.get(name).cloned().unwrap_or_default()
    }

    /// Record a publication for a series.
    pub fn record_publication(&mut self, name: &str, update_time: i64, url: String) {
        let entry = self.series.entry(name.to_string()).or_default();
        entry.update_time = update_time;
        entry.url = Some(url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let meta = RegionMetadata::with_defaults(&["epi", "breakthrough"]);
        assert_eq!(meta.series_state("epi").update_time, 0);
        assert_eq!(meta.series_state("breakthrough").url, None);
        // Unknown series also default rather than erroring.
        assert_eq!(meta.series_state("wastewater").update_time, 0);
    }

    #[test]
    fn test_wire_format_flattens_series() {
        let mut meta = RegionMetadata::with_defaults(&["epi", "breakthrough"]);
        meta.state_label = Some("California".to_string());
        meta.human_label = Some("Californians".to_string());
        meta.record_publication(
            "epi",
            1_650_000_000,
            "https://vitals.example.org/static/data/ca/epi_abc.json".to_string(),
        );

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["epi"]["update_time"], 1_650_000_000);
        assert_eq!(json["breakthrough"]["update_time"], 0);
        assert_eq!(json["breakthrough"]["url"], serde_json::Value::Null);
        assert_eq!(json["state_label"], "California");

        let back: RegionMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }
}
