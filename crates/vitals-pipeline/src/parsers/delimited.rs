//! Delimited-text source parser.
//!
//! The first non-empty row is the header; a name-to-index map is built for
//! the configured expected columns and everything else is ignored. Rows
//! whose date cell is empty or the literal `"None"` carry metrics without a
//! date (the upstream publishes them so cumulative totals stay correct)
//! and are accumulated into one synthetic bucket that becomes the earliest
//! record (one day before the first dated record) iff its total is
//! non-zero.

use std::collections::HashMap;
use tracing::debug;
use vitals_common::{Result, VitalsError};

use crate::series::DailyRecord;

/// Configuration for one delimited-text series source.
#[derive(Debug, Clone)]
pub struct DelimitedConfig {
    /// Upstream document URL
    pub url: String,

    /// Header name of the date column
    pub date_column: String,

    /// Header names of the metric columns; a record's metric is their sum
    /// (e.g. vaccinated deaths + boosted deaths)
    pub metric_columns: Vec<String>,

    /// Keep only rows where this column holds this value
    /// (e.g. `area == "California"`); None keeps every row
    pub area_filter: Option<(String, String)>,
}

impl DelimitedConfig {
    fn expected_columns(&self) -> Vec<&str> {
        let mut columns = vec![self.date_column.as_str()];
        columns.extend(self.metric_columns.iter().map(|c| c.as_str()));
        if let Some((column, _)) = &self.area_filter {
            columns.push(column.as_str());
        }
        columns
    }
}

/// Parse delimited text into an ordered daily series.
pub fn parse(config: &DelimitedConfig, bytes: &[u8]) -> Result<Vec<DailyRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut column_map: HashMap<String, usize> = HashMap::new();
    let mut max_mapped_index = 0_usize;
    let mut records: Vec<DailyRecord> = Vec::new();
    let mut undated_total = 0_i64;

    for row in reader.records() {
        let row = row.map_err(|e| VitalsError::Parse(format!("bad delimited row: {}", e)))?;
        if row.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        if column_map.is_empty() {
            for (i, name) in row.iter().enumerate() {
                if config.expected_columns().contains(&name) {
                    column_map.insert(name.to_string(), i);
                }
            }
            for expected in config.expected_columns() {
                if !column_map.contains_key(expected) {
                    return Err(VitalsError::Parse(format!(
                        "header is missing expected column {:?}",
                        expected
                    )));
                }
            }
            max_mapped_index = column_map.values().copied().max().unwrap_or(0);
            continue;
        }

        // A row shorter than the mapped columns is corrupted input (e.g. a
        // truncated download), not a legitimately undated record.
        if row.len() <= max_mapped_index {
            return Err(VitalsError::Parse(format!(
                "row has {} fields but the header maps column index {}",
                row.len(),
                max_mapped_index
            )));
        }

        if let Some((column, value)) = &config.area_filter {
            if cell(&row, &column_map, column) != value.as_str() {
                continue;
            }
        }

        let metric: i64 = config
            .metric_columns
            .iter()
            .map(|name| parse_metric(cell(&row, &column_map, name)))
            .sum::<Result<i64>>()?;

        let date_cell = cell(&row, &column_map, &config.date_column);
        if date_cell.is_empty() || date_cell == "None" {
            undated_total += metric;
        } else {
            records.push(DailyRecord {
                date: super::parse_ymd(date_cell)?,
                deaths: metric,
            });
        }
    }

    attach_undated_bucket(&mut records, undated_total)?;

    debug!(
        records = records.len(),
        undated_total, "Parsed delimited series"
    );

    Ok(records)
}

fn cell<'a>(
    row: &'a csv::StringRecord,
    column_map: &HashMap<String, usize>,
    name: &str,
) -> &'a str {
    column_map
        .get(name)
        .and_then(|&i| row.get(i))
        .unwrap_or("")
        .trim()
}

/// Metric cells may be empty (zero) or decimal-formatted integers ("5.0").
fn parse_metric(value: &str) -> Result<i64> {
    if value.is_empty() {
        return Ok(0);
    }
    let parsed: f64 = value
        .parse()
        .map_err(|_| VitalsError::Parse(format!("bad metric value {:?}", value)))?;
    Ok(parsed as i64)
}

/// Attach the undated-total bucket as the earliest record, timestamped one
/// day before the first dated record; a zero bucket is dropped entirely.
fn attach_undated_bucket(records: &mut Vec<DailyRecord>, undated_total: i64) -> Result<()> {
    if undated_total == 0 {
        return Ok(());
    }
    let first_date = records
        .first()
        .map(|r| r.date)
        .ok_or_else(|| VitalsError::Parse("undated rows but no dated records".to_string()))?;
    records.insert(
        0,
        DailyRecord {
            date: first_date - 86_400,
            deaths: undated_total,
        },
    );
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
