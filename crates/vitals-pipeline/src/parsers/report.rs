//! PDF bulletin parser.
//!
//! Breakthrough statistics arrive as a prose bulletin published at a fixed
//! URL that is overwritten in place on each release. The parser extracts
//! the text layer and pulls the figures out with per-field regexes; a field
//! that stops matching raises [`VitalsError::PatternMismatch`] naming the
//! pattern, so a template change in the source document fails loudly
//! instead of publishing partial numbers.

use chrono::TimeZone;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vitals_common::{fingerprint, Result, VitalsError};

use super::{parse_long_date, REFERENCE_TZ};

/// Configuration for one bulletin series source. The pattern strings are
/// compiled once by [`BulletinParser::new`].
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Upstream document URL (overwritten in place on each release)
    pub url: String,

    /// Archive filename template; `{date}` expands to the report date as
    /// `YYYY-MM-DD`
    pub archive_name_template: String,

    /// Bulletin release date ("January 5, 2022")
    pub report_date_pattern: String,

    /// Coverage range; two written-out dates
    pub coverage_pattern: String,

    /// Total case count, possibly comma-grouped
    pub case_count_pattern: String,

    /// Hospitalized share as a whole percentage
    pub hospitalized_pct_pattern: String,

    /// Death count as an absolute figure
    pub death_count_pattern: String,

    /// Death share as a percentage; fallback for releases that only state
    /// the share
    pub death_pct_pattern: String,
}

/// One parsed bulletin. Dates are epoch seconds at Pacific midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub report_date: i64,
    pub start_date: i64,
    pub end_date: i64,
    pub case_count: i64,
    pub hospitalized_count: i64,
    pub death_count: i64,
    /// Hex MD5 of the source document, used for change detection
    pub report_md5: String,
}

/// Turns raw bulletin bytes into a [`ReportRecord`]. The seam exists so the
/// archive logic can be exercised without real PDF fixtures.
pub trait ReportParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<ReportRecord>;
}

/// Regex-driven parser for the production bulletin template.
pub struct BulletinParser {
    report_date: Regex,
    coverage: Regex,
    case_count: Regex,
    hospitalized_pct: Regex,
    death_count: Regex,
    death_pct: Regex,
}

impl BulletinParser {
    pub fn new(config: &ReportConfig) -> Result<Self> {
        Ok(Self {
            report_date: compile(&config.report_date_pattern)?,
            coverage: compile(&config.coverage_pattern)?,
            case_count: compile(&config.case_count_pattern)?,
            hospitalized_pct: compile(&config.hospitalized_pct_pattern)?,
            death_count: compile(&config.death_count_pattern)?,
            death_pct: compile(&config.death_pct_pattern)?,
        })
    }

    /// Extract figures from already-extracted bulletin text. Newlines must
    /// have been flattened first.
    pub fn parse_text(&self, text: &str, report_md5: String) -> Result<ReportRecord> {
        let coverage = self
            .coverage
            .captures(text)
            .ok_or_else(|| VitalsError::PatternMismatch {
                pattern: self.coverage.as_str().to_string(),
            })?;
        let start_date = parse_long_date(group(&coverage, 1)?)?;
        let end_date = parse_long_date(group(&coverage, 2)?)?;

        let report_date = parse_long_date(capture(&self.report_date, text)?)?;

        let case_count: i64 = capture(&self.case_count, text)?.replace(',', "").parse()?;

        let hospitalized_pct: i64 = capture(&self.hospitalized_pct, text)?.parse()?;
        let hospitalized_count = (case_count as f64 * hospitalized_pct as f64 / 100.0).floor() as i64;

        // Some releases state an absolute death figure, others only a share.
        let death_count = match self.death_count.captures(text) {
            Some(c) => group(&c, 1)?.parse()?,
            None => {
                let death_pct: f64 = capture(&self.death_pct, text)?.parse()?;
                (case_count as f64 * death_pct / 100.0).floor() as i64
            },
        };

        debug!(report_date, case_count, death_count, "Parsed bulletin");

        Ok(ReportRecord {
            report_date,
            start_date,
            end_date,
            case_count,
            hospitalized_count,
            death_count,
            report_md5,
        })
    }
}

impl ReportParser for BulletinParser {
    fn parse(&self, bytes: &[u8]) -> Result<ReportRecord> {
        let report_md5 = fingerprint::hex_md5(bytes);
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| VitalsError::Parse(format!("pdf text extraction: {}", e)))?;
        // Line breaks become spaces; the patterns rely on whitespace
        // between tokens.
        self.parse_text(&text.replace('\n', " "), report_md5)
    }
}

/// Archive filename for a bulletin released on `report_date`.
pub fn archive_filename(template: &str, report_date: i64) -> Result<String> {
    let date = REFERENCE_TZ
        .timestamp_opt(report_date, 0)
        .single()
        .ok_or_else(|| VitalsError::Parse(format!("bad report timestamp {}", report_date)))?;
    Ok(template.replace("{date}", &date.format("%Y-%m-%d").to_string()))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| VitalsError::Config(format!("bad pattern {:?}: {}", pattern, e)))
}

fn capture<'t>(re: &Regex, text: &'t str) -> Result<&'t str> {
    let captures = re.captures(text).ok_or_else(|| VitalsError::PatternMismatch {
        pattern: re.as_str().to_string(),
    })?;
    group(&captures, 1)
}

fn group<'t>(captures: &regex::Captures<'t>, index: usize) -> Result<&'t str> {
    captures
        .get(index)
        .map(|m| m.as_str())
        .ok_or_else(|| VitalsError::Parse(format!("pattern has no group {}", index)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions;

    fn parser() -> BulletinParser {
        let config = regions::washington()
            .breakthrough_report()
            .expect("washington has a bulletin source");
        BulletinParser::new(&config).unwrap()
    }

    const BULLETIN: &str = "Washington State Department of Health  February 2, 2022 \
        COVID-19 Vaccine Breakthrough Surveillance At a Glance (data from \
        January 17, 2021 - January 22, 2022 ) A total of 102,804 SARS-CoV-2 \
        vaccine breakthrough cases have been identified in Washington. \
        Of those cases, 2% were hospitalized and 751 people died of \
        COVID-related illness.";

    #[test]
    fn test_parse_text_extracts_all_fields() {
        let record = parser().parse_text(BULLETIN, "abc123".to_string()).unwrap();

        assert_eq!(record.case_count, 102_804);
        assert_eq!(record.death_count, 751);
        assert_eq!(record.hospitalized_count, 2_056);
        assert_eq!(record.report_md5, "abc123");
        assert_eq!(
            record.report_date,
            crate::parsers::parse_ymd("2022-02-02").unwrap()
        );
        assert_eq!(
            record.start_date,
            crate::parsers::parse_ymd("2021-01-17").unwrap()
        );
        assert_eq!(
            record.end_date,
            crate::parsers::parse_ymd("2022-01-22").unwrap()
        );
    }

    #[test]
    fn test_line_broken_text_flattens_to_matchable_form() {
        // Text extraction breaks lines mid-sentence; flattening joins them
        // with a space so the whitespace-delimited patterns still match.
        // Joining with the empty string would fuse "102,804" into the word
        // before it and break the case-count match.
        let broken = BULLETIN.replace("A total of 102,804 SARS-CoV-2", "A total of\n102,804\nSARS-CoV-2");
        let record = parser()
            .parse_text(&broken.replace('\n', " "), "abc123".to_string())
            .unwrap();
        assert_eq!(record.case_count, 102_804);
    }

    #[test]
    fn test_death_percentage_fallback() {
        let text = BULLETIN.replace(
            "751 people died of COVID-related illness",
            "0.8% died of COVID-related illness",
        );
        let record = parser().parse_text(&text, "abc123".to_string()).unwrap();

        // floor(102804 * 0.8 / 100)
        assert_eq!(record.death_count, 822);
    }

    #[test]
    fn test_mismatch_names_the_pattern() {
        let text = BULLETIN.replace("At a Glance", "Summary");
        let err = parser().parse_text(&text, "abc123".to_string()).unwrap_err();

        match err {
            VitalsError::PatternMismatch { pattern } => {
                assert!(pattern.contains("At a Glance"));
            },
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_archive_filename() {
        let report_date = crate::parsers::parse_ymd("2022-02-02").unwrap();
        let name =
            archive_filename("{date}-420-339-VaccineBreakthroughReport.pdf", report_date).unwrap();
        assert_eq!(name, "2022-02-02-420-339-VaccineBreakthroughReport.pdf");
    }

    #[test]
    fn test_bad_pattern_is_a_config_error() {
        let mut config = regions::washington()
            .breakthrough_report()
            .expect("washington has a bulletin source");
        config.case_count_pattern = "([unclosed".to_string();
        assert!(matches!(
            BulletinParser::new(&config),
            Err(VitalsError::Config(_))
        ));
    }
}
