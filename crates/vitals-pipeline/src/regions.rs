//! Per-region source catalogs.
//!
//! Each region pins its upstream document URLs, the shape of each document,
//! and the display labels stamped into published metadata. Everything here
//! is static configuration; the pipeline drives the same machinery over
//! whichever sources a region declares.

use crate::parsers::{DelimitedConfig, ReportConfig, SpreadsheetConfig};
use crate::parsers::spreadsheet::{FIELD_DATE, FIELD_DEATHS};

/// How one series is sourced.
#[derive(Debug, Clone)]
pub enum SeriesSource {
    /// Delimited text yielding a daily series
    Delimited(DelimitedConfig),
    /// Workbook worksheet yielding a daily series
    Spreadsheet(SpreadsheetConfig),
    /// Prose bulletin folded into the report archive
    Report(ReportConfig),
}

impl SeriesSource {
    pub fn url(&self) -> &str {
        match self {
            SeriesSource::Delimited(c) => &c.url,
            SeriesSource::Spreadsheet(c) => &c.url,
            SeriesSource::Report(c) => &c.url,
        }
    }
}

/// One region's sources and labels.
#[derive(Debug, Clone)]
pub struct RegionConfig {
    /// Short key used in storage paths ("ca", "wa", "or")
    pub slug: &'static str,
    pub state_label: &'static str,
    pub human_label: &'static str,
    /// Epidemiological death series; None leaves the series untouched
    pub epi: Option<SeriesSource>,
    /// Vaccine-breakthrough series; None leaves the series untouched
    pub breakthrough: Option<SeriesSource>,
}

impl RegionConfig {
    /// The bulletin configuration, when the breakthrough series is sourced
    /// from one.
    pub fn breakthrough_report(&self) -> Option<ReportConfig> {
        match &self.breakthrough {
            Some(SeriesSource::Report(c)) => Some(c.clone()),
            _ => None,
        }
    }
}

pub fn california() -> RegionConfig {
    RegionConfig {
        slug: "ca",
        state_label: "California",
        human_label: "Californians",
        epi: Some(SeriesSource::Delimited(DelimitedConfig {
            url: "https://data.chhs.ca.gov/dataset/f333528b-4d38-4814-bebb-12db1f10f535/resource/046cdd2b-31e5-4d34-9ed3-b48cdbc4be7a/download/covid19cases_test.csv".to_string(),
            date_column: "date".to_string(),
            metric_columns: vec!["reported_deaths".to_string()],
            area_filter: Some(("area".to_string(), "California".to_string())),
        })),
        breakthrough: Some(SeriesSource::Delimited(DelimitedConfig {
            url: "https://data.chhs.ca.gov/dataset/e39edc8e-9db1-40a7-9e87-89169401c3f5/resource/c5978614-6a23-450b-b637-171252052214/download/covid19postvaxstatewidestats.csv".to_string(),
            date_column: "date".to_string(),
            // Statewide-only file; no area filter needed
            metric_columns: vec!["vaccinated_deaths".to_string(), "boosted_deaths".to_string()],
            area_filter: None,
        })),
    }
}

pub fn washington() -> RegionConfig {
    RegionConfig {
        slug: "wa",
        state_label: "Washington",
        human_label: "Washingtonians",
        epi: Some(SeriesSource::Spreadsheet(SpreadsheetConfig {
            url: "https://doh.wa.gov/sites/default/files/legacy/Documents/1600/coronavirus/data-tables/EpiCurve_Count_Cases_Hospitalizations_Deaths.xlsx".to_string(),
            worksheet: "Deaths".to_string(),
            label_map: vec![
                ("Earliest Specimen Collection Date".to_string(), FIELD_DATE.to_string()),
                ("County".to_string(), "county".to_string()),
                ("Deaths".to_string(), FIELD_DEATHS.to_string()),
            ],
            row_filter: Some(("county".to_string(), "Statewide".to_string())),
        })),
        breakthrough: Some(SeriesSource::Report(ReportConfig {
            url: "https://doh.wa.gov/sites/default/files/2022-02/420-339-VaccineBreakthroughReport.pdf".to_string(),
            archive_name_template: "{date}-420-339-VaccineBreakthroughReport.pdf".to_string(),
            report_date_pattern: r"Washington State Department of Health\s{0,2}(\w+ \d{1,2}, \d{4})".to_string(),
            coverage_pattern: r"At a Glance \(\s?data from (\w+ \d{1,2}, \d{4})\s?-?\s?(\w+ \d{1,2}, \d{4})\s?\)".to_string(),
            case_count_pattern: r"\s([\d,]+)\s+SARS-CoV-2\s?vaccine\s?breakthrough\s?cases\s?have\s?been\s?identified".to_string(),
            hospitalized_pct_pattern: r"\s(\d{1,2})% were hospitalized".to_string(),
            death_count_pattern: r"\s(\d+) people died of COVID-related illness".to_string(),
            death_pct_pattern: r"\s([\d.]{1,3})% died of COVID-related illness".to_string(),
        })),
    }
}

/// Oregon publishes its bulletin in a layout the parser does not cover yet;
/// the region exists so its metadata carries labels, with no sources wired.
pub fn oregon() -> RegionConfig {
    RegionConfig {
        slug: "or",
        state_label: "Oregon",
        human_label: "Oregonians",
        epi: None,
        breakthrough: None,
    }
}

/// Every supported region, in run order.
pub fn all() -> Vec<RegionConfig> {
    vec![california(), washington(), oregon()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugs_are_unique() {
        let regions = all();
        let mut slugs: Vec<&str> = regions.iter().map(|r| r.slug).collect();
        slugs.sort_unstable();
        slugs.dedup();
        assert_eq!(slugs.len(), regions.len());
    }

    #[test]
    fn test_washington_bulletin_patterns_compile() {
        let config = washington().breakthrough_report().unwrap();
        assert!(crate::parsers::BulletinParser::new(&config).is_ok());
    }

    #[test]
    fn test_source_urls_are_absolute() {
        for region in all() {
            for source in [&region.epi, &region.breakthrough].into_iter().flatten() {
                assert!(source.url().starts_with("https://"), "{}", region.slug);
            }
        }
    }
}
