//! Source document parsers.
//!
//! One parser per source format, all producing the canonical record shapes:
//! delimited text and spreadsheets yield ordered
//! [`DailyRecord`](crate::series::DailyRecord) series, PDF bulletins yield
//! [`ReportRecord`](report::ReportRecord)s. Format mismatches are fatal:
//! these are hand-authored government documents with known but occasionally
//! shifting templates, and a silent partial result is worse than a loud
//! failure.

use chrono::{LocalResult, NaiveDate, TimeZone};
use chrono_tz::Tz;
use vitals_common::{Result, VitalsError};

pub mod delimited;
pub mod report;
pub mod spreadsheet;

pub use delimited::DelimitedConfig;
pub use report::{BulletinParser, ReportConfig, ReportParser, ReportRecord};
pub use spreadsheet::SpreadsheetConfig;

/// Reference timezone all source dates are normalized to.
pub const REFERENCE_TZ: Tz = chrono_tz::America::Los_Angeles;

/// Epoch seconds at local midnight of `date` in the reference timezone.
pub(crate) fn local_midnight(date: NaiveDate) -> Result<i64> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| VitalsError::Parse(format!("invalid date: {}", date)))?;

    match REFERENCE_TZ.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => Ok(dt.timestamp()),
        // Fall-back transition repeats the hour; take the first occurrence.
        LocalResult::Ambiguous(dt, _) => Ok(dt.timestamp()),
        LocalResult::None => Err(VitalsError::Parse(format!(
            "date {} does not exist in {}",
            date, REFERENCE_TZ
        ))),
    }
}

/// Parse a `YYYY-MM-DD` date cell to epoch seconds at Pacific midnight.
pub(crate) fn parse_ymd(value: &str) -> Result<i64> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| VitalsError::Parse(format!("bad date {:?}: {}", value, e)))?;
    local_midnight(date)
}

/// Parse a written-out bulletin date ("January 5, 2022") to epoch seconds
/// at Pacific midnight.
pub(crate) fn parse_long_date(value: &str) -> Result<i64> {
    let date = NaiveDate::parse_from_str(value.trim(), "%B %d, %Y")
        .map_err(|e| VitalsError::Parse(format!("bad report date {:?}: {}", value, e)))?;
    local_midnight(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ymd_is_pacific_midnight() {
        // 2022-01-01 00:00 PST == 2022-01-01 08:00 UTC
        assert_eq!(parse_ymd("2022-01-01").unwrap(), 1_640_995_200 + 8 * 3600);
    }

    #[test]
    fn test_parse_ymd_respects_dst() {
        // 2022-07-01 00:00 PDT == 07:00 UTC
        let july = parse_ymd("2022-07-01").unwrap();
        assert_eq!((july - 7 * 3600) % 86_400, 0);
    }

    #[test]
    fn test_parse_ymd_rejects_garbage() {
        assert!(parse_ymd("None").is_err());
        assert!(parse_ymd("01/02/2022").is_err());
    }

    #[test]
    fn test_parse_long_date() {
        assert_eq!(
            parse_long_date("January 1, 2022").unwrap(),
            parse_ymd("2022-01-01").unwrap()
        );
        assert_eq!(
            parse_long_date("March 7, 2022").unwrap(),
            parse_ymd("2022-03-07").unwrap()
        );
        assert!(parse_long_date("sometime in March").is_err());
    }
}
