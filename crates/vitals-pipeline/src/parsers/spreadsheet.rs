//! Spreadsheet (xlsx) source parser.
//!
//! An xlsx workbook is a zip of sheet XML; the worksheet is located through
//! `xl/workbook.xml` and its relationships, then streamed with quick-xml.
//!
//! The source workbook ships with broken dimension metadata (the declared
//! used range does not cover the data), so the declared `<dimension>` is
//! never trusted: cell positions come from each cell's `r` reference and
//! the used range is whatever the rows actually contain.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use tracing::debug;
use vitals_common::{Result, VitalsError};

use crate::series::DailyRecord;

/// Canonical field names the label map targets.
pub const FIELD_DATE: &str = "date";
pub const FIELD_DEATHS: &str = "deaths";

/// Configuration for one spreadsheet series source.
#[derive(Debug, Clone)]
pub struct SpreadsheetConfig {
    /// Upstream document URL
    pub url: String,

    /// Worksheet to read (e.g. "Deaths")
    pub worksheet: String,

    /// Source header label -> canonical field name; labels not listed are
    /// ignored
    pub label_map: Vec<(String, String)>,

    /// Keep only rows where this canonical field holds this value
    /// (e.g. `county == "Statewide"`)
    pub row_filter: Option<(String, String)>,
}

/// Parse an xlsx workbook into an ordered daily series.
pub fn parse(config: &SpreadsheetConfig, bytes: &[u8]) -> Result<Vec<DailyRecord>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| VitalsError::Parse(format!("bad xlsx archive: {}", e)))?;

    let sheet_path = locate_worksheet(&mut archive, &config.worksheet)?;
    let shared = read_shared_strings(&mut archive)?;
    let rows = read_rows(&read_entry(&mut archive, &sheet_path)?, &shared)?;

    rows_to_records(config, &rows)
}

fn read_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| VitalsError::Parse(format!("xlsx entry {}: {}", name, e)))?;
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|e| VitalsError::Parse(format!("xlsx entry {}: {}", name, e)))?;
    Ok(content)
}

/// Resolve a worksheet name to its zip entry path via the workbook's sheet
/// list and relationship targets.
fn locate_worksheet(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    worksheet: &str,
) -> Result<String> {
    let workbook = read_entry(archive, "xl/workbook.xml")?;
    let rels = read_entry(archive, "xl/_rels/workbook.xml.rels")?;

    let mut sheet_rel: Option<String> = None;
    let mut reader = Reader::from_str(&workbook);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"sheet" => {
                let name = attribute(&e, "name")?;
                if name.as_deref() == Some(worksheet) {
                    sheet_rel = attribute(&e, "r:id")?;
                    break;
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(VitalsError::Parse(format!("workbook xml: {}", e))),
            _ => {},
        }
    }
    let sheet_rel = sheet_rel.ok_or_else(|| {
        VitalsError::Parse(format!("workbook has no worksheet named {:?}", worksheet))
    })?;

    let mut reader = Reader::from_str(&rels);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"Relationship" => {
                if attribute(&e, "Id")?.as_deref() == Some(sheet_rel.as_str()) {
                    let target = attribute(&e, "Target")?.ok_or_else(|| {
                        VitalsError::Parse("relationship without target".to_string())
                    })?;
                    return Ok(match target.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{}", target),
                    });
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(VitalsError::Parse(format!("workbook rels: {}", e))),
            _ => {},
        }
    }

    Err(VitalsError::Parse(format!(
        "no relationship target for worksheet {:?}",
        worksheet
    )))
}

/// The shared-strings table; absent in workbooks with no string cells.
fn read_shared_strings(archive: &mut zip::ZipArchive<Cursor<&[u8]>>) -> Result<Vec<String>> {
    let xml = match read_entry(archive, "xl/sharedStrings.xml") {
        Ok(xml) => xml,
        Err(_) => return Ok(Vec::new()),
    };

    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut in_t = false;

    let mut reader = Reader::from_str(&xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                },
                b"t" if in_si => in_t = true,
                _ => {},
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"si" => {
                    in_si = false;
                    strings.push(current.clone());
                },
                b"t" => in_t = false,
                _ => {},
            },
            Ok(Event::Text(t)) if in_t => {
                current.push_str(
                    &t.unescape()
                        .map_err(|e| VitalsError::Parse(format!("shared strings: {}", e)))?,
                );
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(VitalsError::Parse(format!("shared strings: {}", e))),
            _ => {},
        }
    }

    Ok(strings)
}

/// Stream the worksheet rows, placing cells by their `r` reference. The
/// declared `<dimension>` element is deliberately ignored.
fn read_rows(sheet_xml: &str, shared: &[String]) -> Result<Vec<Vec<Option<String>>>> {
    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    let mut current_row: Vec<Option<String>> = Vec::new();
    let mut cell_column: Option<usize> = None;
    let mut cell_type = String::new();
    let mut cell_value = String::new();
    let mut in_value = false;

    let mut reader = Reader::from_str(sheet_xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"c" => {
                let reference = attribute(&e, "r")?.ok_or_else(|| {
                    VitalsError::Parse("cell without reference".to_string())
                })?;
                cell_column = Some(column_index(&reference)?);
                cell_type = attribute(&e, "t")?.unwrap_or_else(|| "n".to_string());
                cell_value.clear();
            },
            Ok(Event::Start(e)) if matches!(e.name().as_ref(), b"v" | b"t") => {
                in_value = true;
            },
            Ok(Event::End(e)) if matches!(e.name().as_ref(), b"v" | b"t") => {
                in_value = false;
            },
            Ok(Event::Text(t)) if in_value => {
                cell_value.push_str(
                    &t.unescape()
                        .map_err(|e| VitalsError::Parse(format!("worksheet xml: {}", e)))?,
                );
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"c" => {
                    if let Some(column) = cell_column.take() {
                        let resolved = resolve_cell(&cell_type, &cell_value, shared)?;
                        if current_row.len() <= column {
                            current_row.resize(column + 1, None);
                        }
                        current_row[column] = resolved;
                    }
                },
                b"row" => {
                    rows.push(std::mem::take(&mut current_row));
                },
                _ => {},
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(VitalsError::Parse(format!("worksheet xml: {}", e))),
            _ => {},
        }
    }

    Ok(rows)
}

fn resolve_cell(cell_type: &str, raw: &str, shared: &[String]) -> Result<Option<String>> {
    if raw.is_empty() {
        return Ok(None);
    }
    match cell_type {
        "s" => {
            let index: usize = raw
                .trim()
                .parse()
                .map_err(|_| VitalsError::Parse(format!("bad shared string index {:?}", raw)))?;
            let value = shared.get(index).ok_or_else(|| {
                VitalsError::Parse(format!("shared string index {} out of range", index))
            })?;
            Ok(Some(value.clone()))
        },
        _ => Ok(Some(raw.to_string())),
    }
}

fn attribute(e: &quick_xml::events::BytesStart<'_>, name: &str) -> Result<Option<String>> {
    match e.try_get_attribute(name) {
        Ok(Some(a)) => {
            let value = a
                .unescape_value()
                .map_err(|e| VitalsError::Parse(format!("attribute {}: {}", name, e)))?;
            Ok(Some(value.into_owned()))
        },
        Ok(None) => Ok(None),
        Err(e) => Err(VitalsError::Parse(format!("attribute {}: {}", name, e))),
    }
}

/// 0-based column index from a cell reference like "BC23".
fn column_index(reference: &str) -> Result<usize> {
    let letters: String = reference.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    if letters.is_empty() {
        return Err(VitalsError::Parse(format!("bad cell reference {:?}", reference)));
    }
    let mut index = 0_usize;
    for c in letters.chars() {
        index = index * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    Ok(index - 1)
}

fn rows_to_records(
    config: &SpreadsheetConfig,
    rows: &[Vec<Option<String>>],
) -> Result<Vec<DailyRecord>> {
    let mut column_map: HashMap<&str, usize> = HashMap::new();
    let mut records = Vec::new();

    for row in rows {
        if row.iter().all(|c| c.is_none()) {
            continue;
        }

        if column_map.is_empty() {
            for (i, cell) in row.iter().enumerate() {
                let Some(label) = cell else { continue };
                if let Some((_, canonical)) =
                    config.label_map.iter().find(|(source, _)| source == label)
                {
                    column_map.insert(canonical.as_str(), i);
                }
            }
            for (_, canonical) in &config.label_map {
                if !column_map.contains_key(canonical.as_str()) {
                    return Err(VitalsError::Parse(format!(
                        "worksheet header is missing column for {:?}",
                        canonical
                    )));
                }
            }
            continue;
        }

        if let Some((field, value)) = &config.row_filter {
            let index = column_map.get(field.as_str()).copied();
            let matches = index
                .and_then(|i| row.get(i))
                .and_then(|c| c.as_deref())
                .is_some_and(|c| c == value);
            if !matches {
                continue;
            }
        }

        let date_cell = field_value(row, &column_map, FIELD_DATE)
            .ok_or_else(|| VitalsError::Parse("data row without a date cell".to_string()))?;
        let deaths_cell = field_value(row, &column_map, FIELD_DEATHS).unwrap_or("0");

        records.push(DailyRecord {
            date: parse_sheet_date(date_cell)?,
            deaths: parse_sheet_number(deaths_cell)?,
        });
    }

    if column_map.is_empty() {
        return Err(VitalsError::Parse("worksheet has no header row".to_string()));
    }

    debug!(records = records.len(), "Parsed spreadsheet series");

    Ok(records)
}

fn field_value<'a>(
    row: &'a [Option<String>],
    column_map: &HashMap<&str, usize>,
    field: &str,
) -> Option<&'a str> {
    column_map
        .get(field)
        .and_then(|&i| row.get(i))
        .and_then(|c| c.as_deref())
}

/// Date cells hold Excel serial day numbers (days since 1899-12-30);
/// exported workbooks occasionally carry ISO strings instead.
fn parse_sheet_date(value: &str) -> Result<i64> {
    let trimmed = value.trim();
    if let Ok(serial) = trimmed.parse::<f64>() {
        let days = serial.floor() as i64;
        let base = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)
            .ok_or_else(|| VitalsError::Parse("excel epoch".to_string()))?;
        let date = base
            .checked_add_signed(chrono::Duration::days(days))
            .ok_or_else(|| VitalsError::Parse(format!("serial date {} out of range", serial)))?;
        return super::local_midnight(date);
    }
    super::parse_ymd(trimmed)
}

fn parse_sheet_number(value: &str) -> Result<i64> {
    let parsed: f64 = value
        .trim()
        .parse()
        .map_err(|_| VitalsError::Parse(format!("bad numeric cell {:?}", value)))?;
    Ok(parsed as i64)
}

// ============================================================================
// Tests
// ============================================================================
