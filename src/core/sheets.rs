//! Reading the CSV inputs (export and template sheets) and writing result sheets.

use crate::domain::model::{RawExport, Sheet, StandardDefinition, TemplateEntry};
use crate::utils::error::{AnalyzerError, Result};
use std::collections::HashMap;

pub const MAP_SHEET: &str = "MAP";

/// Instrument export: ion header row, column header row, then one row per injection.
pub fn parse_export(bytes: &[u8]) -> Result<RawExport> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cells: Vec<String> = record.iter().map(|cell| cell.trim().to_string()).collect();
        records.push(cells);
    }

    let mut records = records.into_iter();
    let ion_headers = records
        .next()
        .ok_or_else(|| AnalyzerError::data("the export is empty"))?;
    let headers = records
        .next()
        .ok_or_else(|| AnalyzerError::data("the export has no column header row"))?;

    // 略過空白列
    let rows: Vec<Vec<String>> = records
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect();

    tracing::debug!(
        "Export has {} columns and {} sample rows",
        headers.len(),
        rows.len()
    );

    Ok(RawExport {
        ion_headers,
        headers,
        rows,
    })
}

/// `MAP` sheet of the template. Unknown columns are kept in `extra`.
pub fn parse_map(bytes: &[u8]) -> Result<Vec<TemplateEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    for required in ["SampleID", "SampleName"] {
        if !headers.iter().any(|h| h == required) {
            return Err(AnalyzerError::template(
                MAP_SHEET,
                format!("missing column '{}'", required),
            ));
        }
    }

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut entry = TemplateEntry::default();
        let mut extra = HashMap::new();

        for (header, cell) in headers.iter().zip(record.iter()) {
            let cell = cell.trim();
            let value = (!cell.is_empty()).then(|| cell.to_string());
            match header.as_str() {
                "SampleID" => entry.sample_id = value,
                "SampleName" => entry.sample_name = value,
                "SampleWeight" => entry.sample_weight = value.and_then(|v| v.parse().ok()),
                "Comments" => entry.comments = value,
                _ => {
                    if let Some(value) = value {
                        extra.insert(header.clone(), value);
                    }
                }
            }
        }
        entry.extra = extra;
        entries.push(entry);
    }

    Ok(entries)
}

/// `STANDARD_*` sheet of the template.
pub fn parse_standards(sheet: &str, bytes: &[u8]) -> Result<Vec<StandardDefinition>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut standards = Vec::new();
    for row in reader.deserialize::<StandardDefinition>() {
        let standard = row.map_err(|e| AnalyzerError::template(sheet, e.to_string()))?;
        if standard.molecular_weight <= 0.0 {
            return Err(AnalyzerError::template(
                sheet,
                format!("MW of C{} must be positive", standard.chain),
            ));
        }
        standards.push(standard);
    }

    if standards.is_empty() {
        return Err(AnalyzerError::template(sheet, "no standards declared"));
    }
    Ok(standards)
}

pub fn write_sheet(sheet: &Sheet) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    writer.write_record(&sheet.header)?;
    for row in &sheet.rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| AnalyzerError::IoError(e.into_error()))
}

/// Numeric cell; empty or non-numeric cells are missing (NaN).
pub fn parse_number(cell: &str) -> f64 {
    cell.trim().parse::<f64>().unwrap_or(f64::NAN)
}
