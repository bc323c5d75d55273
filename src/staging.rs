//! Bulk property-record ingest into normalized staging rows.
//!
//! The importers are straight-line batch loops: parse a vendor CSV export,
//! normalize each row, and hand fixed-size batches to a [`StagingSink`]. The
//! sink is the boundary to the destination datastore, which stays external:
//! it is a keyed upsert with conflict-ignore semantics (the first row for a
//! key wins).

use crate::address::normalize_address;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;

pub const AVM_BATCH_SIZE: usize = 5_000;
pub const RECORDER_BATCH_SIZE: usize = 10_000;

/// Normalized valuation row from an AVM export.
#[derive(Debug, Clone, Serialize)]
pub struct AvmRow {
    pub attom_id: String,
    pub estimated_value: Option<f64>,
    pub estimated_min_value: Option<f64>,
    pub estimated_max_value: Option<f64>,
    pub confidence_score: Option<i64>,
    pub valuation_date: Option<NaiveDate>,
}

/// Normalized deed-recording row from a RECORDER export.
#[derive(Debug, Clone, Serialize)]
pub struct RecorderRow {
    pub attom_id: String,
    pub apn_formatted: Option<String>,
    pub property_address_full: String,
    pub property_city: Option<String>,
    pub property_zip: Option<String>,
    pub normalized_address: Option<String>,
}

/// Rows with an upsert key. Conflicting inserts for the same key are ignored
/// by the destination.
pub trait StagedRecord: Serialize {
    fn key(&self) -> &str;
}

impl StagedRecord for AvmRow {
    fn key(&self) -> &str {
        &self.attom_id
    }
}

impl StagedRecord for RecorderRow {
    fn key(&self) -> &str {
        &self.attom_id
    }
}

/// Destination boundary for normalized rows, fed in batches.
pub trait StagingSink<R> {
    fn accept_batch(&mut self, batch: Vec<R>) -> Result<()>;
}

/// In-memory sink modeling the datastore's conflict-ignore upsert.
#[derive(Default)]
pub struct MemorySink<R> {
    seen: BTreeSet<String>,
    pub rows: Vec<R>,
    pub batches: usize,
}

impl<R> MemorySink<R> {
    pub fn new() -> Self {
        Self {
            seen: BTreeSet::new(),
            rows: Vec::new(),
            batches: 0,
        }
    }
}

impl<R: StagedRecord> StagingSink<R> for MemorySink<R> {
    fn accept_batch(&mut self, batch: Vec<R>) -> Result<()> {
        self.batches += 1;
        for row in batch {
            if self.seen.insert(row.key().to_string()) {
                self.rows.push(row);
            }
        }
        Ok(())
    }
}

/// File sink: the normalized staging form as JSON lines.
pub struct JsonlSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write, R: Serialize> StagingSink<R> for JsonlSink<W> {
    fn accept_batch(&mut self, batch: Vec<R>) -> Result<()> {
        for row in batch {
            serde_json::to_writer(&mut self.writer, &row).context("serialize staging row")?;
            self.writer.write_all(b"\n").context("write staging row")?;
        }
        Ok(())
    }
}

/// Counts reported by an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// Import AVM valuation rows. Malformed rows are skipped, never fatal.
pub fn import_avm(path: &Path, sink: &mut dyn StagingSink<AvmRow>) -> Result<ImportSummary> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let trimmed = raw.strip_prefix('\u{feff}').unwrap_or(raw.as_str());
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(trimmed.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let column = |name: &str| headers.iter().position(|h| h == name);

    let Some(attom_idx) = column("[ATTOM ID]") else {
        bail!("AVM export is missing the [ATTOM ID] column");
    };
    let value_idx = column("EstimatedValue");
    let min_idx = column("EstimatedMinValue");
    let max_idx = column("EstimatedMaxValue");
    let confidence_idx = column("ConfidenceScore");
    let date_idx = column("ValuationDate");

    let mut summary = ImportSummary {
        imported: 0,
        skipped: 0,
    };
    let mut batch = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("parse {}", path.display()))?;
        let Some(attom_id) = record.get(attom_idx).filter(|id| !id.is_empty()) else {
            summary.skipped += 1;
            continue;
        };
        batch.push(AvmRow {
            attom_id: attom_id.to_string(),
            estimated_value: parse_field(&record, value_idx),
            estimated_min_value: parse_field(&record, min_idx),
            estimated_max_value: parse_field(&record, max_idx),
            confidence_score: parse_field(&record, confidence_idx),
            valuation_date: date_idx
                .and_then(|index| record.get(index))
                .and_then(|s| NaiveDate::parse_from_str(s, "%m/%d/%y").ok()),
        });
        summary.imported += 1;
        if batch.len() >= AVM_BATCH_SIZE {
            sink.accept_batch(std::mem::take(&mut batch))?;
        }
    }
    if !batch.is_empty() {
        sink.accept_batch(batch)?;
    }
    tracing::info!(
        imported = summary.imported,
        skipped = summary.skipped,
        "avm import complete"
    );
    Ok(summary)
}

/// Recorder exports vary their headers; columns are located by
/// case-insensitive substring. ATTOM id and address columns are required.
struct RecorderColumns {
    attom: usize,
    address: usize,
    city: Option<usize>,
    zip: Option<usize>,
    apn: Option<usize>,
}

fn locate_recorder_columns(headers: &[String]) -> Result<RecorderColumns> {
    let mut attom = None;
    let mut address = None;
    let mut city = None;
    let mut zip = None;
    let mut apn = None;
    for (index, header) in headers.iter().enumerate() {
        let lowered = header
            .to_lowercase()
            .trim_matches(|c| c == '[' || c == ']' || c == '"')
            .to_string();
        if lowered.contains("attom id") {
            attom.get_or_insert(index);
        } else if lowered.contains("propertyaddressfull") {
            address.get_or_insert(index);
        } else if lowered.contains("propertyaddresscity") {
            city.get_or_insert(index);
        } else if lowered.contains("propertyaddresszip") && !lowered.contains("zip4") {
            zip.get_or_insert(index);
        } else if lowered.contains("apnformatted") {
            apn.get_or_insert(index);
        }
    }
    let (Some(attom), Some(address)) = (attom, address) else {
        bail!("recorder export is missing the ATTOM id or address column");
    };
    Ok(RecorderColumns {
        attom,
        address,
        city,
        zip,
        apn,
    })
}

/// Import deed-recording rows, attaching a normalized full address for
/// cross-source matching.
pub fn import_recorder(
    path: &Path,
    sink: &mut dyn StagingSink<RecorderRow>,
) -> Result<ImportSummary> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let trimmed = raw.strip_prefix('\u{feff}').unwrap_or(raw.as_str());
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(trimmed.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let columns = locate_recorder_columns(&headers)?;

    let mut summary = ImportSummary {
        imported: 0,
        skipped: 0,
    };
    let mut batch = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("parse {}", path.display()))?;
        let attom_id = record.get(columns.attom).unwrap_or("").trim_matches('"');
        let address = record.get(columns.address).unwrap_or("").trim_matches('"');
        if attom_id.is_empty() || address.is_empty() {
            summary.skipped += 1;
            continue;
        }
        let city = optional_cell(&record, columns.city);
        let zip = optional_cell(&record, columns.zip);

        let mut full_address = address.to_string();
        if let Some(city) = &city {
            full_address = format!("{address} {city}");
        }
        if let Some(zip) = &zip {
            full_address = format!("{full_address} {zip}");
        }

        batch.push(RecorderRow {
            attom_id: attom_id.to_string(),
            apn_formatted: optional_cell(&record, columns.apn),
            property_address_full: address.to_string(),
            property_city: city,
            property_zip: zip,
            normalized_address: normalize_address(&full_address),
        });
        summary.imported += 1;
        if batch.len() >= RECORDER_BATCH_SIZE {
            sink.accept_batch(std::mem::take(&mut batch))?;
        }
    }
    if !batch.is_empty() {
        sink.accept_batch(batch)?;
    }
    tracing::info!(
        imported = summary.imported,
        skipped = summary.skipped,
        "recorder import complete"
    );
    Ok(summary)
}

fn parse_field<T: std::str::FromStr>(record: &csv::StringRecord, index: Option<usize>) -> Option<T> {
    record
        .get(index?)
        .filter(|cell| !cell.is_empty())
        .and_then(|cell| cell.parse().ok())
}

fn optional_cell(record: &csv::StringRecord, index: Option<usize>) -> Option<String> {
    record
        .get(index?)
        .map(|cell| cell.trim_matches('"'))
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn avm_rows_parse_values_and_dates() {
        let (_dir, path) = write_temp(
            "[ATTOM ID],EstimatedValue,EstimatedMinValue,EstimatedMaxValue,ConfidenceScore,ValuationDate\n\
             100001,350000.5,300000,400000,87,03/15/24\n\
             100002,,,,,\n",
        );
        let mut sink = MemorySink::new();
        let summary = import_avm(&path, &mut sink).unwrap();

        assert_eq!(summary, ImportSummary { imported: 2, skipped: 0 });
        let first = &sink.rows[0];
        assert_eq!(first.attom_id, "100001");
        assert_eq!(first.estimated_value, Some(350000.5));
        assert_eq!(first.confidence_score, Some(87));
        assert_eq!(
            first.valuation_date,
            Some(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
        );
        let second = &sink.rows[1];
        assert_eq!(second.estimated_value, None);
        assert_eq!(second.valuation_date, None);
    }

    #[test]
    fn avm_rows_without_an_id_are_skipped() {
        let (_dir, path) = write_temp(
            "[ATTOM ID],EstimatedValue\n,100\n100003,250000\n",
        );
        let mut sink = MemorySink::new();
        let summary = import_avm(&path, &mut sink).unwrap();
        assert_eq!(summary, ImportSummary { imported: 1, skipped: 1 });
    }

    #[test]
    fn avm_missing_id_column_is_fatal() {
        let (_dir, path) = write_temp("EstimatedValue\n100\n");
        let mut sink = MemorySink::new();
        assert!(import_avm(&path, &mut sink).is_err());
    }

    #[test]
    fn memory_sink_ignores_conflicting_keys() {
        let (_dir, path) = write_temp(
            "[ATTOM ID],EstimatedValue\n1,100\n1,999\n2,200\n",
        );
        let mut sink = MemorySink::new();
        import_avm(&path, &mut sink).unwrap();
        assert_eq!(sink.rows.len(), 2);
        // First row for the key wins.
        assert_eq!(sink.rows[0].estimated_value, Some(100.0));
    }

    #[test]
    fn batches_flush_at_the_batch_size_and_at_end_of_input() {
        let mut content = String::from("[ATTOM ID],EstimatedValue\n");
        for i in 0..AVM_BATCH_SIZE + 1 {
            content.push_str(&format!("{i},100\n"));
        }
        let (_dir, path) = write_temp(&content);
        let mut sink = MemorySink::new();
        let summary = import_avm(&path, &mut sink).unwrap();

        assert_eq!(summary.imported, AVM_BATCH_SIZE + 1);
        assert_eq!(sink.batches, 2);
        assert_eq!(sink.rows.len(), AVM_BATCH_SIZE + 1);
    }

    #[test]
    fn recorder_columns_found_by_substring() {
        let (_dir, path) = write_temp(
            "\"[ATTOM ID]\",APNFormatted,PropertyAddressFull,PropertyAddressCity,PropertyAddressZIP4,PropertyAddressZIP\n\
             200001,123-45,123 Main Street,Austin,1234,78701\n",
        );
        let mut sink = MemorySink::new();
        let summary = import_recorder(&path, &mut sink).unwrap();

        assert_eq!(summary.imported, 1);
        let row = &sink.rows[0];
        assert_eq!(row.attom_id, "200001");
        assert_eq!(row.apn_formatted.as_deref(), Some("123-45"));
        // ZIP4 column must not be mistaken for the zip column.
        assert_eq!(row.property_zip.as_deref(), Some("78701"));
        assert_eq!(
            row.normalized_address.as_deref(),
            Some("123 MAIN ST AUSTIN 78701")
        );
    }

    #[test]
    fn recorder_rows_missing_id_or_address_are_skipped() {
        let (_dir, path) = write_temp(
            "[ATTOM ID],PropertyAddressFull\n200001,\n,456 Oak Lane\n200002,789 Elm Drive\n",
        );
        let mut sink = MemorySink::new();
        let summary = import_recorder(&path, &mut sink).unwrap();
        assert_eq!(summary, ImportSummary { imported: 1, skipped: 2 });
    }

    #[test]
    fn recorder_missing_address_column_is_fatal() {
        let (_dir, path) = write_temp("[ATTOM ID],City\n1,Austin\n");
        let mut sink = MemorySink::new();
        assert!(import_recorder(&path, &mut sink).is_err());
    }

    #[test]
    fn jsonl_sink_writes_one_row_per_line() {
        let mut buffer = Vec::new();
        {
            let mut sink = JsonlSink::new(&mut buffer);
            sink.accept_batch(vec![
                RecorderRow {
                    attom_id: "1".into(),
                    apn_formatted: None,
                    property_address_full: "123 Main St".into(),
                    property_city: None,
                    property_zip: None,
                    normalized_address: Some("123 MAIN ST".into()),
                },
            ])
            .unwrap();
        }
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("\"attom_id\":\"1\""));
    }
}
