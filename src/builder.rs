//! Catalog construction: input parsing, dedup, the probe loop, and the two
//! output artifacts (registry JSON + flattened per-layer table).

use crate::fetch::Fetcher;
use crate::normalize::normalize_service_url;
use crate::probe::{Prober, ProbeStatus, ServiceResult};
use crate::util::truncate_string;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Header substrings that identify the URL column, checked in column order.
pub const URL_COLUMN_HINTS: &[&str] = &["url", "link", "endpoint", "service", "mapserver", "rest"];

pub const DEFAULT_INPUT: &str = "data/mapservers/mapserver_links.csv";
pub const REGISTRY_PATH: &str = "data/mapservers/registry.json";
pub const FLAT_TABLE_PATH: &str = "data/mapservers/registry_flat.csv";
pub const CACHE_DIR: &str = "data/mapservers/cache";

/// Input and artifact locations for one run. The CLI uses the fixed defaults;
/// tests redirect everything into a temp directory.
#[derive(Debug, Clone)]
pub struct CatalogPaths {
    pub input: PathBuf,
    pub registry: PathBuf,
    pub flat_table: PathBuf,
    pub cache_dir: PathBuf,
}

impl CatalogPaths {
    pub fn with_input(input: PathBuf) -> Self {
        Self {
            input,
            registry: PathBuf::from(REGISTRY_PATH),
            flat_table: PathBuf::from(FLAT_TABLE_PATH),
            cache_dir: PathBuf::from(CACHE_DIR),
        }
    }
}

/// Top-level catalog artifact, written once per run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    pub generated_at: String,
    pub source_csv: String,
    pub total_input_rows: usize,
    pub unique_services: usize,
    pub services: Vec<ServiceResult>,
}

/// Counts printed at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub ok: usize,
    pub failed: usize,
    pub layers: usize,
}

struct InputTable {
    headers: Vec<String>,
    rows: Vec<csv::StringRecord>,
}

/// Run the full pipeline: parse input, dedup, probe every unique URL in
/// sorted order, emit both artifacts, print a summary.
pub fn build_catalog(paths: &CatalogPaths, fetcher: &Fetcher) -> Result<BuildSummary> {
    println!("=== MapServer Catalog Builder ===");
    println!("Input: {}", paths.input.display());

    let input = read_input(&paths.input)?;
    println!("Total rows: {}", input.rows.len());

    let column = select_url_column(&input.headers)?;
    println!("URL column: {}", input.headers[column]);

    // A set, not a list: duplicates collapse and the probe order is the
    // sorted unique URLs, stable across runs.
    let urls: BTreeSet<String> = input
        .rows
        .iter()
        .filter_map(|row| row.get(column))
        .filter_map(normalize_service_url)
        .collect();
    println!("Unique URLs: {}", urls.len());

    let prober = Prober::new(fetcher);
    let mut services = Vec::with_capacity(urls.len());
    for (index, url) in urls.iter().enumerate() {
        println!(
            "[{}/{}] {}...",
            index + 1,
            urls.len(),
            truncate_string(url, 70)
        );
        services.push(prober.probe(url));
    }

    let registry = Registry {
        generated_at: Utc::now().to_rfc3339(),
        source_csv: paths.input.display().to_string(),
        total_input_rows: input.rows.len(),
        unique_services: urls.len(),
        services,
    };
    write_registry(&paths.registry, &registry)?;
    let layers = write_flat_table(&paths.flat_table, &registry.services)?;

    let ok = registry
        .services
        .iter()
        .filter(|s| s.status == ProbeStatus::Ok)
        .count();
    let summary = BuildSummary {
        ok,
        failed: registry.services.len() - ok,
        layers,
    };
    println!(
        "OK: {}, Failed: {}, Layers: {}",
        summary.ok, summary.failed, summary.layers
    );
    Ok(summary)
}

/// Read the delimited input, tolerating a leading byte-order marker.
fn read_input(path: &Path) -> Result<InputTable> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let trimmed = raw.strip_prefix('\u{feff}').unwrap_or(raw.as_str());
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(trimmed.as_bytes());
    let headers = reader
        .headers()
        .with_context(|| format!("parse header row of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("parse {}", path.display()))?;
    Ok(InputTable { headers, rows })
}

/// First column whose header contains a hint substring, else the first
/// column. A missing header row is the only fatal input error.
fn select_url_column(headers: &[String]) -> Result<usize> {
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        bail!("input has no usable header row; cannot locate a URL column");
    }
    for (index, header) in headers.iter().enumerate() {
        let lowered = header.to_lowercase();
        if URL_COLUMN_HINTS.iter().any(|hint| lowered.contains(hint)) {
            return Ok(index);
        }
    }
    Ok(0)
}

fn write_registry(path: &Path, registry: &Registry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(registry).context("serialize registry")?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    tracing::info!(path = %path.display(), services = registry.services.len(), "registry written");
    Ok(())
}

/// One row per (ok service, layer) pair, for downstream filtering by score.
/// Returns the number of rows written.
fn write_flat_table(path: &Path, services: &[ServiceResult]) -> Result<usize> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("write {}", path.display()))?;
    writer.write_record([
        "serviceUrl",
        "layerId",
        "layerName",
        "geometryType",
        "score",
        "tags",
        "status",
        "httpStatus",
    ])?;

    let mut rows = 0;
    for service in services.iter().filter(|s| s.status == ProbeStatus::Ok) {
        let status = service.status.to_string();
        let http_status = service.http_status.to_string();
        for layer in &service.layers {
            let layer_id = layer.id.map(|id| id.to_string()).unwrap_or_default();
            let score = layer.score.to_string();
            let tags = layer.tags.join(",");
            writer.write_record([
                service.service_url.as_str(),
                layer_id.as_str(),
                layer.name.as_str(),
                layer.geometry_type.as_str(),
                score.as_str(),
                tags.as_str(),
                status.as_str(),
                http_status.as_str(),
            ])?;
            rows += 1;
        }
    }
    writer.flush().context("flush flat table")?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn url_column_found_by_hint() {
        assert_eq!(
            select_url_column(&headers(&["County", "Service URL", "Notes"])).unwrap(),
            1
        );
        assert_eq!(
            select_url_column(&headers(&["Endpoint", "County"])).unwrap(),
            0
        );
        assert_eq!(
            select_url_column(&headers(&["REST link"])).unwrap(),
            0
        );
    }

    #[test]
    fn url_column_falls_back_to_first() {
        assert_eq!(
            select_url_column(&headers(&["County", "Notes"])).unwrap(),
            0
        );
    }

    #[test]
    fn empty_header_row_is_fatal() {
        assert!(select_url_column(&[]).is_err());
        assert!(select_url_column(&headers(&["", ""])).is_err());
    }

    #[test]
    fn input_tolerates_a_byte_order_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.csv");
        fs::write(
            &path,
            "\u{feff}url,county\nhttps://gis.example.com/rest/services/A/MapServer,Travis\n",
        )
        .unwrap();

        let input = read_input(&path).unwrap();
        assert_eq!(input.headers[0], "url");
        assert_eq!(input.rows.len(), 1);
    }

    #[test]
    fn ragged_rows_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.csv");
        fs::write(&path, "url,county\nhttps://a/MapServer\nhttps://b/MapServer,Hays,extra\n")
            .unwrap();
        let input = read_input(&path).unwrap();
        assert_eq!(input.rows.len(), 2);
    }
}
