//! Service metadata probing: the top-level service document plus each
//! declared layer's schema.
//!
//! Probing is per-service isolated. Any failure — transport, HTTP, bad JSON,
//! or a service-reported `error` object — produces an `"error"`-status result
//! and stops further fetches for that service. A single layer's failure only
//! degrades that layer to the shallow metadata declared at the service level.

use crate::fetch::{FetchStatus, Fetcher};
use crate::score::score_layer;
use serde::Serialize;
use serde_json::Value;

/// Layer field lists are truncated to this many descriptors before scoring.
pub const LAYER_FIELD_CAP: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Ok,
    Error,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Ok => write!(f, "ok"),
            ProbeStatus::Error => write!(f, "error"),
        }
    }
}

/// Field name + declared type, used only as scoring input.
#[derive(Debug, Clone, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerResult {
    pub id: Option<i64>,
    pub name: String,
    pub geometry_type: String,
    pub fields: Vec<FieldDescriptor>,
    pub score: u32,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpatialRef {
    pub wkid: Option<i64>,
}

/// One probed service. Assembled once, never updated in place.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResult {
    pub service_url: String,
    pub status: ProbeStatus,
    pub http_status: FetchStatus,
    pub service_type: String,
    pub name: Option<String>,
    pub spatial_ref: Option<SpatialRef>,
    pub max_record_count: Option<i64>,
    pub supports_pagination: Option<bool>,
    pub capabilities: Option<String>,
    pub layers: Vec<LayerResult>,
    pub errors: Vec<String>,
}

impl ServiceResult {
    fn failed(url: &str, http_status: FetchStatus, reason: String) -> Self {
        Self {
            service_url: url.to_string(),
            status: ProbeStatus::Error,
            http_status,
            service_type: "unknown".to_string(),
            name: None,
            spatial_ref: None,
            max_record_count: None,
            supports_pagination: None,
            capabilities: None,
            layers: Vec::new(),
            errors: vec![reason],
        }
    }
}

pub struct Prober<'a> {
    fetcher: &'a Fetcher,
}

impl<'a> Prober<'a> {
    pub fn new(fetcher: &'a Fetcher) -> Self {
        Self { fetcher }
    }

    /// Probe one canonical service URL into a result record.
    pub fn probe(&self, url: &str) -> ServiceResult {
        let metadata_url = format!("{url}?f=pjson");
        let (payload, status) = self.fetcher.fetch(&metadata_url);
        let Some(data) = payload else {
            return ServiceResult::failed(url, status.clone(), format!("Failed to fetch: {status}"));
        };
        if let Some(error) = data.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            return ServiceResult::failed(url, status, message.to_string());
        }

        let layers = data
            .get("layers")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(|declared| self.probe_layer(url, declared))
            .collect();

        ServiceResult {
            service_url: url.to_string(),
            status: ProbeStatus::Ok,
            http_status: status,
            service_type: service_type(&data, url),
            name: service_name(&data),
            spatial_ref: spatial_ref(&data),
            max_record_count: data.get("maxRecordCount").and_then(Value::as_i64),
            supports_pagination: data
                .pointer("/advancedQueryCapabilities/supportsPagination")
                .and_then(Value::as_bool),
            capabilities: data
                .get("capabilities")
                .and_then(Value::as_str)
                .map(str::to_string),
            layers,
            errors: Vec::new(),
        }
    }

    /// Fetch a layer's own metadata to refine geometry and capture fields.
    /// A failed fetch keeps the shallow service-level metadata; scoring runs
    /// either way.
    fn probe_layer(&self, service_url: &str, declared: &Value) -> LayerResult {
        let id = declared.get("id").and_then(Value::as_i64);
        let name = declared
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let mut geometry_type = declared
            .get("geometryType")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let mut fields = Vec::new();

        if let Some(id) = id {
            let layer_url = format!("{service_url}/{id}?f=pjson");
            let (layer_data, _) = self.fetcher.fetch(&layer_url);
            if let Some(layer_data) = layer_data.filter(|data| data.get("error").is_none()) {
                if let Some(refined) = layer_data.get("geometryType").and_then(Value::as_str) {
                    geometry_type = refined.to_string();
                }
                if let Some(declared_fields) = layer_data.get("fields").and_then(Value::as_array) {
                    fields = declared_fields
                        .iter()
                        .take(LAYER_FIELD_CAP)
                        .map(|field| FieldDescriptor {
                            name: field
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or("")
                                .to_string(),
                            field_type: field
                                .get("type")
                                .and_then(Value::as_str)
                                .map(str::to_string),
                        })
                        .collect();
                }
            } else {
                tracing::debug!(%layer_url, "layer metadata unavailable, keeping shallow record");
            }
        }

        let (score, tags) = score_layer(&name, &fields);
        LayerResult {
            id,
            name,
            geometry_type,
            fields,
            score,
            tags,
        }
    }
}

/// First non-empty of serviceDescription, documentInfo.Title, name. Empty
/// strings fall through, matching how real service documents pad these keys.
fn service_name(data: &Value) -> Option<String> {
    non_empty_str(data.get("serviceDescription"))
        .or_else(|| non_empty_str(data.pointer("/documentInfo/Title")))
        .or_else(|| non_empty_str(data.get("name")))
}

/// Explicit `type` field, else inferred from the URL. The substring check is
/// case-sensitive on purpose: canonical ArcGIS paths spell it `MapServer`.
fn service_type(data: &Value, url: &str) -> String {
    if let Some(kind) = data.get("type").and_then(Value::as_str) {
        return kind.to_string();
    }
    if url.contains("MapServer") {
        "MapServer".to_string()
    } else {
        "FeatureServer".to_string()
    }
}

/// Current well-known id preferred over the legacy one. An empty
/// `spatialReference` object counts as absent.
fn spatial_ref(data: &Value) -> Option<SpatialRef> {
    let sr = data
        .get("spatialReference")
        .filter(|sr| sr.as_object().is_some_and(|map| !map.is_empty()))?;
    Some(SpatialRef {
        wkid: sr
            .get("wkid")
            .and_then(Value::as_i64)
            .or_else(|| sr.get("latestWkid").and_then(Value::as_i64)),
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
