//! Candidate URL validation and canonicalization.
//!
//! Input lists are scraped from many sources, so admission is a deliberately
//! permissive substring check: anything mentioning an ArcGIS-style service
//! path is allowed through, and the prober sorts out the rest.

use url::Url;

/// Path markers that admit a candidate URL. Substring match on the lowercased
/// input; superficially-matching unrelated URLs are accepted by design.
const SERVICE_MARKERS: &[&str] = &["rest/services", "mapserver", "featureserver"];

/// Canonicalize a candidate service endpoint.
///
/// Returns scheme + host + path with the query string, fragment, and any
/// trailing slash stripped. The canonical form is the dedup key for the whole
/// run. Input that is empty, lacks a service marker, or does not parse as an
/// absolute URL yields `None`.
pub fn normalize_service_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if !SERVICE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        return None;
    }
    let mut url = Url::parse(trimmed).ok()?;
    if !url.has_host() {
        return None;
    }
    url.set_query(None);
    url.set_fragment(None);
    Some(url.as_str().trim_end_matches('/').to_string())
}
