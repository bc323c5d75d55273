//! Layer scoring against the enrichment keyword taxonomy.

use crate::probe::FieldDescriptor;

/// Points awarded per matched tag.
pub const TAG_INCREMENT: u32 = 10;
/// Upper bound on a layer score.
pub const MAX_SCORE: u32 = 100;

/// Tag → keyword substrings. A tag is claimed by its first keyword found in
/// the haystack; remaining keywords for that tag are skipped so repeated
/// matches never inflate the score. Extend by adding rows, not control flow.
pub const ENRICHMENT_TAXONOMY: &[(&str, &[&str])] = &[
    (
        "owner",
        &["owner", "ownername", "taxpayer", "mail", "mailing", "grantor", "grantee"],
    ),
    (
        "situs",
        &["situs", "address", "street", "city", "zip", "site_addr", "prop_addr", "location"],
    ),
    (
        "parcel_id",
        &["parcel", "parcelid", "account", "geo_id", "pin", "apn", "prop_id", "tcad"],
    ),
    (
        "legal",
        &["legal", "subdivision", "lot", "block", "abstract", "plat", "survey"],
    ),
    (
        "land_use",
        &["landuse", "zoning", "sqft", "acres", "yearbuilt", "improvement", "land_use"],
    ),
    (
        "sales",
        &["sale", "deed", "instrument", "salesprice", "sold", "transfer", "consideration"],
    ),
    (
        "permits",
        &["permit", "code", "violation", "inspection", "building"],
    ),
    (
        "utilities",
        &["sewer", "water", "electric", "gas", "wastewater", "utility"],
    ),
    (
        "boundaries",
        &["parcel", "cadastre", "lots", "boundary", "property"],
    ),
    (
        "flood",
        &["fema", "flood", "wetland", "slope", "hazard", "floodplain", "critical"],
    ),
];

/// Score a layer from its name and field names. Deterministic and pure; the
/// returned tags are in taxonomy order of first match.
pub fn score_layer(layer_name: &str, fields: &[FieldDescriptor]) -> (u32, Vec<String>) {
    let mut haystack = layer_name.to_lowercase();
    for field in fields {
        haystack.push(' ');
        haystack.push_str(&field.name.to_lowercase());
    }

    let mut score = 0;
    let mut tags = Vec::new();
    for (tag, keywords) in ENRICHMENT_TAXONOMY {
        if keywords.iter().any(|keyword| haystack.contains(keyword)) {
            tags.push((*tag).to_string());
            score += TAG_INCREMENT;
        }
    }
    (score.min(MAX_SCORE), tags)
}
