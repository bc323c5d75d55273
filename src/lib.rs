//! Service discovery and enrichment scoring for property-data work.
//!
//! The core pipeline probes ArcGIS-style map/feature services, scores each
//! layer's enrichment value against a fixed keyword taxonomy, and writes a
//! registry plus a flattened per-layer table. The `staging` module covers the
//! companion concern: normalizing bulk valuation and deed-recording exports
//! into staging rows for an external upsert sink.

pub mod address;
pub mod builder;
pub mod cache;
pub mod cli;
pub mod fetch;
pub mod normalize;
pub mod probe;
pub mod score;
pub mod staging;
pub mod util;
