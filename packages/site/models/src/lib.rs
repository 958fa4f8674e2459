#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Analysis site catalog types.
//!
//! A *site* (oreum) is a fixed geographic point tracked for recurring
//! satellite analysis. Rows are owned by the metadata store and read-only
//! to the pipeline; this crate defines the row shape and the pure
//! transform from catalog rows to tagged point geometries.

use geo::Point;
use serde::{Deserialize, Deserializer};

/// One row of the site catalog (`oreum_metadata`).
///
/// Coordinates are WGS84 degrees. Either coordinate may be missing in the
/// store; such rows are excluded from analysis by [`build_site_geometries`]
/// rather than failing the run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Site {
    /// Stable, unique site identifier. Stored as text here regardless of
    /// the column type in the metadata store.
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    /// Longitude in degrees, -180..180.
    #[serde(default)]
    pub x_coord: Option<f64>,
    /// Latitude in degrees, -90..90.
    #[serde(default)]
    pub y_coord: Option<f64>,
}

/// A site's point geometry tagged with the site id it came from.
///
/// 1:1 with the catalog row it was built from; derived, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteGeometry {
    /// Copied verbatim from [`Site::id`].
    pub site_id: String,
    /// Point at `(x_coord, y_coord)`.
    pub point: Point<f64>,
}

impl SiteGeometry {
    /// Constructs a geometry at `(x, y)` for the given site id.
    #[must_use]
    pub fn new(site_id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            site_id: site_id.into(),
            point: Point::new(x, y),
        }
    }
}

/// Builds one [`SiteGeometry`] per catalog row with both coordinates
/// present.
///
/// Rows missing a coordinate are skipped and logged as data-quality
/// anomalies; one bad row must not abort analysis of the rest.
#[must_use]
pub fn build_site_geometries(sites: &[Site]) -> Vec<SiteGeometry> {
    let mut geometries = Vec::with_capacity(sites.len());

    for site in sites {
        match (site.x_coord, site.y_coord) {
            (Some(x), Some(y)) => geometries.push(SiteGeometry::new(site.id.clone(), x, y)),
            _ => {
                log::warn!(
                    "Site {} is missing coordinates (x={:?}, y={:?}), excluding from analysis",
                    site.id,
                    site.x_coord,
                    site.y_coord
                );
            }
        }
    }

    geometries
}

/// Accepts the site id as either a JSON string or a JSON number.
///
/// The metadata store uses an integer primary key, but the pipeline treats
/// ids as opaque text throughout.
fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for site id, got {other}"
        ))),
    }
}
