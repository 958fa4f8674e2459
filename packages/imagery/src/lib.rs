#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Imagery source collaborators.
//!
//! The pipeline talks to imagery through the [`ImagerySource`] trait: one
//! call that evaluates a cloud-filtered median composite over the temporal
//! window and samples the derived index bands at each site geometry. Two
//! implementations are provided:
//!
//! - [`memory::MemorySource`] holds scenes in process and evaluates the
//!   pipeline locally through the compositing engine; it is the reference
//!   implementation and the test double.
//! - [`earthengine::EarthEngineSource`] pushes the identical computation
//!   to the Earth Engine REST API as a serialized expression graph and
//!   reads back the sampled feature collection.

pub mod earthengine;
pub mod memory;

use async_trait::async_trait;
use oreum_watch_imagery_models::TemporalWindow;
use oreum_watch_indices::SpectralIndex;
use oreum_watch_site_models::SiteGeometry;
use oreum_watch_stats_models::SiteSample;

/// Errors from imagery source operations.
#[derive(Debug, thiserror::Error)]
pub enum ImageryError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The imagery service rejected the computation.
    #[error("imagery computation failed with status {status}: {body}")]
    Compute {
        /// HTTP status returned by the service.
        status: u16,
        /// Response body, for operator diagnosis.
        body: String,
    },

    /// Response parsing failed.
    #[error("parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

/// One composite-and-sample evaluation: everything the imagery source
/// needs to produce per-site index records for one run.
#[derive(Debug, Clone)]
pub struct CompositeRequest<'a> {
    /// Image collection to composite, e.g. `"COPERNICUS/S2_SR_HARMONIZED"`.
    pub collection: &'a str,
    /// Date range for scene selection, start inclusive, end exclusive.
    pub window: &'a TemporalWindow,
    /// Scenes at or above this cloud-cover percentage are excluded.
    pub cloud_ceiling_pct: f64,
    /// Derived bands to compute and sample.
    pub indices: &'a [SpectralIndex],
    /// Ground-sample distance for per-site aggregation, in the imagery's
    /// native projection units.
    pub scale: f64,
    /// Site geometries to sample.
    pub sites: &'a [SiteGeometry],
}

/// An imagery service that can evaluate a median composite and sample its
/// derived bands at point geometries.
///
/// Implementations return one [`SiteSample`] per geometry that overlaps
/// valid composite pixels; geometries outside coverage are omitted, so the
/// result may be shorter than the input. An empty result is not an error.
#[async_trait]
pub trait ImagerySource: Send + Sync {
    /// Evaluates `request` and returns the sampled records.
    ///
    /// # Errors
    ///
    /// Returns [`ImageryError`] only for total failure to evaluate the
    /// query; partial coverage is absorbed into a shorter result.
    async fn sample_indices(
        &self,
        request: &CompositeRequest<'_>,
    ) -> Result<Vec<SiteSample>, ImageryError>;
}
