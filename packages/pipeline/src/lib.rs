#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Daily satellite indicator pipeline.
//!
//! One invocation runs end to end and exits: read the site catalog, build
//! tagged point geometries, evaluate a cloud-filtered median composite of
//! the last N days through the imagery source, sample the four derived
//! indices at each site, reconcile, and upsert one record per
//! `(oreum_id, date)` into the results store.
//!
//! The temporal window and both collaborators are explicit inputs;
//! nothing in here reads credentials or "today" from ambient process
//! state, so the whole run is deterministic and testable with injected
//! fakes.

pub mod reconcile;

use std::time::Instant;

use oreum_watch_imagery::{CompositeRequest, ImagerySource};
use oreum_watch_imagery_models::TemporalWindow;
use oreum_watch_indices::SpectralIndex;
use oreum_watch_site_models::build_site_geometries;
use oreum_watch_store::MetadataStore;

pub use reconcile::reconcile;

/// Image collection the daily run composites by default.
pub const DEFAULT_COLLECTION: &str = "COPERNICUS/S2_SR_HARMONIZED";

/// Scenes at or above this cloud-cover percentage are excluded.
pub const DEFAULT_CLOUD_CEILING_PCT: f64 = 20.0;

/// Ground-sample distance for per-site aggregation, in projection units.
pub const DEFAULT_SAMPLE_SCALE: f64 = 10.0;

/// Policy knobs for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Image collection to composite.
    pub collection: String,
    /// Compositing date range; its end date stamps every record.
    pub window: TemporalWindow,
    /// Cloud-cover ceiling, percent, exclusive.
    pub cloud_ceiling_pct: f64,
    /// Ground-sample distance for sampling.
    pub scale: f64,
    /// Compute and reconcile but skip the upsert.
    pub dry_run: bool,
}

impl RunOptions {
    /// Defaults for a window ending on the given run date.
    #[must_use]
    pub fn for_window(window: TemporalWindow) -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            window,
            cloud_ceiling_pct: DEFAULT_CLOUD_CEILING_PCT,
            scale: DEFAULT_SAMPLE_SCALE,
            dry_run: false,
        }
    }
}

/// What one run did, for logging and exit reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Rows in the site catalog.
    pub catalog_size: usize,
    /// Catalog rows with usable coordinates.
    pub geometry_count: usize,
    /// Sites the composite yielded samples for.
    pub sample_count: usize,
    /// Records written to the results store (0 on dry runs).
    pub records_written: usize,
}

/// Runs the pipeline once, end to end.
///
/// Empty-input conditions (no sites registered, nothing sampled) complete
/// successfully with zero writes; an empty catalog short-circuits before
/// the imagery source is contacted at all. Only boundary failures (the
/// catalog fetch, the imagery query, the upsert) propagate out.
///
/// # Errors
///
/// Returns the underlying store or imagery error; callers should treat
/// any error as "nothing was written" and retry the whole run later.
pub async fn run_daily(
    store: &dyn MetadataStore,
    imagery: &dyn ImagerySource,
    options: &RunOptions,
) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let mut summary = RunSummary::default();

    let sites = store.select_sites().await?;
    summary.catalog_size = sites.len();

    if sites.is_empty() {
        log::info!("No sites registered, nothing to analyze");
        return Ok(summary);
    }

    let geometries = build_site_geometries(&sites);
    summary.geometry_count = geometries.len();

    if geometries.is_empty() {
        log::warn!(
            "All {} catalog rows are missing coordinates, nothing to analyze",
            sites.len()
        );
        return Ok(summary);
    }

    let request = CompositeRequest {
        collection: &options.collection,
        window: &options.window,
        cloud_ceiling_pct: options.cloud_ceiling_pct,
        indices: SpectralIndex::all(),
        scale: options.scale,
        sites: &geometries,
    };

    let samples = imagery.sample_indices(&request).await?;
    summary.sample_count = samples.len();

    let records = reconcile(samples, options.window.end_date);

    if records.is_empty() {
        log::info!("No site cleared the cloud/coverage bar today, nothing to write");
    } else if options.dry_run {
        log::info!("Dry run: skipping upsert of {} records", records.len());
    } else {
        store.upsert_daily_stats(&records).await?;
        summary.records_written = records.len();
    }

    log::info!(
        "Run complete: {}/{} sites sampled, {} records written, took {:.1}s",
        summary.sample_count,
        summary.geometry_count,
        summary.records_written,
        start.elapsed().as_secs_f64()
    );

    Ok(summary)
}
