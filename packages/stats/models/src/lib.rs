#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Sampled spectral-index records and the persisted daily statistics row.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The four derived bands aggregated over one site's pixels.
///
/// Produced by the site sampler. Any field may be absent: the site id when
/// the sampled feature carried no tag, an index when none of the pixels
/// under the site had a valid value for that band. Sampling is inherently
/// partial; a site outside the composite's coverage yields no sample at
/// all rather than an all-`None` one.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SiteSample {
    /// Tag copied from the sampled geometry.
    pub site_id: Option<String>,
    /// Normalized-difference water/turbidity index.
    pub muddy_index: Option<f64>,
    /// Atmosphere-resistant vegetation index (EVI family).
    pub green_visual_index: Option<f64>,
    /// Burn/dryness-sensitive normalized ratio.
    pub fire_risk_index: Option<f64>,
    /// Bare-soil/surface-exposure ratio.
    pub erosion_index: Option<f64>,
}

/// One persisted row of `oreum_daily_stats`, unique per `(oreum_id, date)`.
///
/// `muddy_index` is always present: the reconciler treats its absence as
/// "this sample did not compute" and drops the sample before a record is
/// ever built. The other three indices may independently be absent and are
/// persisted as nulls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStatRecord {
    /// Site identifier, copied from the catalog.
    pub oreum_id: String,
    /// The run date (the temporal window's end date), ISO calendar date.
    pub date: NaiveDate,
    /// Normalized-difference water/turbidity index.
    pub muddy_index: f64,
    /// Atmosphere-resistant vegetation index (EVI family).
    pub green_visual_index: Option<f64>,
    /// Burn/dryness-sensitive normalized ratio.
    pub fire_risk_index: Option<f64>,
    /// Bare-soil/surface-exposure ratio.
    pub erosion_index: Option<f64>,
}
