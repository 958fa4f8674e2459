#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Temporal window policy and in-memory multispectral scene types.
//!
//! The [`TemporalWindow`] is recomputed fresh for every run and passed into
//! the pipeline explicitly; nothing in the core reads "today" from ambient
//! process state. [`Scene`] and [`PixelGrid`] model a single satellite
//! capture as named bands of optionally-masked samples, the shape both the
//! compositing code and the in-memory imagery source operate on.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// The compositing date range: `[start_date, end_date)`.
///
/// `end_date` is the run date; `start_date` trails it by a configurable
/// number of days (30 by default, balancing recency against the odds of at
/// least one clear capture per site).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalWindow {
    /// First date included in the window.
    pub start_date: NaiveDate,
    /// First date *excluded* from the window (the run date).
    pub end_date: NaiveDate,
}

impl TemporalWindow {
    /// Default lookback, in days.
    pub const DEFAULT_LOOKBACK_DAYS: u64 = 30;

    /// Builds the window ending on (and excluding) `end_date`, reaching
    /// back `lookback_days` days.
    #[must_use]
    pub fn ending_on(end_date: NaiveDate, lookback_days: u64) -> Self {
        let start_date = end_date
            .checked_sub_days(Days::new(lookback_days))
            .unwrap_or(NaiveDate::MIN);
        Self {
            start_date,
            end_date,
        }
    }

    /// Whether `date` falls inside the window (`start` inclusive, `end`
    /// exclusive, matching the imagery source's date-filter convention).
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date < self.end_date
    }

    /// ISO calendar-date form of the start bound.
    #[must_use]
    pub fn start_iso(&self) -> String {
        self.start_date.format("%Y-%m-%d").to_string()
    }

    /// ISO calendar-date form of the end bound.
    #[must_use]
    pub fn end_iso(&self) -> String {
        self.end_date.format("%Y-%m-%d").to_string()
    }
}

/// A rectangular grid of per-band samples in the imagery's native
/// projection.
///
/// Pixel `(col, row)` is centered at
/// `(origin_x + col * pixel_size, origin_y + row * pixel_size)`. A sample
/// of `None` is masked (cloud mask, nodata, or a masked band-math result).
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
    /// Center coordinate of pixel `(0, 0)` on the x axis.
    pub origin_x: f64,
    /// Center coordinate of pixel `(0, 0)` on the y axis.
    pub origin_y: f64,
    /// Ground distance between adjacent pixel centers, in projection units.
    pub pixel_size: f64,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    bands: BTreeMap<String, Vec<Option<f64>>>,
}

impl PixelGrid {
    /// Creates an empty grid with the given geometry and no bands.
    #[must_use]
    pub fn new(origin_x: f64, origin_y: f64, pixel_size: f64, width: usize, height: usize) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_size,
            width,
            height,
            bands: BTreeMap::new(),
        }
    }

    /// Number of pixels in the grid.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.width * self.height
    }

    /// Whether the grid has zero pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds (or replaces) a band. `samples` must hold exactly
    /// `width * height` values in row-major order.
    ///
    /// # Panics
    ///
    /// Panics if `samples.len()` does not match the grid size; band data
    /// of the wrong shape is a programming error, not a data condition.
    pub fn set_band(&mut self, name: impl Into<String>, samples: Vec<Option<f64>>) {
        assert_eq!(
            samples.len(),
            self.len(),
            "band sample count must match grid size"
        );
        self.bands.insert(name.into(), samples);
    }

    /// Returns a band's samples, if present.
    #[must_use]
    pub fn band(&self, name: &str) -> Option<&[Option<f64>]> {
        self.bands.get(name).map(Vec::as_slice)
    }

    /// Names of all bands on this grid, in sorted order.
    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.bands.keys().map(String::as_str)
    }

    /// Sample of `band` at pixel `(col, row)`, `None` when the band is
    /// absent, the index is out of range, or the sample is masked.
    #[must_use]
    pub fn sample(&self, band: &str, col: usize, row: usize) -> Option<f64> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.bands
            .get(band)
            .and_then(|samples| samples.get(row * self.width + col).copied().flatten())
    }

    /// Center coordinate of pixel `(col, row)` in projection units.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.pixel_size.mul_add(col as f64, self.origin_x),
            self.pixel_size.mul_add(row as f64, self.origin_y),
        )
    }

    /// Whether `other` covers the same pixels: same origin, spacing, and
    /// dimensions. Grids must be aligned before pixel-wise reduction.
    #[must_use]
    pub fn aligned_with(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && (self.origin_x - other.origin_x).abs() < f64::EPSILON
            && (self.origin_y - other.origin_y).abs() < f64::EPSILON
            && (self.pixel_size - other.pixel_size).abs() < f64::EPSILON
    }
}

/// One satellite capture: scene-level metadata plus its pixel grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    /// Calendar date of the capture.
    pub captured_on: NaiveDate,
    /// Scene-level cloud-cover percentage, 0..100.
    pub cloud_cover_pct: f64,
    /// The capture's band data.
    pub grid: PixelGrid,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn window_reaches_back_thirty_days() {
        let window = TemporalWindow::ending_on(date(2024, 3, 15), 30);
        assert_eq!(window.end_date, date(2024, 3, 15));
        assert_eq!(window.start_date, date(2024, 2, 14));
    }

    #[test]
    fn window_bounds_are_start_inclusive_end_exclusive() {
        let window = TemporalWindow::ending_on(date(2024, 3, 15), 30);
        assert!(window.contains(date(2024, 2, 14)));
        assert!(window.contains(date(2024, 3, 14)));
        assert!(!window.contains(date(2024, 3, 15)));
        assert!(!window.contains(date(2024, 2, 13)));
    }

    #[test]
    fn window_formats_iso_dates() {
        let window = TemporalWindow::ending_on(date(2024, 1, 5), 30);
        assert_eq!(window.start_iso(), "2023-12-06");
        assert_eq!(window.end_iso(), "2024-01-05");
    }

    #[test]
    fn grid_samples_are_row_major() {
        let mut grid = PixelGrid::new(0.0, 0.0, 10.0, 2, 2);
        grid.set_band("B3", vec![Some(1.0), Some(2.0), Some(3.0), None]);

        assert_eq!(grid.sample("B3", 0, 0), Some(1.0));
        assert_eq!(grid.sample("B3", 1, 0), Some(2.0));
        assert_eq!(grid.sample("B3", 0, 1), Some(3.0));
        assert_eq!(grid.sample("B3", 1, 1), None);
        assert_eq!(grid.sample("B3", 2, 0), None);
        assert_eq!(grid.sample("B8", 0, 0), None);
    }

    #[test]
    fn pixel_centers_follow_origin_and_spacing() {
        let grid = PixelGrid::new(100.0, 200.0, 10.0, 4, 4);
        assert_eq!(grid.pixel_center(0, 0), (100.0, 200.0));
        assert_eq!(grid.pixel_center(3, 1), (130.0, 210.0));
    }

    #[test]
    fn alignment_requires_matching_geometry() {
        let a = PixelGrid::new(0.0, 0.0, 10.0, 2, 2);
        let b = PixelGrid::new(0.0, 0.0, 10.0, 2, 2);
        let c = PixelGrid::new(5.0, 0.0, 10.0, 2, 2);
        let d = PixelGrid::new(0.0, 0.0, 10.0, 3, 2);

        assert!(a.aligned_with(&b));
        assert!(!a.aligned_with(&c));
        assert!(!a.aligned_with(&d));
    }
}
