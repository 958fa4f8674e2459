#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Cloud-filtered median compositing and per-site spatial sampling.
//!
//! [`build_composite`] selects the scenes inside the temporal window whose
//! scene-level cloud cover is strictly below the ceiling, derives the four
//! index bands on each, and reduces the stack to one image by taking the
//! per-pixel, per-band median. The median (rather than the mean) keeps
//! residual cloud and shadow that slipped past the scene-level filter from
//! dragging the composite.
//!
//! [`sample_sites`] then aggregates the derived bands onto each site
//! geometry as the mean of the valid pixels within the ground-sample
//! distance. Both steps absorb partial data: an empty filtered collection
//! produces a composite with no valid pixels, and a site with no
//! overlapping valid pixel is simply omitted from the output.

use oreum_watch_imagery_models::{PixelGrid, Scene, TemporalWindow};
use oreum_watch_indices::SpectralIndex;
use oreum_watch_site_models::SiteGeometry;
use oreum_watch_stats_models::SiteSample;

/// The reduced image: one grid carrying only the derived index bands.
///
/// Ephemeral: lives only within one run, between compositing and
/// sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeImage {
    /// Per-pixel medians of the derived bands.
    pub grid: PixelGrid,
}

impl CompositeImage {
    /// A composite with zero pixels, produced when no scene survives
    /// filtering. Sampling it yields no samples.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            grid: PixelGrid::new(0.0, 0.0, 1.0, 0, 0),
        }
    }
}

/// Derives the index bands on one scene, leaving source bands untouched.
///
/// Pure and per-image: each output pixel depends only on the same pixel of
/// the input bands. Pixels where a referenced source band is masked, or
/// where a formula divides by zero, are masked in the derived band.
#[must_use]
pub fn derive_index_bands(scene: &Scene, indices: &[SpectralIndex]) -> Scene {
    let mut derived = scene.clone();

    for index in indices {
        let formula = index.formula();
        let mut samples = Vec::with_capacity(scene.grid.len());

        for row in 0..scene.grid.height {
            for col in 0..scene.grid.width {
                let resolve = |b: oreum_watch_indices::SpectralBand| {
                    scene.grid.sample(b.code(), col, row)
                };
                samples.push(formula.evaluate(&resolve));
            }
        }

        derived.grid.set_band(index.band_name(), samples);
    }

    derived
}

/// Builds the median composite from a scene collection.
///
/// Scenes are kept when their capture date falls in `[start, end)` *and*
/// their cloud cover is strictly below `cloud_ceiling_pct`. Kept scenes
/// whose grid is not aligned with the first kept scene are skipped with a
/// warning; pixel-wise reduction needs a common grid.
#[must_use]
pub fn build_composite(
    scenes: &[Scene],
    window: &TemporalWindow,
    cloud_ceiling_pct: f64,
    indices: &[SpectralIndex],
) -> CompositeImage {
    let selected: Vec<&Scene> = scenes
        .iter()
        .filter(|scene| window.contains(scene.captured_on))
        .filter(|scene| scene.cloud_cover_pct < cloud_ceiling_pct)
        .collect();

    log::info!(
        "Compositing {} of {} scenes ({} to {}, cloud < {cloud_ceiling_pct}%)",
        selected.len(),
        scenes.len(),
        window.start_iso(),
        window.end_iso(),
    );

    let Some(first) = selected.first() else {
        return CompositeImage::empty();
    };

    let mut aligned: Vec<Scene> = Vec::with_capacity(selected.len());
    for scene in &selected {
        if scene.grid.aligned_with(&first.grid) {
            aligned.push(derive_index_bands(scene, indices));
        } else {
            log::warn!(
                "Scene captured {} has a mismatched grid, skipping",
                scene.captured_on
            );
        }
    }

    let reference = &aligned[0].grid;
    let mut grid = PixelGrid::new(
        reference.origin_x,
        reference.origin_y,
        reference.pixel_size,
        reference.width,
        reference.height,
    );

    for index in indices {
        let name = index.band_name();
        let mut samples = Vec::with_capacity(grid.len());

        for row in 0..grid.height {
            for col in 0..grid.width {
                let mut values: Vec<f64> = aligned
                    .iter()
                    .filter_map(|scene| scene.grid.sample(name, col, row))
                    .collect();
                samples.push(median(&mut values));
            }
        }

        grid.set_band(name, samples);
    }

    CompositeImage { grid }
}

/// Median of `values`, or `None` when empty. Averages the two middle
/// elements for even counts.
fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    values.sort_unstable_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some(f64::midpoint(values[mid - 1], values[mid]))
    }
}

/// Aggregates the composite's derived bands onto each site geometry.
///
/// A pixel contributes to a site when its center lies within `scale`
/// projection units of the site point. Each contributing band is averaged
/// over its valid pixels independently; a band with no valid pixel under
/// the site is absent from that sample. A site with no valid pixel in
/// *any* band is omitted entirely; the output may be shorter than the
/// input, and callers must tolerate that.
#[must_use]
pub fn sample_sites(
    composite: &CompositeImage,
    sites: &[SiteGeometry],
    scale: f64,
) -> Vec<SiteSample> {
    let mut samples = Vec::with_capacity(sites.len());

    for site in sites {
        match sample_one(&composite.grid, site, scale) {
            Some(sample) => samples.push(sample),
            None => {
                log::debug!(
                    "Site {} has no valid composite pixels within {scale} units, omitting",
                    site.site_id
                );
            }
        }
    }

    log::info!("Sampled {} of {} sites", samples.len(), sites.len());
    samples
}

/// Mean of each derived band over the pixels near one site, or `None`
/// when no band has a valid contributing pixel.
fn sample_one(grid: &PixelGrid, site: &SiteGeometry, scale: f64) -> Option<SiteSample> {
    let x = site.point.x();
    let y = site.point.y();

    let mut sample = SiteSample {
        site_id: Some(site.site_id.clone()),
        ..SiteSample::default()
    };
    let mut any_valid = false;

    for index in SpectralIndex::all() {
        let name = index.band_name();
        let mut sum = 0.0;
        let mut count = 0u32;

        for row in 0..grid.height {
            for col in 0..grid.width {
                let (px, py) = grid.pixel_center(col, row);
                if (px - x).hypot(py - y) > scale {
                    continue;
                }
                if let Some(value) = grid.sample(name, col, row) {
                    sum += value;
                    count += 1;
                }
            }
        }

        if count > 0 {
            any_valid = true;
            let mean = sum / f64::from(count);
            match index {
                SpectralIndex::Muddy => sample.muddy_index = Some(mean),
                SpectralIndex::GreenVisual => sample.green_visual_index = Some(mean),
                SpectralIndex::FireRisk => sample.fire_risk_index = Some(mean),
                SpectralIndex::Erosion => sample.erosion_index = Some(mean),
            }
        }
    }

    any_valid.then_some(sample)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use oreum_watch_indices::SpectralBand;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// A 1x1 scene with uniform reflectance across all six source bands.
    fn uniform_scene(captured_on: NaiveDate, cloud_cover_pct: f64, bands: [f64; 6]) -> Scene {
        let mut grid = PixelGrid::new(0.0, 0.0, 10.0, 1, 1);
        for (band, value) in SpectralBand::all().iter().zip(bands) {
            grid.set_band(band.code(), vec![Some(value)]);
        }
        Scene {
            captured_on,
            cloud_cover_pct,
            grid,
        }
    }

    /// Reference pixel: B2=0.1, B3=0.2, B4=0.15, B8=0.4, B11=0.25,
    /// B12=0.2. Muddy index for it is exactly -1/3.
    const REFERENCE: [f64; 6] = [0.1, 0.2, 0.15, 0.4, 0.25, 0.2];

    fn march_window() -> TemporalWindow {
        TemporalWindow::ending_on(date(2024, 3, 15), 30)
    }

    #[test]
    fn derive_adds_bands_and_keeps_sources() {
        let scene = uniform_scene(date(2024, 3, 1), 5.0, REFERENCE);
        let derived = derive_index_bands(&scene, SpectralIndex::all());

        let muddy = derived.grid.sample("muddy_index", 0, 0).unwrap();
        assert!((muddy + 1.0 / 3.0).abs() < 1e-12);

        // Source bands untouched
        assert_eq!(derived.grid.sample("B3", 0, 0), Some(0.2));
        assert_eq!(derived.grid.sample("B8", 0, 0), Some(0.4));
    }

    #[test]
    fn cloud_ceiling_is_strict() {
        // The scene sitting exactly at the ceiling is cloudy; if it were
        // included the two-scene median would shift away from -1/3.
        let scenes = vec![
            uniform_scene(date(2024, 3, 1), 20.0, [0.9; 6]),
            uniform_scene(date(2024, 3, 2), 19.9, REFERENCE),
        ];

        let composite = build_composite(&scenes, &march_window(), 20.0, SpectralIndex::all());
        let muddy = composite.grid.sample("muddy_index", 0, 0).unwrap();
        assert!((muddy + 1.0 / 3.0).abs() < 1e-12, "got {muddy}");

        // A ceiling below both scenes leaves nothing to composite
        let none = build_composite(&scenes, &march_window(), 19.9, SpectralIndex::all());
        assert!(none.grid.is_empty());
    }

    #[test]
    fn window_bounds_exclude_end_date() {
        let scenes = vec![
            uniform_scene(date(2024, 3, 15), 5.0, REFERENCE), // end date: excluded
            uniform_scene(date(2024, 2, 13), 5.0, REFERENCE), // before start: excluded
        ];

        let composite = build_composite(&scenes, &march_window(), 20.0, SpectralIndex::all());
        assert!(composite.grid.is_empty());
    }

    #[test]
    fn median_suppresses_a_contaminated_outlier() {
        // Two clean captures and one residual-cloud outlier that passed the
        // scene-level filter. The median sticks with the clean value.
        let clean = REFERENCE;
        let contaminated = [0.9, 0.9, 0.9, 0.9, 0.9, 0.9];

        let scenes = vec![
            uniform_scene(date(2024, 3, 1), 5.0, clean),
            uniform_scene(date(2024, 3, 5), 5.0, contaminated),
            uniform_scene(date(2024, 3, 9), 5.0, clean),
        ];

        let composite = build_composite(&scenes, &march_window(), 20.0, SpectralIndex::all());
        let muddy = composite.grid.sample("muddy_index", 0, 0).unwrap();
        assert!((muddy + 1.0 / 3.0).abs() < 1e-12, "got {muddy}");
    }

    #[test]
    fn even_scene_count_averages_middle_values() {
        let mut values = vec![0.4, 0.1, 0.3, 0.2];
        assert!((median(&mut values).unwrap() - 0.25).abs() < 1e-12);

        let mut empty: Vec<f64> = Vec::new();
        assert_eq!(median(&mut empty), None);
    }

    #[test]
    fn empty_collection_yields_empty_composite_and_no_samples() {
        let composite = build_composite(&[], &march_window(), 20.0, SpectralIndex::all());
        assert!(composite.grid.is_empty());

        let sites = vec![SiteGeometry::new("oreum-1", 0.0, 0.0)];
        assert!(sample_sites(&composite, &sites, 10.0).is_empty());
    }

    #[test]
    fn misaligned_scene_is_skipped() {
        let mut shifted = uniform_scene(date(2024, 3, 2), 5.0, [0.9; 6]);
        shifted.grid = {
            let mut grid = PixelGrid::new(1000.0, 1000.0, 10.0, 1, 1);
            for band in SpectralBand::all() {
                grid.set_band(band.code(), vec![Some(0.9)]);
            }
            grid
        };

        let scenes = vec![uniform_scene(date(2024, 3, 1), 5.0, REFERENCE), shifted];
        let composite = build_composite(&scenes, &march_window(), 20.0, SpectralIndex::all());

        // Only the aligned reference scene contributes
        let muddy = composite.grid.sample("muddy_index", 0, 0).unwrap();
        assert!((muddy + 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn sampler_omits_sites_outside_coverage() {
        // 2x2 grid spanning pixel centers (0,0)..(10,10)
        let mut grid = PixelGrid::new(0.0, 0.0, 10.0, 2, 2);
        for band in SpectralBand::all() {
            grid.set_band(band.code(), vec![Some(0.2); 4]);
        }
        let scene = Scene {
            captured_on: date(2024, 3, 1),
            cloud_cover_pct: 5.0,
            grid,
        };

        let composite = build_composite(
            &[scene],
            &march_window(),
            20.0,
            SpectralIndex::all(),
        );

        let sites = vec![
            SiteGeometry::new("inside-a", 0.0, 0.0),
            SiteGeometry::new("inside-b", 10.0, 10.0),
            SiteGeometry::new("far-away", 500.0, 500.0),
        ];

        let samples = sample_sites(&composite, &sites, 10.0);
        let ids: Vec<&str> = samples
            .iter()
            .filter_map(|s| s.site_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["inside-a", "inside-b"]);
    }

    #[test]
    fn sampler_averages_pixels_within_scale() {
        // One band with distinct values; site equidistant from two pixel
        // centers and far from the rest.
        let mut grid = PixelGrid::new(0.0, 0.0, 10.0, 2, 1);
        grid.set_band("muddy_index", vec![Some(-0.2), Some(-0.4)]);
        let composite = CompositeImage { grid };

        let sites = vec![SiteGeometry::new("between", 5.0, 0.0)];
        let samples = sample_sites(&composite, &sites, 6.0);

        assert_eq!(samples.len(), 1);
        let muddy = samples[0].muddy_index.unwrap();
        assert!((muddy + 0.3).abs() < 1e-12, "got {muddy}");
        // No other derived band exists on this composite
        assert!(samples[0].green_visual_index.is_none());
    }

    #[test]
    fn masked_pixels_do_not_contribute_to_the_mean() {
        let mut grid = PixelGrid::new(0.0, 0.0, 10.0, 2, 1);
        grid.set_band("muddy_index", vec![Some(-0.2), None]);
        let composite = CompositeImage { grid };

        let sites = vec![SiteGeometry::new("site", 5.0, 0.0)];
        let samples = sample_sites(&composite, &sites, 6.0);

        assert_eq!(samples.len(), 1);
        assert!((samples[0].muddy_index.unwrap() + 0.2).abs() < 1e-12);
    }
}
