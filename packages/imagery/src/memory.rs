//! In-process imagery source over scenes held in memory.

use async_trait::async_trait;
use oreum_watch_composite::{build_composite, sample_sites};
use oreum_watch_imagery_models::Scene;
use oreum_watch_stats_models::SiteSample;

use crate::{CompositeRequest, ImageryError, ImagerySource};

/// Evaluates composite requests locally against a fixed set of scenes.
///
/// The scenes stand in for whatever the named collection would return;
/// the collection name in the request is accepted but not interpreted.
/// Windowing, cloud filtering, index derivation, median reduction, and
/// sampling all run through the same compositing engine the tests
/// exercise directly.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    scenes: Vec<Scene>,
}

impl MemorySource {
    /// Creates a source over the given scenes.
    #[must_use]
    pub const fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }
}

#[async_trait]
impl ImagerySource for MemorySource {
    async fn sample_indices(
        &self,
        request: &CompositeRequest<'_>,
    ) -> Result<Vec<SiteSample>, ImageryError> {
        let composite = build_composite(
            &self.scenes,
            request.window,
            request.cloud_ceiling_pct,
            request.indices,
        );
        Ok(sample_sites(&composite, request.sites, request.scale))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use oreum_watch_imagery_models::{PixelGrid, TemporalWindow};
    use oreum_watch_indices::{SpectralBand, SpectralIndex};
    use oreum_watch_site_models::SiteGeometry;

    use super::*;

    fn scene(captured_on: NaiveDate, cloud_cover_pct: f64) -> Scene {
        let mut grid = PixelGrid::new(0.0, 0.0, 10.0, 1, 1);
        for (band, value) in SpectralBand::all()
            .iter()
            .zip([0.1, 0.2, 0.15, 0.4, 0.25, 0.2])
        {
            grid.set_band(band.code(), vec![Some(value)]);
        }
        Scene {
            captured_on,
            cloud_cover_pct,
            grid,
        }
    }

    #[tokio::test]
    async fn evaluates_the_full_pipeline_locally() {
        let end = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let window = TemporalWindow::ending_on(end, 30);
        let source = MemorySource::new(vec![
            scene(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), 5.0),
            // Too cloudy; must not disturb the result
            scene(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(), 95.0),
        ]);

        let sites = vec![SiteGeometry::new("oreum-1", 0.0, 0.0)];
        let request = CompositeRequest {
            collection: "COPERNICUS/S2_SR_HARMONIZED",
            window: &window,
            cloud_ceiling_pct: 20.0,
            indices: SpectralIndex::all(),
            scale: 10.0,
            sites: &sites,
        };

        let samples = source.sample_indices(&request).await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].site_id.as_deref(), Some("oreum-1"));
        assert!((samples[0].muddy_index.unwrap() + 1.0 / 3.0).abs() < 1e-12);
    }
}
