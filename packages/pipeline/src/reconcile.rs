//! Result reconciliation: raw site samples → the daily record batch.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use oreum_watch_stats_models::{DailyStatRecord, SiteSample};

/// Shapes sampled results into the batch to persist.
///
/// 1. Drops samples missing a site id or missing `muddy_index`: the
///    primary index is the canary for "this sample did not compute"; all
///    four indices share the same pixel support, so a sample without it
///    is not trusted even if other bands are present.
/// 2. Deduplicates by site id, keeping the last sample encountered. A
///    correct sampler never emits duplicates; if one arrives anyway it is
///    collapsed here rather than rejected by the store's constraint.
/// 3. Stamps every surviving record with `date = end_date`.
///
/// Zero output records is a valid outcome: no site cleared the
/// cloud/coverage bar today.
#[must_use]
pub fn reconcile(samples: Vec<SiteSample>, end_date: NaiveDate) -> Vec<DailyStatRecord> {
    let input_count = samples.len();
    let mut by_site: BTreeMap<String, DailyStatRecord> = BTreeMap::new();

    for sample in samples {
        let Some(site_id) = sample.site_id else {
            log::warn!("Dropping sample with no site id");
            continue;
        };

        let Some(muddy_index) = sample.muddy_index else {
            log::debug!("Site {site_id} sample has no muddy_index, dropping");
            continue;
        };

        let record = DailyStatRecord {
            oreum_id: site_id.clone(),
            date: end_date,
            muddy_index,
            green_visual_index: sample.green_visual_index,
            fire_risk_index: sample.fire_risk_index,
            erosion_index: sample.erosion_index,
        };

        if by_site.insert(site_id.clone(), record).is_some() {
            log::warn!("Duplicate sample for site {site_id}, keeping the later one");
        }
    }

    let records: Vec<DailyStatRecord> = by_site.into_values().collect();
    log::info!(
        "Reconciled {} of {input_count} samples into records for {end_date}",
        records.len()
    );
    records
}
