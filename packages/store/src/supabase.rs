//! Supabase PostgREST client for the metadata/results store.

use async_trait::async_trait;
use oreum_watch_credentials::SupabaseConfig;
use oreum_watch_site_models::Site;
use oreum_watch_stats_models::DailyStatRecord;

use crate::{MetadataStore, StoreError};

/// Table holding the registered analysis sites.
pub const METADATA_TABLE: &str = "oreum_metadata";

/// Table holding one row per `(oreum_id, date)`.
pub const STATS_TABLE: &str = "oreum_daily_stats";

/// Uniqueness constraint the upsert resolves against.
pub const CONFLICT_KEY: &str = "oreum_id,date";

/// `Prefer` header asking PostgREST to overwrite conflicting rows and
/// skip echoing the batch back.
const UPSERT_PREFER: &str = "resolution=merge-duplicates,return=minimal";

/// Store client over Supabase's PostgREST API.
pub struct SupabaseStore {
    client: reqwest::Client,
    config: SupabaseConfig,
}

impl SupabaseStore {
    /// Creates a store client for the given project credentials.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the HTTP client cannot be built.
    pub fn new(config: SupabaseConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .user_agent("oreum-watch/0.1")
            .build()?;
        Ok(Self { client, config })
    }

    /// REST endpoint for `table`.
    fn table_url(&self, table: &str) -> String {
        rest_url(&self.config.url, table)
    }

    /// Applies the `apikey` + bearer headers every PostgREST call needs.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.config.key)
            .bearer_auth(&self.config.key)
    }

    /// Sends a GET and returns the body, mapping non-2xx to
    /// [`StoreError::Status`].
    async fn get_body(&self, url: &str, query: &[(&str, &str)]) -> Result<String, StoreError> {
        let response = self
            .authorize(self.client.get(url))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(StoreError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// REST endpoint for `table` under a project base URL.
#[must_use]
pub fn rest_url(base_url: &str, table: &str) -> String {
    format!("{base_url}/rest/v1/{table}")
}

/// Decodes a PostgREST row array into sites.
fn parse_sites(body: &str) -> Result<Vec<Site>, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::Decode {
        message: format!("invalid site catalog response: {e}"),
    })
}

#[async_trait]
impl MetadataStore for SupabaseStore {
    async fn select_sites(&self) -> Result<Vec<Site>, StoreError> {
        let url = self.table_url(METADATA_TABLE);
        let body = self
            .get_body(&url, &[("select", "id,x_coord,y_coord")])
            .await?;

        let sites = parse_sites(&body)?;
        log::info!("Fetched {} sites from {METADATA_TABLE}", sites.len());
        Ok(sites)
    }

    async fn upsert_daily_stats(&self, records: &[DailyStatRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let url = self.table_url(STATS_TABLE);
        let response = self
            .authorize(self.client.post(&url))
            .query(&[("on_conflict", CONFLICT_KEY)])
            .header("Prefer", UPSERT_PREFER)
            .json(records)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        log::info!(
            "Upserted {} records into {STATS_TABLE} on ({CONFLICT_KEY})",
            records.len()
        );
        Ok(())
    }

    async fn probe(&self) -> Result<usize, StoreError> {
        let url = self.table_url(METADATA_TABLE);
        let body = self
            .get_body(&url, &[("select", "id"), ("limit", "1")])
            .await?;

        let rows: Vec<serde_json::Value> =
            serde_json::from_str(&body).map_err(|e| StoreError::Decode {
                message: format!("invalid probe response: {e}"),
            })?;

        if rows.is_empty() {
            log::warn!("{METADATA_TABLE} is empty or unreadable");
        }

        Ok(rows.len())
    }
}
