#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Metadata/results store boundary.
//!
//! The pipeline reads the site catalog from, and writes daily statistics
//! to, one store. [`MetadataStore`] is the seam; [`supabase::SupabaseStore`]
//! is the production implementation over the store's PostgREST API.

pub mod supabase;

use async_trait::async_trait;
use oreum_watch_site_models::Site;
use oreum_watch_stats_models::DailyStatRecord;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store rejected the request.
    #[error("store request failed with status {status}: {body}")]
    Status {
        /// HTTP status returned by the store.
        status: u16,
        /// Response body, for operator diagnosis.
        body: String,
    },

    /// Response decoding failed.
    #[error("decode error: {message}")]
    Decode {
        /// Description of the decoding failure.
        message: String,
    },
}

/// The store the pipeline reads sites from and writes statistics to.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetches the full site catalog in one request.
    ///
    /// An empty catalog is a successful result, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unreachable or rejects
    /// the query; fatal to the run, since no analysis is possible
    /// without the site list.
    async fn select_sites(&self) -> Result<Vec<Site>, StoreError>;

    /// Upserts the whole record batch in one set-oriented request, keyed
    /// on `(oreum_id, date)`: existing rows for the same key are
    /// replaced, rows for other dates untouched.
    ///
    /// Callers must not invoke this with an empty batch; implementations
    /// treat an empty batch as a no-op rather than send a request.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the upsert is rejected; nothing is
    /// presumed written in that case.
    async fn upsert_daily_stats(&self, records: &[DailyStatRecord]) -> Result<(), StoreError>;

    /// Connection smoke test: a `limit 1` read of the site catalog.
    /// Returns the number of rows seen (0 or 1).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unreachable.
    async fn probe(&self) -> Result<usize, StoreError>;
}
