#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the daily satellite indicator pipeline.

use clap::{Parser, Subcommand};
use oreum_watch_credentials::{ServiceAccountKey, SupabaseConfig, fetch_access_token};
use oreum_watch_imagery::earthengine::EarthEngineSource;
use oreum_watch_imagery_models::TemporalWindow;
use oreum_watch_pipeline::{
    DEFAULT_CLOUD_CEILING_PCT, DEFAULT_COLLECTION, DEFAULT_SAMPLE_SCALE, RunOptions, run_daily,
};
use oreum_watch_store::MetadataStore as _;
use oreum_watch_store::supabase::SupabaseStore;

#[derive(Parser)]
#[command(name = "oreum_watch_pipeline", about = "Daily per-site satellite indicator job")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daily analysis once, end to end
    Run {
        /// Days of imagery to composite, counting back from today
        #[arg(long, default_value_t = TemporalWindow::DEFAULT_LOOKBACK_DAYS)]
        window_days: u64,
        /// Exclude scenes at or above this cloud-cover percentage
        #[arg(long, default_value_t = DEFAULT_CLOUD_CEILING_PCT)]
        cloud_ceiling: f64,
        /// Ground-sample distance for per-site aggregation, in projection units
        #[arg(long, default_value_t = DEFAULT_SAMPLE_SCALE)]
        scale: f64,
        /// Image collection to composite
        #[arg(long, default_value = DEFAULT_COLLECTION)]
        collection: String,
        /// Compute and reconcile but skip the upsert
        #[arg(long)]
        dry_run: bool,
    },
    /// List the registered site catalog
    Sites,
    /// Validate credentials and probe the store, reporting named failure reasons
    Check,
}

/// Builds the shared HTTP client.
fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent("oreum-watch/0.1")
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            window_days,
            cloud_ceiling,
            scale,
            collection,
            dry_run,
        } => {
            let store = SupabaseStore::new(SupabaseConfig::from_env()?)?;

            let key = ServiceAccountKey::from_env()?;
            let client = http_client()?;
            let token = fetch_access_token(&client, &key).await?;
            let imagery = EarthEngineSource::new(client, key.project_id.clone(), token);

            let window = TemporalWindow::ending_on(
                chrono::Local::now().date_naive(),
                window_days,
            );
            let options = RunOptions {
                collection,
                window,
                cloud_ceiling_pct: cloud_ceiling,
                scale,
                dry_run,
            };

            let summary = run_daily(&store, &imagery, &options).await?;
            log::info!(
                "Done: {} catalog rows, {} sampled, {} written",
                summary.catalog_size,
                summary.sample_count,
                summary.records_written
            );
        }
        Commands::Sites => {
            let store = SupabaseStore::new(SupabaseConfig::from_env()?)?;
            let sites = store.select_sites().await?;

            println!("{:<16} {:>12} {:>12}", "ID", "LON", "LAT");
            println!("{}", "-".repeat(42));
            for site in &sites {
                let lon = site
                    .x_coord
                    .map_or_else(|| "-".to_string(), |x| format!("{x:.6}"));
                let lat = site
                    .y_coord
                    .map_or_else(|| "-".to_string(), |y| format!("{y:.6}"));
                println!("{:<16} {lon:>12} {lat:>12}", site.id);
            }
            println!("{} site(s)", sites.len());
        }
        Commands::Check => {
            let mut failures = 0u32;

            match SupabaseConfig::from_env() {
                Ok(config) => {
                    log::info!("Supabase configuration present");
                    match SupabaseStore::new(config)?.probe().await {
                        Ok(0) => log::warn!("Store reachable, but the site catalog is empty"),
                        Ok(_) => log::info!("Store reachable, site catalog readable"),
                        Err(e) => {
                            log::error!("Store probe failed: {e}");
                            failures += 1;
                        }
                    }
                }
                Err(e) => {
                    log::error!("Supabase configuration invalid: {e}");
                    failures += 1;
                }
            }

            match ServiceAccountKey::from_env() {
                Ok(key) => {
                    log::info!("Service-account key valid for {}", key.client_email);
                    match fetch_access_token(&http_client()?, &key).await {
                        Ok(_) => log::info!("Token exchange succeeded"),
                        Err(e) => {
                            log::error!("Token exchange failed: {e}");
                            failures += 1;
                        }
                    }
                }
                Err(e) => {
                    log::error!("Service-account key invalid: {e}");
                    failures += 1;
                }
            }

            if failures > 0 {
                return Err(format!("{failures} configuration check(s) failed").into());
            }
            log::info!("All configuration checks passed");
        }
    }

    Ok(())
}
