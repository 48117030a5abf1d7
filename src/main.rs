// This is the entry point of the outreach bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (database, APIs)
//
// This file's job is to:
// 1. Load configuration from the environment
// 2. Initialize services (dependency injection)
// 3. Run the three sequential passes: discovery, extraction, outreach
//
// One invocation is one run; scheduling (cron or similar, one invocation at
// a time) is the caller's job. Partial progress is committed as it happens,
// so an aborted run resumes from persisted state on the next invocation.

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::core::discovery::{DiscoveryService, DriveQuery};
use crate::core::extraction::{ExtractionService, DEFAULT_SHEET_COLUMN};
use crate::core::outreach::{OutreachConfig, StageRunner};
use crate::core::registry::OutreachStore;
use crate::infra::google::{DriveApiClient, ServiceAccountAuth, SheetsApiClient};
use crate::infra::registry::SqliteOutreachStore;
use crate::infra::twitter::TwitterApiClient;

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Candidate lists can be overridden with a `|`-separated env value.
fn env_messages(name: &str) -> Option<Vec<String>> {
    let raw = std::env::var(name).ok()?;
    let messages: Vec<String> = raw
        .split('|')
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();
    if messages.is_empty() {
        None
    } else {
        Some(messages)
    }
}

fn outreach_config_from_env() -> OutreachConfig {
    let mut config = OutreachConfig::default();
    if let Some(messages) = env_messages("STAGE_ONE_MESSAGES") {
        config.stage_one_messages = messages;
    }
    if let Some(messages) = env_messages("STAGE_TWO_MESSAGES") {
        config.stage_two_messages = messages;
    }
    if let Some(max) = env_usize("MAX_SENDS_PER_RUN") {
        config.max_sends_per_run = max;
    }
    let throttle_min = env_u64("SEND_THROTTLE_SECS_MIN").unwrap_or(*config.throttle_secs.start());
    let throttle_max = env_u64("SEND_THROTTLE_SECS_MAX").unwrap_or(*config.throttle_secs.end());
    config.throttle_secs = throttle_min..=throttle_max;
    let backoff_min =
        env_u64("DUPLICATE_BACKOFF_SECS_MIN").unwrap_or(*config.duplicate_backoff_secs.start());
    let backoff_max =
        env_u64("DUPLICATE_BACKOFF_SECS_MAX").unwrap_or(*config.duplicate_backoff_secs.end());
    config.duplicate_backoff_secs = backoff_min..=backoff_max;
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    println!(
        "🐦 Outreach bot starting at {} UTC",
        Utc::now().format("%Y-%m-%d %H:%M:%S")
    );

    // ========================================================================
    // CONFIGURATION
    // ========================================================================
    // All configuration errors abort here, before any store mutation.

    let query = DriveQuery::from_options(
        std::env::var("DRIVE_FOLDER_ID").ok(),
        std::env::var("DRIVE_TITLE_MATCH").ok(),
    )
    .context("discovery criterion")?;

    let column =
        std::env::var("SHEET_COLUMN").unwrap_or_else(|_| DEFAULT_SHEET_COLUMN.to_string());

    let config = outreach_config_from_env();

    let twitter_token = std::env::var("TWITTER_ACCESS_TOKEN")
        .context("Missing TWITTER_ACCESS_TOKEN environment variable")?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    // Keep the runtime database in a dedicated folder so the repo root stays tidy.
    let data_dir = "data";
    std::fs::create_dir_all(data_dir).context("Failed to create data directory")?;
    let database_path = format!("{}/outreach.db", data_dir);

    let store: Arc<dyn OutreachStore> = Arc::new(
        SqliteOutreachStore::new(&database_path)
            .await
            .context("Failed to initialize SQLite store")?,
    );

    let auth = Arc::new(
        ServiceAccountAuth::from_env()
            .await
            .context("Failed to load Google service account credentials")?,
    );

    let discovery = DiscoveryService::new(DriveApiClient::new(Arc::clone(&auth)), store.clone());
    let extraction = ExtractionService::new(
        SheetsApiClient::new(Arc::clone(&auth)),
        store.clone(),
        column,
    );
    let transport = TwitterApiClient::new(&twitter_token)
        .context("Failed to create Twitter client")?;
    let mut runner = StageRunner::new(store, transport, config, StdRng::from_entropy())
        .context("Failed to create stage runner")?;

    // ========================================================================
    // THE THREE PASSES
    // ========================================================================

    let discovered = discovery
        .run(&query)
        .await
        .context("Spreadsheet discovery failed")?;
    println!(
        "📄 Discovery: {} new, {} already known, {} rejected by naming filter",
        discovered.discovered, discovered.known, discovered.rejected
    );

    let extracted = extraction
        .run()
        .await
        .context("Handle extraction failed")?;
    println!(
        "📋 Extraction: {} spreadsheets processed, {} handles imported ({} extracted)",
        extracted.files, extracted.imported, extracted.extracted
    );

    let outreach = runner.run().await.context("Outreach run failed")?;
    println!(
        "✉️  Outreach: {} messages sent, {} duplicates deferred, {} handles already complete",
        outreach.sent, outreach.duplicates, outreach.complete
    );

    Ok(())
}
