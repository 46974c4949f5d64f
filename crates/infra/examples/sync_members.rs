//! Demo: synchronize a guild's member list from a JSON file
//!
//! Reads configuration from the environment (a `.env` file is honoured) or
//! from `guildsync.toml`/`guildsync.json`, then upserts every member in the
//! given file and logs the sync report.
//!
//! ```bash
//! API_BASE_URL=http://localhost:8000/api LOCAL_MODE=true \
//!     cargo run -p guildsync-infra --example sync_members -- 1234 members.json
//! ```
//!
//! `LOG_FORMAT=json` switches the log output to JSON lines.

use anyhow::{bail, Context, Result};
use guildsync_domain::GuildMember;
use guildsync_infra::{config, init_tracing, ApiClient, LogFormat};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let format = std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|value| value.parse::<LogFormat>().ok())
        .unwrap_or_default();
    init_tracing(format)?;

    let mut args = std::env::args().skip(1);
    let (Some(guild_id), Some(members_path)) = (args.next(), args.next()) else {
        bail!("usage: sync_members <guild-id> <members.json>");
    };

    let raw = std::fs::read_to_string(&members_path)
        .with_context(|| format!("failed to read {members_path}"))?;
    let members: Vec<GuildMember> =
        serde_json::from_str(&raw).with_context(|| format!("{members_path} is not a member list"))?;

    let client = ApiClient::new(config::load()?)?;
    client.health_check().await.context("backend is not healthy")?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight batches");
            ctrl_c.cancel();
        }
    });

    let report = client
        .sync_members_with(
            &guild_id,
            &members,
            |progress| info!(processed = progress.processed, total = progress.total, "Progress"),
            &cancel,
        )
        .await?;

    info!(
        succeeded = report.succeeded,
        total = report.total,
        failed = report.failed,
        skipped = report.skipped,
        elapsed = ?report.elapsed,
        "Sync report"
    );
    for failure in &report.failures {
        warn!(
            batch = failure.batch_index,
            first_member = failure.offset,
            members = failure.entities,
            cause = %failure.cause,
            "Batch failed"
        );
    }

    client.close();
    if !report.is_complete_success() {
        bail!("sync incomplete");
    }
    Ok(())
}
