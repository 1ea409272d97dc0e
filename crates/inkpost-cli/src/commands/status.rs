use chrono::Utc;
use inkpost_core::OfflineSnapshot;
use serde::Serialize;

use crate::commands::common::{format_relative_time, format_sync_timestamp, App};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusItem {
    pub profile: String,
    pub api_base_url: Option<String>,
    pub cached_blogs: usize,
    #[serde(flatten)]
    pub snapshot: OfflineSnapshot,
}

pub fn run_status(app: &App, as_json: bool) -> Result<(), CliError> {
    let item = StatusItem {
        profile: app.profile_name.clone(),
        api_base_url: app.api_base_url.clone(),
        cached_blogs: app.facade.cached_blogs()?.len(),
        snapshot: app.facade.snapshot()?,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        for line in format_status_lines(&item, Utc::now().timestamp_millis()) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_status_lines(item: &StatusItem, now_ms: i64) -> Vec<String> {
    let snapshot = &item.snapshot;
    let network = if snapshot.is_offline {
        "offline".to_string()
    } else {
        format!("online ({})", snapshot.network.connection_type)
    };
    let last_sync = snapshot.status.last_sync_at.map_or_else(
        || "never".to_string(),
        |at| {
            format!(
                "{} ({})",
                format_sync_timestamp(at),
                format_relative_time(at, now_ms)
            )
        },
    );

    vec![
        format!(
            "Profile:   {} ({})",
            item.profile,
            item.api_base_url.as_deref().unwrap_or("no API configured")
        ),
        format!("Network:   {network}"),
        format!(
            "Drafts:    {} pending, {} syncing, {} failed",
            snapshot.status.pending_count,
            snapshot.status.syncing_count,
            snapshot.status.failed_count
        ),
        format!("Cached:    {} blog post(s)", item.cached_blogs),
        format!("Last sync: {last_sync}"),
    ]
}
