use inkpost_core::{OfflineFacade, PassOutcome, SyncReport};

use crate::commands::common::format_sync_report_lines;
use crate::error::CliError;

pub async fn run_sync(facade: &OfflineFacade) -> Result<(), CliError> {
    let report = sync_now(facade).await?;
    if report.outcome == PassOutcome::Offline {
        let pending = facade.sync_status()?.pending_count;
        println!("Offline; {pending} draft(s) will sync when you're back online.");
        return Ok(());
    }

    for line in format_sync_report_lines(&report) {
        println!("{line}");
    }
    Ok(())
}

/// Run a pass and surface a storage failure as an error.
pub async fn sync_now(facade: &OfflineFacade) -> Result<SyncReport, CliError> {
    let report = facade.sync_pending_data().await;
    match &report.outcome {
        PassOutcome::StorageError(message) => Err(CliError::Config(format!(
            "local store failed during sync: {message}"
        ))),
        PassOutcome::Aborted => {
            println!("Connection lost during sync; remaining drafts stay queued.");
            Ok(report)
        }
        _ => Ok(report),
    }
}
