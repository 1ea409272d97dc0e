use chrono::Utc;
use inkpost_core::OfflineFacade;

use crate::commands::common::{
    draft_to_list_item, format_draft_lines, resolve_draft, short_id, DraftListItem,
};
use crate::commands::sync::run_sync;
use crate::error::CliError;

pub fn run_drafts(facade: &OfflineFacade, as_json: bool) -> Result<(), CliError> {
    let drafts = facade.drafts()?;

    if as_json {
        let json_items = drafts
            .iter()
            .map(draft_to_list_item)
            .collect::<Vec<DraftListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if drafts.is_empty() {
        println!("No queued drafts.");
        return Ok(());
    }

    for line in format_draft_lines(&drafts, Utc::now().timestamp_millis()) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_retry(facade: &OfflineFacade, id: &str) -> Result<(), CliError> {
    let draft = resolve_draft(id, &facade.drafts()?)?;
    let draft = facade.retry_draft(&draft.id)?;
    println!("Draft {} re-enqueued", short_id(&draft.id));

    if !facade.is_offline() {
        run_sync(facade).await?;
    }
    Ok(())
}

pub fn run_discard(facade: &OfflineFacade, id: &str) -> Result<(), CliError> {
    let draft = resolve_draft(id, &facade.drafts()?)?;
    if !facade.discard_draft(&draft.id)? {
        return Err(CliError::DraftNotFound(id.to_string()));
    }
    println!("Discarded draft {} ({})", short_id(&draft.id), draft.target_label());
    Ok(())
}
