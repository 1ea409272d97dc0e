use inkpost_core::{Draft, OfflineFacade};

use crate::cli::PostArgs;
use crate::commands::common::{build_payload, edit_base, resolve_post_content, short_id};
use crate::commands::sync::run_sync;
use crate::error::CliError;

pub async fn run_new(facade: &OfflineFacade, post: &PostArgs) -> Result<(), CliError> {
    let draft = queue_new_post(facade, post)?;
    announce_and_sync(facade, &draft).await
}

pub async fn run_edit(
    facade: &OfflineFacade,
    blog_id: &str,
    post: &PostArgs,
) -> Result<(), CliError> {
    let draft = queue_edit(facade, blog_id, post)?;
    announce_and_sync(facade, &draft).await
}

pub fn queue_new_post(facade: &OfflineFacade, post: &PostArgs) -> Result<Draft, CliError> {
    if post.title.as_deref().is_none_or(|title| title.trim().is_empty()) {
        return Err(CliError::EmptyTitle);
    }
    let content = resolve_post_content(&post.content, "")?;
    let payload = build_payload(post, content, None)?;
    Ok(facade.save_draft(None, payload)?)
}

pub fn queue_edit(
    facade: &OfflineFacade,
    blog_id: &str,
    post: &PostArgs,
) -> Result<Draft, CliError> {
    let blog_id = blog_id.trim();
    if blog_id.is_empty() {
        return Err(CliError::Config("blog id must not be empty".to_string()));
    }

    let base = edit_base(facade, blog_id)?;
    let initial = base.as_ref().map_or("", |base| base.content.as_str());
    let content = resolve_post_content(&post.content, initial)?;
    let payload = build_payload(post, content, base.as_ref())?;
    Ok(facade.save_draft(Some(blog_id), payload)?)
}

async fn announce_and_sync(facade: &OfflineFacade, draft: &Draft) -> Result<(), CliError> {
    if facade.is_offline() {
        println!(
            "Queued draft {} for {} (offline); it will sync when you're back online",
            short_id(&draft.id),
            draft.target_label()
        );
        return Ok(());
    }

    println!("Queued draft {} for {}", short_id(&draft.id), draft.target_label());
    run_sync(facade).await
}
