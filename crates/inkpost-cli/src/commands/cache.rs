use chrono::Utc;
use inkpost_core::{BlogSource, CachedBlog, FetchedBlog, OfflineFacade, PreloadReport};

use crate::commands::common::{
    cached_blog_to_item, format_relative_time, preview_text, CachedBlogItem,
};
use crate::error::CliError;

pub async fn run_preload(facade: &OfflineFacade, blog_ids: &[String]) -> Result<(), CliError> {
    let report = facade.preload_blogs_for_offline(blog_ids.iter()).await;
    for line in format_preload_lines(&report) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_preload_lines(report: &PreloadReport) -> Vec<String> {
    let mut lines = Vec::new();
    for blog_id in &report.cached {
        lines.push(format!("Cached blog {blog_id}"));
    }
    for blog_id in &report.already_cached {
        lines.push(format!("Blog {blog_id} already available offline"));
    }
    for failure in &report.failed {
        lines.push(format!("Could not cache blog {}: {}", failure.blog_id, failure.error));
    }
    lines
}

pub fn run_cached(facade: &OfflineFacade, as_json: bool) -> Result<(), CliError> {
    let cached = facade.cached_blogs()?;

    if as_json {
        let json_items = cached
            .iter()
            .map(cached_blog_to_item)
            .collect::<Vec<CachedBlogItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if cached.is_empty() {
        println!("No blog posts cached for offline reading.");
        return Ok(());
    }

    let now_ms = Utc::now().timestamp_millis();
    for line in format_cached_lines(&cached, now_ms) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_cached_lines(cached: &[CachedBlog], now_ms: i64) -> Vec<String> {
    cached
        .iter()
        .map(|entry| {
            format!(
                "{:<24}  {:<40}  cached {}",
                entry.blog_id,
                preview_text(&entry.content.title, 40),
                format_relative_time(entry.cached_at, now_ms)
            )
        })
        .collect()
}

pub async fn run_show(
    facade: &OfflineFacade,
    blog_id: &str,
    as_json: bool,
) -> Result<(), CliError> {
    let Some(fetched) = facade.get_blog(blog_id.trim()).await? else {
        return Err(CliError::BlogUnavailable(blog_id.trim().to_string()));
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&fetched.blog)?);
        return Ok(());
    }

    for line in format_blog_lines(&fetched, Utc::now().timestamp_millis()) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_blog_lines(fetched: &FetchedBlog, now_ms: i64) -> Vec<String> {
    let blog = &fetched.blog;
    let mut lines = vec![format!("# {}", blog.title)];
    if let BlogSource::Cache { cached_at } = fetched.source {
        lines.push(format!(
            "(offline copy, cached {})",
            format_relative_time(cached_at, now_ms)
        ));
    }
    if !blog.tags.is_empty() {
        lines.push(format!("Tags: {}", blog.tags.join(", ")));
    }
    if let Some(summary) = blog.summary.as_deref() {
        lines.push(summary.to_string());
    }
    lines.push(String::new());
    lines.push(blog.content.clone());
    lines
}
