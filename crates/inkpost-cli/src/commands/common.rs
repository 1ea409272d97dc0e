use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use inkpost_core::{
    BlogMutationPayload, BlogService, BlogStatus, CachedBlog, Draft, DraftId, HttpBlogService,
    LocalStore, NetworkMonitor, NetworkState, OfflineFacade, SyncReport,
};
use serde::Serialize;

use crate::cli::PostArgs;
use crate::config_profiles::{normalize_text_option, CliProfilesConfig};
use crate::connectivity::{check_connectivity, UnconfiguredBlogService};
use crate::error::CliError;

/// Everything a command needs once the profile is resolved.
pub struct App {
    pub facade: OfflineFacade,
    pub profile_name: String,
    pub api_base_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DraftListItem {
    pub id: String,
    pub blog_id: Option<String>,
    pub title: String,
    pub status: String,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<i64>,
    pub is_offline_draft: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct CachedBlogItem {
    pub blog_id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub cached_at: i64,
    pub relative_time: String,
}

pub async fn open_app(
    db_path: &Path,
    profile: Option<&str>,
    force_offline: bool,
) -> Result<App, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile);
    let profile = config.profile(&profile_name).cloned().unwrap_or_default();
    let api_base_url = profile.resolved_api_base_url();

    let store = Arc::new(LocalStore::open(db_path)?);
    let service: Arc<dyn BlogService> = match api_base_url.as_deref() {
        Some(url) => Arc::new(HttpBlogService::new(
            url,
            profile.resolved_api_token(),
            profile.offline.request_timeout(),
        )?),
        None => Arc::new(UnconfiguredBlogService),
    };

    let state = if force_offline {
        NetworkState::offline()
    } else {
        check_connectivity(api_base_url.as_deref()).await
    };
    let network = NetworkMonitor::new(state, Duration::ZERO);
    let facade = OfflineFacade::new(store, service, network, &profile.offline)?;

    tracing::debug!("Using profile '{profile_name}' with database {}", db_path.display());
    Ok(App {
        facade,
        profile_name,
        api_base_url,
    })
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("INKPOST_DB_PATH").map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("inkpost").join("inkpost.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

/// Find a queued draft by full id or unique id prefix.
pub fn resolve_draft(query: &str, drafts: &[Draft]) -> Result<Draft, CliError> {
    let query = normalize_draft_identifier(query)?;

    if let Ok(draft_id) = query.parse::<DraftId>() {
        if let Some(draft) = drafts.iter().find(|draft| draft.id == draft_id) {
            return Ok(draft.clone());
        }
    }

    let matches = drafts
        .iter()
        .filter(|draft| draft.id.as_str().starts_with(&query))
        .collect::<Vec<_>>();

    match matches.as_slice() {
        [] => Err(CliError::DraftNotFound(query)),
        [draft] => Ok((*draft).clone()),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|draft| short_id(&draft.id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousDraftId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn normalize_draft_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyDraftId)
    } else {
        Ok(trimmed.to_lowercase())
    }
}

pub fn short_id(id: &DraftId) -> String {
    id.as_str().chars().take(13).collect()
}

/// Assemble a payload from CLI flags, falling back to `base` for anything
/// not given explicitly.
pub fn build_payload(
    post: &PostArgs,
    content: String,
    base: Option<&BlogMutationPayload>,
) -> Result<BlogMutationPayload, CliError> {
    let title = normalize_text_option(post.title.clone())
        .or_else(|| base.map(|base| base.title.clone()))
        .and_then(|title| normalize_text_option(Some(title)))
        .ok_or(CliError::EmptyTitle)?;

    let status = if post.publish {
        BlogStatus::Published
    } else {
        base.map_or(BlogStatus::Draft, |base| base.status)
    };

    Ok(BlogMutationPayload {
        title,
        content,
        summary: normalize_text_option(post.summary.clone())
            .or_else(|| base.and_then(|base| base.summary.clone())),
        tags: if post.tags.is_empty() {
            base.map(|base| base.tags.clone()).unwrap_or_default()
        } else {
            post.tags.clone()
        },
        status,
        cover_image: normalize_text_option(post.cover_image.clone())
            .or_else(|| base.and_then(|base| base.cover_image.clone())),
    })
}

/// Payload an edit of `blog_id` should start from: the queued draft if
/// there is one, otherwise the cached copy.
pub fn edit_base(
    facade: &OfflineFacade,
    blog_id: &str,
) -> Result<Option<BlogMutationPayload>, CliError> {
    if let Some(draft) = facade
        .drafts()?
        .into_iter()
        .find(|draft| draft.blog_id.as_deref() == Some(blog_id))
    {
        return Ok(Some(draft.payload));
    }

    Ok(facade
        .cached_blogs()?
        .into_iter()
        .find(|cached| cached.blog_id == blog_id)
        .map(|cached| BlogMutationPayload {
            title: cached.content.title,
            content: cached.content.content,
            summary: cached.content.summary,
            tags: cached.content.tags,
            status: cached.content.status,
            cover_image: None,
        }))
}

pub fn format_draft_lines(drafts: &[Draft], now_ms: i64) -> Vec<String> {
    drafts
        .iter()
        .map(|draft| {
            let preview = preview_text(&draft.payload.title, 36);
            let target = draft.target_label();
            let relative_time = format_relative_time(draft.updated_at, now_ms);
            let mut line = format!(
                "{:<13}  {:<7}  {target:<18}  {preview:<36}  {relative_time}",
                short_id(&draft.id),
                draft.sync_status.as_str(),
            );
            if let Some(at) = draft.next_attempt_at.filter(|at| *at > now_ms) {
                line.push_str(&format!("  retry in {}s", (at - now_ms + 999) / 1_000));
            }
            if let Some(error) = draft.last_error.as_deref() {
                line.push_str(&format!("  ({error})"));
            }
            line
        })
        .collect()
}

pub fn draft_to_list_item(draft: &Draft) -> DraftListItem {
    let now_ms = Utc::now().timestamp_millis();
    DraftListItem {
        id: draft.id.to_string(),
        blog_id: draft.blog_id.clone(),
        title: draft.payload.title.clone(),
        status: draft.sync_status.to_string(),
        retry_count: draft.retry_count,
        last_error: draft.last_error.clone(),
        next_attempt_at: draft.next_attempt_at,
        is_offline_draft: draft.is_offline_draft,
        created_at: draft.created_at,
        updated_at: draft.updated_at,
        relative_time: format_relative_time(draft.updated_at, now_ms),
    }
}

pub fn cached_blog_to_item(cached: &CachedBlog) -> CachedBlogItem {
    let now_ms = Utc::now().timestamp_millis();
    CachedBlogItem {
        blog_id: cached.blog_id.clone(),
        title: cached.content.title.clone(),
        tags: cached.content.tags.clone(),
        cached_at: cached.cached_at,
        relative_time: format_relative_time(cached.cached_at, now_ms),
    }
}

pub fn format_sync_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = Vec::new();
    for synced in &report.synced {
        let verb = if synced.created { "Created" } else { "Updated" };
        lines.push(format!(
            "{verb} blog {} (draft {})",
            synced.blog_id,
            short_id(&synced.draft_id)
        ));
    }
    for id in &report.rescheduled {
        lines.push(format!("Draft {} will be retried", short_id(id)));
    }
    for id in &report.failed {
        lines.push(format!(
            "Draft {} failed; run `inkpost retry {}` after fixing it",
            short_id(id),
            short_id(id)
        ));
    }
    if report.deferred > 0 {
        lines.push(format!("{} draft(s) waiting for their retry time", report.deferred));
    }
    if lines.is_empty() {
        lines.push("Nothing to sync.".to_string());
    }
    lines
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn preview_text(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

/// Post content from arguments, then piped stdin, then `$EDITOR`.
pub fn resolve_post_content(content_parts: &[String], initial: &str) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input_with_initial(initial)? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_post_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let post_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&post_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_post_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("inkpost-post-{}-{now}.md", std::process::id()))
}
