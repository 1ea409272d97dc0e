use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "inkpost")]
#[command(about = "Write blog posts anywhere and sync them when you're back online")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for API configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Work offline without probing the API
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show connectivity and queue status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List queued drafts
    Drafts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write a new blog post
    New {
        #[command(flatten)]
        post: PostArgs,
    },
    /// Queue an edit of an existing blog post
    Edit {
        /// Blog ID on the server
        blog_id: String,
        #[command(flatten)]
        post: PostArgs,
    },
    /// Re-enqueue a failed draft
    Retry {
        /// Draft ID or unique ID prefix
        id: String,
    },
    /// Drop a queued draft without syncing it
    Discard {
        /// Draft ID or unique ID prefix
        id: String,
    },
    /// Sync queued drafts now
    Sync,
    /// Download blog posts for offline reading
    Preload {
        /// Blog IDs to cache
        #[arg(required = true)]
        blog_ids: Vec<String>,
    },
    /// List blog posts available offline
    Cached {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a blog post, from the server or the offline cache
    Show {
        /// Blog ID on the server
        blog_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete every queued draft and cached blog post
    Clear {
        /// Confirm deletion of unsynced drafts
        #[arg(long)]
        yes: bool,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

/// Fields of a blog post being written or edited.
#[derive(Args, Debug, Default, Clone)]
pub struct PostArgs {
    /// Post title (kept from the queued draft or cached post when editing)
    #[arg(long)]
    pub title: Option<String>,
    /// Short summary
    #[arg(long)]
    pub summary: Option<String>,
    /// Tag, may be repeated
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
    /// Publish instead of saving as a draft
    #[arg(long)]
    pub publish: bool,
    /// Cover image URL
    #[arg(long, value_name = "URL")]
    pub cover_image: Option<String>,
    /// Post content (read from stdin or $EDITOR when omitted)
    #[arg(trailing_var_arg = true)]
    pub content: Vec<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Blog API base URL (e.g. <https://api.example.com>)
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Bearer token for the blog API
        #[arg(long, value_name = "TOKEN")]
        api_token: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
}
