pub mod cache;
pub mod clear;
pub mod common;
pub mod completions;
pub mod config;
pub mod drafts;
pub mod edit;
pub mod status;
pub mod sync;
