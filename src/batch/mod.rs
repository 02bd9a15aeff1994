//! Batch list processing
//! Reconciles member lists, drives each member through a download handler
//! with retries, and filters fetched content before it is recorded.

pub mod cli;
pub mod config_loader;
pub mod content_filter;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod list_reconciler;
pub mod list_source;
pub mod logger;
pub mod models;
pub mod orchestration;
pub mod store;

// Re-export commonly used types for convenience
pub use config_loader::{ConfigManager, init_config};

pub use fetcher::{DownloadPipeline, FeedSource, FetchSession};

pub use orchestration::Orchestrator;

pub use store::SqliteStore;

pub use logger::init_logger;

pub use cli::CliManager;
