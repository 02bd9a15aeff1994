//! Orchestration layer for list processing
//!
//! This module provides the batch driver that:
//! 1. Acquires the work set from a list file or the member store
//! 2. Reconciles it against the ignore list
//! 3. Runs every member through an injected handler with bounded retry
//! 4. Resets the fetch session after each member
//! 5. Stops the whole batch at once when the user cancels

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::batch::error::{OrchestratorError, OrchestratorResult};
use crate::batch::list_reconciler::{apply_ignore_list, import_list};
use crate::batch::list_source::{parse_list, parse_tags_list};
use crate::batch::models::{TagQuery, WorkItem};
use crate::batch::store::MemberStore;

/// Retry policy for a single member
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Retries allowed after the first failure
    pub retry_limit: u32,
    pub backoff_secs: f64,
}

impl RetryConfig {
    fn backoff(&self) -> Duration {
        if self.backoff_secs.is_finite() && self.backoff_secs > 0.0 {
            Duration::try_from_secs_f64(self.backoff_secs).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            backoff_secs: 2.0,
        }
    }
}

/// Fetches everything for one member
#[async_trait]
pub trait MemberHandler: Send + Sync {
    async fn process_member(&self, item: &WorkItem, title_prefix: &str) -> OrchestratorResult<()>;
}

/// Fetches everything for one tag search
#[async_trait]
pub trait TagHandler: Send + Sync {
    async fn process_tags(&self, query: &TagQuery) -> OrchestratorResult<()>;
}

/// Clears navigation state a handler accumulated while fetching
pub trait SessionReset: Send + Sync {
    fn clear_history(&self);
}

/// What to run for each member of the work set
#[derive(Clone, Copy)]
pub enum ItemHandler<'a> {
    /// Run `query` scoped to each member, then stamp the member's last download date
    Tags {
        handler: &'a dyn TagHandler,
        query: &'a TagQuery,
    },
    /// Run the member handler with a `[i of N] ` prefix
    Member(&'a dyn MemberHandler),
}

/// Where the work set comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkSource {
    /// Members stored in the database, optionally only those stale for `day_last_updated` days
    Database { day_last_updated: u32 },
    /// A member list file
    ListFile(PathBuf),
}

/// Terminal state of one member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded { attempts: u32 },
    GivenUp { attempts: u32 },
}

/// Summary of a finished list run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub given_up: Vec<String>,
}

/// Drives a work set through a handler, one member at a time
pub struct Orchestrator {
    store: Arc<dyn MemberStore>,
    session: Arc<dyn SessionReset>,
    retry: RetryConfig,
    root_directory: PathBuf,
    ignore_list: PathBuf,
    cancel: CancellationToken,
    error_code: AtomicI32,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(
        store: Arc<dyn MemberStore>,
        session: Arc<dyn SessionReset>,
        retry: RetryConfig,
        root_directory: impl Into<PathBuf>,
        ignore_list: impl Into<PathBuf>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            session,
            retry,
            root_directory: root_directory.into(),
            ignore_list: ignore_list.into(),
            cancel,
            error_code: AtomicI32::new(0),
        }
    }

    /// Code of the last batch-fatal failure, 0 when none happened
    pub fn error_code(&self) -> i32 {
        self.error_code.load(Ordering::SeqCst)
    }

    /// Token that stops the current and any later run
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Process every member of the work set.
    ///
    /// The `[i of N] ` prefix handed to member handlers is the item's position
    /// in the reconciled list, so a given-up member still consumes its number
    /// instead of only successful members advancing the counter.
    pub async fn process_list(&self, source: &WorkSource, handler: ItemHandler<'_>) -> OrchestratorResult<BatchReport> {
        let span = info_span!("process_list", run_id = %Uuid::new_v4());
        self.run_list(source, handler).instrument(span).await
    }

    /// Run every search in a tag list file
    pub async fn process_tags_list(
        &self,
        filename: &Path,
        template: &TagQuery,
        handler: &dyn TagHandler,
    ) -> OrchestratorResult<usize> {
        let span = info_span!("process_tags_list", run_id = %Uuid::new_v4());
        self.run_tags_list(filename, template, handler)
            .instrument(span)
            .await
            .map_err(|e| self.fail_batch("process_tags_list", e))
    }

    /// Import a member list into the store
    pub fn import_list(&self, list_path: &Path) -> OrchestratorResult<usize> {
        import_list(self.store.as_ref(), list_path, &self.root_directory)
    }

    async fn run_list(&self, source: &WorkSource, handler: ItemHandler<'_>) -> OrchestratorResult<BatchReport> {
        let items = self
            .acquire_work_set(source)
            .map_err(|e| self.fail_batch("process_list", e))?;

        let total = items.len();
        let mut report = BatchReport {
            total,
            ..BatchReport::default()
        };

        for (index, item) in items.iter().enumerate() {
            let prefix = format!("[{} of {}] ", index + 1, total);
            let outcome = self.run_item(item, &prefix, handler).await;
            self.session.clear_history();

            match outcome? {
                ItemOutcome::Succeeded { .. } => report.succeeded += 1,
                ItemOutcome::GivenUp { .. } => report.given_up.push(item.member_id().to_string()),
            }
            info!("done.");
        }

        Ok(report)
    }

    async fn run_tags_list(
        &self,
        filename: &Path,
        template: &TagQuery,
        handler: &dyn TagHandler,
    ) -> OrchestratorResult<usize> {
        info!("Reading: {}", filename.display());
        let tags = parse_tags_list(filename)?;
        for tag in &tags {
            let query = TagQuery {
                tags: tag.clone(),
                ..template.clone()
            };
            self.until_cancelled(handler.process_tags(&query)).await?;
        }

        Ok(tags.len())
    }

    fn acquire_work_set(&self, source: &WorkSource) -> OrchestratorResult<Vec<WorkItem>> {
        let primary = match source {
            WorkSource::Database { day_last_updated: 0 } => {
                info!("Processing from database.");
                self.store.select_all_members()?
            }
            WorkSource::Database { day_last_updated } => {
                info!("Processing from database.");
                info!("Select only last {} days.", day_last_updated);
                self.store.select_members_by_last_download_date(*day_last_updated)?
            }
            WorkSource::ListFile(path) => {
                info!("Processing from list file: {}", path.display());
                parse_list(path, &self.root_directory)?
            }
        };

        let items = apply_ignore_list(primary, &self.ignore_list, &self.root_directory)?;
        info!("Found {} items.", items.len());
        Ok(items)
    }

    /// Attempt one member until it succeeds, is given up, or the run is cancelled
    async fn run_item(&self, item: &WorkItem, prefix: &str, handler: ItemHandler<'_>) -> OrchestratorResult<ItemOutcome> {
        let mut retry_count = 0u32;

        loop {
            let result = match handler {
                ItemHandler::Tags { handler, query } => {
                    let query = query.for_member(item.member_id());
                    self.until_cancelled(handler.process_tags(&query)).await.and_then(|_| {
                        self.store
                            .update_last_download_date(item.member_id())
                            .map_err(OrchestratorError::from)
                    })
                }
                ItemHandler::Member(handler) => self.until_cancelled(handler.process_member(item, prefix)).await,
            };

            let err = match result {
                Ok(()) => {
                    return Ok(ItemOutcome::Succeeded {
                        attempts: retry_count + 1,
                    });
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => e,
            };

            retry_count += 1;
            if retry_count > self.retry.retry_limit {
                error!("Giving up member_id: {}", item.member_id());
                return Ok(ItemOutcome::GivenUp { attempts: retry_count });
            }

            warn!(
                error = %err,
                member_id = item.member_id(),
                attempt = retry_count,
                "Something wrong, retrying after {:?} ({})",
                self.retry.backoff(),
                retry_count
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(OrchestratorError::Cancelled),
                _ = sleep(self.retry.backoff()) => {}
            }
        }
    }

    /// Await `operation` unless the run is cancelled first
    async fn until_cancelled<F>(&self, operation: F) -> OrchestratorResult<()>
    where
        F: Future<Output = OrchestratorResult<()>>,
    {
        if self.cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(OrchestratorError::Cancelled),
            result = operation => result,
        }
    }

    /// Record a batch-fatal error code and hand the error back
    fn fail_batch(&self, context: &str, err: OrchestratorError) -> OrchestratorError {
        if err.is_cancelled() {
            return err;
        }

        self.error_code.store(err.code(), Ordering::SeqCst);
        error!(error_code = err.code(), "Error at {}(): {}", context, err);
        err
    }
}
