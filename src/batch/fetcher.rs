//! Member and tag fetching
//!
//! This module provides:
//! 1. The `CandidateSource` contract for listing a member's or a search's content
//! 2. An offline feed source reading JSON listings from a directory
//! 3. The fetch session whose navigation history is reset between members
//! 4. The download pipeline: fetch, filter, dedup, record

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::batch::content_filter::{self, ContentFilterError, FilterConfig};
use crate::batch::dedup::filter_new;
use crate::batch::error::OrchestratorResult;
use crate::batch::models::{Candidate, TagQuery, WorkItem};
use crate::batch::orchestration::{MemberHandler, SessionReset, TagHandler};
use crate::batch::store::{MemberStore, StoreError};

/// Error types for fetching
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Fetch cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed listing: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Status {code}: {message}")]
    Status { code: i32, message: String },

    #[error("Filter error: {0}")]
    Filter(#[from] ContentFilterError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for fetching
pub type FetchResult<T> = Result<T, FetchError>;

/// Lists candidates for members and tag searches
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Every candidate of a member, newest first
    async fn member_candidates(&self, member_id: &str) -> FetchResult<Vec<Candidate>>;

    /// One page of a tag search, `None` past the last page
    async fn tag_page(&self, query: &TagQuery, page: u32) -> FetchResult<Option<Vec<Candidate>>>;
}

/// Transient navigation state of the current fetch
#[derive(Debug, Default)]
pub struct FetchSession {
    history: Mutex<Vec<String>>,
}

impl FetchSession {
    /// Create an empty session
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a visited location
    pub fn visit(&self, location: impl Into<String>) {
        let location = location.into();
        trace!("Visiting {}", location);
        self.history.lock().push(location);
    }

    /// Locations visited since the last reset
    #[cfg(test)]
    pub fn history(&self) -> Vec<String> {
        self.history.lock().clone()
    }
}

impl SessionReset for FetchSession {
    fn clear_history(&self) {
        let mut history = self.history.lock();
        debug!("Clearing {} session history entries", history.len());
        history.clear();
    }
}

/// File-name-safe form of a search
fn slug(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Reads listings from `member_<id>.json` and `tag_<slug>_p<page>.json` files
pub struct FeedSource {
    feed_dir: PathBuf,
    session: Arc<FetchSession>,
}

impl FeedSource {
    /// Create a feed source over `feed_dir`
    pub fn new(feed_dir: impl Into<PathBuf>, session: Arc<FetchSession>) -> Self {
        Self {
            feed_dir: feed_dir.into(),
            session,
        }
    }

    fn tag_file_name(query: &TagQuery, page: u32) -> String {
        match &query.member_id {
            Some(member_id) => format!("tag_{}_{}_p{}.json", slug(&query.tags), slug(member_id), page),
            None => format!("tag_{}_p{}.json", slug(&query.tags), page),
        }
    }

    async fn read_listing(&self, file_name: &str) -> FetchResult<Option<Vec<Candidate>>> {
        let path = self.feed_dir.join(file_name);
        self.session.visit(path.display().to_string());

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FetchError::Io(e)),
        }
    }
}

#[async_trait]
impl CandidateSource for FeedSource {
    async fn member_candidates(&self, member_id: &str) -> FetchResult<Vec<Candidate>> {
        let file_name = format!("member_{}.json", slug(member_id));
        self.read_listing(&file_name).await?.ok_or_else(|| FetchError::Status {
            code: 404,
            message: format!("Member {} not found", member_id),
        })
    }

    async fn tag_page(&self, query: &TagQuery, page: u32) -> FetchResult<Option<Vec<Candidate>>> {
        self.read_listing(&Self::tag_file_name(query, page)).await
    }
}

/// Fetch, filter, dedup and record content for members and searches
pub struct DownloadPipeline {
    source: Arc<dyn CandidateSource>,
    store: Arc<dyn MemberStore>,
    filter: FilterConfig,
    required_tags: Vec<String>,
    check_limit: Option<usize>,
    cancel: CancellationToken,
}

impl DownloadPipeline {
    /// Create a new download pipeline stopping between steps once `cancel` fires
    pub fn new(
        source: Arc<dyn CandidateSource>,
        store: Arc<dyn MemberStore>,
        filter: FilterConfig,
        required_tags: Vec<String>,
        check_limit: Option<usize>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            store,
            filter,
            required_tags,
            check_limit,
            cancel,
        }
    }

    fn check_cancelled(&self) -> FetchResult<()> {
        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        Ok(())
    }

    /// Filter a listing and keep the ids not downloaded yet.
    ///
    /// Early stops are only used when `newest_first` holds.
    fn select(&self, candidates: &[Candidate], newest_first: bool) -> FetchResult<(Vec<String>, bool)> {
        let outcome = if newest_first {
            content_filter::apply(candidates, &self.filter, &self.required_tags, Utc::now())?
        } else {
            let unordered = self.filter.with_date_diff(0);
            content_filter::apply(candidates, &unordered, &self.required_tags, Utc::now())?
        };

        let limit = if newest_first { self.check_limit } else { None };
        let mut lookup_failure = None;
        let new_ids = filter_new(
            |id| match self.store.select_image_by_image_id(id) {
                Ok(found) => found,
                Err(e) => {
                    lookup_failure.get_or_insert(e);
                    true
                }
            },
            limit,
            &outcome.accepted,
        );

        if let Some(e) = lookup_failure {
            return Err(FetchError::Store(e));
        }
        Ok((new_ids, outcome.stop_early))
    }

    /// Record accepted images as downloaded
    fn download(&self, image_ids: &[String], member_id: Option<&str>) -> FetchResult<()> {
        for image_id in image_ids {
            self.check_cancelled()?;
            info!("Downloading image {}", image_id);
            self.store.record_image(image_id, member_id)?;
        }

        Ok(())
    }

    async fn fetch_member(&self, item: &WorkItem, title_prefix: &str) -> FetchResult<usize> {
        info!("{}Processing Member Id: {}", title_prefix, item.member_id());
        self.check_cancelled()?;
        let candidates = self.source.member_candidates(item.member_id()).await?;
        let (new_ids, _) = self.select(&candidates, true)?;

        self.download(&new_ids, Some(item.member_id()))?;
        info!(
            "{}Member {}: {} new of {} listed",
            title_prefix,
            item.member_id(),
            new_ids.len(),
            candidates.len()
        );
        Ok(new_ids.len())
    }

    async fn fetch_tags(&self, query: &TagQuery) -> FetchResult<usize> {
        info!("Searching for tags: {} (order: {})", query.tags, query.sort_order);
        let newest_first = query.sort_order.is_newest_first();
        if !newest_first && self.filter.date_diff > 0 {
            warn!("Date cutoff cannot stop early for order {}, scanning every page", query.sort_order);
        }

        let mut downloaded = 0;
        let mut page = query.start_page.max(1);
        while !query.is_past_end(page) {
            self.check_cancelled()?;
            let Some(candidates) = self.source.tag_page(query, page).await? else {
                debug!("No page {} for tags {}", page, query.tags);
                break;
            };

            let (new_ids, stop_early) = self.select(&candidates, newest_first)?;
            self.download(&new_ids, query.member_id.as_deref())?;
            downloaded += new_ids.len();

            if stop_early {
                info!("Reached the date cutoff on page {}", page);
                break;
            }
            page += 1;
        }

        info!("Tags {}: {} new images", query.tags, downloaded);
        Ok(downloaded)
    }
}

#[async_trait]
impl MemberHandler for DownloadPipeline {
    async fn process_member(&self, item: &WorkItem, title_prefix: &str) -> OrchestratorResult<()> {
        self.fetch_member(item, title_prefix).await?;
        Ok(())
    }
}

#[async_trait]
impl TagHandler for DownloadPipeline {
    async fn process_tags(&self, query: &TagQuery) -> OrchestratorResult<()> {
        self.fetch_tags(query).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::models::SortOrder;
    use crate::batch::store::SqliteStore;
    use chrono::Duration;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn listing(entries: &[(&str, i64, &[&str])]) -> String {
        let now = Utc::now();
        let candidates: Vec<Candidate> = entries
            .iter()
            .map(|(id, age_days, tags)| Candidate {
                id: id.to_string(),
                create_date: (now - Duration::days(*age_days)).to_rfc3339(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                title: format!("title {}", id),
                is_ad_container: false,
            })
            .collect();
        serde_json::to_string(&candidates).unwrap()
    }

    struct Fixture {
        dir: TempDir,
        session: Arc<FetchSession>,
        store: Arc<SqliteStore>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempdir().unwrap(),
                session: Arc::new(FetchSession::new()),
                store: Arc::new(SqliteStore::in_memory().unwrap()),
            }
        }

        fn feed(&self, name: &str, content: String) {
            fs::write(self.dir.path().join(name), content).unwrap();
        }

        fn pipeline(&self, filter: FilterConfig, check_limit: Option<usize>) -> DownloadPipeline {
            self.pipeline_with_token(filter, check_limit, CancellationToken::new())
        }

        fn pipeline_with_token(
            &self,
            filter: FilterConfig,
            check_limit: Option<usize>,
            cancel: CancellationToken,
        ) -> DownloadPipeline {
            DownloadPipeline::new(
                Arc::new(FeedSource::new(self.dir.path(), self.session.clone())),
                self.store.clone(),
                filter,
                Vec::new(),
                check_limit,
                cancel,
            )
        }
    }

    #[test]
    fn test_session_history_is_cleared() {
        let session = FetchSession::new();
        session.visit("a");
        session.visit("b");
        assert_eq!(session.history(), vec!["a", "b"]);

        session.clear_history();
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_slug_replaces_separators() {
        assert_eq!(slug(" Cat Ears/R-18 "), "cat_ears_r_18");
    }

    #[tokio::test]
    async fn test_member_images_are_recorded_once() {
        let fixture = Fixture::new();
        fixture.feed("member_12.json", listing(&[("3", 0, &[]), ("2", 1, &[]), ("1", 2, &[])]));
        let pipeline = fixture.pipeline(FilterConfig::default(), None);
        let item = WorkItem::new("12", None).unwrap();

        assert_eq!(pipeline.fetch_member(&item, "[1 of 1] ").await.unwrap(), 3);
        assert!(fixture.store.select_image_by_image_id("2").unwrap());
        assert_eq!(pipeline.fetch_member(&item, "[1 of 1] ").await.unwrap(), 0);
        assert_eq!(fixture.session.history().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_member_listing_is_a_status_error() {
        let fixture = Fixture::new();
        let pipeline = fixture.pipeline(FilterConfig::default(), None);
        let item = WorkItem::new("99", None).unwrap();

        let result = pipeline.fetch_member(&item, "").await;
        assert!(matches!(result, Err(FetchError::Status { code: 404, .. })));
    }

    #[tokio::test]
    async fn test_tag_pages_stop_at_date_cutoff() {
        let fixture = Fixture::new();
        fixture.feed("tag_sunset_p1.json", listing(&[("10", 0, &[]), ("9", 1, &[])]));
        fixture.feed("tag_sunset_p2.json", listing(&[("8", 2, &[]), ("7", 30, &[])]));
        fixture.feed("tag_sunset_p3.json", listing(&[("6", 40, &[])]));
        let filter = FilterConfig::default().with_date_diff(7);
        let pipeline = fixture.pipeline(filter, None);

        let downloaded = pipeline.fetch_tags(&TagQuery::new("sunset")).await.unwrap();

        assert_eq!(downloaded, 3);
        assert!(!fixture.store.select_image_by_image_id("7").unwrap());
        assert_eq!(fixture.session.history().len(), 2);
    }

    #[tokio::test]
    async fn test_tag_pages_respect_end_page() {
        let fixture = Fixture::new();
        fixture.feed("tag_sunset_p1.json", listing(&[("2", 0, &[])]));
        fixture.feed("tag_sunset_p2.json", listing(&[("1", 0, &[])]));
        let pipeline = fixture.pipeline(FilterConfig::default(), None);
        let mut query = TagQuery::new("sunset");
        query.end_page = 1;

        assert_eq!(pipeline.fetch_tags(&query).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unordered_search_disables_early_stops() {
        let fixture = Fixture::new();
        fixture.feed("tag_sunset_p1.json", listing(&[("1", 30, &[]), ("2", 0, &[])]));
        let filter = FilterConfig::default().with_date_diff(7);
        let pipeline = fixture.pipeline(filter, Some(1));
        let mut query = TagQuery::new("sunset");
        query.sort_order = SortOrder::PopularD;

        assert_eq!(pipeline.fetch_tags(&query).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_pipeline_records_nothing() {
        let fixture = Fixture::new();
        fixture.feed("tag_sunset_p1.json", listing(&[("2", 0, &[]), ("1", 0, &[])]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pipeline = fixture.pipeline_with_token(FilterConfig::default(), None, cancel);

        let result = pipeline.fetch_tags(&TagQuery::new("sunset")).await;

        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert!(!fixture.store.select_image_by_image_id("2").unwrap());
        assert!(fixture.session.history().is_empty());

        let member = pipeline.process_member(&WorkItem::new("12", None).unwrap(), "").await;
        assert!(matches!(member, Err(crate::batch::error::OrchestratorError::Cancelled)));
    }

    #[tokio::test]
    async fn test_member_scoped_search_uses_member_feed() {
        let fixture = Fixture::new();
        fixture.feed("tag_sunset_41_p1.json", listing(&[("5", 0, &[])]));
        let pipeline = fixture.pipeline(FilterConfig::default(), None);

        let query = TagQuery::new("sunset").for_member("41");
        pipeline.process_tags(&query).await.unwrap();

        assert!(fixture.store.select_image_by_image_id("5").unwrap());
    }
}
