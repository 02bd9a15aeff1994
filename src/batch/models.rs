//! Work items, tag queries and fetched candidates

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Tag fragment marking adult content
pub const ADULT_TAG_MARKER: &str = "R-18";

/// One member/artist slated for processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    member_id: String,
    root_directory: Option<PathBuf>,
}

impl WorkItem {
    /// Create a work item, `None` when the identifier is blank
    pub fn new(member_id: impl Into<String>, root_directory: Option<PathBuf>) -> Option<Self> {
        let member_id = member_id.into().trim().to_string();
        if member_id.is_empty() {
            return None;
        }

        Some(Self {
            member_id,
            root_directory,
        })
    }

    /// The member identifier
    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    /// Directory hint for this member's downloads
    pub fn root_directory(&self) -> Option<&Path> {
        self.root_directory.as_deref()
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root_directory {
            Some(dir) => write!(f, "{} ({})", self.member_id, dir.display()),
            None => write!(f, "{}", self.member_id),
        }
    }
}

/// Result ordering requested from a tag search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Newest first
    #[default]
    DateD,
    /// Oldest first
    Date,
    /// Most popular first
    PopularD,
}

impl SortOrder {
    /// Whether results arrive newest-first, the order early stops rely on
    pub fn is_newest_first(&self) -> bool {
        matches!(self, SortOrder::DateD)
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::DateD => write!(f, "date_d"),
            SortOrder::Date => write!(f, "date"),
            SortOrder::PopularD => write!(f, "popular_d"),
        }
    }
}

/// A parameterized tag search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagQuery {
    pub tags: String,
    pub start_page: u32,
    /// 0 means "no upper bound"
    pub end_page: u32,
    pub wildcard: bool,
    pub sort_order: SortOrder,
    pub bookmark_count: Option<u32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Member this search was issued for, if any
    pub member_id: Option<String>,
}

impl TagQuery {
    /// Create a query with default paging: page 1, unbounded, wildcard, newest first
    pub fn new(tags: impl Into<String>) -> Self {
        Self {
            tags: tags.into(),
            start_page: 1,
            end_page: 0,
            wildcard: true,
            sort_order: SortOrder::DateD,
            bookmark_count: None,
            start_date: None,
            end_date: None,
            member_id: None,
        }
    }

    /// Copy of this query scoped to a member
    pub fn for_member(&self, member_id: &str) -> Self {
        Self {
            member_id: Some(member_id.to_string()),
            ..self.clone()
        }
    }

    /// Whether `page` lies past the configured end page
    pub fn is_past_end(&self, page: u32) -> bool {
        self.end_page != 0 && page > self.end_page
    }
}

/// A fetched content record awaiting acceptance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    #[serde(rename = "createDate")]
    pub create_date: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "isAdContainer", default)]
    pub is_ad_container: bool,
}

impl Candidate {
    /// Whether any tag marks the candidate as adult content
    pub fn is_adult(&self) -> bool {
        self.tags.iter().any(|tag| tag.contains(ADULT_TAG_MARKER))
    }

    /// Exact tag membership
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
