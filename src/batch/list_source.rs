//! Member list and tag list files
//!
//! Member list lines look like `12345 "%root%/some artist"`: a member id,
//! optionally followed by a download directory. Tag list lines hold one
//! search each. Blank lines and `#` comments are ignored in both.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::batch::models::WorkItem;

/// Placeholder replaced by the configured root directory
pub const ROOT_PLACEHOLDER: &str = "%root%";

/// Error types for list parsing
#[derive(Error, Debug)]
pub enum ListSourceError {
    #[error("List file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for list parsing
pub type ListSourceResult<T> = Result<T, ListSourceError>;

/// Read a list file, mapping a missing file to `NotFound`
fn read_list_file(path: &Path) -> ListSourceResult<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content.trim_start_matches('\u{feff}').to_string()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(ListSourceError::NotFound(path.display().to_string()))
        }
        Err(e) => Err(ListSourceError::Io(e)),
    }
}

/// Meaningful lines of a list file
fn entries(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

fn is_valid_member_id(id: &str) -> bool {
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Resolve the directory part of a list line
fn resolve_directory(raw: &str, root_directory: &Path) -> Option<PathBuf> {
    let raw = raw.trim().trim_matches('"').trim();
    if raw.is_empty() {
        return None;
    }

    match raw.strip_prefix(ROOT_PLACEHOLDER) {
        Some(rest) => {
            let rest = rest.trim_start_matches(['/', '\\']);
            Some(root_directory.join(rest))
        }
        None => Some(PathBuf::from(raw)),
    }
}

/// Parse one member list line
fn parse_list_line(line: &str, root_directory: &Path) -> Option<WorkItem> {
    let (id, rest) = match line.split_once(char::is_whitespace) {
        Some((id, rest)) => (id, rest),
        None => (line, ""),
    };

    if !is_valid_member_id(id) {
        return None;
    }

    WorkItem::new(id, resolve_directory(rest, root_directory))
}

/// Parse a member list file
pub fn parse_list(path: impl AsRef<Path>, root_directory: impl AsRef<Path>) -> ListSourceResult<Vec<WorkItem>> {
    let path = path.as_ref();
    let root_directory = root_directory.as_ref();
    trace!("Parsing member list {}", path.display());

    let content = read_list_file(path)?;
    let mut items = Vec::new();
    for (number, line) in entries(&content).enumerate() {
        match parse_list_line(line, root_directory) {
            Some(item) => items.push(item),
            None => warn!("Invalid member id on entry {} of {}: {}", number + 1, path.display(), line),
        }
    }

    debug!("Parsed {} members from {}", items.len(), path.display());
    Ok(items)
}

/// Parse a tag list file, one search per line
pub fn parse_tags_list(path: impl AsRef<Path>) -> ListSourceResult<Vec<String>> {
    let path = path.as_ref();
    let content = read_list_file(path)?;
    let tags: Vec<String> = entries(&content).map(str::to_string).collect();

    debug!("Parsed {} tag searches from {}", tags.len(), path.display());
    Ok(tags)
}
