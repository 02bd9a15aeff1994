//! Ignore-list reconciliation and list import

use std::path::Path;

use tracing::{info, warn};

use crate::batch::error::OrchestratorResult;
use crate::batch::list_source::{ListSourceError, parse_list};
use crate::batch::models::WorkItem;
use crate::batch::store::MemberStore;

/// Remove ignored members from `primary`.
///
/// Each ignore entry removes at most one primary entry, the first one with a
/// matching id. The relative order of the remaining items is preserved.
pub fn reconcile(primary: Vec<WorkItem>, ignore: &[WorkItem]) -> Vec<WorkItem> {
    let mut removed = vec![false; primary.len()];
    for ignored in ignore {
        let hit = primary
            .iter()
            .enumerate()
            .position(|(index, item)| !removed[index] && item.member_id() == ignored.member_id());
        if let Some(index) = hit {
            removed[index] = true;
        }
    }

    primary
        .into_iter()
        .zip(removed)
        .filter_map(|(item, removed)| (!removed).then_some(item))
        .collect()
}

/// Apply the ignore list at `ignore_path` when it exists
pub fn apply_ignore_list(
    primary: Vec<WorkItem>,
    ignore_path: &Path,
    root_directory: &Path,
) -> OrchestratorResult<Vec<WorkItem>> {
    if !ignore_path.exists() {
        return Ok(primary);
    }

    info!("Processing ignore list for member: {}", ignore_path.display());
    let ignore = parse_list(ignore_path, root_directory)?;
    Ok(reconcile(primary, &ignore))
}

/// Import the list at `list_path` into the store.
///
/// A missing list is reported and skipped; it is not an error.
pub fn import_list(
    store: &dyn MemberStore,
    list_path: &Path,
    root_directory: &Path,
) -> OrchestratorResult<usize> {
    let items = match parse_list(list_path, root_directory) {
        Ok(items) => items,
        Err(ListSourceError::NotFound(path)) => {
            warn!("List file not found: {}", path);
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    let count = store.import_list(&items)?;
    info!("Updated {} items.", count);
    Ok(count)
}
