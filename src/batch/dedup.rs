//! Already-downloaded check with consecutive-hit early stop

use tracing::info;

/// Keep the ids `existing` does not know about.
///
/// Precondition: `candidates` are ordered newest-first. With `limit` set, the
/// scan ends as soon as `limit` consecutive ids are already known, on the
/// assumption that everything past that point was fetched by an earlier run.
/// Pass `None` when the order cannot be guaranteed.
pub fn filter_new<F>(mut existing: F, limit: Option<usize>, candidates: &[String]) -> Vec<String>
where
    F: FnMut(&str) -> bool,
{
    let mut consecutive_known = 0usize;
    let mut new_ids = Vec::new();

    for id in candidates {
        if existing(id) {
            info!("Already downloaded in DB: {}", id);
            consecutive_known += 1;
        } else {
            consecutive_known = 0;
            new_ids.push(id.clone());
        }

        if limit.is_some_and(|limit| consecutive_known == limit) {
            info!("Reached {} consecutive downloaded images, stopping", consecutive_known);
            return new_ids;
        }
    }

    new_ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_limit_stops_after_consecutive_known() {
        let known: HashSet<&str> = ["A", "B", "D", "E", "F"].into_iter().collect();
        let checked = RefCell::new(Vec::new());

        let result = filter_new(
            |id| {
                checked.borrow_mut().push(id.to_string());
                known.contains(id)
            },
            Some(3),
            &ids(&["A", "B", "C", "D", "E", "F", "G"]),
        );

        assert_eq!(result, ids(&["C"]));
        assert_eq!(*checked.borrow(), ids(&["A", "B", "C", "D", "E", "F"]));
    }

    #[test]
    fn test_without_limit_every_new_id_is_kept() {
        let known: HashSet<&str> = ["A", "B", "C"].into_iter().collect();
        let result = filter_new(|id| known.contains(id), None, &ids(&["A", "B", "C", "D", "A", "E"]));
        assert_eq!(result, ids(&["D", "E"]));
    }

    #[test]
    fn test_new_id_resets_the_counter() {
        let known: HashSet<&str> = ["A", "C"].into_iter().collect();
        let result = filter_new(|id| known.contains(id), Some(2), &ids(&["A", "B", "C", "D"]));
        assert_eq!(result, ids(&["B", "D"]));
    }

    #[test]
    fn test_empty_listing() {
        assert!(filter_new(|_| true, Some(1), &[]).is_empty());
    }
}
