//! Content policy filtering for fetched candidates
//!
//! Applies, per candidate and in this order:
//! 1. ad-container skip
//! 2. date cutoff (stops the whole listing)
//! 3. adult-content gate
//! 4. required tags
//! 5. tag blacklist
//! 6. title blacklist (regex search or substring)

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::batch::models::Candidate;

/// Error types for content filtering
#[derive(Error, Debug)]
pub enum ContentFilterError {
    #[error("Invalid title pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid timestamp '{0}' on candidate {1}")]
    InvalidTimestamp(String, String),
}

/// Result type for content filtering
pub type ContentFilterResult<T> = Result<T, ContentFilterError>;

/// How title blacklist entries are matched
#[derive(Debug, Clone)]
enum TitleMatcher {
    Substring(Vec<String>),
    Pattern(Vec<(String, Regex)>),
}

/// Content policy settings
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Reject candidates older than this many days, 0 disables the cutoff
    pub date_diff: i64,
    /// Keep only adult-tagged candidates
    pub r18_mode: bool,
    pub use_blacklist_tags: bool,
    pub blacklist_tags: Vec<String>,
    pub use_blacklist_titles: bool,
    titles: TitleMatcher,
}

impl FilterConfig {
    /// Create filter settings, compiling title patterns when regex matching is on
    pub fn new(
        date_diff: i64,
        r18_mode: bool,
        use_blacklist_tags: bool,
        blacklist_tags: Vec<String>,
        use_blacklist_titles: bool,
        blacklist_titles_regex: bool,
        blacklist_titles: Vec<String>,
    ) -> ContentFilterResult<Self> {
        let titles = if blacklist_titles_regex {
            let patterns = blacklist_titles
                .into_iter()
                .map(|pattern| match Regex::new(&pattern) {
                    Ok(regex) => Ok((pattern, regex)),
                    Err(source) => Err(ContentFilterError::InvalidPattern { pattern, source }),
                })
                .collect::<ContentFilterResult<Vec<_>>>()?;
            TitleMatcher::Pattern(patterns)
        } else {
            TitleMatcher::Substring(blacklist_titles)
        };

        Ok(Self {
            date_diff,
            r18_mode,
            use_blacklist_tags,
            blacklist_tags,
            use_blacklist_titles,
            titles,
        })
    }

    /// Copy with a different date cutoff, 0 disabling it
    pub fn with_date_diff(&self, date_diff: i64) -> Self {
        Self {
            date_diff,
            ..self.clone()
        }
    }

    /// Whether title entries are regular expressions
    pub fn blacklist_titles_regex(&self) -> bool {
        matches!(self.titles, TitleMatcher::Pattern(_))
    }

    /// The title entry that rejects `title`, if any
    fn matching_title_entry(&self, title: &str) -> Option<&str> {
        match &self.titles {
            TitleMatcher::Substring(entries) => entries
                .iter()
                .find(|entry| title.contains(entry.as_str()))
                .map(String::as_str),
            TitleMatcher::Pattern(patterns) => patterns
                .iter()
                .find(|(_, regex)| regex.is_match(title))
                .map(|(pattern, _)| pattern.as_str()),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            date_diff: 0,
            r18_mode: false,
            use_blacklist_tags: false,
            blacklist_tags: Vec::new(),
            use_blacklist_titles: false,
            titles: TitleMatcher::Substring(Vec::new()),
        }
    }
}

/// Outcome of filtering one listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    pub accepted: Vec<String>,
    /// The date cutoff was hit, later pages are older still
    pub stop_early: bool,
    pub r18_skipped: usize,
}

/// Oldest acceptable creation time, `None` when the cutoff is disabled.
///
/// A window reaching past the earliest representable date rejects nothing.
fn date_cutoff(date_diff: i64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if date_diff <= 0 {
        return None;
    }
    TimeDelta::try_days(date_diff).and_then(|window| now.checked_sub_signed(window))
}

/// The "no date available" timestamp, 0001-01-01T00:00:00Z
fn no_date_sentinel() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Parse a candidate timestamp, `None` for the sentinel
fn parse_create_date(candidate: &Candidate) -> ContentFilterResult<Option<DateTime<Utc>>> {
    let raw = candidate.create_date.trim();
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|date| date.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map(|naive| naive.and_utc()))
        .map_err(|_| ContentFilterError::InvalidTimestamp(raw.to_string(), candidate.id.clone()))?;

    if parsed == no_date_sentinel() {
        return Ok(None);
    }
    Ok(Some(parsed))
}

/// Filter a listing against the content policy.
///
/// Precondition: `candidates` are ordered newest-first. The date cutoff stops
/// at the first candidate that is too old; callers that cannot guarantee the
/// order must pass a `config` with `date_diff == 0`.
///
/// Blacklist checks only run on candidates that still carry every required
/// tag.
pub fn apply(
    candidates: &[Candidate],
    config: &FilterConfig,
    required_tags: &[String],
    now: DateTime<Utc>,
) -> ContentFilterResult<FilterOutcome> {
    let mut outcome = FilterOutcome::default();
    let cutoff = date_cutoff(config.date_diff, now);

    for candidate in candidates {
        if candidate.is_ad_container {
            continue;
        }

        if let Some(cutoff) = cutoff {
            if let Some(created) = parse_create_date(candidate)? {
                if created < cutoff {
                    warn!(
                        "Skipping image_id: {} - it's older than: {} day(s).",
                        candidate.id, config.date_diff
                    );
                    outcome.stop_early = true;
                    break;
                }
            }
        }

        if config.r18_mode && !candidate.is_adult() {
            outcome.r18_skipped += 1;
            continue;
        }

        let mut keep = required_tags.iter().all(|tag| candidate.has_tag(tag));
        if !keep {
            debug!("Image {} is missing a required tag", candidate.id);
        }

        if config.use_blacklist_tags && keep {
            if let Some(tag) = config.blacklist_tags.iter().find(|tag| candidate.has_tag(tag)) {
                warn!("Skipping image_id: {} - blacklisted tag: {}", candidate.id, tag);
                keep = false;
            }
        }

        if config.use_blacklist_titles && keep {
            if let Some(entry) = config.matching_title_entry(&candidate.title) {
                if config.blacklist_titles_regex() {
                    warn!("Skipping image_id: {} - Title matched: {}", candidate.id, entry);
                } else {
                    warn!("Skipping image_id: {} - Title contained: {}", candidate.id, entry);
                }
                keep = false;
            }
        }

        if keep {
            outcome.accepted.push(candidate.id.clone());
        }
    }

    if outcome.r18_skipped > 0 {
        warn!("Skipped {} images due to R18-Mode", outcome.r18_skipped);
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn candidate(id: &str, created: DateTime<Utc>, tags: &[&str], title: &str) -> Candidate {
        Candidate {
            id: id.to_string(),
            create_date: created.to_rfc3339(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            title: title.to_string(),
            is_ad_container: false,
        }
    }

    fn titles(regex: bool, entries: &[&str]) -> FilterConfig {
        FilterConfig::new(
            0,
            false,
            false,
            Vec::new(),
            true,
            regex,
            entries.iter().map(|e| e.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_ad_containers_are_skipped() {
        let now = Utc::now();
        let mut ad = candidate("1", now, &[], "");
        ad.is_ad_container = true;
        let plain = candidate("2", now, &[], "");

        let outcome = apply(&[ad, plain], &FilterConfig::default(), &[], now).unwrap();
        assert_eq!(outcome.accepted, vec!["2"]);
    }

    #[test]
    fn test_date_cutoff_stops_listing() {
        let now = Utc::now();
        let config = FilterConfig { date_diff: 7, ..FilterConfig::default() };
        let fresh = candidate("1", now - Duration::days(1), &[], "");
        let stale = candidate("2", now - Duration::days(8), &[], "");
        let fresh_again = candidate("3", now, &[], "");

        let outcome = apply(&[fresh, stale, fresh_again], &config, &[], now).unwrap();
        assert_eq!(outcome.accepted, vec!["1"]);
        assert!(outcome.stop_early);
    }

    #[test]
    fn test_sentinel_date_never_triggers_cutoff() {
        let now = Utc::now();
        let config = FilterConfig { date_diff: 1, ..FilterConfig::default() };
        let undated = Candidate {
            id: "9".to_string(),
            create_date: "0001-01-01T00:00:00+00:00".to_string(),
            tags: Vec::new(),
            title: String::new(),
            is_ad_container: false,
        };

        let outcome = apply(&[undated], &config, &[], now).unwrap();
        assert_eq!(outcome.accepted, vec!["9"]);
        assert!(!outcome.stop_early);
    }

    #[test]
    fn test_cutoff_disabled_accepts_old_candidates() {
        let now = Utc::now();
        let ancient = candidate("1", now - Duration::days(4000), &[], "");
        let outcome = apply(&[ancient], &FilterConfig::default(), &[], now).unwrap();
        assert_eq!(outcome.accepted, vec!["1"]);
        assert!(!outcome.stop_early);
    }

    #[test]
    fn test_out_of_range_date_diff_rejects_nothing() {
        let now = Utc::now();
        let ancient = candidate("1", now - Duration::days(4000), &[], "");

        for date_diff in [-100_000_000, 100_000_000, i64::MAX] {
            let config = FilterConfig { date_diff, ..FilterConfig::default() };
            assert!(apply(&[], &config, &[], now).unwrap().accepted.is_empty());

            let outcome = apply(std::slice::from_ref(&ancient), &config, &[], now).unwrap();
            assert_eq!(outcome.accepted, vec!["1"]);
            assert!(!outcome.stop_early);
        }
    }

    #[test]
    fn test_unparseable_date_is_an_error() {
        let now = Utc::now();
        let config = FilterConfig { date_diff: 3, ..FilterConfig::default() };
        let mut broken = candidate("5", now, &[], "");
        broken.create_date = "yesterday".to_string();

        assert!(matches!(
            apply(&[broken], &config, &[], now),
            Err(ContentFilterError::InvalidTimestamp(_, _))
        ));
    }

    #[test]
    fn test_r18_mode_counts_skips() {
        let now = Utc::now();
        let config = FilterConfig { r18_mode: true, ..FilterConfig::default() };
        let listing = vec![
            candidate("1", now, &["R-18"], ""),
            candidate("2", now, &["safe"], ""),
            candidate("3", now, &[], ""),
            candidate("4", now, &["R-18G", "horror"], ""),
        ];

        let outcome = apply(&listing, &config, &[], now).unwrap();
        assert_eq!(outcome.accepted, vec!["1", "4"]);
        assert_eq!(outcome.r18_skipped, 2);
    }

    #[test]
    fn test_required_tags_must_all_be_present() {
        let now = Utc::now();
        let required = vec!["cat".to_string(), "ears".to_string()];
        let listing = vec![
            candidate("1", now, &["cat", "ears", "tail"], ""),
            candidate("2", now, &["cat"], ""),
        ];

        let outcome = apply(&listing, &FilterConfig::default(), &required, now).unwrap();
        assert_eq!(outcome.accepted, vec!["1"]);
    }

    #[test]
    fn test_tag_blacklist_rejects_exact_tags() {
        let now = Utc::now();
        let config = FilterConfig::new(0, false, true, vec!["gore".to_string()], false, false, Vec::new()).unwrap();
        let listing = vec![
            candidate("1", now, &["gore"], ""),
            candidate("2", now, &["gorey"], ""),
        ];

        let outcome = apply(&listing, &config, &[], now).unwrap();
        assert_eq!(outcome.accepted, vec!["2"]);
    }

    #[test]
    fn test_title_regex_uses_search_semantics() {
        let now = Utc::now();
        let listing = vec![candidate("1", now, &[], "Foo Bar")];

        let regex = apply(&listing, &titles(true, &["^Foo"]), &[], now).unwrap();
        assert!(regex.accepted.is_empty());

        let literal = apply(&listing, &titles(false, &["^Foo"]), &[], now).unwrap();
        assert_eq!(literal.accepted, vec!["1"]);

        let unanchored = apply(&listing, &titles(true, &["Ba"]), &[], now).unwrap();
        assert!(unanchored.accepted.is_empty());
    }

    #[test]
    fn test_title_substring_containment() {
        let now = Utc::now();
        let listing = vec![candidate("1", now, &[], "Foo Bar"), candidate("2", now, &[], "Baz")];

        let outcome = apply(&listing, &titles(false, &["oo B"]), &[], now).unwrap();
        assert_eq!(outcome.accepted, vec!["2"]);
    }

    #[test]
    fn test_blacklist_ignored_once_required_tags_fail() {
        let now = Utc::now();
        let required = vec!["cat".to_string()];
        let config = FilterConfig::new(0, false, true, vec!["gore".to_string()], false, false, Vec::new()).unwrap();
        let listing = vec![
            candidate("1", now, &["gore"], ""),
            candidate("2", now, &["cat", "gore"], ""),
            candidate("3", now, &["cat"], ""),
        ];

        let outcome = apply(&listing, &config, &required, now).unwrap();
        assert_eq!(outcome.accepted, vec!["3"]);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let result = FilterConfig::new(0, false, false, Vec::new(), true, true, vec!["[".to_string()]);
        assert!(matches!(result, Err(ContentFilterError::InvalidPattern { .. })));
    }
}
