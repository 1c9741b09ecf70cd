//! Entry filter: decides which resolved items a batch should acquire.
//!
//! Rules are evaluated in a fixed order and the first rule that rejects an item
//! wins:
//!
//! 1. items without an identifier are always kept
//! 2. identifiers already in the ledger are skipped (if enabled)
//! 3. items whose file already appears in the destination are skipped
//! 4. known durations outside the configured range are skipped
//! 5. known upload dates outside the configured window are skipped
//! 6. titles not matching the configured pattern are skipped

use crate::config::{FilterRules, NamingPolicy};
use crate::types::{Decision, ItemDescriptor, SkipReason};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

/// Compiled-size limit for user supplied title patterns
const REGEX_SIZE_LIMIT: usize = 1024 * 1024;

/// File names present in the destination directory
///
/// Used as a secondary dedup signal that still works when the ledger is
/// missing or was reset. Matching is by substring on the file name, so it is
/// approximate: a short title can match an unrelated file.
#[derive(Clone, Debug, Default)]
pub struct DestinationListing {
    names: Vec<String>,
}

impl DestinationListing {
    /// Build a listing from known file names
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// List the regular files currently in `dir`
    pub async fn scan(dir: &Path) -> Self {
        Self::new(crate::utils::list_file_names(dir).await)
    }

    /// Whether any file name contains `needle`
    pub fn any_contains(&self, needle: &str) -> bool {
        !needle.is_empty() && self.names.iter().any(|name| name.contains(needle))
    }

    /// Number of files listed
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the destination had no files
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Title pattern, compiled once per batch
#[derive(Clone, Debug)]
enum TitleMatcher {
    /// Lowercased literal, matched case-insensitively
    Substring(String),
    Regex(Regex),
}

impl TitleMatcher {
    fn compile(pattern: &str, as_regex: bool) -> Self {
        if !as_regex {
            return TitleMatcher::Substring(pattern.to_lowercase());
        }

        match regex::RegexBuilder::new(pattern)
            .case_insensitive(true)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
        {
            Ok(re) => TitleMatcher::Regex(re),
            Err(e) => {
                warn!(
                    pattern = %pattern,
                    error = %e,
                    "Invalid title regex, falling back to substring matching"
                );
                TitleMatcher::Substring(pattern.to_lowercase())
            }
        }
    }

    fn matches(&self, title: &str) -> bool {
        match self {
            TitleMatcher::Substring(needle) => title.to_lowercase().contains(needle.as_str()),
            TitleMatcher::Regex(re) => re.is_match(title),
        }
    }
}

/// Entry filter bound to one batch's rules and naming policy
#[derive(Clone, Debug)]
pub struct EntryFilter {
    rules: FilterRules,
    naming: NamingPolicy,
    title: Option<TitleMatcher>,
}

impl EntryFilter {
    /// Compile the rules into a filter
    ///
    /// An invalid title regex is not an error: it is logged and the pattern is
    /// used as a plain substring instead.
    pub fn new(rules: FilterRules, naming: NamingPolicy) -> Self {
        let title = rules
            .match_title
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| TitleMatcher::compile(p, rules.match_regex));
        Self {
            rules,
            naming,
            title,
        }
    }

    /// Decide whether to acquire `item`
    ///
    /// `ledger` is the snapshot taken at batch start and `destination` the
    /// listing taken at the same time.
    pub fn decide(
        &self,
        item: &ItemDescriptor,
        ledger: &HashSet<String>,
        destination: &DestinationListing,
    ) -> Decision {
        let Some(id) = item.id.as_deref() else {
            return Decision::Keep;
        };

        if self.rules.skip_recorded && ledger.contains(id) {
            return Decision::Skip(SkipReason::AlreadyRecorded);
        }

        let collision_key = match self.naming {
            NamingPolicy::EmbedId => id,
            NamingPolicy::PreserveTitle => item.title.as_str(),
        };
        if destination.any_contains(collision_key) {
            return Decision::Skip(SkipReason::FileExists);
        }

        if let Some(duration) = item.duration_secs {
            // Compared unrounded: 100.4 s exceeds a 100 s maximum
            let too_short = self
                .rules
                .min_duration_secs
                .is_some_and(|min| duration < min as f64);
            let too_long = self
                .rules
                .max_duration_secs
                .is_some_and(|max| duration > max as f64);
            if too_short || too_long {
                return Decision::Skip(SkipReason::DurationOutOfRange);
            }
        }

        if let Some(date) = item.upload_date {
            let too_early = self.rules.date_from.is_some_and(|from| date < from);
            let too_late = self.rules.date_to.is_some_and(|to| date > to);
            if too_early || too_late {
                return Decision::Skip(SkipReason::DateOutOfRange);
            }
        }

        if let Some(matcher) = &self.title
            && !matcher.matches(&item.title)
        {
            return Decision::Skip(SkipReason::TitleMismatch);
        }

        Decision::Keep
    }
}

/// One-shot form of [`EntryFilter::decide`]
///
/// Compiles the rules on every call; prefer building an [`EntryFilter`] once
/// when filtering a whole batch.
pub fn decide(
    item: &ItemDescriptor,
    rules: &FilterRules,
    naming: NamingPolicy,
    ledger: &HashSet<String>,
    destination: &DestinationListing,
) -> Decision {
    EntryFilter::new(rules.clone(), naming).decide(item, ledger, destination)
}
