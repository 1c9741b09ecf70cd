//! Utility functions for input parsing and destination directory handling

use crate::error::{Error, Result};
use chrono::NaiveDate;
use std::path::Path;

/// Date formats accepted by [`parse_date`], tried in order
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y%m%d", "%d/%m/%Y"];

/// Parse a duration given as plain seconds, `MM:SS` or `HH:MM:SS`
///
/// # Examples
///
/// ```
/// use media_dl::utils::parse_duration;
///
/// assert_eq!(parse_duration("90").unwrap(), 90);
/// assert_eq!(parse_duration("1:30").unwrap(), 90);
/// assert_eq!(parse_duration("1:00:05").unwrap(), 3605);
/// ```
pub fn parse_duration(input: &str) -> Result<u64> {
    let input = input.trim();
    let invalid = || Error::config(format!("invalid duration '{input}'"), "duration");

    if input.is_empty() {
        return Err(invalid());
    }

    let parts = input
        .split(':')
        .map(|part| part.parse::<u64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>>>()?;

    let total = match parts.as_slice() {
        [secs] => Some(*secs),
        [mins, secs] => mins.checked_mul(60).and_then(|m| m.checked_add(*secs)),
        [hours, mins, secs] => hours
            .checked_mul(3600)
            .and_then(|h| h.checked_add(mins.checked_mul(60)?))
            .and_then(|t| t.checked_add(*secs)),
        _ => None,
    };
    total.ok_or_else(invalid)
}

/// Parse a calendar date given as `YYYY-MM-DD`, `YYYYMMDD` or `DD/MM/YYYY`
///
/// # Examples
///
/// ```
/// use media_dl::utils::parse_date;
/// use chrono::NaiveDate;
///
/// let expected = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
/// assert_eq!(parse_date("2024-03-09").unwrap(), expected);
/// assert_eq!(parse_date("20240309").unwrap(), expected);
/// assert_eq!(parse_date("09/03/2024").unwrap(), expected);
/// ```
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    let input = input.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
        .ok_or_else(|| Error::config(format!("invalid date '{input}'"), "date"))
}

/// Create the destination directory (and parents) if it does not exist
pub async fn ensure_destination(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!(
                "Failed to create destination directory '{}': {}",
                dir.display(),
                e
            ),
        ))
    })
}

/// List the names of regular files directly inside `dir`
///
/// Unreadable directories and entries are logged and ignored; the listing is a
/// best-effort signal, never a reason to fail a batch.
pub async fn list_file_names(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Could not list destination directory");
            return names;
        }
    };

    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let is_file = entry
                    .file_type()
                    .await
                    .map(|t| t.is_file())
                    .unwrap_or(false);
                if is_file {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Error while listing destination directory");
                break;
            }
        }
    }

    names
}
