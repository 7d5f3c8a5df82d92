//! On-disk layout of archiver storage.
//!
//! A PV such as `SR-DI-DCCT-01:SIGNAL` is stored under
//! `<root>/SR/DI/DCCT/01/` in files named `SIGNAL:<date>.pb`, where the date is
//! `YYYY`, `YYYY_MM`, `YYYY_MM_DD`, `YYYY_MM_DD_HH` or `YYYY_MM_DD_HH_mm`
//! depending on the partition granularity of the store.

use crate::error::{ArchiveError, Result};
use crate::types::Timestamp;
use chrono::{NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use std::path::{Component, Path, PathBuf};

static FILE_DATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r":(\d{4})(?:_(\d{2}))?(?:_(\d{2}))?(?:_(\d{2}))?(?:_(\d{2}))?\.pb$")
        .expect("Failed to compile file date regex")
});

/// Number of path components that are joined with `-` in a PV name.
const DEVICE_PARTS: usize = 4;

/// Directory holding the files of `pv` under `root`, and the file-name stem.
pub fn pv_directory(root: &Path, pv: &str) -> (PathBuf, String) {
    let mut parts: Vec<&str> = pv.split(|c| c == '-' || c == ':').collect();
    let stem = parts.pop().unwrap_or_default().to_string();
    let dir = parts.iter().fold(root.to_path_buf(), |dir, part| dir.join(part));
    (dir, stem)
}

/// Start of the period covered by a PB file, parsed from its name.
pub fn file_date(path: &Path) -> Option<Timestamp> {
    let name = path.file_name()?.to_str()?;
    let caps = FILE_DATE_REGEX.captures(name)?;
    let part = |i: usize, default: u32| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(default)
    };
    let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
    let naive = NaiveDate::from_ymd_opt(year, part(2, 1), part(3, 1))?
        .and_hms_opt(part(4, 0), part(5, 0), 0)?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Every dated PB file of `pv` across `roots`, ordered by date.
pub fn files_for_pv(roots: &[PathBuf], pv: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for root in roots {
        let (dir, stem) = pv_directory(root, pv);
        if !dir.is_dir() {
            continue;
        }
        let prefix = format!("{}:", stem);
        let entries = std::fs::read_dir(&dir).map_err(|e| ArchiveError::io(&dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| ArchiveError::io(&dir, e))?.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with(&prefix));
            if !matches {
                continue;
            }
            if let Some(date) = file_date(&path) {
                files.push((date, path));
            }
        }
    }
    files.sort();
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// Indices into date-ordered `files` of those whose period can overlap
/// `[start, end]`: a file is kept if it starts at or before `end` and the next
/// file starts after `start`.
pub fn window_range(files: &[PathBuf], start: Timestamp, end: Timestamp) -> Range<usize> {
    let starts_by = |t: Timestamp| files.partition_point(|f| file_date(f).map_or(true, |d| d <= t));
    let first = starts_by(start).saturating_sub(1);
    let last = starts_by(end);
    first..last.max(first)
}

/// Files of `pv` whose period can overlap `[start, end]`.
pub fn files_for_window(
    roots: &[PathBuf],
    pv: &str,
    start: Timestamp,
    end: Timestamp,
) -> Result<Vec<PathBuf>> {
    let files = files_for_pv(roots, pv)?;
    Ok(files[window_range(&files, start, end)].to_vec())
}

/// Infers the PV name from a file path relative to a storage root.
pub fn pv_name_from_path(path: &Path) -> Result<String> {
    let mut parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str().map(str::to_string),
            _ => None,
        })
        .collect();
    if let Some(last) = parts.last_mut() {
        let stem = match last.split_once(':') {
            Some((before, _)) => before.to_string(),
            None => last.trim_end_matches(".pb").to_string(),
        };
        *last = stem;
    }

    if parts.len() < DEVICE_PARTS {
        return Err(ArchiveError::value(
            "path",
            format!("{} is too short to name a PV", path.display()),
        ));
    }
    let device = parts[..DEVICE_PARTS].join("-");
    Ok(std::iter::once(device)
        .chain(parts[DEVICE_PARTS..].iter().cloned())
        .collect::<Vec<_>>()
        .join(":"))
}
