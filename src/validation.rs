// validation.rs

use crate::chunk::Chunk;
use crate::data::ArchiveData;
use crate::decode::{decode_header, decode_record};
use crate::error::{ArchiveError, Result};
use crate::types::Timestamp;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::{warn, Span};

// Static Patterns
static PV_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_\-:\.\{\}\[\]<>;]+$").expect("Failed to compile PV name regex")
});

const MAX_PV_NAME_LEN: usize = 255;

#[derive(Debug, Clone)]
pub struct Validator;

impl Validator {
    pub fn validate_pv_name(name: &str) -> Result<()> {
        let mut errors = Vec::new();

        if name.is_empty() {
            errors.push("PV name cannot be empty");
        }

        if name.len() > MAX_PV_NAME_LEN {
            errors.push("PV name exceeds maximum length of 255 characters");
        }

        if !name.is_empty() && !PV_NAME_REGEX.is_match(name) {
            errors.push("PV name contains invalid characters");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ArchiveError::InvalidRequest {
                message: "Invalid PV name".into(),
                context: format!("PV: {}", name),
                validation_errors: errors.into_iter().map(String::from).collect(),
            })
        }
    }

    pub fn validate_time_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
        let mut errors = Vec::new();

        if end < start {
            errors.push("End time must not be before start time");
        }

        if start.timestamp() < 0 {
            errors.push("Start time cannot be before the Unix epoch");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ArchiveError::InvalidRequest {
                message: "Invalid time range".into(),
                context: format!("start: {}, end: {}", start, end),
                validation_errors: errors.into_iter().map(String::from).collect(),
            })
        }
    }
}

/// Problems found while checking a chunk or decoded data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    HeaderNotDecoded,
    EventNotDecoded,
    EventOutOfOrder,
    EventDuplicated,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IssueKind::HeaderNotDecoded => "Header not decoded",
            IssueKind::EventNotDecoded => "Event not decoded",
            IssueKind::EventOutOfOrder => "Event out of order",
            IssueKind::EventDuplicated => "Event duplicated",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkIssue {
    /// Event index within the chunk; `None` for header issues.
    pub index: Option<usize>,
    pub kind: IssueKind,
}

impl fmt::Display for ChunkIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{} at index {}", self.kind, index),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Decodes every record of `chunk` and reports what fails or is out of order.
pub fn check_chunk(chunk: &Chunk<'_>) -> Vec<ChunkIssue> {
    let header = match decode_header(&chunk.header) {
        Ok(header) => header,
        Err(_) => {
            return vec![ChunkIssue {
                index: None,
                kind: IssueKind::HeaderNotDecoded,
            }]
        }
    };

    let mut issues = Vec::new();
    let mut timestamps = Vec::with_capacity(chunk.len());
    for (index, record) in chunk.records.iter().enumerate() {
        match decode_record(record, &header) {
            Ok(event) => timestamps.push((index, event.timestamp)),
            Err(_) => issues.push(ChunkIssue {
                index: Some(index),
                kind: IssueKind::EventNotDecoded,
            }),
        }
    }
    issues.extend(ordering_issues(timestamps));
    issues.sort_by_key(|issue| issue.index);
    issues
}

/// Ordering issues of already decoded data.
pub fn check_ordering(data: &ArchiveData) -> Vec<ChunkIssue> {
    ordering_issues(data.timestamps().iter().copied().enumerate())
}

fn ordering_issues<I>(timestamps: I) -> Vec<ChunkIssue>
where
    I: IntoIterator<Item = (usize, Timestamp)>,
{
    let mut issues = Vec::new();
    let mut latest: Option<Timestamp> = None;
    for (index, timestamp) in timestamps {
        match latest {
            Some(prev) if timestamp < prev => issues.push(ChunkIssue {
                index: Some(index),
                kind: IssueKind::EventOutOfOrder,
            }),
            Some(prev) if timestamp == prev => issues.push(ChunkIssue {
                index: Some(index),
                kind: IssueKind::EventDuplicated,
            }),
            _ => latest = Some(timestamp),
        }
    }
    issues
}

pub fn report_issues(pv: &str, issues: &[ChunkIssue], span: &Span) {
    for issue in issues {
        warn!(parent: span, pv = %pv, "{}", issue);
    }
}
