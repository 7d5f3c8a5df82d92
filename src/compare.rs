use crate::data::ArchiveData;
use crate::types::ArchiveEvent;
use std::cmp::Ordering;
use tracing::{debug, info, warn, Span};

/// Relative tolerance used when matching values of events at the same time.
pub const VALUE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn name(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// Events found on only one side of a comparison.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideDiff {
    /// Events with no counterpart at the same time on the other side.
    pub extra: Vec<ArchiveEvent>,
    /// Events identical to the previous event on the same side.
    pub duplicates: Vec<ArchiveEvent>,
    /// Events with a severity above INVALID, skipped by the comparison.
    pub invalid: Vec<ArchiveEvent>,
}

impl SideDiff {
    pub fn is_empty(&self) -> bool {
        self.extra.is_empty() && self.duplicates.is_empty() && self.invalid.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveDataDiff {
    pub left: SideDiff,
    pub right: SideDiff,
    /// Pairs at the same timestamp whose value or severity differ.
    pub mismatched: Vec<(ArchiveEvent, ArchiveEvent)>,
}

impl ArchiveDataDiff {
    pub fn side(&self, side: Side) -> &SideDiff {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty() && self.mismatched.is_empty()
    }

    pub fn summarise(&self, span: &Span) {
        for side in [Side::Left, Side::Right] {
            let diff = self.side(side);
            for event in &diff.extra {
                warn!(parent: span, side = side.name(), "Extra event: {}", event);
            }
            for event in &diff.duplicates {
                info!(parent: span, side = side.name(), "Duplicate event: {}", event);
            }
            for event in &diff.invalid {
                info!(parent: span, side = side.name(), "High severity event: {}", event);
            }
        }
        for (left, right) in &self.mismatched {
            warn!(parent: span, "Events differ: left {} right {}", left, right);
        }
    }
}

/// Walks both series in time order and records where they disagree.
pub fn compare_archive_data(left: &ArchiveData, right: &ArchiveData) -> ArchiveDataDiff {
    compare_with_span(left, right, &Span::none())
}

pub fn compare_with_span(left: &ArchiveData, right: &ArchiveData, span: &Span) -> ArchiveDataDiff {
    debug!(parent: span, left = left.len(), right = right.len(), "comparing archive data");

    let mut diff = ArchiveDataDiff::default();
    let mut left_cursor = Cursor::new(left);
    let mut right_cursor = Cursor::new(right);

    loop {
        let l = left_cursor.next_comparable(&mut diff.left);
        let r = right_cursor.next_comparable(&mut diff.right);
        match (l, r) {
            (None, None) => break,
            (Some(l), None) => {
                diff.left.extra.push(l.clone());
                left_cursor.advance(l);
            }
            (None, Some(r)) => {
                diff.right.extra.push(r.clone());
                right_cursor.advance(r);
            }
            (Some(l), Some(r)) => match l.timestamp.cmp(&r.timestamp) {
                Ordering::Less => {
                    diff.left.extra.push(l.clone());
                    left_cursor.advance(l);
                }
                Ordering::Greater => {
                    diff.right.extra.push(r.clone());
                    right_cursor.advance(r);
                }
                Ordering::Equal => {
                    if l.severity != r.severity || !l.value.approx_eq(&r.value, VALUE_TOLERANCE) {
                        diff.mismatched.push((l.clone(), r.clone()));
                    }
                    left_cursor.advance(l);
                    right_cursor.advance(r);
                }
            },
        }
    }
    diff
}

struct Cursor<'a> {
    data: &'a ArchiveData,
    index: usize,
    previous: Option<ArchiveEvent>,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a ArchiveData) -> Self {
        Self {
            data,
            index: 0,
            previous: None,
        }
    }

    /// Next event worth comparing, moving duplicates and invalid events into `diff`.
    fn next_comparable(&mut self, diff: &mut SideDiff) -> Option<ArchiveEvent> {
        while let Ok(event) = self.data.get_event(self.index) {
            if self.previous.as_ref() == Some(&event) {
                diff.duplicates.push(event);
            } else if event.severity.is_archiver_marker() {
                diff.invalid.push(event);
            } else {
                return Some(event);
            }
            self.index += 1;
        }
        None
    }

    fn advance(&mut self, event: ArchiveEvent) {
        self.index += 1;
        self.previous = Some(event);
    }
}
