use crate::error::{ArchiveError, Result};
use crate::search::{find_by_key, TieBreak};
use crate::types::{ArchiveEvent, ArchiveValue, EnumOptions, Severity, Timestamp, ValueKind};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Time series of one PV held as parallel columns.
///
/// Instances are immutable: concatenation and windowing return new values and
/// derived views are recomputed on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ArchiveDataRepr")]
pub struct ArchiveData {
    pv: String,
    timestamps: Vec<Timestamp>,
    values: Vec<ArchiveValue>,
    severities: Vec<Severity>,
    statuses: Vec<i32>,
    enum_options: EnumOptions,
}

/// Serialised form of [`ArchiveData`], checked on the way in.
#[derive(Deserialize)]
struct ArchiveDataRepr {
    pv: String,
    timestamps: Vec<Timestamp>,
    values: Vec<ArchiveValue>,
    severities: Vec<Severity>,
    statuses: Vec<i32>,
    #[serde(default)]
    enum_options: EnumOptions,
}

impl TryFrom<ArchiveDataRepr> for ArchiveData {
    type Error = ArchiveError;

    fn try_from(repr: ArchiveDataRepr) -> Result<Self> {
        ArchiveData::new(
            repr.pv,
            repr.timestamps,
            repr.values,
            repr.severities,
            repr.statuses,
            repr.enum_options,
        )
    }
}

impl ArchiveData {
    pub fn new(
        pv: impl Into<String>,
        timestamps: Vec<Timestamp>,
        values: Vec<ArchiveValue>,
        severities: Vec<Severity>,
        statuses: Vec<i32>,
        enum_options: EnumOptions,
    ) -> Result<Self> {
        let len = timestamps.len();
        if values.len() != len || severities.len() != len || statuses.len() != len {
            return Err(ArchiveError::value(
                "columns",
                format!(
                    "column lengths differ: {} timestamps, {} values, {} severities, {} statuses",
                    len,
                    values.len(),
                    severities.len(),
                    statuses.len()
                ),
            ));
        }
        check_value_kinds(&values)?;
        for value in &values {
            enum_options.check(value)?;
        }
        Ok(Self {
            pv: pv.into(),
            timestamps,
            values,
            severities,
            statuses,
            enum_options,
        })
    }

    pub fn empty(pv: impl Into<String>) -> Self {
        Self {
            pv: pv.into(),
            timestamps: Vec::new(),
            values: Vec::new(),
            severities: Vec::new(),
            statuses: Vec::new(),
            enum_options: EnumOptions::default(),
        }
    }

    pub fn from_events(pv: impl Into<String>, events: Vec<ArchiveEvent>) -> Result<Self> {
        let pv = pv.into();
        let enum_options = events
            .first()
            .map(|e| e.enum_options.clone())
            .unwrap_or_default();

        let mut timestamps = Vec::with_capacity(events.len());
        let mut values = Vec::with_capacity(events.len());
        let mut severities = Vec::with_capacity(events.len());
        let mut statuses = Vec::with_capacity(events.len());

        for event in events {
            if event.pv != pv {
                return Err(ArchiveError::value(
                    "pv",
                    format!("event for {} cannot be added to data for {}", event.pv, pv),
                ));
            }
            if event.enum_options != enum_options {
                return Err(ArchiveError::value(
                    "enum_options",
                    format!("events for {} carry different enum tables", pv),
                ));
            }
            timestamps.push(event.timestamp);
            values.push(event.value);
            severities.push(event.severity);
            statuses.push(event.status);
        }

        Self::new(pv, timestamps, values, severities, statuses, enum_options)
    }

    /// Joins data in input order. All parts must be for the same PV with the
    /// same value kind; an empty enum table is compatible with any other.
    pub fn concatenate(parts: &[ArchiveData]) -> Result<Self> {
        let first = parts
            .first()
            .ok_or_else(|| ArchiveError::value("data", "nothing to concatenate"))?;

        let mut enum_options = EnumOptions::default();
        let mut kind: Option<ValueKind> = None;
        for part in parts {
            if part.pv != first.pv {
                return Err(ArchiveError::value(
                    "pv",
                    format!("cannot concatenate data for {} and {}", first.pv, part.pv),
                ));
            }
            if let Some(part_kind) = part.value_kind() {
                match kind {
                    Some(k) if k != part_kind => {
                        return Err(ArchiveError::value(
                            "values",
                            format!("cannot concatenate {:?} and {:?} values", k, part_kind),
                        ))
                    }
                    _ => kind = Some(part_kind),
                }
            }
            if !part.enum_options.is_empty() {
                if enum_options.is_empty() {
                    enum_options = part.enum_options.clone();
                } else if enum_options != part.enum_options {
                    return Err(ArchiveError::value(
                        "enum_options",
                        format!("enum tables for {} differ between parts", first.pv),
                    ));
                }
            }
        }

        let total = parts.iter().map(ArchiveData::len).sum();
        let mut data = Self::empty(first.pv.clone());
        data.timestamps.reserve(total);
        data.values.reserve(total);
        data.severities.reserve(total);
        data.statuses.reserve(total);
        for part in parts {
            data.timestamps.extend_from_slice(&part.timestamps);
            data.values.extend_from_slice(&part.values);
            data.severities.extend_from_slice(&part.severities);
            data.statuses.extend_from_slice(&part.statuses);
        }
        // Labels adopted from another part must cover every value.
        for value in &data.values {
            enum_options.check(value)?;
        }
        data.enum_options = enum_options;
        Ok(data)
    }

    /// Same data under another PV name, as returned for an alias.
    pub fn with_pv(mut self, pv: impl Into<String>) -> Self {
        self.pv = pv.into();
        self
    }

    pub fn pv(&self) -> &str {
        &self.pv
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    pub fn values(&self) -> &[ArchiveValue] {
        &self.values
    }

    pub fn severities(&self) -> &[Severity] {
        &self.severities
    }

    pub fn statuses(&self) -> &[i32] {
        &self.statuses
    }

    pub fn enum_options(&self) -> &EnumOptions {
        &self.enum_options
    }

    pub fn has_enum_options(&self) -> bool {
        !self.enum_options.is_empty()
    }

    pub fn value_kind(&self) -> Option<ValueKind> {
        self.values.first().map(ArchiveValue::kind)
    }

    pub fn get_event(&self, index: usize) -> Result<ArchiveEvent> {
        if index >= self.len() {
            return Err(ArchiveError::Index {
                index,
                len: self.len(),
            });
        }
        Ok(self.event_unchecked(index))
    }

    fn event_unchecked(&self, index: usize) -> ArchiveEvent {
        ArchiveEvent {
            pv: self.pv.clone(),
            timestamp: self.timestamps[index],
            value: self.values[index].clone(),
            severity: self.severities[index],
            status: self.statuses[index],
            enum_options: self.enum_options.clone(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = ArchiveEvent> + '_ {
        (0..self.len()).map(move |i| self.event_unchecked(i))
    }

    pub fn datetimes<Tz: TimeZone>(&self, tz: &Tz) -> Vec<DateTime<Tz>> {
        self.timestamps.iter().map(|t| t.with_timezone(tz)).collect()
    }

    pub fn utc_datetimes(&self) -> Vec<DateTime<Utc>> {
        self.timestamps.clone()
    }

    /// Labels of scalar enum values. Empty when there is no enum table.
    pub fn enum_strings(&self) -> Vec<String> {
        if self.enum_options.is_empty() {
            return Vec::new();
        }
        self.values
            .iter()
            .map(|value| match value {
                ArchiveValue::Enum(index) => self
                    .enum_options
                    .lookup(*index)
                    .map(str::to_string)
                    .unwrap_or_else(|| index.to_string()),
                other => other.to_string(),
            })
            .collect()
    }

    /// Index of the last event at or before `instant`.
    pub fn index_at(&self, instant: Timestamp) -> Result<usize> {
        find_by_key(&self.timestamps, |t| t, &instant, TieBreak::Last).map_err(|_| {
            ArchiveError::NotFound(format!("no event for {} at or before {}", self.pv, instant))
        })
    }

    /// Event in effect at `instant`: the last one at or before it.
    pub fn event_at(&self, instant: Timestamp) -> Result<ArchiveEvent> {
        self.index_at(instant).map(|i| self.event_unchecked(i))
    }

    /// Events covering `[start, end]`: the last event at or before `start`
    /// followed by every later event up to and including `end`.
    pub fn window(&self, start: Timestamp, end: Timestamp) -> Self {
        let first = self.index_at(start).unwrap_or(0);
        let last = match self.index_at(end) {
            Ok(i) => i + 1,
            Err(_) => 0,
        };
        self.slice(first, last.max(first))
    }

    /// First `n` events.
    pub fn head(&self, n: usize) -> Self {
        self.slice(0, n.min(self.len()))
    }

    fn slice(&self, from: usize, to: usize) -> Self {
        Self {
            pv: self.pv.clone(),
            timestamps: self.timestamps[from..to].to_vec(),
            values: self.values[from..to].to_vec(),
            severities: self.severities[from..to].to_vec(),
            statuses: self.statuses[from..to].to_vec(),
            enum_options: self.enum_options.clone(),
        }
    }
}

fn check_value_kinds(values: &[ArchiveValue]) -> Result<()> {
    if let Some(first) = values.first() {
        let kind = first.kind();
        if let Some(other) = values.iter().find(|v| v.kind() != kind) {
            return Err(ArchiveError::value(
                "values",
                format!("mixed value kinds {:?} and {:?}", kind, other.kind()),
            ));
        }
    }
    Ok(())
}

impl fmt::Display for ArchiveData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => write!(
                f,
                "ArchiveData for PV {}: {} events from {} to {}",
                self.pv,
                self.len(),
                first.format("%Y-%m-%d %H:%M:%S%.6f"),
                last.format("%Y-%m-%d %H:%M:%S%.6f")
            ),
            _ => write!(f, "Empty ArchiveData for PV {}", self.pv),
        }
    }
}
