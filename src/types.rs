use crate::constants::ENUM_HEADER_PREFIX;
use crate::error::{ArchiveError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Sample time: exact seconds and nanoseconds since the Unix epoch.
pub type Timestamp = DateTime<Utc>;

/// Sample value. EPICS short, float and char samples are widened to `Int` and
/// `Double` so every backend reports the same kind for a PV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArchiveValue {
    Double(f64),
    Int(i32),
    Enum(i32),
    String(String),
    DoubleArray(Vec<f64>),
    IntArray(Vec<i32>),
    EnumArray(Vec<i32>),
    StringArray(Vec<String>),
    Bytes(Vec<u8>),
}

/// Discriminant of an [`ArchiveValue`], used to check columns are homogeneous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Double,
    Int,
    Enum,
    String,
    DoubleArray,
    IntArray,
    EnumArray,
    StringArray,
    Bytes,
}

impl ArchiveValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ArchiveValue::Double(_) => ValueKind::Double,
            ArchiveValue::Int(_) => ValueKind::Int,
            ArchiveValue::Enum(_) => ValueKind::Enum,
            ArchiveValue::String(_) => ValueKind::String,
            ArchiveValue::DoubleArray(_) => ValueKind::DoubleArray,
            ArchiveValue::IntArray(_) => ValueKind::IntArray,
            ArchiveValue::EnumArray(_) => ValueKind::EnumArray,
            ArchiveValue::StringArray(_) => ValueKind::StringArray,
            ArchiveValue::Bytes(_) => ValueKind::Bytes,
        }
    }

    /// Extracts a scalar numeric value as f64, if possible
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ArchiveValue::Double(v) => Some(*v),
            ArchiveValue::Int(v) | ArchiveValue::Enum(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Numeric elements as f64; scalars yield one element, strings none.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            ArchiveValue::DoubleArray(v) => v.clone(),
            ArchiveValue::IntArray(v) | ArchiveValue::EnumArray(v) => {
                v.iter().map(|x| *x as f64).collect()
            }
            ArchiveValue::Bytes(v) => v.iter().map(|x| *x as f64).collect(),
            scalar => scalar.as_f64().into_iter().collect(),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            ArchiveValue::DoubleArray(_)
                | ArchiveValue::IntArray(_)
                | ArchiveValue::EnumArray(_)
                | ArchiveValue::StringArray(_)
                | ArchiveValue::Bytes(_)
        )
    }

    fn is_text(&self) -> bool {
        matches!(self, ArchiveValue::String(_) | ArchiveValue::StringArray(_))
    }

    /// Equality of numeric elements within a relative `tolerance`. Text only
    /// equals text.
    pub fn approx_eq(&self, other: &ArchiveValue, tolerance: f64) -> bool {
        match (self, other) {
            (ArchiveValue::String(a), ArchiveValue::String(b)) => a == b,
            (ArchiveValue::StringArray(a), ArchiveValue::StringArray(b)) => a == b,
            (a, b) if a.is_text() || b.is_text() => false,
            (a, b) => {
                let (a, b) = (a.to_f64_vec(), b.to_f64_vec());
                a.len() == b.len()
                    && a.iter().zip(&b).all(|(x, y)| {
                        (x - y).abs() <= tolerance * x.abs().max(y.abs()).max(1.0)
                    })
            }
        }
    }

    /// Enum indices carried by this value, if it is an enum.
    fn enum_indices(&self) -> Option<&[i32]> {
        match self {
            ArchiveValue::Enum(v) => Some(std::slice::from_ref(v)),
            ArchiveValue::EnumArray(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ArchiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveValue::Double(v) => write!(f, "{}", v),
            ArchiveValue::Int(v) | ArchiveValue::Enum(v) => write!(f, "{}", v),
            ArchiveValue::String(v) => write!(f, "{:?}", v),
            ArchiveValue::StringArray(v) => write!(f, "{:?}", v),
            array => write!(f, "{:?}", array.to_f64_vec()),
        }
    }
}

/// EPICS alarm severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum Severity {
    #[default]
    NoAlarm,
    Minor,
    Major,
    Invalid,
    /// Archiver-specific codes such as the disconnection markers.
    Other(i32),
}

impl Severity {
    pub fn as_i32(&self) -> i32 {
        match self {
            Severity::NoAlarm => 0,
            Severity::Minor => 1,
            Severity::Major => 2,
            Severity::Invalid => 3,
            Severity::Other(code) => *code,
        }
    }

    /// Codes above INVALID mark samples the archiver itself injected.
    pub fn is_archiver_marker(&self) -> bool {
        self.as_i32() > Severity::Invalid.as_i32()
    }
}

impl From<i32> for Severity {
    fn from(code: i32) -> Self {
        match code {
            0 => Severity::NoAlarm,
            1 => Severity::Minor,
            2 => Severity::Major,
            3 => Severity::Invalid,
            other => Severity::Other(other),
        }
    }
}

impl From<Severity> for i32 {
    fn from(severity: Severity) -> Self {
        severity.as_i32()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::NoAlarm => write!(f, "NO_ALARM"),
            Severity::Minor => write!(f, "MINOR"),
            Severity::Major => write!(f, "MAJOR"),
            Severity::Invalid => write!(f, "INVALID"),
            Severity::Other(code) => write!(f, "{}", code),
        }
    }
}

/// Enum labels keyed by integer value, parsed from `ENUM_<n>` header fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumOptions(BTreeMap<i32, String>);

impl EnumOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Labels in index order starting from 0.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            labels
                .into_iter()
                .enumerate()
                .map(|(i, label)| (i as i32, label.into()))
                .collect(),
        )
    }

    /// Picks the `ENUM_<n>` entries out of header or meta key/value pairs.
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Self(
            headers
                .into_iter()
                .filter_map(|(key, val)| {
                    let index = key.strip_prefix(ENUM_HEADER_PREFIX)?;
                    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
                        return None;
                    }
                    index.parse::<i32>().ok().map(|i| (i, val.to_string()))
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn lookup(&self, index: i32) -> Option<&str> {
        self.0.get(&index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Checks every enum index in `value` has a label. An empty table accepts anything.
    pub fn check(&self, value: &ArchiveValue) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        if let Some(indices) = value.enum_indices() {
            if let Some(bad) = indices.iter().find(|i| !self.0.contains_key(i)) {
                return Err(ArchiveError::value(
                    "val",
                    format!("enum index {} has no label in {:?}", bad, self.0),
                ));
            }
        }
        Ok(())
    }
}

/// One sample of one PV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEvent {
    pub pv: String,
    pub timestamp: Timestamp,
    pub value: ArchiveValue,
    pub severity: Severity,
    pub status: i32,
    #[serde(default, skip_serializing_if = "EnumOptions::is_empty")]
    pub enum_options: EnumOptions,
}

impl ArchiveEvent {
    pub fn new(
        pv: impl Into<String>,
        timestamp: Timestamp,
        value: ArchiveValue,
        severity: Severity,
    ) -> Self {
        Self {
            pv: pv.into(),
            timestamp,
            value,
            severity,
            status: 0,
            enum_options: EnumOptions::default(),
        }
    }

    pub fn with_status(mut self, status: i32) -> Self {
        self.status = status;
        self
    }

    /// Attaches an enum table, failing if the value has no label in it.
    pub fn with_enum_options(mut self, enum_options: EnumOptions) -> Result<Self> {
        enum_options.check(&self.value)?;
        self.enum_options = enum_options;
        Ok(self)
    }

    pub fn has_enum_options(&self) -> bool {
        !self.enum_options.is_empty()
    }

    /// Label of a scalar enum value.
    pub fn enum_string(&self) -> Option<&str> {
        match self.value {
            ArchiveValue::Enum(index) => self.enum_options.lookup(index),
            _ => None,
        }
    }

    pub fn datetime<Tz: TimeZone>(&self, tz: &Tz) -> DateTime<Tz> {
        self.timestamp.with_timezone(tz)
    }

    pub fn utc_datetime(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for ArchiveEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Archive event for PV {}: timestamp {} value ",
            self.pv,
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.6f %Z")
        )?;
        match self.enum_string() {
            Some(label) => write!(f, "{} ({})", label, self.value)?,
            None => write!(f, "{}", self.value)?,
        }
        write!(f, " severity {}", self.severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ts(secs: i64, nanos: u32) -> Timestamp {
        Utc.timestamp_opt(secs, nanos).unwrap()
    }

    #[test]
    fn test_severity_codes() {
        assert_eq!(Severity::from(2), Severity::Major);
        assert_eq!(Severity::from(3904), Severity::Other(3904));
        assert_eq!(i32::from(Severity::Invalid), 3);
        assert!(Severity::Other(3904).is_archiver_marker());
        assert!(!Severity::Invalid.is_archiver_marker());
        assert_eq!(Severity::default(), Severity::NoAlarm);
    }

    #[test]
    fn test_severity_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Severity::Minor).unwrap(), "1");
        let parsed: Severity = serde_json::from_str("3872").unwrap();
        assert_eq!(parsed, Severity::Other(3872));
    }

    #[test]
    fn test_enum_options_from_headers() {
        let headers = vec![
            ("EGU", "mA"),
            ("ENUM_1", "ON"),
            ("ENUM_0", "OFF"),
            ("ENUM_X", "ignored"),
        ];
        let options = EnumOptions::from_headers(headers);
        assert_eq!(options, EnumOptions::from_labels(["OFF", "ON"]));
        assert_eq!(options.lookup(1), Some("ON"));
        assert_eq!(options.lookup(2), None);
    }

    #[test]
    fn test_enum_string_resolves_label() {
        let event =
            ArchiveEvent::new("TEST:ENUM", ts(0, 0), ArchiveValue::Enum(1), Severity::NoAlarm)
            .with_enum_options(EnumOptions::from_labels(["OFF", "ON"]))
            .unwrap();
        assert_eq!(event.enum_string(), Some("ON"));
        assert!(event.to_string().contains("ON (1)"));
    }

    #[test]
    fn test_enum_index_without_label_is_rejected() {
        let result =
            ArchiveEvent::new("TEST:ENUM", ts(0, 0), ArchiveValue::Enum(2), Severity::NoAlarm)
            .with_enum_options(EnumOptions::from_labels(["OFF", "ON"]));
        assert!(matches!(result, Err(ArchiveError::Value { .. })));
    }

    #[test]
    fn test_event_datetime() {
        let event = ArchiveEvent::new(
            "TEST:PV",
            ts(100, 100_000_000),
            ArchiveValue::Double(1.0),
            Severity::NoAlarm,
        );
        let offset = chrono::FixedOffset::east_opt(3600).unwrap();
        let local = event.datetime(&offset);
        assert_eq!(local.to_rfc3339(), "1970-01-01T01:01:40.100+01:00");
        assert_eq!(event.utc_datetime(), ts(100, 100_000_000));
        assert!(event.to_string().contains("TEST:PV"));
    }

    #[test]
    fn test_value_approx_eq() {
        let a = ArchiveValue::DoubleArray(vec![1.0, 2.0]);
        let b = ArchiveValue::DoubleArray(vec![1.0, 2.0000001]);
        assert!(a.approx_eq(&b, 1e-6));
        assert!(!a.approx_eq(&ArchiveValue::DoubleArray(vec![1.0]), 1e-6));
        assert!(!ArchiveValue::String("a".into()).approx_eq(&ArchiveValue::Double(1.0), 1.0));
    }
}
