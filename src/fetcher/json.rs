use super::{validate_request, Fetcher};
use crate::client::ArchiverClient;
use crate::config::Config;
use crate::constants::JSON_ENDPOINT;
use crate::data::ArchiveData;
use crate::error::{ArchiveError, Result};
use crate::types::{ArchiveValue, EnumOptions, Severity, Timestamp};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tracing::{debug, Span};

/// Fetches `getData.json` and maps it onto [`ArchiveData`].
#[derive(Debug, Clone)]
pub struct JsonFetcher {
    client: ArchiverClient,
    span: Span,
}

impl JsonFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: ArchiverClient::new(config)?,
            span: Span::none(),
        })
    }

    pub fn for_host(host: &str, port: u16) -> Result<Self> {
        Self::new(&Config::for_host(host, port))
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.client = self.client.with_span(span.clone());
        self.span = span;
        self
    }
}

impl Fetcher for JsonFetcher {
    fn get_values(&self, pv: &str, start: Timestamp, end: Timestamp) -> Result<ArchiveData> {
        validate_request(pv, start, end)?;
        let url = self.client.data_url(JSON_ENDPOINT, pv, start, end)?;
        match self.client.get_bytes(url)? {
            Some(bytes) => {
                let data = parse_json_data(&bytes, pv)?;
                debug!(parent: &self.span, pv = %pv, events = data.len(), "parsed JSON response");
                Ok(data.window(start, end))
            }
            None => Ok(ArchiveData::empty(pv)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PvDataJson {
    #[serde(default, deserialize_with = "deserialize_meta")]
    meta: HashMap<String, String>,
    #[serde(default)]
    data: Vec<PointJson>,
}

#[derive(Debug, Deserialize)]
struct PointJson {
    secs: i64,
    #[serde(default)]
    nanos: i64,
    val: JsonValue,
    #[serde(default)]
    severity: i32,
    #[serde(default)]
    status: i32,
}

// Meta values arrive as strings or numbers depending on the field.
fn deserialize_meta<'de, D>(
    deserializer: D,
) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: HashMap<String, JsonValue> = Deserialize::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| match value {
            JsonValue::String(s) => Some((key, s)),
            JsonValue::Number(n) => Some((key, n.to_string())),
            JsonValue::Bool(b) => Some((key, b.to_string())),
            _ => None,
        })
        .collect())
}

/// Parses a `getData.json` body for `pv`.
pub fn parse_json_data(body: &[u8], pv: &str) -> Result<ArchiveData> {
    let parsed: Vec<PvDataJson> = serde_json::from_slice(body)?;
    let Some(pv_data) = parsed.into_iter().next() else {
        return Ok(ArchiveData::empty(pv));
    };

    let enum_options =
        EnumOptions::from_headers(pv_data.meta.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    // A column is integral only if every number in it is, so a double PV whose
    // samples happen to print without a fraction still decodes as doubles.
    let integral = pv_data.data.iter().all(|point| all_integers(&point.val));
    let as_enum = integral && !enum_options.is_empty();

    let len = pv_data.data.len();
    let mut timestamps = Vec::with_capacity(len);
    let mut values = Vec::with_capacity(len);
    let mut severities = Vec::with_capacity(len);
    let mut statuses = Vec::with_capacity(len);
    for point in pv_data.data {
        timestamps.push(json_timestamp(point.secs, point.nanos)?);
        values.push(json_value(point.val, integral, as_enum)?);
        severities.push(Severity::from(point.severity));
        statuses.push(point.status);
    }

    ArchiveData::new(pv, timestamps, values, severities, statuses, enum_options)
}

fn json_timestamp(secs: i64, nanos: i64) -> Result<Timestamp> {
    let nanos = u32::try_from(nanos)
        .ok()
        .filter(|n| *n < 1_000_000_000)
        .ok_or_else(|| ArchiveError::value("nanos", format!("{} is not a valid fraction", nanos)))?;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .ok_or_else(|| ArchiveError::value("secs", format!("{} is out of range", secs)))
}

fn all_integers(val: &JsonValue) -> bool {
    match val {
        JsonValue::Number(n) => n.is_i64() || n.is_u64(),
        JsonValue::Array(items) => items.iter().all(all_integers),
        _ => true,
    }
}

fn json_int(n: &serde_json::Number) -> Result<i32> {
    n.as_i64()
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| ArchiveError::value("val", format!("{} is out of range for an int", n)))
}

fn json_float(n: &serde_json::Number) -> Result<f64> {
    n.as_f64()
        .ok_or_else(|| ArchiveError::value("val", format!("{} is not a number", n)))
}

fn json_value(val: JsonValue, integral: bool, as_enum: bool) -> Result<ArchiveValue> {
    match val {
        JsonValue::Number(n) if integral && as_enum => Ok(ArchiveValue::Enum(json_int(&n)?)),
        JsonValue::Number(n) if integral => Ok(ArchiveValue::Int(json_int(&n)?)),
        JsonValue::Number(n) => Ok(ArchiveValue::Double(json_float(&n)?)),
        JsonValue::String(s) => Ok(ArchiveValue::String(s)),
        JsonValue::Array(items) => {
            if !items.is_empty() && items.iter().all(JsonValue::is_string) {
                let strings = items
                    .into_iter()
                    .filter_map(|item| match item {
                        JsonValue::String(s) => Some(s),
                        _ => None,
                    })
                    .collect();
                return Ok(ArchiveValue::StringArray(strings));
            }
            let numbers = items
                .iter()
                .map(|item| match item {
                    JsonValue::Number(n) => Ok(n),
                    other => Err(ArchiveError::value(
                        "val",
                        format!("unexpected array element {}", other),
                    )),
                })
                .collect::<Result<Vec<_>>>()?;
            if integral && as_enum {
                Ok(ArchiveValue::EnumArray(
                    numbers.into_iter().map(json_int).collect::<Result<_>>()?,
                ))
            } else if integral && !numbers.is_empty() {
                Ok(ArchiveValue::IntArray(
                    numbers.into_iter().map(json_int).collect::<Result<_>>()?,
                ))
            } else {
                Ok(ArchiveValue::DoubleArray(
                    numbers.into_iter().map(json_float).collect::<Result<_>>()?,
                ))
            }
        }
        other => Err(ArchiveError::value(
            "val",
            format!("unsupported JSON value {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_doubles() {
        let body = br#"[{"meta": {"name": "TEST:PV", "PREC": "3"},
            "data": [
                {"secs": 1577836800, "nanos": 0, "val": 1.0, "severity": 0, "status": 0},
                {"secs": 1577836801, "nanos": 500000000, "val": 2, "severity": 1, "status": 3}
            ]}]"#;
        let data = parse_json_data(body, "TEST:PV").unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(
            data.values(),
            &[ArchiveValue::Double(1.0), ArchiveValue::Double(2.0)]
        );
        assert_eq!(data.timestamps()[1].timestamp_subsec_nanos(), 500_000_000);
        assert_eq!(data.severities()[1], Severity::Minor);
        assert_eq!(data.statuses()[1], 3);
    }

    #[test]
    fn test_parse_enum_with_meta_labels() {
        let body = br#"[{"meta": {"name": "TEST:ENUM", "ENUM_0": "OFF", "ENUM_1": "ON", "NELM": 1},
            "data": [{"secs": 1577836800, "nanos": 0, "val": 1, "severity": 0, "status": 0}]}]"#;
        let data = parse_json_data(body, "TEST:ENUM").unwrap();
        assert_eq!(data.values(), &[ArchiveValue::Enum(1)]);
        assert_eq!(data.enum_strings(), vec!["ON".to_string()]);
    }

    #[test]
    fn test_enum_index_without_label_fails() {
        let body = br#"[{"meta": {"ENUM_0": "OFF", "ENUM_1": "ON"},
            "data": [{"secs": 1577836800, "nanos": 0, "val": 2, "severity": 0, "status": 0}]}]"#;
        let err = parse_json_data(body, "TEST:ENUM").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
    }

    #[test]
    fn test_parse_waveforms_and_strings() {
        let body = br#"[{"meta": {}, "data": [
            {"secs": 1, "nanos": 0, "val": [1.5, 2, 3], "severity": 0, "status": 0}
        ]}]"#;
        let data = parse_json_data(body, "TEST:WF").unwrap();
        assert_eq!(data.values(), &[ArchiveValue::DoubleArray(vec![1.5, 2.0, 3.0])]);

        let body = br#"[{"data": [{"secs": 1, "val": "hello"}]}]"#;
        let data = parse_json_data(body, "TEST:STR").unwrap();
        assert_eq!(data.values(), &[ArchiveValue::String("hello".to_string())]);
    }

    #[test]
    fn test_empty_and_malformed_bodies() {
        assert!(parse_json_data(b"[]", "TEST:PV").unwrap().is_empty());
        let err = parse_json_data(b"[{\"data\": [", "TEST:PV").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        let body = br#"[{"data": [{"secs": 1, "val": null}]}]"#;
        let err = parse_json_data(body, "TEST:PV").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
    }
}
