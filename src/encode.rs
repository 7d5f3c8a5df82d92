//! Writes archive data in the PB format, one chunk per calendar year.

use crate::constants::{ENUM_HEADER_PREFIX, NEWLINE_CHAR};
use crate::data::ArchiveData;
use crate::decode::ChunkHeader;
use crate::decode_helpers::{escape, year_start};
use crate::epics::*;
use crate::error::{ArchiveError, Result};
use crate::types::{ArchiveEvent, ArchiveValue, EnumOptions, ValueKind};
use chrono::Datelike;
use prost::Message;
use std::path::Path;

impl From<ValueKind> for PayloadType {
    fn from(kind: ValueKind) -> Self {
        match kind {
            ValueKind::String => PayloadType::ScalarString,
            ValueKind::Enum => PayloadType::ScalarEnum,
            ValueKind::Int => PayloadType::ScalarInt,
            ValueKind::Double => PayloadType::ScalarDouble,
            ValueKind::StringArray => PayloadType::WaveformString,
            ValueKind::EnumArray => PayloadType::WaveformEnum,
            ValueKind::Bytes => PayloadType::V4GenericBytes,
            ValueKind::IntArray => PayloadType::WaveformInt,
            ValueKind::DoubleArray => PayloadType::WaveformDouble,
        }
    }
}

/// Escaped header line, without the terminating LF.
pub fn encode_header(header: &ChunkHeader) -> Vec<u8> {
    escape(&PayloadInfo::from(header).encode_to_vec())
}

/// Escaped sample line for `event` in the chunk described by `header`.
pub fn encode_event(event: &ArchiveEvent, header: &ChunkHeader) -> Result<Vec<u8>> {
    if PayloadType::from(event.value.kind()) != header.value_type {
        return Err(ArchiveError::value(
            "val",
            format!(
                "{:?} value cannot be written to a {:?} chunk",
                event.value.kind(),
                header.value_type
            ),
        ));
    }
    if event.timestamp.year() != header.year {
        return Err(ArchiveError::value(
            "timestamp",
            format!("{} is not in {}", event.timestamp, header.year),
        ));
    }

    let start = year_start(header.year)
        .ok_or_else(|| ArchiveError::value("year", format!("{} is out of range", header.year)))?;
    let secs = u32::try_from(event.timestamp.timestamp() - start).map_err(|_| {
        ArchiveError::value("secondsintoyear", format!("{} is out of range", event.timestamp))
    })?;
    let parts = Parts {
        secs,
        nano: event.timestamp.timestamp_subsec_nanos(),
        severity: event.severity.as_i32(),
        status: event.status,
    };

    let bytes = match event.value.clone() {
        ArchiveValue::String(v) => parts.encode::<ScalarString>(v),
        ArchiveValue::Enum(v) => parts.encode::<ScalarEnum>(v),
        ArchiveValue::Int(v) => parts.encode::<ScalarInt>(v),
        ArchiveValue::Double(v) => parts.encode::<ScalarDouble>(v),
        ArchiveValue::StringArray(v) => parts.encode::<VectorString>(v),
        ArchiveValue::EnumArray(v) => parts.encode::<VectorEnum>(v),
        ArchiveValue::IntArray(v) => parts.encode::<VectorInt>(v),
        ArchiveValue::DoubleArray(v) => parts.encode::<VectorDouble>(v),
        ArchiveValue::Bytes(v) => parts.encode::<V4GenericBytes>(v),
    };
    Ok(escape(&bytes))
}

/// Fields shared by every sample of one event.
struct Parts {
    secs: u32,
    nano: u32,
    severity: i32,
    status: i32,
}

impl Parts {
    fn encode<M: EpicsSample>(&self, val: M::Value) -> Vec<u8> {
        M::from_parts(self.secs, self.nano, val, self.severity, self.status).encode_to_vec()
    }
}

/// Appends one chunk: the header line followed by one line per event.
pub fn write_chunk(out: &mut Vec<u8>, header: &ChunkHeader, events: &[ArchiveEvent]) -> Result<()> {
    out.extend(encode_header(header));
    out.push(NEWLINE_CHAR);
    for event in events {
        out.extend(encode_event(event, header)?);
        out.push(NEWLINE_CHAR);
    }
    Ok(())
}

fn enum_headers(options: &EnumOptions) -> Vec<(String, String)> {
    options
        .iter()
        .map(|(i, label)| (format!("{}{}", ENUM_HEADER_PREFIX, i), label.to_string()))
        .collect()
}

fn element_count(value: &ArchiveValue) -> i32 {
    let count = match value {
        ArchiveValue::StringArray(v) => v.len(),
        ArchiveValue::Bytes(v) => v.len(),
        other if other.is_array() => other.to_f64_vec().len(),
        _ => 1,
    };
    i32::try_from(count).unwrap_or(i32::MAX)
}

/// Serialises `data` as a PB stream. A new chunk starts whenever the year
/// changes; chunks are separated by an empty line.
pub fn write_pb_data(data: &ArchiveData) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let Some(kind) = data.value_kind() else {
        return Ok(out);
    };
    let value_type = PayloadType::from(kind);
    let headers = enum_headers(data.enum_options());

    let events: Vec<ArchiveEvent> = data.iter().collect();
    for (i, group) in events
        .chunk_by(|a, b| a.timestamp.year() == b.timestamp.year())
        .enumerate()
    {
        if i > 0 {
            out.push(NEWLINE_CHAR);
        }
        let header = ChunkHeader::new(data.pv(), value_type, group[0].timestamp.year())
            .with_headers(headers.clone())
            .with_element_count(element_count(&group[0].value));
        write_chunk(&mut out, &header, group)?;
    }
    Ok(out)
}

/// Writes `data` to a `.pb` file, creating parent directories as needed.
pub fn write_pb_file(path: &Path, data: &ArchiveData) -> Result<()> {
    let bytes = write_pb_data(data)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
    }
    std::fs::write(path, bytes).map_err(|e| ArchiveError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::parse_pb_data;
    use crate::types::Severity;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn event(pv: &str, t: chrono::DateTime<Utc>, value: ArchiveValue) -> ArchiveEvent {
        ArchiveEvent::new(pv, t, value, Severity::Minor).with_status(4)
    }

    #[test]
    fn test_year_boundary_starts_new_chunk() {
        let t1 = Utc.with_ymd_and_hms(2019, 12, 31, 23, 59, 59).unwrap();
        let t2 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 1).unwrap();
        let data = ArchiveData::from_events(
            "TEST:PV",
            vec![
                event("TEST:PV", t1, ArchiveValue::Double(1.0)),
                event("TEST:PV", t2, ArchiveValue::Double(2.0)),
            ],
        )
        .unwrap();

        let bytes = write_pb_data(&data).unwrap();
        assert_eq!(crate::chunk::ChunkSplitter::new(&bytes).count(), 2);
        assert_eq!(parse_pb_data(&bytes, "TEST:PV").unwrap(), data);
    }

    #[test]
    fn test_enum_table_survives_encoding() {
        let t = Utc.with_ymd_and_hms(2021, 5, 1, 12, 0, 0).unwrap();
        let data = ArchiveData::new(
            "TEST:ENUM",
            vec![t],
            vec![ArchiveValue::Enum(1)],
            vec![Severity::NoAlarm],
            vec![0],
            EnumOptions::from_labels(["OFF", "ON"]),
        )
        .unwrap();
        let decoded = parse_pb_data(&write_pb_data(&data).unwrap(), "TEST:ENUM").unwrap();
        assert_eq!(decoded.enum_strings(), vec!["ON".to_string()]);
    }

    #[test]
    fn test_wrong_value_kind_is_rejected() {
        let t = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let header = ChunkHeader::new("TEST:PV", PayloadType::ScalarDouble, 2021);
        let err = encode_event(&event("TEST:PV", t, ArchiveValue::Int(1)), &header).unwrap_err();
        assert!(matches!(err, ArchiveError::Value { .. }));
    }

    #[test]
    fn test_bytes_are_written_as_generic_bytes() {
        let t = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let data = ArchiveData::from_events(
            "TEST:V4",
            vec![event("TEST:V4", t, ArchiveValue::Bytes(vec![0x1b, b'\n', 0]))],
        )
        .unwrap();
        let bytes = write_pb_data(&data).unwrap();
        let decoded = parse_pb_data(&bytes, "TEST:V4").unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_empty_data_writes_nothing() {
        assert!(write_pb_data(&ArchiveData::empty("TEST:PV")).unwrap().is_empty());
    }
}
