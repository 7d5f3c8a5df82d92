use crate::constants::*;
use crate::error::{ArchiveError, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};

/// Escapes ESC, LF and CR so the payload can sit on one line of a PB stream.
pub fn escape(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() + input.len() / 16);
    for &b in input {
        match b {
            ESCAPE_CHAR => output.extend_from_slice(&[ESCAPE_CHAR, ESCAPE_ESCAPE_CHAR]),
            NEWLINE_CHAR => output.extend_from_slice(&[ESCAPE_CHAR, NEWLINE_ESCAPE_CHAR]),
            CARRIAGERETURN_CHAR => {
                output.extend_from_slice(&[ESCAPE_CHAR, CARRIAGERETURN_ESCAPE_CHAR])
            }
            b => output.push(b),
        }
    }
    output
}

/// Reverses [`escape`]. Offsets in errors are relative to `input`.
pub fn unescape(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if b == ESCAPE_CHAR {
            i += 1;
            if i >= input.len() {
                return Err(ArchiveError::format(i - 1, "escape marker at end of input"));
            }
            match input[i] {
                ESCAPE_ESCAPE_CHAR => output.push(ESCAPE_CHAR),
                NEWLINE_ESCAPE_CHAR => output.push(NEWLINE_CHAR),
                CARRIAGERETURN_ESCAPE_CHAR => output.push(CARRIAGERETURN_CHAR),
                other => {
                    return Err(ArchiveError::format(
                        i,
                        format!("unknown escape substitute 0x{:02X}", other),
                    ))
                }
            }
        } else {
            output.push(b);
        }
        i += 1;
    }
    Ok(output)
}

/// Unix timestamp of 00:00:00 UTC on 1 January of `year`.
pub fn year_start(year: i32) -> Option<i64> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

/// Absolute time of a sample stored as seconds into `year` plus nanoseconds.
pub fn timestamp_in_year(year: i32, seconds_into_year: u32, nanos: u32) -> Result<DateTime<Utc>> {
    if nanos >= 1_000_000_000 {
        return Err(ArchiveError::value(
            "nano",
            format!("{} is not below one second", nanos),
        ));
    }
    let start = year_start(year)
        .ok_or_else(|| ArchiveError::value("year", format!("{} is out of range", year)))?;
    Utc.timestamp_opt(start + seconds_into_year as i64, nanos)
        .single()
        .ok_or_else(|| {
            ArchiveError::value(
                "secondsintoyear",
                format!("{} seconds into {} is out of range", seconds_into_year, year),
            )
        })
}

/// Formats a time the way the retrieval servlet expects its `from`/`to` parameters.
pub fn format_date_for_archiver(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
