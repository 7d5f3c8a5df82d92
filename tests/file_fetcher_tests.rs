mod common;

use chrono::{Datelike, Duration, TimeZone, Utc};
use common::{double_series, enum_series, series_start};
use pretty_assertions::assert_eq;
use rusty_archive_fetch::chunk::ChunkSplitter;
use rusty_archive_fetch::encode::{write_pb_data, write_pb_file};
use rusty_archive_fetch::storage::{files_for_pv, pv_name_from_path};
use rusty_archive_fetch::validation::check_chunk;
use rusty_archive_fetch::{parse_pb_data, ArchiveData, ErrorKind, Fetcher, PbFileFetcher};
use std::path::Path;

const PV: &str = "SR-DI-DCCT-01:SIGNAL";

/// Lays `data` out in yearly files under `root`.
fn write_yearly(root: &Path, data: &ArchiveData) {
    let (first, second): (Vec<_>, Vec<_>) = data.iter().partition(|e| e.timestamp.year() == 2019);
    let dir = root.join("SR/DI/DCCT/01");
    for (year, events) in [(2019, first), (2020, second)] {
        let part = ArchiveData::from_events(PV, events).unwrap();
        write_pb_file(&dir.join(format!("SIGNAL:{}.pb", year)), &part).unwrap();
    }
}

#[test]
fn test_storage_roots_match_single_stream() {
    let root = tempfile::tempdir().unwrap();
    let data = double_series(PV);
    write_yearly(root.path(), &data);

    let files = files_for_pv(&[root.path().to_path_buf()], PV).unwrap();
    assert_eq!(files.len(), 2);
    let relative = files[1].strip_prefix(root.path()).unwrap();
    assert_eq!(pv_name_from_path(relative).unwrap(), PV);

    let fetcher = PbFileFetcher::from_roots([root.path()]);
    let start = series_start();
    let fetched = fetcher.get_values(PV, start, start + Duration::hours(5)).unwrap();
    assert_eq!(fetched, data);
}

#[test]
fn test_event_at_crosses_file_boundary() {
    let root = tempfile::tempdir().unwrap();
    let data = double_series(PV);
    write_yearly(root.path(), &data);

    let fetcher: Box<dyn Fetcher> = Box::new(PbFileFetcher::from_roots([root.path()]));
    // Before the first 2020 sample, so the answer is the last one of 2019.
    let instant = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap() + Duration::milliseconds(50);
    let event = fetcher.get_event_at(PV, instant).unwrap();
    assert_eq!(event, data.event_at(instant).unwrap());
    assert_eq!(event.timestamp.year(), 2019);

    let later = fetcher.get_event_at(PV, series_start() + Duration::minutes(65)).unwrap();
    assert_eq!(later.timestamp.year(), 2020);
}

#[test]
fn test_single_file_with_enum_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("STATE:2021.pb");
    let data = enum_series("TEST:STATE");
    write_pb_file(&path, &data).unwrap();

    let fetcher = PbFileFetcher::from_file(&path);
    let t = data.timestamps()[0];
    let fetched = fetcher.get_values("TEST:STATE", t, t + Duration::minutes(10)).unwrap();
    assert_eq!(fetched.enum_strings(), vec!["OFF", "ON", "OFF", "ON", "OFF", "ON"]);
}

#[test]
fn test_decoding_is_idempotent() {
    let bytes = write_pb_data(&double_series(PV)).unwrap();
    let first = parse_pb_data(&bytes, PV).unwrap();
    let second = parse_pb_data(&bytes, PV).unwrap();
    assert_eq!(first, second);
    for chunk in ChunkSplitter::new(&bytes) {
        assert!(check_chunk(&chunk).is_empty());
    }
}

#[test]
fn test_corrupt_file_is_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("SIGNAL:2019.pb");
    let mut bytes = write_pb_data(&double_series(PV)).unwrap();
    bytes.truncate(bytes.len() - 4);
    std::fs::write(&path, &bytes).unwrap();

    let fetcher = PbFileFetcher::from_file(&path);
    let start = series_start();
    let err = fetcher.get_values(PV, start, start + Duration::hours(5)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}
