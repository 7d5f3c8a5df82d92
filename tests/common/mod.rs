#![allow(dead_code)]

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use parking_lot::Mutex;
use prost::Message;
use rusty_archive_fetch::decode::ChunkHeader;
use rusty_archive_fetch::decode_helpers::escape;
use rusty_archive_fetch::encode::{encode_header, write_pb_data};
use rusty_archive_fetch::epics::{EpicsSample, PayloadType};
use rusty_archive_fetch::{
    ArchiveData, ArchiveEvent, ArchiveValue, EnumOptions, Severity, Timestamp,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{mpsc, Arc};

/// What the stub archiver serves, keyed by PV name.
#[derive(Default)]
pub struct StubArchive {
    raw: HashMap<String, Vec<u8>>,
    json: HashMap<String, String>,
    failing: HashSet<String>,
    requests: Mutex<Vec<HashMap<String, String>>>,
}

impl StubArchive {
    pub fn with_data(mut self, data: &ArchiveData) -> Self {
        self.raw
            .insert(data.pv().to_string(), write_pb_data(data).unwrap());
        self.json.insert(data.pv().to_string(), archiver_json(data));
        self
    }

    /// Serves hand-built bodies, as an archiver holding a type the encoder
    /// never writes would.
    pub fn with_bodies(mut self, pv: &str, raw: Vec<u8>, json: String) -> Self {
        self.raw.insert(pv.to_string(), raw);
        self.json.insert(pv.to_string(), json);
        self
    }

    pub fn with_failure(mut self, pv: &str) -> Self {
        self.failing.insert(pv.to_string());
        self
    }

    pub fn requests(&self) -> Vec<HashMap<String, String>> {
        self.requests.lock().clone()
    }
}

/// A running stub archiver. The server lives until the test process exits.
pub struct StubServer {
    pub base_url: String,
    pub archive: Arc<StubArchive>,
}

pub fn start_stub(archive: StubArchive) -> StubServer {
    let archive = Arc::new(archive);
    let state = archive.clone();
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let app = Router::new()
                .route("/retrieval/data/getData.raw", get(raw_handler))
                .route("/retrieval/data/getData.json", get(json_handler))
                .with_state(state);
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });

    let addr = rx.recv().unwrap();
    StubServer {
        base_url: format!("http://{}/retrieval", addr),
        archive,
    }
}

fn lookup<'a, T>(
    archive: &'a StubArchive,
    store: &'a HashMap<String, T>,
    params: HashMap<String, String>,
) -> Result<&'a T, Response> {
    let pv = params.get("pv").cloned().unwrap_or_default();
    archive.requests.lock().push(params);
    if archive.failing.contains(&pv) {
        return Err(StatusCode::INTERNAL_SERVER_ERROR.into_response());
    }
    store
        .get(&pv)
        .ok_or_else(|| StatusCode::NOT_FOUND.into_response())
}

async fn raw_handler(
    State(archive): State<Arc<StubArchive>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match lookup(&archive, &archive.raw, params) {
        Ok(bytes) => (StatusCode::OK, bytes.clone()).into_response(),
        Err(response) => response,
    }
}

async fn json_handler(
    State(archive): State<Arc<StubArchive>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match lookup(&archive, &archive.json, params) {
        Ok(body) => (StatusCode::OK, body.clone()).into_response(),
        Err(response) => response,
    }
}

/// Renders data the way `getData.json` does.
pub fn archiver_json(data: &ArchiveData) -> String {
    let mut meta = serde_json::Map::new();
    meta.insert("name".to_string(), json!(data.pv()));
    meta.insert("PREC".to_string(), json!("3"));
    for (index, label) in data.enum_options().iter() {
        meta.insert(format!("ENUM_{}", index), json!(label));
    }
    let points: Vec<_> = data
        .iter()
        .map(|event| {
            json!({
                "secs": event.timestamp.timestamp(),
                "nanos": event.timestamp.timestamp_subsec_nanos(),
                "val": event.value,
                "severity": event.severity,
                "status": event.status,
            })
        })
        .collect();
    json!([{ "meta": meta, "data": points }]).to_string()
}

/// Raw and JSON bodies for `pv` archived as `M`, one sample a minute from the
/// start of 2021. Each sample carries the value the JSON endpoint prints for it.
pub fn narrow_bodies<M: EpicsSample>(
    pv: &str,
    value_type: PayloadType,
    samples: Vec<(M::Value, serde_json::Value)>,
) -> (Vec<u8>, String) {
    let year_start = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
    let mut raw = encode_header(&ChunkHeader::new(pv, value_type, 2021));
    raw.push(b'\n');

    let mut points = Vec::new();
    for (i, (val, printed)) in samples.into_iter().enumerate() {
        let secs = 60 * i as u32;
        raw.extend(escape(&M::from_parts(secs, 0, val, 0, 0).encode_to_vec()));
        raw.push(b'\n');
        points.push(json!({
            "secs": year_start.timestamp() + i64::from(secs),
            "nanos": 0,
            "val": printed,
            "severity": 0,
            "status": 0,
        }));
    }
    let body = json!([{ "meta": { "name": pv }, "data": points }]).to_string();
    (raw, body)
}

/// Start of the sample series: one hour before the 2020 new year.
pub fn series_start() -> Timestamp {
    Utc.with_ymd_and_hms(2019, 12, 31, 23, 0, 0).unwrap()
}

/// Twenty doubles ten minutes apart, crossing into 2020, with odd nanoseconds.
pub fn double_series(pv: &str) -> ArchiveData {
    let events = (0..20)
        .map(|i| {
            let timestamp = series_start()
                + Duration::minutes(10 * i)
                + Duration::nanoseconds(123_456_789);
            let severity = if i % 7 == 3 { Severity::Minor } else { Severity::NoAlarm };
            let value = ArchiveValue::Double((i as f64).sin() * 100.0);
            ArchiveEvent::new(pv, timestamp, value, severity)
                .with_status(if severity == Severity::Minor { 5 } else { 0 })
        })
        .collect();
    ArchiveData::from_events(pv, events).unwrap()
}

/// Enum samples switching between OFF and ON every minute.
pub fn enum_series(pv: &str) -> ArchiveData {
    let count = 6;
    ArchiveData::new(
        pv,
        (0..count)
            .map(|i| Utc.with_ymd_and_hms(2021, 6, 1, 12, i, 0).unwrap())
            .collect(),
        (0..count as i32).map(|i| ArchiveValue::Enum(i % 2)).collect(),
        vec![Severity::NoAlarm; count as usize],
        vec![0; count as usize],
        EnumOptions::from_labels(["OFF", "ON"]),
    )
    .unwrap()
}
