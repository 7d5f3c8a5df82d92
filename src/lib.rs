//! Retrieval of EPICS Archiver Appliance data.
//!
//! Decodes the archiver's PB format and fetches data from local files, the
//! retrieval servlet (raw or JSON) or a live connection through one
//! [`Fetcher`] interface.

pub mod chunk;
pub mod client;
pub mod compare;
pub mod config;
pub mod constants;
pub mod data;
pub mod decode;
pub mod decode_helpers;
pub mod encode;
pub mod epics;
pub mod error;
pub mod fetcher;
pub mod search;
pub mod storage;
pub mod types;
pub mod validation;

pub use client::ArchiverClient;
pub use config::Config;
pub use data::ArchiveData;
pub use decode::{parse_pb_data, Decoder};
pub use error::{ArchiveError, ErrorKind, Result};
pub use fetcher::{
    Fetcher, JsonFetcher, LiveConnection, LiveFetcher, LiveSample, PbFetcher, PbFileFetcher,
};
pub use types::{ArchiveEvent, ArchiveValue, EnumOptions, Severity, Timestamp};

/// Events of `pv` over `[start, end]` from the archiver described by `config`.
pub fn get_values(
    config: &Config,
    pv: &str,
    start: Timestamp,
    end: Timestamp,
) -> Result<ArchiveData> {
    JsonFetcher::new(config)?.get_values(pv, start, end)
}

/// The event of `pv` in effect at `instant`.
pub fn get_value_at(config: &Config, pv: &str, instant: Timestamp) -> Result<ArchiveEvent> {
    JsonFetcher::new(config)?.get_event_at(pv, instant)
}
