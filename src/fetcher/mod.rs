//! Uniform access to archived data from several backends.
//!
//! Every backend implements [`Fetcher`] and returns the same [`ArchiveData`]
//! for the same underlying samples, so callers can hold a `&dyn Fetcher`
//! without knowing where the data comes from.

mod file;
mod json;
mod live;
mod pb;

pub use file::{PbFileFetcher, PbSource};
pub use json::{parse_json_data, JsonFetcher};
pub use live::{LiveConnection, LiveFetcher, LiveSample};
pub use pb::PbFetcher;

use crate::data::ArchiveData;
use crate::error::{ArchiveError, Result};
use crate::types::{ArchiveEvent, Timestamp};
use crate::validation::Validator;

pub trait Fetcher: Send + Sync {
    /// Events of `pv` covering `[start, end]`: the last event at or before
    /// `start` followed by every event up to and including `end`.
    fn get_values(&self, pv: &str, start: Timestamp, end: Timestamp) -> Result<ArchiveData>;

    /// The event in effect at `instant`.
    fn get_event_at(&self, pv: &str, instant: Timestamp) -> Result<ArchiveEvent> {
        let data = self.get_values(pv, instant, instant)?;
        data.event_at(instant).map_err(|_| {
            ArchiveError::NotFound(format!("No data found for pv {} at timestamp {}", pv, instant))
        })
    }

    /// Like [`Fetcher::get_values`], keeping at most `count` events.
    fn get_values_limited(
        &self,
        pv: &str,
        start: Timestamp,
        end: Timestamp,
        count: usize,
    ) -> Result<ArchiveData> {
        Ok(self.get_values(pv, start, end)?.head(count))
    }
}

fn validate_request(pv: &str, start: Timestamp, end: Timestamp) -> Result<()> {
    Validator::validate_pv_name(pv)?;
    Validator::validate_time_range(start, end)
}
