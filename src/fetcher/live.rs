use super::{validate_request, Fetcher};
use crate::data::ArchiveData;
use crate::error::{ArchiveError, Result};
use crate::types::{ArchiveEvent, ArchiveValue, EnumOptions, Severity, Timestamp};
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, Span};

/// Current value of a PV as reported by a live connection.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSample {
    pub timestamp: Timestamp,
    pub value: ArchiveValue,
    pub severity: Severity,
    pub status: i32,
    pub enum_options: EnumOptions,
}

/// A connection that can read the current sample of a PV, such as a
/// Channel Access or PV Access client.
pub trait LiveConnection: Send {
    fn read(&mut self, pv: &str) -> Result<LiveSample>;
}

/// Serves the current sample of a live connection through [`Fetcher`].
///
/// Only the present can be queried: history is not available.
pub struct LiveFetcher<C> {
    connection: Mutex<C>,
    span: Span,
}

impl<C: LiveConnection> LiveFetcher<C> {
    pub fn new(connection: C) -> Self {
        Self {
            connection: Mutex::new(connection),
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn into_inner(self) -> C {
        self.connection.into_inner()
    }

    fn read(&self, pv: &str) -> Result<ArchiveEvent> {
        let sample = self.connection.lock().read(pv)?;
        debug!(parent: &self.span, pv = %pv, timestamp = %sample.timestamp, "read live sample");
        ArchiveEvent::new(pv, sample.timestamp, sample.value, sample.severity)
            .with_status(sample.status)
            .with_enum_options(sample.enum_options)
    }
}

impl<C: LiveConnection> Fetcher for LiveFetcher<C> {
    fn get_values(&self, pv: &str, start: Timestamp, end: Timestamp) -> Result<ArchiveData> {
        validate_request(pv, start, end)?;
        if end < Utc::now() {
            return Err(ArchiveError::Unsupported(format!(
                "live connection has no history for {} before {}",
                pv, end
            )));
        }
        ArchiveData::from_events(pv, vec![self.read(pv)?])
    }

    fn get_event_at(&self, pv: &str, instant: Timestamp) -> Result<ArchiveEvent> {
        validate_request(pv, instant, instant)?;
        let event = self.read(pv)?;
        if instant < event.timestamp {
            return Err(ArchiveError::Unsupported(format!(
                "live connection has no history for {} at {}",
                pv, instant
            )));
        }
        Ok(event)
    }
}
