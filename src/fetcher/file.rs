use super::{validate_request, Fetcher};
use crate::data::ArchiveData;
use crate::decode::Decoder;
use crate::error::{ArchiveError, Result};
use crate::storage::{files_for_pv, window_range};
use crate::types::Timestamp;
use std::path::{Path, PathBuf};
use tracing::{debug, Span};

/// Where a [`PbFileFetcher`] finds its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PbSource {
    /// A single `.pb` file holding the requested PV.
    File(PathBuf),
    /// Storage roots laid out as the archiver writes them, e.g. STS, MTS and LTS.
    Roots(Vec<PathBuf>),
}

/// Reads PB files directly from disk.
#[derive(Debug, Clone)]
pub struct PbFileFetcher {
    source: PbSource,
    span: Span,
}

impl PbFileFetcher {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: PbSource::File(path.into()),
            span: Span::none(),
        }
    }

    pub fn from_roots<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            source: PbSource::Roots(roots.into_iter().map(Into::into).collect()),
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn source(&self) -> &PbSource {
        &self.source
    }

    fn read_file(&self, decoder: &Decoder, path: &Path, pv: &str) -> Result<ArchiveData> {
        debug!(parent: &self.span, path = %path.display(), "reading PB file");
        let bytes = std::fs::read(path).map_err(|e| ArchiveError::io(path, e))?;
        decoder.decode_stream(&bytes, pv)
    }
}

impl Fetcher for PbFileFetcher {
    fn get_values(&self, pv: &str, start: Timestamp, end: Timestamp) -> Result<ArchiveData> {
        validate_request(pv, start, end)?;
        let decoder = Decoder::new().with_span(self.span.clone());

        let (files, range) = match &self.source {
            PbSource::File(path) => (vec![path.clone()], 0..1),
            PbSource::Roots(roots) => {
                let files = files_for_pv(roots, pv)?;
                let range = window_range(&files, start, end);
                (files, range)
            }
        };

        let mut parts = Vec::new();
        for path in &files[range.clone()] {
            let data = self.read_file(&decoder, path, pv)?;
            if !data.is_empty() {
                parts.push(data);
            }
        }

        // The event in effect at `start` may live in an earlier file.
        let mut previous = range.start;
        while previous > 0 && parts.first().map_or(true, |d| d.timestamps()[0] > start) {
            previous -= 1;
            let data = self.read_file(&decoder, &files[previous], pv)?;
            if !data.is_empty() {
                parts.insert(0, data);
            }
        }

        if parts.is_empty() {
            return Ok(ArchiveData::empty(pv));
        }
        Ok(ArchiveData::concatenate(&parts)?.window(start, end))
    }
}
