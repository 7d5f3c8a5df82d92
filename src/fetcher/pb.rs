use super::{validate_request, Fetcher};
use crate::client::ArchiverClient;
use crate::config::Config;
use crate::constants::RAW_ENDPOINT;
use crate::data::ArchiveData;
use crate::decode::Decoder;
use crate::error::Result;
use crate::types::Timestamp;
use tracing::Span;

/// Fetches the PB stream served by `getData.raw` and decodes it locally.
#[derive(Debug, Clone)]
pub struct PbFetcher {
    client: ArchiverClient,
    span: Span,
}

impl PbFetcher {
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

impl Fetcher for PbFetcher {
    fn get_values(&self, pv: &str, start: Timestamp, end: Timestamp) -> Result<ArchiveData> {
        validate_request(pv, start, end)?;
        let url = self.client.data_url(RAW_ENDPOINT, pv, start, end)?;
        match self.client.get_bytes(url)? {
            Some(bytes) => Ok(Decoder::new()
                .with_span(self.span.clone())
                .decode_stream(&bytes, pv)?
                .window(start, end)),
            None => Ok(ArchiveData::empty(pv)),
        }
    }
}
