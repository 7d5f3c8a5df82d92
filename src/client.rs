use crate::config::Config;
use crate::decode_helpers::format_date_for_archiver;
use crate::error::{ArchiveError, Result};
use crate::types::Timestamp;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use tracing::{debug, Span};
use url::Url;

/// Blocking client for the retrieval servlet's data endpoints.
#[derive(Debug, Clone)]
pub struct ArchiverClient {
    client: Client,
    base_url: String,
    fetch_latest_metadata: bool,
    span: Span,
}

impl ArchiverClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            fetch_latest_metadata: config.fetch_latest_metadata,
            span: Span::none(),
        })
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, path)).map_err(|e| {
            ArchiveError::InvalidRequest {
                message: format!("Invalid URL: {}", e),
                context: self.base_url.clone(),
                validation_errors: vec![e.to_string()],
            }
        })?;
        url.query_pairs_mut().extend_pairs(params);
        Ok(url)
    }

    /// URL of a data request for `pv` over `[start, end]`.
    pub fn data_url(
        &self,
        endpoint: &str,
        pv: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Url> {
        let from = format_date_for_archiver(&start);
        let to = format_date_for_archiver(&end);
        let mut params = vec![("pv", pv), ("from", from.as_str()), ("to", to.as_str())];
        if self.fetch_latest_metadata {
            params.push(("fetchLatestMetadata", "true"));
        }
        self.build_url(endpoint, &params)
    }

    /// GETs `url`, returning `None` on 404 and the body otherwise.
    pub fn get_bytes(&self, url: Url) -> Result<Option<Vec<u8>>> {
        debug!(parent: &self.span, url = %url, "requesting archived data");
        let response = self.client.get(url.clone()).send()?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(parent: &self.span, url = %url, "no data for request");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ArchiveError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let bytes = response.bytes()?;
        debug!(parent: &self.span, bytes = bytes.len(), "received response body");
        Ok(Some(bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::RAW_ENDPOINT;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_data_url() {
        let client = ArchiverClient::new(&Config::new("http://archiver:17665/retrieval/")).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let url = client.data_url(RAW_ENDPOINT, "SR:C01-BI{BPM:1}Pos:X-I", start, end).unwrap();

        assert_eq!(url.path(), "/retrieval/data/getData.raw");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("pv".to_string(), "SR:C01-BI{BPM:1}Pos:X-I".to_string()),
                ("from".to_string(), "2024-01-01T00:00:00.000Z".to_string()),
                ("to".to_string(), "2024-01-02T00:00:00.000Z".to_string()),
                ("fetchLatestMetadata".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_data_url_without_metadata() {
        let config = Config::new("http://archiver/retrieval").with_latest_metadata(false);
        let client = ArchiverClient::new(&config).unwrap();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let url = client.data_url(RAW_ENDPOINT, "TEST:PV", t, t).unwrap();
        assert!(!url.as_str().contains("fetchLatestMetadata"));
    }

    #[test]
    fn test_bad_base_url_is_invalid_request() {
        let client = ArchiverClient::new(&Config::new("not a url")).unwrap();
        let err = client.build_url("data/getData.json", &[]).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidRequest { .. }));
    }
}
