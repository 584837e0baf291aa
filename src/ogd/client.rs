//! HTTP client for the OGD resource API.

use crate::ingest::fetch::{PageRequest, PageSource};
use crate::ogd::errors::FetchError;
use crate::ogd::json::parse_json_with_context;
use crate::ogd::models::{RawRecord, RecordsEnvelope};
use crate::utils::truncate_on_char_boundary;
use anyhow::Context;
use async_trait::async_trait;
use std::time::Duration;
use tracing::trace;
use url::Url;

/// Upstream error bodies are kept for diagnostics, but only this much of them.
const ERROR_BODY_LIMIT: usize = 512;

/// Reads one OGD resource (dataset) page by page.
pub struct OgdClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl OgdClient {
    /// `base_url` is the platform root (e.g. `https://api.data.gov.in`);
    /// `timeout` bounds every individual page request.
    pub fn new(
        base_url: &str,
        resource_id: &str,
        api_key: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut base = Url::parse(base_url).context("Invalid OGD base URL")?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join(&format!("resource/{resource_id}"))
            .context("Invalid OGD resource id")?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rozgar/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build OGD HTTP client")?;

        Ok(Self {
            http,
            endpoint,
            api_key,
        })
    }

    /// The resource URL without credentials, as recorded on every fact row.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl PageSource for OgdClient {
    async fn fetch_page(&self, request: &PageRequest<'_>) -> Result<Vec<RawRecord>, FetchError> {
        let offset = request.offset;
        let mut query: Vec<(&str, String)> = vec![
            ("api-key", self.api_key.clone()),
            ("format", "json".to_string()),
            ("offset", offset.to_string()),
            ("limit", request.limit.to_string()),
            ("filters[state_name]", request.scope.state_name.clone()),
            (
                "filters[fin_year]",
                request.period.fiscal_year.as_str().to_string(),
            ),
        ];
        if let Some(month) = &request.period.month {
            query.push(("filters[month]", month.clone()));
        }

        let response = self
            .http
            .get(self.endpoint.clone())
            .query(&query)
            .send()
            .await
            .map_err(|e| FetchError::from_transport(offset, e))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            truncate_on_char_boundary(&mut body, ERROR_BODY_LIMIT);
            return Err(FetchError::Status {
                offset,
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_transport(offset, e))?;
        let envelope: RecordsEnvelope = parse_json_with_context(&body)
            .map_err(|source| FetchError::Malformed { offset, source })?;

        trace!(
            offset,
            records = envelope.records.len(),
            bytes = body.len(),
            "Fetched OGD page"
        );
        Ok(envelope.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_resource_path() {
        let client = OgdClient::new(
            "https://api.data.gov.in",
            "ee03643a-ee4c-48c2-ac30-9f2ff26ab722",
            "secret".into(),
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(
            client.endpoint().as_str(),
            "https://api.data.gov.in/resource/ee03643a-ee4c-48c2-ac30-9f2ff26ab722"
        );
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let client = OgdClient::new(
            "http://proxy.local/ogd",
            "abc",
            "secret".into(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.endpoint().as_str(), "http://proxy.local/ogd/resource/abc");
    }

    #[test]
    fn rejects_garbage_base_url() {
        assert!(OgdClient::new("not a url", "abc", String::new(), Duration::from_secs(1)).is_err());
    }
}
