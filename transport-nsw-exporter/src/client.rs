//! Client for the Transport NSW open data API.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::trace;

use crate::config::{ApiToken, UpstreamConfig};
use crate::facility::Facility;

/// Car park endpoint, relative to the API base URL.
pub const CARPARK_ENDPOINT: &str = "carpark";

/// Upper bound on how much of an error body is kept for diagnostics.
const MAX_ERROR_BODY: usize = 1024;

/// Errors from a single upstream request.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid request URL: {0}")]
    Url(String),
    #[error("API token is not a valid header value: {0}")]
    Credential(#[source] reqwest::header::InvalidHeaderValue),
    #[error("perform request: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API error ({status}): {body}")]
    Status { status: StatusCode, body: String },
    #[error("decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Boxed future returned by [`FacilitySource::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Facility, ClientError>> + Send + 'a>>;

/// Anything that can produce a facility document for an identifier.
pub trait FacilitySource: Send + Sync {
    fn fetch<'a>(&'a self, facility_id: &'a str) -> FetchFuture<'a>;
}

/// Authenticated HTTP client for the upstream API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    /// Build a client from the upstream configuration and token.
    pub fn new(config: &UpstreamConfig, token: &ApiToken) -> Result<Self, ClientError> {
        Self::with_base_url(&config.base_url, token, config.timeout())
    }

    /// Build a client against an explicit base URL.
    pub fn with_base_url(
        base_url: &str,
        token: &ApiToken,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        // Url::join drops the last path segment unless it ends with '/'.
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base).map_err(|e| ClientError::Url(e.to_string()))?;

        let mut auth = HeaderValue::from_str(&format!("apikey {}", token.expose()))
            .map_err(ClientError::Credential)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Issue a GET against `endpoint` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let mut url = self
            .base_url
            .join(endpoint)
            .map_err(|e| ClientError::Url(e.to_string()))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        trace!(url = %url, "Upstream request");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let mut body = String::from_utf8_lossy(&body).into_owned();
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            return Err(ClientError::Status { status, body });
        }

        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetch the document for one car park facility.
    pub async fn carpark(&self, facility_id: &str) -> Result<Facility, ClientError> {
        self.get_json(CARPARK_ENDPOINT, &[("facility", facility_id)])
            .await
    }
}

impl FacilitySource for ApiClient {
    fn fetch<'a>(&'a self, facility_id: &'a str) -> FetchFuture<'a> {
        Box::pin(self.carpark(facility_id))
    }
}
