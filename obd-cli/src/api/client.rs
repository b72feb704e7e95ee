//! HTTP client for the Ontario Builder Directory API

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderName, HeaderValue, REFERER};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;

use super::endpoints::DEFAULT_BASE_URL;
use super::models::{EntityId, Payload};
use super::resilience::{ResilienceConfig, RetryPolicy};
use crate::error::FetchError;

/// User agent of the browser the public directory site expects
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Anything that can answer "give me sub-resource `url` for entity `id`".
///
/// The HTTP client is the production implementation; tests substitute
/// in-memory sources with scripted delays and failures.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    async fn fetch_resource(&self, url: &str, id: &EntityId) -> Result<Payload, FetchError>;
}

/// reqwest-backed registry client with timeout and retry
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl RegistryClient {
    /// Client for the public registry with default headers
    pub fn new(resilience: &ResilienceConfig) -> Result<Self> {
        Self::with_options(DEFAULT_BASE_URL, DEFAULT_USER_AGENT, &BTreeMap::new(), resilience)
    }

    /// Client with an explicit base URL, user agent and extra headers
    pub fn with_options(
        base_url: &str,
        user_agent: &str,
        extra_headers: &BTreeMap<String, String>,
        resilience: &ResilienceConfig,
    ) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let headers = default_headers(&base_url, extra_headers)?;

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .timeout(resilience.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            retry: RetryPolicy::new(resilience.retry.clone()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `url` with query parameters and decode the JSON body, with retries
    pub async fn get_json(&self, url: &str, params: &[(&str, &str)]) -> Result<Value, FetchError> {
        self.retry
            .execute(url, move || self.get_json_once(url, params))
            .await
    }

    async fn get_json_once(&self, url: &str, params: &[(&str, &str)]) -> Result<Value, FetchError> {
        let started = Instant::now();

        let response = self
            .http
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Network {
                url: url.to_string(),
                message: format!("HTTP {}", status),
                status: Some(status.as_u16()),
                timed_out: false,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;

        debug!(
            "GET {} -> {} ({} bytes, {:.0}ms)",
            url,
            status,
            body.len(),
            started.elapsed().as_secs_f64() * 1000.0
        );

        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&body).map_err(|e| FetchError::parse(url, e.to_string()))
    }
}

#[async_trait]
impl RegistrySource for RegistryClient {
    async fn fetch_resource(&self, url: &str, id: &EntityId) -> Result<Payload, FetchError> {
        let value = self.get_json(url, &[("id", id.as_str())]).await?;
        Payload::from_json(value).map_err(|message| FetchError::parse(url, message))
    }
}

fn default_headers(base_url: &str, extra: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-CA,en;q=0.8"));
    headers.insert(
        REFERER,
        HeaderValue::from_str(base_url).context("Base URL is not a valid referer header")?,
    );

    for (name, value) in extra {
        let name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("Invalid header name: {}", name))?;
        let value = HeaderValue::from_str(value)
            .with_context(|| format!("Invalid value for header {}", name))?;
        headers.insert(name, value);
    }

    Ok(headers)
}
