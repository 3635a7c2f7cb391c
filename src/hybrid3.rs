use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::domain::MaterialId;
use crate::error::Hybrid3Error;

pub const DEFAULT_BASE_URL: &str = "https://materials.hybrid3.duke.edu";

/// Upstream seam for the HybriD3 materials database. The app only depends on
/// this trait, so tests drive it with in-memory mocks.
pub trait Hybrid3Client: Send + Sync {
    /// All material systems, every page of the listing endpoint.
    fn fetch_systems(&self) -> Result<Vec<Value>, Hybrid3Error>;
    /// All datasets recorded for one material system.
    fn fetch_datasets(&self, id: MaterialId) -> Result<Vec<Value>, Hybrid3Error>;
    fn base_url(&self) -> &str;
}

#[derive(Clone)]
pub struct Hybrid3HttpClient {
    client: Client,
    base_url: String,
}

impl Hybrid3HttpClient {
    pub fn new() -> Result<Self, Hybrid3Error> {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self, Hybrid3Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("hybrid3-dm/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| Hybrid3Error::ApiHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| Hybrid3Error::ApiHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Follows the `count`/`next`/`results` page envelope until `next` is
    /// null, concatenating `results` in page order.
    fn fetch_paginated(&self, first_url: String) -> Result<Vec<Value>, Hybrid3Error> {
        let mut url = Some(first_url);
        let mut results = Vec::new();
        while let Some(page_url) = url {
            let response = self.send_with_retries(|| self.client.get(&page_url))?;
            let response = Self::handle_status(response)?;
            let page: Value = response
                .json()
                .map_err(|err| Hybrid3Error::ApiHttp(err.to_string()))?;
            results.extend(page_results(&page)?);
            url = next_url(&page);
        }
        Ok(results)
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, Hybrid3Error>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        std::thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        std::thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(Hybrid3Error::ApiHttp(err.to_string()));
                }
            }
        }
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, Hybrid3Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "HybriD3 request failed".to_string());
        Err(Hybrid3Error::ApiStatus { status, message })
    }

    fn systems_url(&self) -> String {
        format!("{}/materials/systems/", self.base_url)
    }

    fn datasets_url(&self, id: MaterialId) -> String {
        format!("{}/materials/datasets/?system={id}", self.base_url)
    }
}

impl Hybrid3Client for Hybrid3HttpClient {
    fn fetch_systems(&self) -> Result<Vec<Value>, Hybrid3Error> {
        self.fetch_paginated(self.systems_url())
    }

    fn fetch_datasets(&self, id: MaterialId) -> Result<Vec<Value>, Hybrid3Error> {
        self.fetch_paginated(self.datasets_url(id))
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn page_results(page: &Value) -> Result<Vec<Value>, Hybrid3Error> {
    page.get("results")
        .and_then(|v| v.as_array())
        .cloned()
        .ok_or_else(|| {
            Hybrid3Error::MalformedRecord("page envelope missing `results` list".to_string())
        })
}

fn next_url(page: &Value) -> Option<String> {
    page.get("next")
        .and_then(|v| v.as_str())
        .map(|url| url.to_string())
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
