//! HTTP fetcher backed by reqwest.
//!
//! Features:
//! - Per-request timeout and transparent gzip decoding.
//! - `Range` requests for partial fragment reads.
//! - Body size cap and `Content-Length` verification.
//! - Bounded retry with exponential backoff on transport errors and 5xx.
//! - Optional G2O edge-auth request signing.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::BytesMut;
use hmac::{Hmac, Mac};
use reqwest::header::RANGE;
use sha2::Sha256;
use tracing::{debug, warn};
use vodcheck_manifest::{FetchError, FetchRequest, FetchResponse, Fetcher};

use crate::config::{FetchConfig, G2oConfig};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

type HmacSha256 = Hmac<Sha256>;

/// Compute the G2O data and signature header values for `url`.
///
/// The signature is base64(HMAC-SHA256(key, data + path?query)).
pub fn g2o_headers(g2o: &G2oConfig, url: &str, now_secs: i64) -> Option<[(String, String); 2]> {
    if !g2o.is_enabled() {
        return None;
    }
    let parsed = url::Url::parse(url).ok()?;
    let mut uri = parsed.path().to_string();
    if let Some(query) = parsed.query() {
        uri.push('?');
        uri.push_str(query);
    }

    let expiry = now_secs + g2o.window_secs as i64;
    let data = format!(
        "{}, {}, {}, {}, {}, {}",
        g2o.version, g2o.ghost_ip, g2o.client_ip, expiry, g2o.unique_id, g2o.nonce
    );
    let mut mac = HmacSha256::new_from_slice(g2o.key.as_bytes()).ok()?;
    mac.update(data.as_bytes());
    mac.update(uri.as_bytes());
    let sign = STANDARD.encode(mac.finalize().into_bytes());

    Some([
        (g2o.data_header.clone(), data),
        (g2o.sign_header.clone(), sign),
    ])
}

/// [`Fetcher`] over a shared reqwest client.
pub struct ReqwestFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl ReqwestFetcher {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .user_agent(&config.user_agent)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn map_error(url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_decode() || err.is_body() {
            FetchError::Decode {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            FetchError::transport(url, err)
        }
    }

    async fn fetch_once(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = request.url.as_str();
        let mut builder = self.client.get(url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(range) = request.range {
            builder = builder.header(RANGE, range.header_value());
        }
        if let Some(signed) = g2o_headers(&self.config.g2o, url, chrono::Utc::now().timestamp()) {
            for (name, value) in signed {
                builder = builder.header(name, value);
            }
        }

        let mut response = builder
            .send()
            .await
            .map_err(|e| Self::map_error(url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let expected_len = response.content_length();
        let mut headers = Vec::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.push((name.as_str().to_string(), value.to_string()));
            }
        }

        let limit = self.config.max_body_bytes;
        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Self::map_error(url, e))?
        {
            if body.len() + chunk.len() > limit {
                return Err(FetchError::BodyTooLarge {
                    url: url.to_string(),
                    limit,
                });
            }
            body.extend_from_slice(&chunk);
        }

        if let Some(expected) = expected_len {
            if expected != body.len() as u64 {
                return Err(FetchError::LengthMismatch {
                    url: url.to_string(),
                    expected,
                    actual: body.len() as u64,
                });
            }
        }

        let mut result = FetchResponse::new(final_url, status, body.freeze());
        for (name, value) in headers {
            result = result.with_header(&name, value);
        }
        Ok(result)
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut attempt = 0u32;
        loop {
            let result = self.fetch_once(request).await;
            let transient = match &result {
                Ok(response) => response.status >= 500,
                Err(err) => err.is_transient(),
            };
            if !transient || attempt >= self.config.retries {
                if let Ok(response) = &result {
                    debug!(
                        url = %request.url,
                        status = response.status,
                        bytes = response.body.len(),
                        "fetched"
                    );
                }
                return result;
            }

            let wait = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt);
            attempt += 1;
            warn!(
                url = %request.url,
                retry = attempt,
                wait_ms = wait.as_millis() as u64,
                "fetch failed, backing off"
            );
            tokio::time::sleep(wait).await;
        }
    }
}
