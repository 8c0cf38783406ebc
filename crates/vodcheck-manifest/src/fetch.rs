//! The fetch capability the enumerators and the pipeline run on.
//!
//! Everything that touches the network goes through [`Fetcher`], so nested
//! manifest resolution can be exercised against [`StaticFetcher`] without a
//! live server.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::error::FetchError;

/// Inclusive-start byte range of `length` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// First byte past the range.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Value for a `Range` request header.
    pub fn header_value(&self) -> String {
        format!(
            "bytes={}-{}",
            self.offset,
            self.end().saturating_sub(1).max(self.offset)
        )
    }
}

/// A GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub range: Option<ByteRange>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            range: None,
        }
    }

    pub fn with_headers(mut self, headers: &[(String, String)]) -> Self {
        self.headers.extend_from_slice(headers);
        self
    }

    pub fn with_range(mut self, range: ByteRange) -> Self {
        self.range = Some(range);
        self
    }
}

/// A completed response. Header names are lower-cased; a header may repeat.
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: Bytes,
    /// Final URL after redirects; relative references resolve against it.
    pub url: String,
}

impl FetchResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
            url: url.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    /// First value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// All values of a header, in arrival order.
    pub fn header_all(&self, name: &str) -> &[String] {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Async HTTP GET.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        (**self).fetch(request).await
    }
}

/// Fetch and turn any non-2xx status into [`FetchError::Status`].
pub async fn fetch_ok(
    fetcher: &dyn Fetcher,
    request: &FetchRequest,
) -> Result<FetchResponse, FetchError> {
    let response = fetcher.fetch(request).await?;
    if !response.is_success() {
        return Err(FetchError::status(&request.url, response.status));
    }
    Ok(response)
}

/// A fetcher plus the headers every request of a run carries.
#[derive(Clone)]
pub struct FetchContext<'a> {
    fetcher: &'a dyn Fetcher,
    headers: Vec<(String, String)>,
}

impl<'a> FetchContext<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, headers: Vec<(String, String)>) -> Self {
        Self { fetcher, headers }
    }

    pub fn fetcher(&self) -> &'a dyn Fetcher {
        self.fetcher
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn request(&self, url: &str) -> FetchRequest {
        FetchRequest::new(url).with_headers(&self.headers)
    }

    /// GET a whole resource, failing on non-2xx.
    pub async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        fetch_ok(self.fetcher, &self.request(url)).await
    }

    /// GET a byte range, failing on non-2xx.
    pub async fn get_range(
        &self,
        url: &str,
        range: Option<ByteRange>,
    ) -> Result<FetchResponse, FetchError> {
        let mut request = self.request(url);
        request.range = range;
        fetch_ok(self.fetcher, &request).await
    }
}

/// In-memory fetcher serving canned responses.
///
/// Unknown URLs answer 404. Range requests against a 200 response are served
/// as 206 with the requested slice. Every request is recorded.
#[derive(Default)]
pub struct StaticFetcher {
    responses: HashMap<String, FetchResponse>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with the given content type at `url`.
    pub fn with(self, url: &str, content_type: &str, body: impl Into<Bytes>) -> Self {
        let response = FetchResponse::new(url, 200, body).with_header("content-type", content_type);
        self.with_response(url, response)
    }

    /// Serve an arbitrary response at `url`.
    pub fn with_response(mut self, url: &str, response: FetchResponse) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    /// Answer `url` with an empty body and the given status.
    pub fn with_status(self, url: &str, status: u16) -> Self {
        self.with_response(url, FetchResponse::new(url, status, Bytes::new()))
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// URLs requested so far, in order.
    pub fn requested_urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        let Some(response) = self.responses.get(&request.url) else {
            return Ok(FetchResponse::new(&request.url, 404, Bytes::new()));
        };
        let mut response = response.clone();
        if let (Some(range), 200) = (request.range, response.status) {
            let len = response.body.len() as u64;
            let start = range.offset.min(len) as usize;
            let end = range.end().min(len) as usize;
            response.body = response.body.slice(start..end);
            response.status = 206;
        }
        Ok(response)
    }
}
