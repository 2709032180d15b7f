//! HTTP Source
//!
//! Blocking HTTP byte source used inside cache key factories.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use tracing::debug;

use crate::error::Result;
use crate::source::{ByteSource, ByteStream, RequestDecorator};

/// Timeout applied when none is configured.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

// == HTTP Source ==
/// Fetches URLs with a blocking client and a bounded timeout.
///
/// Non-success statuses report the resource as unavailable; connection and
/// timeout failures are errors.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    /// Builds a source whose requests give up after `timeout`.
    ///
    /// Must not be called from inside an async runtime.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl ByteSource for HttpSource {
    fn open(
        &self,
        locator: &str,
        decorator: Option<&RequestDecorator>,
    ) -> Result<Option<ByteStream>> {
        let mut headers = HeaderMap::new();
        if let Some(decorate) = decorator {
            decorate(&mut headers);
        }

        let response = self.client.get(locator).headers(headers).send()?;
        let status = response.status();
        debug!("GET {} answered {}", locator, status);
        if !status.is_success() {
            return Ok(None);
        }
        Ok(Some(Box::new(response)))
    }
}
