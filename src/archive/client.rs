// src/archive/client.rs

//! HTTP transport for archive mirrors
//!
//! A thin wrapper around reqwest with timeout and retry support. The
//! [`Transport`] trait is the seam the tests use to serve an in-memory
//! archive without a network.

use crate::error::{Error, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts for failed requests
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Fetch bytes by URL
pub trait Transport {
    fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// Real HTTP(S) transport with retries
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    credentials: Option<(String, String)>,
    max_retries: u32,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self {
            client,
            credentials: None,
            max_retries: MAX_RETRIES,
        })
    }

    /// Attach basic-auth credentials for entitled archives
    pub fn with_credentials(mut self, user: String, password: String) -> Self {
        self.credentials = Some((user, password));
        self
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching {}", url);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self.client.get(url);
            if let Some((user, password)) = &self.credentials {
                request = request.basic_auth(user, Some(password));
            }
            match request.send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::Network(format!(
                            "error {} fetching {}",
                            response.status(),
                            url
                        )));
                    }
                    let bytes = response
                        .bytes()
                        .map_err(|e| Error::Network(e.to_string()))?;
                    return Ok(bytes.to_vec());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::Network(e.to_string()));
                    }
                    warn!("Fetch attempt {} for {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}
