//! Signing key download over HTTPS.

use crate::retry::{LogCallback, RetryConfig, with_retry};
use converge::{HostError, KeyFetcher};
use std::time::Duration;

/// Keys are small; anything bigger is not a keyring
const MAX_KEY_SIZE: u64 = 1024 * 1024;

pub struct HttpKeys {
    retry: RetryConfig,
}

impl HttpKeys {
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry }
    }

    fn fetch_once(url: &str, timeout: Duration) -> Result<Vec<u8>, HostError> {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        let mut response = agent
            .get(url)
            .header("User-Agent", "nodeprep")
            .call()
            .map_err(|e| http_error(url, e))?;

        response
            .body_mut()
            .with_config()
            .limit(MAX_KEY_SIZE)
            .read_to_vec()
            .map_err(|e| http_error(url, e))
    }
}

fn http_error(url: &str, err: ureq::Error) -> HostError {
    match err {
        ureq::Error::StatusCode(404) => HostError::NotFound {
            what: url.to_string(),
        },
        ureq::Error::StatusCode(code) if code < 500 => HostError::Other(format!("{url}: HTTP {code}")),
        other => HostError::Network {
            message: format!("{url}: {other}"),
        },
    }
}

impl KeyFetcher for HttpKeys {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, HostError> {
        let operation = format!("downloading {url}");
        let callback = LogCallback { operation: &operation };
        let key = with_retry(&self.retry, Some(&callback), || Self::fetch_once(url, timeout))?;
        if key.is_empty() {
            return Err(HostError::Other(format!("{url}: empty key")));
        }
        log::debug!("fetched {} bytes from {url}", key.len());
        Ok(key)
    }
}
