use std::io::Write;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, LOCATION, USER_AGENT};
use reqwest::redirect::Policy;

use crate::domain::RunId;
use crate::error::KiraError;

pub const DEFAULT_WORT_URL: &str = "https://wort.sourmash.bio";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Read-only access to a remote signature store.
pub trait WortClient: Send + Sync {
    /// Object URL for `id`, or `None` when the store does not have it.
    fn locate(&self, id: &RunId) -> Result<Option<String>, KiraError>;
    /// Streams the object at `location` into `destination`, returning the
    /// number of bytes written.
    fn download(&self, location: &str, destination: &mut dyn Write) -> Result<u64, KiraError>;
}

#[derive(Clone)]
pub struct WortHttpClient {
    lookup: Client,
    transfer: Client,
    base_url: Url,
}

impl WortHttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-ss/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::WortHttp(err.to_string()))?,
        );

        let lookup = Client::builder()
            .default_headers(headers.clone())
            .redirect(Policy::none())
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|err| KiraError::WortHttp(err.to_string()))?;
        let transfer = Client::builder()
            .default_headers(headers)
            .redirect(Policy::limited(10))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(timeout)
            .build()
            .map_err(|err| KiraError::WortHttp(err.to_string()))?;

        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|err| KiraError::WortHttp(format!("invalid wort url {base_url}: {err}")))?;

        Ok(Self {
            lookup,
            transfer,
            base_url,
        })
    }

    pub fn view_url(&self, id: &RunId) -> Result<Url, KiraError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/v1/view/sra/{}", id.as_str()))
            .map_err(|err| KiraError::WortHttp(err.to_string()))
    }
}

impl WortClient for WortHttpClient {
    fn locate(&self, id: &RunId) -> Result<Option<String>, KiraError> {
        let view_url = self.view_url(id)?;
        let response = self
            .lookup
            .get(view_url.clone())
            .send()
            .map_err(|err| KiraError::WortHttp(err.to_string()))?;
        let status = response.status();

        if status.is_success() {
            return Ok(Some(view_url.to_string()));
        }
        if !status.is_redirection() {
            return Ok(None);
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| KiraError::WortStatus {
                status: status.as_u16(),
                message: "redirect without location".to_string(),
            })?;
        let target = view_url
            .join(location)
            .map_err(|err| KiraError::WortHttp(format!("invalid redirect {location}: {err}")))?;
        Ok(Some(target.to_string()))
    }

    fn download(&self, location: &str, destination: &mut dyn Write) -> Result<u64, KiraError> {
        let mut response = self
            .transfer
            .get(location)
            .send()
            .map_err(|err| KiraError::WortHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "wort download failed".to_string());
            return Err(KiraError::WortStatus { status, message });
        }

        let expected = response.content_length();
        let received = response
            .copy_to(destination)
            .map_err(|err| KiraError::WortHttp(err.to_string()))?;
        if let Some(expected) = expected {
            if expected != received {
                return Err(KiraError::IncompleteDownload { expected, received });
            }
        }
        Ok(received)
    }
}
