use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::info;

use crate::domain::{ARCHIVE_URL, CHECKSUM_URL, ChecksumRecord};
use crate::error::SyncError;

pub trait NcbiClient: Send + Sync {
    fn fetch_checksum(&self) -> Result<ChecksumRecord, SyncError>;
    fn download_archive(&self, destination: &Path) -> Result<u64, SyncError>;
}

#[derive(Clone)]
pub struct NcbiHttpClient {
    client: Client,
    checksum_url: String,
    archive_url: String,
}

impl NcbiHttpClient {
    pub fn new() -> Result<Self, SyncError> {
        Self::with_urls(CHECKSUM_URL, ARCHIVE_URL)
    }

    pub fn with_urls(checksum_url: &str, archive_url: &str) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("ncbi16s-sync/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SyncError::Http(err.to_string()))?,
        );

        // The archive is large, so only the connect phase is bounded.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .map_err(|err| SyncError::Http(err.to_string()))?;

        Ok(Self {
            client,
            checksum_url: checksum_url.to_string(),
            archive_url: archive_url.to_string(),
        })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, SyncError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SyncError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(SyncError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    fn write_response_to_file(
        &self,
        mut response: reqwest::blocking::Response,
        destination: &Path,
    ) -> Result<u64, SyncError> {
        let mut file =
            File::create(destination).map_err(|err| SyncError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file).map_err(|err| SyncError::Http(err.to_string()))
    }
}

impl NcbiClient for NcbiHttpClient {
    fn fetch_checksum(&self) -> Result<ChecksumRecord, SyncError> {
        info!("downloading current md5 from {}", self.checksum_url);
        let body = self
            .get(&self.checksum_url)?
            .text()
            .map_err(|err| SyncError::Http(err.to_string()))?;
        ChecksumRecord::parse(&body)
    }

    fn download_archive(&self, destination: &Path) -> Result<u64, SyncError> {
        info!("downloading {}", self.archive_url);
        let response = self.get(&self.archive_url)?;
        self.write_response_to_file(response, destination)
    }
}
