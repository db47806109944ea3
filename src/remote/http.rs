//! HTTP implementation of the version source.

use async_trait::async_trait;
use reqwest::Client;

use super::{ReleaseInfo, SourceError, VersionSource};

/// Fetches release metadata from `{base}/v1/libraries/{name}/latest`.
#[derive(Debug, Clone)]
pub struct HttpVersionSource {
    client: Client,
    base_url: String,
}

impl HttpVersionSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn release_url(&self, library: &str) -> String {
        format!("{}/v1/libraries/{}/latest", self.base_url, library)
    }
}

#[async_trait]
impl VersionSource for HttpVersionSource {
    async fn latest_release(&self, library: &str) -> Result<ReleaseInfo, SourceError> {
        let response = self
            .client
            .get(self.release_url(library))
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotPublished(library.to_string()));
        }
        if !response.status().is_success() {
            return Err(SourceError::Status {
                library: library.to_string(),
                status: response.status(),
            });
        }

        Ok(response.json::<ReleaseInfo>().await?)
    }
}
