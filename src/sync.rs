use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Secondary sink for file contents. Runs after the local save and its
/// failures never touch the local file status.
#[async_trait(?Send)]
pub trait RemoteSync {
    /// Returns the server acknowledgment as received.
    async fn save_content(&self, file_path: &str, content: &str) -> Result<Value, SyncError>;
    async fn fetch_content(&self, file_path: &str) -> Result<String, SyncError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveRequest<'a> {
    file_path: &'a str,
    content: &'a str,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    content: String,
}

#[derive(Debug, Clone)]
pub struct HttpRemoteSync {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteSync {
    pub fn new<S: AsRef<str>>(base_url: S) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client<S: AsRef<str>>(base_url: S, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

impl Default for HttpRemoteSync {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

#[async_trait(?Send)]
impl RemoteSync for HttpRemoteSync {
    async fn save_content(&self, file_path: &str, content: &str) -> Result<Value, SyncError> {
        let request = SaveRequest {
            file_path,
            content,
            timestamp: Utc::now().to_rfc3339(),
        };
        let response = self
            .client
            .post(self.endpoint("files/save"))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SyncError::Status {
                action: "save",
                status: response.status(),
            });
        }
        let ack = response.json::<Value>().await?;
        info!("File {} synced", file_path);
        Ok(ack)
    }

    async fn fetch_content(&self, file_path: &str) -> Result<String, SyncError> {
        debug!("Fetching {} from {}", file_path, self.base_url);
        let response = self
            .client
            .get(self.endpoint("files/content"))
            .query(&[("filePath", file_path)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SyncError::Status {
                action: "fetch",
                status: response.status(),
            });
        }
        let body = response.json::<ContentResponse>().await?;
        Ok(body.content)
    }
}
