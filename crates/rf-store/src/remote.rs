//! Remote object store client.
//!
//! The store speaks the Appwrite storage API: files live in one bucket and
//! are addressed by a caller-chosen id.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use rf_core::config::RemoteConfig;
use rf_core::{Error, Result};

/// An object accepted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoredObject {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "bucketId")]
    pub bucket_id: String,
}

/// Minimal object store used by the publisher and the stream routes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key`. `file_name` is the original name.
    async fn upload(&self, key: &str, file_name: &str, body: Vec<u8>) -> Result<StoredObject>;

    /// Object contents, or `None` if the store has no such key.
    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove an object. Returns `false` if it did not exist.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Public URL of a stored object.
    fn view_url(&self, object: &StoredObject) -> String;
}

/// [`ObjectStore`] over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    http: Client,
    endpoint: String,
    bucket_id: String,
    project_id: String,
    api_key: String,
    response_format: String,
}

impl RemoteStore {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket_id: config.bucket_id.clone(),
            project_id: config.project_id.clone(),
            api_key: config.api_key.clone(),
            response_format: config.response_format.clone(),
        })
    }

    fn files_url(&self) -> String {
        format!("{}/storage/buckets/{}/files", self.endpoint, self.bucket_id)
    }

    fn with_headers(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("X-Appwrite-Project", &self.project_id)
            .header("X-Appwrite-Key", &self.api_key)
            .header("X-Appwrite-Response-Format", &self.response_format)
    }

    async fn send(&self, req: RequestBuilder) -> Result<reqwest::Response> {
        self.with_headers(req)
            .send()
            .await
            .map_err(|e| Error::remote(0, format!("request failed: {e}")))
    }
}

async fn error_from(resp: reqwest::Response) -> Error {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Error::remote(status, body)
}

#[async_trait]
impl ObjectStore for RemoteStore {
    async fn upload(&self, key: &str, file_name: &str, body: Vec<u8>) -> Result<StoredObject> {
        let form = Form::new()
            .text("fileId", key.to_string())
            .part("file", Part::bytes(body).file_name(file_name.to_string()));

        let resp = self
            .send(self.http.post(self.files_url()).multipart(form))
            .await?;

        if resp.status() != StatusCode::CREATED {
            return Err(error_from(resp).await);
        }

        let text = resp.text().await.unwrap_or_default();
        Ok(serde_json::from_str(&text).unwrap_or_else(|e| {
            tracing::debug!(key, error = %e, "Unparseable upload response; assuming requested id");
            StoredObject {
                id: key.to_string(),
                bucket_id: self.bucket_id.clone(),
            }
        }))
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let url = format!("{}/{key}/view", self.files_url());
        let resp = self.send(self.http.get(url)).await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let bytes = resp
                    .bytes()
                    .await
                    .map_err(|e| Error::remote(s.as_u16(), format!("read error: {e}")))?;
                Ok(Some(bytes.to_vec()))
            }
            _ => Err(error_from(resp).await),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let url = format!("{}/{key}", self.files_url());
        let resp = self.send(self.http.delete(url)).await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(error_from(resp).await),
        }
    }

    fn view_url(&self, object: &StoredObject) -> String {
        format!(
            "{}/storage/buckets/{}/files/{}/view?project={}",
            self.endpoint, object.bucket_id, object.id, self.project_id
        )
    }
}
