use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::{records_from_payload, IngestError, UserSource};

/// Users endpoint returning a JSON array of user records.
pub struct HttpUserSource {
    client: reqwest::Client,
    url: String,
}

impl HttpUserSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl UserSource for HttpUserSource {
    async fn fetch(&self) -> Result<Vec<Value>, IngestError> {
        debug!(url = %self.url, "fetching users");
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| IngestError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(IngestError::Status(resp.status().as_u16()));
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| IngestError::Parse(e.to_string()))?;
        records_from_payload(payload)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
