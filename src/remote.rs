use async_trait::async_trait;
use reqwest::{Client, Url};
use std::sync::Arc;

use crate::adapter::Adapter;
use crate::buffer::{BatchBuffer, BatchSettings};
use crate::config::RemoteSettings;
use crate::fallback::Fallback;
use crate::info::host_id;
use crate::level::{accepts, LogLevel};
use crate::record::{Envelope, LogRecord};
use crate::sink::{BoxError, LogSink};

/// Error type returned when building or using a [`RemoteClient`].
#[derive(thiserror::Error, Debug)]
pub enum RemoteError {
    #[error("remote endpoint url is not configured")]
    MissingUrl,

    #[error("invalid remote endpoint url `{0}`")]
    InvalidUrl(String),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote insert failed with status {status}: {body}")]
    Status { status: u16, body: String },
}

/// HTTP client for the batch-ingestion endpoint.
///
/// Each batch is one `POST {url}/{table}` whose body is a JSON array of
/// [`Envelope`]s. The API key, when configured, is sent both as `apikey`
/// and as a bearer token.
#[derive(Clone, Debug)]
pub struct RemoteClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl RemoteClient {
    pub fn new(settings: &RemoteSettings) -> Result<Self, RemoteError> {
        let base = settings.url.as_deref().ok_or(RemoteError::MissingUrl)?;
        let endpoint = format!(
            "{}/{}",
            base.trim_end_matches('/'),
            urlencoding::encode(settings.table())
        );
        let endpoint = Url::parse(&endpoint).map_err(|_| RemoteError::InvalidUrl(endpoint.clone()))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(RemoteError::InvalidUrl(endpoint.to_string()));
        }

        let client = Client::builder().build()?;
        Ok(RemoteClient {
            client,
            endpoint,
            api_key: settings.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn post_batch(&self, batch: &[LogRecord]) -> Result<(), RemoteError> {
        let host = host_id();
        let rows: Vec<Envelope<'_>> = batch.iter().map(|record| Envelope::new(record, host)).collect();

        let mut request = self.client.post(self.endpoint.clone()).json(&rows);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let resp = request.send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(RemoteError::Status { status, body })
        }
    }
}

#[async_trait]
impl LogSink for RemoteClient {
    async fn send_batch(&self, batch: &[LogRecord]) -> Result<(), BoxError> {
        self.post_batch(batch).await?;
        Ok(())
    }
}

/// Buffered destination posting batches to a [`RemoteClient`].
///
/// If the client cannot be built the failure is reported once and the
/// adapter drops everything it is given.
pub struct RemoteAdapter {
    levels: Vec<LogLevel>,
    buffer: Option<BatchBuffer>,
}

impl RemoteAdapter {
    pub fn new(settings: &RemoteSettings, fallback: Arc<dyn Fallback>) -> Self {
        let buffer = match RemoteClient::new(settings) {
            Ok(client) => Some(BatchBuffer::new(
                "remote",
                BatchSettings::from_secs(settings.batch_size, settings.idle_time_sec),
                Arc::new(client),
                fallback,
            )),
            Err(err) => {
                fallback.report("remote: failed to create client", &err);
                None
            }
        };

        RemoteAdapter {
            levels: settings.log_levels.clone(),
            buffer,
        }
    }

    /// Whether the client was built and records are being delivered.
    pub fn is_active(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn pending(&self) -> usize {
        self.buffer.as_ref().map_or(0, BatchBuffer::len)
    }

    pub async fn flush(&self) {
        if let Some(buffer) = &self.buffer {
            buffer.flush().await;
        }
    }
}

#[async_trait]
impl Adapter for RemoteAdapter {
    fn name(&self) -> &str {
        "remote"
    }

    async fn submit(&self, records: Vec<LogRecord>) -> Result<(), BoxError> {
        if let Some(buffer) = &self.buffer {
            buffer.add(records.into_iter().filter(|r| accepts(r.level(), &self.levels)));
        }
        Ok(())
    }

    async fn dispose(&self) {
        if let Some(buffer) = &self.buffer {
            buffer.dispose().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: Option<&str>) -> RemoteSettings {
        RemoteSettings {
            enabled: true,
            url: url.map(str::to_string),
            table: Some("app logs".to_string()),
            ..RemoteSettings::default()
        }
    }

    #[test]
    fn builds_endpoint_from_url_and_table() {
        let client = RemoteClient::new(&settings(Some("https://logs.example.com/rest/v1/"))).unwrap();
        assert_eq!(client.endpoint().as_str(), "https://logs.example.com/rest/v1/app%20logs");
    }

    #[test]
    fn rejects_missing_or_invalid_url() {
        assert!(matches!(RemoteClient::new(&settings(None)), Err(RemoteError::MissingUrl)));
        assert!(matches!(
            RemoteClient::new(&settings(Some("not a url"))),
            Err(RemoteError::InvalidUrl(_))
        ));
        assert!(matches!(
            RemoteClient::new(&settings(Some("ftp://logs.example.com"))),
            Err(RemoteError::InvalidUrl(_))
        ));
    }
}
