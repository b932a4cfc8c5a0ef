//! Embedding-service contract and the Gemini HTTP implementation.
//!
//! The service is order-preserving: vector i corresponds to input text i.
//! Index construction still pairs vectors with their chunks explicitly, so
//! batching strategy can never change index content.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::error::{Error, Result};

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a batch of texts into fixed-dimension vectors, order-preserving.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Gemini `batchEmbedContents` client.
pub struct GeminiEmbeddingClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint_base: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

impl GeminiEmbeddingClient {
    pub fn new(
        api_key: String,
        model: String,
        endpoint_base: String,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            endpoint_base,
            timeout,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:batchEmbedContents",
            self.endpoint_base, self.model
        )
    }
}

#[async_trait]
impl EmbeddingClient for GeminiEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": text }] }
                })
            })
            .collect();

        // The timeout covers the whole exchange; a server that returns
        // headers and then stalls the body must not hang the interaction.
        let exchange = async {
            let response = self
                .client
                .post(self.endpoint())
                .header("Content-Type", "application/json")
                .header("x-goog-api-key", &self.api_key)
                .json(&json!({ "requests": requests }))
                .send()
                .await
                .map_err(|e| Error::EmbeddingService(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::EmbeddingService(format!(
                    "embedding API error ({}): {}",
                    status, body
                )));
            }

            response
                .json::<BatchEmbedResponse>()
                .await
                .map_err(|e| Error::EmbeddingService(e.to_string()))
        };

        let parsed = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::UpstreamTimeout(self.timeout))??;

        if parsed.embeddings.len() != texts.len() {
            return Err(Error::EmbeddingService(format!(
                "embedding count mismatch: sent {}, received {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stalled_body_read_times_out() {
        use tokio::io::AsyncWriteExt;

        // Returns headers, sends a partial body, then stalls.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4096\r\n\r\n{\"emb")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let client = GeminiEmbeddingClient::new(
            "key".to_string(),
            "embedding-001".to_string(),
            format!("http://{}", addr),
            Duration::from_millis(200),
        );
        let err = client.embed(&["text".to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamTimeout(_)));
    }
}
