use async_trait::async_trait;
use serde::Deserialize;

use super::KvStore;
use crate::error::{AppError, Result};

/// HTTP-proxied Redis backend, speaking the Webdis URL protocol.
///
/// Commands are path segments: `PUT /SETEX/key/ttl/value`, `GET /GET/key`,
/// `PUT /DEL/key`. Keys and values are percent-encoded so arbitrary JSON
/// survives the path.
pub struct WebdisKvStore {
    base_url: String,
    client: reqwest::Client,
}

/// Webdis wraps every reply in an object keyed by the command name.
#[derive(Deserialize)]
struct GetReply {
    #[serde(rename = "GET")]
    get: Option<String>,
}

impl WebdisKvStore {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl KvStore for WebdisKvStore {
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let url = match ttl_seconds {
            Some(ttl) => format!(
                "{}/SETEX/{}/{}/{}",
                self.base_url,
                urlencoding::encode(key),
                ttl,
                urlencoding::encode(value),
            ),
            None => format!(
                "{}/SET/{}/{}",
                self.base_url,
                urlencoding::encode(key),
                urlencoding::encode(value),
            ),
        };
        self.client.put(&url).send().await?.error_for_status()?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let url = format!("{}/GET/{}", self.base_url, urlencoding::encode(key));
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let reply: GetReply = sonic_rs::from_str(&body)
            .map_err(|e| AppError::Internal(format!("Unreadable Webdis reply: {}", e)))?;
        Ok(reply.get)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let url = format!("{}/DEL/{}", self.base_url, urlencoding::encode(key));
        self.client.put(&url).send().await?.error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_reply_parses_value() {
        let reply: GetReply = sonic_rs::from_str(r#"{"GET":"{\"id\":\"abc\"}"}"#).unwrap();
        assert_eq!(reply.get.as_deref(), Some(r#"{"id":"abc"}"#));
    }

    #[test]
    fn get_reply_parses_missing_key() {
        let reply: GetReply = sonic_rs::from_str(r#"{"GET":null}"#).unwrap();
        assert!(reply.get.is_none());
    }
}
