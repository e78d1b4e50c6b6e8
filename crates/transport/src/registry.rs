//! Identity-registry client.
//!
//! The registry maps logical mail addresses to published KEM public keys.
//! The core only requires the lookup capability defined in
//! [`common::KeyRegistry`]; an unknown address is `None`, not an error.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use common::{Address, KeyRegistry};

use crate::error::TransportError;
use crate::retry::RetryingTransport;
use crate::services::DEFAULT_TIMEOUT_SECS;

#[derive(Debug, Deserialize)]
struct RegistryResponse {
    #[serde(rename = "publicKey", alias = "public_key")]
    public_key: String,
}

/// HTTP implementation of the registry lookup.
pub struct HttpKeyRegistry {
    base_url: String,
    client: reqwest::blocking::Client,
    retry: RetryingTransport,
}

impl HttpKeyRegistry {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_options(
            base_url,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            RetryingTransport::default(),
        )
    }

    pub fn with_options(
        base_url: impl Into<String>,
        timeout: Duration,
        retry: RetryingTransport,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("unable to build registry HTTP client")?;
        Ok(Self {
            base_url: base_url.into(),
            client,
            retry,
        })
    }

    /// Configure from `QSM_REGISTRY_URL`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("QSM_REGISTRY_URL")
            .context("QSM_REGISTRY_URL environment variable not set")?;
        Self::new(base_url)
    }
}

impl KeyRegistry for HttpKeyRegistry {
    fn lookup(&self, address: &Address) -> Result<Option<Vec<u8>>> {
        let url = format!("{}/keys/{}", self.base_url, address);

        let body = self.retry.execute("registry lookup", || {
            let response = self
                .client
                .get(&url)
                .send()
                .map_err(|err| TransportError::Request(err.to_string()))?;

            let status = response.status();
            if status.as_u16() == 404 {
                return Ok(None);
            }
            if !status.is_success() {
                return Err(TransportError::UpstreamStatus {
                    status: status.as_u16(),
                });
            }

            response
                .json::<RegistryResponse>()
                .map(Some)
                .map_err(|err| TransportError::InvalidResponse(err.to_string()))
        })?;

        match body {
            None => Ok(None),
            Some(response) => hex::decode(&response.public_key)
                .map(Some)
                .context("registry returned a public key that is not valid hex"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_response_parses_both_conventions() {
        let camel: RegistryResponse =
            serde_json::from_str(r#"{"publicKey":"a1b2"}"#).unwrap();
        assert_eq!(camel.public_key, "a1b2");

        let snake: RegistryResponse =
            serde_json::from_str(r#"{"public_key":"c3d4"}"#).unwrap();
        assert_eq!(snake.public_key, "c3d4");
    }
}
