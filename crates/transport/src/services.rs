//! Clients for the external AEAD and OTP crypto services.
//!
//! Both services speak JSON over HTTP and return the corresponding envelope
//! shape on encrypt. A non-2xx status on decrypt is a decryption failure,
//! never plaintext. All calls carry an explicit timeout and go through
//! [`RetryingTransport`].

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use encryption::{AeadEnvelope, OtpEnvelope};

use crate::error::{Result, TransportError};
use crate::retry::RetryingTransport;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Logical contract of the AEAD service.
pub trait AeadService: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<AeadEnvelope>;

    fn decrypt(&self, envelope: &AeadEnvelope) -> Result<String>;
}

/// Logical contract of the OTP service.
pub trait OtpService: Send + Sync {
    fn encrypt(&self, text: &str) -> Result<OtpEnvelope>;

    fn decrypt(&self, envelope: &OtpEnvelope) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct AeadEncryptRequest<'a> {
    plaintext: &'a str,
}

#[derive(Debug, Deserialize)]
struct AeadDecryptResponse {
    plaintext: String,
}

#[derive(Debug, Serialize)]
struct OtpEncryptRequest<'a> {
    text: &'a str,
}

/// The OTP service historically answered decrypts in either of two forms.
#[derive(Debug, Deserialize)]
struct OtpDecryptResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(rename = "plaintextB64Url", alias = "plaintext_b64url", default)]
    plaintext_b64url: Option<String>,
}

impl OtpDecryptResponse {
    fn into_text(self) -> Result<String> {
        if let Some(text) = self.text {
            return Ok(text);
        }
        let encoded = self.plaintext_b64url.ok_or_else(|| {
            TransportError::InvalidResponse(
                "OTP decrypt response carries neither text nor plaintextB64Url".to_string(),
            )
        })?;
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map_err(|err| {
                TransportError::InvalidResponse(format!("plaintextB64Url base64: {err}"))
            })?;
        String::from_utf8(bytes).map_err(|_| {
            TransportError::InvalidResponse("decoded plaintext is not UTF-8".to_string())
        })
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| TransportError::Request(err.to_string()))
}

fn env_timeout() -> Duration {
    let secs = std::env::var("QSM_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

fn env_retry() -> RetryingTransport {
    let attempts = std::env::var("QSM_HTTP_MAX_ATTEMPTS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(3);
    RetryingTransport::new(Default::default(), attempts)
}

fn post_json<B: Serialize, R: DeserializeOwned>(
    client: &reqwest::blocking::Client,
    retry: &RetryingTransport,
    url: &str,
    body: &B,
) -> Result<R> {
    retry.execute(url, || {
        let response = client
            .post(url)
            .json(body)
            .send()
            .map_err(|err| TransportError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        response
            .json::<R>()
            .map_err(|err| TransportError::InvalidResponse(err.to_string()))
    })
}

/// HTTP client for the AES-256-GCM service.
pub struct HttpAeadService {
    base_url: String,
    client: reqwest::blocking::Client,
    retry: RetryingTransport,
}

impl HttpAeadService {
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
        Ok(Self {
            base_url: base_url.into(),
            client: build_client(timeout)?,
            retry,
        })
    }

    /// Configure from `QSM_AES_SERVICE_URL` plus the shared timeout and
    /// retry variables.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("QSM_AES_SERVICE_URL").map_err(|_| {
            TransportError::InvalidResponse(
                "QSM_AES_SERVICE_URL environment variable not set".to_string(),
            )
        })?;
        Self::with_options(base_url, env_timeout(), env_retry())
    }
}

impl AeadService for HttpAeadService {
    fn encrypt(&self, plaintext: &str) -> Result<AeadEnvelope> {
        post_json(
            &self.client,
            &self.retry,
            &format!("{}/aes/encrypt", self.base_url),
            &AeadEncryptRequest { plaintext },
        )
    }

    fn decrypt(&self, envelope: &AeadEnvelope) -> Result<String> {
        let response: AeadDecryptResponse = post_json(
            &self.client,
            &self.retry,
            &format!("{}/aes/decrypt", self.base_url),
            envelope,
        )?;
        Ok(response.plaintext)
    }
}

/// HTTP client for the one-time-pad service.
pub struct HttpOtpService {
    base_url: String,
    client: reqwest::blocking::Client,
    retry: RetryingTransport,
}

impl HttpOtpService {
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
        Ok(Self {
            base_url: base_url.into(),
            client: build_client(timeout)?,
            retry,
        })
    }

    /// Configure from `QSM_OTP_SERVICE_URL` plus the shared timeout and
    /// retry variables.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("QSM_OTP_SERVICE_URL").map_err(|_| {
            TransportError::InvalidResponse(
                "QSM_OTP_SERVICE_URL environment variable not set".to_string(),
            )
        })?;
        Self::with_options(base_url, env_timeout(), env_retry())
    }
}

impl OtpService for HttpOtpService {
    fn encrypt(&self, text: &str) -> Result<OtpEnvelope> {
        post_json(
            &self.client,
            &self.retry,
            &format!("{}/otp/encrypt", self.base_url),
            &OtpEncryptRequest { text },
        )
    }

    fn decrypt(&self, envelope: &OtpEnvelope) -> Result<String> {
        let response: OtpDecryptResponse = post_json(
            &self.client,
            &self.retry,
            &format!("{}/otp/decrypt", self.base_url),
            envelope,
        )?;
        response.into_text()
    }
}
