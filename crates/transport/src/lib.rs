//! # Upstream service transport
//!
//! Blocking HTTP clients for the external crypto collaborators: the
//! AES-256-GCM service, the one-time-pad service, and the identity
//! registry. Every call has an explicit timeout and runs through a bounded
//! retry loop with backoff; when the bound is spent the failure surfaces
//! as a typed error, never a default value.

pub mod error;
pub mod registry;
pub mod retry;
pub mod services;

pub use error::{Result, TransportError};
pub use registry::HttpKeyRegistry;
pub use retry::{RetryStrategy, RetryingTransport};
pub use services::{
    AeadService, HttpAeadService, HttpOtpService, OtpService, DEFAULT_TIMEOUT_SECS,
};
