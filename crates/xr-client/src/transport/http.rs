//! XML-RPC over HTTP(S)

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};

use xr_core::config::{ClientConfig, TlsVerify};
use xr_core::{Connector, Endpoint, Transport, TransportError};
use xr_protocol::{decode_response, encode_call, Value};

/// Builds [`HttpTransport`]s with a shared timeout and TLS policy
#[derive(Debug, Clone)]
pub struct HttpConnector {
    timeout: Duration,
    tls_verify: TlsVerify,
}

impl HttpConnector {
    pub fn new(timeout: Duration, tls_verify: TlsVerify) -> Self {
        Self { timeout, tls_verify }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.timeout, config.tls_verify)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn tls_verify(&self) -> TlsVerify {
        self.tls_verify
    }
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl Connector for HttpConnector {
    type Transport = HttpTransport;

    fn bind(&self, endpoint: &Endpoint) -> Result<HttpTransport, TransportError> {
        HttpTransport::new(endpoint.clone(), self.timeout, self.tls_verify)
    }
}

/// HTTP client bound to a single endpoint
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Endpoint,
}

impl HttpTransport {
    /// Build a transport for `endpoint`
    ///
    /// Certificate checks only apply to `https` endpoints; with
    /// [`TlsVerify::VerifyNone`] any certificate is accepted.
    pub fn new(
        endpoint: Endpoint,
        timeout: Duration,
        tls_verify: TlsVerify,
    ) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);

        if endpoint.is_tls() && tls_verify == TlsVerify::VerifyNone {
            tracing::warn!(
                "TLS certificate verification disabled for {}",
                endpoint
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Request(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn call(&self, method: &str, params: &[Value]) -> Result<Value, TransportError> {
        let body = encode_call(method, params)?;
        tracing::trace!("POST {} {} ({} bytes)", self.endpoint, method, body.len());

        let response = self
            .client
            .post(self.endpoint.url().clone())
            .header(CONTENT_TYPE, HeaderValue::from_static("text/xml"))
            .body(body)
            .send()
            .await
            .map_err(|e| classify_error(e, &self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("{} answered {} to {}", self.endpoint, status, method);
            return Err(TransportError::Status(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| classify_error(e, &self.endpoint))?;

        Ok(decode_response(&text)?)
    }
}

/// Map a reqwest failure onto the transport taxonomy
fn classify_error(err: reqwest::Error, endpoint: &Endpoint) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }

    if let Some(kind) = io_error_kind(&err) {
        match kind {
            io::ErrorKind::TimedOut => return TransportError::Timeout,
            io::ErrorKind::ConnectionRefused => {
                return TransportError::ConnectionRefused(endpoint.to_string())
            }
            io::ErrorKind::BrokenPipe => return TransportError::BrokenPipe,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => return TransportError::EndOfStream,
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
                return TransportError::HostUnreachable(endpoint.to_string())
            }
            _ => {}
        }
    }

    if err.is_connect() {
        // DNS failures and other connect errors without a usable io kind
        TransportError::HostUnreachable(format!("{}: {}", endpoint, err))
    } else if err.is_body() {
        TransportError::EndOfStream
    } else {
        TransportError::Request(err.to_string())
    }
}

/// First `io::ErrorKind` found walking the source chain
fn io_error_kind(err: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        current = e.source();
    }
    None
}
