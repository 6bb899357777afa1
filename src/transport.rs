//! HTTPS transport with a TLS client certificate.

use async_trait::async_trait;
use reqwest::{ClientBuilder, Identity};
use tracing::{debug, instrument, warn};

use crate::config::{Endpoint, TransportConfig};
use crate::envelope::SignedEnvelope;
use crate::error::{InschrijvingError, InschrijvingResult};
use crate::wsse::Credential;

/// A signed envelope ready to be delivered to one endpoint.
#[derive(Debug, Clone, Copy)]
pub struct OutboundRequest<'a> {
    pub endpoint: &'a Endpoint,
    pub envelope: &'a SignedEnvelope,
    pub credential: &'a Credential,
}

/// Raw reply: status code plus the body bytes exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportReply {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Delivers envelopes. One attempt per call, no retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest<'_>) -> InschrijvingResult<TransportReply>;
}

/// reqwest/rustls transport authenticating with the credential's certificate.
#[derive(Debug, Clone, Default)]
pub struct HttpsTransport {
    config: TransportConfig,
}

impl HttpsTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Build a client whose TLS identity is the given credential.
    pub fn client_for(&self, credential: &Credential) -> InschrijvingResult<reqwest::Client> {
        let identity = Identity::from_pem(&credential.identity_pem()).map_err(|e| {
            InschrijvingError::Transport(format!("invalid client certificate or key: {}", e))
        })?;

        let mut builder = ClientBuilder::new()
            .use_rustls_tls()
            .identity(identity)
            .connect_timeout(self.config.connect_timeout())
            .user_agent(format!("kvk-inschrijving/{}", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = self.config.timeout() {
            builder = builder.timeout(timeout);
        }

        builder
            .build()
            .map_err(|e| InschrijvingError::Transport(format!("failed to create HTTP client: {}", e)))
    }
}

#[async_trait]
impl Transport for HttpsTransport {
    #[instrument(skip_all, fields(endpoint = %request.endpoint.url))]
    async fn send(&self, request: OutboundRequest<'_>) -> InschrijvingResult<TransportReply> {
        let client = self.client_for(request.credential)?;
        let envelope = request.envelope;

        let mut http = client
            .post(&request.endpoint.url)
            .header(reqwest::header::CONTENT_TYPE, envelope.content_type())
            .body(envelope.xml.clone());
        if envelope.version == crate::config::SoapVersion::Soap11 {
            http = http.header("SOAPAction", format!("\"{}\"", envelope.action));
        }

        let response = http.send().await.map_err(|e| {
            warn!(error = %e, timeout = e.is_timeout(), "Request to registry failed");
            InschrijvingError::Transport(format!("request failed: {}", e))
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            warn!(status, error = %e, "Failed to read registry response body");
            InschrijvingError::Transport(format!("failed to read response: {}", e))
        })?;

        debug!(status, bytes = body.len(), "Registry response received");
        Ok(TransportReply::new(status, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointsConfig, Environment, SoapVersion};
    use crate::envelope::ophalen_inschrijving_envelope;
    use std::time::Duration;

    const CERT: &str = include_str!("../tests/fixtures/client.crt");
    const KEY: &str = include_str!("../tests/fixtures/client.key");

    #[test]
    fn test_client_creation() {
        let transport = HttpsTransport::default();
        assert!(transport.client_for(&Credential::new(CERT, KEY)).is_ok());
    }

    #[test]
    fn test_invalid_identity_is_transport_error() {
        let transport = HttpsTransport::default();
        let err = transport
            .client_for(&Credential::new("not a cert", "not a key"))
            .unwrap_err();
        assert!(matches!(err, InschrijvingError::Transport(_)));
    }

    #[test]
    fn test_reply_status() {
        assert!(TransportReply::new(200, b"".to_vec()).is_ok());
        assert!(!TransportReply::new(500, b"".to_vec()).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let credential = Credential::new(CERT, KEY);
        let endpoint = Endpoint {
            url: "https://127.0.0.1:1/postbus2".to_string(),
            ..EndpointsConfig::default().for_environment(Environment::Preprod).clone()
        };
        let envelope =
            ophalen_inschrijving_envelope("12345678", SoapVersion::Soap11, &endpoint.to_address, &credential)
                .unwrap();

        let transport = HttpsTransport::new(TransportConfig {
            timeout_secs: Some(5),
            connect_timeout_secs: 2,
        });
        let started = std::time::Instant::now();
        let err = transport
            .send(OutboundRequest {
                endpoint: &endpoint,
                envelope: &envelope,
                credential: &credential,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, InschrijvingError::Transport(_)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
