//! One status request per device.

use std::time::{Duration, Instant};

use async_trait::async_trait;

/// A response from a device's status endpoint, whatever its HTTP status.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub http_status: u16,
    pub body: Vec<u8>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("Request timed out")]
    Timeout,

    /// The control plane's own outbound budget was exhausted; says nothing
    /// about the device.
    #[error("Outbound request budget exhausted")]
    QuotaExhausted,

    #[error("{0}")]
    Failed(String),
}

/// Fetches `GET /status` from a device hostname.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn fetch_status(&self, hostname: &str) -> Result<ProbeResponse, ProbeError>;
}

/// reqwest-backed probe. No retries; the next poll re-probes.
#[derive(Debug, Clone)]
pub struct HttpStatusProbe {
    http: reqwest::Client,
    scheme: &'static str,
}

impl HttpStatusProbe {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Failed(e.to_string()))?;
        Ok(Self {
            http,
            scheme: "https",
        })
    }

    /// Probe over plain HTTP (local device networks and tests).
    #[must_use]
    pub const fn insecure(mut self) -> Self {
        self.scheme = "http";
        self
    }

    pub fn status_url(&self, hostname: &str) -> String {
        format!("{}://{hostname}/status", self.scheme)
    }
}

fn map_reqwest(e: &reqwest::Error) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout
    } else {
        ProbeError::Failed(e.to_string())
    }
}

#[async_trait]
impl StatusProbe for HttpStatusProbe {
    async fn fetch_status(&self, hostname: &str) -> Result<ProbeResponse, ProbeError> {
        let started = Instant::now();
        let resp = self
            .http
            .get(self.status_url(hostname))
            .send()
            .await
            .map_err(|e| map_reqwest(&e))?;
        let http_status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| map_reqwest(&e))?.to_vec();
        Ok(ProbeResponse {
            http_status,
            body,
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn host(server: &MockServer) -> String {
        server.uri().trim_start_matches("http://").to_string()
    }

    #[test]
    fn default_scheme_is_https() {
        let probe = HttpStatusProbe::new(Duration::from_secs(1)).unwrap();
        assert_eq!(
            probe.status_url("pi01-fleet.example.com"),
            "https://pi01-fleet.example.com/status"
        );
    }

    #[tokio::test]
    async fn non_success_status_is_a_response_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(530))
            .mount(&server)
            .await;

        let probe = HttpStatusProbe::new(Duration::from_secs(5))
            .unwrap()
            .insecure();
        let resp = probe.fetch_status(&host(&server)).await.unwrap();
        assert_eq!(resp.http_status, 530);
    }

    #[tokio::test]
    async fn slow_device_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let probe = HttpStatusProbe::new(Duration::from_millis(100))
            .unwrap()
            .insecure();
        let err = probe.fetch_status(&host(&server)).await.unwrap_err();
        assert_eq!(err, ProbeError::Timeout);
    }
}
