use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::api::card::{AgentEndpoint, EndpointHealth};

/// Per-probe timeout when the configuration does not set one.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const HTTP_SCHEME: &str = "http://";
const HTTPS_SCHEME: &str = "https://";

/// An enumeration of potential errors while building the endpoint checker.
#[derive(Error, Debug)]
pub enum EndpointCheckerError {
    #[error("building the probe HTTP client: `{0}`")]
    ClientBuilder(String),
}

/// Probes a card's endpoints for reachability.
///
/// Endpoints are tried in order and the first one answering a lightweight
/// HEAD request with a status code below 500 marks the card healthy. The
/// client keeps no idle connections, probes must not accumulate file
/// descriptors across reconciliations.
pub struct EndpointChecker {
    client: reqwest::Client,
    timeout: Duration,
}

impl EndpointChecker {
    pub fn try_new(timeout: Duration) -> Result<Self, EndpointCheckerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|err| EndpointCheckerError::ClientBuilder(err.to_string()))?;
        Ok(Self { client, timeout })
    }

    /// Returns `Healthy` for the first endpoint answering in time with a
    /// status code in [200, 500), `Unhealthy` when every probed endpoint
    /// failed, and `Unknown` when no endpoint produced a definitive answer
    /// (for example because none speaks HTTP).
    pub async fn check_endpoints(&self, endpoints: &[AgentEndpoint]) -> EndpointHealth {
        let mut probed = false;

        for endpoint in endpoints {
            if !is_probeable(&endpoint.url) {
                debug!(url = %endpoint.url, "skipping non-HTTP endpoint probe");
                continue;
            }
            probed = true;

            match self.client.head(&endpoint.url).send().await {
                Ok(response) if (200..500).contains(&response.status().as_u16()) => {
                    return EndpointHealth::Healthy;
                }
                Ok(response) => {
                    debug!(url = %endpoint.url, status = %response.status(), "endpoint probe failed");
                }
                Err(err) => {
                    debug!(url = %endpoint.url, error = %err, timeout = ?self.timeout, "endpoint probe failed");
                }
            }
        }

        if probed {
            EndpointHealth::Unhealthy
        } else {
            EndpointHealth::Unknown
        }
    }
}

fn is_probeable(url: &str) -> bool {
    url.starts_with(HTTP_SCHEME) || url.starts_with(HTTPS_SCHEME)
}
