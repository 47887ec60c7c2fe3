//! Liveness probing of plugin callbacks.
//!
//! The prune loop and `register` both issue outbound health-check requests
//! against a plugin's callback address. The request carries basic auth when
//! the address embeds a stored-credential reference in its user-info
//! component. The timeout is bounded and sub-second by default so one
//! unreachable plugin cannot stall a prune tick.

use crate::credentials::CredentialStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Health-check seam for plugin callbacks.
///
/// A trait rather than a concrete type so the prune loop is testable without
/// a network; production wiring uses [`HttpProber`].
#[async_trait]
pub trait LivenessProber: Send + Sync {
    /// Pings a callback address. No-op success when the address is absent,
    /// since built-in plugins carry no callback. Any transport failure or
    /// unexpected status is a failure.
    async fn ping(&self, callback: Option<&str>) -> bool;
}

/// Extracts the stored-credential reference from a callback address's
/// user-info component, if present.
pub fn credential_reference(callback: &str) -> Option<String> {
    let url = reqwest::Url::parse(callback).ok()?;
    let username = url.username();
    (!username.is_empty()).then(|| username.to_string())
}

/// HTTP liveness prober.
pub struct HttpProber {
    client: reqwest::Client,
    credentials: Arc<dyn CredentialStore>,
}

impl HttpProber {
    /// Creates a prober with the given per-request timeout.
    pub fn new(
        timeout: Duration,
        credentials: Arc<dyn CredentialStore>,
    ) -> std::result::Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpProber {
            client,
            credentials,
        })
    }
}

#[async_trait]
impl LivenessProber for HttpProber {
    async fn ping(&self, callback: Option<&str>) -> bool {
        let Some(callback) = callback else {
            // Built-in plugins have nothing to probe.
            return true;
        };

        let url = match reqwest::Url::parse(callback) {
            Ok(url) => url,
            Err(error) => {
                warn!(callback, %error, "unparseable callback address");
                return false;
            }
        };

        // The user-info component is a credential reference, not literal
        // credentials; strip it from the request URL and resolve it.
        let reference = credential_reference(callback);
        let mut target = url.clone();
        let _ = target.set_username("");
        let _ = target.set_password(None);

        let mut request = self.client.get(target);
        if let Some(reference) = reference {
            if let Some(creds) = self.credentials.lookup(&reference) {
                request = request.basic_auth(creds.username, Some(creds.password));
            }
        }

        match request.send().await {
            Ok(response)
                if response.status().is_success() || response.status().is_redirection() =>
            {
                debug!(callback, status = %response.status(), "liveness probe succeeded");
                true
            }
            Ok(response) => {
                warn!(callback, status = %response.status(), "liveness probe rejected");
                false
            }
            Err(error) => {
                warn!(callback, %error, "liveness probe failed");
                false
            }
        }
    }
}
