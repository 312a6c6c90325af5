//! Signed metric reports.
//!
//! Each report is a JSON POST to `<instance>/api/server/<id>/report`. The
//! server authenticates it with `X-Signature`, the hex HMAC-SHA256 of the
//! `X-Timestamp` value concatenated with the body, keyed by the shared
//! secret.

use crate::collector::Metrics;
use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Sign `timestamp + payload` with `secret`, hex encoded.
///
/// # Errors
///
/// Returns an error if the key is rejected by the MAC.
pub fn sign(timestamp: &str, payload: &str, secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AgentError::Report(format!("invalid signing key: {e}")))?;
    mac.update(timestamp.as_bytes());
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Sends metric snapshots to the Uppi instance.
pub struct Reporter {
    agent: ureq::Agent,
    url: String,
    secret: String,
}

impl Reporter {
    /// Create a reporter for the server configured in `config`.
    pub fn new(config: &AgentConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        Self {
            agent,
            url: config.report_url(),
            secret: config.secret.clone(),
        }
    }

    /// Post one snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Report`] if the payload cannot be serialized,
    /// the request fails, or the server answers with anything but 200.
    pub fn send(&self, metrics: &Metrics) -> Result<()> {
        let payload = serde_json::to_string(metrics)
            .map_err(|e| AgentError::Report(format!("cannot serialize metrics: {e}")))?;
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(&timestamp, &payload, &self.secret)?;

        let resp = match self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .set("X-Signature", &signature)
            .set("X-Timestamp", &timestamp)
            .send_string(&payload)
        {
            Ok(resp) => resp,
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                return Err(AgentError::Report(format!(
                    "server returned status {status}: {body}"
                )));
            }
            Err(e) => return Err(AgentError::Report(format!("cannot send request: {e}"))),
        };

        if resp.status() != 200 {
            let status = resp.status();
            let body = resp.into_string().unwrap_or_default();
            return Err(AgentError::Report(format!(
                "server returned status {status}: {body}"
            )));
        }
        Ok(())
    }
}
