use std::sync::Arc;
use std::time::{Duration, Instant};
use reqwest::{redirect, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::protocol::{FORMAT_PARAM, INVALID_TOKEN_CODE, TOKEN_PARAM, TOKEN_REQUIRED_CODE};
use crate::config::GatewayConfig;
use crate::error::{ExplorerError, Result};
use crate::gateway::embedded_error;
use crate::token::TokenStore;

/// Verdict on why a URL could not be described.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeStatus {
    pub accessible: bool,
    pub requires_auth: bool,
    pub is_empty: bool,
    pub redirected: bool,
    pub error: Option<String>,
    pub response_time_ms: u64,
}

impl ProbeStatus {
    fn failed(error: String, response_time_ms: u64) -> Self {
        Self {
            error: Some(error),
            response_time_ms,
            ..Default::default()
        }
    }

    fn auth_required(error: String, redirected: bool, response_time_ms: u64) -> Self {
        Self {
            requires_auth: true,
            redirected,
            error: Some(error),
            response_time_ms,
            ..Default::default()
        }
    }
}

/// Classifies failed nodes by re-requesting them without following redirects.
pub struct Prober {
    client: Client,
    tokens: Arc<dyn TokenStore>,
}

impl Prober {
    pub fn new(config: &GatewayConfig, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ExplorerError::Network(format!("Failed to create probe client: {}", e)))?;

        Ok(Self { client, tokens })
    }

    /// Never fails: every outcome is folded into the returned status.
    pub async fn probe(&self, url: &str) -> ProbeStatus {
        let started = Instant::now();

        let mut req = self.client.get(url).query(&[FORMAT_PARAM]);
        if let Some(token) = self.tokens.get_token(url) {
            req = req.query(&[(TOKEN_PARAM, token)]);
        }

        let response = match req.send().await {
            Ok(response) => response,
            Err(e) => {
                let elapsed = started.elapsed().as_millis() as u64;
                tracing::debug!("Probe of {} failed: {}", url, e);
                return ProbeStatus::failed(e.to_string(), elapsed);
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                let elapsed = started.elapsed().as_millis() as u64;
                tracing::debug!("Reading probe body of {} failed: {}", url, e);
                return ProbeStatus::failed(e.to_string(), elapsed);
            }
        };
        let elapsed = started.elapsed().as_millis() as u64;

        let verdict = classify(status, &body, elapsed);
        tracing::debug!("Probe of {}: {:?}", url, verdict);
        verdict
    }
}

/// Map a probe response onto a status record.
pub fn classify(status: StatusCode, body: &str, response_time_ms: u64) -> ProbeStatus {
    match status.as_u16() {
        401 | 403 => {
            return ProbeStatus::auth_required(
                format!("Authentication required (HTTP {})", status.as_u16()),
                false,
                response_time_ms,
            );
        }
        301 | 302 | 303 | 307 | 308 => {
            return ProbeStatus::auth_required(
                "Redirected, likely to a login page".to_string(),
                true,
                response_time_ms,
            );
        }
        code if code >= 500 => {
            return ProbeStatus::failed(format!("HTTP {}", code), response_time_ms);
        }
        _ => {}
    }

    if body.trim().is_empty() {
        return ProbeStatus {
            is_empty: true,
            response_time_ms,
            ..Default::default()
        };
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) if status.is_success() => {
            return ProbeStatus::failed("Response is not valid JSON".to_string(), response_time_ms);
        }
        Err(_) => {
            return ProbeStatus::failed(format!("HTTP {}", status.as_u16()), response_time_ms);
        }
    };

    if value.as_object().is_some_and(|o| o.is_empty()) {
        return ProbeStatus {
            is_empty: true,
            response_time_ms,
            ..Default::default()
        };
    }

    if let Some((code, message)) = embedded_error(&value) {
        return match code {
            TOKEN_REQUIRED_CODE | INVALID_TOKEN_CODE | 401 | 403 => {
                ProbeStatus::auth_required(message, false, response_time_ms)
            }
            _ => ProbeStatus::failed(message, response_time_ms),
        };
    }

    if !status.is_success() {
        return ProbeStatus::failed(format!("HTTP {}", status.as_u16()), response_time_ms);
    }

    ProbeStatus {
        accessible: true,
        response_time_ms,
        ..Default::default()
    }
}
