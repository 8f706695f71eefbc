//! Best-effort error telemetry. Non-fatal pipeline failures are posted to
//! Rollbar one item at a time, in addition to local logging; delivery
//! problems are logged and swallowed so reporting can never fail a run.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::warn;

pub const CRATE_NAME: &str = "pickwatch-report";

pub const ROLLBAR_ITEM_URL: &str = "https://api.rollbar.com/api/1/item/";

const ACCESS_TOKEN_HEADER: &str = "X-Rollbar-Access-Token";

#[derive(Debug, Clone)]
pub struct RollbarConfig {
    pub access_token: String,
    pub environment: String,
    pub code_version: String,
}

/// Reporting capability the pipeline consumes. Implementations must swallow
/// their own failures.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    async fn report(&self, message: &str);
}

/// Item payload for the Rollbar API. The access token travels in a request
/// header, never in the payload.
pub fn build_item(
    environment: &str,
    code_version: &str,
    message: &str,
    timestamp: i64,
) -> serde_json::Value {
    json!({
        "data": {
            "environment": environment,
            "level": "error",
            "timestamp": timestamp,
            "code_version": code_version,
            "language": "rust",
            "notifier": {
                "name": CRATE_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "body": {
                "message": {
                    "body": message,
                }
            }
        }
    })
}

pub struct RollbarReporter {
    client: reqwest::Client,
    config: RollbarConfig,
}

impl RollbarReporter {
    pub fn new(config: RollbarConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("building rollbar http client")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ErrorReporter for RollbarReporter {
    async fn report(&self, message: &str) {
        let item = build_item(
            &self.config.environment,
            &self.config.code_version,
            message,
            Utc::now().timestamp(),
        );
        let result = self
            .client
            .post(ROLLBAR_ITEM_URL)
            .header(ACCESS_TOKEN_HEADER, &self.config.access_token)
            .json(&item)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(status = response.status().as_u16(), "rollbar rejected error report");
            }
            Err(err) => warn!(error = %err, "rollbar delivery failed"),
        }
    }
}

/// Reporter that drops every message; used when exercising the pipeline in
/// tests.
#[derive(Debug, Default)]
pub struct NoopReporter;

#[async_trait]
impl ErrorReporter for NoopReporter {
    async fn report(&self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_payload_carries_environment_version_and_message() {
        let item = build_item("production", "a1b2c3d", "upsert failed for Jhin", 1_700_000_000);
        assert_eq!(
            item.pointer("/data/environment").and_then(|v| v.as_str()),
            Some("production")
        );
        assert_eq!(
            item.pointer("/data/code_version").and_then(|v| v.as_str()),
            Some("a1b2c3d")
        );
        assert_eq!(
            item.pointer("/data/level").and_then(|v| v.as_str()),
            Some("error")
        );
        assert_eq!(
            item.pointer("/data/timestamp").and_then(|v| v.as_i64()),
            Some(1_700_000_000)
        );
        assert_eq!(
            item.pointer("/data/body/message/body").and_then(|v| v.as_str()),
            Some("upsert failed for Jhin")
        );
        assert_eq!(
            item.pointer("/data/language").and_then(|v| v.as_str()),
            Some("rust")
        );
    }

    #[test]
    fn access_token_has_no_payload_field() {
        // The token is header-only; the payload builder never even sees it.
        let item = build_item("production", "a1b2c3d", "boom", 0);
        assert!(!item.to_string().contains("access_token"));
        assert!(item.pointer("/data/notifier/name").is_some());
    }
}
