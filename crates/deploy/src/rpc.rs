//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::DeployError;

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between polling attempts when waiting for readiness.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, DeployError> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| DeployError::NetworkUnreachable(format!("failed to create HTTP client: {e}")))
}

/// Make a JSON-RPC call and deserialize the result.
///
/// Transport failures, 5xx and 429 responses map to
/// [`DeployError::NetworkUnreachable`], error objects to
/// [`DeployError::Rpc`], and anything that does not decode to
/// [`DeployError::InvalidResponse`]. A `null` result decodes into `Option<T>` as `None`.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, DeployError> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|e| {
            DeployError::NetworkUnreachable(format!("{method} request to {url} failed: {e}"))
        })?;

    let status = response.status();
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(DeployError::NetworkUnreachable(format!(
            "{method} request to {url} returned HTTP {status}"
        )));
    }

    let result: Value = response.json().await.map_err(|e| DeployError::InvalidResponse {
        method: method.to_string(),
        reason: format!("body is not JSON: {e}"),
    })?;

    if let Some(error) = result.get("error") {
        return Err(DeployError::Rpc {
            method: method.to_string(),
            code: error
                .get("code")
                .and_then(Value::as_i64)
                .unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        });
    }

    let result_value = result
        .get("result")
        .cloned()
        .ok_or_else(|| DeployError::InvalidResponse {
            method: method.to_string(),
            reason: "no result in response".to_string(),
        })?;

    serde_json::from_value(result_value).map_err(|e| DeployError::InvalidResponse {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a hex quantity (`0x1a`) as returned by `eth_*` methods.
pub fn parse_quantity(method: &str, value: &str) -> Result<u64, DeployError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16).map_err(|e| {
        DeployError::InvalidResponse {
            method: method.to_string(),
            reason: format!("'{value}' is not a hex quantity: {e}"),
        }
    })
}

/// Wait for a service to be ready by repeatedly calling a check function.
///
/// # Arguments
/// * `name` - Name of the service (for error messages)
/// * `timeout` - Maximum time to wait
/// * `check_fn` - Function that returns Ok(()) when the service is ready
pub async fn wait_until_ready<F, Fut>(
    name: &str,
    timeout: Duration,
    check_fn: F,
) -> Result<(), anyhow::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<(), DeployError>>,
{
    let start = std::time::Instant::now();

    loop {
        if start.elapsed() > timeout {
            anyhow::bail!("Timeout waiting for {} to be ready", name);
        }

        match check_fn().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::trace!(error = %e, service = %name, "Readiness check failed, retrying...");
            }
        }

        tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
    }
}
