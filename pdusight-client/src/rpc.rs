//! JSON-RPC 2.0 transport for the PDU management API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};

/// Basic-auth credentials for device access.
#[derive(Debug, Clone)]
pub struct Auth {
    pub username: String,
    pub password: String,
}

/// A single RPC request: method name plus optional parameters.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Create a request without parameters.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    /// Create a request carrying parameters.
    pub fn with_params(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params: Some(params),
        }
    }
}

/// A decoded RPC response. The device sets exactly one of `error`/`result`
/// on well-behaved firmware, but `error` wins whenever both appear.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub error: Option<RpcError>,
    #[serde(default)]
    pub result: Option<Value>,
}

/// Error object reported by the device.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl Response {
    /// Unwrap the response with error-before-result precedence.
    pub fn into_result(self) -> Result<Value> {
        if let Some(e) = self.error {
            return Err(Error::Rpc {
                code: e.code,
                message: e.message,
                data: e.data,
            });
        }
        self.result
            .ok_or_else(|| Error::Protocol("expected RPC result, got neither result nor error".to_string()))
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
}

static REQUEST_ID: AtomicU64 = AtomicU64::new(0);

/// Next process-wide request id. Uniqueness is all that matters here; ids
/// are never persisted or matched against responses.
fn next_request_id() -> u64 {
    REQUEST_ID.fetch_add(1, Ordering::Relaxed) + 1
}

/// JSON-RPC client with basic auth and a fixed request timeout.
///
/// Certificate verification is disabled: PDUs in the field almost always
/// present self-signed certificates.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    auth: Auth,
}

impl RpcClient {
    pub fn new(timeout: Duration, auth: Auth) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { http, auth })
    }

    /// Perform a single JSON-RPC call against `url`.
    pub async fn call(&self, url: Url, request: &Request) -> Result<Response> {
        let body = Envelope {
            jsonrpc: "2.0",
            id: next_request_id(),
            method: &request.method,
            params: request.params.as_ref(),
        };

        let res = self
            .http
            .post(url)
            .basic_auth(&self.auth.username, Some(&self.auth.password))
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(Error::Http { status });
        }

        let text = res.text().await?;
        serde_json::from_str(&text).map_err(|e| Error::Protocol(format!("malformed RPC response: {e}")))
    }

    /// Standardised JSON-RPC batch calls are not supported by the PDU
    /// firmware. Use the vendor bulk endpoint instead.
    pub async fn batch_call(&self, _url: Url, _requests: &[Request]) -> Result<Vec<Response>> {
        Err(Error::UnsupportedOperation(
            "JSON-RPC batch calls are not supported by the PDU firmware",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_result_success() {
        let response = Response {
            error: None,
            result: Some(json!({"x": 1})),
        };
        assert_eq!(response.into_result().unwrap(), json!({"x": 1}));
    }

    #[test]
    fn test_into_result_error_wins_over_result() {
        let response = Response {
            error: Some(RpcError {
                code: -32601,
                message: "Method not found".to_string(),
                data: None,
            }),
            result: Some(json!({"x": 1})),
        };

        match response.into_result() {
            Err(Error::Rpc { code, message, .. }) => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("expected RPC error, got {other:?}"),
        }
    }

    #[test]
    fn test_into_result_neither_is_protocol_error() {
        let response = Response {
            error: None,
            result: None,
        };
        assert!(matches!(response.into_result(), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_request_ids_increase() {
        let a = next_request_id();
        let b = next_request_id();
        assert!(b > a);
    }

    #[test]
    fn test_request_serialization_skips_missing_params() {
        let request = Request::new("getMetaData");
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body, json!({"method": "getMetaData"}));
    }
}
