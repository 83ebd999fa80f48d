//! Vendor bulk endpoint: several resource-addressed RPC calls in one
//! HTTP exchange.
//!
//! The device does not implement standard JSON-RPC batching. Instead it
//! exposes a `performBulk` method whose parameters embed one complete
//! JSON-RPC body per resource; responses correlate to requests purely by
//! array position.

use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use crate::error::{Error, Result};
use crate::rpc::{Request, Response, RpcClient};

/// One sub-call of a bulk exchange, addressed to a resource id.
#[derive(Debug, Clone)]
pub struct BulkRequest {
    pub rid: String,
    pub request: Request,
}

impl BulkRequest {
    pub fn new(rid: impl Into<String>, request: Request) -> Self {
        Self {
            rid: rid.into(),
            request,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkResult {
    #[serde(rename = "Responses")]
    responses: Vec<BulkResponse>,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(rename = "StatCode")]
    stat_code: u16,
    #[serde(rename = "JSON")]
    json: Option<Response>,
}

/// Vendor result envelope: the real value hides under `_ret_`.
#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(rename = "_ret_")]
    ret: Value,
}

/// Unwrap a response down to its vendor payload, applying
/// error-before-result precedence first.
pub(crate) fn unwrap_payload(response: Response) -> Result<Value> {
    let result = response.into_result()?;
    let payload: Payload = serde_json::from_value(result)
        .map_err(|e| Error::Protocol(format!("missing _ret_ payload envelope: {e}")))?;
    Ok(payload.ret)
}

impl RpcClient {
    /// Issue one `performBulk` call carrying `requests` and return the raw
    /// payload of each sub-response, in request order.
    ///
    /// Any sub-response with a non-200 status fails the whole batch; no
    /// partial results are surfaced. Callers decode the returned slots into
    /// their own per-element target types.
    pub async fn bulk_call(&self, bulk_url: Url, requests: &[BulkRequest]) -> Result<Vec<Value>> {
        let subs: Vec<Value> = requests
            .iter()
            .enumerate()
            .map(|(i, r)| {
                json!({
                    "rid": r.rid,
                    "json": {
                        "jsonrpc": "2.0",
                        "method": r.request.method,
                        "params": r.request.params,
                        "id": i,
                    },
                })
            })
            .collect();

        tracing::trace!(requests = requests.len(), "Performing bulk call");

        let call = Request::with_params("performBulk", json!({ "requests": subs }));
        let response = self.call(bulk_url, &call).await?;
        let result: BulkResult = serde_json::from_value(response.into_result()?)
            .map_err(|e| Error::Protocol(format!("malformed bulk result: {e}")))?;

        if result.responses.len() != requests.len() {
            return Err(Error::Bulk(format!(
                "expected {} bulk responses, got {}",
                requests.len(),
                result.responses.len()
            )));
        }

        let mut payloads = Vec::with_capacity(result.responses.len());
        for (i, sub) in result.responses.into_iter().enumerate() {
            if sub.stat_code != 200 {
                return Err(Error::Bulk(format!(
                    "bulk response {} ({} {}) status code not 200: {}",
                    i, requests[i].rid, requests[i].request.method, sub.stat_code
                )));
            }
            let inner = sub
                .json
                .ok_or_else(|| Error::Bulk(format!("bulk response {i} missing JSON body")))?;
            payloads.push(unwrap_payload(inner)?);
        }

        Ok(payloads)
    }
}
