//! # HTTP JSON-RPC Client
//!
//! Speaks the wallet daemon's dialect: JSON-RPC 1.0 over HTTP POST with
//! basic auth and a fixed request id. No connection multiplexing, no
//! batching — one call, one response, matched by construction.
//!
//! Amounts cross this wire as coin-denominated decimal numbers. They are
//! built from [`Amount::to_decimal_string`] and injected as exact JSON
//! numbers (serde_json's `arbitrary_precision` keeps the digits verbatim)
//! so a payout never passes through binary floating point on our side.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use async_trait::async_trait;

use crate::amount::Amount;
use crate::config::{DAEMON_TIMEOUT, RPC_JSONRPC_VERSION, RPC_REQUEST_ID};

use super::{DaemonError, WalletRpc};

// ---------------------------------------------------------------------------
// Wire Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 1.0 request envelope.
#[derive(Debug, Serialize)]
struct RpcCall<'a> {
    /// Protocol version. Always "1.0" — the daemon predates 2.0.
    jsonrpc: &'static str,
    /// Fixed request id, echoed back by the daemon.
    id: &'static str,
    /// Method name, e.g. `"validateaddress"`.
    method: &'a str,
    /// Positional parameters.
    params: Value,
}

/// A JSON-RPC 1.0 response envelope.
///
/// Exactly one of `result` / `error` is non-null from a conforming
/// daemon; we verify rather than assume.
#[derive(Debug, Deserialize)]
struct RpcReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Daemon-side error object.
#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

// ---------------------------------------------------------------------------
// WalletDaemonClient
// ---------------------------------------------------------------------------

/// JSON-RPC client for the external wallet daemon.
#[derive(Debug, Clone)]
pub struct WalletDaemonClient {
    http: reqwest::Client,
    url: String,
    username: String,
    password: Option<String>,
}

impl WalletDaemonClient {
    /// Builds a client for the daemon at `url` (e.g.
    /// `http://127.0.0.1:8332/`) with basic-auth credentials.
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: Option<String>,
    ) -> Result<Self, DaemonError> {
        let http = reqwest::Client::builder()
            .timeout(DAEMON_TIMEOUT)
            .build()
            .map_err(|e| DaemonError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
            username: username.into(),
            password,
        })
    }

    /// Issues one RPC call and returns the raw `result` value.
    async fn call(&self, method: &str, params: Value) -> Result<Value, DaemonError> {
        let envelope = RpcCall {
            jsonrpc: RPC_JSONRPC_VERSION,
            id: RPC_REQUEST_ID,
            method,
            params,
        };

        let response = self
            .http
            .post(&self.url)
            .basic_auth(&self.username, self.password.as_deref())
            .json(&envelope)
            .send()
            .await
            .map_err(classify_transport_error)?;

        // The daemon reports RPC-level failures both via HTTP status and
        // the error object; the body is authoritative either way.
        let reply: RpcReply = response
            .json()
            .await
            .map_err(|e| DaemonError::MalformedResponse(e.to_string()))?;

        if let Some(err) = reply.error {
            return Err(DaemonError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        reply
            .result
            .ok_or_else(|| DaemonError::MalformedResponse("missing result".to_string()))
    }
}

#[async_trait]
impl WalletRpc for WalletDaemonClient {
    async fn validate_address(&self, address: &str) -> Result<bool, DaemonError> {
        let result = self
            .call("validateaddress", serde_json::json!([address]))
            .await?;
        parse_validate_address(&result)
    }

    async fn verify_message(
        &self,
        address: &str,
        signature: &str,
        message: &str,
    ) -> Result<bool, DaemonError> {
        let result = self
            .call("verifymessage", serde_json::json!([address, signature, message]))
            .await?;
        parse_verify_message(&result)
    }

    async fn send_many(
        &self,
        amounts: &[(String, Amount)],
        min_confirmations: u32,
        comment: &str,
    ) -> Result<String, DaemonError> {
        let params = send_many_params(amounts, min_confirmations, comment)?;
        let result = self.call("sendmany", params).await?;
        parse_send_many(&result)
    }
}

// ---------------------------------------------------------------------------
// Parsing & Parameter Construction
// ---------------------------------------------------------------------------

/// Maps a reqwest failure onto the daemon error taxonomy. Timeouts and
/// mid-flight transport faults stay distinguishable from never-connected,
/// because `sendmany` treats only the latter as a definite failure.
fn classify_transport_error(err: reqwest::Error) -> DaemonError {
    if err.is_timeout() {
        DaemonError::Timeout
    } else if err.is_connect() {
        DaemonError::Unreachable(err.to_string())
    } else {
        DaemonError::Transport(err.to_string())
    }
}

/// `validateaddress` result: an object with an `isvalid` boolean.
fn parse_validate_address(result: &Value) -> Result<bool, DaemonError> {
    result
        .get("isvalid")
        .and_then(Value::as_bool)
        .ok_or_else(|| {
            DaemonError::MalformedResponse(format!("validateaddress: no isvalid in {result}"))
        })
}

/// `verifymessage` result: a bare boolean verdict.
fn parse_verify_message(result: &Value) -> Result<bool, DaemonError> {
    result.as_bool().ok_or_else(|| {
        DaemonError::MalformedResponse(format!("verifymessage: non-boolean verdict {result}"))
    })
}

/// `sendmany` result: the broadcast transaction id.
fn parse_send_many(result: &Value) -> Result<String, DaemonError> {
    result
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| DaemonError::MalformedResponse(format!("sendmany: non-string txid {result}")))
}

/// Builds `sendmany` positional params:
/// `["", {address: decimal_amount, ...}, min_confirmations, comment]`.
/// The leading empty string is the daemon's legacy from-account label.
fn send_many_params(
    amounts: &[(String, Amount)],
    min_confirmations: u32,
    comment: &str,
) -> Result<Value, DaemonError> {
    let mut outputs = serde_json::Map::with_capacity(amounts.len());
    for (address, amount) in amounts {
        let decimal = amount.to_decimal_string();
        let number: serde_json::Number = decimal
            .parse()
            .map_err(|_| DaemonError::MalformedResponse(format!("unencodable amount {decimal}")))?;
        outputs.insert(address.clone(), Value::Number(number));
    }
    Ok(serde_json::json!(["", outputs, min_confirmations, comment]))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
