//! Moving slates between wallets: slate files and the foreign JSON-RPC endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::{ErrorResponse, WalletError, WalletResult};
use crate::slate::{Slate, SUPPORTED_VERSIONS};
use crate::wallet::Wallet;

/// Path of the foreign API below a wallet's listener address.
pub const FOREIGN_API_PATH: &str = "/v2/foreign";

/// Delivers a slate to a counterparty and waits for its reply.
pub trait SlateTransport: Send + Sync {
    /// Sends `slate` to `dest` and returns the receiver's response.
    fn send_tx_sync(&self, dest: &str, slate: &Slate) -> WalletResult<Slate>;
}

/// JSON-RPC 2.0 request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always "2.0".
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Request id, echoed in the response.
    pub id: Value,
    /// Positional parameters.
    #[serde(default)]
    pub params: Vec<Value>,
}

impl RpcRequest {
    /// Request with id 1.
    pub fn new(method: &str, params: Vec<Value>) -> Self {
        RpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            id: json!(1),
            params,
        }
    }
}

/// Error member of a JSON-RPC response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    /// JSON-RPC error code.
    pub code: i64,
    /// Description.
    pub message: String,
    /// Wallet error code, when the failure came from the wallet.
    #[serde(default)]
    pub data: Option<ErrorResponse>,
}

/// JSON-RPC 2.0 response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always "2.0".
    pub jsonrpc: String,
    /// Id of the request.
    pub id: Value,
    /// Result on success.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error on failure.
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        RpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i64, message: String, data: Option<ErrorResponse>) -> Self {
        RpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message,
                data,
            }),
        }
    }

    /// Extracts the slate returned by `receive_tx`. A wallet error reported by the
    /// receiver comes back as the same `WalletError` kind.
    pub fn into_slate(self) -> WalletResult<Slate> {
        if let Some(e) = self.error {
            return Err(match e.data {
                Some(data) => data.into(),
                None => WalletError::Transport(format!(
                    "receiver refused the slate: {} ({})",
                    e.message, e.code
                )),
            });
        }
        let result = self
            .result
            .ok_or_else(|| WalletError::Transport("response has no result".into()))?;
        Slate::from_json(&result.to_string())
    }
}

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const WALLET_ERROR: i64 = -32000;

/// Serves one foreign API request against `wallet`. Never fails: errors become
/// JSON-RPC error responses.
///
/// Methods: `check_version` and `receive_tx(slate, dest_acct_name, message)`.
pub fn handle_foreign_request(wallet: &Wallet, body: &str) -> String {
    let response = match serde_json::from_str::<RpcRequest>(body) {
        Ok(request) => dispatch(wallet, request),
        Err(e) => RpcResponse::err(Value::Null, PARSE_ERROR, e.to_string(), None),
    };
    serde_json::to_string(&response).unwrap_or_else(|e| {
        format!(
            r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{},"message":"{}"}}}}"#,
            WALLET_ERROR, e
        )
    })
}

fn dispatch(wallet: &Wallet, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    match request.method.as_str() {
        "check_version" => RpcResponse::ok(
            id,
            json!({ "foreign_api_version": 2, "supported_slate_versions": SUPPORTED_VERSIONS }),
        ),
        "receive_tx" => {
            let slate = match request.params.get(0) {
                Some(v) => match Slate::from_json(&v.to_string()) {
                    Ok(slate) => slate,
                    Err(e) => {
                        return RpcResponse::err(
                            id,
                            INVALID_PARAMS,
                            e.to_string(),
                            Some((&e).into()),
                        )
                    }
                },
                None => {
                    return RpcResponse::err(id, INVALID_PARAMS, "missing slate".into(), None)
                }
            };
            let message = request
                .params
                .get(2)
                .and_then(|m| m.as_str())
                .map(|m| m.to_string());
            match wallet
                .receive_slate(&slate, None, message)
                .and_then(|s| Ok(serde_json::to_value(&s)?))
            {
                Ok(value) => RpcResponse::ok(id, value),
                Err(e) => {
                    warn!(slate_id = %slate.id, error = %e, "foreign receive_tx failed");
                    RpcResponse::err(id, WALLET_ERROR, e.to_string(), Some((&e).into()))
                }
            }
        }
        other => RpcResponse::err(
            id,
            METHOD_NOT_FOUND,
            format!("unknown method {}", other),
            None,
        ),
    }
}

/// Sends slates to a listening wallet over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Transport with a request timeout.
    pub fn new(timeout: Duration) -> WalletResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalletError::Transport(e.to_string()))?;
        Ok(HttpTransport { client })
    }

    /// Foreign API URL of a wallet listening at `dest`.
    pub fn foreign_url(dest: &str) -> String {
        format!("{}{}", dest.trim_end_matches('/'), FOREIGN_API_PATH)
    }
}

impl SlateTransport for HttpTransport {
    fn send_tx_sync(&self, dest: &str, slate: &Slate) -> WalletResult<Slate> {
        let url = Self::foreign_url(dest);
        let request = RpcRequest::new(
            "receive_tx",
            vec![serde_json::to_value(slate)?, Value::Null, Value::Null],
        );
        debug!(url = %url, slate_id = %slate.id, "sending slate");
        let response: RpcResponse = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| WalletError::Transport(format!("{}: {}", url, e)))?;
        response.into_slate()
    }
}

/// Delivers slates to a wallet in the same process through its foreign API handler.
pub struct LoopbackTransport {
    receiver: Arc<Wallet>,
}

impl LoopbackTransport {
    /// Transport whose every destination is `receiver`.
    pub fn new(receiver: Arc<Wallet>) -> Self {
        LoopbackTransport { receiver }
    }
}

impl SlateTransport for LoopbackTransport {
    fn send_tx_sync(&self, _dest: &str, slate: &Slate) -> WalletResult<Slate> {
        let request = RpcRequest::new("receive_tx", vec![serde_json::to_value(slate)?]);
        let reply = handle_foreign_request(&self.receiver, &serde_json::to_string(&request)?);
        serde_json::from_str::<RpcResponse>(&reply)?.into_slate()
    }
}

/// Reads a slate file.
pub fn read_slate_file(path: impl AsRef<Path>) -> WalletResult<Slate> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)?;
    debug!(path = %path.display(), "slate read");
    Slate::from_json(&json)
}

/// Writes a slate file, creating its directory.
pub fn write_slate_file(path: impl AsRef<Path>, slate: &Slate) -> WalletResult<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, slate.to_json()?)?;
    debug!(path = %path.display(), "slate written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_url() {
        assert_eq!(
            HttpTransport::foreign_url("http://127.0.0.1:3415/"),
            "http://127.0.0.1:3415/v2/foreign"
        );
    }

    #[test]
    fn error_without_wallet_data_is_a_transport_error() {
        let response = RpcResponse::err(json!(1), WALLET_ERROR, "boom".into(), None);
        assert!(matches!(
            response.into_slate(),
            Err(WalletError::Transport(_))
        ));
    }

    #[test]
    fn wallet_error_survives_the_envelope() {
        let refused = WalletError::AmountMismatch {
            expected: 5,
            actual: 6,
        };
        let response = RpcResponse::err(
            json!(1),
            WALLET_ERROR,
            refused.to_string(),
            Some((&refused).into()),
        );
        let json = serde_json::to_string(&response).unwrap();
        let parsed: RpcResponse = serde_json::from_str(&json).unwrap();
        let err = parsed.into_slate().unwrap_err();
        assert!(matches!(
            err,
            WalletError::AmountMismatch {
                expected: 5,
                actual: 6
            }
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn request_params_default_to_empty() {
        let request: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"check_version","id":7}"#).unwrap();
        assert!(request.params.is_empty());
        assert_eq!(request.id, json!(7));
    }
}
