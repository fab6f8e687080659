//! JSON-RPC 2.0 framing and the MCP messages ToolRelay uses.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolrelay_core::tool::ToolDescriptor;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Method-not-found, per JSON-RPC 2.0.
pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JsonRpcNotification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> JsonRpcNotification<'a> {
    pub fn new(method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    pub id: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A message read from the server.
#[derive(Debug)]
pub enum Incoming {
    Response(JsonRpcResponse),
    Request { id: Value, method: String },
    Notification { method: String },
}

/// Classify one line of server output.
pub fn parse_incoming(line: &str) -> Result<Incoming, serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;

    if let Some(method) = value.get("method").and_then(|m| m.as_str()) {
        let method = method.to_string();
        return Ok(match value.get("id") {
            Some(id) if !id.is_null() => Incoming::Request {
                id: id.clone(),
                method,
            },
            _ => Incoming::Notification { method },
        });
    }

    serde_json::from_value(value).map(Incoming::Response)
}

pub fn initialize_params(client_name: &str, client_version: &str) -> Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": client_name,
            "version": client_version,
        }
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: String,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsListResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_without_empty_params() {
        let req = JsonRpcRequest::new(3, "tools/list", None);
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","id":3,"method":"tools/list"}"#);
    }

    #[test]
    fn classify_response_request_and_notification() {
        let resp = parse_incoming(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert!(matches!(resp, Incoming::Response(r) if r.id == 1 && r.error.is_none()));

        let req = parse_incoming(r#"{"jsonrpc":"2.0","id":"a","method":"ping"}"#).unwrap();
        assert!(matches!(req, Incoming::Request { ref method, .. } if method == "ping"));

        let note =
            parse_incoming(r#"{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}"#)
                .unwrap();
        assert!(matches!(note, Incoming::Notification { .. }));
    }

    #[test]
    fn classify_error_response() {
        let resp = parse_incoming(
            r#"{"jsonrpc":"2.0","id":9,"error":{"code":-32602,"message":"bad params"}}"#,
        )
        .unwrap();
        match resp {
            Incoming::Response(r) => {
                let err = r.error.unwrap();
                assert_eq!(err.code, -32602);
                assert_eq!(err.message, "bad params");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn non_json_line_is_rejected() {
        assert!(parse_incoming("Secure MCP Filesystem Server running on stdio").is_err());
    }

    #[test]
    fn tools_list_reads_mcp_tool_shape() {
        let result: ToolsListResult = serde_json::from_value(serde_json::json!({
            "tools": [{
                "name": "read_file",
                "description": "Read a file",
                "inputSchema": { "type": "object", "properties": { "path": { "type": "string" } } }
            }],
            "nextCursor": "page-2"
        }))
        .unwrap();
        assert_eq!(result.tools[0].name, "read_file");
        assert_eq!(result.tools[0].input_schema["properties"]["path"]["type"], "string");
        assert_eq!(result.next_cursor.as_deref(), Some("page-2"));
    }
}
