//! JSON-RPC method dispatch.

use serde::Deserialize;
use serde_json::{Value, json};

use super::protocol::{
    INVALID_PARAMS, INVALID_REQUEST, JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND,
    PARSE_ERROR, initialize_result,
};
use crate::tools::ToolContext;

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Parse and handle one raw message.
///
/// Returns `None` for notifications, which never get a response.
pub async fn handle_message(ctx: &ToolContext, raw: &str) -> Option<JsonRpcResponse> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::info!(error = %e, "Unparseable JSON-RPC message");
            return Some(JsonRpcResponse::error(
                None,
                PARSE_ERROR,
                format!("Parse error: {e}"),
            ));
        }
    };

    let id = value.get("id").cloned();
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            return Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("Invalid request: {e}"),
            ));
        }
    };

    if request.jsonrpc != "2.0" {
        return Some(JsonRpcResponse::error(
            request.id,
            INVALID_REQUEST,
            "Invalid request: jsonrpc must be \"2.0\"",
        ));
    }

    dispatch(ctx, request).await
}

/// Handle a decoded request.
#[tracing::instrument(skip(ctx, request), fields(method = %request.method))]
pub async fn dispatch(ctx: &ToolContext, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    if request.is_notification() {
        tracing::debug!("Notification received");
        return None;
    }

    let id = request.id;
    let outcome = match request.method.as_str() {
        "initialize" => Ok(initialize_result()),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": ctx.state.tools().definitions() })),
        "tools/call" => call_tool(ctx, request.params).await,
        other => Err((METHOD_NOT_FOUND, format!("Method not found: {other}"))),
    };

    Some(match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err((code, message)) => JsonRpcResponse::error(id, code, message),
    })
}

async fn call_tool(ctx: &ToolContext, params: Value) -> Result<Value, (i32, String)> {
    let params: CallToolParams = serde_json::from_value(params)
        .map_err(|e| (INVALID_PARAMS, format!("Invalid params: {e}")))?;

    tracing::info!(tool = %params.name, "Tool call");
    ctx.state
        .tools()
        .call(&params.name, ctx, params.arguments)
        .await
        .map_err(|e| (INVALID_PARAMS, e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mcp::protocol::SERVER_NAME;
    use crate::tools::tests::context;

    async fn send(raw: &str) -> Option<JsonRpcResponse> {
        handle_message(&context("http://127.0.0.1:1", None), raw).await
    }

    fn error_code(response: &JsonRpcResponse) -> i32 {
        response.error.as_ref().unwrap().code
    }

    #[tokio::test]
    async fn test_initialize() {
        let response = send(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();
        assert_eq!(response.id, json!(1));
        assert_eq!(response.result.unwrap()["serverInfo"]["name"], SERVER_NAME);
    }

    #[tokio::test]
    async fn test_initialized_notification_has_no_response() {
        assert!(
            send(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_ping() {
        let response = send(r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(response.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_null_id_request_is_answered() {
        let response = send(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(response.id, Value::Null);
        assert_eq!(response.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_tools_list() {
        let response = send(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
            .await
            .unwrap();
        let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 7);
    }

    #[tokio::test]
    async fn test_tools_call() {
        let response = send(
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call",
                "params":{"name":"cancel_order","arguments":{"order_id":"ORD-9","reason":"late"}}}"#,
        )
        .await
        .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["isError"], false);
        assert_eq!(result["structuredContent"]["order_id"], "ORD-9");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_invalid_params() {
        let response = send(
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"nope"}}"#,
        )
        .await
        .unwrap();
        assert_eq!(error_code(&response), INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_missing_tool_name_is_invalid_params() {
        let response = send(r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{}}"#)
            .await
            .unwrap();
        assert_eq!(error_code(&response), INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = send(r#"{"jsonrpc":"2.0","id":6,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(error_code(&response), METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_parse_error() {
        let response = send("{not json").await.unwrap();
        assert_eq!(error_code(&response), PARSE_ERROR);
        assert_eq!(response.id, Value::Null);
    }

    #[tokio::test]
    async fn test_wrong_version_is_invalid_request() {
        let response = send(r#"{"jsonrpc":"1.0","id":7,"method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(error_code(&response), INVALID_REQUEST);
        assert_eq!(response.id, json!(7));
    }

    #[tokio::test]
    async fn test_missing_method_is_invalid_request() {
        let response = send(r#"{"jsonrpc":"2.0","id":8}"#).await.unwrap();
        assert_eq!(error_code(&response), INVALID_REQUEST);
        assert_eq!(response.id, json!(8));
    }
}
