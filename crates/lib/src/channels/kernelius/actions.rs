//! Action surface for agent tool calls and the gateway's `/actions` endpoint.

use crate::channels::kernelius::error::KerneliusError;
use crate::channels::kernelius::KerneliusChannel;
use serde_json::{json, Value};

/// A `sendMessage` tool call reduced to its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSend {
    pub to: String,
    pub account_id: Option<String>,
}

/// Recognize a `sendMessage` tool call (`{ "action": "sendMessage", "to": ..., "accountId"?: ... }`).
pub fn extract_tool_send(args: &Value) -> Option<ToolSend> {
    let action = args.get("action").and_then(Value::as_str).map(str::trim)?;
    if action != "sendMessage" {
        return None;
    }
    let to = args
        .get("to")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())?;
    let account_id = args
        .get("accountId")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string());
    Some(ToolSend {
        to: to.to_string(),
        account_id,
    })
}

fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Run a named action (`send` or `react`) with JSON params and return its JSON result.
pub async fn handle_action(
    channel: &KerneliusChannel,
    action: &str,
    params: &Value,
    account_id: Option<&str>,
) -> Result<Value, KerneliusError> {
    match action {
        "send" => {
            let (Some(to), Some(message)) = (str_param(params, "to"), str_param(params, "message"))
            else {
                return Err(KerneliusError::MissingParams("to, message"));
            };
            let sent = channel.send(to, message, account_id).await?;
            Ok(json!({
                "success": true,
                "messageId": sent.message_id,
                "timestamp": sent.timestamp.to_rfc3339(),
            }))
        }
        "react" => {
            let (Some(message_id), Some(emoji)) =
                (str_param(params, "messageId"), str_param(params, "emoji"))
            else {
                return Err(KerneliusError::MissingParams("messageId, emoji"));
            };
            let result = channel.react(message_id, emoji, account_id).await?;
            Ok(json!({ "success": true, "added": result.added }))
        }
        other => Err(KerneliusError::UnknownAction(other.to_string())),
    }
}
