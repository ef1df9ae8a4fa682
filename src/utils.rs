use crate::transport::{DEFAULT_TIMEOUT, TargetMessage, Transport, TransportResponse, next_id};
use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Parses the JSON reply wrapped in a `TargetMessage`, surfacing CDP protocol errors.
pub(crate) fn serde_msg(msg: &TargetMessage) -> Result<Value> {
    let str_msg = msg.params["message"]
        .as_str()
        .ok_or_else(|| anyhow!("Invalid message format"))?;
    let value: Value = serde_json::from_str(str_msg)?;
    if let Some(err) = value.get("error") {
        return Err(anyhow!(
            "CDP error {}: {}",
            err["code"],
            err["message"].as_str().unwrap_or("unknown")
        ));
    }
    Ok(value)
}

/// Extracts the thrown value of a `Runtime.*` reply, if the page function threw.
pub(crate) fn exception_text(data: &Value) -> Option<String> {
    let details = data["result"].get("exceptionDetails")?;
    let text = details["exception"]["description"]
        .as_str()
        .or_else(|| details["text"].as_str())
        .unwrap_or("page function threw");
    Some(text.to_string())
}

/// Sends a message to a target session and waits for the corresponding reply.
pub(crate) async fn send_and_get_msg(
    transport: Arc<Transport>,
    msg_id: usize,
    session_id: &str,
    msg: String,
) -> Result<TargetMessage> {
    send_and_get_msg_with_timeout(transport, msg_id, session_id, msg, DEFAULT_TIMEOUT).await
}

pub(crate) async fn send_and_get_msg_with_timeout(
    transport: Arc<Transport>,
    msg_id: usize,
    session_id: &str,
    msg: String,
    timeout: Duration,
) -> Result<TargetMessage> {
    let reply = transport.listen_target_msg(msg_id).await?;
    transport
        .send(json!({
            "id": next_id(),
            "method": "Target.sendMessageToTarget",
            "params": { "sessionId": session_id, "message": msg }
        }))
        .await?;

    match Transport::get_target_msg(reply, msg_id, timeout).await? {
        TransportResponse::Target(res) => Ok(res),
        other => Err(anyhow!("Unexpected response: {:?}", other)),
    }
}
