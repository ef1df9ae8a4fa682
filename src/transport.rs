use anyhow::{Result, anyhow};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default time to wait for a CDP response before giving up.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

static GLOBAL_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Returns a unique incremental ID for request messages.
pub(crate) fn next_id() -> usize {
    GLOBAL_ID_COUNTER.fetch_add(1, Ordering::SeqCst) + 1
}

#[derive(Debug)]
pub(crate) enum TransportMessage {
    /// A browser-level command with a response sender.
    Request(Value, oneshot::Sender<Result<TransportResponse>>),
    /// Listener for a session-level reply carrying the given ID.
    ListenTargetMessage(u64, oneshot::Sender<Result<TransportResponse>>),
    Shutdown,
}

#[derive(Debug)]
pub(crate) enum TransportResponse {
    Response(Response),
    Target(TargetMessage),
}

/// A browser-level CDP response.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Response {
    pub(crate) id: u64,
    #[serde(default)]
    pub(crate) result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<Value>,
}

/// A `Target.receivedMessageFromTarget` notification wrapping a session reply.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TargetMessage {
    pub(crate) params: Value,
}

struct TransportActor {
    pending_requests: HashMap<u64, oneshot::Sender<Result<TransportResponse>>>,
    ws_sink: SplitSink<WsStream, Message>,
    command_rx: mpsc::Receiver<TransportMessage>,
}

impl TransportActor {
    async fn run(mut self, mut ws_stream: SplitStream<WsStream>) {
        loop {
            tokio::select! {
                Some(msg) = ws_stream.next() => {
                    match msg {
                        Ok(Message::Text(text)) => self.dispatch(&text),
                        Err(e) => {
                            log::debug!("CDP socket closed: {e}");
                            break;
                        }
                        _ => {}
                    }
                }
                Some(msg) = self.command_rx.recv() => {
                    match msg {
                        TransportMessage::Request(cmd, tx) => {
                            let Some(id) = cmd["id"].as_u64() else {
                                let _ = tx.send(Err(anyhow!("Command without id")));
                                continue;
                            };
                            if self.ws_sink.send(Message::Text(cmd.to_string())).await.is_ok() {
                                self.pending_requests.insert(id, tx);
                            } else {
                                let _ = tx.send(Err(anyhow!("WebSocket send failed")));
                            }
                        }
                        TransportMessage::ListenTargetMessage(id, tx) => {
                            self.pending_requests.insert(id, tx);
                        }
                        TransportMessage::Shutdown => {
                            let _ = self.ws_sink.send(Message::Text(json!({
                                "id": next_id(),
                                "method": "Browser.close",
                                "params": {}
                            }).to_string())).await;
                            let _ = self.ws_sink.close().await;
                            break;
                        }
                    }
                }
                else => break,
            }
        }

        for (_, tx) in self.pending_requests.drain() {
            let _ = tx.send(Err(anyhow!("Transport closed")));
        }
    }

    fn dispatch(&mut self, text: &str) {
        if let Ok(response) = serde_json::from_str::<Response>(text) {
            if let Some(sender) = self.pending_requests.remove(&response.id) {
                let _ = sender.send(Ok(TransportResponse::Response(response)));
            }
            return;
        }
        let Ok(target_msg) = serde_json::from_str::<TargetMessage>(text) else {
            return;
        };
        // Session replies arrive wrapped; events carry no id and are ignored.
        if let Some(inner) = target_msg.params.get("message").and_then(|v| v.as_str())
            && let Ok(inner_json) = serde_json::from_str::<Value>(inner)
            && let Some(id) = inner_json.get("id").and_then(|i| i.as_u64())
            && let Some(sender) = self.pending_requests.remove(&id)
        {
            let _ = sender.send(Ok(TransportResponse::Target(target_msg)));
        }
    }
}

/// Asynchronous CDP transport over a single browser WebSocket.
#[derive(Debug)]
pub(crate) struct Transport {
    tx: mpsc::Sender<TransportMessage>,
}

impl Transport {
    pub(crate) async fn new(ws_url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (ws_sink, ws_stream) = ws_stream.split();
        let (tx, rx) = mpsc::channel(100);

        let actor = TransportActor {
            pending_requests: HashMap::new(),
            ws_sink,
            command_rx: rx,
        };
        tokio::spawn(actor.run(ws_stream));

        Ok(Self { tx })
    }

    /// Sends a browser-level command and awaits its response.
    pub(crate) async fn send(&self, command: Value) -> Result<TransportResponse> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransportMessage::Request(command, tx))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        let response = time::timeout(DEFAULT_TIMEOUT, rx)
            .await
            .map_err(|_| anyhow!("Timeout waiting for response"))?
            .map_err(|_| anyhow!("Response channel closed"))??;
        if let TransportResponse::Response(Response {
            error: Some(err), ..
        }) = &response
        {
            return Err(anyhow!("CDP error: {err}"));
        }
        Ok(response)
    }

    /// Registers interest in the session reply with `msg_id`.
    ///
    /// Must be called before the command is sent: the actor handles its queue in order, so
    /// the listener is in place before the reply can arrive.
    pub(crate) async fn listen_target_msg(
        &self,
        msg_id: usize,
    ) -> Result<oneshot::Receiver<Result<TransportResponse>>> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransportMessage::ListenTargetMessage(msg_id as u64, tx))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        Ok(rx)
    }

    /// Waits up to `timeout` for a reply registered with [`Transport::listen_target_msg`].
    pub(crate) async fn get_target_msg(
        rx: oneshot::Receiver<Result<TransportResponse>>,
        msg_id: usize,
        timeout: Duration,
    ) -> Result<TransportResponse> {
        time::timeout(timeout, rx)
            .await
            .map_err(|_| anyhow!("Timeout waiting for target message {msg_id}"))?
            .map_err(|_| anyhow!("Response channel closed"))?
    }

    pub(crate) async fn shutdown(&self) {
        let _ = self.tx.send(TransportMessage::Shutdown).await;
    }
}
