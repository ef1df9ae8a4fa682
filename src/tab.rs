use crate::element::Element;
use crate::transport::{DEFAULT_TIMEOUT, Transport, TransportResponse, next_id};
use crate::types::{ClipRegion, Viewport};
use crate::utils::{self, send_and_get_msg_with_timeout};
use anyhow::{Context, Result, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// How long `set_content` lets the page settle before giving up.
const CONTENT_TIMEOUT: Duration = Duration::from_secs(35);

/// Writes the document, then resolves once stylesheets, images and fonts are loaded and the
/// DOM has been quiet for 200ms (at least 500ms after start).
const SET_CONTENT_JS: &str = r#"
(async () => {
  const limit = 30000, quiet = 200, minimum = 500, start = Date.now();
  document.open();
  document.write(CONTENT_PLACEHOLDER);
  document.close();
  await new Promise((resolve, reject) => {
    let observer = null, lastMutation = Date.now();
    const finish = () => { if (observer) observer.disconnect(); resolve(true); };
    const waitQuiet = () => {
      const now = Date.now();
      if (now - start > limit) return finish();
      if (now - lastMutation >= quiet && now - start >= minimum) {
        return requestAnimationFrame(() => requestAnimationFrame(finish));
      }
      setTimeout(waitQuiet, 100);
    };
    const waitLoaded = async () => {
      if (Date.now() - start > limit) return reject(new Error("Timeout"));
      if (document.readyState !== "complete") return setTimeout(waitLoaded, 100);
      await document.fonts.ready;
      const pending = [
        ...document.querySelectorAll('link[rel="stylesheet"]'),
        ...document.images,
      ].filter((n) => (n.tagName === "LINK" ? !n.sheet : !n.complete));
      if (pending.length > 0) return setTimeout(waitLoaded, 100);
      observer = new MutationObserver(() => { lastMutation = Date.now(); });
      observer.observe(document.documentElement, {
        childList: true, subtree: true, attributes: true, characterData: true,
      });
      waitQuiet();
    };
    waitLoaded();
  });
  return "Page stable";
})()
"#;

/// An argument to a page function: a plain JSON value or a remote object handle.
#[derive(Debug, Clone)]
pub(crate) enum CallArg {
    Value(Value),
    Object(String),
}

impl CallArg {
    fn to_json(&self) -> Value {
        match self {
            CallArg::Value(v) => json!({ "value": v }),
            CallArg::Object(id) => json!({ "objectId": id }),
        }
    }
}

impl From<Value> for CallArg {
    fn from(value: Value) -> Self {
        CallArg::Value(value)
    }
}

/// Represents a CDP browser tab (target) session.
pub struct Tab {
    pub(crate) transport: Arc<Transport>,
    pub(crate) session_id: String,
    pub(crate) target_id: String,
}

impl Tab {
    /// Creates a new blank tab and attaches to it.
    pub(crate) async fn new(transport: Arc<Transport>) -> Result<Self> {
        let TransportResponse::Response(res_create) = transport
            .send(json!({ "id": next_id(), "method": "Target.createTarget", "params": { "url": "about:blank" } }))
            .await? else { return Err(anyhow!("Invalid response type")); };

        let target_id = res_create.result["targetId"]
            .as_str()
            .context("No targetId")?
            .to_string();

        let TransportResponse::Response(res_attach) = transport
            .send(json!({ "id": next_id(), "method": "Target.attachToTarget", "params": { "targetId": target_id } }))
            .await? else { return Err(anyhow!("Invalid response type")); };

        let session_id = res_attach.result["sessionId"]
            .as_str()
            .context("No sessionId")?
            .to_string();

        Ok(Self {
            transport,
            session_id,
            target_id,
        })
    }

    pub(crate) async fn send_cmd(&self, method: &str, params: Value) -> Result<Value> {
        self.send_cmd_with_timeout(method, params, DEFAULT_TIMEOUT)
            .await
    }

    pub(crate) async fn send_cmd_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let msg_id = next_id();
        let msg = json!({
            "id": msg_id,
            "method": method,
            "params": params
        })
        .to_string();
        let res = send_and_get_msg_with_timeout(
            self.transport.clone(),
            msg_id,
            &self.session_id,
            msg,
            timeout,
        )
        .await?;
        utils::serde_msg(&res)
    }

    /// Sets the tab's HTML content and waits until the page is stable.
    pub async fn set_content(&self, content: &str) -> Result<&Self> {
        let js = SET_CONTENT_JS.replace("CONTENT_PLACEHOLDER", &serde_json::to_string(content)?);
        let data = self
            .send_cmd_with_timeout(
                "Runtime.evaluate",
                json!({ "expression": js, "awaitPromise": true, "returnByValue": true }),
                CONTENT_TIMEOUT,
            )
            .await?;
        if let Some(text) = utils::exception_text(&data) {
            return Err(anyhow!("set_content failed: {text}"));
        }
        Ok(self)
    }

    /// Evaluates an expression in the page and returns its value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let data = self
            .send_cmd(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true
                }),
            )
            .await?;
        if let Some(text) = utils::exception_text(&data) {
            return Err(anyhow!(text));
        }
        Ok(data["result"]["result"]["value"].clone())
    }

    /// Calls `declaration` with `this` bound to the remote object and returns its value.
    pub(crate) async fn call_function_on(
        &self,
        object_id: &str,
        declaration: &str,
        args: &[CallArg],
        timeout: Duration,
    ) -> Result<Value> {
        let arguments: Vec<Value> = args.iter().map(CallArg::to_json).collect();
        let data = self
            .send_cmd_with_timeout(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": object_id,
                    "functionDeclaration": declaration,
                    "arguments": arguments,
                    "returnByValue": true,
                    "awaitPromise": true
                }),
                timeout,
            )
            .await?;
        if let Some(text) = utils::exception_text(&data) {
            return Err(anyhow!(text));
        }
        Ok(data["result"]["result"]["value"].clone())
    }

    /// Like [`Tab::call_function_on`], but returns a handle to the resulting object.
    pub(crate) async fn call_function_for_object(
        &self,
        object_id: &str,
        declaration: &str,
        args: &[CallArg],
    ) -> Result<String> {
        let arguments: Vec<Value> = args.iter().map(CallArg::to_json).collect();
        let data = self
            .send_cmd(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": object_id,
                    "functionDeclaration": declaration,
                    "arguments": arguments,
                    "returnByValue": false,
                    "awaitPromise": true
                }),
            )
            .await?;
        if let Some(text) = utils::exception_text(&data) {
            return Err(anyhow!(text));
        }
        data["result"]["result"]["objectId"]
            .as_str()
            .map(str::to_string)
            .context("Function did not return an object")
    }

    /// Evaluates `expression` in the background, for cleanup that cannot be awaited.
    pub(crate) fn spawn_evaluate(&self, expression: String) {
        let transport = self.transport.clone();
        let session_id = self.session_id.clone();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::warn!("No runtime to run deferred page cleanup");
            return;
        };
        handle.spawn(async move {
            let msg_id = next_id();
            let msg = json!({
                "id": msg_id,
                "method": "Runtime.evaluate",
                "params": { "expression": expression, "returnByValue": true }
            })
            .to_string();
            if let Err(e) = utils::send_and_get_msg(transport, msg_id, &session_id, msg).await {
                log::warn!("Deferred page cleanup failed: {e}");
            }
        });
    }

    pub(crate) async fn release_object(&self, object_id: &str) {
        if let Err(e) = self
            .send_cmd("Runtime.releaseObject", json!({ "objectId": object_id }))
            .await
        {
            log::debug!("Failed to release remote object: {e}");
        }
    }

    /// Finds the first element matching the given CSS selector.
    pub async fn find_element(&self, selector: &str) -> Result<Element<'_>> {
        let data_doc = self.send_cmd("DOM.getDocument", json!({})).await?;
        let root_node_id = data_doc["result"]["root"]["nodeId"]
            .as_u64()
            .context("No root node")?;

        let data_sel = self
            .send_cmd(
                "DOM.querySelector",
                json!({ "nodeId": root_node_id, "selector": selector }),
            )
            .await?;
        let node_id = data_sel["result"]["nodeId"]
            .as_u64()
            .filter(|id| *id != 0)
            .with_context(|| format!("Element not found: {selector}"))?;

        Element::new(self, node_id).await
    }

    pub async fn set_viewport(&self, viewport: &Viewport) -> Result<&Self> {
        let screen_orientation = if viewport.is_landscape() {
            json!({"type": "landscapePrimary", "angle": 90})
        } else {
            json!({"type": "portraitPrimary", "angle": 0})
        };

        self.send_cmd(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": viewport.width,
                "height": viewport.height,
                "deviceScaleFactor": viewport.device_scale_factor,
                "mobile": viewport.is_mobile,
                "screenOrientation": screen_orientation
            }),
        )
        .await?;
        Ok(self)
    }

    /// Makes the page's default background transparent (`true`) or restores it.
    pub async fn set_transparent_background(&self, transparent: bool) -> Result<&Self> {
        let params = if transparent {
            json!({ "color": { "r": 0, "g": 0, "b": 0, "a": 0 } })
        } else {
            json!({})
        };
        self.send_cmd("Emulation.setDefaultBackgroundColorOverride", params)
            .await?;
        Ok(self)
    }

    /// Bypasses the HTTP cache for every sub-resource the page fetches from now on.
    pub async fn set_cache_disabled(&self, disabled: bool) -> Result<&Self> {
        self.send_cmd("Network.enable", json!({})).await?;
        self.send_cmd("Network.setCacheDisabled", json!({ "cacheDisabled": disabled }))
            .await?;
        Ok(self)
    }

    /// Captures the clipped region as PNG bytes.
    pub async fn capture_png(&self, clip: ClipRegion) -> Result<Vec<u8>> {
        self.activate().await?;
        let data = self
            .send_cmd(
                "Page.captureScreenshot",
                json!({
                    "format": "png",
                    "fromSurface": true,
                    "captureBeyondViewport": true,
                    "clip": {
                        "x": clip.x,
                        "y": clip.y,
                        "width": clip.width,
                        "height": clip.height,
                        "scale": clip.scale
                    }
                }),
            )
            .await?;
        let encoded = data["result"]["data"]
            .as_str()
            .context("No image data received")?;
        Ok(STANDARD.decode(encoded)?)
    }

    /// Activates the target tab to bring it to the foreground.
    pub async fn activate(&self) -> Result<&Self> {
        self.send_cmd(
            "Target.activateTarget",
            json!({ "targetId": self.target_id }),
        )
        .await?;
        Ok(self)
    }

    /// Navigates the tab to the specified URL and waits until the page is stable.
    pub async fn goto(&self, url: &str) -> Result<&Self> {
        self.send_cmd("Page.navigate", json!({ "url": url })).await?;
        let deadline = tokio::time::Instant::now() + CONTENT_TIMEOUT;
        loop {
            let state = self.evaluate("document.readyState").await.ok();
            if state.as_ref().and_then(Value::as_str) == Some("complete") {
                break;
            }
            if tokio::time::Instant::now() > deadline {
                return Err(anyhow!("Timeout waiting for {url} to load"));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Ok(self)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Closes the target tab.
    pub async fn close(&self) -> Result<()> {
        self.send_cmd(
            "Target.closeTarget",
            json!({ "targetId": self.target_id }),
        )
        .await?;
        Ok(())
    }
}
