use crate::tab::{CallArg, Tab};
use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::time::Duration;

/// Represents a DOM element controlled via CDP.
pub struct Element<'a> {
    pub(crate) parent: &'a Tab,
    backend_node_id: u64,
}

impl<'a> Element<'a> {
    pub(crate) async fn new(parent: &'a Tab, node_id: u64) -> Result<Self> {
        let data = parent
            .send_cmd(
                "DOM.describeNode",
                json!({ "nodeId": node_id, "depth": 1 }),
            )
            .await?;
        let backend_node_id = data["result"]["node"]["backendNodeId"]
            .as_u64()
            .context("Missing backendNodeId")?;

        Ok(Self {
            parent,
            backend_node_id,
        })
    }

    pub fn backend_node_id(&self) -> u64 {
        self.backend_node_id
    }

    pub fn tab(&self) -> &'a Tab {
        self.parent
    }

    /// Resolves the node to a JavaScript object the page functions can be bound to.
    pub(crate) async fn resolve(&self) -> Result<RemoteNode<'a>> {
        let data = self
            .parent
            .send_cmd(
                "DOM.resolveNode",
                json!({ "backendNodeId": self.backend_node_id }),
            )
            .await?;
        let object_id = data["result"]["object"]["objectId"]
            .as_str()
            .context("Node could not be resolved")?
            .to_string();
        Ok(RemoteNode {
            tab: self.parent,
            object_id,
        })
    }
}

/// A page-side reference to a DOM node, released explicitly when no longer needed.
pub(crate) struct RemoteNode<'a> {
    pub(crate) tab: &'a Tab,
    pub(crate) object_id: String,
}

impl<'a> RemoteNode<'a> {
    /// Invokes a page function with `this` bound to the node.
    pub(crate) async fn call(
        &self,
        declaration: &str,
        args: &[CallArg],
        timeout: Duration,
    ) -> Result<Value> {
        self.tab
            .call_function_on(&self.object_id, declaration, args, timeout)
            .await
    }

    /// Invokes a page function returning another node.
    pub(crate) async fn call_for_node(&self, declaration: &str, args: &[CallArg]) -> Result<Self> {
        let object_id = self
            .tab
            .call_function_for_object(&self.object_id, declaration, args)
            .await?;
        Ok(Self {
            tab: self.tab,
            object_id,
        })
    }

    pub(crate) fn as_arg(&self) -> CallArg {
        CallArg::Object(self.object_id.clone())
    }

    pub(crate) async fn release(self) {
        self.tab.release_object(&self.object_id).await;
    }
}
