//! Staging of the export clone: the off-screen host it renders in, the style normalisation
//! that makes it independent of its position in the editor, and the ancestor-transform
//! neutraliser that keeps the live element measurable at its layout size.

use anyhow::{Context, Result};
use image::Rgba;
use serde::Deserialize;
use serde_json::json;

use super::inliner::StyleInliner;
use super::readiness::settle_frames;
use super::variables::resolve_variables;
use crate::color::to_css;
use crate::element::RemoteNode;
use crate::tab::Tab;
use crate::transport::DEFAULT_TIMEOUT;
use crate::types::Size;

/// `id` of the off-screen host element.
pub const HOST_ID: &str = "export-host";

/// Page-side registry holding transforms recorded by [`TransformNeutralizer`].
const REGISTRY: &str = "window.__designShotTransforms";

/// Frames the clone gets to lay out after it is attached.
const STAGE_FRAMES: u32 = 2;

/// Applies `[property, value]` pairs with `important` priority.
const APPLY_FN: &str = r#"
function(declarations) {
  for (const [prop, value] of declarations) this.style.setProperty(prop, value, "important");
}
"#;

const CLONE_FN: &str = "function() { return this.cloneNode(true); }";

const ADOPT_FN: &str = "function(child) { this.appendChild(child); }";

const CREATE_HOST_FN: &str = r#"
function(id, declarations) {
  const doc = this.ownerDocument;
  const host = doc.createElement("div");
  host.id = id;
  for (const [prop, value] of declarations) host.style.setProperty(prop, value, "important");
  doc.body.appendChild(host);
  return host;
}
"#;

const REMOVE_HOST_FN: &str = "function() { this.remove(); }";

/// Records and neutralises every transformed ancestor up to (excluding) `<body>`.
const NEUTRALIZE_FN: &str = r#"
function() {
  const registry = (window.__designShotTransforms ||= { next: 1, records: new Map() });
  const records = [];
  for (let el = this.parentElement;
       el && el !== document.body && el !== document.documentElement;
       el = el.parentElement) {
    const inline = el.style.getPropertyValue("transform");
    const computed = getComputedStyle(el).transform;
    if (inline || (computed && computed !== "none")) {
      records.push({ el, value: inline, priority: el.style.getPropertyPriority("transform") });
      el.style.setProperty("transform", "none", "important");
    }
  }
  const token = registry.next++;
  registry.records.set(token, records);
  return { token, count: records.length };
}
"#;

/// Declarations forced onto the clone before styles are inlined.
pub fn prepared_declarations(size: Size) -> Vec<(String, String)> {
    let (w, h) = (format!("{}px", size.width), format!("{}px", size.height));
    let mut out = dimension_declarations(&w, &h);
    for (prop, value) in [
        ("transform", "none"),
        ("transform-origin", "0 0"),
        ("position", "relative"),
        ("margin", "0"),
        ("padding", "0"),
        ("overflow", "visible"),
        ("box-sizing", "border-box"),
        ("aspect-ratio", "unset"),
    ] {
        out.push((prop.to_string(), value.to_string()));
    }
    out
}

/// Box model re-asserted on the clone after inlining, which would otherwise copy the live
/// element's sizing mode, offsets and transform back onto it. The measured size includes
/// padding and border, so the clone must lay out as `border-box`.
pub fn pinned_declarations(size: Size) -> Vec<(String, String)> {
    let (w, h) = (format!("{}px", size.width), format!("{}px", size.height));
    let mut out = dimension_declarations(&w, &h);
    for (prop, value) in [
        ("box-sizing", "border-box"),
        ("position", "relative"),
        ("top", "auto"),
        ("right", "auto"),
        ("bottom", "auto"),
        ("left", "auto"),
        ("transform", "none"),
        ("transform-origin", "0 0"),
        ("margin", "0"),
        ("aspect-ratio", "unset"),
    ] {
        out.push((prop.to_string(), value.to_string()));
    }
    out
}

fn dimension_declarations(w: &str, h: &str) -> Vec<(String, String)> {
    ["width", "min-width", "max-width"]
        .iter()
        .map(|p| (p.to_string(), w.to_string()))
        .chain(
            ["height", "min-height", "max-height"]
                .iter()
                .map(|p| (p.to_string(), h.to_string())),
        )
        .collect()
}

/// Styles of the off-screen host: fixed far outside the viewport, laid out at exactly the
/// element's size, never interactive and never transformed.
pub fn host_declarations(size: Size, background: Option<Rgba<u8>>) -> Vec<(String, String)> {
    let background = background.map_or_else(|| "transparent".to_string(), to_css);
    [
        ("position", "fixed".to_string()),
        ("left", "-99999px".to_string()),
        ("top", "0".to_string()),
        ("width", format!("{}px", size.width)),
        ("height", format!("{}px", size.height)),
        ("pointer-events", "none".to_string()),
        ("z-index", "-9999".to_string()),
        ("overflow", "visible".to_string()),
        ("transform", "none".to_string()),
        ("margin", "0".to_string()),
        ("padding", "0".to_string()),
        ("background", background),
    ]
    .into_iter()
    .map(|(p, v)| (p.to_string(), v))
    .collect()
}

async fn apply(node: &RemoteNode<'_>, declarations: Vec<(String, String)>) -> Result<()> {
    node.call(APPLY_FN, &[json!(declarations).into()], DEFAULT_TIMEOUT)
        .await?;
    Ok(())
}

/// The off-screen container a staged clone renders in.
///
/// Remove it with [`ExportHost::remove`]; a host dropped without that is removed by a
/// background task.
pub(crate) struct ExportHost<'a> {
    tab: &'a Tab,
    node: Option<RemoteNode<'a>>,
}

impl<'a> ExportHost<'a> {
    /// Appends a fresh host to the document owning `anchor`.
    pub(crate) async fn create(
        anchor: &RemoteNode<'a>,
        size: Size,
        background: Option<Rgba<u8>>,
    ) -> Result<Self> {
        let node = anchor
            .call_for_node(
                CREATE_HOST_FN,
                &[json!(HOST_ID).into(), json!(host_declarations(size, background)).into()],
            )
            .await
            .context("Failed to create export host")?;
        log::debug!("export host attached ({size})");
        Ok(Self {
            tab: anchor.tab,
            node: Some(node),
        })
    }

    pub(crate) fn node(&self) -> Option<&RemoteNode<'a>> {
        self.node.as_ref()
    }

    /// Detaches the host and everything staged in it.
    pub(crate) async fn remove(mut self) {
        let Some(node) = self.node.take() else {
            return;
        };
        if let Err(e) = node.call(REMOVE_HOST_FN, &[], DEFAULT_TIMEOUT).await {
            log::warn!("failed to remove export host, scheduling cleanup: {e:#}");
            self.tab.spawn_evaluate(remove_host_expression());
        }
        node.release().await;
        log::debug!("export host removed");
    }
}

impl Drop for ExportHost<'_> {
    fn drop(&mut self) {
        if self.node.take().is_some() {
            self.tab.spawn_evaluate(remove_host_expression());
        }
    }
}

fn remove_host_expression() -> String {
    format!("document.querySelectorAll('#{HOST_ID}').forEach((n) => n.remove())")
}

/// A prepared clone attached to its host, ready to be serialised or drawn.
pub(crate) struct StagedClone<'a> {
    pub(crate) host: ExportHost<'a>,
    pub(crate) clone: RemoteNode<'a>,
}

impl<'a> StagedClone<'a> {
    pub(crate) fn host_node(&self) -> Result<&RemoteNode<'a>> {
        self.host.node().context("Export host already removed")
    }

    /// Releases the clone handle and removes the host.
    pub(crate) async fn teardown(self) {
        self.clone.release().await;
        self.host.remove().await;
    }
}

/// Clones `target` into a new off-screen host and normalises the clone so it renders at
/// exactly `size` regardless of where the live element sits.
///
/// Order: clone, prepare, inline computed styles, attach, resolve variables from the live
/// element, re-pin the box model, let layout settle.
pub(crate) async fn stage_clone<'a>(
    target: &RemoteNode<'a>,
    size: Size,
    background: Option<Rgba<u8>>,
    inliner: &StyleInliner,
) -> Result<StagedClone<'a>> {
    let host = ExportHost::create(target, size, background).await?;
    match populate(&host, target, size, inliner).await {
        Ok(clone) => Ok(StagedClone { host, clone }),
        Err(e) => {
            host.remove().await;
            Err(e)
        }
    }
}

async fn populate<'a>(
    host: &ExportHost<'a>,
    target: &RemoteNode<'a>,
    size: Size,
    inliner: &StyleInliner,
) -> Result<RemoteNode<'a>> {
    let host_node = host.node().context("Export host already removed")?;
    let clone = target.call_for_node(CLONE_FN, &[]).await?;
    let staged = async {
        apply(&clone, prepared_declarations(size)).await?;
        inliner.inline(target, &clone).await?;
        host_node
            .call(ADOPT_FN, &[clone.as_arg()], DEFAULT_TIMEOUT)
            .await?;
        let visited = resolve_variables(target, &clone).await?;
        log::debug!("resolved paint values on {visited} element(s)");
        apply(&clone, pinned_declarations(size)).await?;
        settle_frames(&clone, STAGE_FRAMES).await
    }
    .await;
    match staged {
        Ok(()) => Ok(clone),
        Err(e) => {
            clone.release().await;
            Err(e)
        }
    }
}

#[derive(Debug, Deserialize)]
struct NeutralizeOutcome {
    token: u64,
    count: usize,
}

/// Ancestor transforms forced to `none` while the live element is measured and captured.
///
/// [`TransformNeutralizer::restore`] puts every recorded value back exactly once; a
/// neutraliser dropped without it restores from a background task.
pub(crate) struct TransformNeutralizer<'a> {
    tab: &'a Tab,
    token: Option<u64>,
    count: usize,
}

impl<'a> TransformNeutralizer<'a> {
    pub(crate) async fn install(target: &RemoteNode<'a>) -> Result<Self> {
        let value = target.call(NEUTRALIZE_FN, &[], DEFAULT_TIMEOUT).await?;
        let outcome: NeutralizeOutcome =
            serde_json::from_value(value).context("Unexpected neutralisation result")?;
        if outcome.count > 0 {
            log::debug!("neutralised {} transformed ancestor(s)", outcome.count);
        }
        Ok(Self {
            tab: target.tab,
            token: Some(outcome.token),
            count: outcome.count,
        })
    }

    /// Number of ancestors whose transform was overridden.
    pub(crate) fn count(&self) -> usize {
        self.count
    }

    /// Reinstates the recorded transforms; returns how many were restored.
    pub(crate) async fn restore(mut self) -> Result<usize> {
        let Some(token) = self.token.take() else {
            return Ok(0);
        };
        match self.tab.evaluate(&restore_expression(token)).await {
            Ok(value) => Ok(value.as_u64().unwrap_or(0) as usize),
            Err(e) => {
                self.tab.spawn_evaluate(restore_expression(token));
                Err(e.context("Failed to restore ancestor transforms"))
            }
        }
    }
}

impl Drop for TransformNeutralizer<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.tab.spawn_evaluate(restore_expression(token));
        }
    }
}

/// Restores the records under `token` and forgets them, so a second run is a no-op.
fn restore_expression(token: u64) -> String {
    format!(
        r#"(() => {{
  const registry = {REGISTRY};
  const records = registry && registry.records.get({token});
  if (!records) return 0;
  registry.records.delete({token});
  for (const r of records) {{
    if (r.value) r.el.style.setProperty("transform", r.value, r.priority);
    else r.el.style.removeProperty("transform");
  }}
  return records.length;
}})()"#
    )
}
