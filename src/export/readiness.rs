//! Waits until every resource that affects rendering has settled.

use anyhow::Result;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::element::RemoteNode;
use crate::transport::DEFAULT_TIMEOUT;

/// Animation frames the layout engine gets after fonts and images are in.
pub const DEFAULT_SETTLE_FRAMES: u32 = 3;

/// Page function resolving after `frames` animation frames.
const FRAMES_FN: &str = r#"
function(frames) {
  return new Promise((resolve) => {
    const step = (left) => left <= 0 ? resolve(true) : requestAnimationFrame(() => step(left - 1));
    step(frames);
  });
}
"#;

/// Page function bound to the exported element. No step throws: font and image failures are
/// counted and skipped.
const READINESS_FN: &str = r#"
async function(frames) {
  const report = { families: 0, fontFailures: 0, images: 0, brokenImages: 0 };
  try {
    if (document.fonts && document.fonts.ready) await document.fonts.ready;
  } catch (_) {}

  const families = getComputedStyle(this).fontFamily
    .split(",")
    .map((f) => f.trim().replace(/['"]/g, ""))
    .filter(Boolean);
  report.families = families.length;
  for (const family of families) {
    for (const weight of [400, 700]) {
      try {
        await document.fonts.load(`${weight} 16px ${family}`);
      } catch (_) {
        report.fontFailures += 1;
      }
    }
  }

  const images = Array.from(this.querySelectorAll("img"));
  report.images = images.length;
  await Promise.all(images.map((img) => {
    if (img.complete) {
      if (img.naturalWidth === 0) report.brokenImages += 1;
      return Promise.resolve();
    }
    return new Promise((resolve) => {
      img.addEventListener("load", () => resolve(), { once: true });
      img.addEventListener("error", () => { report.brokenImages += 1; resolve(); }, { once: true });
    });
  }));

  await new Promise((resolve) => {
    const step = (left) => left <= 0 ? resolve() : requestAnimationFrame(() => step(left - 1));
    step(frames);
  });
  return report;
}
"#;

/// What the readiness gate observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessReport {
    pub families: u32,
    pub font_failures: u32,
    pub images: u32,
    pub broken_images: u32,
}

/// Blocks until fonts and images under `target` are loaded (or failed) and `frames` animation
/// frames have passed.
///
/// Never fails: a script or protocol error is logged and the export proceeds with whatever has
/// rendered so far.
pub(crate) async fn wait_until_ready(
    target: &RemoteNode<'_>,
    frames: u32,
    timeout: Duration,
) -> ReadinessReport {
    if let Err(e) = target.tab.activate().await {
        log::debug!("could not activate tab before readiness gate: {e}");
    }
    match target.call(READINESS_FN, &[json!(frames).into()], timeout).await {
        Ok(value) => {
            let report: ReadinessReport = serde_json::from_value(value).unwrap_or_default();
            if report.font_failures > 0 || report.broken_images > 0 {
                log::warn!(
                    "proceeding with {} failed font load(s) and {} broken image(s)",
                    report.font_failures,
                    report.broken_images
                );
            }
            log::debug!("readiness gate passed: {report:?}");
            report
        }
        Err(e) => {
            log::warn!("readiness gate failed, exporting anyway: {e:#}");
            ReadinessReport::default()
        }
    }
}

/// Waits `frames` animation frames in the node's page.
pub(crate) async fn settle_frames(node: &RemoteNode<'_>, frames: u32) -> Result<()> {
    node.call(FRAMES_FN, &[json!(frames).into()], DEFAULT_TIMEOUT)
        .await?;
    Ok(())
}
