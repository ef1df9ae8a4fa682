//! Turns the staged clone into pixels.
//!
//! Two strategies, tried in order until one succeeds:
//! - [`RasterStrategy::Snapshot`] serialises the staged clone with the page's stylesheets and
//!   screenshots it in a scratch tab rendered at the target device-pixel ratio.
//! - [`RasterStrategy::ForeignObject`] draws the clone through an SVG `<foreignObject>` onto a
//!   canvas inside the live page.

use anyhow::{Context, Result, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::future::Future;
use std::time::Duration;

use super::inliner::StyleInliner;
use super::readiness::{DEFAULT_SETTLE_FRAMES, wait_until_ready};
use super::stage::{HOST_ID, StagedClone, stage_clone};
use crate::browser::Browser;
use crate::color::to_css;
use crate::element::RemoteNode;
use crate::error::ExportError;
use crate::tab::Tab;
use crate::types::{ClipRegion, Size, Viewport};

/// Budget for a single in-page draw.
const DRAW_TIMEOUT: Duration = Duration::from_secs(30);

/// Serialises the host: hidden nodes are dropped, the copy is moved back on screen, and the
/// page's stylesheets travel along.
const SERIALIZE_FN: &str = r#"
function() {
  this.querySelectorAll('[data-export-hide="true"]').forEach((n) => n.remove());
  const copy = this.cloneNode(true);
  for (const [prop, value] of [["position", "absolute"], ["left", "0"], ["top", "0"], ["z-index", "0"]]) {
    copy.style.setProperty(prop, value, "important");
  }
  const styles = Array.from(document.querySelectorAll('style, link[rel="stylesheet"]'))
    .filter((n) => !this.contains(n))
    .map((n) => n.outerHTML);
  return {
    markup: copy.outerHTML,
    styles,
    baseUrl: document.baseURI,
    lang: document.documentElement.lang || "",
  };
}
"#;

/// Draws the host's content onto a canvas via an SVG image and returns a PNG data URL.
const FOREIGN_OBJECT_FN: &str = r#"
async function(width, height, scale, background) {
  const canvas = document.createElement("canvas");
  canvas.width = Math.round(width * scale);
  canvas.height = Math.round(height * scale);
  const ctx = canvas.getContext("2d");
  if (!ctx) throw new Error("Failed to get canvas context");
  ctx.imageSmoothingEnabled = true;
  ctx.imageSmoothingQuality = "high";
  ctx.scale(scale, scale);
  if (background) {
    ctx.fillStyle = background;
    ctx.fillRect(0, 0, width, height);
  }

  const ns = "http://www.w3.org/2000/svg";
  const svg = document.createElementNS(ns, "svg");
  svg.setAttribute("xmlns", ns);
  svg.setAttribute("width", String(width));
  svg.setAttribute("height", String(height));
  const fo = document.createElementNS(ns, "foreignObject");
  fo.setAttribute("x", "0");
  fo.setAttribute("y", "0");
  fo.setAttribute("width", "100%");
  fo.setAttribute("height", "100%");
  const wrapper = document.createElement("div");
  wrapper.setAttribute("xmlns", "http://www.w3.org/1999/xhtml");
  wrapper.style.cssText = `width:${width}px;height:${height}px;overflow:visible;position:relative;`;
  for (const child of this.children) wrapper.appendChild(child.cloneNode(true));
  fo.appendChild(wrapper);
  svg.appendChild(fo);

  const markup = new XMLSerializer().serializeToString(svg);
  const url = URL.createObjectURL(new Blob([markup], { type: "image/svg+xml;charset=utf-8" }));
  try {
    const img = new Image();
    await new Promise((resolve, reject) => {
      img.onload = resolve;
      img.onerror = () => reject(new Error("Failed to render SVG to canvas"));
      img.src = url;
    });
    ctx.drawImage(img, 0, 0, width, height);
  } finally {
    URL.revokeObjectURL(url);
  }
  return canvas.toDataURL("image/png");
}
"#;

/// A way of producing pixels from the staged clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterStrategy {
    /// Screenshot of the serialised clone in a scratch tab.
    Snapshot,
    /// SVG `foreignObject` drawn onto a canvas in the live page.
    ForeignObject,
}

impl RasterStrategy {
    /// Primary first, fallback second.
    pub const DEFAULT_ORDER: [RasterStrategy; 2] =
        [RasterStrategy::Snapshot, RasterStrategy::ForeignObject];

    pub fn as_str(&self) -> &'static str {
        match self {
            RasterStrategy::Snapshot => "snapshot",
            RasterStrategy::ForeignObject => "foreign-object",
        }
    }
}

impl fmt::Display for RasterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A captured bitmap at `width*scale × height*scale` device pixels.
#[derive(Debug, Clone)]
pub struct CapturedRaster {
    pub image: RgbaImage,
    /// Opaque fill painted behind the element, `None` for transparent exports.
    pub background: Option<Rgba<u8>>,
}

impl CapturedRaster {
    pub fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

/// What to rasterise: the element's layout size, the device-pixel multiplier and the fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterJob {
    pub size: Size,
    pub scale: u32,
    pub background: Option<Rgba<u8>>,
}

impl RasterJob {
    pub fn pixel_size(&self) -> Size {
        self.size.scaled(self.scale)
    }
}

/// Runs `attempt` for each strategy in order and returns the first success.
///
/// Failures before the last strategy are logged and absorbed; if every strategy fails the
/// error lists each one's reason.
pub async fn rasterize_with_fallback<T, F, Fut>(
    strategies: &[RasterStrategy],
    mut attempt: F,
) -> Result<(RasterStrategy, T), ExportError>
where
    F: FnMut(RasterStrategy) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = Vec::with_capacity(strategies.len());
    for &strategy in strategies {
        match attempt(strategy).await {
            Ok(value) => {
                if !attempts.is_empty() {
                    log::info!("rasterized with fallback strategy {strategy}");
                }
                return Ok((strategy, value));
            }
            Err(e) => {
                log::warn!("{strategy} rasterization failed: {e:#}");
                attempts.push((strategy, format!("{e:#}")));
            }
        }
    }
    Err(ExportError::Rasterize { attempts })
}

/// Decodes PNG bytes and resamples them to exactly `expected` if the capture drifted.
pub fn decode_png(bytes: &[u8], expected: Size) -> Result<RgbaImage, ExportError> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(ExportError::Decode)?
        .to_rgba8();
    if image.dimensions() == (expected.width, expected.height) || expected.is_empty() {
        return Ok(image);
    }
    log::debug!(
        "captured {}x{}, resampling to {expected}",
        image.width(),
        image.height()
    );
    Ok(imageops::resize(
        &image,
        expected.width,
        expected.height,
        FilterType::Lanczos3,
    ))
}

/// Strips the `data:image/png;base64,` prefix and decodes the payload.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let (header, payload) = url.split_once(',').context("Malformed data URL")?;
    if !header.starts_with("data:image/png") || !header.ends_with(";base64") {
        return Err(anyhow!("Unexpected data URL type: {header}"));
    }
    if payload.is_empty() {
        return Err(anyhow!("Canvas produced an empty image"));
    }
    Ok(STANDARD.decode(payload)?)
}

/// Page state needed to re-render the staged clone in a scratch tab.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    pub markup: String,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub lang: String,
}

impl DocumentSnapshot {
    /// A standalone document showing the host at the top-left of a `size` viewport.
    pub fn to_html(&self, background: Option<Rgba<u8>>) -> String {
        let background = background.map_or_else(|| "transparent".to_string(), to_css);
        format!(
            concat!(
                "<!DOCTYPE html><html lang=\"{lang}\"><head><meta charset=\"utf-8\">",
                "<base href=\"{base}\">{styles}",
                "<style>html,body{{margin:0!important;padding:0!important;",
                "overflow:hidden!important;background:{background}!important;}}</style>",
                "</head><body>{markup}</body></html>"
            ),
            lang = escape_attr(&self.lang),
            base = escape_attr(&self.base_url),
            styles = self.styles.join("\n"),
            background = background,
            markup = self.markup,
        )
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

/// Produces a [`CapturedRaster`] for a live element using the configured strategies.
pub(crate) struct Rasterizer<'e> {
    browser: &'e Browser,
    inliner: &'e StyleInliner,
    readiness_timeout: Duration,
}

impl<'e> Rasterizer<'e> {
    pub(crate) fn new(
        browser: &'e Browser,
        inliner: &'e StyleInliner,
        readiness_timeout: Duration,
    ) -> Self {
        Self {
            browser,
            inliner,
            readiness_timeout,
        }
    }

    pub(crate) async fn rasterize(
        &self,
        target: &RemoteNode<'_>,
        job: &RasterJob,
        strategies: &[RasterStrategy],
    ) -> Result<CapturedRaster, ExportError> {
        let (strategy, bytes) = rasterize_with_fallback(strategies, |strategy| async move {
            match strategy {
                RasterStrategy::Snapshot => self.snapshot(target, job).await,
                RasterStrategy::ForeignObject => self.foreign_object(target, job).await,
            }
        })
        .await?;
        let image = decode_png(&bytes, job.pixel_size())?;
        log::debug!(
            "{strategy} produced {}x{} at {}x",
            image.width(),
            image.height(),
            job.scale
        );
        Ok(CapturedRaster {
            image,
            background: job.background,
        })
    }

    async fn stage<'a>(&self, target: &RemoteNode<'a>, job: &RasterJob) -> Result<StagedClone<'a>> {
        stage_clone(target, job.size, job.background, self.inliner).await
    }

    async fn snapshot(&self, target: &RemoteNode<'_>, job: &RasterJob) -> Result<Vec<u8>> {
        let staged = self.stage(target, job).await?;
        let serialized = match staged.host_node() {
            Ok(host) => host.call(SERIALIZE_FN, &[], DRAW_TIMEOUT).await,
            Err(e) => Err(e),
        };
        staged.teardown().await;
        let snapshot: DocumentSnapshot =
            serde_json::from_value(serialized?).context("Unexpected serialisation result")?;
        let html = snapshot.to_html(job.background);

        let scratch = self.browser.new_tab().await?;
        let captured = render_in(&scratch, &html, job, self.readiness_timeout).await;
        if let Err(e) = scratch.close().await {
            log::warn!("failed to close scratch tab: {e:#}");
        }
        captured
    }

    async fn foreign_object(&self, target: &RemoteNode<'_>, job: &RasterJob) -> Result<Vec<u8>> {
        let staged = self.stage(target, job).await?;
        let background = job.background.map(to_css).map_or(Value::Null, Value::from);
        let args = [
            json!(job.size.width).into(),
            json!(job.size.height).into(),
            json!(job.scale).into(),
            background.into(),
        ];
        let drawn = match staged.host_node() {
            Ok(host) => host.call(FOREIGN_OBJECT_FN, &args, DRAW_TIMEOUT).await,
            Err(e) => Err(e),
        };
        staged.teardown().await;
        let drawn = drawn?;
        let url = drawn.as_str().context("Canvas did not return a data URL")?;
        decode_data_url(url)
    }
}

/// Loads `html` into `tab` at the job's device-pixel ratio and screenshots the host once its
/// fonts and images have settled.
///
/// The scratch document fetches the page's stylesheets and images again, so the readiness gate
/// runs here as well as on the live page.
async fn render_in(
    tab: &Tab,
    html: &str,
    job: &RasterJob,
    readiness_timeout: Duration,
) -> Result<Vec<u8>> {
    let Size { width, height } = job.size;
    tab.set_viewport(
        &Viewport::new(width, height).with_device_scale_factor(job.scale as f64),
    )
    .await?;
    tab.set_transparent_background(true).await?;
    tab.set_cache_disabled(true).await?;
    tab.set_content(html).await?;
    let host = tab
        .find_element(&format!("#{HOST_ID}"))
        .await
        .context("Serialised host missing from scratch tab")?
        .resolve()
        .await?;
    let report = wait_until_ready(&host, DEFAULT_SETTLE_FRAMES, readiness_timeout).await;
    log::debug!("scratch tab ready: {report:?}");
    host.release().await;
    tab.capture_png(ClipRegion::new(0.0, 0.0, width as f64, height as f64))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let tried = RefCell::new(Vec::new());
        let (strategy, value) = rasterize_with_fallback(&RasterStrategy::DEFAULT_ORDER, |s| {
            tried.borrow_mut().push(s);
            async move { Ok::<_, anyhow::Error>(s.as_str()) }
        })
        .await
        .unwrap();
        assert_eq!(strategy, RasterStrategy::Snapshot);
        assert_eq!(value, "snapshot");
        assert_eq!(*tried.borrow(), vec![RasterStrategy::Snapshot]);
    }

    #[tokio::test]
    async fn primary_failure_activates_fallback() {
        let (strategy, _) = rasterize_with_fallback(&RasterStrategy::DEFAULT_ORDER, |s| async move {
            match s {
                RasterStrategy::Snapshot => Err(anyhow!("tab crashed")),
                RasterStrategy::ForeignObject => Ok(()),
            }
        })
        .await
        .unwrap();
        assert_eq!(strategy, RasterStrategy::ForeignObject);
    }

    #[tokio::test]
    async fn total_failure_reports_every_attempt() {
        let err = rasterize_with_fallback(&RasterStrategy::DEFAULT_ORDER, |s| async move {
            Err::<(), _>(anyhow!("{s} broke"))
        })
        .await
        .unwrap_err();
        match err {
            ExportError::Rasterize { attempts } => {
                assert_eq!(
                    attempts,
                    vec![
                        (RasterStrategy::Snapshot, "snapshot broke".to_string()),
                        (RasterStrategy::ForeignObject, "foreign-object broke".to_string()),
                    ]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn job_pixel_size() {
        let job = RasterJob {
            size: Size::new(1080, 1350),
            scale: 4,
            background: None,
        };
        assert_eq!(job.pixel_size(), Size::new(4320, 5400));
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([1, 2, 3, 255]));
        crate::export::encode::encode_png(&img).unwrap()
    }

    #[test]
    fn decoded_capture_is_conformed_to_expected_size() {
        let exact = decode_png(&png_bytes(12, 8), Size::new(12, 8)).unwrap();
        assert_eq!(exact.dimensions(), (12, 8));
        let drifted = decode_png(&png_bytes(13, 8), Size::new(12, 8)).unwrap();
        assert_eq!(drifted.dimensions(), (12, 8));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(
            decode_png(b"not a png", Size::new(1, 1)),
            Err(ExportError::Decode(_))
        ));
    }

    #[test]
    fn data_url_decoding() {
        let bytes = png_bytes(2, 2);
        let url = format!("data:image/png;base64,{}", STANDARD.encode(&bytes));
        assert_eq!(decode_data_url(&url).unwrap(), bytes);
        assert!(decode_data_url("data:,").is_err());
        assert!(decode_data_url("data:image/jpeg;base64,AAAA").is_err());
        assert!(decode_data_url("no comma").is_err());
    }

    #[test]
    fn snapshot_document_carries_styles_and_base() {
        let snapshot = DocumentSnapshot {
            markup: r#"<div id="export-host"><p>Hi</p></div>"#.into(),
            styles: vec!["<style>p{color:red}</style>".into()],
            base_url: "https://example.test/editor?a=1&b=2".into(),
            lang: "en".into(),
        };
        let html = snapshot.to_html(Some(Rgba([255, 255, 255, 255])));
        assert!(html.starts_with("<!DOCTYPE html><html lang=\"en\">"));
        assert!(html.contains(r#"<base href="https://example.test/editor?a=1&amp;b=2">"#));
        assert!(html.contains("<style>p{color:red}</style>"));
        assert!(html.contains("background:rgb(255, 255, 255)!important"));
        assert!(html.contains(r#"<body><div id="export-host"><p>Hi</p></div></body>"#));

        let transparent = snapshot.to_html(None);
        assert!(transparent.contains("background:transparent!important"));
    }

    #[tokio::test]
    #[ignore = "requires a local Chrome"]
    async fn scratch_capture_waits_for_fonts() {
        let browser = Browser::new().await.unwrap();
        let tab = browser.new_tab().await.unwrap();
        // Only the readiness gate asks for fonts, and the host turns green once it has.
        let html = r#"<!DOCTYPE html><html><body style="margin:0">
            <div id="export-host" style="width:40px;height:30px;background:rgb(255,0,0)"></div>
            <script>
              document.fonts.load = () => new Promise((resolve) => setTimeout(() => {
                document.getElementById("export-host").style.background = "rgb(0,128,0)";
                resolve([]);
              }, 50));
            </script></body></html>"#;
        let job = RasterJob {
            size: Size::new(40, 30),
            scale: 1,
            background: None,
        };

        let bytes = render_in(&tab, html, &job, Duration::from_secs(10))
            .await
            .unwrap();
        let image = decode_png(&bytes, job.pixel_size()).unwrap();
        assert_eq!(image.get_pixel(20, 15).0, [0, 128, 0, 255]);

        browser.close_async().await.unwrap();
    }
}
