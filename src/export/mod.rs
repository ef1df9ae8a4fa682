//! The export pipeline: from a live, interactively styled element to a saved PNG or PDF.
//!
//! ```text
//! locate marker -> neutralise ancestor transforms -> readiness gate -> measure
//!   -> rasterize (stage clone, snapshot | foreign-object) -> restore transforms
//!   -> fit to preset -> encode -> sink
//! ```

pub mod encode;
pub mod fit;
pub mod inliner;
pub mod prober;
pub mod raster;
pub mod readiness;
pub mod stage;
pub mod variables;

use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::browser::Browser;
use crate::color::export_background;
use crate::element::{Element, RemoteNode};
use crate::error::{ExportError, Result};
use crate::preset::{OutputPreset, QualityLevel};

pub use encode::{
    DirectorySink, DownloadSink, ExportFormat, MemorySink, PageOrientation, output_filename,
    sanitize_filename_base,
};
pub use fit::{ContainFit, FittedImage, fit_to_preset};
pub use inliner::{InlineReport, StyleInliner};
pub use raster::{CapturedRaster, RasterJob, RasterStrategy, rasterize_with_fallback};
pub use readiness::ReadinessReport;

use encode::DEFAULT_FILENAME_BASE;
use raster::Rasterizer;
use readiness::DEFAULT_SETTLE_FRAMES;
use stage::TransformNeutralizer;

/// Class of the design canvas inside the export root.
pub const DEFAULT_MARKER_SELECTOR: &str = ".infographic-canvas";

/// Fonts and images can take a while on a cold cache.
const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(60);

const LOCATE_MARKER_FN: &str =
    "function(selector) { return this.querySelector(selector) || this; }";

/// Pipeline configuration shared by every export.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub(crate) marker_selector: String,
    pub(crate) strategies: Vec<RasterStrategy>,
    pub(crate) inliner: StyleInliner,
    pub(crate) settle_frames: u32,
    pub(crate) readiness_timeout: Duration,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            marker_selector: DEFAULT_MARKER_SELECTOR.to_string(),
            strategies: RasterStrategy::DEFAULT_ORDER.to_vec(),
            inliner: StyleInliner::default(),
            settle_frames: DEFAULT_SETTLE_FRAMES,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
        }
    }
}

impl ExportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selector of the element exported in place of the root, when the root contains one.
    pub fn with_marker_selector(mut self, selector: impl Into<String>) -> Self {
        self.marker_selector = selector.into();
        self
    }

    /// Strategies tried in order; the first success wins.
    pub fn with_strategies(mut self, strategies: impl Into<Vec<RasterStrategy>>) -> Self {
        self.strategies = strategies.into();
        self
    }

    pub fn with_inliner(mut self, inliner: StyleInliner) -> Self {
        self.inliner = inliner;
        self
    }

    pub fn with_settle_frames(mut self, frames: u32) -> Self {
        self.settle_frames = frames;
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }
}

/// One export call.
#[derive(Clone)]
pub struct ExportRequest<'a> {
    pub root: &'a Element<'a>,
    pub preset: OutputPreset,
    pub quality: QualityLevel,
    pub format: ExportFormat,
    pub transparent_background: bool,
    pub filename_base: String,
}

impl<'a> ExportRequest<'a> {
    pub fn new(root: &'a Element<'a>, preset: OutputPreset) -> Self {
        Self {
            root,
            preset,
            quality: QualityLevel::default(),
            format: ExportFormat::default(),
            transparent_background: false,
            filename_base: DEFAULT_FILENAME_BASE.to_string(),
        }
    }

    pub fn with_quality(mut self, quality: QualityLevel) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_transparent_background(mut self, transparent: bool) -> Self {
        self.transparent_background = transparent;
        self
    }

    /// Used verbatim; see [`sanitize_filename_base`] for turning a title into one.
    pub fn with_filename_base(mut self, base: impl Into<String>) -> Self {
        self.filename_base = base.into();
        self
    }
}

/// Outcome of a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResult {
    /// `"{W}x{H}"` of the saved bitmap.
    pub output_dimensions: String,
    pub applied_scale: u32,
    pub filename: String,
    /// Where the sink stored the file.
    pub location: PathBuf,
}

/// Drives the export pipeline against a browser session.
pub struct Exporter<'b> {
    browser: &'b Browser,
    options: ExportOptions,
    sink: Arc<dyn DownloadSink>,
}

impl<'b> Exporter<'b> {
    /// An exporter saving into the current directory with default options.
    pub fn new(browser: &'b Browser) -> Self {
        Self {
            browser,
            options: ExportOptions::default(),
            sink: Arc::new(DirectorySink::default()),
        }
    }

    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DownloadSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Exports the request's element and hands the file to the sink.
    ///
    /// The page is left as it was found on every path: the off-screen host is removed and
    /// ancestor transforms are restored even when this returns an error.
    pub async fn export(&self, request: ExportRequest<'_>) -> Result<ExportResult> {
        let scale = request.quality.scale();
        log::info!(
            "exporting {} as {} at {} ({scale}x)",
            request.preset.id,
            request.format,
            request.quality
        );
        let raster = self
            .capture(request.root, scale, request.transparent_background)
            .await?;
        let fitted = fit_to_preset(raster, &request.preset);
        let dimensions = fitted.dimensions();
        let bytes = encode::encode(&fitted.image, request.format)?;

        let filename = output_filename(&request.filename_base, dimensions, scale, request.format);
        let location = self
            .sink
            .save(&filename, &bytes)
            .map_err(|source| ExportError::Save {
                filename: filename.clone(),
                source,
            })?;
        log::info!("saved {filename} ({} bytes)", bytes.len());

        Ok(ExportResult {
            output_dimensions: dimensions.to_string(),
            applied_scale: scale,
            filename,
            location,
        })
    }

    /// Captures at 1x, fits to `preset` and returns PNG bytes without saving anything.
    pub async fn preview(&self, root: &Element<'_>, preset: &OutputPreset) -> Result<Vec<u8>> {
        let raster = self.capture(root, 1, false).await?;
        let fitted = fit_to_preset(raster, preset);
        encode::encode_png(&fitted.image)
    }

    /// Rasterizes the element at `scale` device pixels per CSS pixel.
    pub async fn capture(
        &self,
        root: &Element<'_>,
        scale: u32,
        transparent: bool,
    ) -> Result<CapturedRaster> {
        let root_node = root.resolve().await?;
        let result = self.capture_marker(&root_node, scale, transparent).await;
        root_node.release().await;
        result
    }

    async fn capture_marker(
        &self,
        root: &RemoteNode<'_>,
        scale: u32,
        transparent: bool,
    ) -> Result<CapturedRaster> {
        let target = root
            .call_for_node(
                LOCATE_MARKER_FN,
                &[json!(self.options.marker_selector).into()],
            )
            .await?;
        let result = self.capture_target(&target, scale, transparent).await;
        target.release().await;
        result
    }

    async fn capture_target(
        &self,
        target: &RemoteNode<'_>,
        scale: u32,
        transparent: bool,
    ) -> Result<CapturedRaster> {
        let neutralizer = TransformNeutralizer::install(target).await?;
        let result = self.capture_neutralized(target, scale, transparent).await;
        let neutralized = neutralizer.count();
        match neutralizer.restore().await {
            Ok(restored) => log::debug!("restored {restored}/{neutralized} ancestor transform(s)"),
            Err(e) => log::warn!("{e:#}"),
        }
        result
    }

    async fn capture_neutralized(
        &self,
        target: &RemoteNode<'_>,
        scale: u32,
        transparent: bool,
    ) -> Result<CapturedRaster> {
        readiness::wait_until_ready(
            target,
            self.options.settle_frames,
            self.options.readiness_timeout,
        )
        .await;

        let measurement = prober::measure(target).await?;
        let size = measurement.intrinsic_size();
        if size.is_empty() {
            return Err(ExportError::EmptyElement {
                width: size.width,
                height: size.height,
            });
        }
        let background = export_background(measurement.background.as_deref(), transparent);

        let job = RasterJob {
            size,
            scale,
            background,
        };
        let rasterizer = Rasterizer::new(
            self.browser,
            &self.options.inliner,
            self.options.readiness_timeout,
        );
        rasterizer
            .rasterize(target, &job, &self.options.strategies)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = ExportOptions::default();
        assert_eq!(options.marker_selector, ".infographic-canvas");
        assert_eq!(options.strategies, RasterStrategy::DEFAULT_ORDER.to_vec());
        assert_eq!(options.settle_frames, 3);
    }

    #[test]
    fn options_builder() {
        let options = ExportOptions::new()
            .with_marker_selector("#canvas")
            .with_strategies([RasterStrategy::ForeignObject])
            .with_settle_frames(1)
            .with_readiness_timeout(Duration::from_secs(5));
        assert_eq!(options.marker_selector, "#canvas");
        assert_eq!(options.strategies, vec![RasterStrategy::ForeignObject]);
        assert_eq!(options.settle_frames, 1);
        assert_eq!(options.readiness_timeout, Duration::from_secs(5));
    }
}
