//! End-to-end exports against a local Chrome/Edge. Run with `cargo test -- --ignored`.

use design_shot::{
    Browser, ExportError, ExportFormat, ExportOptions, ExportRequest, Exporter, MemorySink,
    OutputPreset, QualityLevel, RasterStrategy, preset,
};
use std::sync::Arc;

const DESIGN: &str = r#"<!DOCTYPE html>
<html>
<head>
<style>
  :root { --brand: rgb(220, 38, 38); --ink: rgb(15, 23, 42); }
  body { margin: 0; }
  #zoom { transform: scale(0.5); transform-origin: 0 0; }
  .infographic-canvas { width: 400px; height: 500px; padding: 20px; box-sizing: border-box;
                        background: var(--brand); }
  .title { color: var(--ink); font: 700 32px sans-serif; }
</style>
</head>
<body>
  <div id="root">
    <div id="zoom">
      <div class="infographic-canvas">
        <h1 class="title">Q3 Report</h1>
        <span data-export-hide="true">resize handle</span>
      </div>
    </div>
  </div>
</body>
</html>"#;

const EMPTY_DESIGN: &str = r#"<!DOCTYPE html>
<html><body>
  <div id="root"><div id="zoom" style="transform: scale(0.75)">
    <div class="infographic-canvas" style="display: none"></div>
  </div></div>
</body></html>"#;

// Both raster strategies break after staging: the host refuses to be serialised and canvases
// refuse to export.
const UNRASTERIZABLE_DESIGN: &str = r#"<!DOCTYPE html>
<html><body style="margin: 0">
  <div id="root"><div id="zoom" style="transform: scale(0.75); transform-origin: 0 0">
    <div class="infographic-canvas" style="width: 300px; height: 200px; background: rgb(14, 116, 144)"></div>
  </div></div>
  <script>
    const cloneNode = Node.prototype.cloneNode;
    Node.prototype.cloneNode = function (deep) {
      if (this.id === "export-host") throw new Error("serialisation blocked");
      return cloneNode.call(this, deep);
    };
    HTMLCanvasElement.prototype.toDataURL = function () {
      throw new Error("canvas export blocked");
    };
  </script>
</body></html>"#;

// content-box: the rendered box is 400 + 2 * 40 by 300 + 2 * 40.
const CONTENT_BOX_DESIGN: &str = r#"<!DOCTYPE html>
<html><body style="margin: 0">
  <div id="root">
    <div class="infographic-canvas" style="box-sizing: content-box; position: relative;
         width: 400px; height: 300px; padding: 40px; background: rgb(255, 255, 255)">
      <div style="position: absolute; right: 0; bottom: 0; width: 20px; height: 20px;
                  background: rgb(37, 99, 235)"></div>
    </div>
  </div>
</body></html>"#;

async fn page_state(tab: &design_shot::Tab) -> (u64, String, String) {
    let hosts = tab
        .evaluate("document.querySelectorAll('#export-host').length")
        .await
        .unwrap()
        .as_u64()
        .unwrap();
    let inline = tab
        .evaluate("document.getElementById('zoom').style.transform")
        .await
        .unwrap()
        .as_str()
        .unwrap()
        .to_string();
    let computed = tab
        .evaluate("getComputedStyle(document.getElementById('zoom')).transform")
        .await
        .unwrap()
        .as_str()
        .unwrap()
        .to_string();
    (hosts, inline, computed)
}

#[tokio::test]
#[ignore = "requires a local Chrome"]
async fn capture_ignores_ancestor_zoom() {
    let browser = Browser::new().await.unwrap();
    let tab = browser.new_tab().await.unwrap();
    tab.set_content(DESIGN).await.unwrap();
    let root = tab.find_element("#root").await.unwrap();

    let raster = Exporter::new(&browser).capture(&root, 2, false).await.unwrap();
    assert_eq!(raster.size(), design_shot::Size::new(800, 1000));
    assert_eq!(raster.background, Some(image::Rgba([220, 38, 38, 255])));

    browser.close_async().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a local Chrome"]
async fn export_fits_preset_and_cleans_up() {
    let browser = Browser::new().await.unwrap();
    let tab = browser.new_tab().await.unwrap();
    tab.set_content(DESIGN).await.unwrap();
    let root = tab.find_element("#root").await.unwrap();
    let sink = Arc::new(MemorySink::new());

    let result = Exporter::new(&browser)
        .with_sink(sink.clone())
        .export(
            ExportRequest::new(&root, preset::find("twitter-landscape").unwrap())
                .with_quality(QualityLevel::Standard)
                .with_filename_base("q3-report"),
        )
        .await
        .unwrap();

    assert_eq!(result.output_dimensions, "1600x900");
    assert_eq!(result.applied_scale, 3);
    assert_eq!(result.filename, "q3-report_1600x900_3x.png");

    let files = sink.files();
    assert_eq!(files.len(), 1);
    let png = image::load_from_memory(&files[0].1).unwrap();
    assert_eq!((png.width(), png.height()), (1600, 900));

    let (hosts, inline, computed) = page_state(&tab).await;
    assert_eq!(hosts, 0);
    assert_eq!(inline, "");
    assert_ne!(computed, "none");

    browser.close_async().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a local Chrome"]
async fn native_pdf_export() {
    let browser = Browser::new().await.unwrap();
    let tab = browser.new_tab().await.unwrap();
    tab.set_content(DESIGN).await.unwrap();
    let root = tab.find_element("#root").await.unwrap();
    let sink = Arc::new(MemorySink::new());

    let result = Exporter::new(&browser)
        .with_sink(sink.clone())
        .export(
            ExportRequest::new(&root, OutputPreset::native())
                .with_quality(QualityLevel::Standard)
                .with_format(ExportFormat::Pdf),
        )
        .await
        .unwrap();

    assert_eq!(result.output_dimensions, "1200x1500");
    assert_eq!(result.filename, "infographic_1200x1500_3x.pdf");
    assert!(sink.files()[0].1.starts_with(b"%PDF"));

    browser.close_async().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a local Chrome"]
async fn fallback_strategy_matches_dimensions() {
    let browser = Browser::new().await.unwrap();
    let tab = browser.new_tab().await.unwrap();
    tab.set_content(DESIGN).await.unwrap();
    let root = tab.find_element("#root").await.unwrap();

    let exporter = Exporter::new(&browser)
        .with_options(ExportOptions::new().with_strategies([RasterStrategy::ForeignObject]));
    let raster = exporter.capture(&root, 2, true).await.unwrap();
    assert_eq!(raster.size(), design_shot::Size::new(800, 1000));
    assert_eq!(raster.background, None);

    let (hosts, _, _) = page_state(&tab).await;
    assert_eq!(hosts, 0);

    browser.close_async().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a local Chrome"]
async fn failed_export_restores_page() {
    let browser = Browser::new().await.unwrap();
    let tab = browser.new_tab().await.unwrap();
    tab.set_content(EMPTY_DESIGN).await.unwrap();
    let root = tab.find_element("#root").await.unwrap();

    let err = Exporter::new(&browser)
        .with_sink(Arc::new(MemorySink::new()))
        .export(ExportRequest::new(&root, OutputPreset::native()))
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::EmptyElement { .. }), "{err}");

    let (hosts, inline, _) = page_state(&tab).await;
    assert_eq!(hosts, 0);
    assert_eq!(inline, "scale(0.75)");

    browser.close_async().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a local Chrome"]
async fn exhausted_strategies_leave_page_untouched() {
    let browser = Browser::new().await.unwrap();
    let tab = browser.new_tab().await.unwrap();
    tab.set_content(UNRASTERIZABLE_DESIGN).await.unwrap();
    let root = tab.find_element("#root").await.unwrap();

    let err = Exporter::new(&browser)
        .with_sink(Arc::new(MemorySink::new()))
        .export(ExportRequest::new(&root, OutputPreset::native()))
        .await
        .unwrap_err();
    let ExportError::Rasterize { attempts } = &err else {
        panic!("expected a rasterization failure, got {err}");
    };
    let tried: Vec<_> = attempts.iter().map(|(strategy, _)| *strategy).collect();
    assert_eq!(tried, RasterStrategy::DEFAULT_ORDER.to_vec());

    let (hosts, inline, computed) = page_state(&tab).await;
    assert_eq!(hosts, 0);
    assert_eq!(inline, "scale(0.75)");
    assert_eq!(computed, "matrix(0.75, 0, 0, 0.75, 0, 0)");

    browser.close_async().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a local Chrome"]
async fn content_box_padding_is_captured() {
    let browser = Browser::new().await.unwrap();
    let tab = browser.new_tab().await.unwrap();
    tab.set_content(CONTENT_BOX_DESIGN).await.unwrap();
    let root = tab.find_element("#root").await.unwrap();

    for strategy in RasterStrategy::DEFAULT_ORDER {
        let exporter =
            Exporter::new(&browser).with_options(ExportOptions::new().with_strategies([strategy]));
        let raster = exporter.capture(&root, 1, false).await.unwrap();
        assert_eq!(raster.size(), design_shot::Size::new(480, 380), "{strategy}");
        // the absolutely positioned badge sits in the padding-box corner
        assert_eq!(
            raster.image.get_pixel(470, 370).0,
            [37, 99, 235, 255],
            "{strategy}"
        );
        assert_eq!(raster.image.get_pixel(240, 190).0, [255, 255, 255, 255], "{strategy}");
    }

    browser.close_async().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a local Chrome"]
async fn preview_is_fitted_png() {
    let browser = Browser::new().await.unwrap();
    let tab = browser.new_tab().await.unwrap();
    tab.set_content(DESIGN).await.unwrap();
    let root = tab.find_element("#root").await.unwrap();

    let bytes = Exporter::new(&browser)
        .preview(&root, &preset::find("instagram-square").unwrap())
        .await
        .unwrap();
    let png = image::load_from_memory(&bytes).unwrap();
    assert_eq!((png.width(), png.height()), (1080, 1080));

    browser.close_async().await.unwrap();
}
