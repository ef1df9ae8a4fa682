use design_shot::{
    Browser, DirectorySink, ExportFormat, ExportRequest, Exporter, OutputPreset, QualityLevel,
    preset, sanitize_filename_base,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let browser = Browser::new().await?;
    let tab = browser.new_tab().await?;
    tab.set_content(EDITOR_HTML).await?;
    let root = tab.find_element("#design-root").await?;

    let exporter = Exporter::new(&browser).with_sink(Arc::new(DirectorySink::new("exports")));
    let base = sanitize_filename_base("Q3 Growth Report");

    // Native size, high quality PNG
    let png = exporter
        .export(ExportRequest::new(&root, OutputPreset::native()).with_filename_base(&base))
        .await?;
    println!("{} -> {}", png.filename, png.location.display());

    // Letterboxed into a landscape preset, as PDF
    let landscape = preset::find("linkedin-landscape").unwrap_or_else(|| OutputPreset::custom(1200, 627));
    let pdf = exporter
        .export(
            ExportRequest::new(&root, landscape)
                .with_quality(QualityLevel::Standard)
                .with_format(ExportFormat::Pdf)
                .with_filename_base(&base),
        )
        .await?;
    println!("{} -> {}", pdf.filename, pdf.location.display());

    // Transparent story background
    let story = preset::find("instagram-story").unwrap_or_else(|| OutputPreset::custom(1080, 1920));
    let transparent = exporter
        .export(
            ExportRequest::new(&root, story)
                .with_quality(QualityLevel::Ultra)
                .with_transparent_background(true)
                .with_filename_base(&base),
        )
        .await?;
    println!("{} -> {}", transparent.filename, transparent.location.display());

    browser.close_async().await?;
    Ok(())
}

/// An editor page that shows the design zoomed out to fit the workspace.
const EDITOR_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<style>
  :root { --accent: #2563eb; --ink: #0f172a; --paper: #f8fafc; }
  body { margin: 0; background: #e2e8f0; font-family: sans-serif; }
  .workspace { padding: 24px; }
  .zoom { transform: scale(0.4); transform-origin: 0 0; }
  .infographic-canvas { width: 1080px; height: 1350px; background: var(--paper); color: var(--ink);
                        padding: 80px; box-sizing: border-box; display: flex; flex-direction: column; gap: 40px; }
  .infographic-canvas h1 { font-size: 96px; margin: 0; color: var(--accent); }
  .bar { height: 64px; border-radius: 32px; background: linear-gradient(90deg, var(--accent), #38bdf8); }
  .handle { position: absolute; right: 0; bottom: 0; width: 16px; height: 16px; background: red; }
</style>
</head>
<body>
  <div class="workspace" id="design-root">
    <div class="zoom">
      <div class="infographic-canvas">
        <h1>Q3 Growth</h1>
        <div class="bar" style="width: 80%"></div>
        <div class="bar" style="width: 55%"></div>
        <div class="bar" style="width: 30%"></div>
        <div class="handle" data-export-hide="true"></div>
      </div>
    </div>
  </div>
</body>
</html>"#;
