/*!
WYSIWYG export of live, interactively styled DOM designs to pixel-exact PNG and PDF files,
driven over the Chrome DevTools Protocol (CDP).

The element is exported at its untransformed layout size no matter how the editor zooms it,
with computed styles and CSS variables baked into an off-screen clone, after fonts and images
have settled. The capture is then letterboxed into a social-media preset and saved.

```no_run
use design_shot::{Browser, ExportFormat, ExportRequest, Exporter, QualityLevel, preset};

# async fn run() -> Result<(), Box<dyn std::error::Error>> {
let browser = Browser::new().await?;
let tab = browser.new_tab().await?;
tab.goto("http://localhost:5173/editor").await?;
let root = tab.find_element("#design-root").await?;

let preset = preset::find("instagram-portrait").ok_or("unknown preset")?;
let result = Exporter::new(&browser)
    .export(
        ExportRequest::new(&root, preset)
            .with_quality(QualityLevel::Ultra)
            .with_format(ExportFormat::Pdf)
            .with_filename_base("q3-report"),
    )
    .await?;
println!("{} ({}x)", result.filename, result.applied_scale);
# Ok(())
# }
```
*/

mod browser;
pub mod color;
mod element;
pub mod error;
pub mod export;
pub mod preset;
mod tab;
mod transport;
mod types;
mod utils;

pub use browser::{Browser, BrowserBuilder};
pub use element::Element;
pub use error::ExportError;
pub use export::{
    CapturedRaster, DirectorySink, DownloadSink, ExportFormat, ExportOptions, ExportRequest,
    ExportResult, Exporter, MemorySink, RasterStrategy, StyleInliner, sanitize_filename_base,
};
pub use preset::{OutputPreset, Platform, QualityLevel};
pub use tab::Tab;
pub use types::{ClipRegion, Size, Viewport};
