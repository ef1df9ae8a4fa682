//! Final encoding of the fitted bitmap and hand-off to a download sink.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tempfile::NamedTempFile;

use crate::error::{ExportError, Result};
use crate::types::Size;

/// Filename base used when a design has no usable title.
pub const DEFAULT_FILENAME_BASE: &str = "infographic";

const MAX_FILENAME_BASE: usize = 30;

/// Output file format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    #[default]
    Png,
    Pdf,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ExportFormat::Png),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

/// PDF page orientation, decided by the bitmap's aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOrientation {
    Portrait,
    Landscape,
}

impl PageOrientation {
    pub fn for_size(size: Size) -> Self {
        if size.width > size.height {
            PageOrientation::Landscape
        } else {
            PageOrientation::Portrait
        }
    }
}

/// Encodes the bitmap losslessly, keeping straight alpha.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| ExportError::Encode {
            format: "png",
            reason: e.to_string(),
        })?;
    Ok(out)
}

/// Wraps the bitmap as the only content of a single-page PDF whose page is exactly the
/// bitmap's pixel size (one pixel per point).
pub fn encode_pdf(image: &RgbaImage) -> Result<Vec<u8>> {
    let size = Size::new(image.width(), image.height());
    let png = encode_png(image)?;
    let svg = page_svg(&STANDARD.encode(png), size);
    let pdf_error = |reason: String| ExportError::Encode {
        format: "pdf",
        reason,
    };

    let opt = svg2pdf::usvg::Options::default();
    let tree = svg2pdf::usvg::Tree::from_str(&svg, &opt).map_err(|e| pdf_error(e.to_string()))?;
    let pdf = svg2pdf::to_pdf(
        &tree,
        svg2pdf::ConversionOptions::default(),
        svg2pdf::PageOptions::default(),
    )
    .map_err(|e| pdf_error(e.to_string()))?;
    log::debug!(
        "encoded {size} {:?} pdf page ({} bytes)",
        PageOrientation::for_size(size),
        pdf.len()
    );
    Ok(pdf)
}

fn page_svg(png_base64: &str, size: Size) -> String {
    let Size { width, height } = size;
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{width}" height="{height}" viewBox="0 0 {width} {height}"><image x="0" y="0" width="{width}" height="{height}" preserveAspectRatio="none" xlink:href="data:image/png;base64,{png_base64}"/></svg>"#
    )
}

pub fn encode(image: &RgbaImage, format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Png => encode_png(image),
        ExportFormat::Pdf => encode_pdf(image),
    }
}

/// `{base}_{W}x{H}_{scale}x.{ext}`
pub fn output_filename(base: &str, dimensions: Size, scale: u32, format: ExportFormat) -> String {
    format!("{base}_{dimensions}_{scale}x.{}", format.extension())
}

/// Turns a design title into a filename base: lowercase ASCII alphanumerics, every other run
/// collapsed into one `-`, at most 30 characters.
pub fn sanitize_filename_base(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let out: String = out.chars().take(MAX_FILENAME_BASE).collect();
    if out.trim_matches('-').is_empty() {
        DEFAULT_FILENAME_BASE.to_string()
    } else {
        out
    }
}

/// Receives finished exports.
pub trait DownloadSink: Send + Sync {
    /// Stores `bytes` under `filename`, returning where they ended up.
    fn save(&self, filename: &str, bytes: &[u8]) -> io::Result<PathBuf>;
}

/// Writes exports into a directory. Files appear atomically: bytes go to a temporary file in
/// the same directory that is renamed into place once complete.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Default for DirectorySink {
    fn default() -> Self {
        Self::new(".")
    }
}

impl DownloadSink for DirectorySink {
    fn save(&self, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        log::debug!("saved {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}

/// Keeps exports in memory, for previews and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every file saved so far, oldest first.
    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.files
            .lock()
            .map(|files| files.clone())
            .unwrap_or_default()
    }
}

impl DownloadSink for MemorySink {
    fn save(&self, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        self.files
            .lock()
            .map_err(|_| io::Error::other("memory sink poisoned"))?
            .push((filename.to_string(), bytes.to_vec()));
        Ok(PathBuf::from(filename))
    }
}
