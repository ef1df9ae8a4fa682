use crate::export::raster::RasterStrategy;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExportError>;

/// Unrecoverable export failures. Resource-load problems and a failing primary rasterizer are
/// absorbed by the pipeline and never surface here.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The browser session failed outside the recoverable steps.
    #[error("browser error: {0:#}")]
    Browser(#[from] anyhow::Error),

    /// The exported element has no layout box.
    #[error("element has an empty layout box ({width}x{height})")]
    EmptyElement { width: u32, height: u32 },

    /// Every rasterization strategy failed.
    #[error("rasterization failed: {}", summarize(.attempts))]
    Rasterize {
        attempts: Vec<(RasterStrategy, String)>,
    },

    /// The captured bytes were not a decodable image.
    #[error("failed to decode captured image: {0}")]
    Decode(#[source] image::ImageError),

    /// The final bitmap could not be encoded.
    #[error("failed to encode {format}: {reason}")]
    Encode { format: &'static str, reason: String },

    /// The download sink could not store the file.
    #[error("failed to save {filename}: {source}")]
    Save {
        filename: String,
        #[source]
        source: std::io::Error,
    },
}

fn summarize(attempts: &[(RasterStrategy, String)]) -> String {
    if attempts.is_empty() {
        return "no strategy configured".to_string();
    }
    attempts
        .iter()
        .map(|(strategy, err)| format!("{strategy}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rasterize_error_lists_every_attempt() {
        let err = ExportError::Rasterize {
            attempts: vec![
                (RasterStrategy::Snapshot, "tab crashed".into()),
                (RasterStrategy::ForeignObject, "canvas tainted".into()),
            ],
        };
        assert_eq!(
            err.to_string(),
            "rasterization failed: snapshot: tab crashed; foreign-object: canvas tainted"
        );
    }

    #[test]
    fn rasterize_error_without_strategies() {
        let err = ExportError::Rasterize { attempts: vec![] };
        assert_eq!(err.to_string(), "rasterization failed: no strategy configured");
    }
}
