//! Measures the exported element's intrinsic layout size.

use anyhow::Result;
use serde::Deserialize;

use crate::element::RemoteNode;
use crate::transport::DEFAULT_TIMEOUT;
use crate::types::Size;

/// Layout sizes ignore transforms; the bounding rect is only consulted when layout reports
/// nothing (e.g. inline SVG roots).
const MEASURE_FN: &str = r#"
function() {
  const rect = this.getBoundingClientRect();
  return {
    offsetWidth: this.offsetWidth || 0,
    offsetHeight: this.offsetHeight || 0,
    rectWidth: rect.width,
    rectHeight: rect.height,
    background: getComputedStyle(this).backgroundColor || null,
  };
}
"#;

/// Raw page measurements of the exported element.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub offset_width: f64,
    pub offset_height: f64,
    pub rect_width: f64,
    pub rect_height: f64,
    /// Computed `background-color`, as the page reports it.
    pub background: Option<String>,
}

impl Measurement {
    /// Intrinsic size: the layout box when it is non-zero, otherwise the rounded bounding rect.
    pub fn intrinsic_size(&self) -> Size {
        let round = |v: f64| if v.is_finite() { v.round().max(0.0) as u32 } else { 0 };
        if self.offset_width > 0.0 && self.offset_height > 0.0 {
            Size::new(round(self.offset_width), round(self.offset_height))
        } else {
            Size::new(round(self.rect_width), round(self.rect_height))
        }
    }
}

pub(crate) async fn measure(target: &RemoteNode<'_>) -> Result<Measurement> {
    let value = target.call(MEASURE_FN, &[], DEFAULT_TIMEOUT).await?;
    let measurement: Measurement = serde_json::from_value(value)?;
    log::debug!(
        "measured element: layout {}x{}, rect {:.1}x{:.1}",
        measurement.offset_width,
        measurement.offset_height,
        measurement.rect_width,
        measurement.rect_height
    );
    Ok(measurement)
}
