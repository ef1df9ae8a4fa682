//! Contain-fitting of a captured raster into a preset's output box.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use super::raster::CapturedRaster;
use crate::preset::OutputPreset;
use crate::types::Size;

/// Placement of the source inside the target box, in whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainFit {
    pub offset_x: u32,
    pub offset_y: u32,
    pub draw_width: u32,
    pub draw_height: u32,
}

impl ContainFit {
    /// Uniformly scales `source` to fit entirely inside `target`, centred on both axes.
    ///
    /// A source wider than the target is letterboxed (full width, margins top and bottom);
    /// a taller one is pillarboxed (full height, margins left and right).
    pub fn compute(source: Size, target: Size) -> Self {
        if source.is_empty() || target.is_empty() {
            return Self {
                offset_x: 0,
                offset_y: 0,
                draw_width: target.width,
                draw_height: target.height,
            };
        }
        let (tw, th) = (target.width as f64, target.height as f64);
        let source_ratio = source.width as f64 / source.height as f64;
        let target_ratio = tw / th;

        let (draw_w, draw_h, off_x, off_y) = if source_ratio > target_ratio {
            let draw_h = tw / source_ratio;
            (tw, draw_h, 0.0, ((th - draw_h) / 2.0).round())
        } else {
            let draw_w = th * source_ratio;
            (draw_w, th, ((tw - draw_w) / 2.0).round(), 0.0)
        };

        Self {
            offset_x: off_x.max(0.0) as u32,
            offset_y: off_y.max(0.0) as u32,
            draw_width: (draw_w.round() as u32).clamp(1, target.width),
            draw_height: (draw_h.round() as u32).clamp(1, target.height),
        }
    }

    pub fn draw_size(&self) -> Size {
        Size::new(self.draw_width, self.draw_height)
    }
}

/// The bitmap handed to the encoder.
#[derive(Debug, Clone)]
pub struct FittedImage {
    pub image: RgbaImage,
    /// Placement of the capture inside `image`; `None` when returned unchanged.
    pub placement: Option<ContainFit>,
}

impl FittedImage {
    pub fn dimensions(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

/// Letterboxes/pillarboxes the capture into the preset box, or passes it through unchanged
/// for the native-size preset.
pub fn fit_to_preset(raster: CapturedRaster, preset: &OutputPreset) -> FittedImage {
    let Some(target) = preset.size() else {
        return FittedImage {
            image: raster.image,
            placement: None,
        };
    };

    let fill = raster.background.unwrap_or(Rgba([0, 0, 0, 0]));
    let mut canvas = RgbaImage::from_pixel(target.width, target.height, fill);

    let fit = ContainFit::compute(raster.size(), target);
    let scaled = if fit.draw_size() == raster.size() {
        raster.image
    } else {
        imageops::resize(
            &raster.image,
            fit.draw_width,
            fit.draw_height,
            FilterType::Lanczos3,
        )
    };
    imageops::overlay(
        &mut canvas,
        &scaled,
        fit.offset_x as i64,
        fit.offset_y as i64,
    );

    FittedImage {
        image: canvas,
        placement: Some(fit),
    }
}

/// Size of a preview box of at most `max` that keeps the preset's aspect ratio, falling back
/// to the source's ratio for the native-size preset.
pub fn preview_box(preset: &OutputPreset, source: Size, max: Size) -> Size {
    let ratio_source = match preset.size() {
        Some(size) => size,
        None if !source.is_empty() => source,
        None => return max,
    };
    ContainFit::compute(ratio_source, max).draw_size()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(width: u32, height: u32, color: Rgba<u8>, background: Option<Rgba<u8>>) -> CapturedRaster {
        CapturedRaster {
            image: RgbaImage::from_pixel(width, height, color),
            background,
        }
    }

    #[test]
    fn wider_source_is_letterboxed() {
        let fit = ContainFit::compute(Size::new(1600, 900), Size::new(1080, 1080));
        assert_eq!(fit.draw_width, 1080);
        assert_eq!(fit.offset_x, 0);
        assert_eq!(fit.draw_height, 608);
        assert_eq!(fit.offset_y, 236);
    }

    #[test]
    fn taller_source_is_pillarboxed() {
        let fit = ContainFit::compute(Size::new(900, 1600), Size::new(1200, 630));
        assert_eq!(fit.draw_height, 630);
        assert_eq!(fit.offset_y, 0);
        assert_eq!(fit.draw_width, 354);
        assert_eq!(fit.offset_x, 423);
    }

    #[test]
    fn equal_ratio_has_no_margin() {
        let fit = ContainFit::compute(Size::new(4320, 5400), Size::new(1080, 1350));
        assert_eq!(fit.offset_x, 0);
        assert_eq!(fit.offset_y, 0);
        assert_eq!(fit.draw_size(), Size::new(1080, 1350));
    }

    #[test]
    fn margins_are_symmetric_within_a_pixel() {
        for (src, dst) in [
            (Size::new(420, 746), Size::new(1080, 1350)),
            (Size::new(1000, 333), Size::new(1584, 396)),
            (Size::new(777, 1234), Size::new(1280, 720)),
        ] {
            let fit = ContainFit::compute(src, dst);
            let right = dst.width - fit.offset_x - fit.draw_width;
            let bottom = dst.height - fit.offset_y - fit.draw_height;
            assert!(right.abs_diff(fit.offset_x) <= 1, "{src} -> {dst}: {fit:?}");
            assert!(bottom.abs_diff(fit.offset_y) <= 1, "{src} -> {dst}: {fit:?}");
        }
    }

    #[test]
    fn zoomed_portrait_design_into_four_by_five() {
        // 420x746 CSS px captured at scale 4, fitted into 1080x1350.
        let captured = Size::new(420, 746).scaled(4);
        assert_eq!(captured, Size::new(1680, 2984));

        let fit = ContainFit::compute(captured, Size::new(1080, 1350));
        assert_eq!(fit.draw_height, 1350);
        let expected_width = (1350.0_f64 * 420.0 / 746.0).round() as u32;
        assert_eq!(fit.draw_width, expected_width);
        assert_eq!(fit.offset_x, ((1080.0 - 1350.0 * 420.0 / 746.0) / 2.0_f64).round() as u32);
    }

    #[test]
    fn preset_output_has_exact_dimensions() {
        let navy = Rgba([15, 23, 42, 255]);
        let red = Rgba([220, 38, 38, 255]);
        let fitted = fit_to_preset(
            raster(1680, 2984, red, Some(navy)),
            &OutputPreset::custom(1080, 1350),
        );
        assert_eq!(fitted.dimensions(), Size::new(1080, 1350));

        let fit = fitted.placement.unwrap();
        // Pillarbox margins carry the background, the centre carries the content.
        assert_eq!(*fitted.image.get_pixel(0, 675), navy);
        assert_eq!(*fitted.image.get_pixel(1079, 675), navy);
        assert_eq!(*fitted.image.get_pixel(540, 675), red);
        assert!(fit.offset_x > 0);
    }

    #[test]
    fn transparent_margins_stay_transparent() {
        let fitted = fit_to_preset(
            raster(200, 100, Rgba([0, 128, 0, 255]), None),
            &OutputPreset::custom(100, 100),
        );
        assert_eq!(fitted.image.get_pixel(50, 0).0[3], 0);
        assert_eq!(fitted.image.get_pixel(50, 50).0[3], 255);
    }

    #[test]
    fn native_preset_passes_through() {
        let source = raster(1260, 2238, Rgba([1, 2, 3, 255]), None);
        let fitted = fit_to_preset(source, &OutputPreset::native());
        assert!(fitted.placement.is_none());
        assert_eq!(fitted.dimensions(), Size::new(1260, 2238));
    }

    #[test]
    fn preview_keeps_aspect_ratio() {
        let max = Size::new(280, 320);
        let story = crate::preset::find("instagram-story").unwrap();
        assert_eq!(preview_box(&story, Size::new(420, 746), max), Size::new(180, 320));
        let banner = crate::preset::find("linkedin-banner").unwrap();
        assert_eq!(preview_box(&banner, Size::new(420, 746), max), Size::new(280, 70));
        assert_eq!(
            preview_box(&OutputPreset::native(), Size::new(600, 600), max),
            Size::new(280, 280)
        );
    }
}
