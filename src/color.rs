//! Parsing of resolved CSS colors, as reported by `getComputedStyle`.

use image::Rgba;
use regex::Regex;
use std::sync::OnceLock;

fn rgb_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^rgba?\(\s*([\d.]+)[\s,]+([\d.]+)[\s,]+([\d.]+)(?:\s*[,/]\s*([\d.]+%?))?\s*\)$",
        )
        .ok()
    })
    .as_ref()
}

/// Parses `rgb()`, `rgba()`, `#rgb`, `#rrggbb`, `#rrggbbaa`, `white`, `black` and
/// `transparent` into straight-alpha RGBA.
pub fn parse_css_color(value: &str) -> Option<Rgba<u8>> {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "transparent" => return Some(Rgba([0, 0, 0, 0])),
        "white" => return Some(Rgba([255, 255, 255, 255])),
        "black" => return Some(Rgba([0, 0, 0, 255])),
        _ => {}
    }
    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex);
    }

    let caps = rgb_regex()?.captures(&value)?;
    let channel = |i: usize| -> Option<u8> {
        let v: f64 = caps.get(i)?.as_str().parse().ok()?;
        Some(v.round().clamp(0.0, 255.0) as u8)
    };
    let alpha = match caps.get(4) {
        None => 255,
        Some(a) => {
            let raw = a.as_str();
            let fraction = match raw.strip_suffix('%') {
                Some(pct) => pct.parse::<f64>().ok()? / 100.0,
                None => raw.parse::<f64>().ok()?,
            };
            (fraction.clamp(0.0, 1.0) * 255.0).round() as u8
        }
    };
    Some(Rgba([channel(1)?, channel(2)?, channel(3)?, alpha]))
}

fn parse_hex(hex: &str) -> Option<Rgba<u8>> {
    let nibble = |c: u8| (c as char).to_digit(16).map(|d| d as u8);
    let bytes = hex.as_bytes();
    match bytes.len() {
        3 | 4 => {
            let mut out = [255u8; 4];
            for (i, c) in bytes.iter().enumerate() {
                let d = nibble(*c)?;
                out[i] = d * 16 + d;
            }
            Some(Rgba(out))
        }
        6 | 8 => {
            let mut out = [255u8; 4];
            for (i, pair) in bytes.chunks(2).enumerate() {
                out[i] = nibble(pair[0])? * 16 + nibble(pair[1])?;
            }
            Some(Rgba(out))
        }
        _ => None,
    }
}

/// Formats a color the way the page expects it in inline styles.
pub fn to_css(color: Rgba<u8>) -> String {
    let [r, g, b, a] = color.0;
    if a == 255 {
        format!("rgb({r}, {g}, {b})")
    } else {
        format!("rgba({r}, {g}, {b}, {:.3})", a as f64 / 255.0)
    }
}

/// Picks the opaque fill for an export: `None` when transparency was requested, white when the
/// element's own background is (fully) transparent or unreadable, else the element's color.
pub fn export_background(computed: Option<&str>, transparent: bool) -> Option<Rgba<u8>> {
    if transparent {
        return None;
    }
    match computed.and_then(parse_css_color) {
        Some(color) if color.0[3] > 0 => Some(color),
        _ => Some(Rgba([255, 255, 255, 255])),
    }
}
