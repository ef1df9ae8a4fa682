//! Output presets and quality levels.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::Size;

/// The platform a preset is tailored for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Facebook,
    #[serde(rename = "linkedin")]
    LinkedIn,
    Twitter,
    Threads,
    #[serde(rename = "youtube")]
    YouTube,
    Custom,
}

impl Platform {
    /// All platforms in catalog display order.
    pub const ALL: [Platform; 7] = [
        Platform::Instagram,
        Platform::Facebook,
        Platform::LinkedIn,
        Platform::Twitter,
        Platform::Threads,
        Platform::YouTube,
        Platform::Custom,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Instagram => "Instagram",
            Platform::Facebook => "Facebook",
            Platform::LinkedIn => "LinkedIn",
            Platform::Twitter => "Twitter / X",
            Platform::Threads => "Threads",
            Platform::YouTube => "YouTube",
            Platform::Custom => "Custom",
        }
    }
}

/// A named output size. `0 x 0` means "keep the source's native size".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputPreset {
    pub id: String,
    pub name: String,
    pub platform: Platform,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: String,
}

impl OutputPreset {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        platform: Platform,
        width: u32,
        height: u32,
        aspect_ratio: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            platform,
            width,
            height,
            aspect_ratio: aspect_ratio.into(),
        }
    }

    /// The "Original Size" preset: no letterboxing, output follows the capture.
    pub fn native() -> Self {
        Self::new("original", "Original Size", Platform::Custom, 0, 0, "auto")
    }

    /// A one-off preset for an arbitrary target box.
    pub fn custom(width: u32, height: u32) -> Self {
        Self::new(
            format!("custom-{width}x{height}"),
            "Custom",
            Platform::Custom,
            width,
            height,
            format!("{width}:{height}"),
        )
    }

    /// Whether this is the native-size sentinel. A preset with only one zero side also counts,
    /// since no box can be fitted into it.
    pub fn is_native(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn size(&self) -> Option<Size> {
        (!self.is_native()).then(|| Size::new(self.width, self.height))
    }

    /// Parses a catalog from a JSON array of presets.
    pub fn load_catalog(json: &str) -> Result<Vec<OutputPreset>> {
        Ok(serde_json::from_str(json)?)
    }
}

const CATALOG: &[(&str, &str, Platform, u32, u32, &str)] = &[
    ("original", "Original Size", Platform::Custom, 0, 0, "auto"),
    ("instagram-square", "Square Post", Platform::Instagram, 1080, 1080, "1:1"),
    ("instagram-portrait", "Portrait Post", Platform::Instagram, 1080, 1350, "4:5"),
    ("instagram-story", "Story / Reel", Platform::Instagram, 1080, 1920, "9:16"),
    ("instagram-landscape", "Landscape", Platform::Instagram, 1080, 566, "1.91:1"),
    ("facebook-square", "Square Post", Platform::Facebook, 1200, 1200, "1:1"),
    ("facebook-landscape", "Landscape Post", Platform::Facebook, 1200, 630, "1.91:1"),
    ("facebook-story", "Story", Platform::Facebook, 1080, 1920, "9:16"),
    ("facebook-cover", "Cover Photo", Platform::Facebook, 820, 312, "2.63:1"),
    ("facebook-event", "Event Cover", Platform::Facebook, 1920, 1005, "1.91:1"),
    ("linkedin-square", "Square Post", Platform::LinkedIn, 1200, 1200, "1:1"),
    ("linkedin-landscape", "Landscape Post", Platform::LinkedIn, 1200, 627, "1.91:1"),
    ("linkedin-portrait", "Portrait Post", Platform::LinkedIn, 1080, 1350, "4:5"),
    ("linkedin-banner", "Profile Banner", Platform::LinkedIn, 1584, 396, "4:1"),
    ("linkedin-article", "Article Cover", Platform::LinkedIn, 1200, 644, "1.86:1"),
    ("twitter-square", "Square Post", Platform::Twitter, 1200, 1200, "1:1"),
    ("twitter-landscape", "Landscape Post", Platform::Twitter, 1600, 900, "16:9"),
    ("twitter-portrait", "Portrait Post", Platform::Twitter, 1080, 1350, "4:5"),
    ("twitter-header", "Header Banner", Platform::Twitter, 1500, 500, "3:1"),
    ("threads-square", "Square Post", Platform::Threads, 1080, 1080, "1:1"),
    ("threads-portrait", "Portrait Post", Platform::Threads, 1080, 1350, "4:5"),
    ("threads-landscape", "Landscape", Platform::Threads, 1080, 566, "1.91:1"),
    ("youtube-thumbnail", "Thumbnail", Platform::YouTube, 1280, 720, "16:9"),
    ("youtube-banner", "Channel Banner", Platform::YouTube, 2560, 1440, "16:9"),
    ("youtube-short", "Short", Platform::YouTube, 1080, 1920, "9:16"),
    ("youtube-community", "Community Post", Platform::YouTube, 1200, 1200, "1:1"),
];

/// The built-in preset catalog, native size first.
pub fn catalog() -> Vec<OutputPreset> {
    CATALOG
        .iter()
        .map(|&(id, name, platform, w, h, ratio)| OutputPreset::new(id, name, platform, w, h, ratio))
        .collect()
}

/// Looks up a built-in preset by id.
pub fn find(id: &str) -> Option<OutputPreset> {
    catalog().into_iter().find(|p| p.id == id)
}

/// The built-in catalog grouped by platform, in [`Platform::ALL`] order.
pub fn presets_by_platform() -> Vec<(Platform, Vec<OutputPreset>)> {
    let all = catalog();
    Platform::ALL
        .iter()
        .map(|platform| {
            let presets = all
                .iter()
                .filter(|p| p.platform == *platform)
                .cloned()
                .collect();
            (*platform, presets)
        })
        .collect()
}

/// Export resolution tier, mapping to a device-pixel multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Standard,
    #[default]
    High,
    Ultra,
}

impl QualityLevel {
    pub fn scale(&self) -> u32 {
        match self {
            QualityLevel::Standard => 3,
            QualityLevel::High => 4,
            QualityLevel::Ultra => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::Standard => "standard",
            QualityLevel::High => "high",
            QualityLevel::Ultra => "ultra",
        }
    }
}

impl FromStr for QualityLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(QualityLevel::Standard),
            "high" => Ok(QualityLevel::High),
            "ultra" => Ok(QualityLevel::Ultra),
            other => Err(anyhow!("Unknown quality level: {other}")),
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_scales() {
        assert_eq!(QualityLevel::Standard.scale(), 3);
        assert_eq!(QualityLevel::High.scale(), 4);
        assert_eq!(QualityLevel::Ultra.scale(), 6);
        assert_eq!("ULTRA".parse::<QualityLevel>().unwrap(), QualityLevel::Ultra);
        assert!("max".parse::<QualityLevel>().is_err());
    }

    #[test]
    fn catalog_starts_with_native_size() {
        let presets = catalog();
        assert_eq!(presets[0], OutputPreset::native());
        assert!(presets[0].is_native());
        assert!(presets[1..].iter().all(|p| !p.is_native()));
    }

    #[test]
    fn catalog_ids_are_unique() {
        let presets = catalog();
        let mut ids: Vec<_> = presets.iter().map(|p| p.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), presets.len());
    }

    #[test]
    fn grouping_covers_every_preset() {
        let groups = presets_by_platform();
        assert_eq!(groups.len(), Platform::ALL.len());
        let total: usize = groups.iter().map(|(_, p)| p.len()).sum();
        assert_eq!(total, catalog().len());
        let (platform, custom) = groups.last().unwrap();
        assert_eq!(*platform, Platform::Custom);
        assert_eq!(custom[0].id, "original");
    }

    #[test]
    fn find_portrait_preset() {
        let preset = find("instagram-portrait").unwrap();
        assert_eq!(preset.size(), Some(Size::new(1080, 1350)));
        assert_eq!(preset.aspect_ratio, "4:5");
        assert!(find("tiktok-video").is_none());
    }

    #[test]
    fn load_catalog_from_json() {
        let json = r#"[
            {"id": "poster", "name": "Poster", "platform": "custom",
             "width": 2480, "height": 3508, "aspectRatio": "1:1.41"},
            {"id": "yt", "name": "Thumb", "platform": "youtube",
             "width": 1280, "height": 720, "aspectRatio": "16:9"}
        ]"#;
        let presets = OutputPreset::load_catalog(json).unwrap();
        assert_eq!(presets.len(), 2);
        assert_eq!(presets[1].platform, Platform::YouTube);
        assert_eq!(presets[0].size(), Some(Size::new(2480, 3508)));
    }
}
