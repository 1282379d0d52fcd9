//! Watermark configuration.
//!
//! A [`WatermarkConfig`] is an immutable value describing one watermark:
//! its source (raster asset or styled text), how large it should render
//! relative to the target image, where it sits, and how it is encoded.
//! The engine receives it fully formed; nothing in this crate mutates it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Which kind of watermark a config describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatermarkKind {
    /// A raster image overlaid onto the target
    Image,
    /// A rendered text string overlaid onto the target
    Text,
}

/// The watermark's content: a raster asset or a styled text string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WatermarkSource {
    /// Raster watermark asset with its natural dimensions
    Image {
        /// Path of the watermark image file
        path: PathBuf,
        /// Natural width in pixels
        width: u32,
        /// Natural height in pixels
        height: u32,
    },
    /// Text watermark rendered from a font file
    Text {
        /// The string to render
        text: String,
        /// Path of the TrueType/OpenType font file
        font_path: PathBuf,
        /// Nominal font size in pixels; fitting may only shrink it
        size: f32,
        /// Flat RGB fill color
        color: [u8; 3],
    },
}

/// How the watermark box is sized against the target image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizePolicy {
    /// Use the watermark's natural size, clamped to fit the image
    Original,
    /// Use an exact pixel size, clamped to fit the image
    Absolute(u32, u32),
    /// Scale the watermark so its width is this percent of the image width
    ScaledPercent(u8),
}

/// Horizontal third of the anchor grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HorizontalAlign {
    /// Flush with the left edge
    Left,
    /// Horizontally centered
    Center,
    /// Flush with the right edge
    Right,
}

/// Vertical third of the anchor grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerticalAlign {
    /// Flush with the top edge
    Top,
    /// Vertically centered
    Middle,
    /// Flush with the bottom edge
    Bottom,
}

/// One of the 9 grid positions used as the base placement before offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    Center,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Anchor {
    /// Horizontal component of this anchor.
    pub fn horizontal(self) -> HorizontalAlign {
        match self {
            Anchor::TopLeft | Anchor::MiddleLeft | Anchor::BottomLeft => HorizontalAlign::Left,
            Anchor::TopCenter | Anchor::Center | Anchor::BottomCenter => HorizontalAlign::Center,
            Anchor::TopRight | Anchor::MiddleRight | Anchor::BottomRight => HorizontalAlign::Right,
        }
    }

    /// Vertical component of this anchor.
    pub fn vertical(self) -> VerticalAlign {
        match self {
            Anchor::TopLeft | Anchor::TopCenter | Anchor::TopRight => VerticalAlign::Top,
            Anchor::MiddleLeft | Anchor::Center | Anchor::MiddleRight => VerticalAlign::Middle,
            Anchor::BottomLeft | Anchor::BottomCenter | Anchor::BottomRight => {
                VerticalAlign::Bottom
            },
        }
    }

    /// All nine anchors, for sweep-style tests and UIs.
    pub fn all() -> [Anchor; 9] {
        [
            Anchor::TopLeft,
            Anchor::TopCenter,
            Anchor::TopRight,
            Anchor::MiddleLeft,
            Anchor::Center,
            Anchor::MiddleRight,
            Anchor::BottomLeft,
            Anchor::BottomCenter,
            Anchor::BottomRight,
        ]
    }
}

/// Unit in which an offset is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffsetUnit {
    /// Offset values are pixels
    Pixels,
    /// Offset values are percent of the target image's dimensions
    PercentOfImage,
}

/// Displacement applied to the anchored base position.
///
/// Offsets are directional: anchors on the right/bottom edges move the
/// watermark back toward the image center, not further outward. See
/// [`crate::geometry::compute_position`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    /// Horizontal displacement
    pub dx: i32,
    /// Vertical displacement
    pub dy: i32,
    /// Unit the displacement is expressed in
    pub unit: OffsetUnit,
}

impl Offset {
    /// Zero offset in pixels.
    pub fn none() -> Self {
        Self {
            dx: 0,
            dy: 0,
            unit: OffsetUnit::Pixels,
        }
    }
}

/// Scan layout requested for lossy-format output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interlace {
    /// Sequential baseline scan
    Baseline,
    /// Progressive/interlaced scan where the encoder supports it
    Progressive,
}

/// Stable identity of "which watermark" a config describes.
///
/// Stored alongside each backup so that a settings change (different
/// watermark image, different text or font) marks old backups as taken
/// under a different watermark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkIdentity(String);

impl WatermarkIdentity {
    /// The identity as a string key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WatermarkIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable watermark configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkConfig {
    /// What to overlay
    pub source: WatermarkSource,
    /// How large the overlay box is
    pub size_policy: SizePolicy,
    /// Base placement on the 9-position grid
    pub anchor: Anchor,
    /// Displacement from the base placement
    pub offset: Offset,
    /// Global opacity, 0-100
    pub opacity: u8,
    /// Lossy-format encode quality, 0-100
    pub quality: u8,
    /// Requested scan layout for lossy output
    pub interlace: Interlace,
}

impl WatermarkConfig {
    /// Create a configuration with defaults: original size, bottom-right
    /// anchor, no offset, fully opaque, quality 90, baseline scan.
    pub fn new(source: WatermarkSource) -> Self {
        Self {
            source,
            size_policy: SizePolicy::Original,
            anchor: Anchor::BottomRight,
            offset: Offset::none(),
            opacity: 100,
            quality: 90,
            interlace: Interlace::Baseline,
        }
    }

    /// Set the size policy.
    pub fn with_size_policy(mut self, policy: SizePolicy) -> Self {
        self.size_policy = policy;
        self
    }

    /// Set the anchor.
    pub fn with_anchor(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }

    /// Set the offset.
    pub fn with_offset(mut self, offset: Offset) -> Self {
        self.offset = offset;
        self
    }

    /// Set the global opacity (0-100).
    pub fn with_opacity(mut self, opacity: u8) -> Self {
        self.opacity = opacity.min(100);
        self
    }

    /// Set the lossy encode quality (0-100).
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.min(100);
        self
    }

    /// Set the requested scan layout.
    pub fn with_interlace(mut self, interlace: Interlace) -> Self {
        self.interlace = interlace;
        self
    }

    /// Which kind of watermark this config describes.
    pub fn kind(&self) -> WatermarkKind {
        match self.source {
            WatermarkSource::Image { .. } => WatermarkKind::Image,
            WatermarkSource::Text { .. } => WatermarkKind::Text,
        }
    }

    /// Derive the stable identity of this watermark's source.
    ///
    /// Placement, opacity, and encoding parameters are deliberately
    /// excluded: changing them does not invalidate a backup, which holds
    /// the pre-watermark original either way. Only the source content
    /// participates.
    pub fn identity(&self) -> WatermarkIdentity {
        match &self.source {
            WatermarkSource::Image { path, .. } => {
                WatermarkIdentity(format!("image:{}", path.display()))
            },
            WatermarkSource::Text {
                text,
                font_path,
                size,
                color,
            } => WatermarkIdentity(format!(
                "text:{}|{}|{}|#{:02x}{:02x}{:02x}",
                text,
                font_path.display(),
                size,
                color[0],
                color[1],
                color[2]
            )),
        }
    }

    /// True when `path` is the configured image watermark asset itself.
    ///
    /// The orchestrator refuses to watermark the watermark.
    pub fn is_own_source(&self, path: &Path) -> bool {
        match &self.source {
            WatermarkSource::Image { path: wm, .. } => wm == path,
            WatermarkSource::Text { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_source() -> WatermarkSource {
        WatermarkSource::Image {
            path: PathBuf::from("/assets/logo.png"),
            width: 150,
            height: 150,
        }
    }

    #[test]
    fn test_kind_follows_source() {
        let cfg = WatermarkConfig::new(image_source());
        assert_eq!(cfg.kind(), WatermarkKind::Image);

        let cfg = WatermarkConfig::new(WatermarkSource::Text {
            text: "© 2024".to_string(),
            font_path: PathBuf::from("/fonts/DejaVuSans.ttf"),
            size: 24.0,
            color: [255, 255, 255],
        });
        assert_eq!(cfg.kind(), WatermarkKind::Text);
    }

    #[test]
    fn test_identity_distinguishes_sources() {
        let a = WatermarkConfig::new(image_source()).identity();
        let b = WatermarkConfig::new(WatermarkSource::Image {
            path: PathBuf::from("/assets/other.png"),
            width: 150,
            height: 150,
        })
        .identity();
        assert_ne!(a, b);
    }

    #[test]
    fn test_identity_ignores_placement() {
        let base = WatermarkConfig::new(image_source());
        let moved = base.clone().with_anchor(Anchor::TopLeft).with_opacity(40);
        assert_eq!(base.identity(), moved.identity());
    }

    #[test]
    fn test_identity_tracks_text_style() {
        let mk = |size: f32| {
            WatermarkConfig::new(WatermarkSource::Text {
                text: "sample".to_string(),
                font_path: PathBuf::from("/fonts/a.ttf"),
                size,
                color: [0, 0, 0],
            })
            .identity()
        };
        assert_ne!(mk(24.0), mk(32.0));
    }

    #[test]
    fn test_is_own_source() {
        let cfg = WatermarkConfig::new(image_source());
        assert!(cfg.is_own_source(Path::new("/assets/logo.png")));
        assert!(!cfg.is_own_source(Path::new("/uploads/photo.jpg")));
    }

    #[test]
    fn test_anchor_components() {
        assert_eq!(Anchor::BottomRight.horizontal(), HorizontalAlign::Right);
        assert_eq!(Anchor::BottomRight.vertical(), VerticalAlign::Bottom);
        assert_eq!(Anchor::Center.horizontal(), HorizontalAlign::Center);
        assert_eq!(Anchor::Center.vertical(), VerticalAlign::Middle);
        assert_eq!(Anchor::all().len(), 9);
    }

    #[test]
    fn test_opacity_clamped() {
        let cfg = WatermarkConfig::new(image_source()).with_opacity(200);
        assert_eq!(cfg.opacity, 100);
    }
}
