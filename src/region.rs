//! Region Selection Module
//!
//! Maps a rectangle drawn on a down-scaled preview back to pixel coordinates
//! of the original image, and crops the selected region.

use image::DynamicImage;
use log::{debug, warn};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Default cap on the preview canvas width.
pub const DEFAULT_PREVIEW_CAP: u32 = 600;

/// The preview canvas a selection is drawn on.
///
/// The width is capped and the height follows the image's aspect ratio, so
/// a single uniform scale factor relates both axes to the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewCanvas {
    source_width: u32,
    source_height: u32,
    width: u32,
    height: u32,
}

impl PreviewCanvas {
    /// Fits a preview of at most `cap` units wide onto a `source_width` x
    /// `source_height` image.
    pub fn fit(source_width: u32, source_height: u32, cap: u32) -> Self {
        let width = cap.max(1).min(source_width.max(1));
        let height = if source_width == 0 {
            0
        } else {
            (source_height as f64 * width as f64 / source_width as f64).round() as u32
        };
        PreviewCanvas {
            source_width,
            source_height,
            width,
            height: height.max(1),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Source pixels per preview unit, identical on both axes.
    pub fn scale(&self) -> f64 {
        self.source_width as f64 / self.width as f64
    }

    /// A selection covering the whole preview.
    pub fn full_selection(&self) -> SelectionRectangle {
        SelectionRectangle::new(0.0, 0.0, self.width as f64, self.height as f64)
    }

    /// Translates a preview-space selection into source pixel space.
    ///
    /// Edges on or past the preview border land exactly on the source border.
    /// Returns `None` for non-finite input or a selection that collapses to
    /// nothing once clamped to the image.
    pub fn map_to_source(&self, selection: SelectionRectangle) -> Option<SourceRectangle> {
        let selection = selection.normalized()?;
        let scale = self.scale();

        let map_edge = |edge: f64, preview_extent: u32, source_extent: u32| -> u32 {
            if edge >= preview_extent as f64 {
                return source_extent;
            }
            let mapped = (edge * scale).round();
            if mapped <= 0.0 {
                0
            } else {
                (mapped as u32).min(source_extent)
            }
        };

        let left = map_edge(selection.left, self.width, self.source_width);
        let top = map_edge(selection.top, self.height, self.source_height);
        let right = map_edge(selection.left + selection.width, self.width, self.source_width);
        let bottom = map_edge(selection.top + selection.height, self.height, self.source_height);

        if right <= left || bottom <= top {
            debug!("Selection {:?} collapses to an empty region", selection);
            return None;
        }

        Some(SourceRectangle {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        })
    }
}

/// A rectangle in preview coordinates, as drawn by the user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionRectangle {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl SelectionRectangle {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        SelectionRectangle {
            left,
            top,
            width,
            height,
        }
    }

    /// Flips negative extents (a drag toward the top-left) into positive ones.
    fn normalized(self) -> Option<Self> {
        let values = [self.left, self.top, self.width, self.height];
        if values.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let (left, width) = if self.width < 0.0 {
            (self.left + self.width, -self.width)
        } else {
            (self.left, self.width)
        };
        let (top, height) = if self.height < 0.0 {
            (self.top + self.height, -self.height)
        } else {
            (self.top, self.height)
        };
        Some(SelectionRectangle::new(left, top, width, height))
    }
}

impl FromStr for SelectionRectangle {
    type Err = String;

    /// Parses `LEFT,TOP,WIDTH,HEIGHT`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid selection '{}': {}", s, e))?;
        match parts.as_slice() {
            [left, top, width, height] => Ok(SelectionRectangle::new(*left, *top, *width, *height)),
            _ => Err(format!(
                "invalid selection '{}': expected LEFT,TOP,WIDTH,HEIGHT",
                s
            )),
        }
    }
}

/// A rectangle in source image pixels, always inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceRectangle {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SourceRectangle {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

impl fmt::Display for SourceRectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}x{})", self.x, self.y, self.width, self.height)
    }
}

/// Crops `image` to `region`, or returns a copy of the full image when there
/// is no region.
pub fn crop(image: &DynamicImage, region: Option<SourceRectangle>) -> DynamicImage {
    match region {
        Some(r) => image.crop_imm(r.x, r.y, r.width, r.height),
        None => image.clone(),
    }
}

/// Resolves an optional user selection into a source region, falling back to
/// the full image when the selection is absent or degenerate.
pub fn resolve_selection(
    canvas: &PreviewCanvas,
    selection: Option<SelectionRectangle>,
) -> Option<SourceRectangle> {
    let selection = selection?;
    let region = canvas.map_to_source(selection);
    if region.is_none() {
        warn!("Selection {:?} is empty after clamping; using the full image.", selection);
    }
    region
}
