//! Document layout: where every title line, rule and page image goes.
//!
//! Layout is pure data. Each chapter contributes one title sheet followed by
//! one sheet per page image; [`crate::pipeline::pdf`] turns the finished
//! [`DocumentLayout`] into a file in one pass. Coordinates are PDF points
//! measured from the top-left corner of an A4 portrait sheet.

use crate::model::{ChapterRef, ImageAsset, SeriesMetadata};
use std::path::PathBuf;
use tracing::debug;

pub const PAGE_WIDTH_PT: f32 = 595.28;
pub const PAGE_HEIGHT_PT: f32 = 841.89;
/// Title-sheet margin on every side.
pub const MARGIN_PT: f32 = 30.0;
/// Inset between an image sheet's edge and the image box.
pub const IMAGE_INSET_PT: f32 = 10.0;
pub const TITLE_SIZE_PT: f32 = 48.0;
pub const HEADING_SIZE_PT: f32 = 42.0;
/// Vertical gap after the cover and after the separator rule.
pub const GAP_PT: f32 = 16.0;
pub const RULE_THICKNESS_PT: f32 = 1.0;

// Baseline offset inside a text line, in ems.
const ASCENT_EM: f32 = 0.8;

/// Width of a run of text as the document font will draw it.
pub trait TextMeasurer: Send + Sync {
    /// Advance width of `text` at `size` points, in points.
    fn text_width_pt(&self, text: &str, size: f32) -> f32;
}

/// One drawing instruction on a sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// Image whose top-left corner is at `(x, y)`.
    Image {
        path: PathBuf,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    /// A single line of text with its baseline at `y`.
    Text { text: String, size: f32, x: f32, y: f32 },
    /// Horizontal rule.
    Rule {
        x1: f32,
        x2: f32,
        y: f32,
        thickness: f32,
        dashed: bool,
    },
}

/// One output page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub ops: Vec<DrawOp>,
}

/// The whole document, ready to be written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentLayout {
    pub title: String,
    pub sheets: Vec<Sheet>,
}

impl DocumentLayout {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            sheets: Vec::new(),
        }
    }

    /// Append a chapter: its title sheet, then one sheet per image, in order.
    pub fn push_chapter(
        &mut self,
        series: &SeriesMetadata,
        volume: &str,
        chapter: &ChapterRef,
        images: &[ImageAsset],
        measure: &dyn TextMeasurer,
    ) {
        self.sheets.push(title_sheet(series, volume, chapter, measure));
        for image in images {
            debug!(
                "Adding image {} with size {}x{}",
                image.local_path.display(),
                image.width,
                image.height
            );
            self.sheets.push(image_sheet(image));
        }
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }
}

/// Aspect-preserving scale-to-fit of `img_w × img_h` into `box_w × box_h`.
pub fn containment_size(img_w: f32, img_h: f32, box_w: f32, box_h: f32) -> (f32, f32) {
    if img_w <= 0.0 || img_h <= 0.0 {
        return (0.0, 0.0);
    }
    let scale = (box_w / img_w).min(box_h / img_h);
    (img_w * scale, img_h * scale)
}

/// Greedy word wrap for `size`-point text into `width` points.
///
/// A single word longer than the line stays on its own line rather than
/// being split.
pub fn wrap_text(text: &str, size: f32, width: f32, measure: &dyn TextMeasurer) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() {
            let candidate = format!("{current} {word}");
            if measure.text_width_pt(&candidate, size) <= width {
                current = candidate;
                continue;
            }
            lines.push(std::mem::take(&mut current));
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Lay out wrapped text starting at `cursor`; returns the new cursor.
fn push_text(
    ops: &mut Vec<DrawOp>,
    text: &str,
    size: f32,
    mut cursor: f32,
    measure: &dyn TextMeasurer,
) -> f32 {
    let width = PAGE_WIDTH_PT - 2.0 * MARGIN_PT;
    for line in wrap_text(text, size, width, measure) {
        ops.push(DrawOp::Text {
            text: line,
            size,
            x: MARGIN_PT,
            y: cursor + size * ASCENT_EM,
        });
        cursor += size;
    }
    cursor
}

/// "Chapter 3: Name", or "Chapter 3" for an unnamed chapter.
pub fn chapter_heading(chapter: &ChapterRef) -> String {
    let name = chapter.name.trim();
    if name.is_empty() {
        format!("Chapter {}", chapter.index)
    } else {
        format!("Chapter {}: {}", chapter.index, name)
    }
}

/// Title sheet: cover, series name, dashed rule, volume and chapter lines.
pub fn title_sheet(
    series: &SeriesMetadata,
    volume: &str,
    chapter: &ChapterRef,
    measure: &dyn TextMeasurer,
) -> Sheet {
    let mut ops = Vec::new();
    let mut cursor = MARGIN_PT;
    let content_width = PAGE_WIDTH_PT - 2.0 * MARGIN_PT;

    if let Some(ref cover) = series.cover {
        // Half the native pixel size, shrunk further only if wider than the
        // text column.
        let (mut w, mut h) = (cover.width as f32 / 2.0, cover.height as f32 / 2.0);
        if w > content_width {
            (w, h) = containment_size(w, h, content_width, f32::MAX);
        }
        ops.push(DrawOp::Image {
            path: cover.local_path.clone(),
            x: MARGIN_PT,
            y: cursor,
            width: w,
            height: h,
        });
        cursor += h + GAP_PT;
    }

    cursor = push_text(&mut ops, &series.display_name, TITLE_SIZE_PT, cursor, measure);

    ops.push(DrawOp::Rule {
        x1: MARGIN_PT,
        x2: PAGE_WIDTH_PT - MARGIN_PT,
        y: cursor,
        thickness: RULE_THICKNESS_PT,
        dashed: true,
    });
    cursor += GAP_PT;

    let volume_line = format!("Volume: {volume}");
    cursor = push_text(&mut ops, &volume_line, HEADING_SIZE_PT, cursor, measure);
    push_text(&mut ops, &chapter_heading(chapter), HEADING_SIZE_PT, cursor, measure);

    Sheet { ops }
}

/// Full-bleed sheet holding one image, contained and centred in the inset
/// box.
pub fn image_sheet(image: &ImageAsset) -> Sheet {
    let box_w = PAGE_WIDTH_PT - 2.0 * IMAGE_INSET_PT;
    let box_h = PAGE_HEIGHT_PT - 2.0 * IMAGE_INSET_PT;
    let (width, height) = containment_size(image.width as f32, image.height as f32, box_w, box_h);
    Sheet {
        ops: vec![DrawOp::Image {
            path: image.local_path.clone(),
            x: IMAGE_INSET_PT + (box_w - width) / 2.0,
            y: IMAGE_INSET_PT + (box_h - height) / 2.0,
            width,
            height,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    /// Every character half an em wide.
    struct HalfEm;

    impl TextMeasurer for HalfEm {
        fn text_width_pt(&self, text: &str, size: f32) -> f32 {
            text.chars().count() as f32 * size * 0.5
        }
    }

    fn asset(w: u32, h: u32) -> ImageAsset {
        ImageAsset {
            local_path: PathBuf::from(format!("/t/{w}x{h}.jpg")),
            width: w,
            height: h,
        }
    }

    fn series(cover: Option<ImageAsset>) -> SeriesMetadata {
        SeriesMetadata {
            display_name: "Berserk".into(),
            slug: "berserk".into(),
            cover,
            chapters_by_volume: BTreeMap::new(),
        }
    }

    fn chapter(index: &str, name: &str) -> ChapterRef {
        ChapterRef {
            name: name.into(),
            index: index.into(),
            volume: "1".into(),
        }
    }

    #[test]
    fn containment_preserves_aspect_and_fits_box() {
        let (w, h) = containment_size(1000.0, 2000.0, 575.0, 820.0);
        assert!(w <= 575.0 && h <= 820.0);
        assert!((w / h - 0.5).abs() < 1e-4);
        assert!((h - 820.0).abs() < 1e-3);
    }

    #[test]
    fn containment_of_wide_image_is_width_bound() {
        let (w, h) = containment_size(3000.0, 1000.0, 575.0, 820.0);
        assert!((w - 575.0).abs() < 1e-3);
        assert!((h - 575.0 / 3.0).abs() < 1e-3);
    }

    #[test]
    fn image_sheet_centres_within_inset() {
        let sheet = image_sheet(&asset(1000, 2000));
        let DrawOp::Image { x, y, width, height, .. } = sheet.ops[0].clone() else {
            panic!("expected image op");
        };
        assert!(x >= IMAGE_INSET_PT && y >= IMAGE_INSET_PT - 1e-3);
        assert!(x + width <= PAGE_WIDTH_PT - IMAGE_INSET_PT + 1e-3);
        assert!(y + height <= PAGE_HEIGHT_PT - IMAGE_INSET_PT + 1e-3);
        let left = x;
        let right = PAGE_WIDTH_PT - (x + width);
        assert!((left - right).abs() < 1e-3);
    }

    #[test]
    fn wrap_breaks_on_words() {
        let lines = wrap_text("The Black Swordsman Arc Part One", 48.0, 535.28, &HalfEm);
        assert_eq!(lines, vec!["The Black Swordsman", "Arc Part One"]);
        assert!(wrap_text("", 48.0, 535.0, &HalfEm).is_empty());
        let long = "x".repeat(100);
        assert_eq!(wrap_text(&long, 48.0, 535.0, &HalfEm), vec![long]);
    }

    #[test]
    fn title_sheet_order_without_cover() {
        let sheet = title_sheet(&series(None), "1", &chapter("3", "Guts"), &HalfEm);
        let texts: Vec<&str> = sheet
            .ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Berserk", "Volume: 1", "Chapter 3: Guts"]);
        assert!(matches!(sheet.ops[1], DrawOp::Rule { dashed: true, .. }));
    }

    #[test]
    fn cover_is_drawn_at_half_size_on_top() {
        let sheet = title_sheet(&series(Some(asset(400, 600))), "1", &chapter("1", ""), &HalfEm);
        match &sheet.ops[0] {
            DrawOp::Image { x, y, width, height, .. } => {
                assert_eq!((*x, *y), (MARGIN_PT, MARGIN_PT));
                assert_eq!((*width, *height), (200.0, 300.0));
            }
            other => panic!("expected cover first, got {other:?}"),
        }
        let DrawOp::Text { y, .. } = &sheet.ops[1] else {
            panic!("expected title");
        };
        assert!(*y > MARGIN_PT + 300.0 + GAP_PT);
    }

    #[test]
    fn unnamed_chapter_heading() {
        assert_eq!(chapter_heading(&chapter("7", "  ")), "Chapter 7");
    }

    #[test]
    fn chapter_contributes_title_plus_one_sheet_per_image() {
        let mut doc = DocumentLayout::new("Berserk");
        let images = [asset(10, 20), asset(20, 10)];
        doc.push_chapter(&series(None), "1", &chapter("1", "a"), &images, &HalfEm);
        doc.push_chapter(&series(None), "1", &chapter("2", "b"), &[asset(10, 20)], &HalfEm);
        assert_eq!(doc.sheet_count(), 5);
    }
}
