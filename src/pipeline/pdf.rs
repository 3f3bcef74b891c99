//! PDF sink: renders a [`DocumentLayout`] with `printpdf` in one pass.
//!
//! `printpdf` documents are not `Send`, so the whole document is built and
//! serialised on one blocking-pool thread. The file is written to a temp
//! file next to the destination and renamed into place; a failed write
//! leaves nothing at the output path.
//!
//! Normalized pages are already JPEGs, so their bytes go into the document
//! unchanged behind a `DCTDecode` filter. Anything else is decoded and
//! embedded as raw pixels.

use crate::error::MangaPdfError;
use crate::pipeline::font::FontFace;
use crate::pipeline::layout::{DocumentLayout, DrawOp, PAGE_HEIGHT_PT, PAGE_WIDTH_PT};
use printpdf::{
    image_crate, ColorBits, ColorSpace, Image, ImageFilter, ImageTransform, ImageXObject,
    IndirectFontRef, Line, LineDashPattern, Mm, PdfDocument, PdfLayerReference, Point, Px,
};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

fn mm(pt: f32) -> Mm {
    Mm(pt * 25.4 / 72.0)
}

/// Render `layout` to `output` atomically.
pub fn write_pdf_blocking(
    layout: &DocumentLayout,
    font: &FontFace,
    output: &Path,
) -> Result<(), MangaPdfError> {
    let fail = |detail: String| MangaPdfError::DocumentWriteFailed {
        path: output.to_path_buf(),
        detail,
    };

    if layout.sheets.is_empty() {
        return Err(fail("document has no sheets".into()));
    }

    let (doc, first_page, first_layer) = PdfDocument::new(
        &layout.title,
        mm(PAGE_WIDTH_PT),
        mm(PAGE_HEIGHT_PT),
        "Layer 1",
    );
    let font = doc
        .add_external_font(font.bytes())
        .map_err(|e| fail(format!("PDF font error: {e}")))?;

    for (i, sheet) in layout.sheets.iter().enumerate() {
        let layer = if i == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page, layer) = doc.add_page(mm(PAGE_WIDTH_PT), mm(PAGE_HEIGHT_PT), "Layer 1");
            doc.get_page(page).get_layer(layer)
        };
        for op in &sheet.ops {
            draw(&layer, &font, op).map_err(fail)?;
        }
    }

    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&dir).map_err(|e| MangaPdfError::OutputWriteFailed {
        path: output.to_path_buf(),
        source: e,
    })?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".mangalib-")
        .suffix(".pdf.tmp")
        .tempfile_in(&dir)
        .map_err(|e| MangaPdfError::OutputWriteFailed {
            path: output.to_path_buf(),
            source: e,
        })?;

    debug!("Serialising {} sheet(s) to {}", layout.sheets.len(), tmp.path().display());
    let mut writer = BufWriter::new(tmp.as_file_mut());
    doc.save(&mut writer)
        .map_err(|e| fail(format!("PDF save error: {e}")))?;
    writer
        .into_inner()
        .map_err(|e| MangaPdfError::OutputWriteFailed {
            path: output.to_path_buf(),
            source: e.into_error(),
        })?;

    tmp.persist(output).map_err(|e| MangaPdfError::OutputWriteFailed {
        path: output.to_path_buf(),
        source: e.error,
    })?;
    info!("Wrote {}", output.display());
    Ok(())
}

/// [`write_pdf_blocking`] on the blocking pool.
pub async fn write_pdf(
    layout: DocumentLayout,
    font: FontFace,
    output: PathBuf,
) -> Result<(), MangaPdfError> {
    tokio::task::spawn_blocking(move || write_pdf_blocking(&layout, &font, &output))
        .await
        .map_err(|e| MangaPdfError::Internal(format!("PDF writer task panicked: {}", e)))?
}

/// Frame header of a JPEG stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JpegFrame {
    width: u32,
    height: u32,
    precision: u8,
    components: u8,
}

/// Read the first start-of-frame segment of `data`, or `None` if `data` is
/// not a well-formed JPEG up to that point.
fn jpeg_frame(data: &[u8]) -> Option<JpegFrame> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        // Fill byte, or a marker without a length field.
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == 0x01 || (0xD0..=0xD8).contains(&marker) {
            pos += 2;
            continue;
        }
        // Image data begins before any frame header.
        if marker == 0xD9 || marker == 0xDA {
            return None;
        }
        let len = usize::from(u16::from_be_bytes([data[pos + 2], data[pos + 3]]));
        let is_frame = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            let seg = data.get(pos + 4..pos + 2 + len)?;
            if seg.len() < 6 {
                return None;
            }
            return Some(JpegFrame {
                precision: seg[0],
                height: u32::from(u16::from_be_bytes([seg[1], seg[2]])),
                width: u32::from(u16::from_be_bytes([seg[3], seg[4]])),
                components: seg[5],
            });
        }
        pos += 2 + len;
    }
    None
}

/// The page image as a PDF image object.
///
/// 8-bit grey or colour JPEGs pass through untouched. Other inputs (CMYK or
/// 12-bit JPEGs, non-JPEG files) are decoded first.
fn load_image(path: &Path) -> Result<Image, String> {
    let data = std::fs::read(path).map_err(|e| format!("image {}: {e}", path.display()))?;
    match jpeg_frame(&data) {
        Some(frame)
            if frame.precision == 8
                && matches!(frame.components, 1 | 3)
                && frame.width > 0
                && frame.height > 0 =>
        {
            Ok(Image::from(ImageXObject {
                width: Px(frame.width as usize),
                height: Px(frame.height as usize),
                color_space: if frame.components == 1 {
                    ColorSpace::Greyscale
                } else {
                    ColorSpace::Rgb
                },
                bits_per_component: ColorBits::Bit8,
                interpolate: true,
                image_data: data,
                image_filter: Some(ImageFilter::DCT),
                smask: None,
                clipping_bbox: None,
            }))
        }
        _ => {
            debug!("Decoding {} for raw embedding", path.display());
            let decoded = image_crate::load_from_memory(&data)
                .map_err(|e| format!("image {}: {e}", path.display()))?;
            Ok(Image::from_dynamic_image(&decoded))
        }
    }
}

fn draw(layer: &PdfLayerReference, font: &IndirectFontRef, op: &DrawOp) -> Result<(), String> {
    match op {
        DrawOp::Text { text, size, x, y } => {
            layer.use_text(text.as_str(), *size, mm(*x), mm(PAGE_HEIGHT_PT - y), font);
        }
        DrawOp::Rule {
            x1,
            x2,
            y,
            thickness,
            dashed,
        } => {
            layer.set_outline_thickness(*thickness);
            if *dashed {
                layer.set_line_dash_pattern(LineDashPattern {
                    dash_1: Some(4),
                    gap_1: Some(4),
                    ..LineDashPattern::default()
                });
            }
            let y = mm(PAGE_HEIGHT_PT - y);
            layer.add_line(Line {
                points: vec![(Point::new(mm(*x1), y), false), (Point::new(mm(*x2), y), false)],
                is_closed: false,
            });
            if *dashed {
                layer.set_line_dash_pattern(LineDashPattern::default());
            }
        }
        DrawOp::Image {
            path,
            x,
            y,
            width,
            height,
        } => {
            let image = load_image(path)?;
            let (px_w, px_h) = (image.image.width.0 as f32, image.image.height.0 as f32);
            if px_w == 0.0 || px_h == 0.0 {
                return Err(format!("image {} is empty", path.display()));
            }
            // At 72 dpi one pixel is one point.
            image.add_to_layer(
                layer.clone(),
                ImageTransform {
                    translate_x: Some(mm(*x)),
                    translate_y: Some(mm(PAGE_HEIGHT_PT - (y + height))),
                    scale_x: Some(width / px_w),
                    scale_y: Some(height / px_h),
                    dpi: Some(72.0),
                    ..Default::default()
                },
            );
        }
    }
    Ok(())
}
