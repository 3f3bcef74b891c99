//! Title-sheet font: the bytes embedded into the PDF and the glyph advances
//! used to wrap title lines.
//!
//! Series and chapter names are usually Cyrillic, so the default is a bundled
//! DejaVu Sans rather than one of the PDF base fonts. A user font replaces it
//! for both drawing and measuring, so wrapping always matches what is drawn.

use crate::error::MangaPdfError;
use crate::pipeline::layout::TextMeasurer;
use owned_ttf_parser::{AsFaceRef, OwnedFace};
use std::fmt;
use std::path::Path;

/// DejaVu Sans, covering Latin, Greek and Cyrillic.
const BUNDLED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

// Advance charged for a character the face has no glyph for, in ems.
const MISSING_GLYPH_EM: f32 = 0.6;

/// A parsed TrueType face.
pub struct FontFace {
    face: OwnedFace,
    units_per_em: f32,
}

impl FontFace {
    /// `path` if given, else the bundled face.
    pub fn load(path: Option<&Path>) -> Result<Self, MangaPdfError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::bundled(),
        }
    }

    pub fn bundled() -> Result<Self, MangaPdfError> {
        Self::parse(BUNDLED_FONT.to_vec())
            .map_err(|e| MangaPdfError::Internal(format!("Bundled font is unreadable: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self, MangaPdfError> {
        let bytes = std::fs::read(path).map_err(|e| {
            MangaPdfError::InvalidConfig(format!("Cannot read font {}: {e}", path.display()))
        })?;
        Self::parse(bytes).map_err(|e| {
            MangaPdfError::InvalidConfig(format!(
                "Font {} is not a usable TrueType font: {e}",
                path.display()
            ))
        })
    }

    fn parse(bytes: Vec<u8>) -> Result<Self, owned_ttf_parser::FaceParsingError> {
        let face = OwnedFace::from_vec(bytes, 0)?;
        let units_per_em = f32::from(face.as_face_ref().units_per_em().max(1));
        Ok(Self { face, units_per_em })
    }

    /// Raw font file, as handed to the PDF writer.
    pub fn bytes(&self) -> &[u8] {
        self.face.as_slice()
    }

    /// Whether the face has a glyph for `c`.
    pub fn covers(&self, c: char) -> bool {
        c.is_whitespace() || self.face.as_face_ref().glyph_index(c).is_some()
    }

    /// Characters of `text` the face cannot draw, deduplicated in order.
    pub fn missing_glyphs(&self, text: &str) -> Vec<char> {
        let mut missing = Vec::new();
        for c in text.chars() {
            if !self.covers(c) && !missing.contains(&c) {
                missing.push(c);
            }
        }
        missing
    }
}

impl TextMeasurer for FontFace {
    fn text_width_pt(&self, text: &str, size: f32) -> f32 {
        let face = self.face.as_face_ref();
        let units: f32 = text
            .chars()
            .map(|c| {
                face.glyph_index(c)
                    .and_then(|g| face.glyph_hor_advance(g))
                    .map(f32::from)
                    .unwrap_or(MISSING_GLYPH_EM * self.units_per_em)
            })
            .sum();
        units / self.units_per_em * size
    }
}

impl fmt::Debug for FontFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontFace")
            .field("bytes", &self.bytes().len())
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}
