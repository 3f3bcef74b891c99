//! Data model shared by every pipeline stage.
//!
//! All of these are created by one stage and only read by the next. Chapter
//! and volume labels stay raw strings as extracted: equality is string
//! equality, while ordering goes through [`parse_index`] so that `"2"` sorts
//! before `"10"`.

use crate::error::MangaPdfError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One chapter as listed on the series page.
///
/// Identity is `(volume, index)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRef {
    pub name: String,
    pub index: String,
    pub volume: String,
}

impl ChapterRef {
    /// Human label used in logs and error messages, e.g. `v2 c10.5`.
    pub fn label(&self) -> String {
        format!("v{} c{}", self.volume, self.index)
    }
}

/// Everything the series page yields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesMetadata {
    /// Localized name, falling back to the alternate name, then the slug.
    pub display_name: String,
    /// Stable identifier used for file and directory names.
    pub slug: String,
    /// Normalized cover art. `None` when the page has no cover or the cover
    /// could not be fetched.
    pub cover: Option<ImageAsset>,
    /// Volume label → chapters in discovery order.
    pub chapters_by_volume: BTreeMap<String, Vec<ChapterRef>>,
}

/// A single page of a chapter with its mirror candidates.
///
/// `candidate_urls` are alternate servers for the same image; the first one
/// that downloads and verifies wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpec {
    #[serde(rename = "index")]
    pub page_index: u32,
    #[serde(rename = "urls")]
    pub candidate_urls: Vec<String>,
}

/// The pages of one chapter, ascending by `page_index`.
pub type ChapterContent = Vec<PageSpec>;

/// A normalized image whose pixel dimensions are known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub local_path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Parse a chapter index or volume label as a finite number.
pub fn parse_index(value: &str) -> Result<f64, MangaPdfError> {
    match value.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(MangaPdfError::MalformedIndex {
            value: value.to_string(),
        }),
    }
}

/// Sort chapters ascending by numeric index; equal indices keep discovery
/// order.
///
/// Every index is validated before anything moves, so a malformed entry
/// leaves `chapters` untouched.
pub fn sort_chapters(chapters: &mut [ChapterRef]) -> Result<(), MangaPdfError> {
    let keys = chapters
        .iter()
        .map(|c| parse_index(&c.index))
        .collect::<Result<Vec<_>, _>>()?;

    let mut keyed: Vec<(f64, ChapterRef)> = keys.into_iter().zip(chapters.iter().cloned()).collect();
    keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    for (slot, (_, chapter)) in chapters.iter_mut().zip(keyed) {
        *slot = chapter;
    }
    Ok(())
}

/// Sort volume labels ascending by their numeric interpretation.
pub fn sort_volume_labels(labels: &mut Vec<String>) -> Result<(), MangaPdfError> {
    let mut keyed = labels
        .drain(..)
        .map(|label| parse_index(&label).map(|n| (n, label)))
        .collect::<Result<Vec<_>, _>>()?;
    keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    labels.extend(keyed.into_iter().map(|(_, label)| label));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(index: &str, name: &str) -> ChapterRef {
        ChapterRef {
            name: name.into(),
            index: index.into(),
            volume: "1".into(),
        }
    }

    #[test]
    fn numeric_order_ignores_string_padding() {
        let mut chapters = vec![
            chapter("10", "ten"),
            chapter("2", "two"),
            chapter("02.5", "two and a half"),
            chapter("1", "one"),
        ];
        sort_chapters(&mut chapters).unwrap();
        let order: Vec<&str> = chapters.iter().map(|c| c.index.as_str()).collect();
        assert_eq!(order, vec!["1", "2", "02.5", "10"]);
    }

    #[test]
    fn ties_keep_discovery_order() {
        let mut chapters = vec![
            chapter("3", "first"),
            chapter("1", "a"),
            chapter("3.0", "second"),
            chapter("03", "third"),
        ];
        sort_chapters(&mut chapters).unwrap();
        let names: Vec<&str> = chapters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "first", "second", "third"]);
    }

    #[test]
    fn malformed_index_leaves_input_untouched() {
        let mut chapters = vec![chapter("2", "b"), chapter("x1", "bad"), chapter("1", "a")];
        let before = chapters.clone();
        let err = sort_chapters(&mut chapters).unwrap_err();
        assert!(matches!(err, MangaPdfError::MalformedIndex { ref value } if value == "x1"));
        assert_eq!(chapters, before);
    }

    #[test]
    fn non_finite_index_is_malformed() {
        assert!(parse_index("NaN").is_err());
        assert!(parse_index("inf").is_err());
        assert!(parse_index("").is_err());
        assert_eq!(parse_index(" 4.5 ").unwrap(), 4.5);
    }

    #[test]
    fn volume_labels_sort_numerically() {
        let mut labels = vec!["10".to_string(), "2".into(), "1".into(), "1.5".into()];
        sort_volume_labels(&mut labels).unwrap();
        assert_eq!(labels, vec!["1", "1.5", "2", "10"]);
    }

    #[test]
    fn page_spec_decodes_projection_shape() {
        let json = r#"[{"index":1,"urls":["https://a/x.png","https://b/x.png"]}]"#;
        let pages: ChapterContent = serde_json::from_str(json).unwrap();
        assert_eq!(pages[0].page_index, 1);
        assert_eq!(pages[0].candidate_urls.len(), 2);
    }
}
