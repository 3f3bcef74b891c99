//! Pipeline stages for turning a MangaLib volume into a PDF.
//!
//! Each submodule implements one step. The orchestration (which chapter,
//! in what order, what fails the run) lives in [`crate::convert`].
//!
//! ## Data Flow
//!
//! ```text
//! URL ──▶ cache ──▶ extract ──▶ acquire ──▶ normalize ──▶ layout ──▶ pdf
//!        (md5 key)  (QuickJS)   (mirrors,   (parallel,    (sheets)  (printpdf,
//!                               sequential) ordered)                 atomic)
//! ```
//!
//! 1. [`fetch`]: one configured HTTP client; non-2xx is an error
//! 2. [`cache`]: series and chapter HTML, keyed by URL digest
//! 3. [`extract`]: run the page's bootstrap scripts in a fresh sandbox and
//!    decode a fixed projection; runs in `spawn_blocking`
//! 4. [`acquire`]: download each page from the first mirror that works,
//!    verified and marked done
//! 5. [`normalize`]: JPEG re-encode + dimension query through [`tool`]
//! 6. [`layout`]: title sheet and contained, centred image sheets; title
//!    lines wrap by the [`font`] glyph advances
//! 7. [`pdf`]: render the layout and rename it into place

pub mod acquire;
pub mod cache;
pub mod extract;
pub mod fetch;
pub mod font;
pub mod layout;
pub mod normalize;
pub mod pdf;
pub mod tool;
