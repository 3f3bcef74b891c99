//! External image tool: identify, re-encode and dimension queries.
//!
//! The tool is a black box driven through argument vectors. A non-zero exit
//! is a soft failure (`Ok(None)` from [`ImageTool::run`]); only a tool that
//! cannot be started at all is an error. Callers decide what a soft failure
//! means for them.
//!
//! ```text
//! identify <path>                      exit 0 ⇒ valid image
//! <src>[0] -quality <q> <dst>          re-encode first frame
//! identify -format %wx%h <path>        stdout "<w>x<h>"
//! ```

use crate::error::MangaPdfError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::debug;

/// Environment variable naming the ImageMagick binary.
pub const MAGICK_ENV: &str = "MANGALIB_MAGICK";

/// A subprocess-like image tool.
#[async_trait]
pub trait ImageTool: Send + Sync {
    /// Short name for logs and `Debug` output.
    fn name(&self) -> &str;

    /// Run the tool with `args`.
    ///
    /// Returns `Some(stdout)` on exit status 0 and `None` on any other exit.
    async fn run(&self, args: &[OsString]) -> Result<Option<String>, MangaPdfError>;
}

/// ImageMagick 7 (`magick`) invoked as a child process.
#[derive(Debug, Clone)]
pub struct Magick {
    program: PathBuf,
}

impl Magick {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `$MANGALIB_MAGICK`, or `magick` resolved through `PATH`.
    pub fn from_env() -> Self {
        match std::env::var_os(MAGICK_ENV) {
            Some(p) if !p.is_empty() => Self::new(p),
            _ => Self::new("magick"),
        }
    }
}

#[async_trait]
impl ImageTool for Magick {
    fn name(&self) -> &str {
        self.program.to_str().unwrap_or("magick")
    }

    async fn run(&self, args: &[OsString]) -> Result<Option<String>, MangaPdfError> {
        let output = tokio::process::Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| MangaPdfError::ToolUnavailable {
                program: self.program.display().to_string(),
                source: e,
            })?;

        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
        } else {
            debug!(
                "{} {:?} exited with {}: {}",
                self.program.display(),
                args,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            Ok(None)
        }
    }
}

fn argv<I, S>(parts: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    parts.into_iter().map(|p| p.as_ref().to_os_string()).collect()
}

/// `identify <path>`: `true` when the tool recognises the file as an image.
pub async fn identify(tool: &dyn ImageTool, path: &Path) -> Result<bool, MangaPdfError> {
    let ok = tool
        .run(&argv([OsStr::new("identify"), path.as_os_str()]))
        .await?
        .is_some();
    debug!("identify {} → {}", path.display(), ok);
    Ok(ok)
}

/// Re-encode the first frame of `src` into `dst` at `quality`.
pub async fn convert_first_frame(
    tool: &dyn ImageTool,
    src: &Path,
    dst: &Path,
    quality: u8,
) -> Result<bool, MangaPdfError> {
    let mut first_frame = src.as_os_str().to_os_string();
    first_frame.push("[0]");
    let quality = quality.to_string();
    let args = argv([
        first_frame.as_os_str(),
        OsStr::new("-quality"),
        OsStr::new(&quality),
        dst.as_os_str(),
    ]);
    Ok(tool.run(&args).await?.is_some())
}

/// Pixel dimensions of `path` as `(width, height)`.
pub async fn dimensions(tool: &dyn ImageTool, path: &Path) -> Result<(u32, u32), MangaPdfError> {
    let args = argv([
        OsStr::new("identify"),
        OsStr::new("-format"),
        OsStr::new("%wx%h"),
        path.as_os_str(),
    ]);
    let stdout = tool
        .run(&args)
        .await?
        .ok_or_else(|| MangaPdfError::DimensionsUnavailable {
            path: path.to_path_buf(),
        })?;

    parse_dimensions(&stdout).ok_or_else(|| MangaPdfError::BadDimensions {
        path: path.to_path_buf(),
        output: stdout,
    })
}

static DIMENSIONS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)x(\d+)\s*$").expect("valid regex"));

/// Parse `"<width>x<height>"`. Zero or overflowing values are rejected.
pub fn parse_dimensions(output: &str) -> Option<(u32, u32)> {
    let caps = DIMENSIONS_RE.captures(output)?;
    let w: u32 = caps[1].parse().ok()?;
    let h: u32 = caps[2].parse().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every argument vector and answers from a fixed script.
    struct Recorder {
        calls: Mutex<Vec<Vec<String>>>,
        reply: Option<String>,
    }

    #[async_trait]
    impl ImageTool for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn run(&self, args: &[OsString]) -> Result<Option<String>, MangaPdfError> {
            self.calls.lock().unwrap().push(
                args.iter()
                    .map(|a| a.to_string_lossy().into_owned())
                    .collect(),
            );
            Ok(self.reply.clone())
        }
    }

    fn recorder(reply: Option<&str>) -> Recorder {
        Recorder {
            calls: Mutex::new(Vec::new()),
            reply: reply.map(str::to_string),
        }
    }

    #[test]
    fn parses_plain_dimensions() {
        assert_eq!(parse_dimensions("800x1200"), Some((800, 1200)));
        assert_eq!(parse_dimensions(" 800x1200\n"), Some((800, 1200)));
    }

    #[test]
    fn rejects_malformed_dimensions() {
        assert_eq!(parse_dimensions(""), None);
        assert_eq!(parse_dimensions("800 x 1200"), None);
        assert_eq!(parse_dimensions("0x1200"), None);
        assert_eq!(parse_dimensions("800x1200800x1200x"), None);
        assert_eq!(parse_dimensions("99999999999x1"), None);
    }

    #[tokio::test]
    async fn convert_targets_first_frame() {
        let tool = recorder(Some(""));
        let ok = convert_first_frame(&tool, Path::new("/t/3.gif"), Path::new("/t/3.gif.jpg"), 75)
            .await
            .unwrap();
        assert!(ok);
        let calls = tool.calls.lock().unwrap();
        assert_eq!(calls[0], vec!["/t/3.gif[0]", "-quality", "75", "/t/3.gif.jpg"]);
    }

    #[tokio::test]
    async fn identify_maps_exit_status_to_bool() {
        assert!(identify(&recorder(Some("")), Path::new("/a")).await.unwrap());
        assert!(!identify(&recorder(None), Path::new("/a")).await.unwrap());
    }

    #[tokio::test]
    async fn dimension_query_errors() {
        let err = dimensions(&recorder(None), Path::new("/a.jpg")).await.unwrap_err();
        assert!(matches!(err, MangaPdfError::DimensionsUnavailable { .. }));

        let err = dimensions(&recorder(Some("JPEG")), Path::new("/a.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, MangaPdfError::BadDimensions { ref output, .. } if output == "JPEG"));

        let tool = recorder(Some("640x480"));
        assert_eq!(dimensions(&tool, Path::new("/a.jpg")).await.unwrap(), (640, 480));
        assert_eq!(
            tool.calls.lock().unwrap()[0],
            vec!["identify", "-format", "%wx%h", "/a.jpg"]
        );
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let tool = Magick::new("/nonexistent/bin/magick-test");
        let err = tool.run(&argv(["identify", "/x"])).await.unwrap_err();
        assert!(matches!(err, MangaPdfError::ToolUnavailable { .. }));
    }
}
