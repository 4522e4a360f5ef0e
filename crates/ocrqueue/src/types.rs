//! Value types shared by the queue, the engines and callers.

use ahash::AHasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Compute a 16 hex digit hash of arbitrary bytes.
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = AHasher::default();
    data.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Content identity of a processed image.
///
/// Two renderings of the same page with the same transforms must produce the
/// same `ImageId`; the queue never looks at pixels itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identity derived from the encoded image bytes.
    pub fn from_content(bytes: &[u8]) -> Self {
        Self(compute_hash(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of an OCR engine: name plus version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineId {
    pub name: String,
    pub version: String,
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Engine quality/speed trade-off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrMode {
    Fast,
    Best,
    #[default]
    Default,
}

impl std::str::FromStr for OcrMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(OcrMode::Fast),
            "best" => Ok(OcrMode::Best),
            "default" => Ok(OcrMode::Default),
            other => Err(format!("Invalid OCR mode: {}", other)),
        }
    }
}

/// Parameters handed to the engine. Part of the request identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OcrParams {
    /// Engine language code, e.g. "eng" or "eng+deu"
    pub language_code: String,

    #[serde(default)]
    pub mode: OcrMode,

    /// Engine-side time limit in seconds (None = unlimited)
    #[serde(default)]
    pub timeout_secs: Option<u32>,
}

impl OcrParams {
    pub fn new(language_code: impl Into<String>, mode: OcrMode, timeout_secs: Option<u32>) -> Self {
        Self {
            language_code: language_code.into(),
            mode,
            timeout_secs,
        }
    }
}

impl Default for OcrParams {
    fn default() -> Self {
        Self::new("eng", OcrMode::Default, None)
    }
}

/// Scheduling class of a caller's interest in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrPriority {
    /// The user is looking at the page right now
    Foreground,
    /// Batch work such as OCR-on-scan
    Background,
}

/// Axis-aligned box in image pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }
}

/// A single recognised word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResultElement {
    pub text: String,
    pub language_code: String,
    #[serde(default)]
    pub right_to_left: bool,
    pub bounds: BoundingBox,
    /// Engine confidence, 0.0-100.0
    pub confidence: f64,
    /// Index of the text line this word belongs to
    #[serde(default)]
    pub line: u32,
}

/// Recognised text of one page image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub page_bounds: BoundingBox,
    pub elements: Vec<OcrResultElement>,
    #[serde(default)]
    pub right_to_left: bool,
}

impl OcrResult {
    pub fn new(page_bounds: BoundingBox, elements: Vec<OcrResultElement>, right_to_left: bool) -> Self {
        Self {
            page_bounds,
            elements,
            right_to_left,
        }
    }

    /// Plain text with words joined by spaces and lines by newlines.
    pub fn text(&self) -> String {
        let mut out = String::new();
        let mut current_line = None;
        for element in &self.elements {
            match current_line {
                Some(line) if line == element.line => out.push(' '),
                Some(_) => out.push('\n'),
                None => {}
            }
            out.push_str(&element.text);
            current_line = Some(element.line);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}
