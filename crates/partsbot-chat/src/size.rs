//! Tire size recognition.
//!
//! Motorbike tire sizes are written `width/aspect-ring` (e.g. `80/90-14`).
//! Customers type them in many shapes: embedded in a sentence, with spaces,
//! with `-` and `/` swapped, or without the ring. Each recognizer here
//! handles one shape; the flow tries them in order complete, incomplete,
//! width-only.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Smallest width accepted as a bare number.
pub const MIN_WIDTH: u16 = 60;
/// Largest width accepted as a bare number.
pub const MAX_WIDTH: u16 = 140;

// =============================================================================
// Patterns
// =============================================================================

static COMPLETE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\D)(\d{2,3})\s*[/-]\s*(\d{2,3})\s*(?:[/-]|[rR])\s*(\d{2})(?:\D|$)")
        .expect("Invalid complete size regex")
});

static INCOMPLETE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\D)(\d{2,3})\s*/\s*(\d{2,3})(?:\D|$)").expect("Invalid incomplete size regex")
});

static RING_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:ring|r)\s*(\d{2})(?:\D|$)").expect("Invalid ring phrase regex")
});

static WIDTH_ONLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:ban\s+)?(\d{2,3})\s*$").expect("Invalid width regex")
});

static RING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\s*(\d{2})\s*$",
        r"(?i)\bring\s*(\d{2})(?:\D|$)",
        // Bare "r14" only on its own; "R15" inside a sentence is a model name
        r"(?i)^\s*r\s*(\d{2})\s*$",
        r"^\s*-\s*(\d{2})\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid ring regex"))
    .collect()
});

// =============================================================================
// Types
// =============================================================================

/// A complete tire size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TireSize {
    pub width: u16,
    pub aspect: u16,
    pub ring: u16,
}

impl TireSize {
    pub fn new(width: u16, aspect: u16, ring: u16) -> Self {
        Self {
            width,
            aspect,
            ring,
        }
    }
}

impl fmt::Display for TireSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}-{}", self.width, self.aspect, self.ring)
    }
}

/// A size typed without its ring, e.g. `80/90`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSize {
    pub width: u16,
    pub aspect: u16,
    /// Filled when the ring was given as a separate phrase ("ring 14").
    pub ring: Option<u16>,
}

impl PartialSize {
    /// The complete size, when the ring is known.
    pub fn complete(&self) -> Option<TireSize> {
        self.ring
            .map(|ring| TireSize::new(self.width, self.aspect, ring))
    }
}

/// Outcome of looking for a bare width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WidthMatch {
    /// A width inside the accepted range.
    Width(u16),
    /// A bare number outside the accepted range.
    OutOfRange(u16),
}

// =============================================================================
// Recognizers
// =============================================================================

/// Recognize a complete `width/aspect-ring` size anywhere in the text.
pub fn recognize_complete(text: &str) -> Option<TireSize> {
    let caps = COMPLETE_RE.captures(text)?;
    Some(TireSize::new(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    ))
}

/// Recognize a `width/aspect` size whose ring is missing from the token.
///
/// Returns `None` when the text already holds a complete size.
pub fn recognize_incomplete(text: &str) -> Option<PartialSize> {
    if recognize_complete(text).is_some() {
        return None;
    }
    let caps = INCOMPLETE_RE.captures(text)?;
    let whole = caps.get(0)?;
    let remainder = format!("{} {}", &text[..whole.start()], &text[whole.end()..]);
    let ring = RING_PHRASE_RE
        .captures(&remainder)
        .and_then(|c| c[1].parse().ok());
    Some(PartialSize {
        width: caps[1].parse().ok()?,
        aspect: caps[2].parse().ok()?,
        ring,
    })
}

/// Recognize a message that is only a width ("80", "ban 100").
pub fn recognize_width_only(text: &str) -> Option<WidthMatch> {
    let caps = WIDTH_ONLY_RE.captures(text)?;
    let width: u16 = caps[1].parse().ok()?;
    if (MIN_WIDTH..=MAX_WIDTH).contains(&width) {
        Some(WidthMatch::Width(width))
    } else {
        Some(WidthMatch::OutOfRange(width))
    }
}

/// Canonical `width/aspect-ring` form of a size, tolerant of mixed separators.
pub fn normalize(text: &str) -> Option<String> {
    recognize_complete(text).map(|s| s.to_string())
}

/// Pull a ring from an answer to "which ring?" ("14", "ring 14", "r14", "-14").
pub fn extract_ring(text: &str) -> Option<u16> {
    RING_PATTERNS
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps[1].parse().ok())
}

/// Whether a string looks like a tire size, complete or not.
pub fn looks_like_size(text: &str) -> bool {
    recognize_complete(text).is_some() || INCOMPLETE_RE.is_match(text)
}
