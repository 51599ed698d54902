//! Natural-language fallback for text the deterministic parsers miss.
//!
//! - [`NluAdapter`] is the seam to an external extraction/classification
//!   service. Any call may fail or hang.
//! - [`HeuristicNlu`] answers every operation deterministically from keyword
//!   tables. It is the fallback and the default adapter.
//! - [`GuardedNlu`] wraps an adapter with a timeout and falls back to the
//!   heuristics on error, so the flow never sees an NLU failure.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use partsbot_core::config::NluConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::keywords::{contains_words, normalize_name};
use crate::size::{self, TireSize, WidthMatch, MAX_WIDTH, MIN_WIDTH};

/// Errors from an NLU service call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NluError {
    #[error("NLU call timed out after {0} ms")]
    Timeout(u64),
    #[error("NLU service error: {0}")]
    Service(String),
}

// =============================================================================
// Motor position
// =============================================================================

/// Which wheel a tire is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorPosition {
    Front,
    Rear,
}

impl MotorPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotorPosition::Front => "front",
            MotorPosition::Rear => "rear",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "front" => Some(MotorPosition::Front),
            "rear" => Some(MotorPosition::Rear),
            _ => None,
        }
    }

    /// Customer-facing label.
    pub fn label(&self) -> &'static str {
        match self {
            MotorPosition::Front => "Depan",
            MotorPosition::Rear => "Belakang",
        }
    }
}

impl fmt::Display for MotorPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static FRONT_WORDS: &[&str] = &["depan", "front", "dpn"];
static REAR_WORDS: &[&str] = &["belakang", "rear", "blkg", "back"];

/// Find a wheel-position keyword in free text.
///
/// When both appear the first one mentioned wins.
pub fn detect_position(text: &str) -> Option<MotorPosition> {
    let normalized = normalize_name(text);
    normalized.split(' ').find_map(|token| {
        if FRONT_WORDS.contains(&token) {
            Some(MotorPosition::Front)
        } else if REAR_WORDS.contains(&token) {
            Some(MotorPosition::Rear)
        } else {
            None
        }
    })
}

// =============================================================================
// Size recommendation
// =============================================================================

/// Sizes suggested for a motorbike wheel: the stock size and one size up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeRecommendation {
    pub standard: TireSize,
    pub upsize: TireSize,
}

impl SizeRecommendation {
    /// Derive the upsize from a single stock size (width + 10).
    pub fn from_standard(standard: TireSize) -> Self {
        Self {
            standard,
            upsize: TireSize::new(
                standard.width.saturating_add(10),
                standard.aspect,
                standard.ring,
            ),
        }
    }

    pub fn sizes(&self) -> [TireSize; 2] {
        [self.standard, self.upsize]
    }
}

// =============================================================================
// Adapter trait
// =============================================================================

/// An external language-understanding service.
///
/// Every operation is text in, value-or-none out. Implementations report
/// transport or parse failures as [`NluError`]; callers are expected to go
/// through [`GuardedNlu`] rather than surfacing them.
#[async_trait]
pub trait NluAdapter: Send + Sync {
    /// Tire width mentioned in the text.
    async fn extract_width(&self, text: &str) -> Result<Option<u16>, NluError>;

    /// Ring size mentioned in the text.
    async fn extract_ring(&self, text: &str) -> Result<Option<u16>, NluError>;

    /// Whether the text names a motorbike (model or brand).
    async fn is_motorcycle_related(&self, text: &str) -> Result<bool, NluError>;

    /// Whether the customer says they don't know what they need.
    async fn is_confused(&self, text: &str) -> Result<bool, NluError>;

    async fn is_greeting(&self, text: &str) -> Result<bool, NluError>;

    /// A complete tire size the customer probably means.
    async fn extract_size(&self, text: &str) -> Result<Option<TireSize>, NluError>;

    /// Stock and upsize tire for a motorbike wheel.
    async fn recommend_sizes(
        &self,
        motor_type: &str,
        position: MotorPosition,
    ) -> Result<SizeRecommendation, NluError>;
}

// =============================================================================
// Heuristics
// =============================================================================

static MOTOR_KEYWORDS: &[&str] = &[
    // Honda
    "honda", "beat", "vario", "scoopy", "genio", "pcx", "adv", "supra", "revo", "blade",
    "sonic", "cbr", "cb150r", "verza", "megapro", "tiger", "spacy",
    // Yamaha
    "yamaha", "mio", "nmax", "aerox", "lexi", "fino", "xeon", "jupiter", "vega", "vixion",
    "r15", "byson", "xmax", "xride", "fazzio",
    // Suzuki
    "suzuki", "satria", "nex", "address", "spin", "smash", "shogun", "skywave",
    // Kawasaki and others
    "kawasaki", "ninja", "klx", "dtracker", "w175", "vespa", "tvs",
];

static GREETINGS: &[&str] = &[
    "halo", "hallo", "helo", "hai", "hi", "hello", "hey", "pagi", "siang", "sore", "malam",
    "assalamualaikum", "permisi", "selamat",
];

static CONFUSION_PHRASES: &[&str] = &[
    "bingung",
    "tidak tahu",
    "tidak tau",
    "gak tau",
    "gak tahu",
    "ga tau",
    "ga tahu",
    "nggak tahu",
    "ngga tau",
    "kurang tahu",
    "tidak yakin",
    "ga yakin",
    "gak yakin",
    "gimana",
    "bagaimana",
    "not sure",
    "dont know",
    "help",
];

// Ring sizes spelled out in Indonesian, longest phrases first
static RING_NUMERALS: &[(&str, u16)] = &[
    ("delapan belas", 18),
    ("tujuh belas", 17),
    ("enam belas", 16),
    ("lima belas", 15),
    ("empat belas", 14),
    ("tiga belas", 13),
    ("dua belas", 12),
    ("sebelas", 11),
    ("sepuluh", 10),
];

static SPACED_SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\D)(\d{2,3})\s+(\d{2,3})\s+(\d{2})(?:\D|$)").expect("Invalid spaced size regex")
});

static WIDTH_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:lebar|width|ukuran)\s*(\d{2,3})(?:\D|$)").expect("Invalid width phrase regex")
});

/// Deterministic keyword-table implementation of every NLU operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicNlu;

impl HeuristicNlu {
    pub fn new() -> Self {
        Self
    }

    pub fn width(&self, text: &str) -> Option<u16> {
        if let Some(WidthMatch::Width(w)) = size::recognize_width_only(text) {
            return Some(w);
        }
        WIDTH_PHRASE_RE
            .captures(text)
            .and_then(|c| c[1].parse::<u16>().ok())
            .filter(|w| (MIN_WIDTH..=MAX_WIDTH).contains(w))
    }

    pub fn ring(&self, text: &str) -> Option<u16> {
        if let Some(ring) = size::extract_ring(text) {
            return Some(ring);
        }
        let normalized = normalize_name(text);
        RING_NUMERALS
            .iter()
            .find(|(phrase, _)| contains_words(&normalized, phrase))
            .map(|(_, ring)| *ring)
    }

    pub fn motorcycle_related(&self, text: &str) -> bool {
        let normalized = normalize_name(text);
        normalized
            .split(' ')
            .any(|token| MOTOR_KEYWORDS.contains(&token))
    }

    pub fn confused(&self, text: &str) -> bool {
        let normalized = normalize_name(text);
        CONFUSION_PHRASES
            .iter()
            .any(|phrase| contains_words(&normalized, phrase))
    }

    /// A greeting is a short message opening with a greeting word.
    pub fn greeting(&self, text: &str) -> bool {
        let normalized = normalize_name(text);
        let mut tokens = normalized.split(' ');
        let opens_with_greeting = tokens
            .next()
            .map(|first| GREETINGS.contains(&first))
            .unwrap_or(false);
        opens_with_greeting && normalized.split(' ').count() <= 4
    }

    pub fn size(&self, text: &str) -> Option<TireSize> {
        if let Some(s) = size::recognize_complete(text) {
            return Some(s);
        }
        let caps = SPACED_SIZE_RE.captures(text)?;
        Some(TireSize::new(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        ))
    }

    /// Fixed front/rear table for everyday scooters.
    pub fn recommendation(&self, position: MotorPosition) -> SizeRecommendation {
        match position {
            MotorPosition::Front => SizeRecommendation {
                standard: TireSize::new(70, 90, 14),
                upsize: TireSize::new(80, 90, 14),
            },
            MotorPosition::Rear => SizeRecommendation {
                standard: TireSize::new(80, 90, 14),
                upsize: TireSize::new(90, 90, 14),
            },
        }
    }
}

#[async_trait]
impl NluAdapter for HeuristicNlu {
    async fn extract_width(&self, text: &str) -> Result<Option<u16>, NluError> {
        Ok(self.width(text))
    }

    async fn extract_ring(&self, text: &str) -> Result<Option<u16>, NluError> {
        Ok(self.ring(text))
    }

    async fn is_motorcycle_related(&self, text: &str) -> Result<bool, NluError> {
        Ok(self.motorcycle_related(text))
    }

    async fn is_confused(&self, text: &str) -> Result<bool, NluError> {
        Ok(self.confused(text))
    }

    async fn is_greeting(&self, text: &str) -> Result<bool, NluError> {
        Ok(self.greeting(text))
    }

    async fn extract_size(&self, text: &str) -> Result<Option<TireSize>, NluError> {
        Ok(self.size(text))
    }

    async fn recommend_sizes(
        &self,
        _motor_type: &str,
        position: MotorPosition,
    ) -> Result<SizeRecommendation, NluError> {
        Ok(self.recommendation(position))
    }
}

// =============================================================================
// Guard
// =============================================================================

/// Timeout-and-fallback wrapper around an [`NluAdapter`].
///
/// Every method returns a plain value: on error or timeout the call is
/// answered by [`HeuristicNlu`] and a warning is logged.
#[derive(Clone)]
pub struct GuardedNlu {
    inner: Arc<dyn NluAdapter>,
    fallback: HeuristicNlu,
    timeout: Duration,
    enabled: bool,
}

impl GuardedNlu {
    pub fn new(inner: Arc<dyn NluAdapter>, config: &NluConfig) -> Self {
        Self {
            inner,
            fallback: HeuristicNlu::new(),
            timeout: Duration::from_millis(config.timeout_ms),
            enabled: config.enabled,
        }
    }

    /// Heuristics only, no external service.
    pub fn heuristic() -> Self {
        Self::new(Arc::new(HeuristicNlu::new()), &NluConfig::default())
    }

    async fn guard<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, NluError>>,
        fallback: impl FnOnce() -> T,
    ) -> T {
        if !self.enabled {
            return fallback();
        }
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!(op, error = %e, "NLU call failed, using heuristics");
                fallback()
            }
            Err(_) => {
                warn!(
                    op,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "NLU call timed out, using heuristics"
                );
                fallback()
            }
        }
    }

    pub async fn extract_width(&self, text: &str) -> Option<u16> {
        self.guard("extract_width", self.inner.extract_width(text), || {
            self.fallback.width(text)
        })
        .await
    }

    pub async fn extract_ring(&self, text: &str) -> Option<u16> {
        self.guard("extract_ring", self.inner.extract_ring(text), || {
            self.fallback.ring(text)
        })
        .await
    }

    pub async fn is_motorcycle_related(&self, text: &str) -> bool {
        self.guard(
            "is_motorcycle_related",
            self.inner.is_motorcycle_related(text),
            || self.fallback.motorcycle_related(text),
        )
        .await
    }

    pub async fn is_confused(&self, text: &str) -> bool {
        self.guard("is_confused", self.inner.is_confused(text), || {
            self.fallback.confused(text)
        })
        .await
    }

    pub async fn is_greeting(&self, text: &str) -> bool {
        self.guard("is_greeting", self.inner.is_greeting(text), || {
            self.fallback.greeting(text)
        })
        .await
    }

    pub async fn extract_size(&self, text: &str) -> Option<TireSize> {
        self.guard("extract_size", self.inner.extract_size(text), || {
            self.fallback.size(text)
        })
        .await
    }

    pub async fn recommend_sizes(
        &self,
        motor_type: &str,
        position: MotorPosition,
    ) -> SizeRecommendation {
        let rec = self
            .guard(
                "recommend_sizes",
                self.inner.recommend_sizes(motor_type, position),
                || self.fallback.recommendation(position),
            )
            .await;
        debug!(motor_type, position = %position, standard = %rec.standard, "Size recommendation");
        rec
    }
}
