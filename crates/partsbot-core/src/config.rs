use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PartsbotError, Result};
use crate::types::{
    MAX_CAROUSEL_ELEMENTS, MAX_PAYLOAD_LEN, MAX_QUICK_REPLIES, MAX_TITLE_CHARS,
};

/// Top-level configuration for the partsbot assistant.
///
/// Loaded from `~/.partsbot/config.toml` by default. Every section falls back
/// to its defaults when omitted, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartsbotConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub nlu: NluConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl PartsbotConfig {
    /// Parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PartsbotConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// [`load`](Self::load), or the defaults when the file is missing or
    /// rejected. A missing file is normal on first run; a rejected one is
    /// logged as a warning.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Config rejected, using defaults");
                Self::default()
            }
        }
    }

    /// Reject values that would leave the engine unable to reply.
    pub fn validate(&self) -> Result<()> {
        let zero = |field: &str| -> Result<()> {
            Err(PartsbotError::Config(format!("{field} must be greater than 0")))
        };
        if self.session.timeout_minutes == 0 {
            return zero("session.timeout_minutes");
        }
        let m = &self.messaging;
        for (field, value) in [
            ("messaging.max_quick_replies", m.max_quick_replies),
            ("messaging.max_carousel_elements", m.max_carousel_elements),
            ("messaging.max_title_chars", m.max_title_chars),
            ("messaging.max_payload_len", m.max_payload_len),
            ("messaging.results_page_size", m.results_page_size),
            ("messaging.max_message_chars", m.max_message_chars),
        ] {
            if value == 0 {
                return zero(field);
            }
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Session lifetime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity timeout after which a session is evicted wholesale.
    pub timeout_minutes: u32,
    /// How often the background sweep looks for expired sessions.
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: 24 * 60,
            sweep_interval_secs: 300,
        }
    }
}

/// Messaging-platform limits and page sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Quick replies allowed on a single message.
    pub max_quick_replies: usize,
    /// Cards allowed in a single carousel.
    pub max_carousel_elements: usize,
    /// Characters allowed in a button title.
    pub max_title_chars: usize,
    /// Bytes allowed in a button payload.
    pub max_payload_len: usize,
    /// Items shown per result page (one carousel).
    pub results_page_size: usize,
    /// Longest inbound text accepted before truncation.
    pub max_message_chars: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            max_quick_replies: MAX_QUICK_REPLIES,
            max_carousel_elements: MAX_CAROUSEL_ELEMENTS,
            max_title_chars: MAX_TITLE_CHARS,
            max_payload_len: MAX_PAYLOAD_LEN,
            results_page_size: 10,
            max_message_chars: 2000,
        }
    }
}

/// External language-understanding service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NluConfig {
    /// When false, only the deterministic heuristics are used.
    pub enabled: bool,
    /// Per-call timeout before falling back to heuristics.
    pub timeout_ms: u64,
}

impl Default for NluConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 3000,
        }
    }
}

/// Storefront details shown in the checkout summary and help text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub name: String,
    pub support_whatsapp: String,
    pub address: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "Ban888 Auto Parts".to_string(),
            support_whatsapp: "+628123456789".to_string(),
            address: "Jl. Ikan Nila V No. 30, Bumi Waras, Bandar Lampung".to_string(),
        }
    }
}

/// Catalog source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Path to a JSON array of catalog items.
    pub path: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: "~/.partsbot/catalog.json".to_string(),
        }
    }
}
