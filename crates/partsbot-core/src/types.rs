use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MessagingConfig;
use crate::error::{PartsbotError, Result};

// =============================================================================
// Platform limits
// =============================================================================

/// Quick replies the messaging platform accepts on one message.
pub const MAX_QUICK_REPLIES: usize = 13;
/// Cards the messaging platform accepts in one carousel.
pub const MAX_CAROUSEL_ELEMENTS: usize = 10;
/// Characters shown in a button title before the platform cuts it off.
pub const MAX_TITLE_CHARS: usize = 20;
/// Bytes the platform accepts in a button payload.
pub const MAX_PAYLOAD_LEN: usize = 1000;

// =============================================================================
// Enums
// =============================================================================

/// Product category sold by the shop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Motorcycle tires, looked up by size.
    #[serde(rename = "ban")]
    Tire,
    /// Engine oil, looked up by pack size.
    #[serde(rename = "oli")]
    Oil,
    /// Lamps and bulbs, looked up by type.
    #[serde(rename = "lampu")]
    Lamp,
    /// Paint, looked up by color.
    #[serde(rename = "cat")]
    Paint,
}

impl Category {
    /// Every category in menu order.
    pub const ALL: [Category; 4] = [
        Category::Tire,
        Category::Oil,
        Category::Lamp,
        Category::Paint,
    ];

    /// The keyword customers type for this category.
    pub fn keyword(&self) -> &'static str {
        match self {
            Category::Tire => "ban",
            Category::Oil => "oli",
            Category::Lamp => "lampu",
            Category::Paint => "cat",
        }
    }

    /// Parse a category keyword (case-insensitive).
    pub fn from_keyword(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        Category::ALL.into_iter().find(|c| c.keyword() == s)
    }

    /// Label used on category menu buttons.
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Tire => "🛞 Ban",
            Category::Oil => "🛢️ Oli",
            Category::Lamp => "💡 Lampu",
            Category::Paint => "🎨 Cat",
        }
    }

    /// Placeholder image for items without their own picture.
    pub fn default_image(&self) -> &'static str {
        match self {
            Category::Tire => "https://picsum.photos/300/200?random=1",
            Category::Oil => "https://picsum.photos/300/200?random=2",
            Category::Lamp => "https://picsum.photos/300/200?random=3",
            Category::Paint => "https://picsum.photos/300/200?random=4",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

// =============================================================================
// Newtype Wrappers
// =============================================================================

/// Messaging-platform user identifier (page-scoped sender id).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unix timestamp in seconds since epoch.
///
/// Compared by value. Two Timestamps with the same inner value are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }

    /// Seconds elapsed between this timestamp and `now`.
    pub fn seconds_until(&self, now: Timestamp) -> i64 {
        now.0 - self.0
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A read-only catalog entry as supplied by the catalog backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    pub category: Category,
    /// Size for tires, type for lamps, pack size for oil.
    #[serde(default)]
    pub size_spec: Option<String>,
    /// Selling price in rupiah.
    #[serde(default)]
    pub price: Option<u64>,
    /// List price in rupiah.
    #[serde(default)]
    pub list_price: Option<u64>,
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub specifications: Option<String>,
}

impl CatalogItem {
    /// One-line subtitle for carousel cards.
    pub fn subtitle(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(ref brand) = self.brand {
            parts.push(brand.clone());
        }
        if let Some(ref spec) = self.specifications {
            parts.push(spec.clone());
        }
        if let Some(price) = self.price {
            parts.push(format_rupiah(price));
        }
        if parts.is_empty() {
            "Informasi produk".to_string()
        } else {
            parts.join(" • ")
        }
    }

    /// Multi-line description shown when a customer taps "Detail".
    pub fn detail_text(&self) -> String {
        let mut detail = format!("📦 {}\n\n", self.name);
        if let Some(ref brand) = self.brand {
            detail.push_str(&format!("🏷️ Merk: {}\n", brand));
        }
        if let Some(ref size) = self.size_spec {
            detail.push_str(&format!("📏 Ukuran/Tipe: {}\n", size));
        }
        if let Some(ref spec) = self.specifications {
            detail.push_str(&format!("📋 Spesifikasi: {}\n", spec));
        }
        detail.push_str(&format!("📂 Kategori: {}\n", self.category));
        match (self.price, self.list_price) {
            (Some(price), Some(list)) if list > price => {
                detail.push_str(&format!(
                    "💰 Harga: {} (normal {})\n",
                    format_rupiah(price),
                    format_rupiah(list)
                ));
            }
            (Some(price), _) => detail.push_str(&format!("💰 Harga: {}\n", format_rupiah(price))),
            (None, _) => {}
        }
        detail
    }

    /// Image to show on the card, falling back to the category placeholder.
    pub fn image_or_default(&self) -> String {
        self.image_ref
            .clone()
            .unwrap_or_else(|| self.category.default_image().to_string())
    }
}

/// Format an amount as Indonesian rupiah with dot thousands separators.
pub fn format_rupiah(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    format!("Rp {}", out)
}

// =============================================================================
// Inbound / outbound
// =============================================================================

/// An inbound event after transport decoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum InboundEvent {
    /// The customer typed a message.
    FreeText(String),
    /// The customer tapped a quick reply carrying this payload token.
    QuickReply(String),
    /// The customer tapped a postback button carrying this payload token.
    Postback(String),
}

/// A tappable affordance: short title plus opaque payload token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub title: String,
    pub payload: String,
}

impl Button {
    /// Build a button within platform limits.
    ///
    /// The title is cut to `max_title_chars` on a character boundary. A
    /// payload longer than `max_payload_len` is rejected because truncating
    /// it would corrupt the token.
    pub fn new(
        title: impl Into<String>,
        payload: impl Into<String>,
        limits: &MessagingConfig,
    ) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > limits.max_payload_len {
            return Err(PartsbotError::PayloadTooLarge {
                size: payload.len(),
                limit: limits.max_payload_len,
            });
        }
        let title: String = title.into().chars().take(limits.max_title_chars).collect();
        Ok(Self { title, payload })
    }
}

/// One element of an item carousel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub title: String,
    pub subtitle: String,
    pub image_ref: Option<String>,
    pub buttons: Vec<Button>,
}

/// An outbound intent for the delivery layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Outbound {
    /// Send text with optional quick replies.
    Text {
        text: String,
        quick_replies: Vec<Button>,
    },
    /// Send an item carousel.
    Carousel { cards: Vec<Card> },
}

impl Outbound {
    /// Plain text with no quick replies.
    pub fn text(text: impl Into<String>) -> Self {
        Outbound::Text {
            text: text.into(),
            quick_replies: Vec::new(),
        }
    }

    /// Text with quick replies.
    pub fn text_with_replies(text: impl Into<String>, quick_replies: Vec<Button>) -> Self {
        Outbound::Text {
            text: text.into(),
            quick_replies,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
