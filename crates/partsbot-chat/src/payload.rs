//! Tagged button identifiers.
//!
//! Every button the bot sends carries one [`Payload`]. The wire form is a
//! leading tag followed by fields joined with [`FIELD_DELIMITER`]; values
//! that may contain structural characters go through the codec first.
//! Decoding matches the tag exactly and checks the field count, so adding a
//! variant never changes how an existing one is recognized.

use std::fmt;

use partsbot_core::types::Category;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::codec::{decode_binary, encode_binary, CodecError, Strategy, FIELD_DELIMITER};
use crate::nlu::MotorPosition;

/// Errors from building or parsing a payload token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("unknown payload tag: {0}")]
    UnknownTag(String),
    #[error("payload {tag} expects {expected} fields, found {found}")]
    Arity {
        tag: String,
        expected: usize,
        found: usize,
    },
    #[error("invalid payload field: {0}")]
    Field(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

// =============================================================================
// Value kinds
// =============================================================================

/// What a selected value means to the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Tire size, e.g. `80/90-14`.
    Size,
    /// Paint color query, e.g. `biru`.
    Color,
    /// Lamp type, e.g. `H4`.
    Type,
    /// Oil pack size, e.g. `1L`.
    Pack,
    /// Free-text search across the whole catalog.
    Search,
}

impl ValueKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ValueKind::Size => "S",
            ValueKind::Color => "C",
            ValueKind::Type => "T",
            ValueKind::Pack => "K",
            ValueKind::Search => "Q",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "S" => Some(ValueKind::Size),
            "C" => Some(ValueKind::Color),
            "T" => Some(ValueKind::Type),
            "K" => Some(ValueKind::Pack),
            "Q" => Some(ValueKind::Search),
            _ => None,
        }
    }

    /// Codec used for values of this kind.
    ///
    /// Sizes, types and packs come from the catalog's constrained vocabulary;
    /// colors and searches are whatever the customer typed.
    pub fn strategy(&self) -> Strategy {
        match self {
            ValueKind::Size | ValueKind::Type | ValueKind::Pack => Strategy::Structural,
            ValueKind::Color | ValueKind::Search => Strategy::Binary,
        }
    }

    /// The value kind a category is browsed by.
    pub fn for_category(category: Category) -> Self {
        match category {
            Category::Tire => ValueKind::Size,
            Category::Oil => ValueKind::Pack,
            Category::Lamp => ValueKind::Type,
            Category::Paint => ValueKind::Color,
        }
    }
}

/// A catalog query value together with its kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaggedValue {
    pub kind: ValueKind,
    pub value: String,
}

impl TaggedValue {
    pub fn new(kind: ValueKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn size(value: impl Into<String>) -> Self {
        Self::new(ValueKind::Size, value)
    }

    fn encode_fields(&self) -> Result<String, PayloadError> {
        Ok(format!(
            "{}{}{}",
            self.kind.tag(),
            FIELD_DELIMITER,
            self.kind.strategy().encode(&self.value)?
        ))
    }

    fn decode_fields(kind: &str, value: &str) -> Result<Self, PayloadError> {
        let kind =
            ValueKind::from_tag(kind).ok_or_else(|| PayloadError::Field(kind.to_string()))?;
        Ok(Self {
            kind,
            value: kind.strategy().decode(value)?,
        })
    }
}

impl fmt::Display for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// The result set a results button belongs to.
///
/// Carries the query and brand filter that produced the set, so the same
/// list can be rebuilt once the set is no longer cached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRef {
    pub id: Uuid,
    pub query: TaggedValue,
    pub brand: Option<String>,
}

impl ResultRef {
    /// Wire fields: id, value kind, value, brand (empty when unfiltered).
    const FIELDS: usize = 4;

    fn encode_fields(&self) -> Result<String, PayloadError> {
        let d = FIELD_DELIMITER;
        let brand = self.brand.as_deref().map(encode_binary).unwrap_or_default();
        Ok(format!(
            "{}{d}{}{d}{brand}",
            self.id.simple(),
            self.query.encode_fields()?
        ))
    }

    fn decode_fields(fields: &[&str]) -> Result<Self, PayloadError> {
        let [id, kind, value, brand] = fields else {
            return Err(PayloadError::Field(fields.concat()));
        };
        Ok(Self {
            id: Uuid::parse_str(id).map_err(|_| PayloadError::Field(id.to_string()))?,
            query: TaggedValue::decode_fields(kind, value)?,
            brand: if brand.is_empty() {
                None
            } else {
                Some(decode_binary(brand)?)
            },
        })
    }
}

// =============================================================================
// Payload
// =============================================================================

/// A decoded button identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Show the category menu.
    CategoryMenu,
    /// Show help.
    Help,
    /// Browse one category.
    Category(Category),
    /// Tire size menu, optionally filtered to one width.
    SizeMenu { width: Option<u16>, page: u32 },
    /// "Not sure" on the size menu: ask for the motorbike instead.
    NotSure,
    /// Pick a value from a menu.
    Select(TaggedValue),
    /// Pick a value while ignoring any active brand filter.
    Unfiltered(TaggedValue),
    /// Another page of a result set.
    ResultsPage { results: ResultRef, page: u32 },
    /// Details of one item, by catalog id.
    Detail { results: ResultRef, item: String },
    /// Add one item, by catalog id, to the selection.
    Order { results: ResultRef, item: String },
    /// Front or rear wheel.
    Position(MotorPosition),
    /// Accept an inferred size.
    Confirm,
    /// Finish and show the summary.
    Finish,
    /// Start over.
    Restart,
    /// First contact.
    GetStarted,
}

const TAG_MENU: &str = "MENU";
const TAG_HELP: &str = "HELP";
const TAG_CATEGORY: &str = "CAT";
const TAG_SIZE_MENU: &str = "SZM";
const TAG_NOT_SURE: &str = "UNSURE";
const TAG_SELECT: &str = "SEL";
const TAG_UNFILTERED: &str = "ALL";
const TAG_RESULTS_PAGE: &str = "PG";
const TAG_DETAIL: &str = "DTL";
const TAG_ORDER: &str = "ORD";
const TAG_POSITION: &str = "POS";
const TAG_CONFIRM: &str = "YES";
const TAG_FINISH: &str = "DONE";
const TAG_RESTART: &str = "RESTART";
const TAG_GET_STARTED: &str = "START";

impl Payload {
    /// Encode to the wire token carried by a button.
    pub fn encode(&self) -> Result<String, PayloadError> {
        let d = FIELD_DELIMITER;
        let token = match self {
            Payload::CategoryMenu => TAG_MENU.to_string(),
            Payload::Help => TAG_HELP.to_string(),
            Payload::Category(c) => format!("{TAG_CATEGORY}{d}{}", c.keyword()),
            Payload::SizeMenu { width, page } => {
                let width = width.map(|w| w.to_string()).unwrap_or_default();
                format!("{TAG_SIZE_MENU}{d}{width}{d}{page}")
            }
            Payload::NotSure => TAG_NOT_SURE.to_string(),
            Payload::Select(v) => format!("{TAG_SELECT}{d}{}", v.encode_fields()?),
            Payload::Unfiltered(v) => format!("{TAG_UNFILTERED}{d}{}", v.encode_fields()?),
            Payload::ResultsPage { results, page } => {
                format!("{TAG_RESULTS_PAGE}{d}{}{d}{page}", results.encode_fields()?)
            }
            Payload::Detail { results, item } => format!(
                "{TAG_DETAIL}{d}{}{d}{}",
                results.encode_fields()?,
                encode_binary(item)
            ),
            Payload::Order { results, item } => format!(
                "{TAG_ORDER}{d}{}{d}{}",
                results.encode_fields()?,
                encode_binary(item)
            ),
            Payload::Position(p) => format!("{TAG_POSITION}{d}{}", p.as_str()),
            Payload::Confirm => TAG_CONFIRM.to_string(),
            Payload::Finish => TAG_FINISH.to_string(),
            Payload::Restart => TAG_RESTART.to_string(),
            Payload::GetStarted => TAG_GET_STARTED.to_string(),
        };
        Ok(token)
    }

    /// Parse a wire token.
    pub fn decode(token: &str) -> Result<Self, PayloadError> {
        let fields: Vec<&str> = token.split(FIELD_DELIMITER).collect();
        let (tag, rest) = match fields.split_first() {
            Some((tag, rest)) => (*tag, rest),
            None => return Err(PayloadError::UnknownTag(String::new())),
        };

        let arity = |expected: usize| -> Result<(), PayloadError> {
            if rest.len() == expected {
                Ok(())
            } else {
                Err(PayloadError::Arity {
                    tag: tag.to_string(),
                    expected,
                    found: rest.len(),
                })
            }
        };

        match tag {
            TAG_MENU => arity(0).map(|_| Payload::CategoryMenu),
            TAG_HELP => arity(0).map(|_| Payload::Help),
            TAG_CATEGORY => {
                arity(1)?;
                Category::from_keyword(rest[0])
                    .map(Payload::Category)
                    .ok_or_else(|| PayloadError::Field(rest[0].to_string()))
            }
            TAG_SIZE_MENU => {
                arity(2)?;
                let width = if rest[0].is_empty() {
                    None
                } else {
                    Some(parse_number::<u16>(rest[0])?)
                };
                Ok(Payload::SizeMenu {
                    width,
                    page: parse_number(rest[1])?,
                })
            }
            TAG_NOT_SURE => arity(0).map(|_| Payload::NotSure),
            TAG_SELECT => {
                arity(2)?;
                Ok(Payload::Select(TaggedValue::decode_fields(rest[0], rest[1])?))
            }
            TAG_UNFILTERED => {
                arity(2)?;
                Ok(Payload::Unfiltered(TaggedValue::decode_fields(
                    rest[0], rest[1],
                )?))
            }
            TAG_RESULTS_PAGE | TAG_DETAIL | TAG_ORDER => {
                arity(ResultRef::FIELDS + 1)?;
                let (fields, last) = rest.split_at(ResultRef::FIELDS);
                let results = ResultRef::decode_fields(fields)?;
                Ok(match tag {
                    TAG_RESULTS_PAGE => Payload::ResultsPage {
                        results,
                        page: parse_number(last[0])?,
                    },
                    TAG_DETAIL => Payload::Detail {
                        results,
                        item: decode_item(last[0])?,
                    },
                    _ => Payload::Order {
                        results,
                        item: decode_item(last[0])?,
                    },
                })
            }
            TAG_POSITION => {
                arity(1)?;
                MotorPosition::from_str_opt(rest[0])
                    .map(Payload::Position)
                    .ok_or_else(|| PayloadError::Field(rest[0].to_string()))
            }
            TAG_CONFIRM => arity(0).map(|_| Payload::Confirm),
            TAG_FINISH => arity(0).map(|_| Payload::Finish),
            TAG_RESTART => arity(0).map(|_| Payload::Restart),
            TAG_GET_STARTED => arity(0).map(|_| Payload::GetStarted),
            other => Err(PayloadError::UnknownTag(other.to_string())),
        }
    }
}

fn parse_number<T: std::str::FromStr>(field: &str) -> Result<T, PayloadError> {
    field
        .parse()
        .map_err(|_| PayloadError::Field(field.to_string()))
}

fn decode_item(field: &str) -> Result<String, PayloadError> {
    let id = decode_binary(field)?;
    if id.is_empty() {
        return Err(PayloadError::Field(field.to_string()));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(p: Payload) -> Payload {
        let token = p.encode().unwrap();
        Payload::decode(&token).unwrap()
    }

    #[test]
    fn test_simple_tags() {
        assert_eq!(Payload::CategoryMenu.encode().unwrap(), "MENU");
        assert_eq!(Payload::Finish.encode().unwrap(), "DONE");
        assert_eq!(Payload::decode("RESTART").unwrap(), Payload::Restart);
        assert_eq!(Payload::decode("START").unwrap(), Payload::GetStarted);
        assert_eq!(Payload::decode("UNSURE").unwrap(), Payload::NotSure);
    }

    #[test]
    fn test_select_size_is_readable() {
        let p = Payload::Select(TaggedValue::size("80/90-14"));
        assert_eq!(p.encode().unwrap(), "SEL:S:80~90-14");
        assert_eq!(roundtrip(p.clone()), p);
    }

    #[test]
    fn test_select_color_with_delimiter_in_value() {
        let p = Payload::Select(TaggedValue::new(ValueKind::Color, "biru: navy"));
        let token = p.encode().unwrap();
        assert_eq!(token.matches(FIELD_DELIMITER).count(), 2);
        assert_eq!(Payload::decode(&token).unwrap(), p);
    }

    #[test]
    fn test_size_menu_optional_width() {
        let p = Payload::SizeMenu {
            width: None,
            page: 2,
        };
        assert_eq!(p.encode().unwrap(), "SZM::2");
        assert_eq!(roundtrip(p.clone()), p);

        let p = Payload::SizeMenu {
            width: Some(80),
            page: 1,
        };
        assert_eq!(p.encode().unwrap(), "SZM:80:1");
        assert_eq!(roundtrip(p.clone()), p);
    }

    #[test]
    fn test_result_set_variants() {
        let results = ResultRef {
            id: Uuid::new_v4(),
            query: TaggedValue::new(ValueKind::Type, "H4 12V"),
            brand: None,
        };
        for p in [
            Payload::ResultsPage {
                results: results.clone(),
                page: 3,
            },
            Payload::Detail {
                results: results.clone(),
                item: "LMP-001".to_string(),
            },
            Payload::Order {
                results: results.clone(),
                item: "id:with/odd chars".to_string(),
            },
        ] {
            assert_eq!(roundtrip(p.clone()), p);
        }
    }

    #[test]
    fn test_result_ref_carries_brand() {
        let p = Payload::Order {
            results: ResultRef {
                id: Uuid::new_v4(),
                query: TaggedValue::size("80/90-14"),
                brand: Some("IRC Tire".to_string()),
            },
            item: "BAN-002".to_string(),
        };
        let token = p.encode().unwrap();
        assert!(token.contains(":S:80~90-14:"));
        assert_eq!(token.matches(FIELD_DELIMITER).count(), 5);
        assert_eq!(Payload::decode(&token).unwrap(), p);
    }

    #[test]
    fn test_order_without_item_rejected() {
        let id = Uuid::new_v4().simple().to_string();
        assert!(matches!(
            Payload::decode(&format!("ORD:{id}:S:80~90-14::")),
            Err(PayloadError::Field(_))
        ));
        // Pre-brand layout has one field too few
        assert!(matches!(
            Payload::decode(&format!("ORD:{id}:S:80~90-14:0")),
            Err(PayloadError::Arity { .. })
        ));
    }

    #[test]
    fn test_tag_prefixes_do_not_collide() {
        // "ALL" and "CAT" are both three letters; neither is sniffed by prefix
        assert!(matches!(
            Payload::decode("ALLS:80~90-14"),
            Err(PayloadError::UnknownTag(_))
        ));
        assert!(matches!(
            Payload::decode("CATEGORY"),
            Err(PayloadError::UnknownTag(_))
        ));
    }

    #[test]
    fn test_category_and_position() {
        assert_eq!(
            Payload::decode("CAT:lampu").unwrap(),
            Payload::Category(Category::Lamp)
        );
        assert_eq!(
            Payload::decode("POS:rear").unwrap(),
            Payload::Position(MotorPosition::Rear)
        );
        assert!(matches!(
            Payload::decode("CAT:velg"),
            Err(PayloadError::Field(_))
        ));
    }

    #[test]
    fn test_arity_errors() {
        assert_eq!(
            Payload::decode("MENU:extra"),
            Err(PayloadError::Arity {
                tag: "MENU".to_string(),
                expected: 0,
                found: 1,
            })
        );
        assert!(matches!(
            Payload::decode("SEL:S"),
            Err(PayloadError::Arity { .. })
        ));
    }

    #[test]
    fn test_bad_fields() {
        assert!(Payload::decode("SZM:abc:1").is_err());
        assert!(Payload::decode("SEL:X:80~90-14").is_err());
        assert!(Payload::decode("PG:not-a-uuid:S:80~90-14::1").is_err());
        assert!(Payload::decode("").is_err());
    }

    #[test]
    fn test_structural_value_rejected_at_encode() {
        let p = Payload::Select(TaggedValue::size("80~90"));
        assert!(matches!(p.encode(), Err(PayloadError::Codec(_))));
    }

    #[test]
    fn test_value_kind_for_category() {
        assert_eq!(ValueKind::for_category(Category::Tire), ValueKind::Size);
        assert_eq!(ValueKind::for_category(Category::Paint), ValueKind::Color);
    }
}
