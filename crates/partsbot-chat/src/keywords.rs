//! Keyword expansion and scoring for attribute searches.
//!
//! A customer asking for "cat biru" wants every paint whose name mentions a
//! blue-ish color, whatever language or shade name the supplier used. The
//! query is expanded through a fixed synonym table and each catalog item is
//! scored by how many expanded keywords its name contains.

use std::cmp::Reverse;

use partsbot_core::types::CatalogItem;

/// Most keywords an expanded query may carry.
pub const MAX_KEYWORDS: usize = 15;

const SUBSTRING_SCORE: u32 = 20;
const WHOLE_WORD_BONUS: u32 = 10;

/// One attribute family: the terms that trigger it and what it expands to.
struct SynonymFamily {
    triggers: &'static [&'static str],
    expansions: &'static [&'static str],
}

// Applied in this order; earlier families win the keyword budget.
static FAMILIES: &[SynonymFamily] = &[
    SynonymFamily {
        triggers: &["biru", "blue"],
        expansions: &[
            "biru", "blue", "navy", "dark blue", "light blue", "sky blue", "indigo", "cyan",
            "aqua", "teal", "tosca", "azure", "ocean", "royal", "sapphire",
        ],
    },
    SynonymFamily {
        triggers: &["merah", "red"],
        expansions: &["merah", "red", "scarlet", "crimson", "chili", "maroon", "burgundy"],
    },
    SynonymFamily {
        triggers: &["hijau", "green"],
        expansions: &["hijau", "green", "lime", "olive", "mint", "emerald", "tosca"],
    },
    SynonymFamily {
        triggers: &["kuning", "yellow"],
        expansions: &["kuning", "yellow", "gold", "amber", "mustard"],
    },
    SynonymFamily {
        triggers: &["hitam", "black"],
        expansions: &["hitam", "black"],
    },
    SynonymFamily {
        triggers: &["putih", "white"],
        expansions: &["putih", "white", "ivory", "pearl"],
    },
    SynonymFamily {
        triggers: &["abu", "abu abu", "grey", "gray"],
        expansions: &["abu", "grey", "gray", "gunmetal", "graphite", "slate", "nardo"],
    },
    SynonymFamily {
        triggers: &["silver", "perak"],
        expansions: &["silver", "perak", "alu silver", "metallic"],
    },
    SynonymFamily {
        triggers: &["coklat", "cokelat", "brown"],
        expansions: &["coklat", "brown", "bronze", "coffee", "chocolate"],
    },
    SynonymFamily {
        triggers: &["orange", "oranye", "jingga"],
        expansions: &["orange", "jingga", "tangerine"],
    },
    SynonymFamily {
        triggers: &["ungu", "purple", "violet"],
        expansions: &["ungu", "purple", "violet", "lilac"],
    },
    SynonymFamily {
        triggers: &["pink", "merah muda", "rose", "magenta"],
        expansions: &["pink", "rose", "magenta", "fuchsia"],
    },
    SynonymFamily {
        triggers: &["doff", "matte", "matt"],
        expansions: &["doff", "matte"],
    },
    SynonymFamily {
        triggers: &["metalik", "metallic"],
        expansions: &["metallic", "metalik"],
    },
];

/// Lowercase, replace everything but ASCII letters and digits with spaces,
/// and collapse runs of whitespace.
pub fn normalize_name(s: &str) -> String {
    let replaced: String = s
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                ' '
            }
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whole-word containment over normalized text.
pub(crate) fn contains_words(haystack: &str, needle: &str) -> bool {
    format!(" {haystack} ").contains(&format!(" {needle} "))
}

/// Expand a free-text attribute query into at most [`MAX_KEYWORDS`]
/// normalized keywords.
///
/// The query's own tokens come first, then each triggered family's
/// expansions in table order. Duplicates keep their first position.
pub fn expand_keywords(query: &str) -> Vec<String> {
    let normalized = normalize_name(query);
    let mut out: Vec<String> = Vec::new();
    let mut push = |k: &str| {
        if !k.is_empty() && !out.iter().any(|existing| existing == k) {
            out.push(k.to_string());
        }
    };

    for token in normalized.split(' ') {
        push(token);
    }
    for family in FAMILIES {
        if family
            .triggers
            .iter()
            .any(|t| contains_words(&normalized, t))
        {
            for k in family.expansions {
                push(k);
            }
        }
    }

    out.truncate(MAX_KEYWORDS);
    out
}

/// Score an item name against expanded keywords.
///
/// Each keyword found as a substring adds 20, plus 10 more when it is also
/// a whole-word match.
pub fn score(item_name: &str, keywords: &[String]) -> u32 {
    let name = normalize_name(item_name);
    keywords
        .iter()
        .filter(|k| !k.is_empty() && name.contains(k.as_str()))
        .map(|k| {
            if contains_words(&name, k) {
                SUBSTRING_SCORE + WHOLE_WORD_BONUS
            } else {
                SUBSTRING_SCORE
            }
        })
        .sum()
}

/// A catalog item with its keyword score.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredItem {
    pub item: CatalogItem,
    pub score: u32,
}

/// Rank items against a query.
///
/// Items scoring zero are dropped. Order is score descending, then
/// normalized name ascending, then id ascending, so the same query over the
/// same catalog always yields the same list.
pub fn rank(query: &str, items: &[CatalogItem], max: usize) -> Vec<ScoredItem> {
    let keywords = expand_keywords(query);
    let mut scored: Vec<(String, ScoredItem)> = items
        .iter()
        .filter_map(|item| {
            let s = score(&item.name, &keywords);
            (s > 0).then(|| {
                (
                    normalize_name(&item.name),
                    ScoredItem {
                        item: item.clone(),
                        score: s,
                    },
                )
            })
        })
        .collect();

    scored.sort_by(|(name_a, a), (name_b, b)| {
        (Reverse(a.score), name_a, &a.item.id).cmp(&(Reverse(b.score), name_b, &b.item.id))
    });
    scored.truncate(max);
    scored.into_iter().map(|(_, s)| s).collect()
}
