//! Outbound message builders.
//!
//! Every button goes through [`Renderer::button`], which encodes the payload
//! and applies platform limits. A button that cannot be built is dropped
//! with a warning instead of failing the whole reply.

use partsbot_core::config::{MessagingConfig, StoreConfig};
use partsbot_core::types::{format_rupiah, Button, CatalogItem, Card, Category, Outbound};
use tracing::warn;

use crate::nlu::{MotorPosition, SizeRecommendation};
use crate::paginate::{page_size_with_headroom, paginate};
use crate::payload::{Payload, TaggedValue, ValueKind};
use crate::session::CachedResults;

/// Quick color picks offered with the paint prompt.
const COLOR_PICKS: &[(&str, &str)] = &[
    ("🔵 Biru", "biru"),
    ("🔴 Merah", "merah"),
    ("⚫ Hitam", "hitam"),
    ("⚪ Putih", "putih"),
    ("🩶 Silver", "silver"),
];

// =============================================================================
// Renderer
// =============================================================================

/// Builds outbound intents within the configured platform limits.
#[derive(Debug, Clone)]
pub struct Renderer {
    limits: MessagingConfig,
    store: StoreConfig,
}

impl Renderer {
    pub fn new(limits: MessagingConfig, store: StoreConfig) -> Self {
        Self { limits, store }
    }

    /// Items shown per result page: one carousel.
    pub fn results_page_size(&self) -> usize {
        self.limits
            .results_page_size
            .min(self.limits.max_carousel_elements)
            .max(1)
    }

    /// Sizes shown per size-menu page, leaving room for prev/next and "not sure".
    ///
    /// At least one; under a limit too small for the affordances the reply
    /// list is cut to the limit instead.
    pub fn size_menu_page_size(&self) -> usize {
        page_size_with_headroom(self.limits.max_quick_replies, 1).max(1)
    }

    /// Build one button, or `None` if it cannot fit the platform limits.
    pub fn button(&self, title: &str, payload: Payload) -> Option<Button> {
        let token = match payload.encode() {
            Ok(token) => token,
            Err(e) => {
                warn!(title, error = %e, "Dropping button with unencodable payload");
                return None;
            }
        };
        match Button::new(title, token, &self.limits) {
            Ok(button) => Some(button),
            Err(e) => {
                warn!(title, error = %e, "Dropping oversized button");
                None
            }
        }
    }

    fn quick_replies(&self, specs: Vec<(String, Payload)>) -> Vec<Button> {
        let mut buttons: Vec<Button> = specs
            .into_iter()
            .filter_map(|(title, payload)| self.button(&title, payload))
            .collect();
        if buttons.len() > self.limits.max_quick_replies {
            warn!(
                count = buttons.len(),
                limit = self.limits.max_quick_replies,
                "Truncating quick replies"
            );
            buttons.truncate(self.limits.max_quick_replies);
        }
        buttons
    }

    fn menu_reply(&self) -> (String, Payload) {
        ("📋 Katalog".to_string(), Payload::CategoryMenu)
    }

    // =========================================================================
    // Menus and prompts
    // =========================================================================

    pub fn welcome(&self) -> Outbound {
        Outbound::text_with_replies(
            format!(
                "Halo! 👋 Selamat datang di {}.\nKami menjual ban motor, oli, lampu, dan cat. Mau cari apa hari ini?",
                self.store.name
            ),
            self.category_replies(),
        )
    }

    fn category_replies(&self) -> Vec<Button> {
        let mut specs: Vec<(String, Payload)> = Category::ALL
            .iter()
            .map(|c| (c.display_name().to_string(), Payload::Category(*c)))
            .collect();
        specs.push(("❓ Bantuan".to_string(), Payload::Help));
        self.quick_replies(specs)
    }

    pub fn category_menu(&self) -> Outbound {
        Outbound::text_with_replies("Silakan pilih kategori produk:", self.category_replies())
    }

    pub fn help(&self) -> Outbound {
        Outbound::text_with_replies(
            format!(
                "ℹ️ Cara pakai:\n\
                 • Ketik ukuran ban, contoh: 80/90-14\n\
                 • Ketik \"ban <merk>\", contoh: ban aspira\n\
                 • Ketik \"cat <warna>\", contoh: cat biru\n\
                 • Ketik \"katalog\" untuk melihat kategori\n\
                 • Ketik \"selesai\" untuk checkout, \"ulang\" untuk mulai lagi\n\n\
                 📞 WhatsApp: {}\n📍 {}",
                self.store.support_whatsapp, self.store.address
            ),
            self.quick_replies(vec![self.menu_reply()]),
        )
    }

    pub fn restarted(&self) -> Outbound {
        Outbound::text_with_replies(
            "Oke, kita mulai dari awal. Silakan pilih kategori:",
            self.category_replies(),
        )
    }

    /// Tire size menu, optionally filtered to one width.
    pub fn size_menu(&self, sizes: &[String], width: Option<u16>, page: i64) -> Outbound {
        let page = paginate(sizes, self.size_menu_page_size(), page);

        if sizes.is_empty() {
            let text = match width {
                Some(w) => format!("Maaf, belum ada ban dengan lebar {w} yang tersedia."),
                None => "Maaf, belum ada ukuran ban yang tersedia.".to_string(),
            };
            return Outbound::text_with_replies(
                text,
                self.quick_replies(vec![
                    ("🤔 Tidak Yakin".to_string(), Payload::NotSure),
                    self.menu_reply(),
                ]),
            );
        }

        let mut specs: Vec<(String, Payload)> = page
            .items
            .iter()
            .map(|s| (s.clone(), Payload::Select(TaggedValue::size(s.clone()))))
            .collect();
        if page.has_prev() {
            specs.push((
                "⬅️ Sebelumnya".to_string(),
                Payload::SizeMenu {
                    width,
                    page: (page.page - 1) as u32,
                },
            ));
        }
        if page.has_next() {
            specs.push((
                "Berikutnya ➡️".to_string(),
                Payload::SizeMenu {
                    width,
                    page: (page.page + 1) as u32,
                },
            ));
        }
        specs.push(("🤔 Tidak Yakin".to_string(), Payload::NotSure));

        let header = match width {
            Some(w) => format!("Ukuran ban lebar {w} yang tersedia"),
            None => "Pilih ukuran ban".to_string(),
        };
        Outbound::text_with_replies(
            format!("{header} (hal {}/{}):", page.page, page.total_pages),
            self.quick_replies(specs),
        )
    }

    /// Menu of catalog values (lamp types, oil packs).
    pub fn value_menu(&self, kind: ValueKind, values: &[String]) -> Outbound {
        let noun = match kind {
            ValueKind::Type => "tipe lampu",
            ValueKind::Pack => "ukuran kemasan oli",
            _ => "pilihan",
        };
        if values.is_empty() {
            return Outbound::text_with_replies(
                format!("Maaf, belum ada {noun} yang tersedia."),
                self.quick_replies(vec![self.menu_reply()]),
            );
        }
        let room = self.limits.max_quick_replies.saturating_sub(1);
        let mut specs: Vec<(String, Payload)> = values
            .iter()
            .take(room)
            .map(|v| (v.clone(), Payload::Select(TaggedValue::new(kind, v.clone()))))
            .collect();
        specs.push(self.menu_reply());
        Outbound::text_with_replies(format!("Pilih {noun}:"), self.quick_replies(specs))
    }

    pub fn color_prompt(&self) -> Outbound {
        let specs = COLOR_PICKS
            .iter()
            .map(|(title, color)| {
                (
                    title.to_string(),
                    Payload::Select(TaggedValue::new(ValueKind::Color, *color)),
                )
            })
            .collect();
        Outbound::text_with_replies(
            "🎨 Mau cat warna apa? Ketik warnanya, contoh: \"cat biru\", \"cat hitam doff\".",
            self.quick_replies(specs),
        )
    }

    pub fn brand_prompt(&self, brand: &str, sizes: &[String]) -> Outbound {
        let mut specs: Vec<(String, Payload)> = sizes
            .iter()
            .take(self.size_menu_page_size())
            .map(|s| (s.clone(), Payload::Select(TaggedValue::size(s.clone()))))
            .collect();
        specs.push(self.menu_reply());
        Outbound::text_with_replies(
            format!("Ban merk {brand}: ketik ukuran yang dicari, contoh: 80/90-14. Atau pilih ukuran yang tersedia:"),
            self.quick_replies(specs),
        )
    }

    pub fn brand_reprompt(&self, brand: &str) -> Outbound {
        Outbound::text(format!(
            "Untuk ban merk {brand}, ketik ukurannya ya, contoh: 80/90-14 atau 80/90."
        ))
    }

    pub fn ring_prompt(&self, width: u16, aspect: u16, rings: &[u16]) -> Outbound {
        let list = join_rings(rings);
        let specs = rings
            .iter()
            .map(|r| {
                let size = format!("{width}/{aspect}-{r}");
                (format!("Ring {r}"), Payload::Select(TaggedValue::size(size)))
            })
            .collect();
        Outbound::text_with_replies(
            format!("Ukuran {width}/{aspect} tersedia untuk ring: {list}.\nRing berapa yang dicari?"),
            self.quick_replies(specs),
        )
    }

    pub fn ring_unavailable(&self, width: u16, aspect: u16, ring: u16, rings: &[u16]) -> Outbound {
        let mut reply = self.ring_prompt(width, aspect, rings);
        if let Outbound::Text { ref mut text, .. } = reply {
            *text = format!(
                "Maaf, {width}/{aspect}-{ring} tidak tersedia. Ring yang ada: {}.",
                join_rings(rings)
            );
        }
        reply
    }

    pub fn ring_reprompt(&self, width: u16, aspect: u16) -> Outbound {
        Outbound::text_with_replies(
            format!(
                "Ketik ring ban untuk ukuran {width}/{aspect}, contoh: 14 (untuk {width}/{aspect}-14). \
                 Atau sebutkan tipe motor Anda, contoh: Honda Beat."
            ),
            self.quick_replies(vec![("🤔 Tidak Yakin".to_string(), Payload::NotSure)]),
        )
    }

    pub fn size_unavailable(&self, width: u16, aspect: u16) -> Outbound {
        Outbound::text_with_replies(
            format!("Maaf, ban ukuran {width}/{aspect} belum tersedia."),
            self.quick_replies(vec![
                (
                    "Lihat ukuran lain".to_string(),
                    Payload::SizeMenu {
                        width: Some(width),
                        page: 1,
                    },
                ),
                self.menu_reply(),
            ]),
        )
    }

    pub fn width_out_of_range(&self, width: i64, min: i64, max: i64) -> Outbound {
        Outbound::text(format!(
            "Lebar ban {width} di luar jangkauan ({min}-{max}). Coba ketik ukuran lengkap, contoh: 80/90-14."
        ))
    }

    pub fn motor_type_prompt(&self) -> Outbound {
        Outbound::text("🏍️ Motor apa yang Anda gunakan? Contoh: Honda Beat, Yamaha NMAX, Suzuki Nex.")
    }

    pub fn position_prompt(&self, motor: &str) -> Outbound {
        Outbound::text_with_replies(
            format!("Ban untuk {motor} posisi depan atau belakang?"),
            self.quick_replies(vec![
                (
                    MotorPosition::Front.label().to_string(),
                    Payload::Position(MotorPosition::Front),
                ),
                (
                    MotorPosition::Rear.label().to_string(),
                    Payload::Position(MotorPosition::Rear),
                ),
            ]),
        )
    }

    pub fn recommendations(
        &self,
        motor: &str,
        position: MotorPosition,
        rec: &SizeRecommendation,
    ) -> Outbound {
        let mut specs: Vec<(String, Payload)> = rec
            .sizes()
            .iter()
            .map(|s| {
                (
                    s.to_string(),
                    Payload::Select(TaggedValue::size(s.to_string())),
                )
            })
            .collect();
        let other = match position {
            MotorPosition::Front => MotorPosition::Rear,
            MotorPosition::Rear => MotorPosition::Front,
        };
        specs.push((
            format!("Posisi {}", other.label()),
            Payload::Position(other),
        ));
        specs.push(self.menu_reply());
        Outbound::text_with_replies(
            format!(
                "Untuk {motor} ban {}:\n• Ukuran standar: {}\n• Upsize: {}\nPilih ukuran untuk melihat produk.",
                position.label().to_lowercase(),
                rec.standard,
                rec.upsize
            ),
            self.quick_replies(specs),
        )
    }

    pub fn confirm_inferred(&self, size: &str) -> Outbound {
        Outbound::text_with_replies(
            format!("Maksud Anda ban ukuran {size}? Balas \"ya\" atau ketik ukuran yang benar."),
            self.quick_replies(vec![
                ("✅ Ya".to_string(), Payload::Confirm),
                ("🔄 Ulang".to_string(), Payload::Restart),
            ]),
        )
    }

    // =========================================================================
    // Results
    // =========================================================================

    /// A page of cached results: a carousel followed by navigation.
    pub fn results(&self, cached: &CachedResults, page: i64) -> Vec<Outbound> {
        let page_size = self.results_page_size();
        let page = paginate(&cached.items, page_size, page);
        let reference = cached.reference();

        let cards: Vec<Card> = page
            .items
            .iter()
            .map(|item| {
                let buttons = [
                    self.button(
                        "ℹ️ Detail",
                        Payload::Detail {
                            results: reference.clone(),
                            item: item.id.clone(),
                        },
                    ),
                    self.button(
                        "🛒 Pesan",
                        Payload::Order {
                            results: reference.clone(),
                            item: item.id.clone(),
                        },
                    ),
                ]
                .into_iter()
                .flatten()
                .collect();
                Card {
                    title: item.name.clone(),
                    subtitle: item.subtitle(),
                    image_ref: Some(item.image_or_default()),
                    buttons,
                }
            })
            .collect();

        let mut specs: Vec<(String, Payload)> = Vec::new();
        if page.has_prev() {
            specs.push((
                "⬅️ Sebelumnya".to_string(),
                Payload::ResultsPage {
                    results: reference.clone(),
                    page: (page.page - 1) as u32,
                },
            ));
        }
        if page.has_next() {
            specs.push((
                "Berikutnya ➡️".to_string(),
                Payload::ResultsPage {
                    results: reference.clone(),
                    page: (page.page + 1) as u32,
                },
            ));
        }
        specs.push(("✅ Selesai".to_string(), Payload::Finish));
        specs.push(self.menu_reply());

        let brand = cached
            .brand
            .as_deref()
            .map(|b| format!(" merk {b}"))
            .unwrap_or_default();
        vec![
            Outbound::Carousel { cards },
            Outbound::text_with_replies(
                format!(
                    "Ditemukan {} produk untuk \"{}\"{} (hal {}/{}).",
                    cached.items.len(),
                    cached.query,
                    brand,
                    page.page,
                    page.total_pages
                ),
                self.quick_replies(specs),
            ),
        ]
    }

    pub fn detail(&self, cached: &CachedResults, index: usize, item: &CatalogItem) -> Outbound {
        let page = index / self.results_page_size() + 1;
        Outbound::text_with_replies(
            item.detail_text(),
            self.quick_replies(vec![
                (
                    "🛒 Pesan".to_string(),
                    Payload::Order {
                        results: cached.reference(),
                        item: item.id.clone(),
                    },
                ),
                (
                    "⬅️ Kembali".to_string(),
                    Payload::ResultsPage {
                        results: cached.reference(),
                        page: page as u32,
                    },
                ),
                self.menu_reply(),
            ]),
        )
    }

    pub fn order_added(&self, item: &CatalogItem, count: usize) -> Outbound {
        Outbound::text_with_replies(
            format!(
                "✅ {} ditambahkan ke pesanan ({count} item). Ketik \"selesai\" untuk checkout atau lanjut belanja.",
                item.name
            ),
            self.quick_replies(vec![
                ("✅ Selesai".to_string(), Payload::Finish),
                self.menu_reply(),
            ]),
        )
    }

    pub fn item_missing(&self) -> Outbound {
        Outbound::text_with_replies(
            "Maaf, produk itu sudah tidak ada di daftar. Silakan pilih lagi.",
            self.quick_replies(vec![self.menu_reply()]),
        )
    }

    pub fn no_results(&self, query: &TaggedValue) -> Outbound {
        Outbound::text_with_replies(
            format!("Maaf, produk \"{query}\" tidak ditemukan."),
            self.quick_replies(vec![self.menu_reply()]),
        )
    }

    pub fn brand_empty(&self, brand: &str, query: &TaggedValue) -> Outbound {
        Outbound::text_with_replies(
            format!("Maaf, ban merk {brand} ukuran {query} tidak tersedia. Mau lihat merk lain?"),
            self.quick_replies(vec![
                (
                    "Lihat semua merk".to_string(),
                    Payload::Unfiltered(query.clone()),
                ),
                self.menu_reply(),
            ]),
        )
    }

    /// Checkout summary with the store's contact details.
    pub fn summary(&self, selection: &[CatalogItem]) -> Outbound {
        if selection.is_empty() {
            return Outbound::text(format!(
                "Terima kasih sudah menghubungi {}! Belum ada produk yang dipilih.\n📞 WhatsApp: {}",
                self.store.name, self.store.support_whatsapp
            ));
        }
        let mut text = String::from("🧾 Ringkasan pesanan:\n");
        for (i, item) in selection.iter().enumerate() {
            let price = item
                .price
                .map(format_rupiah)
                .unwrap_or_else(|| "harga menyusul".to_string());
            text.push_str(&format!("{}. {} - {}\n", i + 1, item.name, price));
        }
        let total: u64 = selection.iter().filter_map(|i| i.price).sum();
        text.push_str(&format!("\nTotal: {}\n", format_rupiah(total)));
        text.push_str(&format!(
            "\nLanjutkan pemesanan via WhatsApp {}\n📍 {}\nTerima kasih! 🙏",
            self.store.support_whatsapp, self.store.address
        ));
        Outbound::text(text)
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    pub fn clarify(&self) -> Outbound {
        Outbound::text_with_replies(
            "Maaf, saya belum mengerti 🙏 Ketik ukuran ban, contoh: 80/90-14, atau ketik \"katalog\".",
            self.quick_replies(vec![
                self.menu_reply(),
                ("❓ Bantuan".to_string(), Payload::Help),
            ]),
        )
    }

    pub fn stale_button(&self) -> Outbound {
        Outbound::text_with_replies(
            "Tombol ini sudah tidak berlaku. Silakan pilih lagi dari menu.",
            self.category_replies(),
        )
    }

    pub fn retry_later(&self) -> Outbound {
        Outbound::text("Maaf, sistem sedang sibuk. Silakan coba lagi sebentar lagi 🙏")
    }

    pub fn session_reset(&self) -> Outbound {
        Outbound::text_with_replies(
            "Maaf, terjadi kendala pada percakapan. Kita mulai dari awal ya.",
            self.category_replies(),
        )
    }
}

fn join_rings(rings: &[u16]) -> String {
    rings
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
