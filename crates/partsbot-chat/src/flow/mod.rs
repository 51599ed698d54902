//! The disambiguation flow: one pure step per inbound event.
//!
//! [`Flow::step`] takes the current session and one input and returns the
//! next session plus the messages to send. It talks to the catalog and the
//! NLU adapter but never to the session store; persisting the result is the
//! router's job.

pub mod render;
pub mod state;

use std::collections::BTreeSet;
use std::sync::Arc;

use partsbot_core::config::PartsbotConfig;
use partsbot_core::types::{CatalogItem, Category, Outbound};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{size_key, CatalogLookup};
use crate::error::ChatError;
use crate::keywords::{self, contains_words, normalize_name};
use crate::nlu::{detect_position, GuardedNlu, MotorPosition};
use crate::payload::{Payload, ResultRef, TaggedValue, ValueKind};
use crate::session::{CachedResults, Pagination, Session, Slots};
use crate::size::{self, TireSize, WidthMatch, MAX_WIDTH, MIN_WIDTH};

use render::Renderer;
use state::{validate_transition, FlowState};

/// Most items a keyword or color search returns.
const MAX_SEARCH_RESULTS: usize = 50;

static AFFIRMATIVES: &[&str] = &[
    "ya", "iya", "yes", "y", "ok", "oke", "okay", "betul", "benar", "bener", "yup", "sip",
    "setuju", "boleh",
];

/// One inbound event after command recognition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowInput {
    Text(String),
    Payload(Payload),
}

/// Result of one step.
#[derive(Clone, Debug)]
pub struct Transition {
    pub session: Session,
    pub effects: Vec<Outbound>,
    /// The conversation ended; the session should be evicted.
    pub terminal: bool,
}

/// Mutable scratch state for one step.
struct Step {
    from: FlowState,
    session: Session,
    effects: Vec<Outbound>,
    terminal: bool,
}

impl Step {
    fn say(&mut self, message: Outbound) {
        self.effects.push(message);
    }

    fn go(&mut self, state: FlowState) {
        self.session.state = state;
    }

    /// Drop the query in progress.
    ///
    /// Any state may return to `Idle`, so the rest of the step is checked as
    /// a transition out of `Idle`.
    fn abandon(&mut self) {
        self.from = FlowState::Idle;
        self.session.state = FlowState::Idle;
        self.session.slots = Slots::default();
    }
}

// =============================================================================
// Flow
// =============================================================================

/// The dialogue state machine.
pub struct Flow {
    catalog: Arc<dyn CatalogLookup>,
    nlu: GuardedNlu,
    render: Renderer,
}

impl Flow {
    pub fn new(catalog: Arc<dyn CatalogLookup>, nlu: GuardedNlu, config: &PartsbotConfig) -> Self {
        Self {
            catalog,
            nlu,
            render: Renderer::new(config.messaging.clone(), config.store.clone()),
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.render
    }

    /// Advance `session` by one input.
    ///
    /// Recoverable failures come back as `Ok` with the session unchanged and
    /// a prompt. Only [`ChatError::SessionCorruption`] and storage errors
    /// are returned to the caller.
    pub async fn step(&self, session: Session, input: FlowInput) -> Result<Transition, ChatError> {
        let original = session.clone();
        let from = session.state;
        let mut step = Step {
            from,
            session,
            effects: Vec::new(),
            terminal: false,
        };

        let outcome = match input {
            FlowInput::Text(text) => self.on_text(&mut step, text.trim()).await,
            FlowInput::Payload(payload) => self.on_payload(&mut step, payload).await,
        };

        match outcome {
            Ok(()) => {
                validate_transition(step.from, step.session.state)?;
                debug!(
                    user_id = %step.session.user_id,
                    from = %from,
                    to = %step.session.state,
                    "State transition"
                );
                Ok(Transition {
                    session: step.session,
                    effects: step.effects,
                    terminal: step.terminal,
                })
            }
            Err(ChatError::ExternalService(e)) => {
                warn!(user_id = %original.user_id, error = %e, "External service failed, state unchanged");
                Ok(Transition {
                    session: original,
                    effects: vec![self.render.retry_later()],
                    terminal: false,
                })
            }
            Err(ChatError::OutOfRange { value, min, max }) => {
                debug!(user_id = %original.user_id, value, min, max, "Value out of range");
                Ok(Transition {
                    session: original,
                    effects: vec![self.render.width_out_of_range(value, min, max)],
                    terminal: false,
                })
            }
            Err(e @ (ChatError::Parse(_) | ChatError::Payload(_) | ChatError::CacheMiss(_))) => {
                debug!(user_id = %original.user_id, error = %e, "Recovered with clarifying prompt");
                Ok(Transition {
                    session: original,
                    effects: vec![self.render.clarify()],
                    terminal: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Free text
    // =========================================================================

    async fn on_text(&self, step: &mut Step, text: &str) -> Result<(), ChatError> {
        match step.session.state {
            FlowState::Idle | FlowState::ShowingResults | FlowState::ShowingMotorRecommendations => {
                step.abandon();
                self.fresh_query(step, text).await
            }
            FlowState::AwaitingBrandFilteredSize => {
                let brand = step.session.slots.brand_filter.clone();
                if !self.size_grammar(step, text, brand.clone()).await? {
                    step.say(self.render.brand_reprompt(brand.as_deref().unwrap_or_default()));
                }
                Ok(())
            }
            FlowState::AwaitingRing => self.on_ring_text(step, text).await,
            FlowState::AwaitingMotorType => self.on_motor_type_text(step, text).await,
            FlowState::AwaitingMotorPosition => self.on_position_text(step, text).await,
            FlowState::ConfirmingInferredSize => self.on_confirmation_text(step, text).await,
        }
    }

    /// Text received with no query in progress.
    ///
    /// Deterministic parsers run first; the NLU adapter is consulted only
    /// when none of them recognize the text.
    async fn fresh_query(&self, step: &mut Step, text: &str) -> Result<(), ChatError> {
        let brand = self.brand_request(text).await?;

        if size::looks_like_size(text) || brand.is_none() {
            if self.size_grammar(step, text, brand.clone()).await? {
                return Ok(());
            }
        }

        if let Some(brand) = brand {
            let sizes = self.tire_sizes(None, Some(&brand)).await?;
            step.session.slots.brand_filter = Some(brand.clone());
            step.go(FlowState::AwaitingBrandFilteredSize);
            step.say(self.render.brand_prompt(&brand, &sizes));
            return Ok(());
        }

        if let Some(color) = color_request(text) {
            return self.show_color(step, color).await;
        }

        if self.nlu.is_greeting(text).await {
            step.say(self.render.welcome());
            return Ok(());
        }

        if let Some(inferred) = self.nlu.extract_size(text).await {
            let inferred = inferred.to_string();
            step.say(self.render.confirm_inferred(&inferred));
            step.session.slots.full_size = Some(inferred);
            step.go(FlowState::ConfirmingInferredSize);
            return Ok(());
        }

        if self.nlu.is_motorcycle_related(text).await {
            return self.motor_path(step, text).await;
        }

        if self.nlu.is_confused(text).await {
            step.say(self.render.help());
            return Ok(());
        }

        if let Some(width) = self.nlu.extract_width(text).await {
            return self.show_size_menu(step, Some(width), 1).await;
        }

        if !normalize_name(text).is_empty() {
            let query = TaggedValue::new(ValueKind::Search, text);
            let items = self.query_items(&query, None).await?;
            if !items.is_empty() {
                info!(user_id = %step.session.user_id, hits = items.len(), "Keyword search");
                self.present(step, new_results(query, None, items), 1);
                return Ok(());
            }
        }

        Err(ChatError::Parse(format!("unrecognized text: {text}")))
    }

    /// The size grammar shared by `Idle` and `AwaitingBrandFilteredSize`:
    /// complete size, then incomplete size, then width only.
    ///
    /// Returns whether the text was recognized.
    async fn size_grammar(
        &self,
        step: &mut Step,
        text: &str,
        brand: Option<String>,
    ) -> Result<bool, ChatError> {
        if let Some(size) = size::recognize_complete(text) {
            self.show_size(step, size, brand).await?;
            return Ok(true);
        }

        if let Some(partial) = size::recognize_incomplete(text) {
            match partial.complete() {
                Some(size) => self.show_size(step, size, brand).await?,
                None => {
                    self.ask_ring(step, partial.width, partial.aspect, brand)
                        .await?
                }
            }
            return Ok(true);
        }

        match size::recognize_width_only(text) {
            Some(WidthMatch::Width(width)) => {
                self.show_size_menu(step, Some(width), 1).await?;
                Ok(true)
            }
            Some(WidthMatch::OutOfRange(width)) => Err(ChatError::OutOfRange {
                value: i64::from(width),
                min: i64::from(MIN_WIDTH),
                max: i64::from(MAX_WIDTH),
            }),
            None => Ok(false),
        }
    }

    async fn on_ring_text(&self, step: &mut Step, text: &str) -> Result<(), ChatError> {
        let (width, aspect) = match (step.session.slots.size_width, step.session.slots.size_aspect)
        {
            (Some(w), Some(a)) => (w, a),
            _ => {
                return Err(ChatError::SessionCorruption(
                    "ring prompt without width/aspect".to_string(),
                ))
            }
        };

        if let Some(ring) = size::extract_ring(text) {
            return self.try_ring(step, width, aspect, ring).await;
        }

        if size::recognize_complete(text).is_some() {
            let brand = step.session.slots.brand_filter.clone();
            self.size_grammar(step, text, brand).await?;
            return Ok(());
        }

        if self.nlu.is_motorcycle_related(text).await {
            return self.motor_path(step, text).await;
        }

        if let Some(ring) = self.nlu.extract_ring(text).await {
            return self.try_ring(step, width, aspect, ring).await;
        }

        step.say(self.render.ring_reprompt(width, aspect));
        Ok(())
    }

    async fn on_motor_type_text(&self, step: &mut Step, text: &str) -> Result<(), ChatError> {
        if size::looks_like_size(text) && self.size_grammar(step, text, None).await? {
            return Ok(());
        }
        if normalize_name(text).is_empty() || self.nlu.is_confused(text).await {
            step.say(self.render.motor_type_prompt());
            return Ok(());
        }
        self.motor_path(step, text).await
    }

    async fn on_position_text(&self, step: &mut Step, text: &str) -> Result<(), ChatError> {
        if let Some(position) = detect_position(text) {
            return self.recommend(step, position).await;
        }
        if size::looks_like_size(text) && self.size_grammar(step, text, None).await? {
            return Ok(());
        }
        let motor = step.session.slots.motor_type.clone().unwrap_or_default();
        step.say(self.render.position_prompt(&motor));
        Ok(())
    }

    async fn on_confirmation_text(&self, step: &mut Step, text: &str) -> Result<(), ChatError> {
        if is_affirmative(text) {
            return self.confirm_inferred(step).await;
        }
        if let Some(size) = size::recognize_complete(text) {
            return self.show_size(step, size, None).await;
        }
        let inferred = step.session.slots.full_size.clone().unwrap_or_default();
        step.say(self.render.confirm_inferred(&inferred));
        Ok(())
    }

    async fn confirm_inferred(&self, step: &mut Step) -> Result<(), ChatError> {
        let size = step
            .session
            .slots
            .full_size
            .as_deref()
            .and_then(size::recognize_complete)
            .ok_or_else(|| {
                ChatError::SessionCorruption("confirmation without inferred size".to_string())
            })?;
        self.show_size(step, size, None).await
    }

    // =========================================================================
    // Buttons
    // =========================================================================

    async fn on_payload(&self, step: &mut Step, payload: Payload) -> Result<(), ChatError> {
        match payload {
            Payload::GetStarted => {
                step.abandon();
                step.say(self.render.welcome());
            }
            Payload::CategoryMenu => {
                step.abandon();
                step.say(self.render.category_menu());
            }
            Payload::Help => step.say(self.render.help()),
            Payload::Category(category) => {
                step.abandon();
                self.browse(step, category).await?;
            }
            Payload::SizeMenu { width, page } => {
                self.show_size_menu(step, width, i64::from(page)).await?;
            }
            Payload::NotSure => {
                step.abandon();
                step.go(FlowState::AwaitingMotorType);
                step.say(self.render.motor_type_prompt());
            }
            Payload::Select(value) => {
                let brand = match value.kind {
                    ValueKind::Size => step.session.slots.brand_filter.clone(),
                    _ => None,
                };
                self.select(step, value, brand).await?;
            }
            Payload::Unfiltered(value) => self.select(step, value, None).await?,
            Payload::ResultsPage { results, page } => {
                if let Some(cached) = self.resolve_results(step, results).await? {
                    self.present(step, cached, i64::from(page));
                }
            }
            Payload::Detail { results, item } => {
                if let Some(cached) = self.resolve_results(step, results).await? {
                    match cached.find(&item).map(|(i, found)| (i, found.clone())) {
                        Some((index, found)) => {
                            step.say(self.render.detail(&cached, index, &found));
                            self.adopt(step, cached, self.page_of(index));
                        }
                        None => self.item_missing(step, &item),
                    }
                }
            }
            Payload::Order { results, item } => {
                if let Some(cached) = self.resolve_results(step, results).await? {
                    match cached.find(&item).map(|(i, found)| (i, found.clone())) {
                        Some((index, found)) => self.add_to_selection(step, cached, index, found),
                        None => self.item_missing(step, &item),
                    }
                }
            }
            Payload::Position(position) => {
                let expecting = matches!(
                    step.session.state,
                    FlowState::AwaitingMotorPosition | FlowState::ShowingMotorRecommendations
                );
                if expecting && step.session.slots.motor_type.is_some() {
                    self.recommend(step, position).await?;
                } else {
                    step.say(self.render.stale_button());
                }
            }
            Payload::Confirm => {
                if step.session.state == FlowState::ConfirmingInferredSize {
                    self.confirm_inferred(step).await?;
                } else {
                    step.say(self.render.stale_button());
                }
            }
            Payload::Finish => {
                info!(
                    user_id = %step.session.user_id,
                    items = step.session.selection.len(),
                    "Checkout"
                );
                step.say(self.render.summary(&step.session.selection));
                step.session = Session::new(step.session.user_id.clone(), step.session.last_activity);
                step.terminal = true;
            }
            Payload::Restart => {
                step.abandon();
                step.session.results = None;
                step.session.pagination = Pagination::default();
                step.say(self.render.restarted());
            }
        }
        Ok(())
    }

    async fn browse(&self, step: &mut Step, category: Category) -> Result<(), ChatError> {
        match category {
            Category::Tire => self.show_size_menu(step, None, 1).await,
            Category::Lamp | Category::Oil => {
                let values = self.catalog_values(category).await?;
                step.say(
                    self.render
                        .value_menu(ValueKind::for_category(category), &values),
                );
                Ok(())
            }
            Category::Paint => {
                step.say(self.render.color_prompt());
                Ok(())
            }
        }
    }

    async fn select(
        &self,
        step: &mut Step,
        value: TaggedValue,
        brand: Option<String>,
    ) -> Result<(), ChatError> {
        step.abandon();
        match value.kind {
            ValueKind::Size => match size::recognize_complete(&value.value) {
                Some(size) => self.show_size(step, size, brand).await,
                None => self.show_query(step, value, brand).await.map(|_| ()),
            },
            ValueKind::Color => self.show_color(step, value.value).await,
            ValueKind::Type | ValueKind::Pack | ValueKind::Search => {
                self.show_query(step, value, None).await.map(|_| ())
            }
        }
    }

    fn add_to_selection(&self, step: &mut Step, cached: CachedResults, index: usize, item: CatalogItem) {
        step.session.selection.push(item.clone());
        info!(
            user_id = %step.session.user_id,
            item_id = %item.id,
            selected = step.session.selection.len(),
            "Item added to selection"
        );
        step.say(self.render.order_added(&item, step.session.selection.len()));
        self.adopt(step, cached, self.page_of(index));
    }

    fn item_missing(&self, step: &mut Step, item_id: &str) {
        debug!(user_id = %step.session.user_id, item_id, "Item not in result set");
        step.say(self.render.item_missing());
    }

    /// Page of the result list holding position `index`.
    fn page_of(&self, index: usize) -> i64 {
        (index / self.render.results_page_size() + 1) as i64
    }

    // =========================================================================
    // Sizes and motorbikes
    // =========================================================================

    async fn ask_ring(
        &self,
        step: &mut Step,
        width: u16,
        aspect: u16,
        brand: Option<String>,
    ) -> Result<(), ChatError> {
        let rings = self.catalog.available_rings(width, aspect).await?;
        if rings.is_empty() {
            step.abandon();
            step.say(self.render.size_unavailable(width, aspect));
            return Ok(());
        }
        step.session.slots = Slots {
            size_width: Some(width),
            size_aspect: Some(aspect),
            brand_filter: brand,
            ..Slots::default()
        };
        step.go(FlowState::AwaitingRing);
        step.say(self.render.ring_prompt(width, aspect, &rings));
        Ok(())
    }

    async fn try_ring(
        &self,
        step: &mut Step,
        width: u16,
        aspect: u16,
        ring: u16,
    ) -> Result<(), ChatError> {
        let rings = self.catalog.available_rings(width, aspect).await?;
        if rings.contains(&ring) {
            let brand = step.session.slots.brand_filter.clone();
            return self
                .show_size(step, TireSize::new(width, aspect, ring), brand)
                .await;
        }
        debug!(width, aspect, ring, available = ?rings, "Ring not stocked");
        step.say(self.render.ring_unavailable(width, aspect, ring, &rings));
        Ok(())
    }

    /// Results for one complete size, with the size slots filled in.
    async fn show_size(
        &self,
        step: &mut Step,
        size: TireSize,
        brand: Option<String>,
    ) -> Result<(), ChatError> {
        let query = TaggedValue::size(size.to_string());
        if self.show_query(step, query, brand.clone()).await? {
            step.session.slots = Slots {
                size_width: Some(size.width),
                size_aspect: Some(size.aspect),
                ring_size: Some(size.ring),
                full_size: Some(size.to_string()),
                brand_filter: brand,
                ..Slots::default()
            };
        }
        Ok(())
    }

    async fn show_size_menu(
        &self,
        step: &mut Step,
        width: Option<u16>,
        page: i64,
    ) -> Result<(), ChatError> {
        let brand = if step.session.state == FlowState::AwaitingBrandFilteredSize {
            step.session.slots.brand_filter.clone()
        } else {
            step.abandon();
            None
        };
        let sizes = self.tire_sizes(width, brand.as_deref()).await?;
        step.say(self.render.size_menu(&sizes, width, page));
        Ok(())
    }

    async fn motor_path(&self, step: &mut Step, text: &str) -> Result<(), ChatError> {
        let motor = motor_name(text);
        step.session.slots = Slots {
            motor_type: Some(motor.clone()),
            ..Slots::default()
        };
        match detect_position(text) {
            Some(position) => self.recommend(step, position).await,
            None => {
                step.go(FlowState::AwaitingMotorPosition);
                step.say(self.render.position_prompt(&motor));
                Ok(())
            }
        }
    }

    async fn recommend(&self, step: &mut Step, position: MotorPosition) -> Result<(), ChatError> {
        let motor = step.session.slots.motor_type.clone().ok_or_else(|| {
            ChatError::SessionCorruption("recommendation without motor type".to_string())
        })?;
        let rec = self.nlu.recommend_sizes(&motor, position).await;
        step.session.slots.motor_position = Some(position);
        step.go(FlowState::ShowingMotorRecommendations);
        step.say(self.render.recommendations(&motor, position, &rec));
        Ok(())
    }

    // =========================================================================
    // Queries and results
    // =========================================================================

    async fn show_color(&self, step: &mut Step, color: String) -> Result<(), ChatError> {
        let query = TaggedValue::new(ValueKind::Color, color.clone());
        if self.show_query(step, query, None).await? {
            step.session.slots = Slots {
                color_query: Some(color),
                ..Slots::default()
            };
        }
        Ok(())
    }

    /// Run a query and show page one. Returns whether anything was found.
    ///
    /// When a brand filter empties an otherwise non-empty result, the
    /// customer is offered the unfiltered results instead of a dead end.
    async fn show_query(
        &self,
        step: &mut Step,
        query: TaggedValue,
        brand: Option<String>,
    ) -> Result<bool, ChatError> {
        let items = self.query_items(&query, brand.as_deref()).await?;
        if items.is_empty() {
            let other_brands = match brand {
                Some(_) => !self.query_items(&query, None).await?.is_empty(),
                None => false,
            };
            step.abandon();
            match brand {
                Some(b) if other_brands => step.say(self.render.brand_empty(&b, &query)),
                _ => step.say(self.render.no_results(&query)),
            }
            return Ok(false);
        }
        self.present(step, new_results(query, brand, items), 1);
        Ok(true)
    }

    /// Catalog items for a query value, in a deterministic order.
    async fn query_items(
        &self,
        query: &TaggedValue,
        brand: Option<&str>,
    ) -> Result<Vec<CatalogItem>, ChatError> {
        let mut items = match query.kind {
            ValueKind::Size => self.catalog.items_by_size(&query.value).await?,
            ValueKind::Type | ValueKind::Pack => {
                let category = if query.kind == ValueKind::Type {
                    Category::Lamp
                } else {
                    Category::Oil
                };
                let wanted = size_key(&query.value);
                self.catalog
                    .all_items(category)
                    .await?
                    .into_iter()
                    .filter(|item| item.size_spec.as_deref().map(size_key) == Some(wanted.clone()))
                    .collect()
            }
            ValueKind::Color => {
                let paints = self.catalog.all_items(Category::Paint).await?;
                ranked(&query.value, &paints)
            }
            ValueKind::Search => {
                let mut everything = Vec::new();
                for category in Category::ALL {
                    everything.extend(self.catalog.all_items(category).await?);
                }
                ranked(&query.value, &everything)
            }
        };
        if let Some(brand) = brand {
            items.retain(|item| {
                item.brand
                    .as_deref()
                    .map(|b| b.eq_ignore_ascii_case(brand))
                    .unwrap_or(false)
            });
        }
        Ok(items)
    }

    /// The cached result set a button refers to.
    ///
    /// A set that is no longer cached is rebuilt from the query and brand
    /// the button carries, so item ids resolve against the same list the
    /// customer saw.
    async fn resolve_results(
        &self,
        step: &mut Step,
        reference: ResultRef,
    ) -> Result<Option<CachedResults>, ChatError> {
        match cached(&step.session, reference.id) {
            Ok(results) => Ok(Some(results.clone())),
            Err(ChatError::CacheMiss(id)) => {
                info!(
                    user_id = %step.session.user_id,
                    result_set = %id,
                    query = %reference.query,
                    brand = reference.brand.as_deref().unwrap_or("-"),
                    "Result set no longer cached, re-querying"
                );
                let ResultRef { query, brand, .. } = reference;
                let items = self.query_items(&query, brand.as_deref()).await?;
                if items.is_empty() {
                    step.abandon();
                    step.say(self.render.no_results(&query));
                    return Ok(None);
                }
                Ok(Some(new_results(query, brand, items)))
            }
            Err(e) => Err(e),
        }
    }

    /// Show one page of a result set and make it the session's current one.
    fn present(&self, step: &mut Step, results: CachedResults, page: i64) {
        step.effects.extend(self.render.results(&results, page));
        self.adopt(step, results, page);
    }

    fn adopt(&self, step: &mut Step, results: CachedResults, page: i64) {
        let page_size = self.render.results_page_size();
        let total_pages = results.items.len().div_ceil(page_size).max(1);
        step.session.pagination = Pagination {
            page: page.clamp(1, total_pages as i64) as usize,
            page_size,
            total_items: results.items.len(),
            cached_result_set_id: Some(results.id),
        };
        step.session.results = Some(results);
        step.go(FlowState::ShowingResults);
    }

    // =========================================================================
    // Catalog helpers
    // =========================================================================

    /// Stocked tire sizes, ascending, optionally narrowed by width and brand.
    async fn tire_sizes(
        &self,
        width: Option<u16>,
        brand: Option<&str>,
    ) -> Result<Vec<String>, ChatError> {
        let sizes: BTreeSet<TireSize> = self
            .catalog
            .all_items(Category::Tire)
            .await?
            .iter()
            .filter(|item| match brand {
                Some(b) => item
                    .brand
                    .as_deref()
                    .map(|ib| ib.eq_ignore_ascii_case(b))
                    .unwrap_or(false),
                None => true,
            })
            .filter_map(|item| item.size_spec.as_deref().and_then(size::recognize_complete))
            .filter(|s| width.map(|w| s.width == w).unwrap_or(true))
            .collect();
        Ok(sizes.into_iter().map(|s| s.to_string()).collect())
    }

    /// Distinct `size_spec` values in a category, sorted.
    async fn catalog_values(&self, category: Category) -> Result<Vec<String>, ChatError> {
        let values: BTreeSet<String> = self
            .catalog
            .all_items(category)
            .await?
            .into_iter()
            .filter_map(|item| item.size_spec)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(values.into_iter().collect())
    }

    /// The tire brand named in a "ban <brand>" request.
    ///
    /// Brands are tried longest first, then alphabetically, so "IRC Tire"
    /// wins over "IRC" for "ban irc tire".
    async fn brand_request(&self, text: &str) -> Result<Option<String>, ChatError> {
        let normalized = normalize_name(text);
        let rest = match normalized.strip_prefix("ban ") {
            Some(rest) if !rest.is_empty() => rest.to_string(),
            _ => return Ok(None),
        };

        let mut brands: Vec<String> = self
            .catalog
            .all_items(Category::Tire)
            .await?
            .into_iter()
            .filter_map(|item| item.brand)
            .filter(|b| !normalize_name(b).is_empty())
            .collect();
        brands.sort_by(|a, b| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| normalize_name(a).cmp(&normalize_name(b)))
        });
        brands.dedup_by(|a, b| normalize_name(a) == normalize_name(b));

        Ok(brands
            .into_iter()
            .find(|b| contains_words(&rest, &normalize_name(b))))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn new_results(query: TaggedValue, brand: Option<String>, items: Vec<CatalogItem>) -> CachedResults {
    CachedResults {
        id: Uuid::new_v4(),
        query,
        brand,
        items,
    }
}

fn cached(session: &Session, id: Uuid) -> Result<&CachedResults, ChatError> {
    session
        .results
        .as_ref()
        .filter(|r| r.id == id)
        .ok_or(ChatError::CacheMiss(id))
}

fn ranked(query: &str, items: &[CatalogItem]) -> Vec<CatalogItem> {
    keywords::rank(query, items, MAX_SEARCH_RESULTS)
        .into_iter()
        .map(|scored| scored.item)
        .collect()
}

/// The color named in a "cat <color>" request.
fn color_request(text: &str) -> Option<String> {
    let normalized = normalize_name(text);
    normalized
        .strip_prefix("cat ")
        .filter(|rest| !rest.is_empty())
        .map(str::to_string)
}

fn is_affirmative(text: &str) -> bool {
    normalize_name(text)
        .split(' ')
        .next()
        .map(|first| AFFIRMATIVES.contains(&first))
        .unwrap_or(false)
}

/// The motorbike name with any wheel-position words removed.
fn motor_name(text: &str) -> String {
    let name: Vec<&str> = text
        .split_whitespace()
        .filter(|word| detect_position(word).is_none())
        .collect();
    if name.is_empty() {
        text.trim().to_string()
    } else {
        name.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use partsbot_core::types::UserId;

    fn tire(id: &str, brand: &str, size: &str) -> CatalogItem {
        CatalogItem {
            id: id.to_string(),
            name: format!("{brand} {size}"),
            brand: Some(brand.to_string()),
            category: Category::Tire,
            size_spec: Some(size.to_string()),
            price: Some(200_000),
            list_price: None,
            image_ref: None,
            specifications: None,
        }
    }

    fn flow() -> Flow {
        let catalog = InMemoryCatalog::new(vec![
            tire("B1", "Aspira", "80/90-14"),
            tire("B2", "IRC", "80/90-14"),
            tire("B3", "IRC", "80/90-17"),
            tire("B4", "FDR", "90/90-14"),
            tire("B5", "IRC Tire", "70/90-14"),
        ]);
        Flow::new(
            Arc::new(catalog),
            GuardedNlu::heuristic(),
            &PartsbotConfig::default(),
        )
    }

    fn session() -> Session {
        Session::new(UserId::new("u1"), partsbot_core::types::Timestamp(0))
    }

    async fn text(flow: &Flow, s: Session, t: &str) -> Transition {
        flow.step(s, FlowInput::Text(t.to_string())).await.unwrap()
    }

    async fn tap(flow: &Flow, s: Session, p: Payload) -> Transition {
        flow.step(s, FlowInput::Payload(p)).await.unwrap()
    }

    #[test]
    fn test_motor_name_strips_position() {
        assert_eq!(motor_name("Honda Beat depan"), "Honda Beat");
        assert_eq!(motor_name("belakang"), "belakang");
    }

    #[test]
    fn test_affirmative() {
        assert!(is_affirmative("Ya"));
        assert!(is_affirmative("iya betul"));
        assert!(!is_affirmative("bukan"));
        assert!(!is_affirmative(""));
    }

    #[test]
    fn test_color_request() {
        assert_eq!(color_request("Cat Biru Muda").as_deref(), Some("biru muda"));
        assert_eq!(color_request("cat"), None);
        assert_eq!(color_request("catalog"), None);
    }

    #[tokio::test]
    async fn test_ring_not_stocked_stays() {
        let f = flow();
        let t = text(&f, session(), "80/90").await;
        assert_eq!(t.session.state, FlowState::AwaitingRing);
        let t = text(&f, t.session, "12").await;
        assert_eq!(t.session.state, FlowState::AwaitingRing);
        match &t.effects[0] {
            Outbound::Text { text, .. } => assert!(text.contains("14, 17")),
            _ => panic!("expected text"),
        }
    }

    #[tokio::test]
    async fn test_unstocked_partial_size_returns_to_idle() {
        let f = flow();
        let t = text(&f, session(), "120/70").await;
        assert_eq!(t.session.state, FlowState::Idle);
        assert!(t.session.slots.is_empty());
    }

    #[tokio::test]
    async fn test_brand_prefers_longest_name() {
        let f = flow();
        let t = text(&f, session(), "ban irc tire").await;
        assert_eq!(t.session.state, FlowState::AwaitingBrandFilteredSize);
        assert_eq!(t.session.slots.brand_filter.as_deref(), Some("IRC Tire"));
    }

    #[tokio::test]
    async fn test_brand_filter_applied_to_size() {
        let f = flow();
        let t = text(&f, session(), "ban aspira").await;
        let t = text(&f, t.session, "80/90-14").await;
        assert_eq!(t.session.state, FlowState::ShowingResults);
        let results = t.session.results.unwrap();
        assert_eq!(results.items.len(), 1);
        assert_eq!(results.items[0].id, "B1");
    }

    #[tokio::test]
    async fn test_brand_filter_empty_offers_unfiltered() {
        let f = flow();
        let t = text(&f, session(), "ban fdr").await;
        let t = text(&f, t.session, "80/90-14").await;
        assert_eq!(t.session.state, FlowState::Idle);
        match &t.effects[0] {
            Outbound::Text { quick_replies, .. } => {
                assert_eq!(quick_replies[0].payload, "ALL:S:80~90-14");
            }
            _ => panic!("expected text"),
        }
        let t = tap(&f, t.session, Payload::Unfiltered(TaggedValue::size("80/90-14"))).await;
        assert_eq!(t.session.results.unwrap().items.len(), 2);
    }

    #[tokio::test]
    async fn test_brand_with_size_in_one_message() {
        let f = flow();
        let t = text(&f, session(), "ban irc 80/90").await;
        assert_eq!(t.session.state, FlowState::AwaitingRing);
        let t = text(&f, t.session, "17").await;
        assert_eq!(t.session.state, FlowState::ShowingResults);
        assert_eq!(t.session.results.unwrap().brand.as_deref(), Some("IRC"));
    }

    #[tokio::test]
    async fn test_inferred_size_confirmation() {
        let f = flow();
        let t = text(&f, session(), "ban 80 90 14").await;
        assert_eq!(t.session.state, FlowState::ConfirmingInferredSize);
        let t = text(&f, t.session, "hmm").await;
        assert_eq!(t.session.state, FlowState::ConfirmingInferredSize);
        let t = text(&f, t.session, "ya").await;
        assert_eq!(t.session.state, FlowState::ShowingResults);
        assert_eq!(t.session.slots.full_size.as_deref(), Some("80/90-14"));
    }

    #[tokio::test]
    async fn test_inferred_size_override() {
        let f = flow();
        let t = text(&f, session(), "80 90 14").await;
        let t = text(&f, t.session, "90/90-14").await;
        assert_eq!(t.session.state, FlowState::ShowingResults);
        assert_eq!(t.session.slots.full_size.as_deref(), Some("90/90-14"));
    }

    #[tokio::test]
    async fn test_cache_miss_requeries() {
        let f = flow();
        let t = text(&f, session(), "80/90-14").await;
        let mut s = t.session;
        s.results = None;
        s.state = FlowState::Idle;
        s.slots = Slots::default();
        let t = tap(
            &f,
            s,
            Payload::Order {
                results: ResultRef {
                    id: Uuid::new_v4(),
                    query: TaggedValue::size("80/90-14"),
                    brand: None,
                },
                item: "B2".to_string(),
            },
        )
        .await;
        assert_eq!(t.session.state, FlowState::ShowingResults);
        assert_eq!(t.session.selection.len(), 1);
        assert_eq!(t.session.selection[0].id, "B2");
        assert!(t.session.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn test_cache_miss_requeries_with_button_brand() {
        let f = flow();
        let t = tap(
            &f,
            session(),
            Payload::Order {
                results: ResultRef {
                    id: Uuid::new_v4(),
                    query: TaggedValue::size("80/90-14"),
                    brand: Some("IRC".to_string()),
                },
                item: "B2".to_string(),
            },
        )
        .await;
        let results = t.session.results.unwrap();
        assert_eq!(results.brand.as_deref(), Some("IRC"));
        assert_eq!(results.items.len(), 1);
        assert_eq!(t.session.selection[0].id, "B2");
    }

    #[tokio::test]
    async fn test_unknown_item_adds_nothing() {
        let f = flow();
        let t = text(&f, session(), "80/90-14").await;
        let reference = t.session.results.clone().unwrap().reference();
        let t = tap(
            &f,
            t.session,
            Payload::Order {
                results: reference,
                item: "B4".to_string(),
            },
        )
        .await;
        assert!(t.session.selection.is_empty());
        assert_eq!(t.session.state, FlowState::ShowingResults);
        match &t.effects[0] {
            Outbound::Text { text, .. } => assert!(text.contains("sudah tidak ada")),
            _ => panic!("expected text"),
        }
    }

    #[tokio::test]
    async fn test_stale_confirm_button() {
        let f = flow();
        let t = tap(&f, session(), Payload::Confirm).await;
        assert_eq!(t.session.state, FlowState::Idle);
        assert_eq!(t.effects.len(), 1);
    }

    #[tokio::test]
    async fn test_not_sure_asks_motor() {
        let f = flow();
        let t = tap(&f, session(), Payload::NotSure).await;
        assert_eq!(t.session.state, FlowState::AwaitingMotorType);
        let t = text(&f, t.session, "Yamaha Mio").await;
        assert_eq!(t.session.state, FlowState::AwaitingMotorPosition);
        assert_eq!(t.session.slots.motor_type.as_deref(), Some("Yamaha Mio"));
        let t = tap(&f, t.session, Payload::Position(MotorPosition::Front)).await;
        assert_eq!(t.session.state, FlowState::ShowingMotorRecommendations);
    }

    #[tokio::test]
    async fn test_restart_keeps_selection() {
        let f = flow();
        let t = text(&f, session(), "80/90-14").await;
        let results = t.session.results.clone().unwrap();
        let t = tap(
            &f,
            t.session,
            Payload::Order {
                results: results.reference(),
                item: results.items[0].id.clone(),
            },
        )
        .await;
        let t = tap(&f, t.session, Payload::Restart).await;
        assert_eq!(t.session.state, FlowState::Idle);
        assert!(t.session.slots.is_empty());
        assert_eq!(t.session.selection.len(), 1);
    }

    #[tokio::test]
    async fn test_finish_is_terminal() {
        let f = flow();
        let t = tap(&f, session(), Payload::Finish).await;
        assert!(t.terminal);
        assert_eq!(t.session.state, FlowState::Idle);
    }

    #[tokio::test]
    async fn test_corrupt_ring_state_is_fatal() {
        let f = flow();
        let mut s = session();
        s.state = FlowState::AwaitingRing;
        let err = f
            .step(s, FlowInput::Text("14".to_string()))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_width_out_of_range_distinct_message() {
        let f = flow();
        let t = text(&f, session(), "200").await;
        assert_eq!(t.session.state, FlowState::Idle);
        match &t.effects[0] {
            Outbound::Text { text, .. } => assert!(text.contains("di luar jangkauan (60-140)")),
            _ => panic!("expected text"),
        }
    }

    #[tokio::test]
    async fn test_out_of_range_keeps_brand_prompt() {
        let f = flow();
        let t = text(&f, session(), "ban irc").await;
        let t = text(&f, t.session, "45").await;
        assert_eq!(t.session.state, FlowState::AwaitingBrandFilteredSize);
        assert_eq!(t.session.slots.brand_filter.as_deref(), Some("IRC"));
        match &t.effects[0] {
            Outbound::Text { text, .. } => assert!(text.contains("Lebar ban 45")),
            _ => panic!("expected text"),
        }
    }

    #[tokio::test]
    async fn test_unrecognized_text_keeps_results() {
        let f = flow();
        let t = text(&f, session(), "80/90-14").await;
        let id = t.session.results.as_ref().unwrap().id;
        let t = text(&f, t.session, "zzqx").await;
        assert_eq!(t.session.state, FlowState::ShowingResults);
        assert_eq!(t.session.results.unwrap().id, id);
        match &t.effects[0] {
            Outbound::Text { text, .. } => assert!(text.contains("belum mengerti")),
            _ => panic!("expected text"),
        }
    }

    #[tokio::test]
    async fn test_width_only_shows_filtered_menu() {
        let f = flow();
        let t = text(&f, session(), "80").await;
        match &t.effects[0] {
            Outbound::Text { quick_replies, .. } => {
                let payloads: Vec<&str> =
                    quick_replies.iter().map(|b| b.payload.as_str()).collect();
                assert_eq!(payloads, vec!["SEL:S:80~90-14", "SEL:S:80~90-17", "UNSURE"]);
            }
            _ => panic!("expected text"),
        }
    }
}
