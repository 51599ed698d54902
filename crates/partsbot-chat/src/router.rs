//! Inbound event dispatch.
//!
//! The router owns the session store. For each event it takes the user's
//! gate, loads the session, turns the event into a [`FlowInput`], steps the
//! flow and writes the result back. Direct commands ("selesai", "ulang",
//! "katalog", ...) are recognized here and handed to the flow as the same
//! payloads their buttons carry.

use std::sync::Arc;

use partsbot_core::types::{Category, InboundEvent, Outbound, Timestamp, UserId};
use tracing::{debug, error, info};

use crate::error::ChatError;
use crate::flow::{Flow, FlowInput, Transition};
use crate::keywords::normalize_name;
use crate::payload::{Payload, TaggedValue, ValueKind};
use crate::session::{Session, SessionStore};

/// Dispatches inbound events to the flow, one at a time per user.
pub struct IntentRouter {
    flow: Flow,
    store: Arc<SessionStore>,
    max_message_chars: usize,
}

impl IntentRouter {
    pub fn new(flow: Flow, store: Arc<SessionStore>, max_message_chars: usize) -> Self {
        Self {
            flow,
            store,
            max_message_chars,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Handle one event at the current time.
    pub async fn handle(&self, user: &UserId, event: InboundEvent) -> Result<Vec<Outbound>, ChatError> {
        self.handle_at(user, event, Timestamp::now()).await
    }

    /// Handle one event as if received at `now`.
    ///
    /// Only storage failures are returned as errors. A corrupted session is
    /// replaced with a fresh one and the user is asked to start over.
    pub async fn handle_at(
        &self,
        user: &UserId,
        event: InboundEvent,
        now: Timestamp,
    ) -> Result<Vec<Outbound>, ChatError> {
        let _gate = self.store.lock_user(user).await?;

        let session = self.store.get_or_create(user, now)?;
        if let Err(e) = session.check_invariants() {
            return self.reset(user, now, &e);
        }

        let input = match self.classify(event) {
            Some(input) => input,
            None => {
                debug!(user_id = %user, "Undecodable button token");
                self.touch(session, now)?;
                return Ok(vec![self.flow.renderer().stale_button()]);
            }
        };

        let Transition {
            mut session,
            effects,
            terminal,
        } = match self.flow.step(session, input).await {
            Ok(transition) => transition,
            Err(e) if e.is_fatal() => return self.reset(user, now, &e),
            Err(e) => return Err(e),
        };

        if terminal {
            self.store.evict(user)?;
            return Ok(effects);
        }

        if let Err(e) = session.check_invariants() {
            return self.reset(user, now, &e);
        }
        session.last_activity = now;
        self.store.put(session)?;
        Ok(effects)
    }

    /// Turn an inbound event into flow input. `None` for a token that does
    /// not decode.
    fn classify(&self, event: InboundEvent) -> Option<FlowInput> {
        match event {
            InboundEvent::FreeText(text) => {
                let text = truncate_chars(&text, self.max_message_chars);
                Some(match command(text) {
                    Some(payload) => FlowInput::Payload(payload),
                    None => FlowInput::Text(text.to_string()),
                })
            }
            InboundEvent::QuickReply(token) | InboundEvent::Postback(token) => {
                match Payload::decode(&token) {
                    Ok(payload) => Some(FlowInput::Payload(payload)),
                    Err(e) => {
                        debug!(token = %token, error = %e, "Payload decode failed");
                        None
                    }
                }
            }
        }
    }

    fn touch(&self, mut session: Session, now: Timestamp) -> Result<(), ChatError> {
        session.last_activity = now;
        self.store.put(session)
    }

    fn reset(&self, user: &UserId, now: Timestamp, cause: &ChatError) -> Result<Vec<Outbound>, ChatError> {
        error!(user_id = %user, error = %cause, "Session corrupted, resetting");
        let mut fresh = Session::new(user.clone(), now);
        if let Some(old) = self.store.get(user)? {
            fresh.selection = old.selection;
        }
        self.store.put(fresh)?;
        info!(user_id = %user, "Session reset to idle");
        Ok(vec![self.flow.renderer().session_reset()])
    }
}

/// Typed commands that behave like their buttons.
fn command(text: &str) -> Option<Payload> {
    let normalized = normalize_name(text);
    match normalized.as_str() {
        "selesai" | "finish" | "checkout" => return Some(Payload::Finish),
        "ulang" | "restart" | "reset" | "batal" | "mulai lagi" => return Some(Payload::Restart),
        "katalog" | "menu" | "produk" | "kategori" | "categories" => {
            return Some(Payload::CategoryMenu)
        }
        "bantuan" | "help" => return Some(Payload::Help),
        "mulai" | "start" | "get started" => return Some(Payload::GetStarted),
        _ => {}
    }
    if let Some(category) = Category::from_keyword(&normalized) {
        return Some(Payload::Category(category));
    }

    let trimmed = text.trim();
    let lowered = trimmed.to_lowercase();
    ["cari ", "search "].iter().find_map(|prefix| {
        lowered
            .strip_prefix(prefix)
            .and_then(|_| trimmed.get(prefix.len()..))
            .map(str::trim)
            .filter(|query| !query.is_empty())
            .map(|query| Payload::Select(TaggedValue::new(ValueKind::Search, query)))
    })
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::flow::state::FlowState;
    use crate::nlu::GuardedNlu;
    use partsbot_core::config::PartsbotConfig;
    use partsbot_core::types::CatalogItem;

    fn router() -> IntentRouter {
        let items = vec![CatalogItem {
            id: "B1".to_string(),
            name: "Aspira Premio 80/90-14".to_string(),
            brand: Some("Aspira".to_string()),
            category: Category::Tire,
            size_spec: Some("80/90-14".to_string()),
            price: Some(185_000),
            list_price: None,
            image_ref: None,
            specifications: None,
        }];
        let config = PartsbotConfig::default();
        let flow = Flow::new(
            Arc::new(InMemoryCatalog::new(items)),
            GuardedNlu::heuristic(),
            &config,
        );
        IntentRouter::new(flow, Arc::new(SessionStore::new(60)), 50)
    }

    fn user() -> UserId {
        UserId::new("router-test")
    }

    fn state(r: &IntentRouter) -> FlowState {
        r.store().get(&user()).unwrap().unwrap().state
    }

    #[test]
    fn test_commands() {
        assert_eq!(command("Selesai"), Some(Payload::Finish));
        assert_eq!(command(" ULANG "), Some(Payload::Restart));
        assert_eq!(command("katalog"), Some(Payload::CategoryMenu));
        assert_eq!(command("lampu"), Some(Payload::Category(Category::Lamp)));
        assert_eq!(command("80/90-14"), None);
        assert_eq!(command("ban aspira"), None);
    }

    #[test]
    fn test_search_command_keeps_case() {
        assert_eq!(
            command("Cari Lampu LED"),
            Some(Payload::Select(TaggedValue::new(ValueKind::Search, "Lampu LED")))
        );
        assert_eq!(command("cari   "), None);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[tokio::test]
    async fn test_text_reaches_results() {
        let r = router();
        let out = r
            .handle(&user(), InboundEvent::FreeText("80/90-14".to_string()))
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(state(&r), FlowState::ShowingResults);
    }

    #[tokio::test]
    async fn test_bad_token_is_stale_button() {
        let r = router();
        let out = r
            .handle(&user(), InboundEvent::Postback("NOPE:1".to_string()))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(state(&r), FlowState::Idle);
    }

    #[tokio::test]
    async fn test_finish_evicts() {
        let r = router();
        r.handle(&user(), InboundEvent::FreeText("80/90-14".to_string()))
            .await
            .unwrap();
        r.handle(&user(), InboundEvent::FreeText("selesai".to_string()))
            .await
            .unwrap();
        assert!(r.store().get(&user()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupted_session_reset() {
        let r = router();
        let mut broken = Session::new(user(), Timestamp::now());
        broken.state = FlowState::AwaitingRing;
        r.store().put(broken).unwrap();

        let out = r
            .handle(&user(), InboundEvent::FreeText("14".to_string()))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        match &out[0] {
            Outbound::Text { text, .. } => assert!(text.contains("mulai dari awal")),
            _ => panic!("expected text"),
        }
        assert_eq!(state(&r), FlowState::Idle);
    }

    #[tokio::test]
    async fn test_category_command_short_circuits() {
        let r = router();
        r.handle(&user(), InboundEvent::FreeText("80/90".to_string()))
            .await
            .unwrap();
        assert_eq!(state(&r), FlowState::AwaitingRing);
        r.handle(&user(), InboundEvent::FreeText("katalog".to_string()))
            .await
            .unwrap();
        assert_eq!(state(&r), FlowState::Idle);
    }
}
