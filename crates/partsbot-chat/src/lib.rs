//! Conversational session engine for the partsbot shop assistant.
//!
//! Turns free text and button taps into catalog queries: size parsing,
//! keyword matching, compact button payloads, paginated results and a
//! per-user disambiguation state machine.

pub mod catalog;
pub mod codec;
pub mod error;
pub mod flow;
pub mod keywords;
pub mod nlu;
pub mod paginate;
pub mod payload;
pub mod router;
pub mod session;
pub mod size;

pub use catalog::{CatalogError, CatalogLookup, InMemoryCatalog};
pub use error::ChatError;
pub use flow::state::FlowState;
pub use flow::{Flow, FlowInput, Transition};
pub use nlu::{GuardedNlu, HeuristicNlu, MotorPosition, NluAdapter, NluError, SizeRecommendation};
pub use payload::{Payload, PayloadError, ResultRef, TaggedValue, ValueKind};
pub use router::IntentRouter;
pub use session::{Session, SessionStore, Slots};
pub use size::TireSize;
