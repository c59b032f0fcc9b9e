//! Message envelope model.
//!
//! [`Message`] is the unit of transport: an id, string metadata and an
//! opaque payload, plus provenance set by the adapter on delivery. Exactly
//! one of [`Message::acknowledge`] / [`Message::reject`] takes effect per
//! delivery.

mod envelope;
mod message;
pub mod metadata_keys;

pub use envelope::EventEnvelope;
pub(crate) use envelope::peek_event_type;
pub use message::{Acknowledger, Message, Outcome};
