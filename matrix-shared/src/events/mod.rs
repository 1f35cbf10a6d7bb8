/// Live events
///
/// Committed chat messages and notifications are fanned out to connected
/// SSE clients through [`EventHub`].

pub mod hub;

pub use hub::{EventHub, LiveEvent, Subscription, DEFAULT_CAPACITY};
