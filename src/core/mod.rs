//! Core module - event bus and the per-device session

mod event_bus;
mod session;

pub use event_bus::{Event, EventBus, EventPayload, EventType};
pub use session::{DebugControls, Session, SessionBuilder};
