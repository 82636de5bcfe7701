//! Publication lifecycle: events and state transitions for one record.

pub mod events;
pub mod service;

pub use events::{
    EventDispatcher, Listener, ListenerError, ListenerResult, ModelEvent, MuteGuard, Propagation,
};
pub use service::PublicationService;
