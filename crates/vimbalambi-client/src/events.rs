//! Events observable through the subscriber table: the six wire kinds plus
//! the manager's local connection-state events.

use vimbalambi_proto::{
    CallRequestData, CallResponseData, EventPayload, MessageData, PresenceData, TypingData,
};

#[derive(Debug, Clone)]
pub enum ClientEvent {
    Message(MessageData),
    UserOnline(PresenceData),
    UserOffline(PresenceData),
    Typing(TypingData),
    CallRequest(CallRequestData),
    CallResponse(CallResponseData),
    /// Transport opened (including reopens after a reconnect).
    Connected,
    /// Transport closed; the reconnect routine may still bring it back.
    Disconnected,
    /// Terminal: the reconnect budget is spent. Only a fresh manager
    /// recovers from this.
    ReconnectExhausted,
}

/// Subscription key: the discriminant of [`ClientEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    UserOnline,
    UserOffline,
    Typing,
    CallRequest,
    CallResponse,
    Connected,
    Disconnected,
    ReconnectExhausted,
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Message(_) => EventKind::Message,
            ClientEvent::UserOnline(_) => EventKind::UserOnline,
            ClientEvent::UserOffline(_) => EventKind::UserOffline,
            ClientEvent::Typing(_) => EventKind::Typing,
            ClientEvent::CallRequest(_) => EventKind::CallRequest,
            ClientEvent::CallResponse(_) => EventKind::CallResponse,
            ClientEvent::Connected => EventKind::Connected,
            ClientEvent::Disconnected => EventKind::Disconnected,
            ClientEvent::ReconnectExhausted => EventKind::ReconnectExhausted,
        }
    }
}

impl From<EventPayload> for ClientEvent {
    fn from(payload: EventPayload) -> Self {
        match payload {
            EventPayload::Message(data) => ClientEvent::Message(data),
            EventPayload::UserOnline(data) => ClientEvent::UserOnline(data),
            EventPayload::UserOffline(data) => ClientEvent::UserOffline(data),
            EventPayload::Typing(data) => ClientEvent::Typing(data),
            EventPayload::CallRequest(data) => ClientEvent::CallRequest(data),
            EventPayload::CallResponse(data) => ClientEvent::CallResponse(data),
        }
    }
}
