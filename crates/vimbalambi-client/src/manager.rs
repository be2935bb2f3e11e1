//! The connection manager: one relay link, owned by whoever constructs it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use vimbalambi_proto::envelope::{self, Envelope};
use vimbalambi_proto::{
    CallRequestData, CallResponseData, CallType, EventPayload, MessageData, PresenceData,
    TypingData,
};

use crate::config::ClientConfig;
use crate::events::{ClientEvent, EventKind};
use crate::subscribers::{SubscriberTable, Subscription};

/// Locally-known identity, as resolved by the identity provider.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub uid: String,
    pub display_name: Option<String>,
}

enum Command {
    Frame(String),
    Close,
}

/// Owns the single connection to the relay.
///
/// Lifecycle belongs to the owner: nothing connects at construction, and
/// `connect` is idempotent while the driver lives. Outbound sends are
/// fire-and-forget; while the link is down they are dropped with a warning,
/// never queued. Once the reconnect budget is exhausted the manager is
/// permanently offline and a fresh instance is required.
pub struct ConnectionManager {
    inner: Arc<Inner>,
    cmd_tx: mpsc::Sender<Command>,
    cmd_rx: Mutex<Option<mpsc::Receiver<Command>>>,
    driver_started: AtomicBool,
}

struct Inner {
    config: ClientConfig,
    subscribers: SubscriberTable,
    current_user: Mutex<Option<UserIdentity>>,
    connected: AtomicBool,
    shutdown: AtomicBool,
}

impl Inner {
    fn user(&self) -> Option<UserIdentity> {
        self.current_user.lock().ok().and_then(|guard| guard.clone())
    }

    fn dispatch_frame(&self, text: &str) {
        match envelope::decode(text) {
            Ok(env) => self.subscribers.emit(&ClientEvent::from(env.payload)),
            Err(e) => tracing::warn!(error = %e, "dropping malformed frame"),
        }
    }
}

impl ConnectionManager {
    pub fn new(config: ClientConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        Self {
            inner: Arc::new(Inner {
                config,
                subscribers: SubscriberTable::new(),
                current_user: Mutex::new(None),
                connected: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
            }),
            cmd_tx,
            cmd_rx: Mutex::new(Some(cmd_rx)),
            driver_started: AtomicBool::new(false),
        }
    }

    /// Start the connection driver. A no-op while the driver is alive, so a
    /// redundant call on an already-open link cannot open a second one.
    pub fn connect(&self) {
        if self.driver_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(cmd_rx) = self.cmd_rx.lock().ok().and_then(|mut guard| guard.take()) else {
            return;
        };
        tokio::spawn(drive(Arc::clone(&self.inner), cmd_rx));
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Stamp and transmit an envelope if the link is open; otherwise a
    /// logged no-op. Never blocks, never queues for later delivery.
    pub fn send(&self, payload: EventPayload) {
        if !self.is_connected() {
            tracing::warn!(kind = payload.kind(), "relay link not open, dropping envelope");
            return;
        }
        self.transmit(payload);
    }

    pub fn on(
        &self,
        kind: EventKind,
        callback: impl Fn(&ClientEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.subscribers.on(kind, Arc::new(callback))
    }

    pub fn off(&self, sub: Subscription) -> bool {
        self.inner.subscribers.off(sub)
    }

    /// Record the local identity; announce it immediately when the link is
    /// already open. Reconnects re-announce the recorded identity.
    pub fn set_user(&self, user: UserIdentity) {
        let uid = user.uid.clone();
        if let Ok(mut guard) = self.inner.current_user.lock() {
            *guard = Some(user);
        }
        if self.is_connected() {
            self.transmit(EventPayload::UserOnline(PresenceData { user_id: uid }));
        }
    }

    pub fn send_message(
        &self,
        conversation_id: i64,
        content: impl Into<String>,
        media_url: Option<String>,
    ) {
        let Some(user) = self.inner.user() else {
            tracing::warn!("no local identity, dropping message send");
            return;
        };
        self.send(EventPayload::Message(MessageData {
            conversation_id,
            content: Some(content.into()),
            media_url,
            sender_id: user.uid,
        }));
    }

    pub fn send_typing(&self, conversation_id: i64, is_typing: bool) {
        let Some(user) = self.inner.user() else {
            tracing::warn!("no local identity, dropping typing send");
            return;
        };
        self.send(EventPayload::Typing(TypingData {
            conversation_id,
            is_typing,
            user_id: user.uid,
        }));
    }

    pub fn initiate_call(&self, target_user_id: impl Into<String>, call_type: CallType) {
        let Some(user) = self.inner.user() else {
            tracing::warn!("no local identity, dropping call request");
            return;
        };
        self.send(EventPayload::CallRequest(CallRequestData {
            target_user_id: target_user_id.into(),
            call_type,
            caller_id: user.uid,
        }));
    }

    pub fn respond_to_call(&self, call_id: impl Into<String>, accept: bool) {
        let Some(user) = self.inner.user() else {
            tracing::warn!("no local identity, dropping call response");
            return;
        };
        self.send(EventPayload::CallResponse(CallResponseData {
            call_id: call_id.into(),
            accept,
            user_id: user.uid,
        }));
    }

    /// Best-effort `user_offline` (when an identity is known) and close.
    /// Fire-and-forget: no acknowledgement is awaited, and the driver does
    /// not reconnect afterwards.
    pub fn disconnect(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        if self.is_connected() {
            if let Some(user) = self.inner.user() {
                self.transmit(EventPayload::UserOffline(PresenceData { user_id: user.uid }));
            }
        }
        let _ = self.cmd_tx.try_send(Command::Close);
    }

    fn transmit(&self, payload: EventPayload) {
        let kind = payload.kind();
        match envelope::encode(&Envelope::now(payload)) {
            Ok(text) => {
                if self.cmd_tx.try_send(Command::Frame(text)).is_err() {
                    tracing::warn!(kind, "outbound queue unavailable, dropping envelope");
                }
            }
            Err(e) => tracing::warn!(error = %e, kind, "failed to encode envelope"),
        }
    }
}

/// Connection driver: connect, run the session, then retry on a fixed delay
/// until the budget is spent or the owner disconnects.
async fn drive(inner: Arc<Inner>, mut cmd_rx: mpsc::Receiver<Command>) {
    let mut attempts: u32 = 0;
    loop {
        if inner.shutdown.load(Ordering::SeqCst) {
            return;
        }

        match connect_async(inner.config.url.as_str()).await {
            Ok((stream, _)) => {
                // anything enqueued while the link was down is stale
                while cmd_rx.try_recv().is_ok() {}

                attempts = 0;
                inner.connected.store(true, Ordering::SeqCst);
                inner.subscribers.emit(&ClientEvent::Connected);
                tracing::info!(url = %inner.config.url, "relay link open");

                let (mut ws_tx, mut ws_rx) = stream.split();

                // re-announce presence on every (re)open
                if let Some(user) = inner.user() {
                    let announce = Envelope::now(EventPayload::UserOnline(PresenceData {
                        user_id: user.uid,
                    }));
                    if let Ok(text) = envelope::encode(&announce) {
                        let _ = ws_tx.send(WsMessage::Text(text)).await;
                    }
                }

                loop {
                    tokio::select! {
                        cmd = cmd_rx.recv() => match cmd {
                            Some(Command::Frame(text)) => {
                                if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Command::Close) | None => {
                                inner.shutdown.store(true, Ordering::SeqCst);
                                let _ = ws_tx.send(WsMessage::Close(None)).await;
                                break;
                            }
                        },

                        frame = ws_rx.next() => match frame {
                            Some(Ok(WsMessage::Text(text))) => inner.dispatch_frame(&text),
                            Some(Ok(WsMessage::Ping(payload))) => {
                                let _ = ws_tx.send(WsMessage::Pong(payload)).await;
                            }
                            Some(Ok(WsMessage::Close(_))) | None => break,
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "relay link error");
                                break;
                            }
                            Some(Ok(_)) => {}
                        }
                    }
                }

                inner.connected.store(false, Ordering::SeqCst);
                inner.subscribers.emit(&ClientEvent::Disconnected);
                tracing::info!("relay link closed");
            }
            Err(e) => {
                tracing::warn!(error = %e, "relay connect failed");
            }
        }

        if inner.shutdown.load(Ordering::SeqCst) {
            return;
        }
        if attempts >= inner.config.reconnect.max_attempts {
            tracing::warn!(
                max_attempts = inner.config.reconnect.max_attempts,
                "reconnect budget exhausted"
            );
            inner.subscribers.emit(&ClientEvent::ReconnectExhausted);
            return;
        }
        attempts += 1;
        tracing::info!(
            attempt = attempts,
            max_attempts = inner.config.reconnect.max_attempts,
            "scheduling reconnect"
        );
        tokio::time::sleep(inner.config.reconnect.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(ClientConfig::new("ws://127.0.0.1:9/ws"))
    }

    #[test]
    fn send_while_disconnected_is_a_quiet_no_op() {
        let m = manager();
        assert!(!m.is_connected());
        m.send(EventPayload::UserOnline(PresenceData {
            user_id: "alice".into(),
        }));
    }

    #[test]
    fn convenience_senders_require_an_identity() {
        let m = manager();
        // no identity recorded; all of these drop without panicking
        m.send_message(1, "hi", None);
        m.send_typing(1, true);
        m.initiate_call("bob", CallType::Voice);
        m.respond_to_call("c-1", true);
    }

    #[test]
    fn set_user_before_connect_records_identity_silently() {
        let m = manager();
        m.set_user(UserIdentity {
            uid: "alice".into(),
            display_name: Some("Alice".into()),
        });
        assert_eq!(m.inner.user().map(|u| u.uid), Some("alice".to_string()));
        assert!(!m.is_connected());
    }
}
