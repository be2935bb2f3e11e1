//! Envelope dispatch: registry effects and fan-out rules.

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::mpsc;

use vimbalambi_proto::envelope::{self, Envelope, EventPayload, PresenceData};

use crate::metrics::RelayMetrics;
use crate::registry::{Connection, UserRegistry};
use crate::store::MessageStore;

/// Routing core. Holds no message history; the hard guarantee is ordering
/// per connection, delivery is best-effort to whoever is connected at
/// broadcast time.
pub struct RelayCore {
    registry: UserRegistry,
    store: Arc<dyn MessageStore>,
    metrics: Arc<RelayMetrics>,
}

impl RelayCore {
    pub fn new(store: Arc<dyn MessageStore>, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            registry: UserRegistry::new(),
            store,
            metrics,
        }
    }

    pub fn registry(&self) -> &UserRegistry {
        &self.registry
    }

    /// Apply one inbound envelope from the connection identified by
    /// `conn_id`, whose outbound queue is `out_tx`.
    pub async fn dispatch(&self, conn_id: u64, out_tx: &mpsc::Sender<Message>, env: Envelope) {
        match env.payload {
            EventPayload::UserOnline(p) => {
                let user = p.user_id.clone();
                self.registry.insert(
                    user.clone(),
                    Connection {
                        conn_id,
                        tx: out_tx.clone(),
                    },
                );
                tracing::info!(user = %user, online = self.registry.online_count(), "user online");
                self.broadcast_except(&user, EventPayload::UserOnline(p));
            }

            EventPayload::UserOffline(p) => {
                let user = p.user_id.clone();
                self.registry.remove(&user);
                tracing::info!(user = %user, online = self.registry.online_count(), "user offline");
                self.broadcast_except(&user, EventPayload::UserOffline(p));
            }

            EventPayload::Message(m) => {
                if let Err(e) = self.store.append(&m, env.timestamp).await {
                    tracing::warn!(error = %e, conversation = m.conversation_id, "message append failed");
                }
                let sender = m.sender_id.clone();
                self.broadcast_except(&sender, EventPayload::Message(m));
            }

            EventPayload::Typing(t) => {
                let typist = t.user_id.clone();
                self.broadcast_except(&typist, EventPayload::Typing(t));
            }

            EventPayload::CallRequest(c) => {
                let target = c.target_user_id.clone();
                match self.registry.get(&target) {
                    Some(conn) => self.send_single(&target, &conn, EventPayload::CallRequest(c)),
                    None => {
                        // no delivery guarantee; the caller gets no signal either
                        tracing::debug!(callee = %target, "call request target not online, dropping");
                    }
                }
            }

            EventPayload::CallResponse(c) => {
                let responder = c.user_id.clone();
                self.broadcast_except(&responder, EventPayload::CallResponse(c));
            }
        }
    }

    /// Transport closed without a `user_offline`. Deregister whichever user
    /// this socket still represents and announce the departure, excluding
    /// the departed user just like a client-sent `user_offline`.
    pub fn handle_disconnect(&self, conn_id: u64) {
        if let Some(user) = self.registry.remove_by_conn(conn_id) {
            tracing::info!(user = %user, online = self.registry.online_count(), "connection closed, user offline");
            self.broadcast_except(
                &user,
                EventPayload::UserOffline(PresenceData {
                    user_id: user.clone(),
                }),
            );
        }
    }

    /// Serialize once, then fan out to every registered connection except
    /// the excluded user. Unreachable queues are skipped, never retried.
    fn broadcast_except(&self, exclude_user: &str, payload: EventPayload) {
        let kind = payload.kind();
        let env = Envelope::now(payload);
        let text = match envelope::encode(&env) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, kind, "failed to encode outbound envelope");
                return;
            }
        };

        for (user, conn) in self.registry.connections() {
            if user == exclude_user {
                continue;
            }
            if conn.tx.try_send(Message::Text(text.clone())).is_err() {
                self.metrics.send_dropped();
                tracing::debug!(user = %user, kind, "recipient queue unavailable, skipping");
            }
        }
        self.metrics.relayed(kind);
    }

    fn send_single(&self, user: &str, conn: &Connection, payload: EventPayload) {
        let kind = payload.kind();
        let env = Envelope::now(payload);
        match envelope::encode(&env) {
            Ok(text) => {
                if conn.tx.try_send(Message::Text(text)).is_err() {
                    self.metrics.send_dropped();
                    tracing::debug!(user = %user, kind, "recipient queue unavailable, skipping");
                } else {
                    self.metrics.relayed(kind);
                }
            }
            Err(e) => tracing::warn!(error = %e, kind, "failed to encode outbound envelope"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryMessageStore, MessageStore as _};
    use tokio::sync::mpsc::{self, Receiver, Sender};
    use vimbalambi_proto::{CallRequestData, CallType, MessageData, TypingData};

    fn test_core() -> RelayCore {
        RelayCore::new(
            Arc::new(InMemoryMessageStore::new()),
            Arc::new(RelayMetrics::new()),
        )
    }

    fn queue(core: &RelayCore) -> (u64, Sender<Message>, Receiver<Message>) {
        let (tx, rx) = mpsc::channel(16);
        (core.registry().next_conn_id(), tx, rx)
    }

    fn online(user: &str) -> Envelope {
        Envelope::now(EventPayload::UserOnline(PresenceData {
            user_id: user.into(),
        }))
    }

    fn offline(user: &str) -> Envelope {
        Envelope::now(EventPayload::UserOffline(PresenceData {
            user_id: user.into(),
        }))
    }

    fn chat(sender: &str, text: &str) -> Envelope {
        Envelope::now(EventPayload::Message(MessageData {
            conversation_id: 1,
            content: Some(text.into()),
            media_url: None,
            sender_id: sender.into(),
        }))
    }

    fn next_payload(rx: &mut Receiver<Message>) -> Option<EventPayload> {
        match rx.try_recv() {
            Ok(Message::Text(text)) => Some(envelope::decode(&text).unwrap().payload),
            Ok(other) => panic!("unexpected frame: {other:?}"),
            Err(_) => None,
        }
    }

    fn drain(rx: &mut Receiver<Message>) {
        while rx.try_recv().is_ok() {}
    }

    #[tokio::test]
    async fn online_then_offline_clears_registry() {
        let core = test_core();
        let (conn, tx, _rx) = queue(&core);

        core.dispatch(conn, &tx, online("alice")).await;
        assert!(core.registry().get("alice").is_some());

        core.dispatch(conn, &tx, offline("alice")).await;
        assert!(core.registry().get("alice").is_none());
    }

    #[tokio::test]
    async fn message_reaches_every_peer_except_sender() {
        let core = test_core();
        let (a_conn, a_tx, mut a_rx) = queue(&core);
        let (b_conn, b_tx, mut b_rx) = queue(&core);
        let (c_conn, c_tx, mut c_rx) = queue(&core);

        core.dispatch(a_conn, &a_tx, online("alice")).await;
        core.dispatch(b_conn, &b_tx, online("bob")).await;
        core.dispatch(c_conn, &c_tx, online("carol")).await;
        drain(&mut a_rx);
        drain(&mut b_rx);
        drain(&mut c_rx);

        core.dispatch(a_conn, &a_tx, chat("alice", "hi")).await;

        for rx in [&mut b_rx, &mut c_rx] {
            match next_payload(rx) {
                Some(EventPayload::Message(m)) => {
                    assert_eq!(m.content.as_deref(), Some("hi"));
                    assert_eq!(m.sender_id, "alice");
                }
                other => panic!("expected message, got {other:?}"),
            }
            // exactly once
            assert!(next_payload(rx).is_none());
        }
        assert!(next_payload(&mut a_rx).is_none());
    }

    #[tokio::test]
    async fn typing_is_not_echoed_to_typist() {
        let core = test_core();
        let (a_conn, a_tx, mut a_rx) = queue(&core);
        let (b_conn, b_tx, mut b_rx) = queue(&core);

        core.dispatch(a_conn, &a_tx, online("alice")).await;
        core.dispatch(b_conn, &b_tx, online("bob")).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        let typing = Envelope::now(EventPayload::Typing(TypingData {
            conversation_id: 1,
            is_typing: true,
            user_id: "alice".into(),
        }));
        core.dispatch(a_conn, &a_tx, typing).await;

        match next_payload(&mut b_rx) {
            Some(EventPayload::Typing(t)) => assert!(t.is_typing),
            other => panic!("expected typing, got {other:?}"),
        }
        assert!(next_payload(&mut a_rx).is_none());
    }

    #[tokio::test]
    async fn call_request_is_targeted() {
        let core = test_core();
        let (a_conn, a_tx, mut a_rx) = queue(&core);
        let (b_conn, b_tx, mut b_rx) = queue(&core);
        let (c_conn, c_tx, mut c_rx) = queue(&core);

        core.dispatch(a_conn, &a_tx, online("alice")).await;
        core.dispatch(b_conn, &b_tx, online("bob")).await;
        core.dispatch(c_conn, &c_tx, online("carol")).await;
        drain(&mut a_rx);
        drain(&mut b_rx);
        drain(&mut c_rx);

        let call = Envelope::now(EventPayload::CallRequest(CallRequestData {
            target_user_id: "bob".into(),
            call_type: CallType::Video,
            caller_id: "alice".into(),
        }));
        core.dispatch(a_conn, &a_tx, call).await;

        match next_payload(&mut b_rx) {
            Some(EventPayload::CallRequest(c)) => {
                assert_eq!(c.caller_id, "alice");
                assert_eq!(c.call_type, CallType::Video);
            }
            other => panic!("expected call request, got {other:?}"),
        }
        assert!(next_payload(&mut a_rx).is_none());
        assert!(next_payload(&mut c_rx).is_none());
    }

    #[tokio::test]
    async fn call_request_to_absent_target_is_silently_dropped() {
        let core = test_core();
        let (a_conn, a_tx, mut a_rx) = queue(&core);
        let (b_conn, b_tx, mut b_rx) = queue(&core);

        core.dispatch(a_conn, &a_tx, online("alice")).await;
        core.dispatch(b_conn, &b_tx, online("bob")).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        let call = Envelope::now(EventPayload::CallRequest(CallRequestData {
            target_user_id: "nobody".into(),
            call_type: CallType::Voice,
            caller_id: "alice".into(),
        }));
        core.dispatch(a_conn, &a_tx, call).await;

        assert!(next_payload(&mut a_rx).is_none());
        assert!(next_payload(&mut b_rx).is_none());
    }

    #[tokio::test]
    async fn abrupt_close_synthesizes_offline_broadcast() {
        let core = test_core();
        let (a_conn, a_tx, mut a_rx) = queue(&core);
        let (b_conn, b_tx, mut b_rx) = queue(&core);

        core.dispatch(a_conn, &a_tx, online("alice")).await;
        core.dispatch(b_conn, &b_tx, online("bob")).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        core.handle_disconnect(a_conn);

        assert!(core.registry().get("alice").is_none());
        match next_payload(&mut b_rx) {
            Some(EventPayload::UserOffline(p)) => assert_eq!(p.user_id, "alice"),
            other => panic!("expected offline broadcast, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn newest_connection_wins_and_stale_close_is_inert() {
        let core = test_core();
        let (old_conn, old_tx, mut old_rx) = queue(&core);
        let (b_conn, b_tx, mut b_rx) = queue(&core);
        let (new_conn, new_tx, mut new_rx) = queue(&core);

        core.dispatch(old_conn, &old_tx, online("alice")).await;
        core.dispatch(b_conn, &b_tx, online("bob")).await;
        // alice reconnects elsewhere; the new registration overwrites
        core.dispatch(new_conn, &new_tx, online("alice")).await;
        drain(&mut old_rx);
        drain(&mut b_rx);
        drain(&mut new_rx);

        // the superseded socket closing must not evict the new entry
        core.handle_disconnect(old_conn);
        assert!(core.registry().get("alice").is_some());
        assert!(next_payload(&mut b_rx).is_none());

        core.dispatch(b_conn, &b_tx, chat("bob", "still there?")).await;
        match next_payload(&mut new_rx) {
            Some(EventPayload::Message(m)) => {
                assert_eq!(m.content.as_deref(), Some("still there?"))
            }
            other => panic!("expected message on the new connection, got {other:?}"),
        }
        assert!(next_payload(&mut old_rx).is_none());
    }

    #[tokio::test]
    async fn relayed_messages_are_appended_to_the_store() {
        let store = Arc::new(InMemoryMessageStore::new());
        let core = RelayCore::new(store.clone(), Arc::new(RelayMetrics::new()));
        let (a_conn, a_tx, _a_rx) = queue(&core);

        core.dispatch(a_conn, &a_tx, online("alice")).await;
        core.dispatch(a_conn, &a_tx, chat("alice", "hi")).await;

        let history = store.history(1, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content.as_deref(), Some("hi"));
        assert_eq!(history[0].sender_id, "alice");
    }
}
