use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use huddle_db::MessageStore;
use huddle_types::channel::{is_direct, resolve_direct};
use huddle_types::error::{ChatError, Result};
use huddle_types::events::{Ack, ClientCommand, DirectMessageRequest, GroupMessageRequest, ServerEvent};
use huddle_types::models::{Message, NewMessage};

use crate::registry::{ConnectionId, SessionRegistry};

type ChannelLocks = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Protocol core: validate → persist → fan out → acknowledge.
#[derive(Clone)]
pub struct MessageRouter {
    registry: SessionRegistry,
    store: Arc<dyn MessageStore>,
    group_channel: Arc<str>,

    /// Serializes append + fan-out per audience channel so subscribers see
    /// messages in the order they were persisted. Entries only live while a
    /// publish holds or waits on them.
    channel_locks: ChannelLocks,
}

/// A claim on one channel's publish lock. Dropping the last claim removes
/// the entry from the table.
struct ChannelLease {
    locks: ChannelLocks,
    channel: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        // Table entry + this lease, nobody waiting
        let idle = Arc::strong_count(&self.lock) == 2
            && locks
                .get(&self.channel)
                .is_some_and(|held| Arc::ptr_eq(held, &self.lock));
        if idle {
            locks.remove(&self.channel);
        }
    }
}

impl MessageRouter {
    pub fn new(
        registry: SessionRegistry,
        store: Arc<dyn MessageStore>,
        group_channel: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            store,
            group_channel: Arc::from(group_channel.into()),
            channel_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Run one client command and produce the ack for its sender.
    pub async fn handle(&self, connection_id: ConnectionId, command: ClientCommand) -> Ack {
        match command {
            ClientCommand::JoinRoom(channel) => {
                self.join_room(connection_id, &channel).await;
                Ack::ok()
            }
            ClientCommand::LeaveRoom(channel) => {
                self.leave_room(connection_id, &channel).await;
                Ack::ok()
            }
            ClientCommand::GroupMessage(req) => {
                Ack::from(&self.group_message(connection_id, req).await)
            }
            ClientCommand::SendDm(req) => Ack::from(&self.send_dm(connection_id, req).await),
        }
    }

    pub async fn join_room(&self, connection_id: ConnectionId, channel: &str) {
        let channel = channel.trim();
        if channel.is_empty() {
            warn!("{} tried to join an empty channel id", connection_id);
            return;
        }
        if self.registry.join(connection_id, channel).await {
            info!("{} joined room {}", connection_id, channel);
        }
    }

    pub async fn leave_room(&self, connection_id: ConnectionId, channel: &str) {
        let channel = channel.trim();
        if self.registry.leave(connection_id, channel).await {
            info!("{} left room {}", connection_id, channel);
        }
    }

    /// Persist to `req.channel` (the group channel when absent) and fan the
    /// record out as `newGroupMessage` to every subscriber of the group
    /// channel, the sender included.
    pub async fn group_message(
        &self,
        connection_id: ConnectionId,
        req: GroupMessageRequest,
    ) -> Result<Message> {
        self.post_group(connection_id, req)
            .await
            .inspect_err(|e| warn!("{} groupMessage rejected: {}", connection_id, e))
    }

    async fn post_group(
        &self,
        connection_id: ConnectionId,
        req: GroupMessageRequest,
    ) -> Result<Message> {
        let channel = match req.channel.as_deref().map(str::trim) {
            Some(channel) if !channel.is_empty() => channel.to_string(),
            _ => self.group_channel.to_string(),
        };
        if channel != *self.group_channel && is_direct(&channel) {
            return Err(ChatError::Validation(
                "group messages cannot target a direct-message channel".into(),
            ));
        }

        let message = NewMessage::new(req.user, req.message, channel)
            .with_timestamp(req.timestamp)
            .with_reply_to(req.reply_to);

        let audience = self.group_channel.clone();
        self.publish(connection_id, message, &audience, false, ServerEvent::NewGroupMessage)
            .await
    }

    /// Publish a direct message on `dm_<a>_<b>`. The sender is joined to that
    /// channel before fan-out so it receives its own `receive-dm` copy.
    pub async fn send_dm(
        &self,
        connection_id: ConnectionId,
        req: DirectMessageRequest,
    ) -> Result<Message> {
        self.deliver_dm(connection_id, req)
            .await
            .inspect_err(|e| warn!("{} send-dm rejected: {}", connection_id, e))
    }

    async fn deliver_dm(
        &self,
        connection_id: ConnectionId,
        req: DirectMessageRequest,
    ) -> Result<Message> {
        let channel = resolve_direct(&req.from, &req.to)?;
        let message = NewMessage::new(req.from, req.message, channel.clone())
            .with_timestamp(req.timestamp)
            .with_reply_to(req.reply_to);

        self.publish(connection_id, message, &channel, true, ServerEvent::ReceiveDm)
            .await
    }

    /// Append `message` and push it to the subscribers of `audience`.
    async fn publish(
        &self,
        connection_id: ConnectionId,
        message: NewMessage,
        audience: &str,
        join_sender: bool,
        wrap: fn(Message) -> ServerEvent,
    ) -> Result<Message> {
        message.validate()?;

        let lease = self.lease(audience)?;
        let _guard = lease.lock.lock().await;

        // Run blocking DB insert off the async runtime
        let store = self.store.clone();
        let persisted = tokio::task::spawn_blocking(move || store.append(message))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ChatError::Persistence("storage task failed".into())
            })??;

        if join_sender {
            self.join_room(connection_id, audience).await;
        }

        let delivered = self
            .registry
            .fan_out(audience, wrap(persisted.clone()))
            .await;
        debug!(
            "{} -> {} [{}] delivered to {} connection(s) on {}",
            persisted.author, persisted.channel, persisted.id, delivered, audience
        );

        Ok(persisted)
    }

    fn lease(&self, channel: &str) -> Result<ChannelLease> {
        let mut locks = self
            .channel_locks
            .lock()
            .map_err(|_| ChatError::Persistence("channel lock table poisoned".into()))?;
        let lock = locks.entry(channel.to_string()).or_default().clone();
        Ok(ChannelLease {
            locks: self.channel_locks.clone(),
            channel: channel.to_string(),
            lock,
        })
    }

    #[cfg(test)]
    fn locked_channels(&self) -> usize {
        self.channel_locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_db::Database;
    use tokio::sync::mpsc::UnboundedReceiver;
    use uuid::Uuid;

    struct FailingStore;

    impl MessageStore for FailingStore {
        fn append(&self, _message: NewMessage) -> Result<Message> {
            Err(ChatError::Persistence("disk full".into()))
        }

        fn list_by_channel(&self, _channel: &str) -> Result<Vec<Message>> {
            Ok(vec![])
        }
    }

    fn router_with(store: Arc<dyn MessageStore>) -> MessageRouter {
        MessageRouter::new(SessionRegistry::new(), store, "allStudents")
    }

    fn in_memory() -> (MessageRouter, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        (router_with(db.clone()), db)
    }

    async fn connect(router: &MessageRouter) -> (ConnectionId, UnboundedReceiver<ServerEvent>) {
        let id = Uuid::new_v4();
        let (_, rx) = router.registry().register(id).await;
        (id, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn group(user: &str, message: &str) -> GroupMessageRequest {
        GroupMessageRequest {
            user: user.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    fn dm(from: &str, to: &str, message: &str) -> DirectMessageRequest {
        DirectMessageRequest {
            from: from.into(),
            to: to.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn group_message_fans_out_to_every_subscriber_including_sender() {
        let (router, db) = in_memory();
        let (w, mut rx_w) = connect(&router).await;
        let (x, mut rx_x) = connect(&router).await;
        let (y, mut rx_y) = connect(&router).await;
        let (z, mut rx_z) = connect(&router).await;
        let (_outsider, mut rx_out) = connect(&router).await;
        for conn in [w, x, y, z] {
            router.join_room(conn, "allStudents").await;
        }

        let ack = router.handle(w, ClientCommand::GroupMessage(group("alice", "standup in 5"))).await;
        assert!(ack.is_ok());

        let stored = db.list_by_channel("allStudents").unwrap();
        assert_eq!(stored.len(), 1);

        for rx in [&mut rx_w, &mut rx_x, &mut rx_y, &mut rx_z] {
            let events = drain(rx);
            assert_eq!(events, vec![ServerEvent::NewGroupMessage(stored[0].clone())]);
        }
        assert!(drain(&mut rx_out).is_empty());
    }

    #[tokio::test]
    async fn group_message_with_empty_body_is_rejected() {
        let (router, db) = in_memory();
        let (w, mut rx_w) = connect(&router).await;
        let (x, mut rx_x) = connect(&router).await;
        router.join_room(w, "allStudents").await;
        router.join_room(x, "allStudents").await;

        let ack = router.handle(w, ClientCommand::GroupMessage(group("alice", ""))).await;
        assert!(!ack.is_ok());
        assert!(ack.error.unwrap().starts_with("validation error"));

        assert!(db.list_by_channel("allStudents").unwrap().is_empty());
        assert!(drain(&mut rx_w).is_empty());
        assert!(drain(&mut rx_x).is_empty());
    }

    #[tokio::test]
    async fn group_message_missing_author_is_rejected() {
        let (router, _db) = in_memory();
        let (w, _rx) = connect(&router).await;
        let err = router.group_message(w, group("", "hello")).await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[tokio::test]
    async fn explicit_channel_is_stored_there_and_broadcast_to_group() {
        let (router, db) = in_memory();
        let (w, mut rx_w) = connect(&router).await;
        let (v, mut rx_v) = connect(&router).await;
        router.join_room(w, "allStudents").await;
        router.join_room(v, "design-team").await;

        let req = GroupMessageRequest {
            channel: Some("design-team".into()),
            ..group("alice", "mockups are up")
        };
        let saved = router.group_message(v, req).await.unwrap();

        assert_eq!(saved.channel, "design-team");
        assert_eq!(db.list_by_channel("design-team").unwrap(), vec![saved.clone()]);
        assert!(db.list_by_channel("allStudents").unwrap().is_empty());
        assert_eq!(drain(&mut rx_w), vec![ServerEvent::NewGroupMessage(saved)]);
        assert!(drain(&mut rx_v).is_empty());
    }

    #[tokio::test]
    async fn group_message_cannot_target_direct_channel() {
        let (router, db) = in_memory();
        let (mallory, _rx) = connect(&router).await;
        let (bob, mut rx_bob) = connect(&router).await;
        router.join_room(bob, "allStudents").await;

        let req = GroupMessageRequest {
            channel: Some("dm_alice_bob".into()),
            ..group("mallory", "psst")
        };
        let ack = router.handle(mallory, ClientCommand::GroupMessage(req)).await;

        assert!(ack.error.unwrap().starts_with("validation error"));
        assert!(db.list_by_channel("dm_alice_bob").unwrap().is_empty());
        assert!(drain(&mut rx_bob).is_empty());
    }

    #[tokio::test]
    async fn padded_channel_ids_match_on_join_and_publish() {
        let (router, db) = in_memory();
        let (w, mut rx_w) = connect(&router).await;
        router.join_room(w, " allStudents ").await;

        let req = GroupMessageRequest {
            channel: Some(" allStudents ".into()),
            ..group("alice", "hello")
        };
        let saved = router.group_message(w, req).await.unwrap();
        assert_eq!(saved.channel, "allStudents");
        assert_eq!(drain(&mut rx_w), vec![ServerEvent::NewGroupMessage(saved.clone())]);
        assert_eq!(db.list_by_channel("allStudents").unwrap(), vec![saved]);

        let req = GroupMessageRequest {
            channel: Some(" design ".into()),
            ..group("alice", "hello design")
        };
        assert_eq!(router.group_message(w, req).await.unwrap().channel, "design");
    }

    #[tokio::test]
    async fn padded_dm_participants_resolve_to_same_channel() {
        let (router, _db) = in_memory();
        let (alice, _ra) = connect(&router).await;
        let (bob, mut rx_bob) = connect(&router).await;
        router.join_room(bob, "dm_alice_bob").await;

        let saved = router.send_dm(alice, dm(" alice", "bob ", "hi")).await.unwrap();
        assert_eq!(saved.channel, "dm_alice_bob");
        assert_eq!(drain(&mut rx_bob), vec![ServerEvent::ReceiveDm(saved)]);
    }

    #[tokio::test]
    async fn lock_table_is_emptied_after_publishes() {
        let (router, _db) = in_memory();
        let (conn, _rx) = connect(&router).await;

        for i in 0..200 {
            let req = GroupMessageRequest {
                channel: Some(format!("junk-{i}")),
                ..group("alice", "spam")
            };
            router.group_message(conn, req).await.unwrap();
            router.send_dm(conn, dm("alice", &format!("user{i}"), "hi")).await.unwrap();
        }
        assert_eq!(router.locked_channels(), 0);

        let failing = router_with(Arc::new(FailingStore));
        let (conn, _rx) = connect(&failing).await;
        failing.group_message(conn, group("alice", "lost")).await.unwrap_err();
        assert_eq!(failing.locked_channels(), 0);
    }

    #[tokio::test]
    async fn blank_channel_falls_back_to_group() {
        let (router, _db) = in_memory();
        let (w, _rx) = connect(&router).await;
        let req = GroupMessageRequest {
            channel: Some("  ".into()),
            ..group("alice", "hi")
        };
        assert_eq!(router.group_message(w, req).await.unwrap().channel, "allStudents");
    }

    #[tokio::test]
    async fn persistence_failure_is_acked_and_not_broadcast() {
        let router = router_with(Arc::new(FailingStore));
        let (w, mut rx_w) = connect(&router).await;
        router.join_room(w, "allStudents").await;

        let ack = router.handle(w, ClientCommand::GroupMessage(group("alice", "hello"))).await;
        assert!(!ack.is_ok());
        assert_eq!(ack.error.as_deref(), Some("persistence error: disk full"));
        assert!(drain(&mut rx_w).is_empty());

        let err = router.send_dm(w, dm("alice", "bob", "hi")).await.unwrap_err();
        assert!(matches!(err, ChatError::Persistence(_)));
        let session = router.registry().session(w).await.unwrap();
        assert!(!session.joined_channels.contains("dm_alice_bob"));
    }

    #[tokio::test]
    async fn send_dm_auto_joins_sender_and_reaches_recipient() {
        let (router, db) = in_memory();
        let (alice, mut rx_alice) = connect(&router).await;
        let (bob, mut rx_bob) = connect(&router).await;
        let (_carol, mut rx_carol) = connect(&router).await;
        router.join_room(bob, "dm_alice_bob").await;

        let ack = router.handle(alice, ClientCommand::SendDm(dm("alice", "bob", "hi"))).await;
        assert!(ack.is_ok());

        let history = db.list_by_channel("dm_alice_bob").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].author, "alice");
        assert_eq!(history[0].body, "hi");

        let expected = vec![ServerEvent::ReceiveDm(history[0].clone())];
        assert_eq!(drain(&mut rx_alice), expected);
        assert_eq!(drain(&mut rx_bob), expected);
        assert!(drain(&mut rx_carol).is_empty());

        let session = router.registry().session(alice).await.unwrap();
        assert!(session.joined_channels.contains("dm_alice_bob"));
    }

    #[tokio::test]
    async fn send_dm_resolves_same_channel_from_either_side() {
        let (router, _db) = in_memory();
        let (alice, _ra) = connect(&router).await;
        let (bob, _rb) = connect(&router).await;

        let a = router.send_dm(alice, dm("alice", "bob", "ping")).await.unwrap();
        let b = router.send_dm(bob, dm("bob", "alice", "pong")).await.unwrap();
        assert_eq!(a.channel, b.channel);
        assert_eq!(a.channel, "dm_alice_bob");
    }

    #[tokio::test]
    async fn self_message_is_delivered_to_own_connection() {
        let (router, db) = in_memory();
        let (carol, mut rx) = connect(&router).await;

        let saved = router.send_dm(carol, dm("carol", "carol", "note")).await.unwrap();
        assert_eq!(saved.channel, "dm_carol_carol");
        assert_eq!(db.list_by_channel("dm_carol_carol").unwrap(), vec![saved.clone()]);
        assert_eq!(drain(&mut rx), vec![ServerEvent::ReceiveDm(saved)]);
    }

    #[tokio::test]
    async fn send_dm_with_empty_participant_fails() {
        let (router, db) = in_memory();
        let (alice, mut rx) = connect(&router).await;

        let ack = router.handle(alice, ClientCommand::SendDm(dm("alice", "", "hi"))).await;
        assert!(ack.error.unwrap().starts_with("invalid participant"));
        assert!(drain(&mut rx).is_empty());
        assert!(db.list_by_channel("dm_alice_").unwrap().is_empty());
    }

    #[tokio::test]
    async fn reply_snapshot_is_kept_verbatim() {
        let (router, _db) = in_memory();
        let (bob, _rx) = connect(&router).await;
        let req = DirectMessageRequest {
            reply_to: Some(huddle_types::models::ReplySnapshot {
                author: "alice".into(),
                body: "lunch?".into(),
            }),
            ..dm("bob", "alice", "sure")
        };
        let saved = router.send_dm(bob, req).await.unwrap();
        let reply = saved.reply_to.unwrap();
        assert_eq!(reply.author, "alice");
        assert_eq!(reply.body, "lunch?");
    }

    #[tokio::test]
    async fn fan_out_preserves_persistence_order_within_channel() {
        let (router, db) = in_memory();
        let (listener, mut rx) = connect(&router).await;
        router.join_room(listener, "allStudents").await;

        let mut tasks = Vec::new();
        for i in 0..20 {
            let router = router.clone();
            tasks.push(tokio::spawn(async move {
                let (conn, _rx) = connect(&router).await;
                router.group_message(conn, group(&format!("user{i}"), "hi")).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let delivered: Vec<_> = drain(&mut rx)
            .into_iter()
            .map(|event| match event {
                ServerEvent::NewGroupMessage(msg) => msg.id,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        let stored: Vec<_> = db
            .list_by_channel("allStudents")
            .unwrap()
            .into_iter()
            .map(|msg| msg.id)
            .collect();
        assert_eq!(delivered, stored);
        assert_eq!(router.locked_channels(), 0);
    }

    #[tokio::test]
    async fn join_and_leave_commands_ack_ok() {
        let (router, _db) = in_memory();
        let (conn, _rx) = connect(&router).await;

        assert!(router.handle(conn, ClientCommand::JoinRoom("allStudents".into())).await.is_ok());
        assert!(router.handle(conn, ClientCommand::JoinRoom("allStudents".into())).await.is_ok());
        assert!(router.handle(conn, ClientCommand::LeaveRoom("allStudents".into())).await.is_ok());
        assert!(router.handle(conn, ClientCommand::LeaveRoom("allStudents".into())).await.is_ok());

        let session = router.registry().session(conn).await.unwrap();
        assert!(session.joined_channels.is_empty());
    }
}
