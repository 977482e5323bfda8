use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use campusnest_db::models::ConversationMessageRow;
use campusnest_db::Database;
use campusnest_gateway::{CommandHandler, ConnectionRegistry, Delivery};
use campusnest_types::api::{ConversationSummary, MessageResponse, SendMessageRequest};
use campusnest_types::events::{ChannelCommand, LiveEvent};

use crate::error::ApiError;
use crate::{blocking, convert};

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const MAX_HISTORY_LIMIT: u32 = 200;

/// Direct messaging between two users: validated persistence, derived
/// conversation views, read tracking and live push through the registry.
pub struct MessageService {
    db: Arc<Database>,
    registry: ConnectionRegistry,
}

impl MessageService {
    pub fn new(db: Arc<Database>, registry: ConnectionRegistry) -> Self {
        Self { db, registry }
    }

    /// Persist a message, then push `new_message` to the recipient if they
    /// are connected. The stored message stands whatever the push outcome.
    pub async fn send(
        &self,
        sender_id: Uuid,
        req: SendMessageRequest,
    ) -> Result<MessageResponse, ApiError> {
        if req.recipient_id == sender_id {
            return Err(ApiError::validation("cannot send a message to yourself"));
        }
        if req.body.trim().is_empty() {
            return Err(ApiError::validation("message body must not be empty"));
        }

        let sid = sender_id.to_string();
        let rid = req.recipient_id.to_string();
        let pid = req.property_id.map(|p| p.to_string());
        let body = req.body;

        let (row, sender_name) = blocking(&self.db, move |db| {
            if !db.user_exists(&rid)? {
                return Err(ApiError::validation("recipient does not exist"));
            }
            if let Some(pid) = &pid {
                if db.get_property(pid)?.is_none() {
                    return Err(ApiError::validation("referenced property does not exist"));
                }
            }
            let sender = db
                .get_user_by_id(&sid)?
                .ok_or_else(|| ApiError::Unauthorized("sender no longer exists".into()))?;

            let row = db.insert_message(&sid, &rid, &body, pid.as_deref())?;
            Ok((row, sender.full_name))
        })
        .await?;

        let message = convert::message(row)?;

        let outcome = self
            .registry
            .dispatch(
                message.recipient_id,
                LiveEvent::NewMessage {
                    message_id: message.id,
                    sender_id,
                    sender_name,
                    body: message.body.clone(),
                    property_id: message.property_id,
                    timestamp: message.created_at,
                },
            )
            .await;
        debug!("message {} -> {}: {:?}", message.id, message.recipient_id, outcome);

        Ok(message)
    }

    /// One summary per counterpart, most recent conversation first.
    pub async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<ConversationSummary>, ApiError> {
        let uid = user_id.to_string();
        let (rows, unread) = blocking(&self.db, move |db| {
            Ok((db.messages_for_user(&uid)?, db.unread_counts_by_sender(&uid)?))
        })
        .await?;

        let unread: HashMap<String, u64> = unread.into_iter().collect();

        // Latest message per counterpart; equal timestamps fall back to id
        let mut latest: HashMap<String, ConversationMessageRow> = HashMap::new();
        for row in rows {
            let newer = latest.get(&row.counterpart_id).is_none_or(|current| {
                (&row.message.created_at, row.message.id)
                    > (&current.message.created_at, current.message.id)
            });
            if newer {
                latest.insert(row.counterpart_id.clone(), row);
            }
        }

        let mut ordered: Vec<ConversationMessageRow> = latest.into_values().collect();
        ordered.sort_by(|a, b| {
            (&b.message.created_at, b.message.id).cmp(&(&a.message.created_at, a.message.id))
        });

        ordered
            .into_iter()
            .map(|row| -> Result<ConversationSummary, ApiError> {
                Ok(ConversationSummary {
                    unread_count: unread.get(&row.counterpart_id).copied().unwrap_or(0),
                    counterpart_id: convert::uuid(&row.counterpart_id)?,
                    last_timestamp: convert::timestamp(&row.message.created_at)?,
                    name: row.counterpart_name,
                    photo_url: row.counterpart_photo,
                    last_message: row.message.body,
                })
            })
            .collect()
    }

    /// A page of the conversation, newest first. Everything the counterpart
    /// sent to `user_id` is marked read first, so the page shows it as read.
    pub async fn get_history(
        &self,
        user_id: Uuid,
        counterpart_id: Uuid,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<MessageResponse>, ApiError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
        let offset = offset.unwrap_or(0);
        let uid = user_id.to_string();
        let cid = counterpart_id.to_string();

        let (marked, rows) = blocking(&self.db, move |db| {
            if !db.user_exists(&cid)? {
                return Err(ApiError::not_found("user not found"));
            }
            Ok(db.read_conversation(&uid, &cid, limit, offset)?)
        })
        .await?;

        if marked > 0 {
            debug!("{} read {} messages from {}", user_id, marked, counterpart_id);
        }

        rows.into_iter()
            .map(|row| convert::message(row).map_err(ApiError::from))
            .collect()
    }

    /// Mark one incoming message read. Idempotent for the recipient.
    pub async fn mark_read(&self, user_id: Uuid, message_id: i64) -> Result<(), ApiError> {
        let uid = user_id.to_string();
        let found = blocking(&self.db, move |db| Ok(db.mark_message_read(message_id, &uid)?)).await?;

        if !found {
            return Err(ApiError::not_found("message not found"));
        }
        Ok(())
    }

    /// Mark everything `counterpart_id` sent to `user_id` read. Returns how
    /// many messages changed.
    pub async fn mark_conversation_read(
        &self,
        user_id: Uuid,
        counterpart_id: Uuid,
    ) -> Result<usize, ApiError> {
        let uid = user_id.to_string();
        let cid = counterpart_id.to_string();

        blocking(&self.db, move |db| {
            if !db.user_exists(&cid)? {
                return Err(ApiError::not_found("user not found"));
            }
            Ok(db.mark_conversation_read(&uid, &cid)?)
        })
        .await
    }

    /// Hard delete. Only the sender may delete; anyone else sees NotFound.
    pub async fn delete(&self, user_id: Uuid, message_id: i64) -> Result<(), ApiError> {
        let uid = user_id.to_string();
        let deleted = blocking(&self.db, move |db| Ok(db.delete_message(message_id, &uid)?)).await?;

        if !deleted {
            return Err(ApiError::not_found("message not found"));
        }
        Ok(())
    }

    pub async fn relay_typing(&self, user_id: Uuid, counterpart_id: Uuid, is_typing: bool) -> Delivery {
        self.registry
            .dispatch(counterpart_id, LiveEvent::Typing { user_id, is_typing })
            .await
    }

    /// Forward an opaque payload between live connections; never stored.
    pub async fn relay_payload(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        payload: serde_json::Value,
    ) -> Delivery {
        self.registry
            .dispatch(recipient_id, LiveEvent::Message { sender_id, payload })
            .await
    }
}

impl CommandHandler for MessageService {
    async fn handle_command(&self, user_id: Uuid, cmd: ChannelCommand) {
        match cmd {
            ChannelCommand::Message { recipient_id, .. } | ChannelCommand::Typing { recipient_id, .. }
                if recipient_id == user_id =>
            {
                warn!("{} addressed a live command to itself, ignoring", user_id);
            }
            ChannelCommand::Message { recipient_id, payload } => {
                self.relay_payload(user_id, recipient_id, payload).await;
            }
            ChannelCommand::Typing { recipient_id, is_typing } => {
                self.relay_typing(user_id, recipient_id, is_typing).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use crate::state::AppState;

    fn req(recipient_id: Uuid, body: &str) -> SendMessageRequest {
        SendMessageRequest {
            recipient_id,
            body: body.into(),
            property_id: None,
        }
    }

    fn pair(state: &AppState) -> (Uuid, Uuid) {
        (
            test_support::user(state, "Ana", "student"),
            test_support::user(state, "Beto", "landlord"),
        )
    }

    #[tokio::test]
    async fn send_persists_unread_with_server_timestamp() {
        let state = test_support::state();
        let (a, b) = pair(&state);
        let before = chrono::Utc::now();

        let msg = state.messages.send(a, req(b, "hi")).await.unwrap();

        assert!(!msg.read);
        assert_eq!(msg.sender_id, a);
        assert_eq!(msg.recipient_id, b);
        assert!(msg.created_at.timestamp_micros() >= before.timestamp_micros());
        let stored = state.db.get_message(msg.id).unwrap().unwrap();
        assert_eq!(stored.body, "hi");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sends_keep_time_and_id_order() {
        let state = test_support::state();
        let (a, b) = pair(&state);

        let sends: Vec<_> = (0..100)
            .map(|i| {
                let state = state.clone();
                let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
                tokio::spawn(async move { state.messages.send(from, req(to, "x")).await.unwrap() })
            })
            .collect();

        let mut sent = Vec::new();
        for send in sends {
            sent.push(send.await.unwrap());
        }
        sent.sort_by_key(|m| m.id);
        assert!(sent.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn send_rejects_invalid_input_before_writing() {
        let state = test_support::state();
        let (a, b) = pair(&state);

        let to_self = state.messages.send(a, req(a, "me")).await;
        assert!(matches!(to_self, Err(ApiError::Validation(_))));

        let blank = state.messages.send(a, req(b, "   ")).await;
        assert!(matches!(blank, Err(ApiError::Validation(_))));

        let nobody = state.messages.send(a, req(Uuid::new_v4(), "hello?")).await;
        assert!(matches!(nobody, Err(ApiError::Validation(_))));

        let mut with_listing = req(b, "is it free?");
        with_listing.property_id = Some(Uuid::new_v4());
        let unknown = state.messages.send(a, with_listing).await;
        assert!(matches!(unknown, Err(ApiError::Validation(_))));

        assert!(state.messages.list_conversations(a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn live_recipient_gets_new_message_and_history_reads() {
        let state = test_support::state();
        let (a, b) = pair(&state);

        let first = state.messages.send(a, req(b, "hi")).await.unwrap();
        assert!(!first.read);

        let (_registration, mut events) = state.registry.connect(b);

        let second = state.messages.send(a, req(b, "again")).await.unwrap();
        match events.recv().await {
            Some(LiveEvent::NewMessage {
                message_id,
                sender_id,
                sender_name,
                body,
                ..
            }) => {
                assert_eq!(message_id, second.id);
                assert_eq!(sender_id, a);
                assert_eq!(sender_name, "Ana");
                assert_eq!(body, "again");
            }
            other => panic!("expected new_message, got {:?}", other),
        }

        let history = state.messages.get_history(b, a, None, None).await.unwrap();
        let bodies: Vec<_> = history.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["again", "hi"]);
        assert!(history.iter().all(|m| m.read));
    }

    #[tokio::test]
    async fn offline_recipient_still_gets_the_message() {
        let state = test_support::state();
        let (a, b) = pair(&state);

        state.messages.send(a, req(b, "while you were out")).await.unwrap();

        let history = state.messages.get_history(b, a, None, None).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn unread_count_matches_unread_messages() {
        let state = test_support::state();
        let (u, c) = pair(&state);
        let other = test_support::user(&state, "Carla", "landlord");

        for i in 0..4 {
            state.messages.send(c, req(u, &format!("m{}", i))).await.unwrap();
        }
        state.messages.send(u, req(c, "reply")).await.unwrap();
        state.messages.send(other, req(u, "hola")).await.unwrap();

        let convs = state.messages.list_conversations(u).await.unwrap();
        assert_eq!(convs.len(), 2);
        // Newest conversation first
        assert_eq!(convs[0].counterpart_id, other);
        assert_eq!(convs[0].unread_count, 1);
        assert_eq!(convs[1].counterpart_id, c);
        assert_eq!(convs[1].name, "Beto");
        assert_eq!(convs[1].last_message, "reply");
        assert_eq!(convs[1].unread_count, 4);

        let changed = state.messages.mark_conversation_read(u, c).await.unwrap();
        assert_eq!(changed, 4);
        let convs = state.messages.list_conversations(u).await.unwrap();
        assert!(convs.iter().find(|s| s.counterpart_id == c).unwrap().unread_count == 0);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_recipient_only() {
        let state = test_support::state();
        let (a, b) = pair(&state);
        let msg = state.messages.send(a, req(b, "hi")).await.unwrap();

        assert!(matches!(
            state.messages.mark_read(a, msg.id).await,
            Err(ApiError::NotFound(_))
        ));
        state.messages.mark_read(b, msg.id).await.unwrap();
        state.messages.mark_read(b, msg.id).await.unwrap();
        assert!(state.db.get_message(msg.id).unwrap().unwrap().read);
    }

    #[tokio::test]
    async fn only_sender_can_delete() {
        let state = test_support::state();
        let (a, b) = pair(&state);
        let msg = state.messages.send(a, req(b, "oops")).await.unwrap();

        assert!(matches!(
            state.messages.delete(b, msg.id).await,
            Err(ApiError::NotFound(_))
        ));
        state.messages.delete(a, msg.id).await.unwrap();

        let history = state.messages.get_history(a, b, None, None).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn history_with_unknown_counterpart_is_not_found() {
        let state = test_support::state();
        let a = test_support::user(&state, "Ana", "student");

        let res = state.messages.get_history(a, Uuid::new_v4(), Some(10), None).await;
        assert!(matches!(res, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn live_commands_are_relayed() {
        let state = test_support::state();
        let (a, b) = pair(&state);
        let (_registration, mut events) = state.registry.connect(b);

        state
            .messages
            .handle_command(a, ChannelCommand::Typing { recipient_id: b, is_typing: true })
            .await;
        assert_eq!(
            events.recv().await,
            Some(LiveEvent::Typing { user_id: a, is_typing: true })
        );

        let payload = serde_json::json!({ "text": "hola" });
        state
            .messages
            .handle_command(a, ChannelCommand::Message { recipient_id: b, payload: payload.clone() })
            .await;
        assert_eq!(
            events.recv().await,
            Some(LiveEvent::Message { sender_id: a, payload })
        );

        // Relayed payloads are never persisted
        assert!(state.messages.list_conversations(b).await.unwrap().is_empty());
    }
}
