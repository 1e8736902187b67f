//! Chat list and active-conversation synchronization.
//!
//! Lists are replaced wholesale on every fetch. The open conversation is
//! refreshed by a single poll task that is restarted on every change of
//! active chat. Every message response is tagged with the chat generation
//! and a request sequence number; responses for a superseded chat, or older
//! than one already applied, are dropped.

pub mod pinning;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::{ApiClient, ApiResponse};
use crate::auth::validation::sanitize;
use crate::config::Endpoints;
use crate::models::chat::ChatSummary;
use crate::models::{Attachment, ChatTarget, DmSummary, GroupPreview, GroupSummary, Message};

use pinning::{apply_pin, partition_pinned};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    GroupsUpdated,
    DmsUpdated,
    MessagesUpdated(ChatTarget),
    /// A message fetch for the open chat failed. Polling carries on.
    MessagesFailed { chat: ChatTarget, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("No conversation is open")]
    NoActiveChat,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    RequestFailed(String),
}

/// Snapshot of everything the chat screens render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    pub groups: Vec<GroupSummary>,
    pub dms: Vec<DmSummary>,
    pub active_chat: Option<ChatTarget>,
    pub messages: Vec<Message>,
    pub loading_groups: bool,
    pub loading_dms: bool,
    pub loading_messages: bool,
}

#[derive(Default)]
struct SyncState {
    view: ConversationState,
    chat_generation: u64,
    /// Bumped by `reset()`; list responses from an older session are dropped.
    list_generation: u64,
    next_request_seq: u64,
    last_applied_seq: u64,
    messages_in_flight: usize,
    groups_in_flight: usize,
    dms_in_flight: usize,
}

#[derive(Deserialize)]
struct GroupsPayload {
    groups: Vec<GroupSummary>,
}

#[derive(Deserialize)]
struct DmsPayload {
    dms: Vec<DmSummary>,
}

#[derive(Deserialize)]
struct MessagesPayload {
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct MessagePayload {
    message: Message,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PinPayload {
    #[serde(default)]
    is_pinned: Option<bool>,
}

#[derive(Deserialize)]
struct PreviewPayload {
    group: GroupPreview,
}

struct Shared {
    api: Arc<ApiClient>,
    endpoints: Endpoints,
    state: Mutex<SyncState>,
    events: broadcast::Sender<SyncEvent>,
}

impl Shared {
    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Fetch messages for the active chat. With `expected_generation`, bail
    /// out if the active chat has changed since the caller was started.
    async fn fetch_messages(&self, expected_generation: Option<u64>) -> Result<(), SyncError> {
        let (target, generation, seq) = {
            let mut state = self.state.lock();
            if expected_generation.is_some_and(|g| g != state.chat_generation) {
                return Err(SyncError::NoActiveChat);
            }
            let Some(target) = state.view.active_chat.clone() else {
                return Err(SyncError::NoActiveChat);
            };
            state.next_request_seq += 1;
            state.messages_in_flight += 1;
            state.view.loading_messages = true;
            (target, state.chat_generation, state.next_request_seq)
        };

        let response: ApiResponse<MessagesPayload> = self
            .api
            .get_with_query(
                &self.endpoints.messages,
                &[(target.discriminator(), target.id())],
            )
            .await;

        {
            let mut state = self.state.lock();
            if state.chat_generation != generation {
                tracing::debug!(%target, "discarding messages for superseded chat");
                return Ok(());
            }
            state.messages_in_flight = state.messages_in_flight.saturating_sub(1);
            state.view.loading_messages = state.messages_in_flight > 0;
            if seq <= state.last_applied_seq {
                tracing::debug!(%target, seq, "discarding out-of-order messages response");
                return Ok(());
            }
            match response.into_result("Failed to load messages") {
                Ok(payload) => {
                    state.view.messages = payload.messages;
                    state.last_applied_seq = seq;
                }
                Err(error) => {
                    drop(state);
                    self.emit(SyncEvent::MessagesFailed {
                        chat: target,
                        error: error.clone(),
                    });
                    return Err(SyncError::RequestFailed(error));
                }
            }
        }
        self.emit(SyncEvent::MessagesUpdated(target));
        Ok(())
    }

    async fn fetch_groups(&self) -> Result<(), SyncError> {
        let generation = {
            let mut state = self.state.lock();
            state.groups_in_flight += 1;
            state.view.loading_groups = true;
            state.list_generation
        };
        let response: ApiResponse<GroupsPayload> = self.api.get(&self.endpoints.groups).await;
        let result = response.into_result("Failed to load groups");

        let mut state = self.state.lock();
        if state.list_generation != generation {
            tracing::debug!("discarding groups fetched before reset");
            return Ok(());
        }
        state.groups_in_flight = state.groups_in_flight.saturating_sub(1);
        state.view.loading_groups = state.groups_in_flight > 0;
        let mut groups = result.map_err(SyncError::RequestFailed)?.groups;
        partition_pinned(&mut groups);
        state.view.groups = groups;
        drop(state);

        self.emit(SyncEvent::GroupsUpdated);
        Ok(())
    }

    async fn fetch_dms(&self) -> Result<(), SyncError> {
        let generation = {
            let mut state = self.state.lock();
            state.dms_in_flight += 1;
            state.view.loading_dms = true;
            state.list_generation
        };
        let response: ApiResponse<DmsPayload> = self.api.get(&self.endpoints.dms).await;
        let result = response.into_result("Failed to load conversations");

        let mut state = self.state.lock();
        if state.list_generation != generation {
            tracing::debug!("discarding conversations fetched before reset");
            return Ok(());
        }
        state.dms_in_flight = state.dms_in_flight.saturating_sub(1);
        state.view.loading_dms = state.dms_in_flight > 0;
        let mut dms = result.map_err(SyncError::RequestFailed)?.dms;
        partition_pinned(&mut dms);
        state.view.dms = dms;
        drop(state);

        self.emit(SyncEvent::DmsUpdated);
        Ok(())
    }
}

pub struct ChatSynchronizer {
    shared: Arc<Shared>,
    poll_interval: Duration,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl ChatSynchronizer {
    pub fn new(api: Arc<ApiClient>, endpoints: Endpoints, poll_interval: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                api,
                endpoints,
                state: Mutex::new(SyncState::default()),
                events,
            }),
            poll_interval,
            poller: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events.subscribe()
    }

    pub fn snapshot(&self) -> ConversationState {
        self.shared.state.lock().view.clone()
    }

    pub fn groups(&self) -> Vec<GroupSummary> {
        self.shared.state.lock().view.groups.clone()
    }

    pub fn dms(&self) -> Vec<DmSummary> {
        self.shared.state.lock().view.dms.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.shared.state.lock().view.messages.clone()
    }

    pub fn active_chat(&self) -> Option<ChatTarget> {
        self.shared.state.lock().view.active_chat.clone()
    }

    /// Number of live poll tasks: 1 while a chat is open, 0 otherwise.
    pub fn active_pollers(&self) -> usize {
        self.poller
            .lock()
            .as_ref()
            .map_or(0, |handle| usize::from(!handle.is_finished()))
    }

    /// Fetch groups and DMs concurrently. Each list is replaced on success.
    pub async fn refresh_all(&self) -> Result<(), SyncError> {
        let (groups, dms) = tokio::join!(self.shared.fetch_groups(), self.shared.fetch_dms());
        groups.and(dms)
    }

    pub async fn fetch_groups(&self) -> Result<(), SyncError> {
        self.shared.fetch_groups().await
    }

    pub async fn fetch_dms(&self) -> Result<(), SyncError> {
        self.shared.fetch_dms().await
    }

    pub async fn fetch_messages(&self) -> Result<(), SyncError> {
        self.shared.fetch_messages(None).await
    }

    /// Switch the open conversation.
    ///
    /// Clears the message list, restarts polling for the new target (the
    /// first tick fetches immediately) and stops it for `None`. Setting the
    /// chat that is already open is a no-op. Must be called inside a tokio
    /// runtime.
    pub fn set_active_chat(&self, chat: Option<ChatTarget>) {
        {
            let mut state = self.shared.state.lock();
            if state.view.active_chat == chat {
                return;
            }
            state.chat_generation += 1;
            state.messages_in_flight = 0;
            state.view.messages.clear();
            state.view.loading_messages = chat.is_some();
            match &chat {
                Some(ChatTarget::Group(id)) => clear_unread(&mut state.view.groups, id),
                Some(ChatTarget::Dm(id)) => clear_unread(&mut state.view.dms, id),
                None => {}
            }
            state.view.active_chat = chat.clone();
        }

        self.stop_polling();
        if let Some(target) = chat {
            tracing::debug!(%target, "active chat changed");
            self.start_polling();
        }
    }

    fn start_polling(&self) {
        let shared = Arc::clone(&self.shared);
        let period = self.poll_interval.max(Duration::from_millis(1));
        let generation = shared.state.lock().chat_generation;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match shared.fetch_messages(Some(generation)).await {
                    Ok(()) => {}
                    Err(SyncError::NoActiveChat) => break,
                    Err(e) => tracing::warn!("message poll failed: {}", e),
                }
            }
        });

        if let Some(previous) = self.poller.lock().replace(handle) {
            previous.abort();
        }
    }

    fn stop_polling(&self) {
        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
        }
    }

    /// Post a message to the open chat. The message appears locally only
    /// once the server has echoed it back.
    pub async fn send_message(
        &self,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> Result<Message, SyncError> {
        let (target, generation) = {
            let state = self.shared.state.lock();
            let target = state
                .view
                .active_chat
                .clone()
                .ok_or(SyncError::NoActiveChat)?;
            (target, state.chat_generation)
        };

        let content = content.trim();
        if content.is_empty() && attachments.is_empty() {
            return Err(SyncError::EmptyMessage);
        }

        let mut body = json!({
            "content": content,
            "attachments": attachments,
        });
        body[target.discriminator()] = Value::String(target.id().to_string());

        let response: ApiResponse<MessagePayload> = self
            .shared
            .api
            .post(&self.shared.endpoints.messages, &body)
            .await;
        let message = response
            .into_result("Failed to send message")
            .map_err(SyncError::RequestFailed)?
            .message;

        {
            let mut state = self.shared.state.lock();
            if state.chat_generation != generation {
                tracing::debug!(%target, "sent message belongs to a closed chat, not appending");
                return Ok(message);
            }
            if !state.view.messages.iter().any(|m| m.id == message.id) {
                state.view.messages.push(message.clone());
            }
            // Fetches started before the append would drop the new message
            state.last_applied_seq = state.next_request_seq;
        }
        self.shared.emit(SyncEvent::MessagesUpdated(target));
        Ok(message)
    }

    /// Toggle the pinned flag of a group or DM. Returns the new flag.
    pub async fn toggle_pin(&self, target: &ChatTarget) -> Result<bool, SyncError> {
        let body = json!({ "type": target.kind(), "id": target.id() });
        let response: ApiResponse<PinPayload> =
            self.shared.api.post(&self.shared.endpoints.pin, &body).await;
        if !response.is_success() {
            return Err(SyncError::RequestFailed(
                response
                    .error
                    .unwrap_or_else(|| "Failed to update pin".to_string()),
            ));
        }
        let reported = response.data.and_then(|payload| payload.is_pinned);

        let (pinned, event) = {
            let mut state = self.shared.state.lock();
            match target {
                ChatTarget::Group(id) => {
                    let pinned = reported.unwrap_or_else(|| !is_pinned(&state.view.groups, id));
                    apply_pin(&mut state.view.groups, id, pinned);
                    (pinned, SyncEvent::GroupsUpdated)
                }
                ChatTarget::Dm(id) => {
                    let pinned = reported.unwrap_or_else(|| !is_pinned(&state.view.dms, id));
                    apply_pin(&mut state.view.dms, id, pinned);
                    (pinned, SyncEvent::DmsUpdated)
                }
            }
        };
        self.shared.emit(event);
        Ok(pinned)
    }

    pub async fn join_group(&self, invite_code: &str) -> Result<(), SyncError> {
        let code = sanitize(invite_code);
        if code.is_empty() {
            return Err(SyncError::InvalidInput("Invite code is required".to_string()));
        }
        let response: ApiResponse<Value> = self
            .shared
            .api
            .post(&self.shared.endpoints.group_join, &json!({ "inviteCode": code }))
            .await;
        check(response, "Failed to join group")?;
        self.shared.fetch_groups().await
    }

    /// Create a group. Returns the server-assigned id when reported.
    pub async fn create_group(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Option<String>, SyncError> {
        let name = sanitize(name);
        if name.is_empty() {
            return Err(SyncError::InvalidInput("Group name is required".to_string()));
        }
        let description = description.map(sanitize).filter(|d| !d.is_empty());
        let response: ApiResponse<Value> = self
            .shared
            .api
            .post(
                &self.shared.endpoints.groups,
                &json!({ "name": name, "description": description }),
            )
            .await;
        let payload = check(response, "Failed to create group")?;
        self.shared.fetch_groups().await?;
        Ok(created_id(payload.as_ref(), "group"))
    }

    /// Open (or reuse) a DM with `user_id`. Returns its id when reported.
    pub async fn start_dm(&self, user_id: &str) -> Result<Option<String>, SyncError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(SyncError::InvalidInput("User is required".to_string()));
        }
        let response: ApiResponse<Value> = self
            .shared
            .api
            .post(&self.shared.endpoints.dms, &json!({ "userId": user_id }))
            .await;
        let payload = check(response, "Failed to start conversation")?;
        self.shared.fetch_dms().await?;
        Ok(created_id(payload.as_ref(), "dm"))
    }

    pub async fn preview_group(&self, invite_code: &str) -> Result<GroupPreview, SyncError> {
        let code = sanitize(invite_code);
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(SyncError::InvalidInput("Invalid invite code".to_string()));
        }
        let path = format!(
            "{}/{}",
            self.shared.endpoints.group_preview.trim_end_matches('/'),
            code
        );
        let response: ApiResponse<PreviewPayload> = self.shared.api.get(&path).await;
        response
            .into_result("Group not found")
            .map(|payload| payload.group)
            .map_err(SyncError::RequestFailed)
    }

    /// Drop all chat state and stop polling. Used at sign-out.
    pub fn reset(&self) {
        self.stop_polling();
        let mut state = self.shared.state.lock();
        let generation = state.chat_generation + 1;
        let list_generation = state.list_generation + 1;
        let seq = state.next_request_seq;
        *state = SyncState {
            chat_generation: generation,
            list_generation,
            next_request_seq: seq,
            last_applied_seq: seq,
            ..SyncState::default()
        };
    }
}

impl Drop for ChatSynchronizer {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

fn clear_unread<T: ChatSummary>(items: &mut [T], id: &str) {
    if let Some(item) = items.iter_mut().find(|item| item.id() == id) {
        item.clear_unread();
    }
}

fn is_pinned<T: ChatSummary>(items: &[T], id: &str) -> bool {
    items.iter().any(|item| item.id() == id && item.is_pinned())
}

fn check(response: ApiResponse<Value>, fallback: &str) -> Result<Option<Value>, SyncError> {
    if response.is_success() {
        Ok(response.data)
    } else {
        Err(SyncError::RequestFailed(
            response.error.unwrap_or_else(|| fallback.to_string()),
        ))
    }
}

/// `{"group": {"id": ..}}`, `{"id": ..}` or nothing.
fn created_id(payload: Option<&Value>, wrapper: &str) -> Option<String> {
    let payload = payload?;
    payload
        .get(wrapper)
        .and_then(|inner| inner.get("id"))
        .or_else(|| payload.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
