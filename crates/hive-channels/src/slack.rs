use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use hive_core::{
    ActionMessage, BotId, HiveError, NO_RESPONSE_REQUIRED, ReportTarget, Request, RequestId,
    Result, ThreadId,
};

use crate::adapter::{InputAdapter, PendingPrompt};

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Target type used when a session replies into its own Slack channel.
pub const SLACK_CHANNEL_TARGET: &str = "slack_channel_id";

/// Outbound notification seam. Task reports and escalations go through
/// here; the runtime never talks to Slack directly.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, target: &ReportTarget, text: &str) -> Result<()>;
}

/// Slack notifier using the Web API.
///
/// ## Setup
///
/// 1. Create a Slack App at <https://api.slack.com/apps>
/// 2. Add the `chat:write` Bot Token Scope
/// 3. Install to workspace and copy the Bot Token (`xoxb-...`)
/// 4. Configure in hive.toml:
///    ```toml
///    [slack]
///    enabled = true
///    bot_token = "xoxb-..."
///    ```
pub struct SlackNotifier {
    bot_token: String,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, target: &ReportTarget, text: &str) -> Result<()> {
        let body = json!({
            "channel": target.target_id,
            "text": text,
        });

        let resp = self
            .client
            .post(format!("{SLACK_API_BASE}/chat.postMessage"))
            .header("Authorization", format!("Bearer {}", self.bot_token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| HiveError::Channel {
                channel: "slack".into(),
                reason: format!("HTTP error: {e}"),
            })?;

        let data: Value = resp.json().await.unwrap_or_default();
        if !data["ok"].as_bool().unwrap_or(false) {
            let err = data["error"].as_str().unwrap_or("unknown");
            warn!(error = %err, channel = %target.target_id, "Slack API error sending notification");
            return Err(HiveError::Channel {
                channel: "slack".into(),
                reason: format!("Slack API error: {err}"),
            });
        }

        Ok(())
    }
}

/// Slack-facing input adapter: one per bot with a Slack presence.
///
/// Whoever receives Slack events enqueues the message text here (with the
/// Slack thread_ts as the thread id); the session drains it like any other
/// prompt. Only the final delivery is posted back, through the
/// [`Notifier`], into the bot's configured channel. Partial chunks stay
/// server-side: Slack messages are not edited mid-stream.
pub struct SlackAdapter {
    id: String,
    bot_id: BotId,
    channel_id: String,
    notifier: Arc<dyn Notifier>,
    inbox: Mutex<Vec<PendingPrompt>>,
    /// Requests awaiting their final delivery, by originating thread.
    tracked: Mutex<HashMap<RequestId, ThreadId>>,
}

impl SlackAdapter {
    pub fn new(
        bot_id: impl Into<BotId>,
        channel_id: impl Into<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let bot_id = bot_id.into();
        Self {
            id: format!("slack:{bot_id}"),
            bot_id,
            channel_id: channel_id.into(),
            notifier,
            inbox: Mutex::new(Vec::new()),
            tracked: Mutex::new(HashMap::new()),
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Queue an inbound Slack message. `thread_ts` keeps replies in the
    /// Slack thread they came from; empty starts a fresh one.
    pub fn enqueue(&self, thread_ts: &str, text: &str) -> Request {
        let thread_id = if thread_ts.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            thread_ts.to_string()
        };
        let request_id = Uuid::new_v4();
        self.tracked.lock().insert(request_id, thread_id.clone());
        self.inbox.lock().push(PendingPrompt {
            request_id,
            thread_id: thread_id.clone(),
            text: text.to_string(),
        });
        debug!(bot_id = %self.bot_id, %request_id, %thread_id, "slack prompt queued");
        Request {
            request_id,
            bot_id: self.bot_id.clone(),
            thread_id,
        }
    }
}

impl InputAdapter for SlackAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        "slack"
    }

    fn drain_prompts(&self) -> Vec<PendingPrompt> {
        std::mem::take(&mut *self.inbox.lock())
    }

    fn has_request(&self, request_id: RequestId) -> bool {
        self.tracked.lock().contains_key(&request_id)
    }

    fn deliver(&self, request_id: RequestId, text: &str, complete: bool) {
        if !complete {
            return;
        }
        if self.tracked.lock().remove(&request_id).is_none() {
            debug!(bot_id = %self.bot_id, %request_id, "slack delivery for untracked request dropped");
            return;
        }
        if text == NO_RESPONSE_REQUIRED {
            return;
        }
        // There is no tool caller on the Slack side; an action payload
        // landing here cannot be answered.
        if matches!(ActionMessage::parse(text), Ok(Some(_))) {
            warn!(
                bot_id = %self.bot_id,
                %request_id,
                "dropping action payload delivered to slack adapter"
            );
            return;
        }
        let notifier = Arc::clone(&self.notifier);
        let target = ReportTarget {
            target_type: SLACK_CHANNEL_TARGET.to_string(),
            target_id: self.channel_id.clone(),
        };
        let bot_id = self.bot_id.clone();
        let text = text.to_string();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&target, &text).await {
                warn!(%bot_id, error = %e, "failed to post slack reply");
            }
        });
    }

    fn in_flight(&self) -> usize {
        self.tracked.lock().len() + self.inbox.lock().len()
    }

    fn reset(&self) {
        let dropped = self.inbox.lock().len() + self.tracked.lock().len();
        self.inbox.lock().clear();
        self.tracked.lock().clear();
        if dropped > 0 {
            warn!(bot_id = %self.bot_id, dropped, "slack adapter reset, in-flight work dropped");
        }
    }
}

/// Per-bot Slack adapters, kept outside the sessions so a rebuilt session
/// picks up the same adapter the old one drained (mirrors
/// [`RequestChannel::attach_bot`](crate::RequestChannel::attach_bot)).
pub struct SlackGateway {
    notifier: Arc<dyn Notifier>,
    adapters: RwLock<HashMap<BotId, Arc<SlackAdapter>>>,
}

impl SlackGateway {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a bot, creating its adapter if needed. A bot whose channel
    /// moved gets a fresh adapter; its old in-flight work is dropped.
    pub fn attach_bot(&self, bot_id: &str, channel_id: &str) -> Arc<SlackAdapter> {
        let mut adapters = self.adapters.write();
        if let Some(existing) = adapters.get(bot_id)
            && existing.channel_id() == channel_id
        {
            return Arc::clone(existing);
        }
        info!(%bot_id, %channel_id, "attaching bot to slack gateway");
        let adapter = Arc::new(SlackAdapter::new(
            bot_id,
            channel_id,
            Arc::clone(&self.notifier),
        ));
        adapters.insert(bot_id.to_string(), Arc::clone(&adapter));
        adapter
    }

    pub fn detach_bot(&self, bot_id: &str) -> bool {
        let removed = self.adapters.write().remove(bot_id).is_some();
        if removed {
            info!(%bot_id, "detached bot from slack gateway");
        }
        removed
    }

    /// The live adapter for a bot, for whoever feeds Slack events in.
    pub fn adapter(&self, bot_id: &str) -> Option<Arc<SlackAdapter>> {
        self.adapters.read().get(bot_id).cloned()
    }
}

/// Notifier used when no delivery surface is configured. Reports land in
/// the log instead of disappearing.
#[derive(Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, target: &ReportTarget, text: &str) -> Result<()> {
        info!(
            target_type = %target.target_type,
            target_id = %target.target_id,
            %text,
            "notification (no delivery surface configured)"
        );
        Ok(())
    }
}
