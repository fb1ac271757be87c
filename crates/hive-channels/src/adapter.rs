use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use hive_core::{BotId, Request, RequestId, ThreadId, compose_raw, split_continuation};

/// A prompt queued for a session to feed its engine.
///
/// `text` is either caller chat or a serialized `action_result`; the
/// session tells them apart when it drains.
#[derive(Debug, Clone)]
pub struct PendingPrompt {
    pub request_id: RequestId,
    pub thread_id: ThreadId,
    pub text: String,
}

/// One tracked request: the thread it runs on and the raw response body
/// delivered so far. `body` holds the wire form (continuation marker
/// composed while streaming); `None` means nothing delivered yet, or an
/// action payload was claimed and the run is paused.
struct ResponseSlot {
    thread_id: ThreadId,
    body: Option<String>,
}

/// Trait implemented by each input surface a session drains.
///
/// Adapters buffer work in both directions: callers (or the channel's own
/// action handling) enqueue prompts, the session drains them, and engine
/// output is delivered back against the originating request. All methods
/// are non-blocking.
pub trait InputAdapter: Send + Sync {
    /// Unique identifier for this adapter instance.
    fn id(&self) -> &str;

    /// Adapter type name (e.g., "request").
    fn kind(&self) -> &str;

    /// Take every prompt queued since the last drain.
    fn drain_prompts(&self) -> Vec<PendingPrompt>;

    /// Whether this adapter is tracking `request_id`.
    fn has_request(&self, request_id: RequestId) -> bool;

    /// Store one engine delivery. `text` is the cumulative response so
    /// far; `complete` marks the final delivery. Deliveries for requests
    /// this adapter no longer tracks are dropped.
    fn deliver(&self, request_id: RequestId, text: &str, complete: bool);

    /// Requests still awaiting their final delivery, plus undrained
    /// prompts. This is the load the overload valve watches.
    fn in_flight(&self) -> usize;

    /// Drop every queued prompt and tracked request.
    fn reset(&self);
}

/// The HTTP-facing adapter: one per bot session.
///
/// Submit creates a slot and queues the prompt; the session drains the
/// inbox on its next step and delivers engine output into the slot. The
/// channel reads slots during poll.
pub struct RequestAdapter {
    id: String,
    bot_id: BotId,
    inbox: Mutex<Vec<PendingPrompt>>,
    slots: Mutex<HashMap<RequestId, ResponseSlot>>,
}

impl RequestAdapter {
    pub fn new(bot_id: impl Into<BotId>) -> Self {
        let bot_id = bot_id.into();
        Self {
            id: format!("request:{bot_id}"),
            bot_id,
            inbox: Mutex::new(Vec::new()),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    /// Queue caller text and start tracking its response. An empty
    /// `thread_id` starts a fresh thread.
    pub fn enqueue(&self, thread_id: &str, text: &str) -> Request {
        let thread_id = if thread_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            thread_id.to_string()
        };
        let request_id = Uuid::new_v4();
        self.slots.lock().insert(
            request_id,
            ResponseSlot {
                thread_id: thread_id.clone(),
                body: None,
            },
        );
        self.inbox.lock().push(PendingPrompt {
            request_id,
            thread_id: thread_id.clone(),
            text: text.to_string(),
        });
        debug!(bot_id = %self.bot_id, %request_id, %thread_id, "prompt queued");
        Request {
            request_id,
            bot_id: self.bot_id.clone(),
            thread_id,
        }
    }

    /// Queue a follow-up message against an existing request, on its own
    /// thread. Used for `action_result` payloads.
    pub fn enqueue_on(&self, request_id: RequestId, thread_id: &str, text: &str) {
        self.inbox.lock().push(PendingPrompt {
            request_id,
            thread_id: thread_id.to_string(),
            text: text.to_string(),
        });
    }

    /// A tracked request on `thread_id` still awaiting a delivery. For
    /// the remote-tool flow this is the paused run whose action payload
    /// was handed out.
    pub fn pending_request_on(&self, thread_id: &str) -> Option<RequestId> {
        self.slots
            .lock()
            .iter()
            .find_map(|(id, slot)| (slot.thread_id == thread_id && slot.body.is_none()).then_some(*id))
    }

    /// The thread a tracked request runs on.
    pub fn thread_of(&self, request_id: RequestId) -> Option<ThreadId> {
        self.slots
            .lock()
            .get(&request_id)
            .map(|slot| slot.thread_id.clone())
    }

    /// Current raw body for a request, if any has been delivered.
    pub fn raw_body(&self, request_id: RequestId) -> Option<String> {
        self.slots.lock().get(&request_id)?.body.clone()
    }

    /// Clear the body back to pending, but only if it still equals
    /// `expected`. Returns whether this call won the claim. Concurrent
    /// polls race here so an action payload is handled exactly once.
    pub fn claim_body(&self, request_id: RequestId, expected: &str) -> bool {
        let mut slots = self.slots.lock();
        match slots.get_mut(&request_id) {
            Some(slot) if slot.body.as_deref() == Some(expected) => {
                slot.body = None;
                true
            }
            _ => false,
        }
    }
}

impl InputAdapter for RequestAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        "request"
    }

    fn drain_prompts(&self) -> Vec<PendingPrompt> {
        std::mem::take(&mut *self.inbox.lock())
    }

    fn has_request(&self, request_id: RequestId) -> bool {
        self.slots.lock().contains_key(&request_id)
    }

    fn deliver(&self, request_id: RequestId, text: &str, complete: bool) {
        let mut slots = self.slots.lock();
        match slots.get_mut(&request_id) {
            Some(slot) => {
                slot.body = Some(compose_raw(text, complete));
            }
            None => {
                debug!(bot_id = %self.bot_id, %request_id, "delivery for untracked request dropped");
            }
        }
    }

    fn in_flight(&self) -> usize {
        let pending_slots = self
            .slots
            .lock()
            .values()
            .filter(|slot| match &slot.body {
                Some(raw) => !split_continuation(raw).1,
                None => true,
            })
            .count();
        pending_slots + self.inbox.lock().len()
    }

    fn reset(&self) {
        let dropped_prompts = {
            let mut inbox = self.inbox.lock();
            std::mem::take(&mut *inbox).len()
        };
        let dropped_slots = {
            let mut slots = self.slots.lock();
            let n = slots.len();
            slots.clear();
            n
        };
        if dropped_prompts > 0 || dropped_slots > 0 {
            warn!(
                bot_id = %self.bot_id,
                dropped_prompts, dropped_slots,
                "adapter reset, in-flight work dropped"
            );
        }
    }
}
