use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};

use hive_core::{
    ActionMessage, BotId, HiveError, NO_RESPONSE_PLACEHOLDER, NO_RESPONSE_REQUIRED, PollReply,
    Request, RequestId, Result, compose_raw, split_continuation,
};
use hive_tools::ToolRegistry;

use crate::adapter::{InputAdapter, RequestAdapter};

/// How a stored response body reads once protocol messages are peeled
/// off.
enum SlotView {
    /// Nothing usable yet.
    Empty,
    /// Chat text, cumulative, with the continuation marker decoded.
    Chat { text: String, complete: bool },
    /// An action bound to a detached caller's tool, still in wire form.
    RemoteAction { raw: String },
}

/// The caller-facing surface over every bot session.
///
/// Holds one [`RequestAdapter`] per attached bot. Submitting against an
/// unattached bot is an [`HiveError::UnknownBot`]; everything else flows
/// through the adapter the bot's session drains.
pub struct RequestChannel {
    tools: Arc<ToolRegistry>,
    adapters: RwLock<HashMap<BotId, Arc<RequestAdapter>>>,
}

impl RequestChannel {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            adapters: RwLock::new(HashMap::new()),
        }
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Attach a bot, creating its adapter if needed. Returns the adapter
    /// so the runtime can wire it into the bot's session. Re-attaching an
    /// already-attached bot returns the existing adapter with its queued
    /// work intact, which is what keeps threads alive across a session
    /// rebuild.
    pub fn attach_bot(&self, bot_id: &str) -> Arc<RequestAdapter> {
        let mut adapters = self.adapters.write();
        if let Some(existing) = adapters.get(bot_id) {
            return Arc::clone(existing);
        }
        info!(%bot_id, "attaching bot to request channel");
        let adapter = Arc::new(RequestAdapter::new(bot_id));
        adapters.insert(bot_id.to_string(), Arc::clone(&adapter));
        adapter
    }

    /// Detach a bot. Its queued prompts and tracked requests are dropped.
    pub fn detach_bot(&self, bot_id: &str) -> bool {
        let removed = self.adapters.write().remove(bot_id).is_some();
        if removed {
            info!(%bot_id, "detached bot from request channel");
        }
        removed
    }

    pub fn has_bot(&self, bot_id: &str) -> bool {
        self.adapters.read().contains_key(bot_id)
    }

    /// Attached bot ids, sorted.
    pub fn bot_ids(&self) -> Vec<BotId> {
        let mut ids: Vec<BotId> = self.adapters.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Combined in-flight load across every attached bot.
    pub fn total_in_flight(&self) -> usize {
        self.adapters
            .read()
            .values()
            .map(|adapter| adapter.in_flight())
            .sum()
    }

    fn adapter(&self, bot_id: &str) -> Result<Arc<RequestAdapter>> {
        self.adapters
            .read()
            .get(bot_id)
            .cloned()
            .ok_or_else(|| HiveError::UnknownBot(bot_id.to_string()))
    }

    /// Submit caller text for a bot. An empty `thread_id` starts a fresh
    /// thread; reusing one continues it.
    ///
    /// An `action_result` answering a remote tool call rides the paused
    /// request on its thread instead of opening a slot nothing will ever
    /// deliver to; the handle returned is the original request's.
    pub fn submit(&self, bot_id: &str, thread_id: &str, text: &str) -> Result<Request> {
        let adapter = self.adapter(bot_id)?;
        if let Ok(Some(ActionMessage::ActionResult { .. })) = ActionMessage::parse(text)
            && let Some(request_id) = adapter.pending_request_on(thread_id)
        {
            adapter.enqueue_on(request_id, thread_id, text);
            return Ok(Request {
                request_id,
                bot_id: bot_id.to_string(),
                thread_id: thread_id.to_string(),
            });
        }
        Ok(adapter.enqueue(thread_id, text))
    }

    /// Observe a request's response without blocking.
    ///
    /// `None` until a delivery lands (and again while a claimed tool call
    /// runs); otherwise the cumulative text so far with the continuation
    /// marker stripped. Repeated polls of a streaming response return
    /// growing prefixes of the final text.
    ///
    /// `action_required` payloads never come back from here. For a tool
    /// with an in-process handler, the first poll to see one claims it,
    /// invokes the tool, and queues the `action_result` back onto the
    /// same thread; the engine's continuation then delivers the real
    /// text against this request. Actions bound to a detached caller's
    /// tool stay in the slot for [`Self::lookup`] to hand over.
    pub async fn poll(&self, request: &Request) -> Result<Option<PollReply>> {
        let adapter = self.adapter(&request.bot_id)?;
        match self.refine_slot(&adapter, request).await? {
            SlotView::Chat { text, complete } => Ok(Some(if complete {
                PollReply::complete(text)
            } else {
                PollReply::partial(text)
            })),
            SlotView::RemoteAction { .. } | SlotView::Empty => Ok(None),
        }
    }

    /// Raw lookup body for `/lookup`: the wire form of the response so
    /// far (marker while streaming), or `None` for an unknown request or
    /// one with nothing to show yet.
    ///
    /// When the engine has delegated a call to a remotely registered
    /// tool, this is where its wire form comes out: exactly one lookup
    /// hands the `action_required` body to the detached caller, which
    /// runs the tool and submits the `action_result` on the same thread.
    pub async fn lookup(&self, bot_id: &str, request_id: RequestId) -> Result<Option<String>> {
        let adapter = self.adapter(bot_id)?;
        let Some(thread_id) = adapter.thread_of(request_id) else {
            return Ok(None);
        };
        let request = Request {
            request_id,
            bot_id: bot_id.to_string(),
            thread_id,
        };
        match self.refine_slot(&adapter, &request).await? {
            SlotView::Chat { text, complete } => Ok(Some(compose_raw(&text, complete))),
            SlotView::RemoteAction { raw } => {
                if adapter.claim_body(request_id, &raw) {
                    debug!(%bot_id, %request_id, "handing remote action to caller");
                    Ok(Some(raw))
                } else {
                    Ok(None)
                }
            }
            SlotView::Empty => Ok(None),
        }
    }

    /// Read a request's slot and resolve any protocol message in it.
    async fn refine_slot(
        &self,
        adapter: &Arc<RequestAdapter>,
        request: &Request,
    ) -> Result<SlotView> {
        let Some(raw) = adapter.raw_body(request.request_id) else {
            return Ok(SlotView::Empty);
        };
        let (text, complete) = split_continuation(&raw);

        match ActionMessage::parse(text)? {
            Some(ActionMessage::ActionRequired {
                invocation_id,
                tool_func_name,
                invocation_kwargs,
            }) => {
                let remote = self
                    .tools
                    .resolve(&request.bot_id, &tool_func_name)
                    .map(|registration| registration.binding.is_remote())
                    .unwrap_or(false);
                if remote {
                    return Ok(SlotView::RemoteAction { raw });
                }
                if !adapter.claim_body(request.request_id, &raw) {
                    // A concurrent reader won; the tool call is already running.
                    return Ok(SlotView::Empty);
                }
                let func_result = self
                    .run_tool(&request.bot_id, &tool_func_name, invocation_kwargs)
                    .await;
                let thread_id = adapter
                    .thread_of(request.request_id)
                    .unwrap_or_else(|| request.thread_id.clone());
                let reply = ActionMessage::result(invocation_id.clone(), func_result).to_wire()?;
                adapter.enqueue_on(request.request_id, &thread_id, &reply);
                debug!(
                    bot_id = %request.bot_id,
                    request_id = %request.request_id,
                    %invocation_id,
                    tool = %tool_func_name,
                    "action result queued"
                );
                Ok(SlotView::Empty)
            }
            // Result payloads travel caller→engine only; one in a slot is
            // protocol noise and stays unsurfaced.
            Some(ActionMessage::ActionResult { .. }) => Ok(SlotView::Empty),
            None => {
                let text = if complete && text == NO_RESPONSE_REQUIRED {
                    NO_RESPONSE_PLACEHOLDER.to_string()
                } else {
                    text.to_string()
                };
                Ok(SlotView::Chat { text, complete })
            }
        }
    }

    /// Invoke a delegated tool, folding every failure into the string the
    /// engine gets back as `func_result`.
    async fn run_tool(&self, bot_id: &str, tool_func_name: &str, kwargs: Value) -> Value {
        match self.tools.invoke(bot_id, tool_func_name, kwargs).await {
            Ok(value) => value,
            Err(e) => {
                warn!(%bot_id, tool = %tool_func_name, error = %e, "client tool invocation failed");
                Value::String(format!("Error invoking client tool: {e}"))
            }
        }
    }
}
