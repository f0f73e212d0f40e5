use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use super::{split_sentences, ActionContext, Progress};
use crate::events::Outbound;
use crate::llm::{AiMessage, ChatRequest, Completion, OracleCall, ToolSpec};
use crate::types::{ChatMessage, MoveTarget};

pub const TIMEOUT_MESSAGE: &str = "I'm sorry, but I haven't heard from you in a while. I'll have to end our conversation for now. Feel free to chat with me again later!";

#[derive(Debug)]
enum TalkState {
    /// Waiting for the opening line
    Opening { call: OracleCall<Completion> },
    /// Idle in the conversation; times out after a while
    Awaiting { since: Duration },
    /// Collecting inbound messages until they stop for a moment
    Buffering {
        messages: Vec<ChatMessage>,
        quiet_for: Duration,
        reply: Option<PendingReply>,
    },
    /// Emitting a reply chunk by chunk
    Responding {
        chunks: VecDeque<String>,
        since_last: Duration,
    },
}

impl Default for TalkState {
    fn default() -> Self {
        TalkState::Awaiting {
            since: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
struct PendingReply {
    /// The buffered messages folded into one user turn
    prompt: String,
    call: OracleCall<Completion>,
}

/// A conversation with one counterpart
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TalkAction {
    pub name: String,
    /// Set when the other side spoke first
    #[serde(skip)]
    opening: Option<ChatMessage>,
    #[serde(skip)]
    state: TalkState,
    /// Text emitted since the last reply was committed to the transcript
    #[serde(skip)]
    emitted: String,
}

impl TalkAction {
    pub fn new(counterpart: impl Into<String>) -> Self {
        Self {
            name: counterpart.into(),
            ..Self::default()
        }
    }

    pub fn reply_to(message: ChatMessage) -> Self {
        Self {
            name: message.from.clone(),
            opening: Some(message),
            ..Self::default()
        }
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, TalkState::Awaiting { .. })
    }

    pub fn is_buffering(&self) -> bool {
        matches!(self.state, TalkState::Buffering { .. })
    }

    pub fn is_responding(&self) -> bool {
        matches!(self.state, TalkState::Responding { .. })
    }

    pub(super) fn start(&mut self, ctx: &mut ActionContext<'_>) -> Progress {
        ctx.memory.conversations.get_newest_active_thread(&self.name);
        match self.opening.take() {
            Some(message) => self.handle_message(message, ctx),
            None => {
                let dump = ctx.brain_dump(Some(format!("talking with {}", self.name)));
                let system = ctx.services.prompts.start_conversation(&dump, &self.name);
                let request = self.request(system, None, ctx);
                self.state = TalkState::Opening {
                    call: ctx.ask(request),
                };
                Progress::Running
            }
        }
    }

    pub(super) fn update(&mut self, dt: Duration, ctx: &mut ActionContext<'_>) -> Progress {
        // keeps walking if a chunk sent us closer to the counterpart
        ctx.movement.tick(dt, ctx.me, ctx.world, ctx.out);

        let state = std::mem::take(&mut self.state);
        match state {
            TalkState::Opening { mut call } => match call.poll_ready() {
                None => {
                    self.state = TalkState::Opening { call };
                    Progress::Running
                }
                Some(Ok(completion)) => self.on_completion(completion, ctx),
                Some(Err(e)) => {
                    log::error!("({}) failed to open a conversation with {}: {:#}", ctx.me.username, self.name, e);
                    self.close_thread(ctx);
                    Progress::Completed
                }
            },
            TalkState::Awaiting { since } => {
                let since = since + dt;
                if since >= ctx.config().conversation_timeout {
                    log::debug!("({}) conversation with {} timed out", ctx.me.username, self.name);
                    return self.end_conversation(TIMEOUT_MESSAGE, ctx);
                }
                self.state = TalkState::Awaiting { since };
                Progress::Running
            }
            TalkState::Buffering {
                messages,
                quiet_for,
                reply,
            } => self.buffering(messages, quiet_for + dt, reply, ctx),
            TalkState::Responding { chunks, since_last } => {
                self.responding(chunks, since_last + dt, ctx)
            }
        }
    }

    /// New inbound message from the counterpart. Anything still being said is
    /// cut short and a pending reply is dropped, so one reply covers the
    /// whole burst of messages.
    pub(super) fn handle_message(&mut self, message: ChatMessage, ctx: &mut ActionContext<'_>) -> Progress {
        ctx.memory.conversations.add_message(&self.name, message.clone());
        self.commit_emitted(ctx);

        let state = std::mem::take(&mut self.state);
        let mut messages = match state {
            TalkState::Buffering { messages, .. } => messages,
            _ => Vec::new(),
        };
        messages.push(message);
        self.state = TalkState::Buffering {
            messages,
            quiet_for: Duration::ZERO,
            reply: None,
        };
        Progress::Running
    }

    /// Say `reason`, close the thread and tell the counterpart
    pub(super) fn end_conversation(&mut self, reason: &str, ctx: &mut ActionContext<'_>) -> Progress {
        self.commit_emitted(ctx);
        self.state = TalkState::default();

        let message = ChatMessage::new(ctx.me.username.clone(), self.name.clone(), reason);
        ctx.memory
            .conversations
            .add_ai_message(&self.name, AiMessage::assistant(reason));
        ctx.memory.conversations.add_message(&self.name, message.clone());
        self.close_thread(ctx);
        ctx.out.push(Outbound::EndConversation(message));
        ctx.face(&self.name);
        log::info!("💬 ({}) ended conversation with {}", ctx.me.username, self.name);
        Progress::Completed
    }

    pub(super) fn interrupt(&mut self, ctx: &mut ActionContext<'_>) {
        self.commit_emitted(ctx);
        self.state = TalkState::default();
        ctx.movement.pause(ctx.me, ctx.out);
    }

    pub(super) fn resume(&mut self) -> Progress {
        self.state = TalkState::default();
        Progress::Running
    }

    fn buffering(
        &mut self,
        messages: Vec<ChatMessage>,
        quiet_for: Duration,
        reply: Option<PendingReply>,
        ctx: &mut ActionContext<'_>,
    ) -> Progress {
        let mut reply = match reply {
            Some(reply) => reply,
            None if quiet_for >= ctx.config().message_debounce => {
                let prompt = messages
                    .iter()
                    .map(|m| m.message.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                let dump = ctx.brain_dump(Some(format!("talking with {}", self.name)));
                let system = ctx.services.prompts.continue_conversation(&dump, &self.name);
                let request = self.request(system, Some(prompt.clone()), ctx);
                log::debug!("({}) replying to {} buffered message(s)", ctx.me.username, messages.len());
                PendingReply {
                    prompt,
                    call: ctx.ask(request),
                }
            }
            None => {
                self.state = TalkState::Buffering {
                    messages,
                    quiet_for,
                    reply: None,
                };
                return Progress::Running;
            }
        };

        match reply.call.poll_ready() {
            None => {
                self.state = TalkState::Buffering {
                    messages,
                    quiet_for,
                    reply: Some(reply),
                };
                Progress::Running
            }
            Some(Ok(completion)) => {
                ctx.memory
                    .conversations
                    .add_ai_message(&self.name, AiMessage::user(reply.prompt));
                self.on_completion(completion, ctx)
            }
            Some(Err(e)) => {
                log::error!("({}) failed to reply to {}: {:#}", ctx.me.username, self.name, e);
                self.state = TalkState::default();
                Progress::Running
            }
        }
    }

    fn responding(
        &mut self,
        mut chunks: VecDeque<String>,
        since_last: Duration,
        ctx: &mut ActionContext<'_>,
    ) -> Progress {
        if since_last < ctx.config().chunk_delay {
            self.state = TalkState::Responding { chunks, since_last };
            return Progress::Running;
        }
        let Some(chunk) = chunks.pop_front() else {
            self.commit_emitted(ctx);
            self.state = TalkState::default();
            return Progress::Running;
        };

        if !ctx.within_reach(&self.name) && !ctx.movement.is_moving() {
            let target = MoveTarget::person(self.name.clone());
            if let Err(e) = ctx.movement.initiate(&target, ctx.me, ctx.world, &mut *ctx.rng) {
                log::debug!("({}) can't get closer to {}: {}", ctx.me.username, self.name, e);
            }
        }

        let message = ChatMessage::new(ctx.me.username.clone(), self.name.clone(), chunk.clone());
        ctx.memory.conversations.add_message(&self.name, message.clone());
        ctx.out.push(Outbound::SendMessage(message));
        ctx.face(&self.name);
        if !self.emitted.is_empty() {
            self.emitted.push(' ');
        }
        self.emitted.push_str(&chunk);

        if chunks.is_empty() {
            self.commit_emitted(ctx);
            self.state = TalkState::default();
        } else {
            self.state = TalkState::Responding {
                chunks,
                since_last: Duration::ZERO,
            };
        }
        Progress::Running
    }

    fn on_completion(&mut self, completion: Completion, ctx: &mut ActionContext<'_>) -> Progress {
        match completion {
            Completion::Text(text) => {
                let chunks: VecDeque<String> = split_sentences(&text).into();
                if chunks.is_empty() {
                    self.state = TalkState::default();
                    return Progress::Running;
                }
                // first chunk goes out right away
                self.responding(chunks, ctx.config().chunk_delay, ctx)
            }
            Completion::ToolCall { name, arguments } if name == ToolSpec::END_CONVERSATION => {
                let reason = arguments
                    .get("reason")
                    .and_then(|r| r.as_str())
                    .unwrap_or("I have to go now.")
                    .to_string();
                self.end_conversation(&reason, ctx)
            }
            Completion::ToolCall { name, .. } => {
                log::warn!("({}) ignoring unknown tool call {}", ctx.me.username, name);
                self.state = TalkState::default();
                Progress::Running
            }
        }
    }

    fn request(&self, system: String, user_turn: Option<String>, ctx: &ActionContext<'_>) -> ChatRequest {
        let history = ctx
            .memory
            .conversations
            .latest_thread(&self.name)
            .filter(|thread| !thread.finished)
            .map(|thread| thread.ai_messages.clone())
            .unwrap_or_default();
        ChatRequest::new(system)
            .with_messages(history)
            .with_messages(user_turn.map(AiMessage::user))
            .with_tool(ToolSpec::end_conversation())
    }

    fn commit_emitted(&mut self, ctx: &mut ActionContext<'_>) {
        if self.emitted.is_empty() {
            return;
        }
        let content = std::mem::take(&mut self.emitted);
        ctx.memory
            .conversations
            .add_ai_message(&self.name, AiMessage::assistant(content));
    }

    fn close_thread(&self, ctx: &mut ActionContext<'_>) {
        if let Err(e) = ctx.memory.conversations.close_thread(&self.name) {
            log::warn!("({}) {}", ctx.me.username, e);
        }
    }
}
