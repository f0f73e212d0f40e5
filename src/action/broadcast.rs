use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{split_sentences, ActionContext, Progress};
use crate::events::Outbound;
use crate::llm::{ChatRequest, OracleCall};
use crate::types::{BroadcastMessage, NewsItem};

/// A speech given at a place, emitted one sentence per interval
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BroadcastAction {
    #[serde(rename = "targetPlace")]
    pub place: String,
    #[serde(skip)]
    call: Option<OracleCall<String>>,
    #[serde(skip)]
    chunks: Vec<String>,
    #[serde(skip)]
    cursor: usize,
    #[serde(skip)]
    since_last: Duration,
}

impl BroadcastAction {
    pub fn new(place: impl Into<String>) -> Self {
        Self {
            place: place.into(),
            ..Self::default()
        }
    }

    /// Everything said so far
    pub fn emitted(&self) -> String {
        self.chunks[..self.cursor].join(" ")
    }

    pub fn remaining(&self) -> usize {
        self.chunks.len() - self.cursor
    }

    pub(super) fn start(&mut self, ctx: &mut ActionContext<'_>) -> Progress {
        let dump = ctx.brain_dump(Some(format!("broadcasting at {}", self.place)));
        let system = ctx.services.prompts.broadcast(&dump, &self.place);
        self.call = Some(ctx.ask_text(ChatRequest::new(system)));
        log::info!("📢 ({}) preparing a broadcast at {}", ctx.me.username, self.place);
        Progress::Running
    }

    pub(super) fn update(&mut self, dt: Duration, ctx: &mut ActionContext<'_>) -> Progress {
        if let Some(call) = self.call.as_mut() {
            match call.poll_ready() {
                None => return Progress::Running,
                Some(Ok(text)) => {
                    self.call = None;
                    self.chunks = split_sentences(&text);
                    self.cursor = 0;
                    self.since_last = Duration::ZERO;
                    log::debug!("({}) broadcast has {} chunk(s)", ctx.me.username, self.chunks.len());
                    if self.chunks.is_empty() {
                        return self.finish(ctx);
                    }
                    return Progress::Running;
                }
                Some(Err(e)) => {
                    self.call = None;
                    log::error!("({}) failed to write a broadcast for {}: {:#}", ctx.me.username, self.place, e);
                    return self.finish(ctx);
                }
            }
        }

        self.since_last += dt;
        if self.since_last < ctx.config().broadcast_interval {
            return Progress::Running;
        }
        self.since_last = Duration::ZERO;

        let Some(chunk) = self.chunks.get(self.cursor) else {
            return self.finish(ctx);
        };
        let message = BroadcastMessage::new(ctx.me.username.clone(), self.place.clone(), chunk.clone());
        ctx.out.push(Outbound::Broadcast(message));
        self.cursor += 1;

        if self.cursor >= self.chunks.len() {
            return self.finish(ctx);
        }
        Progress::Running
    }

    /// Keeps the cursor so a resumed broadcast picks up where it stopped
    pub(super) fn interrupt(&mut self) {}

    pub(super) fn resume(&mut self) -> Progress {
        self.since_last = Duration::ZERO;
        Progress::Running
    }

    pub(super) fn finish(&mut self, ctx: &mut ActionContext<'_>) -> Progress {
        let news = NewsItem::broadcast_finished(&ctx.me.username, &self.place);
        ctx.out.push(Outbound::SendNews(news));
        log::info!("📢 ({}) finished broadcasting at {}", ctx.me.username, self.place);
        Progress::Completed
    }
}
