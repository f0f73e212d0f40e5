use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ActionContext, Progress};
use crate::types::BroadcastMessage;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListenAction {
    #[serde(rename = "targetPlace")]
    pub place: String,
    #[serde(skip)]
    heard: String,
    #[serde(skip)]
    silence: Duration,
}

impl ListenAction {
    pub fn new(place: impl Into<String>) -> Self {
        Self {
            place: place.into(),
            ..Self::default()
        }
    }

    pub fn heard(&self) -> &str {
        &self.heard
    }

    pub(super) fn start(&mut self, ctx: &mut ActionContext<'_>) -> Progress {
        log::info!("👂 ({}) listening at {}", ctx.me.username, self.place);
        Progress::Running
    }

    /// Only ends on its own when a silence timeout is configured
    pub(super) fn update(&mut self, dt: Duration, ctx: &mut ActionContext<'_>) -> Progress {
        self.silence += dt;
        match ctx.config().listen_silence_timeout {
            Some(timeout) if self.silence >= timeout => {
                log::debug!("({}) nothing more to hear at {}", ctx.me.username, self.place);
                Progress::Completed
            }
            _ => Progress::Running,
        }
    }

    pub(super) fn resume(&mut self) -> Progress {
        self.silence = Duration::ZERO;
        Progress::Running
    }

    pub(super) fn hear(&mut self, message: &BroadcastMessage, ctx: &mut ActionContext<'_>) {
        if message.place != self.place {
            return;
        }
        if !self.heard.is_empty() {
            self.heard.push(' ');
        }
        self.heard.push_str(&message.message);
        self.silence = Duration::ZERO;
        ctx.face(&message.from);
    }
}
