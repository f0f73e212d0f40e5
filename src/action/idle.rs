use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ActionContext, Progress};
use crate::types::{animation_tag, IdleActivity};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IdleAction {
    #[serde(rename = "activityType", default)]
    pub activity: IdleActivity,
    #[serde(skip)]
    elapsed: Duration,
}

impl IdleAction {
    pub fn new(activity: IdleActivity) -> Self {
        Self {
            activity,
            elapsed: Duration::ZERO,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub(super) fn start(&mut self, ctx: &mut ActionContext<'_>) -> Progress {
        self.show_activity(ctx);
        Progress::Running
    }

    pub(super) fn update(&mut self, dt: Duration, ctx: &mut ActionContext<'_>) -> Progress {
        self.elapsed += dt;
        if self.elapsed >= ctx.config().idle_duration {
            self.reset_animation(ctx);
            return Progress::Completed;
        }
        Progress::Running
    }

    pub(super) fn interrupt(&mut self, ctx: &mut ActionContext<'_>) {
        self.reset_animation(ctx);
    }

    pub(super) fn resume(&mut self, ctx: &mut ActionContext<'_>) -> Progress {
        self.show_activity(ctx);
        Progress::Running
    }

    fn show_activity(&self, ctx: &mut ActionContext<'_>) {
        if self.activity == IdleActivity::Read {
            let animation = format!("{}-read", ctx.me.username);
            ctx.set_animation(animation);
        }
    }

    fn reset_animation(&self, ctx: &mut ActionContext<'_>) {
        let animation = animation_tag(&ctx.me.username, false, ctx.movement.direction());
        ctx.set_animation(animation);
    }
}
