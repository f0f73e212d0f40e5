use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ActionContext, Progress};
use crate::error::MovementError;
use crate::movement::MovementOutcome;
use crate::types::{MoveTarget, Position};

#[derive(Debug, Serialize, Deserialize)]
pub struct MoveAction {
    pub target: MoveTarget,
    #[serde(skip)]
    failure: Option<MovementError>,
    /// Where a person target stood when we last planned a path
    #[serde(skip)]
    last_seen: Option<Position>,
    #[serde(skip)]
    since_repath: Duration,
}

impl MoveAction {
    pub fn new(target: MoveTarget) -> Self {
        Self {
            target,
            failure: None,
            last_seen: None,
            since_repath: Duration::ZERO,
        }
    }

    /// Set when the move ended without arriving
    pub fn failure(&self) -> Option<&MovementError> {
        self.failure.as_ref()
    }

    pub(super) fn start(&mut self, ctx: &mut ActionContext<'_>) -> Progress {
        self.head_out(ctx)
    }

    pub(super) fn update(&mut self, dt: Duration, ctx: &mut ActionContext<'_>) -> Progress {
        if let Some(name) = self.target.person_name() {
            let name = name.to_string();
            let Some(position) = ctx.position_of(&name) else {
                log::info!("({}) lost track of {}", ctx.me.username, name);
                ctx.movement.stop();
                return self.fail(MovementError::UnknownPerson(name));
            };
            if ctx.within_reach(&name) {
                ctx.movement.stop();
                ctx.face(&name);
                return Progress::Completed;
            }

            self.since_repath += dt;
            let moved = self
                .last_seen
                .map_or(f64::INFINITY, |seen| seen.distance(&position));
            if moved > ctx.config().person_repath_distance
                && self.since_repath >= ctx.config().person_repath_interval
            {
                log::debug!("({}) {} moved, repathing", ctx.me.username, name);
                if let Progress::Completed = self.head_out(ctx) {
                    return Progress::Completed;
                }
            }
        }

        match ctx.movement.tick(dt, ctx.me, ctx.world, ctx.out) {
            Some(MovementOutcome::Arrived) => match self.target.person_name() {
                Some(name) => {
                    let name = name.to_string();
                    if ctx.within_reach(&name) {
                        ctx.face(&name);
                        Progress::Completed
                    } else {
                        // they walked off while we were on our way
                        self.head_out(ctx)
                    }
                }
                None => Progress::Completed,
            },
            Some(MovementOutcome::Failed(error)) => {
                log::info!("({}) move to {} failed: {}", ctx.me.username, self.target.describe(), error);
                self.fail(error)
            }
            None => Progress::Running,
        }
    }

    pub(super) fn interrupt(&mut self, ctx: &mut ActionContext<'_>) {
        ctx.movement.pause(ctx.me, ctx.out);
    }

    /// Someone else may have used the controller meanwhile, so plan again
    pub(super) fn resume(&mut self, ctx: &mut ActionContext<'_>) -> Progress {
        self.head_out(ctx)
    }

    fn head_out(&mut self, ctx: &mut ActionContext<'_>) -> Progress {
        self.since_repath = Duration::ZERO;
        if let Some(name) = self.target.person_name() {
            self.last_seen = ctx.position_of(name);
        }
        match ctx
            .movement
            .initiate(&self.target, ctx.me, ctx.world, &mut *ctx.rng)
        {
            Ok(()) => Progress::Running,
            Err(error) => {
                log::warn!("({}) can't move to {}: {}", ctx.me.username, self.target.describe(), error);
                self.fail(error)
            }
        }
    }

    fn fail(&mut self, error: MovementError) -> Progress {
        self.failure = Some(error);
        Progress::Completed
    }
}
