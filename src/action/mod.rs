//! Agent actions as one tagged union.
//!
//! The same `Action` value is what the planner returns, what the scheduler
//! runs and what observers see: wire fields are (de)serialised, runtime state
//! is skipped. Lifecycle is `Pending -> Running <-> Interrupted -> Completed`.

mod broadcast;
mod idle;
mod listen;
mod move_to;
mod talk;
mod vote;

pub use broadcast::BroadcastAction;
pub use idle::IdleAction;
pub use listen::ListenAction;
pub use move_to::MoveAction;
pub use talk::{TalkAction, TIMEOUT_MESSAGE};
pub use vote::VoteAction;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

use crate::agent::Services;
use crate::config::Config;
use crate::error::ActionError;
use crate::events::Outbox;
use crate::llm::{ChatRequest, Completion, OracleCall};
use crate::memory::AgentMemory;
use crate::movement::MovementController;
use crate::registry::Registry;
use crate::traits::{ActionDigest, BrainDump};
use crate::types::{
    BroadcastMessage, ChatMessage, IdleActivity, MoveTarget, PlayerData, PlayerUpdate, Position,
};

pub type ActionId = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Pending,
    Running,
    Interrupted,
    Completed,
}

/// Result of driving a variant for one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Running,
    Completed,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionKind {
    Idle(IdleAction),
    Move(MoveAction),
    Talk(TalkAction),
    Broadcast(BroadcastAction),
    Listen(ListenAction),
    Vote(VoteAction),
}

fn reflect_by_default() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    #[serde(rename = "reasonWhy", default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(skip, default = "reflect_by_default")]
    pub should_reflect: bool,
    #[serde(skip)]
    phase: Phase,
    #[serde(skip)]
    id: ActionId,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            reason: String::new(),
            should_reflect: true,
            phase: Phase::Pending,
            id: 0,
        }
    }

    pub fn idle(activity: IdleActivity) -> Self {
        Self::new(ActionKind::Idle(IdleAction::new(activity)))
    }

    pub fn move_to(target: MoveTarget) -> Self {
        Self::new(ActionKind::Move(MoveAction::new(target)))
    }

    pub fn talk(counterpart: impl Into<String>) -> Self {
        Self::new(ActionKind::Talk(TalkAction::new(counterpart)))
    }

    /// Talk started by someone else's message
    pub fn reply_to(message: ChatMessage) -> Self {
        Self::new(ActionKind::Talk(TalkAction::reply_to(message)))
    }

    pub fn broadcast(place: impl Into<String>) -> Self {
        Self::new(ActionKind::Broadcast(BroadcastAction::new(place)))
    }

    pub fn listen(place: impl Into<String>) -> Self {
        Self::new(ActionKind::Listen(ListenAction::new(place)))
    }

    pub fn vote() -> Self {
        Self::new(ActionKind::Vote(VoteAction::default()))
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn without_reflection(mut self) -> Self {
        self.should_reflect = false;
        self
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: ActionId) {
        self.id = id;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_interrupted(&self) -> bool {
        self.phase == Phase::Interrupted
    }

    pub fn is_completed(&self) -> bool {
        self.phase == Phase::Completed
    }

    pub fn label(&self) -> &'static str {
        match self.kind {
            ActionKind::Idle(_) => "idle",
            ActionKind::Move(_) => "move",
            ActionKind::Talk(_) => "talk",
            ActionKind::Broadcast(_) => "broadcast",
            ActionKind::Listen(_) => "listen",
            ActionKind::Vote(_) => "vote",
        }
    }

    /// Walking up to someone before a talk
    pub fn is_approach(&self) -> bool {
        matches!(&self.kind, ActionKind::Move(m) if m.target.person_name().is_some()) && !self.should_reflect
    }

    pub fn talks_with(&self, counterpart: &str) -> bool {
        matches!(&self.kind, ActionKind::Talk(t) if t.name == counterpart)
    }

    /// Wire form shown to observers and fed to prompts
    pub fn to_wire(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// One line for the brain dump
    pub fn describe(&self) -> String {
        match &self.kind {
            ActionKind::Move(m) if self.is_approach() => format!(
                "We are now moving to {} so that we can talk with them",
                m.target.describe()
            ),
            _ => self.to_wire().to_string(),
        }
    }

    pub fn start(&mut self, ctx: &mut ActionContext<'_>) {
        if self.phase != Phase::Pending {
            return;
        }
        self.phase = Phase::Running;
        log::debug!("({}) starting {} action", ctx.me.username, self.label());
        let progress = match &mut self.kind {
            ActionKind::Idle(a) => a.start(ctx),
            ActionKind::Move(a) => a.start(ctx),
            ActionKind::Talk(a) => a.start(ctx),
            ActionKind::Broadcast(a) => a.start(ctx),
            ActionKind::Listen(a) => a.start(ctx),
            ActionKind::Vote(a) => a.start(ctx),
        };
        self.settle(progress, ctx);
    }

    /// No-op unless running
    pub fn update(&mut self, dt: Duration, ctx: &mut ActionContext<'_>) {
        if self.phase != Phase::Running {
            return;
        }
        let progress = match &mut self.kind {
            ActionKind::Idle(a) => a.update(dt, ctx),
            ActionKind::Move(a) => a.update(dt, ctx),
            ActionKind::Talk(a) => a.update(dt, ctx),
            ActionKind::Broadcast(a) => a.update(dt, ctx),
            ActionKind::Listen(a) => a.update(dt, ctx),
            ActionKind::Vote(a) => a.update(dt, ctx),
        };
        self.settle(progress, ctx);
    }

    pub fn interrupt(&mut self, ctx: &mut ActionContext<'_>) {
        if self.phase != Phase::Running {
            return;
        }
        self.phase = Phase::Interrupted;
        log::debug!("({}) interrupting {} action", ctx.me.username, self.label());
        match &mut self.kind {
            ActionKind::Idle(a) => a.interrupt(ctx),
            ActionKind::Move(a) => a.interrupt(ctx),
            ActionKind::Talk(a) => a.interrupt(ctx),
            ActionKind::Broadcast(a) => a.interrupt(),
            ActionKind::Listen(_) | ActionKind::Vote(_) => {}
        }
    }

    pub fn resume(&mut self, ctx: &mut ActionContext<'_>) {
        if self.phase != Phase::Interrupted {
            return;
        }
        self.phase = Phase::Running;
        log::debug!("({}) resuming {} action", ctx.me.username, self.label());
        let progress = match &mut self.kind {
            ActionKind::Idle(a) => a.resume(ctx),
            ActionKind::Move(a) => a.resume(ctx),
            ActionKind::Talk(a) => a.resume(),
            ActionKind::Broadcast(a) => a.resume(),
            ActionKind::Listen(a) => a.resume(),
            ActionKind::Vote(_) => Progress::Running,
        };
        self.settle(progress, ctx);
    }

    /// Mark completed from outside, e.g. when the counterpart ended the talk
    pub fn complete(&mut self) {
        self.phase = Phase::Completed;
    }

    /// Drop an interrupted action for good. A broadcast that already began
    /// still tells the town it is over.
    pub fn abandon(&mut self, ctx: &mut ActionContext<'_>) {
        if self.phase != Phase::Interrupted {
            return;
        }
        if let ActionKind::Broadcast(broadcast) = &mut self.kind {
            broadcast.finish(ctx);
        }
        self.phase = Phase::Completed;
    }

    /// Route an inbound direct message into a running talk
    pub fn handle_message(
        &mut self,
        message: ChatMessage,
        ctx: &mut ActionContext<'_>,
    ) -> Result<(), ActionError> {
        if self.phase == Phase::Completed {
            return Err(ActionError::AlreadyCompleted);
        }
        if let ActionKind::Talk(talk) = &mut self.kind {
            let progress = talk.handle_message(message, ctx);
            self.settle(progress, ctx);
        }
        Ok(())
    }

    /// End a running talk with a closing line
    pub fn end_conversation(
        &mut self,
        reason: &str,
        ctx: &mut ActionContext<'_>,
    ) -> Result<(), ActionError> {
        if self.phase == Phase::Completed {
            return Err(ActionError::AlreadyCompleted);
        }
        if let ActionKind::Talk(talk) = &mut self.kind {
            let progress = talk.end_conversation(reason, ctx);
            self.settle(progress, ctx);
        }
        Ok(())
    }

    /// Offer a heard broadcast; only a running listen keeps it
    pub fn hear(&mut self, message: &BroadcastMessage, ctx: &mut ActionContext<'_>) {
        if self.phase != Phase::Running {
            return;
        }
        if let ActionKind::Listen(listen) = &mut self.kind {
            listen.hear(message, ctx);
        }
    }

    /// What reflection needs to know about this action
    pub fn digest(&self, me: &str, memory: &AgentMemory, config: &Config) -> ActionDigest {
        let interrupted = self.phase == Phase::Interrupted;
        match &self.kind {
            ActionKind::Idle(a) => ActionDigest::Idle {
                activity: a.activity.as_str().to_string(),
                duration: if interrupted { a.elapsed() } else { config.idle_duration },
                interrupted,
            },
            ActionKind::Move(a) => ActionDigest::Move {
                destination: a.target.describe(),
                interrupted,
                gave_up: a.failure().is_some(),
            },
            ActionKind::Talk(a) => ActionDigest::Talk {
                counterpart: a.name.clone(),
                transcript: memory
                    .conversations
                    .latest_thread(&a.name)
                    .map(|thread| thread.transcript(me))
                    .unwrap_or_default(),
                interrupted,
            },
            ActionKind::Broadcast(a) => ActionDigest::Broadcast {
                content: a.emitted(),
                interrupted,
            },
            ActionKind::Listen(a) => ActionDigest::Listen {
                heard: a.heard().to_string(),
                interrupted,
            },
            ActionKind::Vote(a) => ActionDigest::Vote {
                candidate: a.chosen().map(str::to_string),
            },
        }
    }

    fn settle(&mut self, progress: Progress, ctx: &ActionContext<'_>) {
        if progress == Progress::Completed && self.phase != Phase::Completed {
            self.phase = Phase::Completed;
            log::debug!("({}) completed {} action", ctx.me.username, self.label());
        }
    }
}

/// Mutable view of one agent, borrowed for a tick or an event
pub struct AgentEnv<'a> {
    pub me: &'a mut PlayerData,
    pub memory: &'a mut AgentMemory,
    pub movement: &'a mut MovementController,
    pub world: &'a Registry,
    pub out: &'a mut Outbox,
    pub services: &'a Services,
    pub rng: &'a mut StdRng,
}

impl<'a> AgentEnv<'a> {
    pub fn with_plan<'b>(&'b mut self, plan: &'b VecDeque<Action>) -> ActionContext<'b> {
        ActionContext {
            me: &mut *self.me,
            memory: &mut *self.memory,
            movement: &mut *self.movement,
            world: self.world,
            out: &mut *self.out,
            services: self.services,
            rng: &mut *self.rng,
            plan,
        }
    }
}

/// Everything an action may read or touch while it runs
pub struct ActionContext<'a> {
    pub me: &'a mut PlayerData,
    pub memory: &'a mut AgentMemory,
    pub movement: &'a mut MovementController,
    pub world: &'a Registry,
    pub out: &'a mut Outbox,
    pub services: &'a Services,
    pub rng: &'a mut StdRng,
    /// Actions still queued behind the current one
    pub plan: &'a VecDeque<Action>,
}

impl<'a> ActionContext<'a> {
    pub fn config(&self) -> &Config {
        &self.services.config
    }

    pub fn brain_dump(&self, current_action: Option<String>) -> BrainDump {
        let places = self.world.map().place_names();
        let active_broadcasts = places
            .iter()
            .flat_map(|place| {
                self.memory
                    .announcements
                    .active_speakers(place)
                    .map(move |speaker| (place.clone(), speaker.to_string()))
            })
            .collect();
        BrainDump {
            name: self.me.username.clone(),
            backstory: self.memory.backstory.clone(),
            other_players: self
                .world
                .others(&self.me.id)
                .map(|p| p.username.clone())
                .collect(),
            places,
            newspaper: self.world.newspaper().iter().map(|n| n.headline()).collect(),
            reflections: self.memory.reflections.entries().to_vec(),
            current_plan: self
                .plan
                .iter()
                .filter(|a| !a.is_approach())
                .map(|a| a.to_wire().to_string())
                .collect(),
            current_action,
            active_broadcasts,
        }
    }

    pub fn ask(&self, request: ChatRequest) -> OracleCall<Completion> {
        let llm = self.services.llm.clone();
        OracleCall::new(async move { llm.complete(request).await })
    }

    pub fn ask_text(&self, request: ChatRequest) -> OracleCall<String> {
        let llm = self.services.llm.clone();
        OracleCall::new(async move { llm.complete(request).await?.into_text() })
    }

    pub fn position_of(&self, username: &str) -> Option<Position> {
        self.world.find_by_username(username).map(PlayerData::position)
    }

    pub fn within_reach(&self, username: &str) -> bool {
        self.position_of(username).map_or(false, |p| {
            p.distance(&self.me.position()) <= self.config().interaction_range
        })
    }

    /// Turn to face another player, if they are still around
    pub fn face(&mut self, username: &str) {
        if let Some(position) = self.position_of(username) {
            self.movement.face_towards(self.me, position, self.out);
        }
    }

    pub fn set_animation(&mut self, animation: String) {
        if animation != self.me.animation {
            self.out.update_player(PlayerUpdate::animation(animation));
        }
    }
}

/// Split text into sentence-like chunks, keeping the punctuation.
/// Trailing text without punctuation becomes its own chunk.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        let ends = matches!(c, '.' | '!' | '?');
        let next_ends = chars.peek().map_or(false, |n| matches!(n, '.' | '!' | '?'));
        if ends && !next_ends {
            let chunk = current.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }
            current.clear();
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

#[cfg(test)]
pub(crate) mod harness {
    use super::*;
    use crate::events::Outbound;
    use crate::llm::LlmClient;
    use crate::map::{Place, WorldMap};
    use crate::traits::{Planner, Reflector};
    use crate::types::{GridPosition, PlayerId};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::task::Poll;

    /// Answers requests from a fixed script, recording every request.
    /// Each request takes its answer when sent; the answer stays pending while `hold` is set.
    #[derive(Default)]
    pub struct ScriptedLlm {
        answers: Mutex<VecDeque<Completion>>,
        pub requests: Mutex<Vec<ChatRequest>>,
        pub hold: AtomicBool,
    }

    impl ScriptedLlm {
        pub fn new(answers: Vec<Completion>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.into()),
                ..Self::default()
            })
        }

        pub fn text(answers: &[&str]) -> Arc<Self> {
            Self::new(answers.iter().map(|a| Completion::Text(a.to_string())).collect())
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn last_request(&self) -> ChatRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, request: ChatRequest) -> Result<Completion> {
            self.requests.lock().unwrap().push(request);
            let answer = self.answers.lock().unwrap().pop_front();
            futures::future::poll_fn(|_| {
                if self.hold.load(Ordering::SeqCst) {
                    Poll::Pending
                } else {
                    Poll::Ready(())
                }
            })
            .await;
            answer.ok_or_else(|| anyhow!("script exhausted"))
        }
    }

    /// Planner and reflector answering from a script of plan documents.
    /// Plans stay pending while `hold` is set, summaries while `hold_summary` is.
    #[derive(Default)]
    pub struct ScriptedMind {
        plans: Mutex<VecDeque<&'static str>>,
        pub digests: Mutex<Vec<ActionDigest>>,
        pub plan_calls: AtomicUsize,
        pub summaries: AtomicUsize,
        pub hold: AtomicBool,
        pub hold_summary: AtomicBool,
    }

    impl ScriptedMind {
        pub fn new(plans: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                plans: Mutex::new(plans.iter().copied().collect()),
                ..Self::default()
            })
        }

        pub fn plans_requested(&self) -> usize {
            self.plan_calls.load(Ordering::SeqCst)
        }

        pub fn reflections(&self) -> usize {
            self.digests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Planner for ScriptedMind {
        async fn plan(&self, _dump: BrainDump) -> Result<Vec<Action>> {
            self.plan_calls.fetch_add(1, Ordering::SeqCst);
            futures::future::poll_fn(|_| {
                if self.hold.load(Ordering::SeqCst) {
                    Poll::Pending
                } else {
                    Poll::Ready(())
                }
            })
            .await;
            let next = self.plans.lock().unwrap().pop_front();
            match next {
                Some(json) => Ok(serde_json::from_str(json)?),
                None => Ok(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Reflector for ScriptedMind {
        async fn reflect(&self, _dump: BrainDump, digest: ActionDigest) -> Result<String> {
            let line = format!("reflection on {:?}", digest);
            self.digests.lock().unwrap().push(digest);
            Ok(line)
        }

        async fn summarize_reflections(&self, _dump: BrainDump) -> Result<String> {
            self.summaries.fetch_add(1, Ordering::SeqCst);
            futures::future::poll_fn(|_| {
                if self.hold_summary.load(Ordering::SeqCst) {
                    Poll::Pending
                } else {
                    Poll::Ready(())
                }
            })
            .await;
            Ok("summary of my day".to_string())
        }
    }

    /// One agent ("Ann") in a 20x20 open map
    pub struct Harness {
        pub me: PlayerData,
        pub memory: AgentMemory,
        pub movement: MovementController,
        pub world: Registry,
        pub out: Outbox,
        pub services: Services,
        pub rng: StdRng,
        pub plan: VecDeque<Action>,
    }

    impl Harness {
        pub fn new(llm: Arc<ScriptedLlm>) -> Self {
            Self::with_config(llm, Config::default())
        }

        pub fn with_config(llm: Arc<ScriptedLlm>, config: Config) -> Self {
            let map = WorldMap::new(
                20,
                20,
                16.0,
                vec![
                    Place::new("spawn", 0.0, 0.0, 64.0, 64.0),
                    Place::new("Town Square", 160.0, 160.0, 96.0, 96.0),
                ],
                "spawn",
            );
            let mut world = Registry::new(Arc::new(map));
            let position = world.map().grid_to_world(GridPosition::new(2, 2));
            let me = PlayerData::new(PlayerId::new("npc-ann"), "Ann", true, position);
            world.insert(me.clone());
            let movement = MovementController::new(
                config.movement_speed,
                config.blocked_give_up,
                config.arrival_epsilon,
            );
            Self {
                me,
                memory: AgentMemory::new("A retired librarian.", config.reflection_limit),
                movement,
                world,
                out: Outbox::new(),
                services: Services::new(config, llm),
                rng: StdRng::seed_from_u64(3),
                plan: VecDeque::new(),
            }
        }

        pub fn with_mind(llm: Arc<ScriptedLlm>, mind: Arc<ScriptedMind>) -> Self {
            let mut harness = Self::new(llm);
            harness.services.planner = mind.clone();
            harness.services.reflector = mind;
            harness
        }

        pub fn add_player(&mut self, username: &str, cell: GridPosition) -> PlayerData {
            let position = self.world.map().grid_to_world(cell);
            let player = PlayerData::new(PlayerId::new(username.to_lowercase()), username, false, position);
            self.world.insert(player.clone());
            player
        }

        pub fn ctx(&mut self) -> ActionContext<'_> {
            ActionContext {
                me: &mut self.me,
                memory: &mut self.memory,
                movement: &mut self.movement,
                world: &self.world,
                out: &mut self.out,
                services: &self.services,
                rng: &mut self.rng,
                plan: &self.plan,
            }
        }

        pub fn env(&mut self) -> AgentEnv<'_> {
            AgentEnv {
                me: &mut self.me,
                memory: &mut self.memory,
                movement: &mut self.movement,
                world: &self.world,
                out: &mut self.out,
                services: &self.services,
                rng: &mut self.rng,
            }
        }

        /// Drain the outbox, applying own updates to `me` and the registry
        pub fn flush(&mut self) -> Vec<Outbound> {
            let events: Vec<Outbound> = self.out.drain().collect();
            for event in &events {
                if let Outbound::UpdatePlayerData(update) = event {
                    self.me.apply(update);
                    self.world.apply_update(&self.me.id, update);
                }
            }
            events
        }

        /// Run `action` for `steps` ticks of `dt`, flushing after each
        pub fn run(&mut self, action: &mut Action, dt: Duration, steps: usize) -> Vec<Outbound> {
            let mut events = Vec::new();
            for _ in 0..steps {
                action.update(dt, &mut self.ctx());
                events.extend(self.flush());
            }
            events
        }
    }

    pub fn sent_messages(events: &[Outbound]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                Outbound::SendMessage(m) => Some(m.message.clone()),
                _ => None,
            })
            .collect()
    }
}
