//! Per-agent action scheduler.
//!
//! One action is current at a time; the rest wait in a FIFO queue. When the
//! current action completes, a completion job reflects on it, compacts the
//! reflection log if it overflowed, and asks for a fresh plan. While that job
//! is in flight the brain does nothing else. Inbound events may still preempt
//! the current action; a job that resolves after such a preemption keeps its
//! reflection and plan but leaves the new current action alone.

use std::collections::VecDeque;
use std::time::Duration;

use crate::action::{Action, ActionId, ActionKind, AgentEnv};
use crate::events::Outbound;
use crate::llm::{AiMessage, OracleCall};
use crate::traits::BrainDump;
use crate::types::{BroadcastMessage, ChatMessage, MoveTarget, NewsItem, PlayerUpdate};

#[derive(Debug)]
enum Stage {
    Reflecting(OracleCall<String>),
    /// Summary of the first `usize` reflections
    Compacting(OracleCall<String>, usize),
    Planning(OracleCall<Vec<Action>>),
}

/// Completion handling for one finished action
#[derive(Debug)]
struct CompletionJob {
    action_id: ActionId,
    stage: Stage,
}

/// Reflection on an action that was preempted, running beside everything else
#[derive(Debug)]
enum SideCall {
    Reflection(OracleCall<String>),
    Compaction(OracleCall<String>, usize),
}

#[derive(Debug, Default)]
pub struct Brain {
    queue: VecDeque<Action>,
    current: Option<Action>,
    next_id: ActionId,
    job: Option<CompletionJob>,
    side_calls: Vec<SideCall>,
    /// Replan requested while idle
    replan: Option<OracleCall<Vec<Action>>>,
    idle_for: Duration,
    planned_once: bool,
}

impl Brain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Action> {
        self.current.as_ref()
    }

    pub fn queue(&self) -> &VecDeque<Action> {
        &self.queue
    }

    /// A completion job is in flight
    pub fn is_busy(&self) -> bool {
        self.job.is_some()
    }

    pub fn is_planning(&self) -> bool {
        self.replan.is_some() || matches!(&self.job, Some(CompletionJob { stage: Stage::Planning(_), .. }))
    }

    /// Append actions as given, without expansion
    pub fn enqueue(&mut self, action: Action) {
        let action = self.assign_id(action);
        self.queue.push_back(action);
        self.planned_once = true;
    }

    pub fn update(&mut self, dt: Duration, env: &mut AgentEnv<'_>) {
        self.poll_side_calls(env);

        if self.job.is_some() {
            self.poll_job(env);
            if self.job.is_some() {
                return;
            }
        }
        self.poll_replan(env);

        if self.current.is_none() {
            match self.queue.pop_front() {
                Some(next) => {
                    self.idle_for = Duration::ZERO;
                    self.begin(next, env);
                }
                None => self.idle(dt, env),
            }
            return;
        }

        if let Some(current) = self.current.as_mut() {
            let mut ctx = env.with_plan(&self.queue);
            current.update(dt, &mut ctx);
        }
        self.settle_current(env);
    }

    /// Preempt the current action with `action`. The preempted action goes
    /// back to the front of the queue and is reflected on if it asks for it.
    pub fn interrupt_and_execute(&mut self, action: Action, env: &mut AgentEnv<'_>) {
        let action = self.assign_id(action);
        if let Some(mut current) = self.current.take() {
            let mut ctx = env.with_plan(&self.queue);
            current.interrupt(&mut ctx);
            if !current.is_completed() {
                if current.should_reflect {
                    self.reflect_on_the_side(&current, env);
                }
                log::info!("⏸️ ({}) {} interrupted by {}", env.me.username, current.label(), action.label());
                self.queue.push_front(current);
            }
        }
        self.begin(action, env);
    }

    /// Direct message addressed to this agent
    pub fn on_direct_message(&mut self, message: ChatMessage, env: &mut AgentEnv<'_>) {
        let from = message.from.clone();
        let routed = match self.current.as_mut() {
            Some(current) if current.talks_with(&from) && !current.is_completed() => {
                let mut ctx = env.with_plan(&self.queue);
                current.handle_message(message.clone(), &mut ctx).is_ok()
            }
            _ => false,
        };
        if routed {
            self.settle_current(env);
            return;
        }
        let reply = Action::reply_to(message).with_reason(format!("{} started talking to me", from));
        self.interrupt_and_execute(reply, env);
    }

    /// The counterpart closed the conversation on their side
    pub fn on_end_conversation(&mut self, message: ChatMessage, env: &mut AgentEnv<'_>) {
        let from = message.from.clone();
        let conversations = &mut env.memory.conversations;
        if conversations.is_latest_thread_active(&from) {
            conversations.add_ai_message(&from, AiMessage::user(message.message.clone()));
            conversations.add_message(&from, message);
            if let Err(e) = conversations.close_thread(&from) {
                log::warn!("({}) {}", env.me.username, e);
            }
        } else {
            log::warn!("({}) {} ended a conversation that was already over", env.me.username, from);
        }
        if let Some(current) = self.current.as_mut() {
            if current.talks_with(&from) && !current.is_completed() {
                log::info!("💬 ({}) {} ended our conversation", env.me.username, from);
                current.complete();
            }
        }
        self.settle_current(env);
    }

    /// Broadcast chunk heard inside a place this agent stands in
    pub fn on_broadcast(&mut self, message: &BroadcastMessage, env: &mut AgentEnv<'_>) {
        if let Some(current) = self.current.as_mut() {
            let mut ctx = env.with_plan(&self.queue);
            current.hear(message, &mut ctx);
        }
    }

    fn assign_id(&mut self, mut action: Action) -> Action {
        self.next_id += 1;
        action.set_id(self.next_id);
        action
    }

    /// Make `action` current and show it to observers
    fn begin(&mut self, mut action: Action, env: &mut AgentEnv<'_>) {
        env.out.update_player(PlayerUpdate {
            action: Some(action.to_wire()),
            ..PlayerUpdate::default()
        });
        {
            let mut ctx = env.with_plan(&self.queue);
            if action.is_interrupted() {
                action.resume(&mut ctx);
            } else {
                action.start(&mut ctx);
            }
        }
        self.current = Some(action);
        self.settle_current(env);
    }

    /// Start completion handling if the current action just finished
    fn settle_current(&mut self, env: &mut AgentEnv<'_>) {
        if self.job.is_some() {
            return;
        }
        let Some(current) = self.current.as_ref() else {
            return;
        };
        if !current.is_completed() {
            return;
        }
        if !current.should_reflect {
            self.current = None;
            return;
        }

        let digest = current.digest(&env.me.username, env.memory, &env.services.config);
        let action_id = current.id();
        let dump = self.dump(env, Some(current.describe()));
        let reflector = env.services.reflector.clone();
        self.job = Some(CompletionJob {
            action_id,
            stage: Stage::Reflecting(OracleCall::new(async move { reflector.reflect(dump, digest).await })),
        });
    }

    fn poll_job(&mut self, env: &mut AgentEnv<'_>) {
        let Some(mut job) = self.job.take() else {
            return;
        };
        match &mut job.stage {
            Stage::Reflecting(call) => match call.poll_ready() {
                None => self.job = Some(job),
                Some(Ok(reflection)) => {
                    let overflowed = self.remember(reflection, env);
                    job.stage = if overflowed {
                        let (call, covered) = self.summarize_call(env);
                        Stage::Compacting(call, covered)
                    } else {
                        Stage::Planning(self.plan_call(env))
                    };
                    self.job = Some(job);
                }
                Some(Err(e)) => {
                    log::error!("({}) reflection failed: {:#}", env.me.username, e);
                    self.finish_job(job.action_id);
                }
            },
            Stage::Compacting(call, covered) => match call.poll_ready() {
                None => self.job = Some(job),
                Some(result) => {
                    let covered = *covered;
                    self.apply_compaction(result, covered, env);
                    job.stage = Stage::Planning(self.plan_call(env));
                    self.job = Some(job);
                }
            },
            Stage::Planning(call) => match call.poll_ready() {
                None => self.job = Some(job),
                Some(Ok(plan)) => {
                    self.replace_plan(plan, env);
                    self.finish_job(job.action_id);
                }
                Some(Err(e)) => {
                    log::error!("({}) planning failed: {:#}", env.me.username, e);
                    self.finish_job(job.action_id);
                }
            },
        }
    }

    /// Clear the finished action unless something else became current meanwhile
    fn finish_job(&mut self, action_id: ActionId) {
        match &self.current {
            Some(current) if current.id() == action_id => self.current = None,
            Some(current) => {
                log::debug!("completion of action {} resolved after {} took over", action_id, current.label());
            }
            None => {}
        }
    }

    fn poll_side_calls(&mut self, env: &mut AgentEnv<'_>) {
        let mut pending = Vec::with_capacity(self.side_calls.len());
        let mut compact = false;
        for mut side in std::mem::take(&mut self.side_calls) {
            match &mut side {
                SideCall::Reflection(call) => match call.poll_ready() {
                    None => pending.push(side),
                    Some(Ok(reflection)) => compact |= self.remember(reflection, env),
                    Some(Err(e)) => log::error!("({}) reflection failed: {:#}", env.me.username, e),
                },
                SideCall::Compaction(call, covered) => match call.poll_ready() {
                    None => pending.push(side),
                    Some(result) => {
                        let covered = *covered;
                        self.apply_compaction(result, covered, env);
                    }
                },
            }
        }
        let compacting = pending.iter().any(|s| matches!(s, SideCall::Compaction(..)))
            || matches!(&self.job, Some(CompletionJob { stage: Stage::Compacting(..), .. }));
        if compact && !compacting {
            let (call, covered) = self.summarize_call(env);
            pending.push(SideCall::Compaction(call, covered));
        }
        self.side_calls.extend(pending);
    }

    fn poll_replan(&mut self, env: &mut AgentEnv<'_>) {
        let Some(call) = self.replan.as_mut() else {
            return;
        };
        match call.poll_ready() {
            None => {}
            Some(Ok(plan)) => {
                self.replan = None;
                self.replace_plan(plan, env);
            }
            Some(Err(e)) => {
                self.replan = None;
                log::error!("({}) planning failed: {:#}", env.me.username, e);
            }
        }
    }

    /// Nothing to do: plan right away the first time, then after a cooldown
    fn idle(&mut self, dt: Duration, env: &mut AgentEnv<'_>) {
        if self.replan.is_some() {
            return;
        }
        self.idle_for += dt;
        if self.planned_once && self.idle_for < env.services.config.replan_cooldown {
            return;
        }
        log::debug!("({}) idle, asking for a plan", env.me.username);
        self.planned_once = true;
        self.idle_for = Duration::ZERO;
        self.replan = Some(self.plan_call(env));
    }

    fn reflect_on_the_side(&mut self, action: &Action, env: &mut AgentEnv<'_>) {
        let digest = action.digest(&env.me.username, env.memory, &env.services.config);
        let dump = self.dump(env, Some(action.describe()));
        let reflector = env.services.reflector.clone();
        self.side_calls.push(SideCall::Reflection(OracleCall::new(async move {
            reflector.reflect(dump, digest).await
        })));
    }

    /// Append a reflection and publish the log. Returns true when it overflowed.
    fn remember(&mut self, reflection: String, env: &mut AgentEnv<'_>) -> bool {
        let overflowed = env.memory.reflections.push(reflection);
        env.out.push(Outbound::Reflections(env.memory.reflections.entries().to_vec()));
        overflowed
    }

    fn apply_compaction(&mut self, result: anyhow::Result<String>, covered: usize, env: &mut AgentEnv<'_>) {
        match result {
            Ok(summary) => {
                log::debug!("({}) compacted {} reflections", env.me.username, covered);
                env.memory.reflections.compact(covered, summary);
                env.out.push(Outbound::Reflections(env.memory.reflections.entries().to_vec()));
            }
            Err(e) => log::error!("({}) failed to summarize reflections: {:#}", env.me.username, e),
        }
    }

    /// Summary request over every reflection logged so far, with how many that is
    fn summarize_call(&self, env: &mut AgentEnv<'_>) -> (OracleCall<String>, usize) {
        let covered = env.memory.reflections.len();
        let dump = self.dump(env, None);
        let reflector = env.services.reflector.clone();
        (OracleCall::new(async move { reflector.summarize_reflections(dump).await }), covered)
    }

    fn plan_call(&self, env: &mut AgentEnv<'_>) -> OracleCall<Vec<Action>> {
        let dump = self.dump(env, None);
        let planner = env.services.planner.clone();
        OracleCall::new(async move { planner.plan(dump).await })
    }

    fn dump(&self, env: &mut AgentEnv<'_>, current_action: Option<String>) -> BrainDump {
        env.with_plan(&self.queue).brain_dump(current_action)
    }

    fn replace_plan(&mut self, plan: Vec<Action>, env: &mut AgentEnv<'_>) {
        for mut dropped in std::mem::take(&mut self.queue) {
            let mut ctx = env.with_plan(&self.queue);
            dropped.abandon(&mut ctx);
        }
        let mut queue = VecDeque::new();
        for action in expand_plan(plan, env) {
            queue.push_back(self.assign_id(action));
        }
        self.queue = queue;
        self.idle_for = Duration::ZERO;
        log::debug!("({}) queue now holds {} action(s)", env.me.username, self.queue.len());
    }
}

/// Turn planned actions into an executable queue: every action that happens
/// somewhere gets a non-reflecting move in front of it. Broadcasts are
/// announced in the news unless this agent's announcement there is still open.
pub fn expand_plan(plan: Vec<Action>, env: &mut AgentEnv<'_>) -> Vec<Action> {
    let mut queue = Vec::with_capacity(plan.len() * 2);
    for action in plan {
        let lead = match &action.kind {
            ActionKind::Talk(talk) => Some(MoveTarget::person(talk.name.clone())),
            ActionKind::Broadcast(broadcast) => {
                let me = env.me.username.clone();
                let announced = env
                    .memory
                    .announcements
                    .active_speakers(&broadcast.place)
                    .any(|speaker| speaker == me);
                if !announced {
                    let news = NewsItem::broadcast_announced(&me, &broadcast.place);
                    env.memory.announcements.record(&news);
                    env.out.push(Outbound::SendNews(news));
                }
                let podium = format!("{} (podium)", broadcast.place);
                if env.world.map().place(&podium).is_some() {
                    Some(MoveTarget::place(podium))
                } else {
                    Some(MoveTarget::place(broadcast.place.clone()))
                }
            }
            ActionKind::Listen(listen) => Some(MoveTarget::place(listen.place.clone())),
            ActionKind::Vote(_) => Some(MoveTarget::place(env.services.config.voting_place.clone())),
            ActionKind::Idle(_) | ActionKind::Move(_) => None,
        };
        if let Some(target) = lead {
            queue.push(Action::move_to(target).without_reflection());
        }
        queue.push(action);
    }
    queue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::harness::{Harness, ScriptedLlm, ScriptedMind};
    use crate::action::Phase;
    use crate::map::Place;
    use crate::registry::Registry;
    use crate::traits::ActionDigest;
    use crate::types::{GridPosition, IdleActivity};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    const FRAME: Duration = Duration::from_millis(100);

    fn tick(brain: &mut Brain, h: &mut Harness, frames: usize) {
        for _ in 0..frames {
            brain.update(FRAME, &mut h.env());
            h.flush();
        }
    }

    fn labels(brain: &Brain) -> Vec<&'static str> {
        brain.queue().iter().map(Action::label).collect()
    }

    #[test]
    fn idle_brain_plans_at_once_then_waits_for_the_cooldown() {
        let mind = ScriptedMind::new(&[r#"[{"type": "idle", "activityType": "read"}]"#]);
        let mut h = Harness::with_mind(ScriptedLlm::default().into(), mind.clone());
        let mut brain = Brain::new();

        tick(&mut brain, &mut h, 2);
        assert_eq!(mind.plans_requested(), 1);
        assert_eq!(brain.current().map(Action::label), Some("idle"));

        // idle runs 10s, then reflection and one follow-up plan
        tick(&mut brain, &mut h, 103);
        assert_eq!(mind.reflections(), 1);
        assert_eq!(mind.plans_requested(), 2);
        assert!(brain.current().is_none());
        assert_eq!(h.memory.reflections.len(), 1);

        // empty plan: next request only after the cooldown
        tick(&mut brain, &mut h, 50);
        assert_eq!(mind.plans_requested(), 2);
        tick(&mut brain, &mut h, 51);
        assert_eq!(mind.plans_requested(), 3);
    }

    #[test]
    fn nothing_runs_while_a_completion_is_in_flight() {
        let mind = ScriptedMind::new(&[]);
        let mut h = Harness::with_mind(ScriptedLlm::default().into(), mind.clone());
        let mut brain = Brain::new();
        brain.enqueue(Action::idle(IdleActivity::Rest));
        brain.enqueue(Action::idle(IdleActivity::Read));

        mind.hold.store(true, Ordering::SeqCst);
        tick(&mut brain, &mut h, 102);
        assert!(brain.is_busy());
        assert!(brain.is_planning());

        tick(&mut brain, &mut h, 50);
        assert_eq!(mind.plans_requested(), 1);
        assert!(brain.current().map_or(false, Action::is_completed));
        assert_eq!(labels(&brain), vec!["idle"]);

        mind.hold.store(false, Ordering::SeqCst);
        tick(&mut brain, &mut h, 1);
        assert!(!brain.is_busy());
        assert!(brain.current().is_none());
        assert!(brain.queue().is_empty());
    }

    #[test]
    fn preempted_action_goes_back_to_the_front() {
        let mind = ScriptedMind::new(&[]);
        let mut h = Harness::with_mind(ScriptedLlm::default().into(), mind.clone());
        let mut brain = Brain::new();
        brain.enqueue(Action::idle(IdleActivity::Read));
        brain.enqueue(Action::vote());
        tick(&mut brain, &mut h, 21);

        brain.interrupt_and_execute(Action::move_to(MoveTarget::place("Town Square")), &mut h.env());
        assert_eq!(brain.current().map(Action::label), Some("move"));
        assert_eq!(labels(&brain), vec!["idle", "vote"]);
        assert_eq!(brain.queue()[0].phase(), Phase::Interrupted);

        tick(&mut brain, &mut h, 1);
        let digests = mind.digests.lock().unwrap();
        assert_eq!(digests.len(), 1);
        assert!(matches!(
            &digests[0],
            ActionDigest::Idle { interrupted: true, duration, .. } if *duration == Duration::from_millis(2000)
        ));
    }

    #[test]
    fn direct_message_starts_one_talk_and_later_messages_join_it() {
        let mind = ScriptedMind::new(&[]);
        let mut h = Harness::with_mind(ScriptedLlm::default().into(), mind);
        h.add_player("Bob", GridPosition::new(3, 2));
        let mut brain = Brain::new();
        brain.enqueue(Action::idle(IdleActivity::Rest));
        tick(&mut brain, &mut h, 1);

        brain.on_direct_message(ChatMessage::new("Bob", "Ann", "Hi"), &mut h.env());
        brain.on_direct_message(ChatMessage::new("Bob", "Ann", "Got a minute?"), &mut h.env());

        assert!(brain.current().map_or(false, |a| a.talks_with("Bob")));
        assert_eq!(labels(&brain), vec!["idle"]);
        let thread = h.memory.conversations.latest_thread("Bob").unwrap();
        assert_eq!(thread.messages.len(), 2);
    }

    #[test]
    fn late_completion_leaves_the_new_action_alone() {
        let mind = ScriptedMind::new(&[]);
        let mut h = Harness::with_mind(ScriptedLlm::default().into(), mind.clone());
        h.add_player("Bob", GridPosition::new(3, 2));
        let mut brain = Brain::new();
        brain.enqueue(Action::idle(IdleActivity::Rest));

        mind.hold.store(true, Ordering::SeqCst);
        tick(&mut brain, &mut h, 102);
        assert!(brain.is_planning());

        brain.on_direct_message(ChatMessage::new("Bob", "Ann", "Hello?"), &mut h.env());
        mind.hold.store(false, Ordering::SeqCst);
        tick(&mut brain, &mut h, 1);

        assert!(!brain.is_busy());
        assert!(brain.current().map_or(false, |a| a.talks_with("Bob")));
    }

    #[test]
    fn overflowing_reflections_are_compacted_once() {
        let mind = ScriptedMind::new(&[]);
        let mut h = Harness::with_mind(ScriptedLlm::default().into(), mind.clone());
        for i in 0..10 {
            h.memory.reflections.push(format!("earlier {}", i));
        }
        let mut brain = Brain::new();
        brain.enqueue(Action::idle(IdleActivity::Rest));
        tick(&mut brain, &mut h, 105);

        assert_eq!(mind.summaries.load(Ordering::SeqCst), 1);
        assert_eq!(h.memory.reflections.entries(), ["summary of my day".to_string()]);
        assert_eq!(mind.plans_requested(), 1);
    }

    #[test]
    fn reflections_landing_during_compaction_survive_it() {
        let mind = ScriptedMind::new(&[]);
        let mut h = Harness::with_mind(ScriptedLlm::default().into(), mind.clone());
        for i in 0..10 {
            h.memory.reflections.push(format!("earlier {}", i));
        }
        let mut brain = Brain::new();
        brain.enqueue(Action::idle(IdleActivity::Rest));

        mind.hold_summary.store(true, Ordering::SeqCst);
        tick(&mut brain, &mut h, 105);
        assert!(brain.is_busy());
        assert_eq!(mind.summaries.load(Ordering::SeqCst), 1);
        assert_eq!(h.memory.reflections.len(), 11);

        brain.interrupt_and_execute(Action::idle(IdleActivity::Read), &mut h.env());
        brain.interrupt_and_execute(Action::move_to(MoveTarget::place("Town Square")), &mut h.env());
        tick(&mut brain, &mut h, 1);
        assert_eq!(h.memory.reflections.len(), 12);

        mind.hold_summary.store(false, Ordering::SeqCst);
        tick(&mut brain, &mut h, 1);
        let entries = h.memory.reflections.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], "summary of my day");
        assert!(entries[1].starts_with("reflection on Idle"));
        assert_eq!(mind.summaries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn replanning_away_a_started_broadcast_reports_it_finished() {
        let mind = ScriptedMind::new(&[r#"[{"type": "idle", "activityType": "read"}]"#]);
        let mut h = Harness::with_mind(ScriptedLlm::text(&["One. Two."]), mind);
        let mut brain = Brain::new();
        brain.enqueue(Action::broadcast("Town Square"));
        tick(&mut brain, &mut h, 2);
        assert_eq!(brain.current().map(Action::label), Some("broadcast"));

        brain.interrupt_and_execute(Action::idle(IdleActivity::Rest), &mut h.env());
        assert_eq!(labels(&brain), vec!["broadcast"]);

        let mut events = Vec::new();
        for _ in 0..110 {
            brain.update(FRAME, &mut h.env());
            events.extend(h.flush());
        }
        assert!(brain.queue().is_empty());
        assert!(matches!(brain.current(), Some(a) if a.label() == "idle" && !a.is_completed()));
        let finished = NewsItem::broadcast_finished("Ann", "Town Square").kind;
        let reported = events
            .iter()
            .filter(|e| matches!(e, Outbound::SendNews(news) if news.kind == finished))
            .count();
        assert_eq!(reported, 1);
        assert!(!events.iter().any(|e| matches!(e, Outbound::Broadcast(_))));
    }

    #[test]
    fn goodbye_after_a_closed_conversation_opens_no_thread() {
        let mut h = Harness::new(ScriptedLlm::default().into());
        h.memory.conversations.add_message("Bob", ChatMessage::new("Bob", "Ann", "See you"));
        h.memory.conversations.close_thread("Bob").unwrap();
        let mut brain = Brain::new();

        brain.on_end_conversation(ChatMessage::new("Bob", "Ann", "Bye!"), &mut h.env());

        let conversations = &h.memory.conversations;
        assert_eq!(conversations.thread_count("Bob"), 1);
        let thread = conversations.latest_thread("Bob").unwrap();
        assert!(thread.finished);
        assert_eq!(thread.messages.len(), 1);
    }

    #[test]
    fn plans_are_expanded_with_lead_moves() {
        let mut h = Harness::new(ScriptedLlm::default().into());
        let plan: Vec<Action> = serde_json::from_str(
            r#"[
                {"type": "talk", "name": "Bob"},
                {"type": "broadcast", "targetPlace": "Town Square"},
                {"type": "listen", "targetPlace": "Town Square"},
                {"type": "vote"},
                {"type": "idle", "activityType": "rest"}
            ]"#,
        )
        .unwrap();
        let queue = expand_plan(plan, &mut h.env());

        let kinds: Vec<&str> = queue.iter().map(Action::label).collect();
        assert_eq!(
            kinds,
            vec!["move", "talk", "move", "broadcast", "move", "listen", "move", "vote", "idle"]
        );
        assert!(queue[0].is_approach());
        assert!(queue.iter().filter(|a| a.label() == "move").all(|a| !a.should_reflect));
        match &queue[6].kind {
            ActionKind::Move(m) => assert_eq!(m.target, MoveTarget::place("Town Hall")),
            other => panic!("expected move, got {:?}", other),
        }

        // announced once, however often it is planned
        let again: Vec<Action> =
            serde_json::from_str(r#"[{"type": "broadcast", "targetPlace": "Town Square"}]"#).unwrap();
        expand_plan(again, &mut h.env());
        let news = h.flush().into_iter().filter(|e| matches!(e, Outbound::SendNews(_))).count();
        assert_eq!(news, 1);
    }

    #[test]
    fn broadcasts_lead_to_the_podium_when_there_is_one() {
        let mut h = Harness::new(ScriptedLlm::default().into());
        let mut map = h.world.map().clone();
        map.places.push(Place::new("Town Square (podium)", 192.0, 160.0, 32.0, 32.0));
        h.world = Registry::new(Arc::new(map));

        let queue = expand_plan(vec![Action::broadcast("Town Square")], &mut h.env());
        match &queue[0].kind {
            ActionKind::Move(m) => assert_eq!(m.target, MoveTarget::place("Town Square (podium)")),
            other => panic!("expected move, got {:?}", other),
        }
    }
}
