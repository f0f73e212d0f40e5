use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::agent::{Agent, Services};
use crate::config::Config;
use crate::events::{Inbound, Outbound};
use crate::llm::SharedLlm;
use crate::map::WorldMap;
use crate::registry::Registry;
use crate::types::{
    BroadcastMessage, ChatMessage, NewsItem, PlayerData, PlayerId, PlayerUpdate, Position,
    VoteCandidate,
};

/// An event addressed to a human player; the transport layer forwards it
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: PlayerId,
    pub event: Inbound,
}

/// External input to a running engine, serialised through one channel
#[derive(Debug)]
pub enum Command {
    Join { id: PlayerId, username: String },
    Leave(PlayerId),
    Update { id: PlayerId, update: PlayerUpdate },
    Message(ChatMessage),
    EndConversation(ChatMessage),
    Broadcast(BroadcastMessage),
    News(NewsItem),
    FinishVoting,
    Shutdown,
}

/// The world context: registry, agents and their shared services.
///
/// Everything runs on one logical thread. Each tick drives every agent once
/// and routes what it produced before moving to the next agent.
pub struct Engine {
    services: Services,
    registry: Registry,
    agents: Vec<Agent>,
    deliveries: Option<mpsc::UnboundedSender<Delivery>>,
    rng: StdRng,
}

impl Engine {
    pub fn new(config: Config, map: WorldMap, llm: SharedLlm) -> Self {
        Self::with_services(Services::new(config, llm), map)
    }

    pub fn with_services(services: Services, map: WorldMap) -> Self {
        let rng = StdRng::seed_from_u64(services.config.seed);
        Self {
            registry: Registry::new(Arc::new(map)),
            agents: Vec::new(),
            deliveries: None,
            rng,
            services,
        }
    }

    /// Events for human players. Only one subscriber; a new call replaces it.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Delivery> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.deliveries = Some(tx);
        rx
    }

    pub fn config(&self) -> &Config {
        &self.services.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent(&self, username: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.username() == username)
    }

    pub fn agent_mut(&mut self, username: &str) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|a| a.username() == username)
    }

    /// Add an agent at a free cell of the spawn place
    pub fn spawn_agent(&mut self, username: &str, backstory: &str) -> Result<PlayerId> {
        let position = self.registry.spawn_position(&mut self.rng)?;
        self.spawn_agent_at(username, backstory, position)
    }

    pub fn spawn_agent_at(&mut self, username: &str, backstory: &str, position: Position) -> Result<PlayerId> {
        if self.registry.find_by_username(username).is_some() {
            return Err(anyhow!("username {:?} is already taken", username));
        }
        let id = PlayerId::new(format!("npc-{}", username.to_lowercase().replace(' ', "-")));
        let me = PlayerData::new(id.clone(), username, true, position);
        log::info!("🧍 Spawning agent {} at ({:.0}, {:.0})", username, position.x, position.y);
        self.agents.push(Agent::new(me.clone(), backstory, &self.services.config));
        self.add_player(me);
        Ok(id)
    }

    /// Add a human player at a free cell of the spawn place
    pub fn join(&mut self, id: PlayerId, username: &str) -> Result<PlayerData> {
        let position = self.registry.spawn_position(&mut self.rng)?;
        self.join_at(id, username, position)
    }

    pub fn join_at(&mut self, id: PlayerId, username: &str, position: Position) -> Result<PlayerData> {
        if self.registry.contains(&id) {
            return Err(anyhow!("player {} is already connected", id));
        }
        let player = PlayerData::new(id.clone(), username, false, position);
        let existing: Vec<PlayerData> = self.registry.players().cloned().collect();
        self.add_player(player.clone());
        self.deliver_human(&id, Inbound::ExistingPlayers(existing));
        if !self.registry.newspaper().is_empty() {
            let news = self.registry.newspaper().to_vec();
            self.deliver_human(&id, Inbound::News(news));
        }
        log::info!("👋 {} joined", username);
        Ok(player)
    }

    /// Remove a player or agent; everyone else is told
    pub fn leave(&mut self, id: &PlayerId) -> Option<PlayerData> {
        let player = self.registry.remove(id)?;
        self.agents.retain(|a| a.id() != id);
        log::info!("👋 {} left", player.username);
        let event = Inbound::PlayerLeft {
            id: player.id.clone(),
            username: player.username.clone(),
        };
        let mut work = VecDeque::new();
        for other in self.player_ids() {
            self.deliver(&other, event.clone(), &mut work);
        }
        self.drain(work);
        Some(player)
    }

    /// Input from a human player, routed as if they had sent it themselves
    pub fn submit(&mut self, from: &PlayerId, event: Outbound) {
        if !self.registry.contains(from) {
            log::warn!("dropping event from unknown player {}", from);
            return;
        }
        let mut work = VecDeque::new();
        work.push_back((from.clone(), event));
        self.drain(work);
    }

    /// Post news on behalf of the room itself
    pub fn publish_news(&mut self, item: NewsItem) {
        let mut work = VecDeque::new();
        self.post_news(item, &mut work);
        self.drain(work);
    }

    pub fn finish_voting(&mut self) -> BTreeMap<VoteCandidate, usize> {
        self.registry.finish_voting()
    }

    /// Drive every agent once
    pub fn tick(&mut self, dt: Duration) {
        for index in 0..self.agents.len() {
            let produced = {
                let agent = &mut self.agents[index];
                agent.tick(dt, &self.registry, &self.services);
                let id = agent.id().clone();
                agent
                    .take_outbound()
                    .into_iter()
                    .map(|event| (id.clone(), event))
                    .collect::<VecDeque<_>>()
            };
            self.drain(produced);
        }
    }

    /// Tick at `tick_rate_hz` and apply commands until shutdown or the
    /// command channel closes
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> Result<()> {
        let mut interval = tokio::time::interval(self.services.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = Instant::now();
        log::info!("🚀 Engine running with {} agent(s)", self.agents.len());

        loop {
            tokio::select! {
                now = interval.tick() => {
                    let dt = now.saturating_duration_since(last);
                    last = now;
                    self.tick(dt);
                }
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.execute(command),
                }
            }
        }
        log::info!("🛑 Engine stopped");
        Ok(())
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Join { id, username } => {
                if let Err(e) = self.join(id, &username) {
                    log::error!("Failed to join {}: {:#}", username, e);
                }
            }
            Command::Leave(id) => {
                self.leave(&id);
            }
            Command::Update { id, update } => self.submit(&id, Outbound::UpdatePlayerData(update)),
            Command::Message(message) => self.submit_as(&message.from.clone(), Outbound::SendMessage(message)),
            Command::EndConversation(message) => {
                self.submit_as(&message.from.clone(), Outbound::EndConversation(message))
            }
            Command::Broadcast(message) => self.submit_as(&message.from.clone(), Outbound::Broadcast(message)),
            Command::News(item) => self.publish_news(item),
            Command::FinishVoting => {
                self.finish_voting();
            }
            Command::Shutdown => {}
        }
    }

    fn submit_as(&mut self, username: &str, event: Outbound) {
        match self.registry.find_by_username(username) {
            Some(player) => {
                let id = player.id.clone();
                self.submit(&id, event);
            }
            None => log::warn!("dropping event from unknown player {}", username),
        }
    }

    fn add_player(&mut self, player: PlayerData) {
        let id = player.id.clone();
        self.registry.insert(player.clone());
        let mut work = VecDeque::new();
        for other in self.player_ids() {
            if other != id {
                self.deliver(&other, Inbound::PlayerJoined(player.clone()), &mut work);
            }
        }
        self.drain(work);
    }

    fn player_ids(&self) -> Vec<PlayerId> {
        self.registry.players().map(|p| p.id.clone()).collect()
    }

    /// Route outbound events until nothing new is produced
    fn drain(&mut self, mut work: VecDeque<(PlayerId, Outbound)>) {
        while let Some((from, event)) = work.pop_front() {
            self.route(from, event, &mut work);
        }
    }

    fn route(&mut self, from: PlayerId, event: Outbound, work: &mut VecDeque<(PlayerId, Outbound)>) {
        match event {
            Outbound::UpdatePlayerData(update) => {
                let Some(player) = self.registry.apply_update(&from, &update).cloned() else {
                    return;
                };
                for other in self.player_ids() {
                    if other != from {
                        self.deliver(&other, Inbound::PlayerDataChanged(player.clone()), work);
                    }
                }
            }
            Outbound::SendMessage(message) => {
                let Some(to) = self.registry.find_by_username(&message.to).map(|p| p.id.clone()) else {
                    log::warn!("{} messaged unknown player {}", message.from, message.to);
                    return;
                };
                let range = self.services.config.interaction_range;
                let overhearers = self.registry.overhearers(&message, range);
                self.deliver(&to, Inbound::NewMessage(message.clone()), work);
                for id in overhearers {
                    self.deliver(&id, Inbound::OverhearMessage(message.clone()), work);
                }
            }
            Outbound::EndConversation(message) => {
                if let Some(to) = self.registry.find_by_username(&message.to).map(|p| p.id.clone()) {
                    self.deliver(&to, Inbound::EndConversation(message), work);
                }
            }
            Outbound::Broadcast(message) => {
                let listeners: Vec<PlayerId> = self
                    .registry
                    .in_place(&message.place)
                    .into_iter()
                    .filter(|p| p.id != from)
                    .map(|p| p.id.clone())
                    .collect();
                log::debug!("📢 {} -> {} listener(s) at {}", message.from, listeners.len(), message.place);
                for id in listeners {
                    self.deliver(&id, Inbound::ListenBroadcast(message.clone()), work);
                }
            }
            Outbound::Vote(candidate) => {
                if let Some(player) = self.registry.get(&from) {
                    let username = player.username.clone();
                    self.registry.record_vote(&username, candidate);
                }
            }
            Outbound::SendNews(item) => self.post_news(item, work),
            Outbound::Reflections(reflections) => self.registry.set_reflections(&from, reflections),
        }
    }

    fn post_news(&mut self, item: NewsItem, work: &mut VecDeque<(PlayerId, Outbound)>) {
        self.registry.add_news(item.clone());
        for id in self.player_ids() {
            self.deliver(&id, Inbound::News(vec![item.clone()]), work);
        }
    }

    /// Hand `event` to an agent, or to the human delivery channel
    fn deliver(&mut self, to: &PlayerId, event: Inbound, work: &mut VecDeque<(PlayerId, Outbound)>) {
        let Some(index) = self.agents.iter().position(|a| a.id() == to) else {
            self.deliver_human(to, event);
            return;
        };
        let agent = &mut self.agents[index];
        agent.handle(event, &self.registry, &self.services);
        let id = agent.id().clone();
        work.extend(agent.take_outbound().into_iter().map(|e| (id.clone(), e)));
    }

    fn deliver_human(&self, to: &PlayerId, event: Inbound) {
        if let Some(tx) = &self.deliveries {
            if tx
                .send(Delivery {
                    to: to.clone(),
                    event,
                })
                .is_err()
            {
                log::debug!("delivery channel closed, dropping event for {}", to);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatRequest, Completion, LlmClient};
    use crate::map::Place;
    use async_trait::async_trait;

    struct Silent;

    #[async_trait]
    impl LlmClient for Silent {
        async fn complete(&self, _request: ChatRequest) -> Result<Completion> {
            Ok(Completion::Text(r#"{"plan": []}"#.to_string()))
        }
    }

    fn engine() -> Engine {
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
        Engine::new(Config::default(), map, Arc::new(Silent))
    }

    #[test]
    fn humans_get_a_snapshot_and_join_events() {
        let mut engine = engine();
        let mut rx = engine.subscribe();
        engine.spawn_agent("Ann", "A baker.").unwrap();
        engine.join(PlayerId::new("h1"), "harry").unwrap();
        engine.join(PlayerId::new("h2"), "hermione").unwrap();

        let mut events = Vec::new();
        while let Ok(delivery) = rx.try_recv() {
            events.push(delivery);
        }
        match &events[0] {
            Delivery {
                to,
                event: Inbound::ExistingPlayers(players),
            } => {
                assert_eq!(to, &PlayerId::new("h1"));
                assert_eq!(players.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(events.iter().any(|d| d.to == PlayerId::new("h1")
            && matches!(&d.event, Inbound::PlayerJoined(p) if p.username == "hermione")));
        assert!(engine.registry().get(&PlayerId::new("h1")).is_some());
    }

    #[test]
    fn broadcasts_reach_only_the_zone() {
        let mut engine = engine();
        let mut rx = engine.subscribe();
        engine.join_at(PlayerId::new("h1"), "speaker", Position::new(200.0, 200.0)).unwrap();
        engine.join_at(PlayerId::new("h2"), "near", Position::new(210.0, 210.0)).unwrap();
        engine.join_at(PlayerId::new("h3"), "far", Position::new(20.0, 20.0)).unwrap();
        while rx.try_recv().is_ok() {}

        engine.submit(
            &PlayerId::new("h1"),
            Outbound::Broadcast(BroadcastMessage::new("speaker", "Town Square", "Hello town!")),
        );
        let heard: Vec<PlayerId> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|d| matches!(d.event, Inbound::ListenBroadcast(_)))
            .map(|d| d.to)
            .collect();
        assert_eq!(heard, vec![PlayerId::new("h2")]);
    }

    #[test]
    fn direct_messages_are_overheard_nearby() {
        let mut engine = engine();
        let mut rx = engine.subscribe();
        engine.join_at(PlayerId::new("h1"), "a", Position::new(100.0, 100.0)).unwrap();
        engine.join_at(PlayerId::new("h2"), "b", Position::new(120.0, 100.0)).unwrap();
        engine.join_at(PlayerId::new("h3"), "c", Position::new(110.0, 110.0)).unwrap();
        engine.join_at(PlayerId::new("h4"), "d", Position::new(300.0, 300.0)).unwrap();
        while rx.try_recv().is_ok() {}

        engine.submit(&PlayerId::new("h1"), Outbound::SendMessage(ChatMessage::new("a", "b", "psst")));
        let deliveries: Vec<Delivery> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(deliveries.len(), 2);
        assert!(matches!(&deliveries[0], Delivery { to, event: Inbound::NewMessage(_) } if to == &PlayerId::new("h2")));
        assert!(matches!(&deliveries[1], Delivery { to, event: Inbound::OverhearMessage(_) } if to == &PlayerId::new("h3")));
    }

    #[test]
    fn leaving_removes_the_agent_and_tells_others() {
        let mut engine = engine();
        let mut rx = engine.subscribe();
        let ann = engine.spawn_agent("Ann", "A baker.").unwrap();
        engine.join(PlayerId::new("h1"), "harry").unwrap();
        while rx.try_recv().is_ok() {}

        assert!(engine.leave(&ann).is_some());
        assert!(engine.agent("Ann").is_none());
        let delivery = rx.try_recv().unwrap();
        assert!(matches!(delivery.event, Inbound::PlayerLeft { ref username, .. } if username == "Ann"));
        assert!(engine.leave(&ann).is_none());
    }
}
