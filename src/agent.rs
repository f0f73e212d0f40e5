use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;

use crate::action::AgentEnv;
use crate::brain::Brain;
use crate::config::Config;
use crate::events::{Inbound, Outbound, Outbox};
use crate::llm::SharedLlm;
use crate::memory::AgentMemory;
use crate::movement::MovementController;
use crate::planner::OraclePlanner;
use crate::prompts::{PromptBuilder, PromptLoader};
use crate::registry::Registry;
use crate::traits::{Planner, Reflector};
use crate::types::{PlayerData, PlayerId};

/// Shared collaborators every agent reaches through its context
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub llm: SharedLlm,
    pub prompts: Arc<PromptBuilder>,
    pub planner: Arc<dyn Planner>,
    pub reflector: Arc<dyn Reflector>,
}

impl Services {
    /// Oracle-backed planner and reflector on top of `llm`
    pub fn new(config: Config, llm: SharedLlm) -> Self {
        let prompts = Arc::new(PromptBuilder::new(PromptLoader::new(config.prompts_dir.clone())));
        let oracle = Arc::new(OraclePlanner::new(
            Arc::clone(&llm),
            Arc::clone(&prompts),
            config.plan_attempts,
        ));
        Self {
            config: Arc::new(config),
            llm,
            prompts,
            planner: oracle.clone(),
            reflector: oracle,
        }
    }

    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_reflector(mut self, reflector: Arc<dyn Reflector>) -> Self {
        self.reflector = reflector;
        self
    }
}

/// One non-player character: live player data plus everything it thinks with
#[derive(Debug)]
pub struct Agent {
    me: PlayerData,
    memory: AgentMemory,
    movement: MovementController,
    brain: Brain,
    outbox: Outbox,
    rng: StdRng,
}

impl Agent {
    pub fn new(me: PlayerData, backstory: impl Into<String>, config: &Config) -> Self {
        let seed = config.seed ^ fnv(me.id.as_str());
        Self {
            memory: AgentMemory::new(backstory, config.reflection_limit),
            movement: MovementController::new(config.movement_speed, config.blocked_give_up, config.arrival_epsilon),
            brain: Brain::new(),
            outbox: Outbox::new(),
            rng: StdRng::seed_from_u64(seed),
            me,
        }
    }

    pub fn id(&self) -> &PlayerId {
        &self.me.id
    }

    pub fn username(&self) -> &str {
        &self.me.username
    }

    pub fn player(&self) -> &PlayerData {
        &self.me
    }

    pub fn memory(&self) -> &AgentMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut AgentMemory {
        &mut self.memory
    }

    pub fn brain(&self) -> &Brain {
        &self.brain
    }

    pub fn brain_mut(&mut self) -> &mut Brain {
        &mut self.brain
    }

    pub fn movement(&self) -> &MovementController {
        &self.movement
    }

    pub fn tick(&mut self, dt: Duration, world: &Registry, services: &Services) {
        let mut env = AgentEnv {
            me: &mut self.me,
            memory: &mut self.memory,
            movement: &mut self.movement,
            world,
            out: &mut self.outbox,
            services,
            rng: &mut self.rng,
        };
        self.brain.update(dt, &mut env);
    }

    /// React to something the world delivered to this agent
    pub fn handle(&mut self, event: Inbound, world: &Registry, services: &Services) {
        let mut env = AgentEnv {
            me: &mut self.me,
            memory: &mut self.memory,
            movement: &mut self.movement,
            world,
            out: &mut self.outbox,
            services,
            rng: &mut self.rng,
        };
        match event {
            Inbound::NewMessage(message) => {
                if message.to != env.me.username {
                    return;
                }
                log::info!("💬 ({}) {} says: {}", env.me.username, message.from, message.message);
                self.brain.on_direct_message(message, &mut env);
            }
            Inbound::EndConversation(message) => {
                if message.to != env.me.username {
                    return;
                }
                self.brain.on_end_conversation(message, &mut env);
            }
            Inbound::ListenBroadcast(message) => self.brain.on_broadcast(&message, &mut env),
            Inbound::News(items) => {
                for item in &items {
                    env.memory.announcements.record(item);
                }
            }
            Inbound::OverhearMessage(message) => {
                log::debug!("({}) overheard {} -> {}: {}", env.me.username, message.from, message.to, message.message);
            }
            Inbound::ExistingPlayers(_)
            | Inbound::PlayerJoined(_)
            | Inbound::PlayerLeft { .. }
            | Inbound::PlayerDataChanged(_) => {}
        }
    }

    /// Take everything produced since the last call. Own player updates are
    /// applied to `me` on the way out.
    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        let events: Vec<Outbound> = self.outbox.drain().collect();
        for event in &events {
            if let Outbound::UpdatePlayerData(update) = event {
                self.me.apply(update);
            }
        }
        events
    }
}

/// Stable per-agent seed offset, so agents sharing a config do not share an rng stream
fn fnv(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}
