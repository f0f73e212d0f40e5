//! # Social Town
//!
//! Action scheduling engine for LLM-driven NPCs living in a real-time,
//! tile-based multiplayer town.
//!
//! ## Features
//!
//! - **Actions**: idle, move, talk, broadcast, listen and vote as one tagged union
//!   shared by the planner, the scheduler and observers
//! - **Brain**: per-agent FIFO scheduler with priority preemption, reflection
//!   after every action and a fresh plan after every reflection
//! - **Movement**: A* paths over the map grid, blocking detection with a
//!   give-up window, person-following moves
//! - **Conversations**: debounced replies, chunked speech, timeouts and
//!   oracle-driven conversation endings
//! - **World registry**: proximity overhearing, zone broadcasts, spawn
//!   placement, newspaper and vote rounds
//! - **LLM Integration**: OpenAI-compatible chat completions behind the
//!   `LlmClient` trait
//!
//! ## Example
//!
//! ```rust,no_run
//! use social_town::{Config, Engine, WorldMap, llm::OpenAiClient};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::from_file("town.json")?;
//! let map = WorldMap::from_file("map.json")?;
//! let llm = Arc::new(OpenAiClient::new(&config.llm));
//!
//! let mut engine = Engine::new(config, map, llm);
//! engine.spawn_agent("Ann", "A baker who knows everyone's business.")?;
//!
//! let (_commands, rx) = tokio::sync::mpsc::channel(64);
//! engine.run(rx).await?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod agent;
pub mod brain;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod events;
pub mod llm;
pub mod map;
pub mod memory;
pub mod movement;
pub mod parser;
pub mod pathfinding;
pub mod planner;
pub mod prompts;
pub mod registry;
pub mod traits;
pub mod types;

// Re-export main types for convenience
pub use action::{Action, ActionKind, Phase};
pub use agent::{Agent, Services};
pub use brain::Brain;
pub use config::{Config, LlmConfig};
pub use engine::{Command, Delivery, Engine};
pub use error::{ActionError, MovementError, PlanValidationError, PlanningError, ThreadStateError};
pub use events::{Inbound, Outbound};
pub use map::{Place, WorldMap};
pub use memory::AgentMemory;
pub use planner::OraclePlanner;
pub use registry::Registry;
pub use traits::{ActionDigest, BrainDump, Planner, Reflector};
pub use types::{
    BroadcastMessage, ChatMessage, IdleActivity, MoveTarget, NewsItem, PlayerData, PlayerId,
    PlayerUpdate, Position,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
