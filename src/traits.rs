use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::action::Action;
use crate::types::VoteCandidate;

/// Snapshot of what an agent knows, handed to every oracle prompt.
///
/// Owned so it can travel into a spawned request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrainDump {
    pub name: String,
    pub backstory: String,
    pub other_players: Vec<String>,
    pub places: Vec<String>,
    pub newspaper: Vec<String>,
    pub reflections: Vec<String>,
    /// Wire form of each queued action, approach moves left out
    pub current_plan: Vec<String>,
    pub current_action: Option<String>,
    /// (place, speaker) of every broadcast announced and not yet finished
    pub active_broadcasts: Vec<(String, String)>,
}

impl BrainDump {
    pub fn knows_place(&self, place: &str) -> bool {
        self.places.iter().any(|p| p == place)
    }

    pub fn knows_player(&self, name: &str) -> bool {
        self.other_players.iter().any(|p| p == name)
    }

    pub fn speakers_at<'a>(&'a self, place: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.active_broadcasts
            .iter()
            .filter(move |(p, _)| p == place)
            .map(|(_, speaker)| speaker.as_str())
    }
}

/// What a finished or interrupted action leaves behind for reflection
#[derive(Debug, Clone, PartialEq)]
pub enum ActionDigest {
    Idle {
        activity: String,
        duration: Duration,
        interrupted: bool,
    },
    Move {
        destination: String,
        interrupted: bool,
        gave_up: bool,
    },
    Talk {
        counterpart: String,
        transcript: String,
        interrupted: bool,
    },
    Broadcast {
        content: String,
        interrupted: bool,
    },
    Listen {
        heard: String,
        interrupted: bool,
    },
    Vote {
        candidate: Option<VoteCandidate>,
    },
}

/// Turns an agent's state into a fresh, validated plan
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, dump: BrainDump) -> Result<Vec<Action>>;
}

/// Turns finished actions into first-person reflections
#[async_trait]
pub trait Reflector: Send + Sync {
    async fn reflect(&self, dump: BrainDump, digest: ActionDigest) -> Result<String>;

    /// Collapse the whole reflection log into one entry
    async fn summarize_reflections(&self, dump: BrainDump) -> Result<String>;
}
