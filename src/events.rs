use serde::{Deserialize, Serialize};

use crate::types::{
    BroadcastMessage, ChatMessage, NewsItem, PlayerData, PlayerId, PlayerUpdate, VoteCandidate,
};

/// Something a player (human or agent) receives from the world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Inbound {
    /// Everyone already present, sent once on join
    ExistingPlayers(Vec<PlayerData>),
    PlayerJoined(PlayerData),
    PlayerLeft { id: PlayerId, username: String },
    PlayerDataChanged(PlayerData),
    NewMessage(ChatMessage),
    EndConversation(ChatMessage),
    /// A direct message between two other players nearby
    OverhearMessage(ChatMessage),
    ListenBroadcast(BroadcastMessage),
    News(Vec<NewsItem>),
}

/// Something a player sends into the world. All sends are fire-and-forget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Outbound {
    UpdatePlayerData(PlayerUpdate),
    SendMessage(ChatMessage),
    EndConversation(ChatMessage),
    Broadcast(BroadcastMessage),
    Vote(VoteCandidate),
    SendNews(NewsItem),
    Reflections(Vec<String>),
}

/// Events an agent produced during one tick or one event handler, in order
#[derive(Debug, Default)]
pub struct Outbox {
    events: Vec<Outbound>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Outbound) {
        self.events.push(event);
    }

    /// Consecutive player updates are merged into one
    pub fn update_player(&mut self, update: PlayerUpdate) {
        if update.is_empty() {
            return;
        }
        if let Some(Outbound::UpdatePlayerData(last)) = self.events.last_mut() {
            if update.x.is_some() {
                last.x = update.x;
            }
            if update.y.is_some() {
                last.y = update.y;
            }
            if update.animation.is_some() {
                last.animation = update.animation;
            }
            if update.action.is_some() {
                last.action = update.action;
            }
            return;
        }
        self.events.push(Outbound::UpdatePlayerData(update));
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Outbound> {
        self.events.iter()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, Outbound> {
        self.events.drain(..)
    }
}
