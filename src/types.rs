use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection-level identity of a player or agent in the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A point in world (pixel) space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// A cell of the tile grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: i32,
    pub y: i32,
}

impl GridPosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// North, east, south, west neighbours in that order
    pub fn neighbours(&self) -> [GridPosition; 4] {
        [
            GridPosition::new(self.x, self.y - 1),
            GridPosition::new(self.x + 1, self.y),
            GridPosition::new(self.x, self.y + 1),
            GridPosition::new(self.x - 1, self.y),
        ]
    }
}

/// Facing used in animation tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Up,
    #[default]
    Down,
}

impl Direction {
    /// Dominant axis of the delta wins; ties resolve vertically
    pub fn from_delta(dx: f64, dy: f64) -> Self {
        if dx.abs() > dy.abs() {
            if dx > 0.0 {
                Direction::Right
            } else {
                Direction::Left
            }
        } else if dy > 0.0 {
            Direction::Down
        } else {
            Direction::Up
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

/// Builds the `<username>-<walk|idle>-<direction>` animation tag
pub fn animation_tag(username: &str, walking: bool, direction: Direction) -> String {
    let mode = if walking { "walk" } else { "idle" };
    format!("{}-{}-{}", username, mode, direction.as_str())
}

/// Live state of a connected player or agent, as held by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerData {
    pub id: PlayerId,
    pub username: String,
    pub is_npc: bool,
    pub x: f64,
    pub y: f64,
    pub animation: String,
    /// Wire form of the action currently shown above the player
    pub action: Option<serde_json::Value>,
}

impl PlayerData {
    pub fn new(id: PlayerId, username: impl Into<String>, is_npc: bool, position: Position) -> Self {
        let username = username.into();
        Self {
            animation: animation_tag(&username, false, Direction::Down),
            id,
            username,
            is_npc,
            x: position.x,
            y: position.y,
            action: None,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }

    pub fn apply(&mut self, update: &PlayerUpdate) {
        if let Some(x) = update.x {
            self.x = x;
        }
        if let Some(y) = update.y {
            self.y = y;
        }
        if let Some(animation) = &update.animation {
            self.animation = animation.clone();
        }
        if let Some(action) = &update.action {
            self.action = Some(action.clone());
        }
    }
}

/// Partial update of a player's visible state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<serde_json::Value>,
}

impl PlayerUpdate {
    pub fn animation(animation: impl Into<String>) -> Self {
        Self {
            animation: Some(animation.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.animation.is_none() && self.action.is_none()
    }
}

/// A direct message between two players
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub from: String,
    pub to: String,
    pub message: String,
    pub date: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(from: impl Into<String>, to: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            message: message.into(),
            date: Utc::now(),
        }
    }
}

/// One chunk of a speech given at a place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub from: String,
    pub place: String,
    pub message: String,
    pub date: DateTime<Utc>,
}

impl BroadcastMessage {
    pub fn new(from: impl Into<String>, place: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            place: place.into(),
            message: message.into(),
            date: Utc::now(),
        }
    }
}

/// What a news item is about; structured so agents can react without parsing text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NewsKind {
    General,
    BroadcastAnnounced { speaker: String },
    BroadcastFinished { speaker: String },
    Vote { voter: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub date: DateTime<Utc>,
    pub message: String,
    pub place: Option<String>,
    #[serde(flatten)]
    pub kind: NewsKind,
}

impl NewsItem {
    pub fn new(message: impl Into<String>, place: Option<String>, kind: NewsKind) -> Self {
        Self {
            date: Utc::now(),
            message: message.into(),
            place,
            kind,
        }
    }

    pub fn broadcast_announced(speaker: &str, place: &str) -> Self {
        Self::new(
            format!("📢 {} will be broadcasting soon", speaker),
            Some(place.to_string()),
            NewsKind::BroadcastAnnounced {
                speaker: speaker.to_string(),
            },
        )
    }

    pub fn broadcast_finished(speaker: &str, place: &str) -> Self {
        Self::new(
            format!("📢 {} has finished broadcasting", speaker),
            Some(place.to_string()),
            NewsKind::BroadcastFinished {
                speaker: speaker.to_string(),
            },
        )
    }

    /// One line for the brain dump
    pub fn headline(&self) -> String {
        match &self.place {
            Some(place) => format!("{}: {} at {}", self.date.to_rfc3339(), self.message, place),
            None => format!("{}: {}", self.date.to_rfc3339(), self.message),
        }
    }
}

/// What an idle action looks like to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleActivity {
    Read,
    #[default]
    Rest,
}

impl IdleActivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdleActivity::Read => "read",
            IdleActivity::Rest => "rest",
        }
    }
}

/// Destination of a move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "targetType", rename_all = "lowercase")]
pub enum MoveTarget {
    Coordinates { x: f64, y: f64 },
    Person { name: String },
    Place { name: String },
}

impl MoveTarget {
    pub fn person(name: impl Into<String>) -> Self {
        MoveTarget::Person { name: name.into() }
    }

    pub fn place(name: impl Into<String>) -> Self {
        MoveTarget::Place { name: name.into() }
    }

    /// Name of the person being approached, if any
    pub fn person_name(&self) -> Option<&str> {
        match self {
            MoveTarget::Person { name } => Some(name),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            MoveTarget::Coordinates { x, y } => format!("coordinates {}, {}", x, y),
            MoveTarget::Person { name } | MoveTarget::Place { name } => name.clone(),
        }
    }
}

/// Candidate name drawn from the configured whitelist
pub type VoteCandidate = String;
