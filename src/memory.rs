use std::collections::HashMap;

use crate::conversation::ConversationMemory;
use crate::types::{NewsItem, NewsKind};

/// Everything an agent remembers between ticks
#[derive(Debug, Clone, Default)]
pub struct AgentMemory {
    pub backstory: String,
    pub conversations: ConversationMemory,
    pub reflections: ReflectionLog,
    pub announcements: BroadcastAnnouncements,
}

impl AgentMemory {
    pub fn new(backstory: impl Into<String>, reflection_limit: usize) -> Self {
        Self {
            backstory: backstory.into(),
            conversations: ConversationMemory::new(),
            reflections: ReflectionLog::new(reflection_limit),
            announcements: BroadcastAnnouncements::default(),
        }
    }
}

/// Natural-language summaries of finished actions, oldest first.
///
/// Bounded: once more than `limit` entries are held the owner must summarise
/// them and call `compact`, which collapses the log to a single entry.
#[derive(Debug, Clone)]
pub struct ReflectionLog {
    entries: Vec<String>,
    limit: usize,
}

impl Default for ReflectionLog {
    fn default() -> Self {
        Self::new(10)
    }
}

impl ReflectionLog {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit,
        }
    }

    /// Returns true when the log went over its limit
    pub fn push(&mut self, entry: impl Into<String>) -> bool {
        self.entries.push(entry.into());
        self.needs_compaction()
    }

    pub fn needs_compaction(&self) -> bool {
        self.entries.len() > self.limit
    }

    /// Replace the oldest `covered` entries with `summary`. Entries added
    /// after the summary was requested stay behind it.
    pub fn compact(&mut self, covered: usize, summary: impl Into<String>) {
        let covered = covered.min(self.entries.len());
        self.entries.splice(..covered, [summary.into()]);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnouncementState {
    Announced,
    Finished,
}

/// Broadcasts seen in the news, keyed by (place, speaker)
#[derive(Debug, Clone, Default)]
pub struct BroadcastAnnouncements {
    seen: HashMap<(String, String), AnnouncementState>,
}

impl BroadcastAnnouncements {
    /// Update from a news item; items that are not about broadcasts are ignored
    pub fn record(&mut self, item: &NewsItem) {
        let Some(place) = &item.place else {
            return;
        };
        match &item.kind {
            NewsKind::BroadcastAnnounced { speaker } => {
                self.seen
                    .insert((place.clone(), speaker.clone()), AnnouncementState::Announced);
            }
            NewsKind::BroadcastFinished { speaker } => {
                self.seen
                    .insert((place.clone(), speaker.clone()), AnnouncementState::Finished);
            }
            NewsKind::General | NewsKind::Vote { .. } => {}
        }
    }

    pub fn contains(&self, place: &str, speaker: &str) -> bool {
        self.seen
            .contains_key(&(place.to_string(), speaker.to_string()))
    }

    /// Whoever has an announced, unfinished broadcast at `place`
    pub fn active_speakers<'a>(&'a self, place: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.seen.iter().filter_map(move |((p, speaker), state)| {
            (p == place && *state == AnnouncementState::Announced).then_some(speaker.as_str())
        })
    }

    pub fn has_active(&self, place: &str) -> bool {
        self.active_speakers(place).next().is_some()
    }
}
