use super::loader::{PromptKind, PromptLoader};
use crate::traits::BrainDump;

const SEPARATOR: &str = "\n\n---\n\n";

/// Builds system prompts for every oracle request from a `BrainDump`
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    loader: PromptLoader,
}

impl PromptBuilder {
    pub fn new(loader: PromptLoader) -> Self {
        Self { loader }
    }

    /// Prompt asking for a fresh `{"plan": [...]}`
    pub fn planning(&self, dump: &BrainDump) -> String {
        [
            self.loader.load(PromptKind::Planning),
            identity(dump),
            surroundings(dump),
            reflections(dump),
            plan(dump),
        ]
        .join(SEPARATOR)
    }

    pub fn start_conversation(&self, dump: &BrainDump, counterpart: &str) -> String {
        let base = self
            .loader
            .load(PromptKind::StartConversation)
            .replace("{{counterpart}}", counterpart);
        [base, identity(dump), reflections(dump), plan(dump)].join(SEPARATOR)
    }

    pub fn continue_conversation(&self, dump: &BrainDump, counterpart: &str) -> String {
        let base = self
            .loader
            .load(PromptKind::ContinueConversation)
            .replace("{{counterpart}}", counterpart);
        [base, identity(dump), reflections(dump), plan(dump)].join(SEPARATOR)
    }

    pub fn broadcast(&self, dump: &BrainDump, place: &str) -> String {
        let base = self.loader.load(PromptKind::Broadcast).replace("{{place}}", place);
        [base, identity(dump), surroundings(dump), reflections(dump)].join(SEPARATOR)
    }

    pub fn vote(&self, dump: &BrainDump, candidates: &[String]) -> String {
        let base = self
            .loader
            .load(PromptKind::Vote)
            .replace("{{candidates}}", &candidates.join(", "));
        [base, identity(dump), surroundings(dump), reflections(dump)].join(SEPARATOR)
    }

    /// System half of a conversation summary; the transcript goes in as a user message
    pub fn summarize_conversation(&self, dump: &BrainDump) -> String {
        [
            self.loader.load(PromptKind::SummarizeConversation),
            identity(dump),
        ]
        .join(SEPARATOR)
    }

    pub fn summarize_broadcast(&self, dump: &BrainDump, content: &str) -> String {
        [
            self.loader.load(PromptKind::SummarizeBroadcast),
            identity(dump),
            format!("## Your Speech\n\n{}", content),
        ]
        .join(SEPARATOR)
    }

    pub fn summarize_speech(&self, dump: &BrainDump, heard: &str) -> String {
        [
            self.loader.load(PromptKind::SummarizeSpeech),
            identity(dump),
            format!("## What You Heard\n\n{}", heard),
        ]
        .join(SEPARATOR)
    }

    pub fn summarize_reflections(&self, dump: &BrainDump) -> String {
        [
            self.loader.load(PromptKind::SummarizeReflections),
            identity(dump),
            reflections(dump),
        ]
        .join(SEPARATOR)
    }
}

fn identity(dump: &BrainDump) -> String {
    format!("## Who You Are\n\nYour name is {}.\n\n{}", dump.name, dump.backstory)
}

fn surroundings(dump: &BrainDump) -> String {
    let mut text = String::from("## Current Situation\n\n");
    if dump.other_players.is_empty() {
        text.push_str("No other players available\n");
    } else {
        text.push_str(&format!("Available players: {}\n", dump.other_players.join(", ")));
    }
    if dump.places.is_empty() {
        text.push_str("No places available\n");
    } else {
        text.push_str(&format!("Available places: {}\n", dump.places.join(", ")));
    }
    if !dump.active_broadcasts.is_empty() {
        text.push_str("\nAnnounced broadcasts:\n");
        for (place, speaker) in &dump.active_broadcasts {
            text.push_str(&format!("- {} at {}\n", speaker, place));
        }
    }
    if !dump.newspaper.is_empty() {
        text.push_str("\nNews:\n");
        for headline in &dump.newspaper {
            text.push_str(&format!("- {}\n", headline));
        }
    }
    text
}

fn reflections(dump: &BrainDump) -> String {
    if dump.reflections.is_empty() {
        return "## Reflections\n\nWe are just starting our day, no reflections".to_string();
    }
    format!("## Reflections\n\n{}", dump.reflections.join("\n"))
}

fn plan(dump: &BrainDump) -> String {
    let mut text = String::from("## Your Plan\n\n");
    if dump.current_plan.is_empty() {
        text.push_str("We don't have a plan yet\n");
    } else {
        text.push_str(&format!("Current plan is: [{}]\n", dump.current_plan.join(", ")));
    }
    match &dump.current_action {
        Some(action) => text.push_str(&format!("Current action: {}\n", action)),
        None => text.push_str("No current action\n"),
    }
    text
}
