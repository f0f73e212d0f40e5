use std::collections::HashMap;

use crate::error::ThreadStateError;
use crate::llm::AiMessage;
use crate::types::ChatMessage;

/// One conversation session with a single counterpart
#[derive(Debug, Clone, Default)]
pub struct Thread {
    pub messages: Vec<ChatMessage>,
    /// Transcript in model form, fed back on every reply
    pub ai_messages: Vec<AiMessage>,
    pub finished: bool,
}

impl Thread {
    /// Readable transcript from `me`'s point of view, used for summaries
    pub fn transcript(&self, me: &str) -> String {
        self.messages
            .iter()
            .map(|m| {
                if m.from == me {
                    format!("I said: {}", m.message)
                } else {
                    format!("{} said: {}", m.from, m.message)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// All of an agent's conversation threads, keyed by counterpart username.
///
/// At most one thread per counterpart is unfinished: once the newest thread
/// is closed, the next message opens a fresh one.
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    threads: HashMap<String, Vec<Thread>>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The newest unfinished thread, created if needed
    pub fn get_newest_active_thread(&mut self, counterpart: &str) -> &mut Thread {
        let threads = self.threads.entry(counterpart.to_string()).or_default();
        if threads.last().map_or(true, |thread| thread.finished) {
            threads.push(Thread::default());
        }
        // just pushed if it was missing
        let last = threads.len() - 1;
        &mut threads[last]
    }

    pub fn latest_thread(&self, counterpart: &str) -> Option<&Thread> {
        self.threads.get(counterpart).and_then(|threads| threads.last())
    }

    pub fn is_latest_thread_active(&self, counterpart: &str) -> bool {
        self.latest_thread(counterpart)
            .map_or(false, |thread| !thread.finished)
    }

    pub fn add_message(&mut self, counterpart: &str, message: ChatMessage) {
        self.get_newest_active_thread(counterpart).messages.push(message);
    }

    pub fn add_ai_message(&mut self, counterpart: &str, message: AiMessage) {
        self.get_newest_active_thread(counterpart).ai_messages.push(message);
    }

    pub fn close_thread(&mut self, counterpart: &str) -> Result<(), ThreadStateError> {
        let thread = self
            .threads
            .get_mut(counterpart)
            .and_then(|threads| threads.last_mut())
            .ok_or_else(|| ThreadStateError::NoThread(counterpart.to_string()))?;
        if thread.finished {
            return Err(ThreadStateError::AlreadyFinished(counterpart.to_string()));
        }
        thread.finished = true;
        Ok(())
    }

    pub fn thread_count(&self, counterpart: &str) -> usize {
        self.threads.get(counterpart).map_or(0, Vec::len)
    }
}
