use std::fs;
use std::path::{Path, PathBuf};

use super::templates::{
    BROADCAST_DEFAULT, CONTINUE_CONVERSATION_DEFAULT, PLANNING_DEFAULT,
    START_CONVERSATION_DEFAULT, SUMMARIZE_BROADCAST_DEFAULT, SUMMARIZE_CONVERSATION_DEFAULT,
    SUMMARIZE_REFLECTIONS_DEFAULT, SUMMARIZE_SPEECH_DEFAULT, VOTE_DEFAULT,
};

/// Which prompt to load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Planning,
    StartConversation,
    ContinueConversation,
    Broadcast,
    Vote,
    SummarizeConversation,
    SummarizeBroadcast,
    SummarizeSpeech,
    SummarizeReflections,
}

impl PromptKind {
    pub fn file_stem(&self) -> &'static str {
        match self {
            PromptKind::Planning => "planning",
            PromptKind::StartConversation => "start_conversation",
            PromptKind::ContinueConversation => "continue_conversation",
            PromptKind::Broadcast => "broadcast",
            PromptKind::Vote => "vote",
            PromptKind::SummarizeConversation => "summarize_conversation",
            PromptKind::SummarizeBroadcast => "summarize_broadcast",
            PromptKind::SummarizeSpeech => "summarize_speech",
            PromptKind::SummarizeReflections => "summarize_reflections",
        }
    }

    fn default_text(&self) -> &'static str {
        match self {
            PromptKind::Planning => PLANNING_DEFAULT,
            PromptKind::StartConversation => START_CONVERSATION_DEFAULT,
            PromptKind::ContinueConversation => CONTINUE_CONVERSATION_DEFAULT,
            PromptKind::Broadcast => BROADCAST_DEFAULT,
            PromptKind::Vote => VOTE_DEFAULT,
            PromptKind::SummarizeConversation => SUMMARIZE_CONVERSATION_DEFAULT,
            PromptKind::SummarizeBroadcast => SUMMARIZE_BROADCAST_DEFAULT,
            PromptKind::SummarizeSpeech => SUMMARIZE_SPEECH_DEFAULT,
            PromptKind::SummarizeReflections => SUMMARIZE_REFLECTIONS_DEFAULT,
        }
    }
}

/// Loads prompt templates from the filesystem with fallback to defaults
#[derive(Debug, Clone, Default)]
pub struct PromptLoader {
    prompts_dir: Option<PathBuf>,
}

impl PromptLoader {
    pub fn new(prompts_dir: Option<PathBuf>) -> Self {
        Self { prompts_dir }
    }

    pub fn from_dir(prompts_dir: impl AsRef<Path>) -> Self {
        Self::new(Some(prompts_dir.as_ref().to_path_buf()))
    }

    /// `<prompts_dir>/<kind>.txt` if it exists and is readable, else the built-in text
    pub fn load(&self, kind: PromptKind) -> String {
        if let Some(dir) = &self.prompts_dir {
            let path = dir.join(format!("{}.txt", kind.file_stem()));
            if path.exists() {
                match fs::read_to_string(&path) {
                    Ok(text) => {
                        log::debug!("Loading {} prompt from: {:?}", kind.file_stem(), path);
                        return text;
                    }
                    Err(e) => log::warn!("Failed to read prompt {:?}: {}", path, e),
                }
            }
        }
        kind.default_text().to_string()
    }
}
