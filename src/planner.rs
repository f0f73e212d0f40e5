use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::action::{Action, ActionKind};
use crate::error::{PlanValidationError, PlanningError};
use crate::llm::{AiMessage, ChatRequest, SharedLlm};
use crate::parser;
use crate::prompts::PromptBuilder;
use crate::traits::{ActionDigest, BrainDump, Planner, Reflector};
use crate::types::MoveTarget;

#[derive(Debug, Deserialize)]
struct PlanResponse {
    plan: Vec<Action>,
}

/// Check a generated plan against what the agent knows about the world.
/// Returns the first problem found.
pub fn validate_plan(plan: &[Action], dump: &BrainDump) -> Result<(), PlanValidationError> {
    let unknown_place = |action: &'static str, place: &str| PlanValidationError::UnknownPlace {
        action,
        place: place.to_string(),
        known: dump.places.clone(),
    };
    let unknown_person = |action: &'static str, name: &str| PlanValidationError::UnknownPerson {
        action,
        name: name.to_string(),
        known: dump.other_players.clone(),
    };

    for action in plan {
        match &action.kind {
            ActionKind::Move(m) => match &m.target {
                MoveTarget::Place { name } if !dump.knows_place(name) => {
                    return Err(unknown_place("move", name));
                }
                MoveTarget::Person { name } if !dump.knows_player(name) => {
                    return Err(unknown_person("move", name));
                }
                _ => {}
            },
            ActionKind::Talk(t) if !dump.knows_player(&t.name) => {
                return Err(unknown_person("talk", &t.name));
            }
            ActionKind::Broadcast(b) => {
                if !dump.knows_place(&b.place) {
                    return Err(unknown_place("broadcast", &b.place));
                }
                if let Some(speaker) = dump.speakers_at(&b.place).find(|s| *s != dump.name) {
                    return Err(PlanValidationError::PlaceTaken {
                        place: b.place.clone(),
                        speaker: speaker.to_string(),
                    });
                }
            }
            ActionKind::Listen(l) => {
                if !dump.knows_place(&l.place) {
                    return Err(unknown_place("listen", &l.place));
                }
                if dump.speakers_at(&l.place).next().is_none() {
                    return Err(PlanValidationError::NothingToListenTo {
                        place: l.place.clone(),
                    });
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Planner and reflector backed by a chat-completion client
pub struct OraclePlanner {
    llm: SharedLlm,
    prompts: Arc<PromptBuilder>,
    attempts: usize,
}

impl OraclePlanner {
    pub fn new(llm: SharedLlm, prompts: Arc<PromptBuilder>, attempts: usize) -> Self {
        Self {
            llm,
            prompts,
            attempts: attempts.max(1),
        }
    }

    async fn text(&self, request: ChatRequest) -> Result<String> {
        self.llm.complete(request).await?.into_text()
    }
}

#[async_trait]
impl Planner for OraclePlanner {
    async fn plan(&self, dump: BrainDump) -> Result<Vec<Action>> {
        let mut messages = vec![AiMessage::system(self.prompts.planning(&dump))];
        let mut last_invalid = None;
        let mut last_unparseable = None;

        for attempt in 1..=self.attempts {
            let request = ChatRequest {
                messages: messages.clone(),
                json: true,
                ..ChatRequest::default()
            };
            let response = self.text(request).await?;
            let plan = match parser::parse_json::<PlanResponse>(&response) {
                Ok(parsed) => parsed.plan,
                Err(e) => {
                    log::warn!("({}) unparseable plan on attempt {}: {:#}", dump.name, attempt, e);
                    messages.push(AiMessage::system(format!(
                        "Your last answer was not a valid plan object: {}",
                        e
                    )));
                    last_unparseable = Some(e.to_string());
                    continue;
                }
            };
            match validate_plan(&plan, &dump) {
                Ok(()) => {
                    log::info!("📝 ({}) new plan with {} action(s)", dump.name, plan.len());
                    return Ok(plan);
                }
                Err(problem) => {
                    log::error!("({}) invalid plan, retrying: {}", dump.name, problem);
                    messages.push(AiMessage::system(problem.to_string()));
                    last_invalid = Some(problem);
                    last_unparseable = None;
                }
            }
        }

        let error = match (last_invalid, last_unparseable) {
            (_, Some(raw)) => PlanningError::Unparseable(raw),
            (Some(last), None) => PlanningError::Exhausted {
                attempts: self.attempts,
                last,
            },
            (None, None) => PlanningError::Unparseable("no response".to_string()),
        };
        Err(error.into())
    }
}

#[async_trait]
impl Reflector for OraclePlanner {
    async fn reflect(&self, dump: BrainDump, digest: ActionDigest) -> Result<String> {
        let reflection = match digest {
            ActionDigest::Idle {
                activity,
                duration,
                interrupted,
            } => {
                if interrupted {
                    format!("I was {}, but got interrupted.", activity)
                } else {
                    format!("I completed {} for {} seconds", activity, duration.as_secs())
                }
            }
            ActionDigest::Move {
                destination,
                interrupted,
                gave_up,
            } => {
                if gave_up {
                    format!("I was moving to {} but gave up because the way was blocked.", destination)
                } else if interrupted {
                    format!("I was moving to {} but got interrupted.", destination)
                } else {
                    format!("I moved to {}", destination)
                }
            }
            ActionDigest::Talk {
                counterpart,
                transcript,
                interrupted,
            } => {
                let request = ChatRequest::new(self.prompts.summarize_conversation(&dump))
                    .with_messages([AiMessage::user(transcript)]);
                let summary = self.text(request).await?;
                if interrupted {
                    format!(
                        "I was talking to {} but got interrupted. Summary of the conversation: {}",
                        counterpart, summary
                    )
                } else {
                    format!("I talked with {}, summary of the conversation: {}", counterpart, summary)
                }
            }
            ActionDigest::Broadcast {
                content,
                interrupted,
            } => {
                let request = ChatRequest::new(self.prompts.summarize_broadcast(&dump, &content));
                let summary = self.text(request).await?;
                if interrupted {
                    format!("I was giving a speech but got interrupted. I managed to broadcast: {}", summary)
                } else {
                    format!("I gave a speech, talked about: {}", summary)
                }
            }
            ActionDigest::Listen { heard, interrupted } => {
                let request = ChatRequest::new(self.prompts.summarize_speech(&dump, &heard));
                let summary = self.text(request).await?;
                if interrupted {
                    format!("I was listening to a speech. Summary of what I heard: {}", summary)
                } else {
                    format!("I listened to the speech, quick summary: {}", summary)
                }
            }
            ActionDigest::Vote { candidate } => match candidate {
                Some(candidate) => format!("I voted for {} in the last voting round.", candidate),
                None => "I tried to vote in the last voting round but my ballot was not counted.".to_string(),
            },
        };
        log::debug!("🪞 ({}) {}", dump.name, reflection);
        Ok(reflection)
    }

    async fn summarize_reflections(&self, dump: BrainDump) -> Result<String> {
        let request = ChatRequest::new(self.prompts.summarize_reflections(&dump));
        self.text(request).await
    }
}
