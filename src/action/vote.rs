use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ActionContext, Progress};
use crate::events::Outbound;
use crate::llm::{ChatRequest, OracleCall};
use crate::parser::parse_json;
use crate::types::{NewsItem, NewsKind};

#[derive(Debug, Deserialize)]
struct Ballot {
    candidate: String,
}

/// Cast one vote for a whitelisted candidate
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VoteAction {
    #[serde(skip)]
    call: Option<OracleCall<String>>,
    #[serde(skip)]
    chosen: Option<String>,
}

impl VoteAction {
    pub fn chosen(&self) -> Option<&str> {
        self.chosen.as_deref()
    }

    pub(super) fn start(&mut self, ctx: &mut ActionContext<'_>) -> Progress {
        let dump = ctx.brain_dump(Some("voting".to_string()));
        let system = ctx
            .services
            .prompts
            .vote(&dump, &ctx.config().vote_candidates);
        self.call = Some(ctx.ask_text(ChatRequest::new(system).expect_json()));
        Progress::Running
    }

    pub(super) fn update(&mut self, _dt: Duration, ctx: &mut ActionContext<'_>) -> Progress {
        let Some(call) = self.call.as_mut() else {
            return Progress::Completed;
        };
        let Some(result) = call.poll_ready() else {
            return Progress::Running;
        };
        self.call = None;

        match result.and_then(|text| parse_json::<Ballot>(&text)) {
            Ok(ballot) if ctx.config().vote_candidates.contains(&ballot.candidate) => {
                log::info!("🗳️ ({}) voted for {}", ctx.me.username, ballot.candidate);
                ctx.out.push(Outbound::Vote(ballot.candidate.clone()));
                ctx.out.push(Outbound::SendNews(NewsItem::new(
                    format!("🗳️ {} has cast a vote", ctx.me.username),
                    None,
                    NewsKind::Vote {
                        voter: ctx.me.username.clone(),
                    },
                )));
                self.chosen = Some(ballot.candidate);
            }
            Ok(ballot) => {
                log::error!(
                    "({}) tried to vote for {:?}, not one of {:?}",
                    ctx.me.username,
                    ballot.candidate,
                    ctx.config().vote_candidates
                );
            }
            Err(e) => log::error!("({}) failed to vote: {:#}", ctx.me.username, e),
        }
        Progress::Completed
    }
}
