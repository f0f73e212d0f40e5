use thiserror::Error;

/// A generated plan that does not fit the live world. Fed back to the planner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanValidationError {
    #[error("Invalid place: {place:?} for the {action} action. Only {known:?} are available")]
    UnknownPlace {
        action: &'static str,
        place: String,
        known: Vec<String>,
    },
    #[error("Invalid person for {action} action: {name:?}. Only {known:?} are available")]
    UnknownPerson {
        action: &'static str,
        name: String,
        known: Vec<String>,
    },
    #[error("Nobody has announced a broadcast at {place:?}, so there is nothing to listen to there")]
    NothingToListenTo { place: String },
    #[error("{speaker} is already broadcasting at {place:?}; pick another place or listen instead")]
    PlaceTaken { place: String, speaker: String },
}

/// Planning gave up for this cycle
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("no valid plan after {attempts} attempts, last problem: {last}")]
    Exhausted {
        attempts: usize,
        last: PlanValidationError,
    },
    #[error("planner response could not be parsed: {0}")]
    Unparseable(String),
}

/// Closing a conversation thread that is not open
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThreadStateError {
    #[error("no conversation thread with {0}")]
    NoThread(String),
    #[error("latest conversation thread with {0} is already finished")]
    AlreadyFinished(String),
}

/// Why a movement could not be started or continued
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MovementError {
    #[error("couldn't find player {0}")]
    UnknownPerson(String),
    #[error("couldn't find place {0}")]
    UnknownPlace(String),
    #[error("no free cell next to {0}")]
    NoAdjacentCell(String),
    #[error("no path to the target")]
    NoPath,
    #[error("blocked by {0} for too long")]
    GaveUp(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("action is already completed")]
    AlreadyCompleted,
}
