//! Waiting stages watched by timers and the single evaluation step shared by
//! the tick path and the timeout path.
//!
//! Completion is always classified before any timeout consequence is chosen,
//! so a late evaluation that finds both players done still proceeds normally.

use crate::domain::session::{Phase, SessionState, SessionStatus, UserId};

/// A stage during which the game waits on both players with a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Consent,
    Hands,
    RemainingHand,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Consent, Stage::Hands, Stage::RemainingHand];

    /// Timer watching this stage; one live timer per session and stage.
    pub fn timer_name(self) -> &'static str {
        match self {
            Stage::Consent => "opponent_consent",
            Stage::Hands => "hands_completion",
            Stage::RemainingHand => "remaining_hand",
        }
    }

    /// The stage both players are in, if they share one.
    pub fn current(state: &SessionState) -> Option<Stage> {
        Stage::ALL
            .into_iter()
            .find(|stage| state.players.iter().all(|p| stage.contains(p.phase)))
    }

    fn contains(self, phase: Phase) -> bool {
        match self {
            Stage::Consent => phase == Phase::AwaitingOpponentConsent,
            Stage::Hands => matches!(
                phase,
                Phase::ChoosingFirstHand | Phase::ChoosingSecondHand | Phase::BothHandsSubmitted
            ),
            Stage::RemainingHand => matches!(
                phase,
                Phase::ChoosingRemainingHand | Phase::RemainingHandSubmitted
            ),
        }
    }

    /// Whether a player in `phase` has nothing left to submit in this stage.
    pub fn is_done(self, phase: Phase) -> bool {
        match self {
            Stage::Consent => false,
            Stage::Hands => phase == Phase::BothHandsSubmitted,
            Stage::RemainingHand => phase == Phase::RemainingHandSubmitted,
        }
    }
}

/// Who finished the stage in time, by session slot (slot 0 = lower id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Both,
    OnlyFirst,
    OnlySecond,
    Neither,
}

impl Completion {
    pub fn classify(first_done: bool, second_done: bool) -> Self {
        match (first_done, second_done) {
            (true, true) => Completion::Both,
            (true, false) => Completion::OnlyFirst,
            (false, true) => Completion::OnlySecond,
            (false, false) => Completion::Neither,
        }
    }
}

/// What the consent stage looks like right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentView {
    Accepted,
    Refused { by: UserId },
    /// Players who have not answered yet.
    Waiting { silent: Vec<UserId> },
}

/// Result of evaluating one stage against the stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Session absent or already finished.
    Gone,
    /// Session has moved past this stage; a stale timer.
    Elsewhere,
    Consent(ConsentView),
    Progress(Completion),
}

impl Evaluation {
    /// Nothing left for the timer to wait for.
    pub fn is_settled(&self) -> bool {
        match self {
            Evaluation::Gone | Evaluation::Elsewhere => true,
            Evaluation::Consent(view) => !matches!(view, ConsentView::Waiting { .. }),
            Evaluation::Progress(c) => *c == Completion::Both,
        }
    }
}

pub fn evaluate(state: Option<&SessionState>, stage: Stage) -> Evaluation {
    let Some(state) = state else {
        return Evaluation::Gone;
    };
    if state.status == SessionStatus::Finished {
        return Evaluation::Gone;
    }
    if !state.players.iter().all(|p| stage.contains(p.phase)) {
        return Evaluation::Elsewhere;
    }

    match stage {
        Stage::Consent => {
            if let Some(refuser) = state
                .players
                .iter()
                .find(|p| p.ready_to_play == Some(false))
            {
                return Evaluation::Consent(ConsentView::Refused {
                    by: refuser.player_id,
                });
            }
            let silent: Vec<UserId> = state
                .players
                .iter()
                .filter(|p| p.ready_to_play.is_none())
                .map(|p| p.player_id)
                .collect();
            if silent.is_empty() {
                Evaluation::Consent(ConsentView::Accepted)
            } else {
                Evaluation::Consent(ConsentView::Waiting { silent })
            }
        }
        Stage::Hands | Stage::RemainingHand => Evaluation::Progress(Completion::classify(
            stage.is_done(state.players[0].phase),
            stage.is_done(state.players[1].phase),
        )),
    }
}
