use tracing::{debug, info, warn};

use super::finish::Ending;
use super::mutation::Mutated;
use super::GameFlowService;
use crate::domain::moves::{resolve_round, Outcome, RoundHands};
use crate::domain::session::{MessageRef, PlayerState, SessionState, UserId};
use crate::domain::stage::{evaluate, Completion, ConsentView, Evaluation, Stage};
use crate::error::AppError;
use crate::services::notify::{MessageKey, Payload, Target};

/// Countdown messages currently on screen.
pub(super) fn shown_messages(state: &SessionState) -> Vec<(UserId, MessageRef)> {
    state
        .players
        .iter()
        .filter_map(|p| p.last_shown_message_id.map(|m| (p.player_id, m)))
        .collect()
}

/// Result of one resolved round, from slot 0's point of view.
#[derive(Debug, Clone, Copy)]
struct RoundReport {
    round: u8,
    outcome: Outcome,
    hands: [RoundHands; 2],
}

/// What settling a stage committed.
#[derive(Debug)]
enum Transition {
    StartGame,
    RevealHands,
    NextRound(RoundReport),
    Finish {
        ending: Ending,
        report: Option<RoundReport>,
    },
}

impl GameFlowService {
    /// Tick path: re-evaluate the stage and refresh the countdown.
    ///
    /// Returns true when nothing is left to wait for and the caller should
    /// settle the stage right away instead of waiting for the deadline.
    pub async fn observe_stage(
        &self,
        session_id: &str,
        stage: Stage,
        time_remaining: f64,
    ) -> Result<bool, AppError> {
        let current = self.load(session_id).await?;
        let evaluation = evaluate(current.as_ref(), stage);
        if evaluation.is_settled() {
            debug!(session_id, timer_name = stage.timer_name(), ?evaluation, "Stage settled on tick");
            return Ok(true);
        }
        if let Some(state) = current {
            self.show_countdown(&state, stage, time_remaining).await;
        }
        Ok(false)
    }

    /// Timeout path: apply whatever the stage's current evaluation implies.
    ///
    /// Completion is classified before any timeout consequence, so a late
    /// evaluation that finds both players done proceeds normally. Returns true
    /// once the timer has nothing left to do.
    pub async fn settle_stage(&self, session_id: &str, stage: Stage) -> Result<bool, AppError> {
        let settings = self.state.settings.clone();
        let mutated = self
            .mutate(session_id, |s| {
                let shown = shown_messages(s);
                let transition = match evaluate(Some(s), stage) {
                    Evaluation::Gone | Evaluation::Elsewhere => return Ok(None),
                    Evaluation::Consent(ConsentView::Accepted) => {
                        s.begin_round();
                        Transition::StartGame
                    }
                    Evaluation::Consent(ConsentView::Refused { by }) => {
                        finish(s, Ending::Refused { by }, None)
                    }
                    Evaluation::Consent(ConsentView::Waiting { silent }) => {
                        finish(s, Ending::ConsentTimeout { silent }, None)
                    }
                    Evaluation::Progress(Completion::Both) => match stage {
                        Stage::RemainingHand => {
                            let report = score_round(s)?;
                            if let Some(winner) = s
                                .players
                                .iter()
                                .find(|p| p.rounds_won >= settings.rounds_to_win)
                                .map(|p| p.player_id)
                            {
                                finish(s, Ending::Winner(winner), Some(report))
                            } else if s.round >= settings.max_rounds {
                                finish(s, Ending::Draw, Some(report))
                            } else {
                                s.begin_round();
                                Transition::NextRound(report)
                            }
                        }
                        Stage::Hands | Stage::Consent => {
                            s.open_remaining_hand_choice();
                            Transition::RevealHands
                        }
                    },
                    Evaluation::Progress(Completion::OnlyFirst) => {
                        let winner = s.players[0].player_id;
                        finish(s, Ending::Forfeit { winner }, None)
                    }
                    Evaluation::Progress(Completion::OnlySecond) => {
                        let winner = s.players[1].player_id;
                        finish(s, Ending::Forfeit { winner }, None)
                    }
                    Evaluation::Progress(Completion::Neither) => {
                        finish(s, Ending::BothTimedOut, None)
                    }
                };
                Ok(Some((transition, shown)))
            })
            .await?;

        let (state, (transition, shown)) = match mutated {
            Mutated::Committed { state, value } => (state, value),
            Mutated::Unchanged(state) => {
                self.ensure_stage_timer(&state).await?;
                return Ok(true);
            }
            Mutated::Gone => return Ok(true),
        };

        match transition {
            Transition::StartGame => {
                info!(session_id, "Both players accepted, starting game");
                self.clear_countdowns(&shown).await;
                self.deal_round(&state).await?;
            }
            Transition::RevealHands => {
                debug!(session_id, round = state.round, "Both hands submitted");
                self.clear_countdowns(&shown).await;
                self.arm_stage_timer(session_id, Stage::RemainingHand).await?;
                self.reveal_hands(&state).await;
            }
            Transition::NextRound(report) => {
                self.clear_countdowns(&shown).await;
                self.announce_round(&state, &report).await;
                self.deal_round(&state).await?;
            }
            Transition::Finish { ending, report } => {
                if let Some(report) = report {
                    self.announce_round(&state, &report).await;
                }
                self.after_finish(&state, &ending, &shown).await;
            }
        }
        Ok(true)
    }

    /// Arm the timer for `stage`, replacing any leftover entry from an
    /// earlier round.
    pub(super) async fn arm_stage_timer(
        &self,
        session_id: &str,
        stage: Stage,
    ) -> Result<(), AppError> {
        let timers = &self.state.timers;
        let settings = &self.state.settings;
        timers.cancel(session_id, stage.timer_name()).await?;
        timers
            .schedule(
                session_id,
                stage.timer_name(),
                settings.tick_frequency,
                settings.timeout_for(stage),
            )
            .await?;
        debug!(session_id, timer_name = stage.timer_name(), "Stage timer armed");
        Ok(())
    }

    /// Re-arm the timer of the stage a session is in if none is live, which
    /// happens when a worker died between committing a transition and arming
    /// the next timer.
    async fn ensure_stage_timer(&self, state: &SessionState) -> Result<(), AppError> {
        if state.is_finished() {
            return Ok(());
        }
        let Some(stage) = Stage::current(state) else {
            return Ok(());
        };
        let settings = &self.state.settings;
        let created = self
            .state
            .timers
            .schedule(
                &state.session_id,
                stage.timer_name(),
                settings.tick_frequency,
                settings.timeout_for(stage),
            )
            .await?;
        if created {
            warn!(
                session_id = %state.session_id,
                timer_name = stage.timer_name(),
                "Re-armed missing stage timer"
            );
        }
        Ok(())
    }

    async fn deal_round(&self, state: &SessionState) -> Result<(), AppError> {
        let session_id = state.session_id.as_str();
        info!(session_id, round = state.round, "Dealing new round");
        self.arm_stage_timer(session_id, Stage::Hands).await?;
        let payload = Payload::new(MessageKey::ChooseActionForFirstHand)
            .param("round", state.round)
            .with_move_choices();
        let [first, second] = state.player_ids();
        self.outbox.deliver(first, second, Target::Both, &payload).await;
        Ok(())
    }

    async fn reveal_hands(&self, state: &SessionState) {
        for player in &state.players {
            let (user, opponent) = (player.player_id, player.opponent_id);
            let mine = hands_payload(MessageKey::YourHands, player);
            let theirs = hands_payload(MessageKey::OpponentHands, player);
            self.outbox.deliver(user, opponent, Target::User, &mine).await;
            self.outbox.deliver(user, opponent, Target::Opponent, &theirs).await;
        }
        let [first, second] = state.player_ids();
        let invite = Payload::new(MessageKey::InvitationChooseRemainingHand).with_hand_choices();
        self.outbox.deliver(first, second, Target::Both, &invite).await;
    }

    async fn announce_round(&self, state: &SessionState, report: &RoundReport) {
        let [first, second] = state.player_ids();
        let views = [
            (Target::User, report.outcome, 0),
            (Target::Opponent, report.outcome.flip(), 1),
        ];
        for (target, outcome, slot) in views {
            let key = match outcome {
                Outcome::Win => MessageKey::RoundWon,
                Outcome::Lose => MessageKey::RoundLost,
                Outcome::Draw => MessageKey::RoundDrawn,
            };
            let payload = Payload::new(key)
                .param("round", report.round)
                .param("your_hand", report.hands[slot].kept_move())
                .param("opponent_hand", report.hands[1 - slot].kept_move())
                .param("your_score", state.players[slot].rounds_won)
                .param("opponent_score", state.players[1 - slot].rounds_won);
            self.outbox.deliver(first, second, target, &payload).await;
        }
    }

    /// Show or refresh each player's countdown for the running stage.
    async fn show_countdown(&self, state: &SessionState, stage: Stage, time_remaining: f64) {
        let seconds = time_remaining.ceil() as u64;
        for player in &state.players {
            let payload = countdown_payload(player, stage, seconds);
            match player.last_shown_message_id {
                Some(message) => {
                    self.outbox.edit(player.player_id, message, &payload).await;
                }
                None => {
                    let shown = self
                        .outbox
                        .deliver(player.player_id, player.opponent_id, Target::User, &payload)
                        .await;
                    for (recipient, message) in shown {
                        self.remember_countdown(&state.session_id, recipient, stage, message)
                            .await;
                    }
                }
            }
        }
    }

    async fn remember_countdown(
        &self,
        session_id: &str,
        player_id: UserId,
        stage: Stage,
        message: MessageRef,
    ) {
        let recorded = self
            .mutate(session_id, |s| {
                if s.is_finished() || Stage::current(s) != Some(stage) {
                    return Ok(None);
                }
                let Some(player) = s.player_mut(player_id) else {
                    return Ok(None);
                };
                if player.last_shown_message_id.is_some() {
                    return Ok(None);
                }
                player.last_shown_message_id = Some(message);
                Ok(Some(()))
            })
            .await;
        match recorded {
            Ok(Mutated::Committed { .. }) => {}
            Ok(_) => {
                // Stage moved on before the id was stored; drop the orphan.
                self.outbox.delete(player_id, message).await;
            }
            Err(err) => {
                warn!(session_id, player_id, error = %err, "Failed to record countdown message");
            }
        }
    }

    pub(super) async fn clear_countdowns(&self, shown: &[(UserId, MessageRef)]) {
        for (player, message) in shown {
            self.outbox.delete(*player, *message).await;
        }
    }
}

fn finish(s: &mut SessionState, ending: Ending, report: Option<RoundReport>) -> Transition {
    ending.apply(s);
    Transition::Finish { ending, report }
}

/// Resolve the round on the kept hands and credit the winner.
fn score_round(s: &mut SessionState) -> Result<RoundReport, AppError> {
    let hands = [s.players[0].round_hands()?, s.players[1].round_hands()?];
    let outcome = resolve_round(&hands[0], &hands[1]);
    match outcome {
        Outcome::Win => s.players[0].rounds_won += 1,
        Outcome::Lose => s.players[1].rounds_won += 1,
        Outcome::Draw => {}
    }
    Ok(RoundReport {
        round: s.round,
        outcome,
        hands,
    })
}

fn hands_payload(key: MessageKey, player: &PlayerState) -> Payload {
    let mut payload = Payload::new(key);
    if let Some(first) = player.first_hand {
        payload = payload.param("hand1", first);
    }
    if let Some(second) = player.second_hand {
        payload = payload.param("hand2", second);
    }
    payload
}

fn countdown_payload(player: &PlayerState, stage: Stage, seconds: u64) -> Payload {
    let key = match stage {
        Stage::Consent if player.ready_to_play == Some(true) => MessageKey::WaitingOpponent,
        Stage::Consent => MessageKey::GameWillCancel,
        _ if stage.is_done(player.phase) => MessageKey::WaitingOpponent,
        _ => MessageKey::SecondsLeft,
    };
    Payload::new(key).param("seconds", seconds)
}
