use async_trait::async_trait;

use super::{TickOutcome, TimerHandler};
use crate::domain::stage::Stage;
use crate::error::AppError;
use crate::services::game_flow::GameFlowService;

/// Watches one waiting stage of a session. Tick and timeout share the
/// service's single evaluation of the stage.
pub struct StageTimer {
    stage: Stage,
    flow: GameFlowService,
}

impl StageTimer {
    pub fn new(stage: Stage, flow: GameFlowService) -> Self {
        Self { stage, flow }
    }
}

#[async_trait]
impl TimerHandler for StageTimer {
    async fn on_tick(
        &self,
        session_id: &str,
        time_remaining: f64,
    ) -> Result<TickOutcome, AppError> {
        let settled = self
            .flow
            .observe_stage(session_id, self.stage, time_remaining)
            .await?;
        Ok(if settled {
            TickOutcome::Settle
        } else {
            TickOutcome::Continue
        })
    }

    async fn on_timeout(&self, session_id: &str) -> Result<bool, AppError> {
        self.flow.settle_stage(session_id, self.stage).await
    }
}
