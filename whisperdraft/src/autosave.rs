//! AutosaveActor - periodic save-and-respond.
//!
//! A single ticker task feeds `Tick` messages to the actor. Re-arming aborts
//! the running ticker before starting the next one, and stopping the actor
//! aborts it too, so at most one timer is live per actor.

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// What a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Save ran; `diff_id` is set when the note had changed.
    Saved { diff_id: Option<String> },
    /// Another save was running.
    Skipped,
}

/// Whatever the scheduler saves on each tick.
#[async_trait]
pub trait AutosaveTarget: Send + Sync + 'static {
    async fn autosave(&self) -> TickOutcome;
}

pub struct AutosaveArguments {
    pub target: Arc<dyn AutosaveTarget>,
    pub interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutosaveStatus {
    pub interval_ms: u64,
    pub ticks: u64,
    /// Ticks whose save produced a diff.
    pub saves: u64,
    /// Ticks that found the note unchanged.
    pub unchanged: u64,
    pub skipped: u64,
    pub last_save_ms: Option<i64>,
}

pub struct AutosaveState {
    target: Arc<dyn AutosaveTarget>,
    interval: Duration,
    ticker: JoinHandle<()>,
    ticks: u64,
    saves: u64,
    unchanged: u64,
    skipped: u64,
    last_save_ms: Option<i64>,
}

#[derive(Debug)]
pub enum AutosaveMsg {
    Tick,
    /// Restart the timer with a new period.
    Rearm { interval: Duration },
    GetStatus { reply: RpcReplyPort<AutosaveStatus> },
}

#[derive(Debug, Default)]
pub struct AutosaveActor;

fn spawn_ticker(myself: ActorRef<AutosaveMsg>, interval: Duration) -> JoinHandle<()> {
    let interval = interval.max(MIN_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if myself.cast(AutosaveMsg::Tick).is_err() {
                break;
            }
        }
    })
}

#[async_trait]
impl Actor for AutosaveActor {
    type Msg = AutosaveMsg;
    type State = AutosaveState;
    type Arguments = AutosaveArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            interval_ms = args.interval.as_millis() as u64,
            "Autosave scheduler started"
        );
        Ok(AutosaveState {
            ticker: spawn_ticker(myself, args.interval),
            target: args.target,
            interval: args.interval,
            ticks: 0,
            saves: 0,
            unchanged: 0,
            skipped: 0,
            last_save_ms: None,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            AutosaveMsg::Tick => {
                state.ticks += 1;
                match state.target.autosave().await {
                    TickOutcome::Saved {
                        diff_id: Some(diff_id),
                    } => {
                        state.saves += 1;
                        state.last_save_ms = Some(chrono::Utc::now().timestamp_millis());
                        tracing::debug!(diff_id = %diff_id, "Autosave tick saved note");
                    }
                    TickOutcome::Saved { diff_id: None } => {
                        state.unchanged += 1;
                    }
                    TickOutcome::Skipped => {
                        state.skipped += 1;
                        tracing::debug!("Autosave tick skipped, save already in progress");
                    }
                }
            }
            AutosaveMsg::Rearm { interval } => {
                state.ticker.abort();
                state.ticker = spawn_ticker(myself, interval);
                state.interval = interval;
                tracing::info!(
                    interval_ms = interval.as_millis() as u64,
                    "Autosave timer re-armed"
                );
            }
            AutosaveMsg::GetStatus { reply } => {
                let _ = reply.send(AutosaveStatus {
                    interval_ms: state.interval.as_millis() as u64,
                    ticks: state.ticks,
                    saves: state.saves,
                    unchanged: state.unchanged,
                    skipped: state.skipped,
                    last_save_ms: state.last_save_ms,
                });
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.ticker.abort();
        tracing::info!(ticks = state.ticks, saves = state.saves, "Autosave scheduler stopped");
        Ok(())
    }
}
