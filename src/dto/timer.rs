use crate::domain::timer::TimerState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// The session's timer. All fields are empty while no timer is running.
#[derive(Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize, Debug, PartialEq))]
pub struct TimerStatus {
    pub running_task_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds since the timer started
    pub elapsed_seconds: Option<i64>,
}

impl TimerStatus {
    pub fn at(timer: TimerState, now: DateTime<Utc>) -> TimerStatus {
        match timer {
            TimerState::Idle => TimerStatus {
                running_task_id: None,
                started_at: None,
                elapsed_seconds: None,
            },
            TimerState::Running {
                task_id,
                started_at,
            } => TimerStatus {
                running_task_id: Some(task_id),
                started_at: Some(started_at),
                elapsed_seconds: timer.elapsed_seconds(now),
            },
        }
    }
}
