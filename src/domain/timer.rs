use crate::domain::TaskId;
use crate::domain::auth::SessionId;
use crate::domain::auth::driven_ports::SessionStore;
use crate::domain::task::TimeEntry;
use crate::domain::task::driven_ports::{TaskReader, TaskWriter};
use crate::domain::time_entry;
use crate::domain::timer::driving_ports::TimerError;
use crate::external_connections::ExternalConnectivity;
use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// A session's timer. At most one task is timed at once.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum TimerState {
    #[default]
    Idle,
    Running {
        task_id: TaskId,
        started_at: DateTime<Utc>,
    },
}

impl TimerState {
    /// Starting the timer that's already running for the same task changes nothing
    pub fn start(self, task_id: TaskId, now: DateTime<Utc>) -> Result<TimerState, TimerError> {
        match self {
            Self::Idle => Ok(Self::Running {
                task_id,
                started_at: now,
            }),
            Self::Running {
                task_id: running_task,
                ..
            } if running_task == task_id => Ok(self),
            Self::Running {
                task_id: running_task,
                ..
            } => Err(TimerError::AnotherTimerActive { running_task }),
        }
    }

    /// Produces the entry covering the running interval. The end is clamped so a clock
    /// going backwards can't produce a negative duration.
    pub fn stop(self, task_id: TaskId, now: DateTime<Utc>) -> Result<TimeEntry, TimerError> {
        match self {
            Self::Running {
                task_id: running_task,
                started_at,
            } if running_task == task_id => Ok(TimeEntry::new(started_at, now.max(started_at))),
            _ => Err(TimerError::NotRunning(task_id)),
        }
    }

    pub fn running_task(&self) -> Option<TaskId> {
        match self {
            Self::Idle => None,
            Self::Running { task_id, .. } => Some(*task_id),
        }
    }

    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        match self {
            Self::Idle => None,
            Self::Running { started_at, .. } => Some(time_entry::entry_duration(*started_at, now)),
        }
    }
}

pub mod driving_ports {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum TimerError {
        #[error("a timer is already running for task {running_task}")]
        AnotherTimerActive { running_task: TaskId },
        #[error("no timer is running for task {0}")]
        NotRunning(TaskId),
        #[error("task {0} does not exist")]
        TaskDoesNotExist(TaskId),
        #[error("the session holding the timer has ended")]
        SessionEnded,
        #[error(transparent)]
        PortError(#[from] anyhow::Error),
    }


    /// Drives the timer held by a session. Every transition is applied to the session's
    /// current state inside the session store, so concurrent requests on one session see
    /// each other's changes.
    pub trait TimerPort {
        /// Starts timing a task and returns the session's new timer
        #[allow(clippy::too_many_arguments)]
        async fn start_timer(
            &self,
            session_id: SessionId,
            user_id: &str,
            task_id: TaskId,
            now: DateTime<Utc>,
            ext_cxn: &mut impl ExternalConnectivity,
            task_read: &impl TaskReader,
            sessions: &impl SessionStore,
        ) -> Result<TimerState, TimerError>;
        /// Stops timing a task and records the interval on it. The timer is left idle on
        /// success and also when the task turns out to be gone.
        #[allow(clippy::too_many_arguments)]
        async fn stop_timer(
            &self,
            session_id: SessionId,
            user_id: &str,
            task_id: TaskId,
            now: DateTime<Utc>,
            ext_cxn: &mut impl ExternalConnectivity,
            task_read: &impl TaskReader,
            task_write: &impl TaskWriter,
            sessions: &impl SessionStore,
        ) -> Result<TimeEntry, TimerError>;
        /// Idles the session's timer if it is running for `task_id`
        fn discard_timer_for(
            &self,
            session_id: SessionId,
            task_id: TaskId,
            sessions: &impl SessionStore,
        ) -> Result<(), TimerError>;
    }
}

/// Applies `change` to the session's timer under the session store's lock
fn transition<R>(
    session_id: SessionId,
    sessions: &impl SessionStore,
    change: impl FnOnce(&mut TimerState) -> Result<R, TimerError>,
) -> Result<R, TimerError> {
    sessions
        .update(session_id, |session| change(&mut session.timer))
        .context("updating a session's timer")?
        .ok_or(TimerError::SessionEnded)?
}

/// Puts `previous` back, unless another request has moved the timer on from `claimed`
fn roll_back(session_id: SessionId, sessions: &impl SessionStore, claimed: TimerState, previous: TimerState) {
    let restored = transition(session_id, sessions, |timer| {
        if *timer == claimed {
            *timer = previous;
        }
        Ok(())
    });
    if let Err(err) = restored {
        warn!("Could not restore the timer of session {session_id}: {err}");
    }
}

pub struct TimerService {}

impl driving_ports::TimerPort for TimerService {
    async fn start_timer(
        &self,
        session_id: SessionId,
        user_id: &str,
        task_id: TaskId,
        now: DateTime<Utc>,
        ext_cxn: &mut impl ExternalConnectivity,
        task_read: &impl TaskReader,
        sessions: &impl SessionStore,
    ) -> Result<TimerState, TimerError> {
        let (previous, started) = transition(session_id, sessions, |timer| {
            let previous = *timer;
            *timer = timer.start(task_id, now)?;
            Ok((previous, *timer))
        })?;

        let task = task_read
            .user_task_by_id(user_id, task_id, &mut *ext_cxn)
            .await
            .context("looking up the task to time");
        match task {
            Ok(Some(_)) => {}
            Ok(None) => {
                roll_back(session_id, sessions, started, previous);
                return Err(TimerError::TaskDoesNotExist(task_id));
            }
            Err(err) => {
                roll_back(session_id, sessions, started, previous);
                return Err(err.into());
            }
        }

        info!("Timer running for task {task_id}");
        Ok(started)
    }

    async fn stop_timer(
        &self,
        session_id: SessionId,
        user_id: &str,
        task_id: TaskId,
        now: DateTime<Utc>,
        ext_cxn: &mut impl ExternalConnectivity,
        task_read: &impl TaskReader,
        task_write: &impl TaskWriter,
        sessions: &impl SessionStore,
    ) -> Result<TimeEntry, TimerError> {
        // Idling first means a second stop for the same run finds nothing to stop
        let (running, entry) = transition(session_id, sessions, |timer| {
            let entry = timer.stop(task_id, now)?;
            let running = *timer;
            *timer = TimerState::Idle;
            Ok((running, entry))
        })?;

        let task = match task_read
            .user_task_by_id(user_id, task_id, &mut *ext_cxn)
            .await
            .context("looking up the timed task")
        {
            Ok(task) => task,
            Err(err) => {
                roll_back(session_id, sessions, TimerState::Idle, running);
                return Err(err.into());
            }
        };
        let Some(task) = task else {
            warn!("Timed task {task_id} was deleted, discarding the running timer");
            return Err(TimerError::TaskDoesNotExist(task_id));
        };

        let mut entries = task.time_entries;
        entries.push(entry.clone());
        let saved = time_entry::save_time_log(user_id, task_id, &entries, &mut *ext_cxn, task_write)
            .await
            .context("saving the timed interval");
        match saved {
            Ok(true) => {}
            Ok(false) => return Err(TimerError::TaskDoesNotExist(task_id)),
            Err(err) => {
                roll_back(session_id, sessions, TimerState::Idle, running);
                return Err(err.into());
            }
        }

        info!("Timer stopped for task {task_id} after {} seconds", entry.duration);
        Ok(entry)
    }

    fn discard_timer_for(
        &self,
        session_id: SessionId,
        task_id: TaskId,
        sessions: &impl SessionStore,
    ) -> Result<(), TimerError> {
        transition(session_id, sessions, |timer| {
            if timer.running_task() == Some(task_id) {
                info!("Discarding the running timer for task {task_id}");
                *timer = TimerState::Idle;
            }
            Ok(())
        })
    }
}


#[cfg(test)]
pub mod test_util {
    use super::*;
    use crate::domain::test_util::FakeImplementation;
    use std::sync::Mutex;

    /// Records calls and returns canned results. The session store is never touched.
    pub struct MockTimerService {
        pub start_timer_result: FakeImplementation<TaskId, Result<TimerState, TimerError>>,
        pub stop_timer_result: FakeImplementation<TaskId, Result<TimeEntry, TimerError>>,
        pub discard_timer_for_result: FakeImplementation<TaskId, Result<(), TimerError>>,
    }

    impl MockTimerService {
        pub fn new_locked() -> Mutex<MockTimerService> {
            Mutex::new(MockTimerService {
                start_timer_result: FakeImplementation::new(),
                stop_timer_result: FakeImplementation::new(),
                discard_timer_for_result: FakeImplementation::new(),
            })
        }
    }

    impl driving_ports::TimerPort for Mutex<MockTimerService> {
        async fn start_timer(
            &self,
            _session_id: SessionId,
            _user_id: &str,
            task_id: TaskId,
            _now: DateTime<Utc>,
            _ext_cxn: &mut impl ExternalConnectivity,
            _task_read: &impl TaskReader,
            _sessions: &impl SessionStore,
        ) -> Result<TimerState, TimerError> {
            let mut locked_self = self.lock().expect("mock timer service mutex poisoned");
            locked_self.start_timer_result.save_arguments(task_id);
            locked_self.start_timer_result.return_value_result()
        }

        async fn stop_timer(
            &self,
            _session_id: SessionId,
            _user_id: &str,
            task_id: TaskId,
            _now: DateTime<Utc>,
            _ext_cxn: &mut impl ExternalConnectivity,
            _task_read: &impl TaskReader,
            _task_write: &impl TaskWriter,
            _sessions: &impl SessionStore,
        ) -> Result<TimeEntry, TimerError> {
            let mut locked_self = self.lock().expect("mock timer service mutex poisoned");
            locked_self.stop_timer_result.save_arguments(task_id);
            locked_self.stop_timer_result.return_value_result()
        }

        fn discard_timer_for(
            &self,
            _session_id: SessionId,
            task_id: TaskId,
            _sessions: &impl SessionStore,
        ) -> Result<(), TimerError> {
            let mut locked_self = self.lock().expect("mock timer service mutex poisoned");
            locked_self.discard_timer_for_result.save_arguments(task_id);
            locked_self.discard_timer_for_result.return_value_result()
        }
    }
}
