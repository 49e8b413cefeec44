use crate::domain::task::TimeEntry;
use crate::domain::task::driven_ports::{TaskReader, TaskWriter};
use crate::domain::time_entry::driving_ports::TimeEntryError;
use crate::domain::{TaskId, TimeEntryId, field_error, task_list};
use crate::external_connections::ExternalConnectivity;
use anyhow::Context;
use chrono::{DateTime, FixedOffset, Utc};
use tracing::info;
use validator::ValidationErrors;

impl TimeEntry {
    /// Creates an entry with a fresh identifier. Duration is whole seconds and never negative.
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> TimeEntry {
        TimeEntry {
            id: TimeEntryId::new_v4(),
            start_time,
            end_time,
            duration: entry_duration(start_time, end_time),
        }
    }
}

pub fn entry_duration(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> i64 {
    (end_time - start_time).num_seconds().max(0)
}

pub fn total_duration(entries: &[TimeEntry]) -> i64 {
    entries.iter().map(|entry| entry.duration).sum()
}

/// An interval is valid when it ends strictly after it starts and both ends fall on the
/// same calendar day for the user. Problems are reported against `offending_field`.
pub fn validate_interval(
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    offset: FixedOffset,
    offending_field: &'static str,
) -> Result<(), ValidationErrors> {
    if end_time <= start_time {
        return Err(field_error(
            offending_field,
            "end_before_start",
            "End time must be after start time",
        ));
    }
    if task_list::calendar_day(start_time, offset) != task_list::calendar_day(end_time, offset) {
        return Err(field_error(
            offending_field,
            "spans_days",
            "Start and end time must be on the same day",
        ));
    }

    Ok(())
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct NewTimeEntry {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct TimeEntryUpdate {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl TimeEntryUpdate {
    /// Field blamed for an invalid result. Editing only the start blames the start.
    fn offending_field(&self) -> &'static str {
        match (self.start_time, self.end_time) {
            (Some(_), None) => "start_time",
            _ => "end_time",
        }
    }

    /// Merges the update into an existing entry, keeping its identifier
    pub fn apply_to(&self, entry: &TimeEntry) -> TimeEntry {
        let start_time = self.start_time.unwrap_or(entry.start_time);
        let end_time = self.end_time.unwrap_or(entry.end_time);

        TimeEntry {
            id: entry.id,
            start_time,
            end_time,
            duration: entry_duration(start_time, end_time),
        }
    }
}

/// Persists a task's whole time log, recomputing the aggregate from the entries
pub(crate) async fn save_time_log(
    user_id: &str,
    task_id: TaskId,
    entries: &[TimeEntry],
    ext_cxn: &mut impl ExternalConnectivity,
    task_write: &impl TaskWriter,
) -> Result<bool, anyhow::Error> {
    task_write
        .save_time_log(user_id, task_id, entries, total_duration(entries), &mut *ext_cxn)
        .await
}

pub mod driving_ports {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum TimeEntryError {
        #[error("time entry was invalid: {0}")]
        Invalid(#[from] ValidationErrors),
        #[error("task {0} does not exist")]
        TaskDoesNotExist(TaskId),
        #[error("time entry {0} does not exist")]
        EntryDoesNotExist(TimeEntryId),
        #[error(transparent)]
        PortError(#[from] anyhow::Error),
    }


    pub trait TimeEntryPort {
        /// Adds a manually entered interval to a task
        #[allow(clippy::too_many_arguments)]
        async fn log_time_entry(
            &self,
            user_id: &str,
            task_id: TaskId,
            new_entry: &NewTimeEntry,
            offset: FixedOffset,
            ext_cxn: &mut impl ExternalConnectivity,
            task_read: &impl TaskReader,
            task_write: &impl TaskWriter,
        ) -> Result<TimeEntry, TimeEntryError>;
        #[allow(clippy::too_many_arguments)]
        async fn update_time_entry(
            &self,
            user_id: &str,
            task_id: TaskId,
            entry_id: TimeEntryId,
            update: &TimeEntryUpdate,
            offset: FixedOffset,
            ext_cxn: &mut impl ExternalConnectivity,
            task_read: &impl TaskReader,
            task_write: &impl TaskWriter,
        ) -> Result<TimeEntry, TimeEntryError>;
        /// Removing an entry the task doesn't have succeeds without writing anything
        async fn delete_time_entry(
            &self,
            user_id: &str,
            task_id: TaskId,
            entry_id: TimeEntryId,
            ext_cxn: &mut impl ExternalConnectivity,
            task_read: &impl TaskReader,
            task_write: &impl TaskWriter,
        ) -> Result<(), TimeEntryError>;
    }
}

pub struct TimeEntryService {}

impl TimeEntryService {
    async fn entries_for_task(
        &self,
        user_id: &str,
        task_id: TaskId,
        ext_cxn: &mut impl ExternalConnectivity,
        task_read: &impl TaskReader,
    ) -> Result<Vec<TimeEntry>, TimeEntryError> {
        let task = task_read
            .user_task_by_id(user_id, task_id, &mut *ext_cxn)
            .await
            .context("fetching a task to edit its time log")?;

        match task {
            Some(task) => Ok(task.time_entries),
            None => Err(TimeEntryError::TaskDoesNotExist(task_id)),
        }
    }

    async fn write_entries(
        &self,
        user_id: &str,
        task_id: TaskId,
        entries: &[TimeEntry],
        ext_cxn: &mut impl ExternalConnectivity,
        task_write: &impl TaskWriter,
    ) -> Result<(), TimeEntryError> {
        let found = save_time_log(user_id, task_id, entries, &mut *ext_cxn, task_write)
            .await
            .context("saving a task's time log")?;

        if !found {
            return Err(TimeEntryError::TaskDoesNotExist(task_id));
        }
        Ok(())
    }
}

impl driving_ports::TimeEntryPort for TimeEntryService {
    async fn log_time_entry(
        &self,
        user_id: &str,
        task_id: TaskId,
        new_entry: &NewTimeEntry,
        offset: FixedOffset,
        ext_cxn: &mut impl ExternalConnectivity,
        task_read: &impl TaskReader,
        task_write: &impl TaskWriter,
    ) -> Result<TimeEntry, TimeEntryError> {
        validate_interval(new_entry.start_time, new_entry.end_time, offset, "end_time")?;

        let mut entries = self
            .entries_for_task(user_id, task_id, &mut *ext_cxn, task_read)
            .await?;
        let entry = TimeEntry::new(new_entry.start_time, new_entry.end_time);
        entries.push(entry.clone());
        self.write_entries(user_id, task_id, &entries, &mut *ext_cxn, task_write)
            .await?;

        info!("Logged {} seconds against task {task_id}", entry.duration);
        Ok(entry)
    }

    async fn update_time_entry(
        &self,
        user_id: &str,
        task_id: TaskId,
        entry_id: TimeEntryId,
        update: &TimeEntryUpdate,
        offset: FixedOffset,
        ext_cxn: &mut impl ExternalConnectivity,
        task_read: &impl TaskReader,
        task_write: &impl TaskWriter,
    ) -> Result<TimeEntry, TimeEntryError> {
        let mut entries = self
            .entries_for_task(user_id, task_id, &mut *ext_cxn, task_read)
            .await?;
        let Some(existing) = entries.iter_mut().find(|entry| entry.id == entry_id) else {
            return Err(TimeEntryError::EntryDoesNotExist(entry_id));
        };

        let updated = update.apply_to(existing);
        validate_interval(
            updated.start_time,
            updated.end_time,
            offset,
            update.offending_field(),
        )?;
        *existing = updated.clone();

        self.write_entries(user_id, task_id, &entries, &mut *ext_cxn, task_write)
            .await?;
        Ok(updated)
    }

    async fn delete_time_entry(
        &self,
        user_id: &str,
        task_id: TaskId,
        entry_id: TimeEntryId,
        ext_cxn: &mut impl ExternalConnectivity,
        task_read: &impl TaskReader,
        task_write: &impl TaskWriter,
    ) -> Result<(), TimeEntryError> {
        let mut entries = self
            .entries_for_task(user_id, task_id, &mut *ext_cxn, task_read)
            .await?;
        let entry_count = entries.len();
        entries.retain(|entry| entry.id != entry_id);
        if entries.len() == entry_count {
            return Ok(());
        }

        self.write_entries(user_id, task_id, &entries, &mut *ext_cxn, task_write)
            .await
    }
}
