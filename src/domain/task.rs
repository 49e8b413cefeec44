use crate::domain::task::driven_ports::{TaskReader, TaskSubscriber, TaskWriter};
use crate::domain::task::driving_ports::{TaskError, TaskPort};
use crate::domain::{TaskId, TimeEntryId, UserId, field_error, task_list};
use crate::external_connections::{ExternalConnectivity, Transactable, TransactionHandle};
use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{error, info};
use validator::ValidationErrors;

/// Category names offered to users. Anything else is a custom category.
pub const SUGGESTED_CATEGORIES: [&str; 4] = ["work", "personal", "shopping", "other"];
/// The category choice that means "use the custom category text instead"
pub const CUSTOM_CATEGORY_CHOICE: &str = "other";

#[derive(PartialEq, Eq, Debug, Clone, Copy, Default, Hash)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn from_label(label: &str) -> Option<Priority> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// Interprets the 1-4 numeric scale some older task records were saved with.
    /// Level 4 ("urgent") has no counterpart and collapses into [Priority::High].
    pub fn from_scale(level: i64) -> Option<Priority> {
        match level {
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            3 | 4 => Some(Self::High),
            _ => None,
        }
    }
}

/// One recorded interval of work on a task
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct TimeEntry {
    pub id: TimeEntryId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Whole seconds between start and end
    pub duration: i64,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub owner_user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
    pub priority: Priority,
    pub category: String,
    pub is_completed: bool,
    /// Total seconds spent, kept equal to the sum of [Task::time_entries] durations
    pub time_spent: i64,
    pub time_entries: Vec<TimeEntry>,
    pub display_order: Option<i32>,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
    pub priority: Priority,
    /// Already-resolved category, see [resolve_category]
    pub category: String,
}

impl NewTask {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        if self.title.trim().is_empty() {
            return Err(field_error("title", "required", "Title is required"));
        }
        if self.category.trim().is_empty() {
            return Err(field_error("category", "required", "Category is required"));
        }

        Ok(())
    }
}

/// A partial update to a task. Fields left as [None] keep their current value.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct UpdateTask {
    pub title: Option<String>,
    /// An empty description clears the existing one
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
}

impl UpdateTask {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        if matches!(self.title, Some(ref title) if title.trim().is_empty()) {
            return Err(field_error("title", "required", "Title is required"));
        }
        if matches!(self.category, Some(ref category) if category.trim().is_empty()) {
            return Err(field_error("category", "required", "Category is required"));
        }

        Ok(())
    }

    /// Merges the supplied fields into the task. Identity and ownership are never touched.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(ref title) = self.title {
            task.title = title.clone();
        }
        if let Some(ref description) = self.description {
            task.description = if description.is_empty() {
                None
            } else {
                Some(description.clone())
            };
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(ref category) = self.category {
            task.category = category.clone();
        }
    }
}

/// Turns a category choice into the category that gets stored. Choosing "other" means
/// the custom category text is used, and that text must then be present.
pub fn resolve_category(choice: &str, custom: Option<&str>) -> Result<String, ValidationErrors> {
    let choice = choice.trim();
    if choice.eq_ignore_ascii_case(CUSTOM_CATEGORY_CHOICE) {
        return match custom.map(str::trim) {
            Some(custom) if !custom.is_empty() => Ok(custom.to_owned()),
            _ => Err(field_error(
                "custom_category",
                "required",
                "Custom category cannot be empty.",
            )),
        };
    }

    if choice.is_empty() {
        return Err(field_error("category", "required", "Category is required"));
    }

    Ok(choice.to_owned())
}

pub mod driven_ports {
    use super::*;
    use crate::external_connections::ExternalConnectivity;

    pub trait TaskReader {
        async fn tasks_for_user(
            &self,
            user_id: &str,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<Vec<Task>, anyhow::Error>;
        async fn user_task_by_id(
            &self,
            user_id: &str,
            task_id: TaskId,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<Option<Task>, anyhow::Error>;
    }

    /// Writes task data. Every write is scoped to the owning user, and the boolean results
    /// report whether a task with that ID owned by that user was found.
    pub trait TaskWriter {
        async fn create_task_for_user(
            &self,
            user_id: &str,
            new_task: &NewTask,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<TaskId, anyhow::Error>;

        async fn update_task(
            &self,
            user_id: &str,
            task_id: TaskId,
            update: &UpdateTask,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<bool, anyhow::Error>;

        async fn set_completion(
            &self,
            user_id: &str,
            task_id: TaskId,
            is_completed: bool,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<bool, anyhow::Error>;

        /// Replaces the task's time entries and aggregate time in a single write
        async fn save_time_log(
            &self,
            user_id: &str,
            task_id: TaskId,
            time_entries: &[TimeEntry],
            time_spent: i64,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<bool, anyhow::Error>;

        async fn set_display_order(
            &self,
            user_id: &str,
            task_id: TaskId,
            display_order: i32,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<bool, anyhow::Error>;

        async fn delete_task(
            &self,
            user_id: &str,
            task_id: TaskId,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<(), anyhow::Error>;
    }

    /// Live view of a user's tasks. Every subscription starts with the current task list
    /// and then yields the complete list again each time any of the user's tasks change.
    /// The stream ends after the first error; subscribing again starts over.
    pub trait TaskSubscriber {
        fn subscribe(&self, user_id: &str) -> BoxStream<'static, Result<Vec<Task>, anyhow::Error>>;
    }
}

pub mod driving_ports {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum TaskError {
        #[error("task data was invalid: {0}")]
        Invalid(#[from] ValidationErrors),
        #[error("task {0} does not exist")]
        TaskDoesNotExist(TaskId),
        #[error(transparent)]
        PortError(#[from] anyhow::Error),
    }


    pub trait TaskPort {
        async fn tasks_for_user(
            &self,
            user_id: &str,
            ext_cxn: &mut impl ExternalConnectivity,
            task_read: &impl TaskReader,
        ) -> Result<Vec<Task>, TaskError>;
        async fn tasks_for_day(
            &self,
            user_id: &str,
            day: NaiveDate,
            offset: FixedOffset,
            ext_cxn: &mut impl ExternalConnectivity,
            task_read: &impl TaskReader,
        ) -> Result<Vec<Task>, TaskError>;
        async fn user_task_by_id(
            &self,
            user_id: &str,
            task_id: TaskId,
            ext_cxn: &mut impl ExternalConnectivity,
            task_read: &impl TaskReader,
        ) -> Result<Option<Task>, TaskError>;
        async fn create_task_for_user(
            &self,
            user_id: &str,
            task: &NewTask,
            ext_cxn: &mut impl ExternalConnectivity,
            task_write: &impl TaskWriter,
        ) -> Result<TaskId, TaskError>;
        async fn update_task(
            &self,
            user_id: &str,
            task_id: TaskId,
            update: &UpdateTask,
            ext_cxn: &mut impl ExternalConnectivity,
            task_write: &impl TaskWriter,
        ) -> Result<(), TaskError>;
        /// Flips the completion flag and returns the new value
        async fn toggle_completion(
            &self,
            user_id: &str,
            task_id: TaskId,
            ext_cxn: &mut impl ExternalConnectivity,
            task_read: &impl TaskReader,
            task_write: &impl TaskWriter,
        ) -> Result<bool, TaskError>;
        async fn delete_task(
            &self,
            user_id: &str,
            task_id: TaskId,
            ext_cxn: &mut impl ExternalConnectivity,
            task_write: &impl TaskWriter,
        ) -> Result<(), TaskError>;
        /// Moves a task to a new position in the given day's list, returning the reordered list
        #[allow(clippy::too_many_arguments)]
        async fn move_task(
            &self,
            user_id: &str,
            task_id: TaskId,
            to_index: usize,
            day: NaiveDate,
            offset: FixedOffset,
            ext_cxn: &mut impl Transactable,
            task_read: &impl TaskReader,
            task_write: &impl TaskWriter,
        ) -> Result<Vec<Task>, TaskError>;
        /// Live, sorted task lists for one day
        fn day_snapshots(
            &self,
            user_id: &str,
            day: NaiveDate,
            offset: FixedOffset,
            task_subscribe: &impl TaskSubscriber,
        ) -> BoxStream<'static, Result<Vec<Task>, TaskError>>;
    }
}

pub struct TaskService {}

impl driving_ports::TaskPort for TaskService {
    async fn tasks_for_user(
        &self,
        user_id: &str,
        ext_cxn: &mut impl ExternalConnectivity,
        task_read: &impl TaskReader,
    ) -> Result<Vec<Task>, TaskError> {
        let tasks = task_read
            .tasks_for_user(user_id, &mut *ext_cxn)
            .await
            .context("fetching a user's tasks")?;

        Ok(tasks)
    }

    async fn tasks_for_day(
        &self,
        user_id: &str,
        day: NaiveDate,
        offset: FixedOffset,
        ext_cxn: &mut impl ExternalConnectivity,
        task_read: &impl TaskReader,
    ) -> Result<Vec<Task>, TaskError> {
        let tasks = self.tasks_for_user(user_id, &mut *ext_cxn, task_read).await?;

        Ok(task_list::tasks_for_day(tasks, day, offset))
    }

    async fn user_task_by_id(
        &self,
        user_id: &str,
        task_id: TaskId,
        ext_cxn: &mut impl ExternalConnectivity,
        task_read: &impl TaskReader,
    ) -> Result<Option<Task>, TaskError> {
        let task = task_read
            .user_task_by_id(user_id, task_id, &mut *ext_cxn)
            .await
            .context("fetching a task by ID")?;

        Ok(task)
    }

    async fn create_task_for_user(
        &self,
        user_id: &str,
        task: &NewTask,
        ext_cxn: &mut impl ExternalConnectivity,
        task_write: &impl TaskWriter,
    ) -> Result<TaskId, TaskError> {
        task.validate()?;
        let created_task_id = task_write
            .create_task_for_user(user_id, task, &mut *ext_cxn)
            .await
            .context("creating a task")?;

        info!("Created task {created_task_id} for user {user_id}");
        Ok(created_task_id)
    }

    async fn update_task(
        &self,
        user_id: &str,
        task_id: TaskId,
        update: &UpdateTask,
        ext_cxn: &mut impl ExternalConnectivity,
        task_write: &impl TaskWriter,
    ) -> Result<(), TaskError> {
        update.validate()?;
        let found = task_write
            .update_task(user_id, task_id, update, &mut *ext_cxn)
            .await
            .context("updating a task")?;

        if !found {
            return Err(TaskError::TaskDoesNotExist(task_id));
        }
        Ok(())
    }

    async fn toggle_completion(
        &self,
        user_id: &str,
        task_id: TaskId,
        ext_cxn: &mut impl ExternalConnectivity,
        task_read: &impl TaskReader,
        task_write: &impl TaskWriter,
    ) -> Result<bool, TaskError> {
        let Some(task) = self
            .user_task_by_id(user_id, task_id, &mut *ext_cxn, task_read)
            .await?
        else {
            return Err(TaskError::TaskDoesNotExist(task_id));
        };

        let is_completed = !task.is_completed;
        let found = task_write
            .set_completion(user_id, task_id, is_completed, &mut *ext_cxn)
            .await
            .context("toggling task completion")?;
        if !found {
            return Err(TaskError::TaskDoesNotExist(task_id));
        }

        Ok(is_completed)
    }

    async fn delete_task(
        &self,
        user_id: &str,
        task_id: TaskId,
        ext_cxn: &mut impl ExternalConnectivity,
        task_write: &impl TaskWriter,
    ) -> Result<(), TaskError> {
        task_write
            .delete_task(user_id, task_id, &mut *ext_cxn)
            .await
            .context("deleting a task")?;
        Ok(())
    }

    async fn move_task(
        &self,
        user_id: &str,
        task_id: TaskId,
        to_index: usize,
        day: NaiveDate,
        offset: FixedOffset,
        ext_cxn: &mut impl Transactable,
        task_read: &impl TaskReader,
        task_write: &impl TaskWriter,
    ) -> Result<Vec<Task>, TaskError> {
        let mut day_tasks = self
            .tasks_for_day(user_id, day, offset, &mut *ext_cxn, task_read)
            .await?;
        let Some(changes) = task_list::plan_reorder(&day_tasks, task_id, to_index) else {
            return Err(TaskError::TaskDoesNotExist(task_id));
        };
        if changes.is_empty() {
            return Ok(day_tasks);
        }

        let mut txn = ext_cxn
            .start_transaction()
            .await
            .context("starting a transaction to reorder tasks")?;
        for &(changed_id, display_order) in changes.iter() {
            let found = task_write
                .set_display_order(user_id, changed_id, display_order, &mut txn)
                .await
                .context("writing a task's display order")?;
            if !found {
                // The transaction is dropped uncommitted, which rolls it back
                error!("Task {changed_id} disappeared while reordering tasks for {user_id}");
                return Err(TaskError::TaskDoesNotExist(changed_id));
            }
        }
        txn.commit()
            .await
            .context("committing reordered tasks")?;

        for task in day_tasks.iter_mut() {
            if let Some(&(_, display_order)) = changes.iter().find(|(id, _)| *id == task.id) {
                task.display_order = Some(display_order);
            }
        }
        task_list::sort_for_display(&mut day_tasks);

        Ok(day_tasks)
    }

    fn day_snapshots(
        &self,
        user_id: &str,
        day: NaiveDate,
        offset: FixedOffset,
        task_subscribe: &impl TaskSubscriber,
    ) -> BoxStream<'static, Result<Vec<Task>, TaskError>> {
        task_subscribe
            .subscribe(user_id)
            .map(move |snapshot| match snapshot {
                Ok(tasks) => Ok(task_list::tasks_for_day(tasks, day, offset)),
                Err(err) => Err(TaskError::PortError(err.context("receiving a task snapshot"))),
            })
            .boxed()
    }
}
