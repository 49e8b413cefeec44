use crate::domain;
use crate::domain::TaskId;
use crate::domain::task::{NewTask, Priority, Task, TimeEntry, UpdateTask};
use crate::external_connections::{ConnectionHandle, ExternalConnectivity};
use anyhow::{Context, Error, anyhow};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgListener;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Channel the task table's trigger notifies with the owning user's ID on every change
pub const TASK_CHANGE_CHANNEL: &str = "task_changes";

const TASK_COLUMNS: &str = "id, user_id, title, description, due_date, priority, category, \
    is_completed, time_spent, time_entries, display_order";

/// Priority as found in the `priority` column. Current rows hold a label, but older
/// rows may hold a 1-4 number or a `{label, value}` object.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum StoredPriority {
    Label(String),
    Scale(i64),
    Labeled {
        #[serde(default)]
        value: Option<serde_json::Value>,
        #[serde(default)]
        label: Option<String>,
    },
    Unreadable(serde_json::Value),
}

impl StoredPriority {
    fn from_value(value: &serde_json::Value) -> Option<Priority> {
        match value {
            serde_json::Value::String(label) => Priority::from_label(label),
            serde_json::Value::Number(level) => level.as_i64().and_then(Priority::from_scale),
            _ => None,
        }
    }
}

impl From<StoredPriority> for Priority {
    fn from(stored: StoredPriority) -> Self {
        let resolved = match stored {
            StoredPriority::Label(label) => Priority::from_label(&label),
            StoredPriority::Scale(level) => Priority::from_scale(level),
            StoredPriority::Labeled { value, label } => value
                .as_ref()
                .and_then(StoredPriority::from_value)
                .or_else(|| label.as_deref().and_then(Priority::from_label)),
            StoredPriority::Unreadable(_) => None,
        };

        resolved.unwrap_or_default()
    }
}

/// One element of the `time_entries` JSON array. Entries written before identifiers were
/// assigned have none, so one is derived from the task, the entry's position and its start
/// time. Legacy arrays are never rewritten without ids, so the position is stable.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct StoredTimeEntry {
    #[serde(default)]
    id: Option<Uuid>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    #[serde(default)]
    duration: Option<i64>,
}

impl StoredTimeEntry {
    fn into_time_entry(self, task_id: TaskId, position: usize) -> TimeEntry {
        let id = self.id.unwrap_or_else(|| {
            let name = format!("{position}:{}", self.start_time.to_rfc3339());
            Uuid::new_v5(&task_id, name.as_bytes())
        });

        TimeEntry {
            id,
            start_time: self.start_time,
            end_time: self.end_time,
            duration: self.duration.unwrap_or_else(|| {
                domain::time_entry::entry_duration(self.start_time, self.end_time)
            }),
        }
    }
}

impl From<&TimeEntry> for StoredTimeEntry {
    fn from(entry: &TimeEntry) -> Self {
        StoredTimeEntry {
            id: Some(entry.id),
            start_time: entry.start_time,
            end_time: entry.end_time,
            duration: Some(entry.duration),
        }
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    user_id: String,
    title: String,
    description: Option<String>,
    due_date: DateTime<Utc>,
    priority: Json<StoredPriority>,
    category: String,
    is_completed: bool,
    time_spent: i64,
    time_entries: Json<Vec<StoredTimeEntry>>,
    display_order: Option<i32>,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        let task_id = row.id;
        Task {
            id: task_id,
            owner_user_id: row.user_id,
            title: row.title,
            description: row.description,
            due_date: row.due_date,
            priority: Priority::from(row.priority.0),
            category: row.category,
            is_completed: row.is_completed,
            time_spent: row.time_spent,
            time_entries: row
                .time_entries
                .0
                .into_iter()
                .enumerate()
                .map(|(position, entry)| entry.into_time_entry(task_id, position))
                .collect(),
            display_order: row.display_order,
        }
    }
}

async fn select_tasks_for_user(cxn: &mut PgConnection, user_id: &str) -> Result<Vec<Task>, Error> {
    let tasks = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM task WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_all(cxn)
    .await
    .context("trying to fetch tasks for a user")?
    .into_iter()
    .map(Task::from)
    .collect();

    Ok(tasks)
}

pub struct DbTaskReader;

impl domain::task::driven_ports::TaskReader for DbTaskReader {
    async fn tasks_for_user(
        &self,
        user_id: &str,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<Vec<Task>, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        select_tasks_for_user(cxn.borrow_connection(), user_id).await
    }

    async fn user_task_by_id(
        &self,
        user_id: &str,
        task_id: TaskId,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<Option<Task>, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let task = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM task WHERE user_id = $1 AND id = $2"
        ))
        .bind(user_id)
        .bind(task_id)
        .fetch_optional(cxn.borrow_connection())
        .await
        .context("trying to fetch a task by ID")?
        .map(Task::from);

        Ok(task)
    }
}

pub struct DbTaskWriter;

impl domain::task::driven_ports::TaskWriter for DbTaskWriter {
    async fn create_task_for_user(
        &self,
        user_id: &str,
        new_task: &NewTask,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<TaskId, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let new_id = sqlx::query_as::<_, super::NewId>(
            "INSERT INTO task(user_id, title, description, due_date, priority, category) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING task.id",
        )
        .bind(user_id)
        .bind(&new_task.title)
        .bind(&new_task.description)
        .bind(new_task.due_date)
        .bind(Json(new_task.priority.label()))
        .bind(&new_task.category)
        .fetch_one(cxn.borrow_connection())
        .await
        .context("trying to insert a new task into the database")?;

        Ok(new_id.id)
    }

    async fn update_task(
        &self,
        user_id: &str,
        task_id: TaskId,
        update: &UpdateTask,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<bool, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let result = sqlx::query(
            "UPDATE task SET \
                title = COALESCE($3, title), \
                description = CASE WHEN $4::text IS NULL THEN description ELSE NULLIF($4, '') END, \
                due_date = COALESCE($5, due_date), \
                priority = COALESCE($6, priority), \
                category = COALESCE($7, category) \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(task_id)
        .bind(user_id)
        .bind(&update.title)
        .bind(&update.description)
        .bind(update.due_date)
        .bind(update.priority.map(|priority| Json(priority.label())))
        .bind(&update.category)
        .execute(cxn.borrow_connection())
        .await
        .context("trying to update a task in the database")?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_completion(
        &self,
        user_id: &str,
        task_id: TaskId,
        is_completed: bool,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<bool, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let result = sqlx::query("UPDATE task SET is_completed = $3 WHERE id = $1 AND user_id = $2")
            .bind(task_id)
            .bind(user_id)
            .bind(is_completed)
            .execute(cxn.borrow_connection())
            .await
            .context("trying to set a task's completion")?;

        Ok(result.rows_affected() > 0)
    }

    async fn save_time_log(
        &self,
        user_id: &str,
        task_id: TaskId,
        time_entries: &[TimeEntry],
        time_spent: i64,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<bool, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;
        let stored_entries: Vec<StoredTimeEntry> = time_entries.iter().map(StoredTimeEntry::from).collect();

        let result = sqlx::query(
            "UPDATE task SET time_entries = $3, time_spent = $4 WHERE id = $1 AND user_id = $2",
        )
        .bind(task_id)
        .bind(user_id)
        .bind(Json(stored_entries))
        .bind(time_spent)
        .execute(cxn.borrow_connection())
        .await
        .context("trying to save a task's time log")?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_display_order(
        &self,
        user_id: &str,
        task_id: TaskId,
        display_order: i32,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<bool, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let result = sqlx::query("UPDATE task SET display_order = $3 WHERE id = $1 AND user_id = $2")
            .bind(task_id)
            .bind(user_id)
            .bind(display_order)
            .execute(cxn.borrow_connection())
            .await
            .context("trying to set a task's display order")?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_task(
        &self,
        user_id: &str,
        task_id: TaskId,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<(), Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        sqlx::query("DELETE FROM task WHERE id = $1 AND user_id = $2")
            .bind(task_id)
            .bind(user_id)
            .execute(cxn.borrow_connection())
            .await
            .context("trying to remove a task from the database")?;

        Ok(())
    }
}

/// Changes held for a slow subscription before it falls behind and resynchronizes
const CHANGE_BUFFER: usize = 256;
const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(1);

/// What the shared listener tells subscriptions
#[derive(Clone, Debug, PartialEq, Eq)]
enum TaskChange {
    /// The tasks of this user changed
    ForUser(String),
    /// The listener reconnected, so any user's tasks may have changed unnoticed
    Missed,
}

/// Streams a user's task list by fanning out the task table's change notifications. A
/// single listener connection serves every subscription. Each new snapshot borrows a
/// pooled connection only while it reads.
pub struct DbTaskSubscriber {
    pool: PgPool,
    changes: broadcast::Sender<TaskChange>,
    forwarder: JoinHandle<()>,
}

impl DbTaskSubscriber {
    /// Connects the shared listener and starts forwarding its notifications
    pub async fn start(pool: PgPool) -> Result<DbTaskSubscriber, Error> {
        let mut listener = PgListener::connect_with(&pool)
            .await
            .context("connecting the task change listener")?;
        listener
            .listen(TASK_CHANGE_CHANNEL)
            .await
            .context("listening for task changes")?;

        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        let forwarder = tokio::spawn(forward_changes(listener, changes.clone()));

        Ok(DbTaskSubscriber {
            pool,
            changes,
            forwarder,
        })
    }
}

impl Drop for DbTaskSubscriber {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

async fn forward_changes(mut listener: PgListener, changes: broadcast::Sender<TaskChange>) {
    loop {
        let change = match listener.try_recv().await {
            Ok(Some(notification)) => TaskChange::ForUser(notification.payload().to_owned()),
            Ok(None) => {
                warn!("Task change listener lost its connection, subscriptions will resynchronize");
                TaskChange::Missed
            }
            Err(err) => {
                error!("Task change listener failed: {err}");
                tokio::time::sleep(LISTENER_RETRY_DELAY).await;
                continue;
            }
        };

        // Sending only fails while nobody is subscribed
        let _ = changes.send(change);
    }
}

/// Waits until `user_id`'s tasks may have changed
async fn next_change_for(changes: &mut broadcast::Receiver<TaskChange>, user_id: &str) -> Result<(), Error> {
    loop {
        match changes.recv().await {
            Ok(TaskChange::ForUser(changed)) if changed == user_id => return Ok(()),
            Ok(TaskChange::ForUser(_)) => continue,
            Ok(TaskChange::Missed) => return Ok(()),
            Err(RecvError::Lagged(skipped)) => {
                debug!("Task subscription for user {user_id} fell behind by {skipped} changes");
                return Ok(());
            }
            Err(RecvError::Closed) => return Err(anyhow!("the task change listener stopped")),
        }
    }
}

enum Subscription {
    Starting(broadcast::Receiver<TaskChange>),
    Listening(broadcast::Receiver<TaskChange>),
}

impl domain::task::driven_ports::TaskSubscriber for DbTaskSubscriber {
    fn subscribe(&self, user_id: &str) -> BoxStream<'static, Result<Vec<Task>, Error>> {
        let pool = self.pool.clone();
        let user_id = user_id.to_owned();
        // Subscribing before the first read means no change can slip in between
        let changes = self.changes.subscribe();

        stream::try_unfold(Subscription::Starting(changes), move |subscription| {
            let pool = pool.clone();
            let user_id = user_id.clone();
            async move {
                let changes = match subscription {
                    Subscription::Starting(changes) => changes,
                    Subscription::Listening(mut changes) => {
                        next_change_for(&mut changes, &user_id).await?;
                        debug!("Tasks changed for user {user_id}");
                        changes
                    }
                };

                let mut cxn = pool
                    .acquire()
                    .await
                    .context("acquiring a connection for a task snapshot")?;
                let tasks = select_tasks_for_user(&mut cxn, &user_id).await?;

                Ok::<_, Error>(Some((tasks, Subscription::Listening(changes))))
            }
        })
        .boxed()
    }
}
