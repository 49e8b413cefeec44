use crate::domain;
use crate::domain::task_list;
use crate::dto::time_entry::TimeEntry;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

/// How urgent a task is
#[derive(Deserialize, Serialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl From<domain::task::Priority> for Priority {
    fn from(value: domain::task::Priority) -> Self {
        match value {
            domain::task::Priority::Low => Priority::Low,
            domain::task::Priority::Medium => Priority::Medium,
            domain::task::Priority::High => Priority::High,
        }
    }
}

impl From<Priority> for domain::task::Priority {
    fn from(value: Priority) -> Self {
        match value {
            Priority::Low => domain::task::Priority::Low,
            Priority::Medium => domain::task::Priority::Medium,
            Priority::High => domain::task::Priority::High,
        }
    }
}

/// DTO for a task returned on the API
#[derive(Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize, Debug))]
pub struct Task {
    pub id: Uuid,
    #[schema(example = "Write the quarterly report")]
    pub title: String,
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
    pub priority: Priority,
    #[schema(example = "work")]
    pub category: String,
    pub is_completed: bool,
    /// Total seconds logged against the task
    #[schema(example = 5400)]
    pub time_spent: i64,
    pub time_entries: Vec<TimeEntry>,
    pub display_order: Option<i32>,
}

impl From<domain::task::Task> for Task {
    fn from(value: domain::task::Task) -> Self {
        Task {
            id: value.id,
            title: value.title,
            description: value.description,
            due_date: value.due_date,
            priority: value.priority.into(),
            category: value.category,
            is_completed: value.is_completed,
            time_spent: value.time_spent,
            time_entries: value.time_entries.into_iter().map(TimeEntry::from).collect(),
            display_order: value.display_order,
        }
    }
}

/// DTO for creating a new task via the API
#[derive(Deserialize, Validate, ToSchema)]
#[cfg_attr(test, derive(Serialize, Debug))]
pub struct NewTask {
    #[validate(length(min = 1))]
    #[schema(example = "Write the quarterly report")]
    pub title: String,
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub priority: Priority,
    /// One of the suggested categories, or "other" to use `custom_category`
    #[schema(example = "work")]
    pub category: String,
    pub custom_category: Option<String>,
}

impl TryFrom<NewTask> for domain::task::NewTask {
    type Error = ValidationErrors;

    fn try_from(value: NewTask) -> Result<Self, Self::Error> {
        let category = domain::task::resolve_category(&value.category, value.custom_category.as_deref())?;

        Ok(domain::task::NewTask {
            title: value.title,
            description: value.description.filter(|description| !description.is_empty()),
            due_date: value.due_date,
            priority: value.priority.into(),
            category,
        })
    }
}

/// DTO for changing some of a task's fields. Omitted fields stay as they are, and an
/// empty description clears it.
#[derive(Debug, Deserialize, Validate, ToSchema, Default)]
#[cfg_attr(test, derive(Serialize))]
pub struct UpdateTask {
    #[validate(length(min = 1))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    pub custom_category: Option<String>,
}

impl TryFrom<UpdateTask> for domain::task::UpdateTask {
    type Error = ValidationErrors;

    fn try_from(value: UpdateTask) -> Result<Self, Self::Error> {
        let category = value
            .category
            .map(|choice| domain::task::resolve_category(&choice, value.custom_category.as_deref()))
            .transpose()?;

        Ok(domain::task::UpdateTask {
            title: value.title,
            description: value.description,
            due_date: value.due_date,
            priority: value.priority.map(domain::task::Priority::from),
            category,
        })
    }
}

/// DTO for a newly created task
#[derive(Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize, Debug))]
pub struct InsertedTask {
    pub id: Uuid,
}

#[derive(Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize, Debug))]
pub struct ToggleResponse {
    pub is_completed: bool,
}

/// Selects the day a list is built for, as seen by the caller
#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct DayQuery {
    /// Calendar day in the caller's time zone. Defaults to today.
    pub date: Option<NaiveDate>,
    /// The caller's offset from UTC, e.g. -300 for UTC-5
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl DayQuery {
    pub fn offset(&self) -> Result<FixedOffset, ValidationErrors> {
        super::utc_offset(self.utc_offset_minutes)
    }

    /// The requested day, or the caller's current day when none was given
    pub fn day_or_today(&self, offset: FixedOffset, now: DateTime<Utc>) -> NaiveDate {
        self.date
            .unwrap_or_else(|| task_list::calendar_day(now, offset))
    }
}

#[derive(Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SummaryView {
    Weekly,
    Monthly,
}

/// Selects which time summary to build. The fields of [DayQuery] are repeated here because
/// query strings can't carry flattened structs.
#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct SummaryQuery {
    pub view: SummaryView,
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl SummaryQuery {
    pub fn day_query(&self) -> DayQuery {
        DayQuery {
            date: self.date,
            utc_offset_minutes: self.utc_offset_minutes,
        }
    }
}

/// Dashboard figures across all of a user's tasks
#[derive(Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize, Debug))]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    /// Seconds logged across every task
    pub time_spent: i64,
    /// Incomplete tasks due on the requested day
    pub due_today: usize,
}

impl From<task_list::Progress> for Progress {
    fn from(value: task_list::Progress) -> Self {
        Progress {
            total: value.total,
            completed: value.completed,
            time_spent: value.time_spent,
            due_today: value.due_today,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize, Debug))]
pub struct TimeBucket {
    #[schema(example = "Mon")]
    pub label: String,
    pub total_seconds: i64,
}

impl From<task_list::TimeBucket> for TimeBucket {
    fn from(value: task_list::TimeBucket) -> Self {
        TimeBucket {
            label: value.label,
            total_seconds: value.total_seconds,
        }
    }
}

/// Moves one task to a new position within a day's list
#[derive(Deserialize, ToSchema)]
#[cfg_attr(test, derive(Serialize))]
pub struct ReorderRequest {
    pub task_id: Uuid,
    /// Zero-based position in the day's displayed list. Positions past the end mean "last".
    pub to_index: usize,
    pub date: NaiveDate,
    #[serde(default)]
    pub utc_offset_minutes: i32,
}
