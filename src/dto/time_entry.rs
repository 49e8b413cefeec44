use crate::domain;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::ValidationErrors;

/// One recorded interval of work on a task
#[derive(Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize, Debug))]
pub struct TimeEntry {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Whole seconds between start and end
    #[schema(example = 1800)]
    pub duration: i64,
}

impl From<domain::task::TimeEntry> for TimeEntry {
    fn from(value: domain::task::TimeEntry) -> Self {
        TimeEntry {
            id: value.id,
            start_time: value.start_time,
            end_time: value.end_time,
            duration: value.duration,
        }
    }
}

/// DTO for logging time by hand
#[derive(Deserialize, ToSchema)]
#[cfg_attr(test, derive(Serialize))]
pub struct NewTimeEntry {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// The caller's offset from UTC, which decides which calendar day the interval is on
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl NewTimeEntry {
    pub fn offset(&self) -> Result<FixedOffset, ValidationErrors> {
        super::utc_offset(self.utc_offset_minutes)
    }
}

impl From<NewTimeEntry> for domain::time_entry::NewTimeEntry {
    fn from(value: NewTimeEntry) -> Self {
        domain::time_entry::NewTimeEntry {
            start_time: value.start_time,
            end_time: value.end_time,
        }
    }
}

/// DTO for moving either end of an existing entry
#[derive(Deserialize, ToSchema, Default)]
#[cfg_attr(test, derive(Serialize))]
pub struct UpdateTimeEntry {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl UpdateTimeEntry {
    pub fn offset(&self) -> Result<FixedOffset, ValidationErrors> {
        super::utc_offset(self.utc_offset_minutes)
    }
}

impl From<UpdateTimeEntry> for domain::time_entry::TimeEntryUpdate {
    fn from(value: UpdateTimeEntry) -> Self {
        domain::time_entry::TimeEntryUpdate {
            start_time: value.start_time,
            end_time: value.end_time,
        }
    }
}
