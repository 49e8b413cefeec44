use crate::domain;
use crate::dto::task::Priority;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The parts of a task draft the priority suggester looks at
#[derive(Deserialize, ToSchema)]
#[cfg_attr(test, derive(Serialize))]
pub struct SuggestionRequest {
    #[serde(default)]
    #[schema(example = "File taxes")]
    pub title: String,
    pub description: Option<String>,
    pub deadline: NaiveDate,
}

impl From<SuggestionRequest> for domain::suggestion::TaskDraft {
    fn from(value: SuggestionRequest) -> Self {
        domain::suggestion::TaskDraft {
            title: value.title,
            description: value.description,
            deadline: value.deadline,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize, Debug))]
pub struct PrioritySuggestion {
    pub priority: Priority,
    #[schema(example = "The deadline is tomorrow and penalties apply.")]
    pub reason: String,
}

impl From<domain::suggestion::PrioritySuggestion> for PrioritySuggestion {
    fn from(value: domain::suggestion::PrioritySuggestion) -> Self {
        PrioritySuggestion {
            priority: value.priority.into(),
            reason: value.reason,
        }
    }
}
