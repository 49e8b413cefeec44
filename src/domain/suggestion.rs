use crate::domain::field_error;
use crate::domain::suggestion::driven_ports::PrioritySuggester;
use crate::domain::suggestion::driving_ports::SuggestionError;
use crate::domain::task::Priority;
use crate::external_connections::ExternalConnectivity;
use chrono::NaiveDate;
use tracing::error;

/// What the user has typed so far for a task they're about to create
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub deadline: NaiveDate,
}

/// The content handed to the suggester
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct SuggestionRequest {
    pub description: String,
    pub deadline: NaiveDate,
}

impl SuggestionRequest {
    /// The deadline in the `YYYY-MM-DD` form suggesters are given
    pub fn deadline_text(&self) -> String {
        self.deadline.format("%Y-%m-%d").to_string()
    }
}

impl TryFrom<&TaskDraft> for SuggestionRequest {
    type Error = validator::ValidationErrors;

    fn try_from(draft: &TaskDraft) -> Result<Self, Self::Error> {
        let description = format!(
            "{} {}",
            draft.title,
            draft.description.as_deref().unwrap_or_default()
        )
        .trim()
        .to_owned();
        if description.is_empty() {
            return Err(field_error(
                "title",
                "required",
                "Please enter a title or description first.",
            ));
        }

        Ok(SuggestionRequest {
            description,
            deadline: draft.deadline,
        })
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct PrioritySuggestion {
    pub priority: Priority,
    pub reason: String,
}

pub mod driven_ports {
    use super::*;

    /// Something that can judge how urgent a task is, typically a language model
    pub trait PrioritySuggester {
        async fn suggest(
            &self,
            request: &SuggestionRequest,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<PrioritySuggestion, anyhow::Error>;
    }
}

pub mod driving_ports {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum SuggestionError {
        #[error("suggestion input was invalid: {0}")]
        Invalid(#[from] validator::ValidationErrors),
        #[error("the suggester failed: {0}")]
        Failed(#[from] anyhow::Error),
    }

    #[cfg(test)]
    #[allow(clippy::items_after_test_module)]
    mod suggestion_error_clone {
        use super::SuggestionError;
        use anyhow::anyhow;

        impl Clone for SuggestionError {
            fn clone(&self) -> Self {
                match self {
                    Self::Invalid(errors) => Self::Invalid(errors.clone()),
                    Self::Failed(err) => Self::Failed(anyhow!(format!("{}", err))),
                }
            }
        }
    }

    pub trait SuggestionPort {
        async fn suggest_priority(
            &self,
            draft: &TaskDraft,
            ext_cxn: &mut impl ExternalConnectivity,
            suggester: &impl PrioritySuggester,
        ) -> Result<PrioritySuggestion, SuggestionError>;
    }
}

pub struct SuggestionService {}

impl driving_ports::SuggestionPort for SuggestionService {
    async fn suggest_priority(
        &self,
        draft: &TaskDraft,
        ext_cxn: &mut impl ExternalConnectivity,
        suggester: &impl PrioritySuggester,
    ) -> Result<PrioritySuggestion, SuggestionError> {
        let request = SuggestionRequest::try_from(draft)?;

        match suggester.suggest(&request, &mut *ext_cxn).await {
            Ok(suggestion) => Ok(suggestion),
            Err(err) => {
                error!("Priority suggestion failed: {err:#}");
                Err(SuggestionError::Failed(err))
            }
        }
    }
}
