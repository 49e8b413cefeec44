use crate::domain::suggestion::driven_ports::PrioritySuggester;
use crate::domain::suggestion::{PrioritySuggestion, SuggestionRequest};
use crate::domain::task::Priority;
use crate::external_connections::ExternalConnectivity;
use anyhow::{Context, anyhow, bail};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Asks a Gemini model to judge task urgency through the `generateContent` REST endpoint
pub struct GeminiSuggester {
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Shape the model is told to answer in
#[derive(Deserialize)]
struct ModelAnswer {
    priority: String,
    reason: String,
}

fn prompt(request: &SuggestionRequest) -> String {
    format!(
        "You are a task prioritization expert. Analyze the task description and deadline to suggest a \
         priority (high, medium, or low) and provide a brief reason for your suggestion.\n\n\
         Task Description: {}\n\
         Deadline: {}\n\n\
         Respond with a priority (high, medium, or low) and a reason.",
        request.description,
        request.deadline_text()
    )
}

fn request_body(request: &SuggestionRequest) -> serde_json::Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt(request) }]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "priority": { "type": "STRING", "enum": ["high", "medium", "low"] },
                    "reason": { "type": "STRING" }
                },
                "required": ["priority", "reason"]
            }
        }
    })
}

fn parse_answer(response: GenerateResponse) -> Result<PrioritySuggestion, anyhow::Error> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content.parts.into_iter().next())
        .map(|part| part.text)
        .ok_or_else(|| anyhow!("model returned no candidates"))?;

    let answer: ModelAnswer = serde_json::from_str(text.trim()).context("model answer was not the requested JSON")?;
    let Some(priority) = Priority::from_label(&answer.priority) else {
        bail!("model suggested an unknown priority {:?}", answer.priority);
    };

    Ok(PrioritySuggestion {
        priority,
        reason: answer.reason.trim().to_owned(),
    })
}

impl GeminiSuggester {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> GeminiSuggester {
        GeminiSuggester {
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            model: model.to_owned(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }
}

impl PrioritySuggester for GeminiSuggester {
    #[tracing::instrument(skip_all, fields(model = %self.model))]
    async fn suggest(
        &self,
        request: &SuggestionRequest,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<PrioritySuggestion, anyhow::Error> {
        let response = ext_cxn
            .http_client()
            .post(self.endpoint())
            .json(&request_body(request))
            .send()
            .await
            .context("calling the suggestion model")?
            .error_for_status()
            .context("suggestion model returned an error status")?;

        let generated: GenerateResponse = response.json().await.context("reading the model response")?;
        let suggestion = parse_answer(generated)?;
        debug!("Model suggested {} priority", suggestion.priority.label());

        Ok(suggestion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn generated(text: &str) -> GenerateResponse {
        serde_json::from_value(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        }))
        .unwrap()
    }

    #[test]
    fn prompt_carries_description_and_deadline() {
        let text = prompt(&SuggestionRequest {
            description: "File taxes before penalties".to_owned(),
            deadline: NaiveDate::from_ymd_opt(2026, 4, 15).unwrap(),
        });

        assert!(text.starts_with("You are a task prioritization expert."));
        assert!(text.contains("Task Description: File taxes before penalties\n"));
        assert!(text.contains("Deadline: 2026-04-15\n"));
    }

    #[test]
    fn endpoint_names_model() {
        let suggester = GeminiSuggester::new(
            "https://generativelanguage.googleapis.com/v1beta/",
            "key123",
            "gemini-2.0-flash",
        );

        assert_eq!(
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent?key=key123",
            suggester.endpoint()
        );
    }

    #[test]
    fn parses_json_answer() {
        let suggestion = parse_answer(generated(r#"{"priority": "High", "reason": " Due tomorrow. "}"#)).unwrap();

        assert_eq!(
            PrioritySuggestion {
                priority: Priority::High,
                reason: "Due tomorrow.".to_owned(),
            },
            suggestion
        );
    }

    #[test]
    fn rejects_unusable_answers() {
        assert!(parse_answer(generated(r#"{"priority": "urgent", "reason": "now"}"#)).is_err());
        assert!(parse_answer(generated("high, because it is due soon")).is_err());
        assert!(parse_answer(serde_json::from_value(json!({})).unwrap()).is_err());
    }
}
