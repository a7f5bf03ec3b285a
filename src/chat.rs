//! Question answering over the performance data through a hosted
//! chat-completion API (OpenAI-compatible `/chat/completions`).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ChatSettings;
use crate::error::AppError;
use crate::performance::{self, PerformanceRecord};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct ChatClient {
    client: Client,
    settings: ChatSettings,
    api_key: String,
}

/// System prompt followed by the whole dataset as CSV.
pub fn build_system_prompt(
    instructions: &str,
    records: &[PerformanceRecord],
) -> Result<String, AppError> {
    let data = performance::to_csv_text(records)?;
    Ok(format!(
        "{}\n\nPerformance data (CSV):\n{}",
        instructions.trim_end(),
        data
    ))
}

fn endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

impl ChatClient {
    pub fn new(settings: ChatSettings) -> Result<Self, AppError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "chat api key is not configured; set {}",
                    crate::config::CHAT_API_KEY_ENV
                ))
            })?;
        let client = Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self {
            client,
            settings,
            api_key,
        })
    }

    /// One request per question; failures are returned, not retried.
    pub async fn ask(
        &self,
        question: &str,
        records: &[PerformanceRecord],
    ) -> Result<String, AppError> {
        if question.trim().is_empty() {
            return Err(AppError::InvalidInput("question cannot be empty".to_string()));
        }
        let system = build_system_prompt(&self.settings.system_prompt, records)?;
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: question,
                },
            ],
        };

        debug!(
            model = %self.settings.model,
            prompt_len = system.len(),
            rows = records.len(),
            "sending chat request"
        );
        let response = self
            .client
            .post(endpoint(&self.settings.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Chat(format!("HTTP {status}: {body}")));
        }

        let parsed: ChatResponse = response.json().await?;
        let answer = extract_answer(parsed)?;
        info!(answer_len = answer.len(), "chat answer received");
        Ok(answer)
    }
}

fn extract_answer(response: ChatResponse) -> Result<String, AppError> {
    response
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| AppError::Chat("response contained no answer".to_string()))
}
