use crate::config::LlmConfig;
use crate::llm::models::{parse_generation_response, GeneratedQuery};
use crate::llm::{LlmError, SqlGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Provider for OpenAI-compatible chat-completion endpoints.
pub struct RemoteLlmProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl RemoteLlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config.api_url.clone().ok_or_else(|| {
            LlmError::ConfigError("API URL is required for remote LLM provider".to_string())
        })?;

        let api_key = config.api_key.clone().ok_or_else(|| {
            LlmError::ConfigError("API key is required for remote LLM provider".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model: config.model.clone(),
        })
    }

    fn system_prompt(&self, schema: &str) -> String {
        format!(
            r#"You are a SQL expert that generates DuckDB SQL queries based on user questions.
Use the following schema information to create your queries:

{}

Follow these rules:
1. Generate standard DuckDB SQL that runs without modification.
2. Use only the tables and columns provided in the schema.
3. Use table aliases to prevent ambiguity. For example, `SELECT t1.col1, t2.col1 FROM table1 t1 JOIN table2 t2 ON t1.id = t2.id`.
4. When creating a ratio, always cast the numerator as float.
5. For questions about trends over time, include the relevant date or time column.
6. If no query can answer the question, explain why and leave the query empty.
7. Respond with a JSON object containing two fields: 'query' with the SQL query and 'explanation' with a brief explanation of the query."#,
            schema
        )
    }
}

#[async_trait]
impl SqlGenerator for RemoteLlmProvider {
    async fn generate_query(
        &self,
        question: &str,
        schema: &str,
    ) -> Result<GeneratedQuery, LlmError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: self.system_prompt(schema),
                },
                Message {
                    role: "user".to_string(),
                    content: question.to_string(),
                },
            ],
            temperature: 0.1,
            max_tokens: 1500,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::ResponseError(format!(
                "API responded with status code: {}",
                response.status()
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseError(e.to_string()))?;

        if chat_response.choices.is_empty() {
            return Err(LlmError::ResponseError("No choices in response".to_string()));
        }

        let content = &chat_response.choices[0].message.content;
        debug!("Remote completion: {}", content);

        Ok(parse_generation_response(content))
    }
}
