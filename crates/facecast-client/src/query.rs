//! Question answering against the query service, plus the chat transcript
//! kept by the interactive front end.

use crate::{post_json, ClientError};
use serde::{Deserialize, Serialize};

const FETCH_FAILED: &str = "Failed to fetch answer.";

#[derive(Serialize)]
struct QueryRequest<'a> {
    question: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    suggestions: Option<Vec<String>>,
    #[serde(default)]
    error: Option<String>,
}

/// The service's reply, by which key it carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Answer(String),
    Suggestions(Vec<String>),
    Error(String),
    NoResponse,
}

impl Reply {
    /// Text shown to the user.
    pub fn render(&self) -> String {
        match self {
            Reply::Answer(answer) => answer.clone(),
            Reply::Suggestions(s) => format!("Did you mean: {}?", s.join(", ")),
            Reply::Error(error) => format!("Error: {error}"),
            Reply::NoResponse => "No response received.".to_string(),
        }
    }
}

impl From<QueryResponse> for Reply {
    fn from(r: QueryResponse) -> Self {
        let non_empty = |s: Option<String>| s.filter(|s| !s.is_empty());
        if let Some(answer) = non_empty(r.answer) {
            Reply::Answer(answer)
        } else if let Some(suggestions) = r.suggestions {
            Reply::Suggestions(suggestions)
        } else if let Some(error) = non_empty(r.error) {
            Reply::Error(error)
        } else {
            Reply::NoResponse
        }
    }
}

pub struct QueryClient {
    client: reqwest::Client,
    url: String,
}

impl QueryClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub async fn ask(&self, question: &str) -> Result<Reply, ClientError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ClientError::InvalidInput("question must not be empty"));
        }
        let response: QueryResponse = post_json(&self.client, &self.url, &QueryRequest { question }).await?;
        Ok(response.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    You,
    Ai,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Speaker::You => "You",
            Speaker::Ai => "AI",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub speaker: Speaker,
    pub text: String,
}

/// Ordered transcript of a chat session.
#[derive(Debug, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Ask `question` and record both sides of the exchange.
    ///
    /// Blank questions are rejected without touching the transcript.
    /// Transport failures become an AI message rather than an error.
    pub async fn exchange(&mut self, client: &QueryClient, question: &str) -> Result<&ChatMessage, ClientError> {
        let text = match client.ask(question).await {
            Ok(reply) => reply.render(),
            Err(e @ ClientError::InvalidInput(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "query failed");
                FETCH_FAILED.to_string()
            }
        };
        self.messages.push(ChatMessage {
            speaker: Speaker::You,
            text: question.trim().to_string(),
        });
        self.messages.push(ChatMessage {
            speaker: Speaker::Ai,
            text,
        });
        Ok(&self.messages[self.messages.len() - 1])
    }
}
