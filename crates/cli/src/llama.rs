//! Blocking HTTP backend for a locally served model.
//!
//! Speaks either the llama.cpp server's native `/completion` endpoint or an
//! OpenAI-compatible `/v1/completions` endpoint.

use std::time::Duration;

use clap::ValueEnum;
use gutenberg_distill_core::{InferenceError, SamplingParams, TextGenerator};
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};

/// Wire protocol of the completion server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompletionApi {
    /// llama.cpp server `POST /completion`
    Llamacpp,
    /// OpenAI-compatible `POST /v1/completions`
    Openai,
}

#[derive(Serialize)]
struct LlamaRequest<'a> {
    prompt: &'a str,
    temperature: f32,
    n_predict: usize,
    stop: &'a [String],
    cache_prompt: bool,
}

#[derive(Deserialize)]
struct LlamaResponse {
    content: String,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    prompt: &'a str,
    temperature: f32,
    max_tokens: usize,
    #[serde(skip_serializing_if = "no_stops")]
    stop: &'a [String],
}

fn no_stops(stop: &&[String]) -> bool {
    stop.is_empty()
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    text: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Message { message: String },
    Text(String),
}

/// Completion client for a llama.cpp or OpenAI-compatible server.
pub struct HttpGenerator {
    client: HttpClient,
    api: CompletionApi,
    base_url: String,
    model: Option<String>,
    timeout: Duration,
}

impl HttpGenerator {
    pub fn new(base_url: &str, api: CompletionApi, model: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout,
        })
    }

    fn url(&self) -> String {
        match self.api {
            CompletionApi::Llamacpp => format!("{}/completion", self.base_url),
            CompletionApi::Openai => format!("{}/v1/completions", self.base_url),
        }
    }

    fn request_body(&self, prompt: &str, params: &SamplingParams) -> Result<serde_json::Value, InferenceError> {
        let body = match self.api {
            CompletionApi::Llamacpp => serde_json::to_value(LlamaRequest {
                prompt,
                temperature: params.temperature,
                n_predict: params.max_tokens,
                stop: &params.stop,
                cache_prompt: true,
            }),
            CompletionApi::Openai => serde_json::to_value(OpenAiRequest {
                model: self.model.as_deref(),
                prompt,
                temperature: params.temperature,
                max_tokens: params.max_tokens,
                stop: &params.stop,
            }),
        };
        body.map_err(|e| InferenceError::MalformedResponse(e.to_string()))
    }

    fn transport_error(&self, err: reqwest::Error) -> InferenceError {
        if err.is_timeout() {
            InferenceError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            InferenceError::Transport(err.to_string())
        }
    }
}

impl TextGenerator for HttpGenerator {
    fn complete(&self, prompt: &str, params: &SamplingParams) -> Result<String, InferenceError> {
        let body = self.request_body(prompt, params)?;
        let response = self
            .client
            .post(self.url())
            .json(&body)
            .send()
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(InferenceError::Rejected {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }
        completion_text(self.api, &text)
    }
}

/// Pull the generated text out of a successful response body.
fn completion_text(api: CompletionApi, body: &str) -> Result<String, InferenceError> {
    let malformed = |e: serde_json::Error| InferenceError::MalformedResponse(e.to_string());
    match api {
        CompletionApi::Llamacpp => Ok(serde_json::from_str::<LlamaResponse>(body).map_err(malformed)?.content),
        CompletionApi::Openai => serde_json::from_str::<OpenAiResponse>(body)
            .map_err(malformed)?
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| InferenceError::MalformedResponse("response has no choices".to_string())),
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse {
            error: ErrorBody::Message { message },
        }) => message,
        Ok(ErrorResponse {
            error: ErrorBody::Text(message),
        }) => message,
        Err(_) if body.trim().is_empty() => "unknown error".to_string(),
        Err(_) => body.trim().to_string(),
    }
}
