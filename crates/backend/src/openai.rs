// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! OpenAI-compatible provider client.

use base64::Engine as _;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::{BackendError, BackendErrorKind, CompletionBackend, Message};

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiBackend {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiBackend {
    /// Build a client from `OPENAI_API_KEY`, required for any generation.
    pub fn from_env() -> Result<Self, BackendError> {
        let api_key = std::env::var(ENV_API_KEY).map_err(|_| {
            BackendError::new(
                BackendErrorKind::MissingApiKey,
                format!("{ENV_API_KEY} environment variable is required"),
            )
        })?;
        Self::with_key(api_key, DEFAULT_TIMEOUT)
    }

    pub fn with_key(api_key: String, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::new(BackendErrorKind::Http, e.to_string()))?;
        Ok(OpenAiBackend {
            client,
            api_key,
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        })
    }

    fn post(&self, endpoint: &str, body: &Value) -> Result<Value, BackendError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);
        debug!(%url, "backend_request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .map_err(|e| BackendError::new(BackendErrorKind::Http, e.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .map_err(|e| BackendError::new(BackendErrorKind::Http, e.to_string()))?;
        if !status.is_success() {
            let message = payload["error"]["message"]
                .as_str()
                .unwrap_or("provider returned an error")
                .to_string();
            return Err(
                BackendError::new(BackendErrorKind::Api, message).with_status(status.as_u16())
            );
        }
        Ok(payload)
    }
}

impl CompletionBackend for OpenAiBackend {
    fn chat(
        &self,
        model: &str,
        messages: &[Message],
        schema_name: &str,
        schema: &Value,
    ) -> Result<Value, BackendError> {
        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": 0.2,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema_name,
                    "schema": schema,
                    "strict": true,
                },
            },
        });
        let payload = self.post("chat/completions", &body)?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                BackendError::new(
                    BackendErrorKind::Schema,
                    "chat response carried no message content",
                )
            })?;
        serde_json::from_str(content).map_err(|e| {
            BackendError::new(
                BackendErrorKind::Schema,
                format!("chat response is not valid JSON: {e}"),
            )
        })
    }

    fn image(
        &self,
        model: &str,
        prompt: &str,
        size: &str,
        quality: &str,
    ) -> Result<Vec<u8>, BackendError> {
        let body = json!({
            "model": model,
            "prompt": prompt,
            "size": size,
            "quality": quality,
            "response_format": "b64_json",
            "n": 1,
        });
        let payload = self.post("images/generations", &body)?;
        let b64 = payload["data"][0]["b64_json"].as_str().ok_or_else(|| {
            BackendError::new(
                BackendErrorKind::Schema,
                "image response carried no b64_json data",
            )
        })?;
        base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| {
                BackendError::new(
                    BackendErrorKind::Schema,
                    format!("image payload is not valid base64: {e}"),
                )
            })
    }
}
