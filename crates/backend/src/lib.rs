// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Completion backend adapter.
//!
//! A thin capability seam over an external chat/completion provider: `chat`
//! returns an object conforming to a supplied JSON Schema, `image` returns
//! raw bytes. Both entry points consult the cache before touching the
//! provider and store successful responses.

pub mod models;
mod openai;

pub use openai::{OpenAiBackend, ENV_API_KEY};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::error::Error as StdError;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    MissingApiKey,
    /// Transport failure (connect, TLS, timeout).
    Http,
    /// The provider answered with an error payload.
    Api,
    /// The provider answered, but not in the promised shape.
    Schema,
}

#[derive(Debug, Clone)]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        BackendError {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "backend failed ({:?}): {}", self.kind, self.message)?;
        if let Some(status) = self.status {
            write!(f, " (http {status})")?;
        }
        Ok(())
    }
}

impl StdError for BackendError {}

/// One chat message. Roles are the provider's `system`/`user` strings.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// The provider seam. Implementations perform the raw call; caching lives in
/// the free functions below so every implementation gets it.
pub trait CompletionBackend: Send + Sync {
    fn chat(
        &self,
        model: &str,
        messages: &[Message],
        schema_name: &str,
        schema: &Value,
    ) -> Result<Value, BackendError>;

    fn image(
        &self,
        model: &str,
        prompt: &str,
        size: &str,
        quality: &str,
    ) -> Result<Vec<u8>, BackendError>;
}

/// Cache-through chat call.
pub fn chat(
    backend: &dyn CompletionBackend,
    model: &str,
    messages: &[Message],
    schema_name: &str,
    schema: &Value,
) -> Result<Value, BackendError> {
    let request = json!({
        "type": "chat",
        "model": model,
        "messages": messages,
        "schema": schema,
    });
    if let Some(hit) = touchfs_cache::get(&request) {
        return Ok(hit);
    }
    let response = backend.chat(model, messages, schema_name, schema)?;
    touchfs_cache::put(&request, &response);
    Ok(response)
}

/// Cache-through chat call parsed into a typed response model.
pub fn chat_parsed<T>(
    backend: &dyn CompletionBackend,
    model: &str,
    messages: &[Message],
    schema_name: &str,
) -> Result<T, BackendError>
where
    T: DeserializeOwned + schemars::JsonSchema,
{
    let schema = schemars::gen::SchemaGenerator::default().into_root_schema_for::<T>();
    let schema = serde_json::to_value(schema)
        .map_err(|e| BackendError::new(BackendErrorKind::Schema, e.to_string()))?;
    let value = chat(backend, model, messages, schema_name, &schema)?;
    serde_json::from_value(value).map_err(|e| {
        BackendError::new(
            BackendErrorKind::Schema,
            format!("response does not match {schema_name}: {e}"),
        )
    })
}

/// Cache-through image call. Bytes are cached base64-encoded.
pub fn image(
    backend: &dyn CompletionBackend,
    model: &str,
    prompt: &str,
    size: &str,
    quality: &str,
) -> Result<Vec<u8>, BackendError> {
    use base64::Engine as _;
    let engine = base64::engine::general_purpose::STANDARD;

    let request = json!({
        "type": "image",
        "model": model,
        "prompt": prompt,
        "size": size,
        "quality": quality,
    });
    if let Some(hit) = touchfs_cache::get(&request) {
        if let Some(b64) = hit.as_str() {
            if let Ok(bytes) = engine.decode(b64) {
                return Ok(bytes);
            }
            debug!("cached_image_payload_unreadable");
        }
    }
    let bytes = backend.image(model, prompt, size, quality)?;
    touchfs_cache::put(&request, &Value::String(engine.encode(&bytes)));
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::GeneratedContent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        calls: AtomicUsize,
    }

    impl CompletionBackend for CountingBackend {
        fn chat(
            &self,
            _model: &str,
            _messages: &[Message],
            _schema_name: &str,
            _schema: &Value,
        ) -> Result<Value, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"content": "generated"}))
        }

        fn image(
            &self,
            _model: &str,
            _prompt: &str,
            _size: &str,
            _quality: &str,
        ) -> Result<Vec<u8>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0xFF, 0xD8, 0xFF])
        }
    }

    fn with_temp_cache<R>(f: impl FnOnce() -> R) -> R {
        // Tests share the cache env var; serialize them.
        static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
        let _guard = LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let prev = std::env::var_os(touchfs_cache::ENV_CACHE_FOLDER);
        std::env::set_var(touchfs_cache::ENV_CACHE_FOLDER, dir.path());
        touchfs_cache::stats::set_enabled(true);
        let out = f();
        match prev {
            Some(v) => std::env::set_var(touchfs_cache::ENV_CACHE_FOLDER, v),
            None => std::env::remove_var(touchfs_cache::ENV_CACHE_FOLDER),
        }
        out
    }

    #[test]
    fn second_chat_is_served_from_cache() {
        with_temp_cache(|| {
            let backend = CountingBackend {
                calls: AtomicUsize::new(0),
            };
            let messages = [Message::system("s"), Message::user("u")];
            let a: GeneratedContent =
                chat_parsed(&backend, "gpt-4o", &messages, "generated_content").unwrap();
            let b: GeneratedContent =
                chat_parsed(&backend, "gpt-4o", &messages, "generated_content").unwrap();
            assert_eq!(a.content, b.content);
            assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn image_bytes_survive_the_cache_roundtrip() {
        with_temp_cache(|| {
            let backend = CountingBackend {
                calls: AtomicUsize::new(0),
            };
            let a = image(&backend, "dall-e-3", "a red square", "1024x1024", "standard").unwrap();
            let b = image(&backend, "dall-e-3", "a red square", "1024x1024", "standard").unwrap();
            assert_eq!(a, b);
            assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        });
    }
}
