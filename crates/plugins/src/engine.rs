// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Generation engine.
//!
//! Orchestrates one logical generation: resolve configuration, consult the
//! fingerprint cache, dispatch the plugin, store the result. Generations
//! for a single path are serialized end-to-end through a per-path slot;
//! distinct paths proceed in parallel.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use touchfs_backend::{BackendError, CompletionBackend};
use touchfs_config::ConfigError;
use touchfs_context::{ContextBuilder, DEFAULT_MAX_TOKENS};
use touchfs_store::{normalize, Content, Node, NodeStore, XATTR_GENERATE_CONTENT};

use crate::{is_proc_path, Generated, PluginEnv, Registry};

#[derive(Debug)]
pub enum GenerateError {
    /// Path vanished between the trigger and the generation.
    Missing(String),
    /// No registered plugin accepts the path.
    NoGenerator(String),
    /// Malformed `.prompt`/`.model` file.
    Config(ConfigError),
    /// The completion backend failed.
    Backend(BackendError),
    /// The pipeline failed downstream of the backend.
    Output(String),
}

impl GenerateError {
    pub fn errno(&self) -> i32 {
        match self {
            GenerateError::Missing(_) => libc::ENOENT,
            _ => libc::EIO,
        }
    }
}

impl fmt::Display for GenerateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerateError::Missing(path) => write!(f, "no such path: {path}"),
            GenerateError::NoGenerator(path) => {
                write!(f, "no generator accepts {path}")
            }
            GenerateError::Config(e) => write!(f, "{e}"),
            GenerateError::Backend(e) => write!(f, "{e}"),
            GenerateError::Output(msg) => f.write_str(msg),
        }
    }
}

impl StdError for GenerateError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            GenerateError::Config(e) => Some(e),
            GenerateError::Backend(e) => Some(e),
            _ => None,
        }
    }
}

/// True when a stat/open of this node must trigger generation first.
///
/// Proc overlay files regenerate on every read; ordinary files generate only
/// while empty and tagged (one-shot via `generate_content`, or pinned via
/// `generator`).
pub fn needs_generation(path: &str, node: &Node) -> bool {
    if !node.is_file() {
        return false;
    }
    if is_proc_path(path) && node.generator().is_some() {
        return true;
    }
    (node.wants_generation() || node.generator().is_some()) && node.size() == 0
}

pub struct Engine {
    registry: Registry,
    backend: Arc<dyn CompletionBackend>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Engine {
    pub fn new(registry: Registry, backend: Arc<dyn CompletionBackend>) -> Self {
        Engine {
            registry,
            backend,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn slot_for(&self, path: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        locks.entry(path.to_string()).or_default().clone()
    }

    /// Run one serialized generation for `path` and return the resulting
    /// content. Concurrent requesters for the same path block on the slot
    /// and then observe the already-written result.
    pub fn generate(&self, store: &NodeStore, path: &str) -> Result<Content, GenerateError> {
        let path = normalize(path);
        let slot = self.slot_for(&path);
        let _guard = slot.lock().unwrap_or_else(|e| e.into_inner());

        let node = store
            .find(&path)
            .ok_or_else(|| GenerateError::Missing(path.clone()))?;
        if !node.is_file() {
            return Err(GenerateError::Output(format!("{path} is not a file")));
        }

        // A concurrent requester may have finished while we waited.
        if !needs_generation(&path, &node) {
            if let Some(content) = node.content() {
                return Ok(content.clone());
            }
        }

        let proc = is_proc_path(&path);
        let plugin = self
            .registry
            .dispatch(&path, &node)
            .ok_or_else(|| GenerateError::NoGenerator(path.clone()))?;

        // Proc overlays bypass the outer memoization entirely: their whole
        // point is to re-run on every read.
        let fingerprint = if proc {
            None
        } else {
            Some(self.fingerprint(store, &path)?)
        };

        if let Some(fp) = &fingerprint {
            if let Some(hit) = touchfs_cache::get(fp) {
                if let Some(generated) = response_to_generated(&hit) {
                    debug!(%path, "generation_cache_hit");
                    return self.commit(store, &path, proc, generated);
                }
                warn!(%path, "generation_cache_entry_malformed");
            }
        }

        let env = PluginEnv {
            store,
            backend: self.backend.as_ref(),
        };
        debug!(%path, plugin = plugin.name(), "generation_start");
        let generated = plugin
            .generate(&env, &path, &node)
            .map_err(classify_error)?;
        if generated.is_empty() && !proc {
            return Err(GenerateError::Output(format!(
                "generator '{}' produced no content for {path}",
                plugin.name()
            )));
        }

        if let Some(fp) = &fingerprint {
            touchfs_cache::put(fp, &generated_to_response(&generated));
        }
        self.commit(store, &path, proc, generated)
    }

    /// Outer fingerprint: everything that determines a file's content.
    fn fingerprint(&self, store: &NodeStore, path: &str) -> Result<Value, GenerateError> {
        let overlay = touchfs_config::overlay_root();
        let prompt = touchfs_config::resolve_prompt(store, path, overlay.as_deref())
            .map_err(GenerateError::Config)?;
        let model = touchfs_config::resolve_model(store, path, overlay.as_deref())
            .map_err(GenerateError::Config)?;

        let blob = context_from_store(store, path);
        let mut hasher = Sha256::new();
        hasher.update(blob.as_bytes());
        let context_digest = format!("{:x}", hasher.finalize());

        Ok(json!({
            "type": "file_content",
            "path": path,
            "prompt": prompt,
            "model": model,
            "context_digest": context_digest,
            "structure_view": store.serialize_public(),
        }))
    }

    /// Write the result into the node. One-shot files lose their
    /// `generate_content` tag; proc overlays keep their xattrs.
    fn commit(
        &self,
        store: &NodeStore,
        path: &str,
        proc: bool,
        generated: Generated,
    ) -> Result<Content, GenerateError> {
        let content = generated.into_content();
        store
            .update(path, |node| {
                node.set_content(content.clone());
                if !proc {
                    node.xattrs.remove(XATTR_GENERATE_CONTENT);
                }
            })
            .map_err(|_| GenerateError::Missing(path.to_string()))?;
        debug!(%path, bytes = content.len(), "generation_done");
        Ok(content)
    }
}

/// Context blob: surrounding text files, token-bounded. Iteration stops at
/// the first file past the budget.
fn context_from_store(store: &NodeStore, subject: &str) -> String {
    let Ok(mut builder) = ContextBuilder::new(DEFAULT_MAX_TOKENS) else {
        return String::new();
    };
    for path in store.paths() {
        if path == subject || is_proc_path(&path) {
            continue;
        }
        let body = store.with_node(&path, |node| match node.content() {
            Some(Content::Text(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        });
        if let Some(Some(body)) = body {
            if !builder.add_file(path.trim_start_matches('/'), body.as_bytes()) {
                break;
            }
        }
    }
    builder.build()
}

fn classify_error(err: anyhow::Error) -> GenerateError {
    for cause in err.chain() {
        if let Some(backend) = cause.downcast_ref::<BackendError>() {
            return GenerateError::Backend(backend.clone());
        }
        if let Some(config) = cause.downcast_ref::<ConfigError>() {
            return GenerateError::Config(config.clone());
        }
    }
    GenerateError::Output(format!("{err:#}"))
}

fn generated_to_response(generated: &Generated) -> Value {
    use base64::Engine as _;
    match generated {
        Generated::Text(s) => json!({ "content": s }),
        Generated::Bytes(b) => json!({
            "content_b64": base64::engine::general_purpose::STANDARD.encode(b),
        }),
    }
}

fn response_to_generated(response: &Value) -> Option<Generated> {
    use base64::Engine as _;
    if let Some(text) = response.get("content").and_then(|c| c.as_str()) {
        return Some(Generated::Text(text.to_string()));
    }
    if let Some(b64) = response.get("content_b64").and_then(|c| c.as_str()) {
        return base64::engine::general_purpose::STANDARD
            .decode(b64)
            .ok()
            .map(Generated::Bytes);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{proc_path, Registry};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use touchfs_backend::Message;
    use touchfs_store::dirname;

    struct ScriptedBackend {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl ScriptedBackend {
        fn new() -> Self {
            ScriptedBackend {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            }
        }
    }

    impl CompletionBackend for ScriptedBackend {
        fn chat(
            &self,
            _model: &str,
            _messages: &[Message],
            _schema_name: &str,
            _schema: &Value,
        ) -> Result<Value, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(BackendError::new(
                    touchfs_backend::BackendErrorKind::Http,
                    "backend down",
                ));
            }
            Ok(json!({"content": "generated text"}))
        }

        fn image(
            &self,
            _model: &str,
            _prompt: &str,
            _size: &str,
            _quality: &str,
        ) -> Result<Vec<u8>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0x89, 0x50, 0x4E, 0x47])
        }
    }

    // The cache-enabled flag is process-global; serialize engine tests.
    fn guard() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: Mutex<()> = Mutex::new(());
        LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tagged_file(store: &NodeStore, path: &str) {
        store.ensure_dir_all(&dirname(path)).unwrap();
        store.insert(path, Node::file(0o644)).unwrap();
        store
            .set_xattr(path, XATTR_GENERATE_CONTENT, b"true")
            .unwrap();
    }

    fn engine_with(backend: Arc<ScriptedBackend>) -> Engine {
        Engine::new(Registry::with_builtins(), backend)
    }

    #[test]
    fn generation_fills_content_and_clears_the_tag() {
        let _guard = guard();
        touchfs_cache::stats::set_enabled(false);
        let store = NodeStore::new();
        tagged_file(&store, "/notes/today.md");

        let backend = Arc::new(ScriptedBackend::new());
        let engine = engine_with(backend.clone());

        let first = engine.generate(&store, "/notes/today.md").unwrap();
        assert_eq!(first, Content::Text("generated text".into()));
        let node = store.find("/notes/today.md").unwrap();
        assert!(!node.wants_generation());
        assert_eq!(node.size(), 14);

        // Second call short-circuits on the already-written content.
        let second = engine.generate(&store, "/notes/today.md").unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        touchfs_cache::stats::set_enabled(true);
    }

    #[test]
    fn backend_failure_preserves_the_placeholder() {
        let _guard = guard();
        touchfs_cache::stats::set_enabled(false);
        let store = NodeStore::new();
        tagged_file(&store, "/f.txt");

        let backend = Arc::new(ScriptedBackend::new());
        backend.fail.store(true, Ordering::SeqCst);
        let engine = engine_with(backend.clone());

        let err = engine.generate(&store, "/f.txt").unwrap_err();
        assert!(matches!(err, GenerateError::Backend(_)));
        assert_eq!(err.errno(), libc::EIO);
        let node = store.find("/f.txt").unwrap();
        assert!(node.wants_generation());
        assert_eq!(node.size(), 0);

        // Backend restored: the same file is still retry-eligible.
        backend.fail.store(false, Ordering::SeqCst);
        let content = engine.generate(&store, "/f.txt").unwrap();
        assert_eq!(content, Content::Text("generated text".into()));
        touchfs_cache::stats::set_enabled(true);
    }

    #[test]
    fn concurrent_readers_observe_one_generation() {
        let _guard = guard();
        touchfs_cache::stats::set_enabled(false);
        let store = NodeStore::new();
        tagged_file(&store, "/shared.txt");

        let backend = Arc::new(ScriptedBackend::new());
        let engine = engine_with(backend.clone());

        let results: Vec<Content> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| engine.generate(&store, "/shared.txt").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        for r in &results {
            assert_eq!(r, &results[0]);
        }
        touchfs_cache::stats::set_enabled(true);
    }

    #[test]
    fn missing_generator_is_reported() {
        let _guard = guard();
        touchfs_cache::stats::set_enabled(false);
        let store = NodeStore::new();
        tagged_file(&store, "/f.txt");
        let engine = Engine::new(Registry::empty(), Arc::new(ScriptedBackend::new()));
        let err = engine.generate(&store, "/f.txt").unwrap_err();
        assert!(matches!(err, GenerateError::NoGenerator(_)));
        touchfs_cache::stats::set_enabled(true);
    }

    #[test]
    fn proc_overlays_regenerate_on_every_read() {
        let _guard = guard();
        touchfs_cache::stats::set_enabled(false);
        let store = NodeStore::new();
        let backend = Arc::new(ScriptedBackend::new());
        let engine = engine_with(backend);
        engine.registry().materialize_overlays(&store).unwrap();

        let path = proc_path("cache_enabled");
        let first = engine.generate(&store, &path).unwrap();
        assert_eq!(first, Content::Text("0\n".into()));
        // Overlay keeps its generator tag after a read.
        assert!(store.find(&path).unwrap().generator().is_some());

        touchfs_cache::stats::set_enabled(true);
        let second = engine.generate(&store, &path).unwrap();
        assert_eq!(second, Content::Text("1\n".into()));
    }

    /// Backend that echoes the system prompt back as the generated content,
    /// so tests can observe which prompt resolution won.
    struct EchoBackend;

    impl CompletionBackend for EchoBackend {
        fn chat(
            &self,
            _model: &str,
            messages: &[Message],
            _schema_name: &str,
            _schema: &Value,
        ) -> Result<Value, BackendError> {
            Ok(json!({"content": messages[0].content.clone()}))
        }

        fn image(
            &self,
            _model: &str,
            _prompt: &str,
            _size: &str,
            _quality: &str,
        ) -> Result<Vec<u8>, BackendError> {
            unreachable!()
        }
    }

    #[test]
    fn nearest_prompt_file_drives_generation() {
        let _guard = guard();
        touchfs_cache::stats::set_enabled(false);
        let store = NodeStore::new();
        store.ensure_dir_all("/project").unwrap();
        store.insert("/project/.prompt", Node::file(0o644)).unwrap();
        store
            .update("/project/.prompt", |n| {
                n.set_content(Content::Text("only emit the literal string OK".into()))
            })
            .unwrap();
        tagged_file(&store, "/project/file.txt");
        tagged_file(&store, "/other/file.txt");

        let engine = Engine::new(Registry::with_builtins(), Arc::new(EchoBackend));

        let near = engine.generate(&store, "/project/file.txt").unwrap();
        assert_eq!(
            near,
            Content::Text("only emit the literal string OK".into())
        );

        // No nearby prompt file: the global default applies.
        let far = engine.generate(&store, "/other/file.txt").unwrap();
        assert_eq!(far, Content::Text(touchfs_config::global_prompt()));
        touchfs_cache::stats::set_enabled(true);
    }

    fn retag_empty(store: &NodeStore, path: &str) {
        store
            .update(path, |n| {
                if let touchfs_store::NodeKind::File { content } = &mut n.kind {
                    *content = None;
                }
                n.xattrs
                    .insert(XATTR_GENERATE_CONTENT.into(), b"true".to_vec());
            })
            .unwrap();
    }

    #[test]
    fn structural_change_invalidates_the_outer_cache() {
        let _guard = guard();
        let dir = tempfile::tempdir().unwrap();
        let prev = std::env::var_os(touchfs_cache::ENV_CACHE_FOLDER);
        std::env::set_var(touchfs_cache::ENV_CACHE_FOLDER, dir.path());
        touchfs_cache::stats::set_enabled(true);

        let store = NodeStore::new();
        tagged_file(&store, "/a.txt");
        let backend = Arc::new(ScriptedBackend::new());
        let engine = engine_with(backend.clone());

        engine.generate(&store, "/a.txt").unwrap();
        let after_first = backend.calls.load(Ordering::SeqCst);

        // Same tree: the outer fingerprint matches and no provider call runs.
        retag_empty(&store, "/a.txt");
        engine.generate(&store, "/a.txt").unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), after_first);

        // A structural change flows into the fingerprint's structure view.
        store.insert("/b.txt", Node::file(0o644)).unwrap();
        retag_empty(&store, "/a.txt");
        engine.generate(&store, "/a.txt").unwrap();
        assert!(backend.calls.load(Ordering::SeqCst) > after_first);

        match prev {
            Some(v) => std::env::set_var(touchfs_cache::ENV_CACHE_FOLDER, v),
            None => std::env::remove_var(touchfs_cache::ENV_CACHE_FOLDER),
        }
    }

    #[test]
    fn needs_generation_covers_the_state_machine() {
        let mut file = Node::file(0o644);
        assert!(!needs_generation("/f", &file));
        file.xattrs
            .insert(XATTR_GENERATE_CONTENT.into(), b"true".to_vec());
        assert!(needs_generation("/f", &file));
        file.set_content(Content::Text("user wrote this".into()));
        assert!(!needs_generation("/f", &file));

        let mut proc = Node::file(0o644);
        proc.xattrs
            .insert(touchfs_store::XATTR_GENERATOR.into(), b"tree".to_vec());
        proc.set_content(Content::Text("old".into()));
        assert!(needs_generation("/.touchfs/tree", &proc));
        assert!(!needs_generation("/user/tree.txt", &proc));

        let dir = Node::directory(0o755);
        assert!(!needs_generation("/d", &dir));
    }
}
