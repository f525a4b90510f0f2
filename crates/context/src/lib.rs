// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Token-bounded context assembly for generation.
//!
//! Collects source-like files, orders them so module entry points come
//! first, and renders a structured blob with a token-accounting header.
//! Files that would exceed the token budget end the collection: iteration
//! stops at the first excluded file.

use anyhow::{Context as _, Result};
use base64::Engine as _;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::json;
use std::path::Path;
use tiktoken_rs::CoreBPE;
use walkdir::WalkDir;

pub const DEFAULT_MAX_TOKENS: usize = 8000;

/// Bytecode and VCS metadata never belong in context.
pub const DEFAULT_EXCLUDES: [&str; 3] = ["*.pyc", "*/__pycache__/*", "*.git*"];

const TEXT_EXTENSIONS: [&str; 16] = [
    "txt", "md", "py", "rs", "js", "ts", "css", "html", "json", "yml", "yaml", "ini", "conf",
    "toml", "sh", "cfg",
];

fn extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn is_text_path(path: &str) -> bool {
    TEXT_EXTENSIONS.contains(&extension(path).as_str())
}

struct Resource {
    path: String,
    content: String,
}

pub struct ContextBuilder {
    max_tokens: usize,
    current_tokens: usize,
    bpe: CoreBPE,
    parts: Vec<Resource>,
}

impl ContextBuilder {
    pub fn new(max_tokens: usize) -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().context("load cl100k tokenizer")?;
        Ok(ContextBuilder {
            max_tokens,
            current_tokens: 0,
            bpe,
            parts: Vec::new(),
        })
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    pub fn token_count(&self) -> usize {
        self.current_tokens
    }

    /// Add one file. Returns false (and adds nothing) when the file would
    /// push the blob past the token budget.
    pub fn add_file(&mut self, path: &str, content: &[u8]) -> bool {
        let (content_str, content_type) = if is_text_path(path) {
            match std::str::from_utf8(content) {
                Ok(s) => (s.to_string(), "text"),
                Err(_) => (
                    base64::engine::general_purpose::STANDARD.encode(content),
                    "binary",
                ),
            }
        } else {
            (
                base64::engine::general_purpose::STANDARD.encode(content),
                "binary",
            )
        };

        // Token accounting covers the structured form, not just raw content.
        let resource = json!({
            "uri": format!("file://{path}"),
            "type": "source_file",
            "metadata": {
                "path": path,
                "extension": extension(path),
                "filename": Path::new(path).file_name().map(|f| f.to_string_lossy().into_owned()).unwrap_or_default(),
                "content_type": content_type,
            },
            "content": content_str,
        });
        let formatted = serde_json::to_string_pretty(&resource).unwrap_or_default();
        let tokens = self.count_tokens(&formatted);
        if self.current_tokens + tokens > self.max_tokens {
            return false;
        }
        self.current_tokens += tokens;
        self.parts.push(Resource {
            path: path.to_string(),
            content: content_str,
        });
        true
    }

    /// Render the blob: accounting header, module markers, fenced files.
    pub fn build(&self) -> String {
        let mut sorted: Vec<&Resource> = self.parts.iter().collect();
        sorted.sort_by_key(|r| sort_key(&r.path));

        let mut out: Vec<String> = Vec::new();
        out.push("# Context Information".to_string());
        out.push(format!("Total Files: {}", self.parts.len()));
        out.push(format!("Token Count: {}", self.current_tokens));
        out.push(format!("Token Limit: {}", self.max_tokens));
        out.push(String::new());

        let mut current_module: Option<String> = None;
        for resource in sorted {
            let module = Path::new(&resource.path)
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            if current_module.as_deref() != Some(module.as_str()) {
                current_module = Some(module.clone());
                if !module.is_empty() && module != "." {
                    out.push(format!("\n# Module: {module}\n"));
                }
            }

            let ext = extension(&resource.path);
            out.push(format!("# File: {}", resource.path));
            out.push(format!(
                "Type: {}",
                if ext.is_empty() {
                    "unknown".to_string()
                } else {
                    ext
                }
            ));
            out.push("```".to_string());
            out.push(resource.content.trim_end().to_string());
            out.push("```".to_string());
            out.push(String::new());
        }
        out.join("\n")
    }
}

/// Ordering: top-level module roots, then main modules, then setup files;
/// nested files grouped by directory with module roots first; remaining
/// top-level files last.
fn sort_key(path: &str) -> (u8, Vec<String>, u8, Vec<String>) {
    let parts: Vec<String> = Path::new(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let filename = parts.last().cloned().unwrap_or_default();

    if parts.len() == 1 {
        let rank = match filename.as_str() {
            "__init__.py" => 0,
            "__main__.py" => 1,
            "setup.py" => 2,
            _ => return (2, Vec::new(), 0, parts),
        };
        return (0, Vec::new(), rank, parts);
    }

    let dir: Vec<String> = parts[..parts.len() - 1].to_vec();
    let rank = if filename == "__init__.py" { 0 } else { 1 };
    (1, dir, rank, parts)
}

fn build_exclude_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid pattern '{pattern}'"))?);
    }
    Ok(builder.build()?)
}

/// Collect source files under `directory` into a rendered context blob.
pub fn build_context(
    directory: &Path,
    max_tokens: usize,
    exclude_patterns: &[String],
) -> Result<String> {
    let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    patterns.extend_from_slice(exclude_patterns);
    let excludes = build_exclude_set(&patterns)?;

    let mut files: Vec<String> = Vec::new();
    for entry in WalkDir::new(directory).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(directory)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();
        if excludes.is_match(&rel) || !is_text_path(&rel) {
            continue;
        }
        files.push(rel);
    }
    files.sort_by_key(|p| sort_key(p));

    let mut builder = ContextBuilder::new(max_tokens)?;
    for rel in files {
        let full = directory.join(&rel);
        let content = match std::fs::read(&full) {
            Ok(c) => c,
            Err(_) => continue,
        };
        if !builder.add_file(&rel, &content) {
            break;
        }
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_points_sort_first() {
        let mut paths = vec![
            "pkg/util.py".to_string(),
            "setup.py".to_string(),
            "__init__.py".to_string(),
            "pkg/__init__.py".to_string(),
            "README.md".to_string(),
            "__main__.py".to_string(),
        ];
        paths.sort_by_key(|p| sort_key(p));
        assert_eq!(
            paths,
            vec![
                "__init__.py",
                "__main__.py",
                "setup.py",
                "pkg/__init__.py",
                "pkg/util.py",
                "README.md",
            ]
        );
    }

    #[test]
    fn token_budget_stops_at_first_excluded_file() {
        let mut builder = ContextBuilder::new(200).unwrap();
        assert!(builder.add_file("a.py", b"x = 1\n"));
        let big = "y = 2\n".repeat(400);
        assert!(!builder.add_file("b.py", big.as_bytes()));
        let blob = builder.build();
        assert!(blob.contains("Total Files: 1"));
        assert!(blob.contains("# File: a.py"));
        assert!(!blob.contains("b.py"));
    }

    #[test]
    fn header_reports_counts_and_limit() {
        let mut builder = ContextBuilder::new(500).unwrap();
        builder.add_file("m.py", b"print('hi')\n");
        let blob = builder.build();
        assert!(blob.starts_with("# Context Information"));
        assert!(blob.contains("Token Limit: 500"));
        assert!(blob.contains(&format!("Token Count: {}", builder.token_count())));
    }

    #[test]
    fn build_context_skips_excluded_and_non_source_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "print('x')\n").unwrap();
        std::fs::write(dir.path().join("main.pyc"), b"\x00\x01").unwrap();
        std::fs::write(dir.path().join("image.bin"), b"\x00\x01").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/notes.md"), "# notes\n").unwrap();

        let blob = build_context(dir.path(), DEFAULT_MAX_TOKENS, &[]).unwrap();
        assert!(blob.contains("# File: main.py"));
        assert!(blob.contains("# File: docs/notes.md"));
        assert!(!blob.contains("main.pyc"));
        assert!(!blob.contains("image.bin"));

        let blob = build_context(dir.path(), DEFAULT_MAX_TOKENS, &["docs/*".to_string()]).unwrap();
        assert!(!blob.contains("notes.md"));
    }

    #[test]
    fn module_markers_group_nested_files() {
        let mut builder = ContextBuilder::new(DEFAULT_MAX_TOKENS).unwrap();
        builder.add_file("pkg/a.py", b"a = 1\n");
        builder.add_file("pkg/b.py", b"b = 2\n");
        let blob = builder.build();
        assert_eq!(blob.matches("# Module: pkg").count(), 1);
    }
}
