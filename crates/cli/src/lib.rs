// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use touchfs_backend::models::GeneratedContent;
use touchfs_backend::{BackendError, BackendErrorKind, CompletionBackend, Message, OpenAiBackend};
use touchfs_fuse::{procs, MountConfig};
use touchfs_plugins::{expand_file_list, generate_seed_list, Engine, Registry};
use touchfs_store::NodeStore;

/// Public CLI definition used by the packaging-assets generator.
#[derive(Debug, Parser, Clone)]
#[command(name = "touchfs", version = env!("CARGO_PKG_VERSION"), arg_required_else_help = true, subcommand_required = false)]
#[command(about = "TouchFS: a filesystem that generates file content on first touch", long_about = None)]
pub struct CliForGen {
    /// Log format: human or jsonl
    #[arg(long, env = "TOUCHFS_LOG_FORMAT", default_value = "human")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Commands {
    /// Mount a generation-aware filesystem, or list mounted instances.
    ///
    /// With no mountpoint, lists currently mounted touchfs filesystems from
    /// the host mount table.
    Mount {
        /// Directory to mount. Must exist.
        mountpoint: Option<PathBuf>,

        /// Seed the tree from a prompt before mounting.
        #[arg(short = 'F', long = "filesystem-generation-prompt")]
        filesystem_generation_prompt: Option<String>,

        /// Global content-generation prompt for this mount.
        #[arg(short = 'p', long)]
        prompt: Option<String>,

        /// Stay in the foreground and tee logs to stderr.
        #[arg(short = 'f', long)]
        foreground: bool,

        /// Accept the generated tree without asking.
        #[arg(short = 'y', long)]
        yes: bool,

        /// Allow other users to access the mount.
        #[arg(long)]
        allow_other: bool,

        /// Allow root to access the mount.
        #[arg(long)]
        allow_root: bool,

        /// Mount over a non-empty directory.
        #[arg(long)]
        nonempty: bool,

        /// Answer kernel requests on the dispatch thread only.
        #[arg(long)]
        nothreads: bool,

        /// Real directory searched for .prompt/.model files before the
        /// in-mount tree.
        #[arg(long)]
        overlay: Option<PathBuf>,
    },

    /// Safely unmount touchfs filesystems.
    Umount {
        mountpoints: Vec<PathBuf>,

        /// Unmount even when processes are still using the mount.
        #[arg(long)]
        force: bool,
    },

    /// Create files and mark them for content generation.
    Touch {
        paths: Vec<PathBuf>,

        /// Create parent directories as needed.
        #[arg(short = 'p', long)]
        parents: bool,
    },

    /// Generate content immediately, outside the read path.
    ///
    /// With -F, generates a whole tree into a target directory.
    Generate {
        /// Files to generate, or the target directory when using -F.
        paths: Vec<PathBuf>,

        /// Generate a directory tree from this prompt.
        #[arg(short = 'F', long = "filesystem-generation-prompt")]
        filesystem_generation_prompt: Option<String>,

        /// Create files without generating content.
        #[arg(short = 'n', long)]
        no_content: bool,

        /// Create parent directories as needed.
        #[arg(short = 'p', long)]
        parents: bool,

        /// Accept the generated tree without asking.
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Print the structured context blob for a directory.
    Context {
        dir: PathBuf,

        /// Maximum token count for the blob.
        #[arg(long, default_value_t = touchfs_context::DEFAULT_MAX_TOKENS)]
        max_tokens: usize,

        /// Glob patterns to exclude (repeatable).
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },

    Version,
}

pub fn run_cli(cli: CliForGen) -> Result<()> {
    let cmd = match cli.command {
        Some(c) => c,
        None => {
            // main() prints help and exits with code 2 for this case; keep a
            // defensive fallback here for library callers.
            bail!("missing command");
        }
    };

    match cmd {
        Commands::Version => {
            touchfs_config::init_cli_logging(&cli.log_format)?;
            println!("{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Context {
            dir,
            max_tokens,
            exclude,
        } => {
            touchfs_config::init_cli_logging(&cli.log_format)?;
            let blob = touchfs_context::build_context(&dir, max_tokens, &exclude)
                .with_context(|| format!("build context for {}", dir.display()))?;
            println!("{blob}");
        }
        Commands::Touch { paths, parents } => {
            touchfs_config::init_cli_logging(&cli.log_format)?;
            touch(&paths, parents)?;
        }
        Commands::Umount { mountpoints, force } => {
            touchfs_config::init_cli_logging(&cli.log_format)?;
            umount(&mountpoints, force)?;
        }
        Commands::Generate {
            paths,
            filesystem_generation_prompt,
            no_content,
            parents,
            yes,
        } => {
            touchfs_config::init_cli_logging(&cli.log_format)?;
            generate(paths, filesystem_generation_prompt, no_content, parents, yes)?;
        }
        Commands::Mount {
            mountpoint,
            filesystem_generation_prompt,
            prompt,
            foreground,
            yes,
            allow_other,
            allow_root,
            nonempty,
            nothreads,
            overlay,
        } => {
            let Some(mountpoint) = mountpoint else {
                touchfs_config::init_cli_logging(&cli.log_format)?;
                list_mounts()?;
                return Ok(());
            };
            mount(MountArgs {
                mountpoint,
                filesystem_generation_prompt,
                prompt,
                foreground,
                yes,
                allow_other,
                allow_root,
                nonempty,
                nothreads,
                overlay,
            })?;
        }
    }

    Ok(())
}

/// Return short operator-oriented remediation hints for common failures.
///
/// Kept in the CLI layer so the backend error classifier stays pure and the
/// operator guidance can evolve without changing lower-level APIs.
pub fn operator_hints_for_error(err: &anyhow::Error) -> Option<&'static str> {
    for cause in err.chain() {
        if let Some(backend_err) = cause.downcast_ref::<BackendError>() {
            return Some(hints_for_backend_kind(backend_err.kind));
        }
    }
    None
}

fn hints_for_backend_kind(kind: BackendErrorKind) -> &'static str {
    match kind {
        BackendErrorKind::MissingApiKey => {
            "generation requires an API key. Export OPENAI_API_KEY and retry; files stay eligible for generation until it succeeds."
        }
        BackendErrorKind::Http => {
            "the completion provider is unreachable. Check network access and any proxy settings; cached content keeps working while the provider is down."
        }
        BackendErrorKind::Api => {
            "the completion provider rejected the request. Verify the configured model (see /.touchfs/model.default or TOUCHFS_DEFAULT_MODEL) and your account limits."
        }
        BackendErrorKind::Schema => {
            "the provider answered in an unexpected shape. Re-run with RUST_LOG=debug to capture the response; if it persists, try a different model."
        }
    }
}

struct MountArgs {
    mountpoint: PathBuf,
    filesystem_generation_prompt: Option<String>,
    prompt: Option<String>,
    foreground: bool,
    yes: bool,
    allow_other: bool,
    allow_root: bool,
    nonempty: bool,
    nothreads: bool,
    overlay: Option<PathBuf>,
}

/// Backend used when no API key is configured: every generation fails with
/// a retriable error while the rest of the filesystem keeps working.
struct UnconfiguredBackend;

impl CompletionBackend for UnconfiguredBackend {
    fn chat(
        &self,
        _model: &str,
        _messages: &[Message],
        _schema_name: &str,
        _schema: &serde_json::Value,
    ) -> Result<serde_json::Value, BackendError> {
        Err(BackendError::new(
            BackendErrorKind::MissingApiKey,
            "OPENAI_API_KEY environment variable is required",
        ))
    }

    fn image(
        &self,
        _model: &str,
        _prompt: &str,
        _size: &str,
        _quality: &str,
    ) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::new(
            BackendErrorKind::MissingApiKey,
            "OPENAI_API_KEY environment variable is required",
        ))
    }
}

fn backend_from_env() -> Arc<dyn CompletionBackend> {
    match OpenAiBackend::from_env() {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            warn!(error = %e, "backend_unconfigured");
            Arc::new(UnconfiguredBackend)
        }
    }
}

fn mount(args: MountArgs) -> Result<()> {
    if !args.mountpoint.exists() {
        bail!("{}: No such file or directory", args.mountpoint.display());
    }
    if !args.mountpoint.is_dir() {
        bail!("{}: not a directory", args.mountpoint.display());
    }

    let log_path = touchfs_config::init_mount_logging(args.foreground)?;
    info!(mountpoint = %args.mountpoint.display(), log = %log_path.display(), "mount_start");

    if let Some(prompt) = args.prompt.as_deref() {
        touchfs_config::set_global_prompt(prompt);
    }
    touchfs_config::set_overlay_root(args.overlay.clone());

    let store = Arc::new(NodeStore::new());
    let backend = backend_from_env();

    if let Some(seed) = touchfs_config::seed_prompt(args.filesystem_generation_prompt.as_deref())
    {
        let files = generate_seed_list(backend.as_ref(), &seed)?;
        render_file_list(&files);
        if !args.yes && !confirm("Mount this filesystem?")? {
            bail!("mount cancelled");
        }
        expand_file_list(&store, &files)?;
    } else {
        println!("No filesystem generation prompt provided, starting with empty filesystem");
    }

    let registry = Registry::with_builtins();
    registry
        .materialize_overlays(&store)
        .context("materialize plugin overlays")?;
    let engine = Arc::new(Engine::new(registry, backend));

    let config = MountConfig {
        allow_other: args.allow_other,
        allow_root: args.allow_root,
        nonempty: args.nonempty,
        nothreads: args.nothreads,
        fsname: touchfs_config::fsname(),
    };
    touchfs_fuse::mount(store, engine, &args.mountpoint, &config)
}

fn render_file_list(files: &[String]) {
    println!("Generated filesystem structure:");
    let mut sorted = files.to_vec();
    sorted.sort();
    for f in &sorted {
        println!("  {f}");
    }
}

fn confirm(question: &str) -> Result<bool> {
    // Non-interactive callers get auto-accept, matching -y.
    if !std::io::stdin().is_terminal() {
        return Ok(true);
    }
    print!("{question} [Y/n] ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let answer = line.trim().to_lowercase();
    Ok(answer.is_empty() || answer == "y" || answer == "yes")
}

/// Parse the host mount table for touchfs instances.
fn mounted_touchfs() -> Vec<String> {
    let Ok(table) = std::fs::read_to_string("/proc/mounts") else {
        return Vec::new();
    };
    parse_mount_table(&table)
}

fn parse_mount_table(table: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in table.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        let (source, mountpoint, fstype) = (fields[0], fields[1], fields[2]);
        if fstype.starts_with("fuse") && (source == "touchfs" || fstype == "fuse.touchfs") {
            out.push(mountpoint.to_string());
        }
    }
    out.sort();
    out
}

fn list_mounts() -> Result<()> {
    let mounted = mounted_touchfs();
    if mounted.is_empty() {
        println!("No touchfs filesystems currently mounted");
        return Ok(());
    }
    println!("Currently mounted touchfs filesystems:");
    for mountpoint in mounted {
        match serving_pid(&mountpoint) {
            Some((pid, cmd)) => println!("{mountpoint} {pid} {cmd}"),
            None => println!("{mountpoint}"),
        }
    }
    Ok(())
}

/// Best-effort: the touchfs process serving a mountpoint, from its cmdline.
fn serving_pid(mountpoint: &str) -> Option<(i32, String)> {
    let entries = std::fs::read_dir("/proc").ok()?;
    for entry in entries.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<i32>() else {
            continue;
        };
        let Ok(raw) = std::fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        let cmdline = raw
            .split(|b| *b == 0)
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join(" ");
        if cmdline.contains("touchfs") && cmdline.contains(mountpoint) {
            return Some((pid, cmdline.trim().to_string()));
        }
    }
    None
}

fn umount(mountpoints: &[PathBuf], force: bool) -> Result<()> {
    if mountpoints.is_empty() {
        bail!("no mountpoints given");
    }
    let known = mounted_touchfs();
    for mountpoint in mountpoints {
        let canonical = mountpoint
            .canonicalize()
            .with_context(|| format!("resolve {}", mountpoint.display()))?;
        let display_path = canonical.display().to_string();
        if !known.contains(&display_path) {
            bail!("{display_path} is not a mounted touchfs filesystem");
        }

        let users = procs::processes_using(&canonical);
        if !users.is_empty() {
            eprintln!("Found processes using mount point:");
            for p in &users {
                eprintln!("  - {} (PID: {})", p.name, p.pid);
            }
            if !force {
                bail!("mount point busy; use --force to unmount anyway");
            }
            warn!(mountpoint = %display_path, "forcing_unmount_of_busy_mount");
        }

        let fusermount = which::which("fusermount")
            .or_else(|_| which::which("fusermount3"))
            .context("find fusermount on PATH")?;
        let mut cmd = std::process::Command::new(&fusermount);
        if force {
            cmd.arg("-uz");
        } else {
            cmd.arg("-u");
        }
        cmd.arg(&canonical);
        let output = cmd.output().context("run fusermount")?;
        if !output.status.success() {
            bail!(
                "unmount of {display_path} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        println!("Unmounted {display_path}");
    }
    Ok(())
}

/// Walk up from `path` looking for the proc-overlay marker directory.
fn inside_touchfs_mount(path: &Path) -> bool {
    let mut current = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => return false,
        }
    };
    loop {
        if current.join(".touchfs").exists() {
            return true;
        }
        if !current.pop() {
            return false;
        }
    }
}

fn set_generate_xattr(path: &Path) -> Result<()> {
    let c_path = std::ffi::CString::new(path.to_string_lossy().as_bytes())
        .context("path contains NUL")?;
    let c_name = std::ffi::CString::new(touchfs_store::XATTR_GENERATE_CONTENT).expect("static");
    let value = b"true";
    let rc = unsafe {
        libc::setxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            value.as_ptr().cast(),
            value.len(),
            0,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("set xattr on {}", path.display()));
    }
    Ok(())
}

fn touch(paths: &[PathBuf], parents: bool) -> Result<()> {
    if paths.is_empty() {
        bail!("no paths given");
    }
    for path in paths {
        if parents {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("touch {}", path.display()))?;

        if inside_touchfs_mount(path) {
            set_generate_xattr(path)
                .with_context(|| format!("mark {} for generation", path.display()))?;
            info!(path = %path.display(), "marked_for_generation");
        } else {
            warn!(path = %path.display(), "not_inside_a_touchfs_mount");
        }
    }
    Ok(())
}

fn generate(
    paths: Vec<PathBuf>,
    filesystem_generation_prompt: Option<String>,
    no_content: bool,
    parents: bool,
    yes: bool,
) -> Result<()> {
    if let Some(seed) = filesystem_generation_prompt {
        if paths.len() != 1 {
            bail!("with -F/--filesystem-generation-prompt, exactly one target directory must be specified");
        }
        return generate_tree(&paths[0], &seed, no_content, parents, yes);
    }

    if paths.is_empty() {
        bail!("no paths given");
    }
    let backend = backend_from_env();
    for path in &paths {
        if parents {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }
        if inside_touchfs_mount(path) {
            // Inside a mount the VFS owns generation: mark the file and
            // force a read through the kernel.
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("create {}", path.display()))?;
            set_generate_xattr(path)?;
            if !no_content {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("trigger generation of {}", path.display()))?;
                println!("{}: {} bytes", path.display(), bytes.len());
            }
        } else {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("create {}", path.display()))?;
            if !no_content {
                let content = generate_host_file(backend.as_ref(), path)?;
                std::fs::write(path, &content)
                    .with_context(|| format!("write {}", path.display()))?;
                println!("{}: {} bytes", path.display(), content.len());
            }
        }
    }
    Ok(())
}

/// Generate a whole tree as real files on the host filesystem.
fn generate_tree(
    target: &Path,
    seed: &str,
    no_content: bool,
    parents: bool,
    yes: bool,
) -> Result<()> {
    if target.exists() {
        if target.is_file() {
            bail!("'{}' exists and is a file", target.display());
        }
        let mut entries = std::fs::read_dir(target)
            .with_context(|| format!("read {}", target.display()))?;
        if entries.next().is_some() {
            bail!("'{}' exists and is not empty", target.display());
        }
    } else if parents {
        std::fs::create_dir_all(target)
            .with_context(|| format!("create {}", target.display()))?;
    } else {
        std::fs::create_dir(target)
            .with_context(|| format!("create {} (use --parents for ancestors)", target.display()))?;
    }

    let backend = backend_from_env();
    let files = generate_seed_list(backend.as_ref(), seed)?;
    render_file_list(&files);
    if !yes && !confirm("Create these files?")? {
        bail!("generation cancelled");
    }

    for file in &files {
        if file.split('/').any(|c| c.starts_with(".touchfs")) {
            continue;
        }
        let host_path = target.join(file.trim_start_matches('/'));
        if let Some(parent) = host_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        if no_content {
            std::fs::write(&host_path, b"")
                .with_context(|| format!("create {}", host_path.display()))?;
        } else {
            let content = generate_host_file(backend.as_ref(), &host_path)?;
            std::fs::write(&host_path, &content)
                .with_context(|| format!("write {}", host_path.display()))?;
        }
        println!("{}", host_path.display());
    }
    Ok(())
}

/// Direct backend generation for a real file outside any mount.
fn generate_host_file(backend: &dyn CompletionBackend, path: &Path) -> Result<String> {
    let prompt = touchfs_config::global_prompt();
    let model = touchfs_config::current_model();
    let messages = [
        Message::system(prompt),
        Message::user(format!(
            "Generate content for the file {}. Produce the complete file body.",
            path.display()
        )),
    ];
    let parsed: GeneratedContent =
        touchfs_backend::chat_parsed(backend, &model, &messages, "generated_content")
            .with_context(|| format!("generate content for {}", path.display()))?;
    Ok(parsed.content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_table_parsing_picks_touchfs_lines() {
        let table = "\
proc /proc proc rw 0 0
touchfs /home/u/fs fuse.touchfs rw,nosuid,nodev 0 0
/dev/sda1 / ext4 rw 0 0
other /mnt/x fuse.sshfs rw 0 0
touchfs /home/u/other fuse.touchfs rw 0 0
";
        assert_eq!(
            parse_mount_table(table),
            vec!["/home/u/fs".to_string(), "/home/u/other".to_string()]
        );
    }

    #[test]
    fn touchfs_marker_detection_walks_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        assert!(!inside_touchfs_mount(&nested.join("f.txt")));

        std::fs::create_dir(dir.path().join(".touchfs")).unwrap();
        assert!(inside_touchfs_mount(&nested.join("f.txt")));
    }

    #[test]
    fn backend_hints_cover_every_kind() {
        for kind in [
            BackendErrorKind::MissingApiKey,
            BackendErrorKind::Http,
            BackendErrorKind::Api,
            BackendErrorKind::Schema,
        ] {
            assert!(!hints_for_backend_kind(kind).is_empty());
        }
        let err = anyhow::Error::new(BackendError::new(
            BackendErrorKind::MissingApiKey,
            "no key",
        ));
        assert!(operator_hints_for_error(&err).unwrap().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn touch_creates_plain_files_outside_mounts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/new.txt");
        touch(&[path.clone()], true).unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }
}
