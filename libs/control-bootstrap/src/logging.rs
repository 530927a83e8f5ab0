//! Tracing subscriber setup.
//!
//! Two sinks: human-readable console output on a non-blocking stderr writer,
//! and JSON lines in size-rotated files. File output is routed by target
//! prefix, so a section such as `nomad_service::access` can have a file of
//! its own while everything else lands in the `default` file.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::Context as _;
use file_rotate::compression::Compression;
use file_rotate::suffix::{AppendTimestamp, FileLimit};
use file_rotate::{ContentLimit, FileRotate};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LoggingConfig, Section};

// Dropping the guard stops the background console writer.
static CONSOLE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

const DEFAULT_SECTION: &str = "default";
const DEFAULT_MAX_SIZE_MB: u64 = 100;

/// Crates that are far too chatty below WARN.
const NOISY_CRATES: &[&str] = &["h2", "hyper_util", "reqwest"];

fn matches_target_prefix(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

// ---------------------------------------------------------------------------
// rotating file writers
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct RotWriter(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl RotWriter {
    fn open(path: &Path, section: &Section) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let limit = match section.max_backups {
            Some(files) => FileLimit::MaxFiles(files),
            None => {
                let days = section.max_age_days.unwrap_or(1);
                let age = chrono::Duration::try_days(i64::from(days))
                    .with_context(|| format!("invalid max_age_days: {days}"))?;
                FileLimit::Age(age)
            }
        };
        let max_bytes = section
            .max_size_mb
            .unwrap_or(DEFAULT_MAX_SIZE_MB)
            .saturating_mul(1024 * 1024);
        let max_bytes = usize::try_from(max_bytes).unwrap_or(usize::MAX);

        let rotate = FileRotate::new(
            path,
            AppendTimestamp::default(limit),
            ContentLimit::BytesSurpassed(max_bytes),
            Compression::None,
            None,
        );
        Ok(Self(Arc::new(Mutex::new(rotate))))
    }
}

/// Write handle that drops output when no file is configured for a target.
struct FileHandle(Option<Arc<Mutex<FileRotate<AppendTimestamp>>>>);

impl Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.0 {
            Some(file) => file
                .lock()
                .map_err(|e| io::Error::other(format!("log file lock poisoned: {e}")))?
                .write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &self.0 {
            Some(file) => file
                .lock()
                .map_err(|e| io::Error::other(format!("log file lock poisoned: {e}")))?
                .flush(),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Default)]
struct FileRouter {
    default: Option<RotWriter>,
    // Longest prefix first so `a::b` wins over `a`.
    by_prefix: Vec<(String, RotWriter)>,
}

impl FileRouter {
    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_prefix.is_empty()
    }

    fn resolve(&self, target: &str) -> Option<&RotWriter> {
        self.by_prefix
            .iter()
            .find(|(prefix, _)| matches_target_prefix(target, prefix))
            .map(|(_, writer)| writer)
            .or(self.default.as_ref())
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = FileHandle;

    fn make_writer(&'a self) -> Self::Writer {
        FileHandle(self.default.as_ref().map(|w| w.0.clone()))
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        FileHandle(self.resolve(meta.target()).map(|w| w.0.clone()))
    }
}

#[allow(clippy::print_stderr)]
fn build_file_router(cfg: &LoggingConfig, base_dir: &Path) -> FileRouter {
    let mut router = FileRouter::default();

    for (name, section) in cfg {
        let Some(file) = section.file() else {
            continue;
        };
        let path = if Path::new(file).is_absolute() {
            Path::new(file).to_path_buf()
        } else {
            base_dir.join(file)
        };
        // The subscriber is not installed yet, so stderr is the only outlet.
        let writer = match RotWriter::open(&path, section) {
            Ok(writer) => writer,
            Err(e) => {
                eprintln!("Failed to open log file {} for '{name}': {e:#}", path.display());
                continue;
            }
        };
        if name == DEFAULT_SECTION {
            router.default = Some(writer);
        } else {
            router.by_prefix.push((name.clone(), writer));
        }
    }

    router
        .by_prefix
        .sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
    router
}

// ---------------------------------------------------------------------------
// level filters
// ---------------------------------------------------------------------------

fn level_or_off(level: Option<tracing::Level>) -> LevelFilter {
    level.map_or(LevelFilter::OFF, LevelFilter::from_level)
}

fn console_targets(cfg: &LoggingConfig) -> Targets {
    let default_level = cfg
        .get(DEFAULT_SECTION)
        .map_or(LevelFilter::INFO, |s| level_or_off(s.console_level));

    let mut targets = Targets::new().with_default(default_level);
    for krate in NOISY_CRATES {
        targets = targets.with_target(*krate, LevelFilter::WARN);
    }
    for (name, section) in cfg.iter().filter(|(k, _)| *k != DEFAULT_SECTION) {
        targets = targets.with_target(name.clone(), level_or_off(section.console_level));
    }
    targets
}

fn file_targets(cfg: &LoggingConfig, has_default_file: bool) -> Targets {
    let default_level = if has_default_file {
        cfg.get(DEFAULT_SECTION)
            .map_or(LevelFilter::INFO, |s| level_or_off(s.file_level()))
    } else {
        LevelFilter::OFF
    };

    let mut targets = Targets::new().with_default(default_level);
    for (name, section) in cfg.iter().filter(|(k, _)| *k != DEFAULT_SECTION) {
        if section.file().is_some() {
            targets = targets.with_target(name.clone(), level_or_off(section.file_level()));
        }
    }
    targets
}

fn stderr_supports_ansi() -> bool {
    supports_color::on(supports_color::Stream::Stderr).is_some_and(|level| level.has_basic)
}

// ---------------------------------------------------------------------------
// public entry point
// ---------------------------------------------------------------------------

/// Install the global subscriber. Relative file paths resolve against
/// `base_dir`. `RUST_LOG`, when set, caps both sinks.
///
/// Calling this more than once is harmless; later calls are ignored.
#[allow(clippy::print_stderr)]
pub fn init_logging(cfg: &LoggingConfig, base_dir: &Path) {
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    let router = build_file_router(cfg, base_dir);
    let console = console_targets(cfg);
    let files = file_targets(cfg, router.default.is_some());
    let env = EnvFilter::try_from_default_env().ok();

    let (stderr, guard) = tracing_appender::non_blocking(io::stderr());
    _ = CONSOLE_GUARD.set(guard);

    let console_layer = fmt::layer()
        .with_writer(stderr)
        .with_ansi(stderr_supports_ansi())
        .with_target(true)
        .with_filter(console);

    let file_layer = (!router.is_empty()).then(|| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_writer(router)
            .with_filter(files)
    });

    _ = Registry::default()
        .with(env)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}
