//! Configuration for the Kestrel debugger core.
//!
//! Settings are read from a TOML file with three sections:
//!
//! ```toml
//! [logging]
//! level = "kestrel.breakpoints=debug,info"
//!
//! [evaluation]
//! allow_method_invocation = true
//! max_string_display = 80
//!
//! [breakpoints]
//! method_overloads = "all"
//! source_match = "tolerant"
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once, OnceLock};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebuggerConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub breakpoints: BreakpointsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A simple level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json: bool,

    /// Mirror logs to stderr in addition to the in-memory buffer.
    #[serde(default)]
    pub stderr: bool,

    /// Append logs to this file. If it cannot be opened, file logging is
    /// skipped and the other sinks stay active.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Number of log lines kept in memory.
    #[serde(default = "LoggingConfig::default_buffer_lines")]
    pub buffer_lines: usize,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_buffer_lines() -> usize {
        2_000
    }

    fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// The effective filter: the configured level merged with `RUST_LOG` when set.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        match env_directives {
            Some(env_directives) => {
                let config_directives = Self::normalize_level_directives(&self.level);
                tracing_subscriber::EnvFilter::try_new(format!(
                    "{config_directives},{env_directives}"
                ))
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: false,
            file: None,
            buffer_lines: Self::default_buffer_lines(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationConfig {
    /// When disabled, expressions that would run code in the target fail instead.
    #[serde(default = "EvaluationConfig::default_allow_method_invocation")]
    pub allow_method_invocation: bool,

    /// Displayed strings longer than this many characters are truncated.
    #[serde(default = "EvaluationConfig::default_max_string_display")]
    pub max_string_display: usize,

    /// Upper bound on unpinned object handles handed out to the caller.
    #[serde(default = "EvaluationConfig::default_max_object_handles")]
    pub max_object_handles: usize,
}

impl EvaluationConfig {
    fn default_allow_method_invocation() -> bool {
        true
    }

    fn default_max_string_display() -> usize {
        80
    }

    fn default_max_object_handles() -> usize {
        10_000
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            allow_method_invocation: Self::default_allow_method_invocation(),
            max_string_display: Self::default_max_string_display(),
            max_object_handles: Self::default_max_object_handles(),
        }
    }
}

/// Which overloads a method breakpoint without an explicit signature attaches to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MethodOverloadPolicy {
    /// Every overload sharing the name.
    #[default]
    All,
    /// Registration without parameter types is rejected.
    RequireSignature,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceMatchMode {
    /// Exact path, path suffix in either direction, or bare file name.
    #[default]
    Tolerant,
    /// Only the path the target reports, compared verbatim.
    Exact,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakpointsConfig {
    #[serde(default)]
    pub method_overloads: MethodOverloadPolicy,
    #[serde(default)]
    pub source_match: SourceMatchMode,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid config value for `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` embeds a source snippet; keep only the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl DebuggerConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::load_from_str(&text)?;
        tracing::debug!(target: "kestrel.config", path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: DebuggerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.logging.buffer_lines == 0 {
            return Err(ConfigError::Invalid {
                key: "logging.buffer_lines",
                message: "must be at least 1".to_owned(),
            });
        }
        if self.evaluation.max_string_display == 0 {
            return Err(ConfigError::Invalid {
                key: "evaluation.max_string_display",
                message: "must be at least 1".to_owned(),
            });
        }
        if self.evaluation.max_object_handles == 0 {
            return Err(ConfigError::Invalid {
                key: "evaluation.max_object_handles",
                message: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Bounded in-memory ring of formatted log lines.
#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    inner: Mutex<VecDeque<String>>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(8_192))),
        }
    }

    pub fn push_line(&self, line: String) {
        let mut inner = self.inner.lock();
        if inner.len() == self.capacity {
            inner.pop_front();
        }
        inner.push_back(line);
    }

    pub fn last_lines(&self, n: usize) -> Vec<String> {
        let inner = self.inner.lock();
        inner.iter().rev().take(n).cloned().rev().collect()
    }
}

struct LogBufferMakeWriter {
    buffer: Arc<LogBuffer>,
}

impl<'a> MakeWriter<'a> for LogBufferMakeWriter {
    type Writer = LogBufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogBufferWriter {
            buffer: self.buffer.clone(),
            bytes: Vec::new(),
        }
    }
}

/// Collects one formatted event and splits it into lines on drop.
struct LogBufferWriter {
    buffer: Arc<LogBuffer>,
    bytes: Vec<u8>,
}

impl Write for LogBufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogBufferWriter {
    fn drop(&mut self) {
        if self.bytes.is_empty() {
            return;
        }

        let text = String::from_utf8_lossy(&self.bytes);
        for line in text.split_terminator('\n') {
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                self.buffer.push_line(line.to_owned());
            }
        }
    }
}

struct FileMakeWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl<'a> MakeWriter<'a> for FileMakeWriter {
    type Writer = FileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        FileWriter {
            guard: self.file.lock(),
        }
    }
}

struct FileWriter<'a> {
    guard: parking_lot::MutexGuard<'a, std::fs::File>,
}

impl Write for FileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.guard.flush()
    }
}

static TRACING_INIT: Once = Once::new();
static GLOBAL_LOG_BUFFER: OnceLock<Arc<LogBuffer>> = OnceLock::new();

/// Install the global `tracing` subscriber.
///
/// Safe to call more than once; only the first call installs a subscriber and
/// later calls return the same in-memory buffer.
pub fn init_tracing(config: &LoggingConfig) -> Arc<LogBuffer> {
    let buffer = GLOBAL_LOG_BUFFER
        .get_or_init(|| Arc::new(LogBuffer::new(config.buffer_lines)))
        .clone();

    TRACING_INIT.call_once(|| {
        let filter = config.env_filter();

        let mut file_open_failed = false;
        let file = config.file.as_ref().and_then(|path| {
            let opened = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok();
            file_open_failed = opened.is_none();
            opened
        });

        let mut make_writer = BoxMakeWriter::new(LogBufferMakeWriter {
            buffer: buffer.clone(),
        });
        if config.stderr {
            // Keeps `cargo test` output capture working in debug builds.
            if cfg!(debug_assertions) {
                make_writer = BoxMakeWriter::new(
                    make_writer.and(tracing_subscriber::fmt::writer::TestWriter::with_stderr),
                );
            } else {
                make_writer = BoxMakeWriter::new(make_writer.and(io::stderr));
            }
        }
        if let Some(file) = file {
            make_writer = BoxMakeWriter::new(make_writer.and(FileMakeWriter {
                file: Arc::new(Mutex::new(file)),
            }));
        }

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if config.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() && file_open_failed {
            if let Some(path) = config.file.as_ref() {
                tracing::warn!(
                    target: "kestrel.config",
                    path = %path.display(),
                    "failed to open log file; file logging disabled"
                );
            }
        }
    });

    buffer
}
