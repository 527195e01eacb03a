//! Process-wide `log` backend
//!
//! On Android records go to logcat through `android_logger`; elsewhere they
//! go to an `env_logger` instance. Warnings and errors are also kept in a bounded
//! buffer that Java can pull with `nativeGetLastDebugMessages`, which is the
//! only way to see native failures from a release build without adb.

use std::collections::VecDeque;

use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;

/// Set to any value to log at debug level
pub const DEBUG_ENV_VAR: &str = "WEBVIEW_GPU_DEBUG";

/// Logcat tag on Android
#[cfg(target_os = "android")]
const LOGCAT_TAG: &str = "webview_gpu";

/// Maximum number of debug messages to store
const MAX_DEBUG_MESSAGES: usize = 100;

/// A single stored warning or error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugMessage {
    pub level: Level,
    pub message: String,
}

impl DebugMessage {
    /// `[LEVEL] message`, the form handed to Java
    pub fn formatted(&self) -> String {
        format!("[{}] {}", self.level, self.message)
    }
}

/// Thread-safe message buffer for nativeGetLastDebugMessages()
static DEBUG_MESSAGES: Lazy<Mutex<VecDeque<DebugMessage>>> =
    Lazy::new(|| Mutex::new(VecDeque::with_capacity(MAX_DEBUG_MESSAGES)));

static LOGGER: OnceCell<PluginLogger> = OnceCell::new();

/// Keep a message, dropping the oldest past [`MAX_DEBUG_MESSAGES`].
pub fn record_debug_message(level: Level, message: String) {
    let mut messages = DEBUG_MESSAGES.lock();
    if messages.len() == MAX_DEBUG_MESSAGES {
        messages.pop_front();
    }
    messages.push_back(DebugMessage { level, message });
}

/// Snapshot of stored messages, oldest first
pub fn last_debug_messages() -> Vec<DebugMessage> {
    DEBUG_MESSAGES.lock().iter().cloned().collect()
}

struct PluginLogger {
    level: LevelFilter,
    #[cfg(target_os = "android")]
    sink: android_logger::AndroidLogger,
    #[cfg(not(target_os = "android"))]
    sink: env_logger::Logger,
}

impl PluginLogger {
    #[cfg(target_os = "android")]
    fn new(level: LevelFilter) -> Self {
        let config = android_logger::Config::default()
            .with_tag(LOGCAT_TAG)
            .with_max_level(level);
        Self {
            level,
            sink: android_logger::AndroidLogger::new(config),
        }
    }

    #[cfg(not(target_os = "android"))]
    fn new(level: LevelFilter) -> Self {
        Self {
            level,
            sink: env_logger::Builder::new().filter_level(level).build(),
        }
    }
}

impl Log for PluginLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Only store warnings and errors
        if record.level() <= Level::Warn {
            record_debug_message(record.level(), record.args().to_string());
        }

        self.sink.log(record);
    }

    fn flush(&self) {
        self.sink.flush();
    }
}

/// Install the process logger. Safe to call from every entry point.
pub fn init_logging() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let level = if std::env::var(DEBUG_ENV_VAR).is_ok() {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };

        let logger = LOGGER.get_or_init(|| PluginLogger::new(level));
        match log::set_logger(logger) {
            Ok(()) => log::set_max_level(level),
            Err(_) => eprintln!("[webview_gpu] another logger is already installed"),
        }
    });
}
