//! Logging infrastructure - structured tracing across the bridge
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels (env or config file)
//! - Console or rolling-file output via `tracing-appender`
//! - Human-readable or JSON records
//! - One helper per bridge event, each tagged with an `event` field

use std::fmt::Display;
use std::io;
use std::path::Path;

use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Global logging state; holds the file writer guard when logging to a file
static LOGGER: OnceCell<Option<WorkerGuard>> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable file logging
    pub file_output: bool,
    /// Log file path (if file_output enabled)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // LUALINK_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("LUALINK_LOG_LEVEL") {
            config.level = parse_level(&level_str).unwrap_or(Level::INFO);
        }

        // LUALINK_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("LUALINK_LOG_FILE") {
            config.file_output = true;
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("LUALINK_LOG_JSON").is_ok();
        config.show_spans = std::env::var("LUALINK_LOG_SPANS").is_ok();

        config
    }

    /// Errors only
    pub fn quiet() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Everything, including span events
    pub fn verbose() -> Self {
        Self {
            level: Level::TRACE,
            show_spans: true,
            ..Self::default()
        }
    }
}

/// Parse a level name as used in env variables and config files
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize logging with default configuration
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration; later calls are no-ops
pub fn init_with_config(config: LogConfig) {
    LOGGER.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("lualink={}", config.level.as_str().to_lowercase()))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let (writer, guard) = match config.log_path.as_deref().filter(|_| config.file_output) {
            Some(path) => {
                let path = Path::new(path);
                let directory = path.parent().filter(|p| !p.as_os_str().is_empty());
                let prefix = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "lualink.log".to_string());
                let appender = tracing_appender::rolling::daily(
                    directory.unwrap_or_else(|| Path::new(".")),
                    prefix,
                );
                let (w, g) = tracing_appender::non_blocking(appender);
                (w, Some(g))
            }
            None => {
                let (w, g) = tracing_appender::non_blocking(io::stderr());
                (w, Some(g))
            }
        };

        let layer = fmt::layer()
            .with_writer(writer)
            .with_span_events(span_events)
            .with_target(true)
            .with_line_number(cfg!(debug_assertions));
        let layer = if config.json_format {
            layer.json().boxed()
        } else {
            layer.boxed()
        };

        // Another subscriber may already be installed by the host.
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init();
        guard
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER.get().is_some()
}

// ============================================================================
// Bridge-specific logging functions
// ============================================================================

/// Log a native → script call
#[inline]
pub fn log_internal_call(function: &str, arg_count: usize) {
    use tracing::trace;
    trace!(
        event = "internal_call",
        function = function,
        args = arg_count,
        "Native code calling script function"
    );
}

/// Log a script → native call
#[inline]
pub fn log_external_call(function: &str, arg_count: usize) {
    use tracing::trace;
    trace!(
        event = "external_call",
        function = function,
        args = arg_count,
        "Script calling native function"
    );
}

/// Log trampoline generation
pub fn log_trampoline_generated(function: &str, direction: &str, address: usize) {
    use tracing::debug;
    debug!(
        event = "trampoline_generated",
        function = function,
        direction = direction,
        address = format_args!("{:#x}", address),
        "Trampoline generated"
    );
}

/// Log a trampoline dropped after its last holder released it
#[inline]
pub fn log_trampoline_released(address: usize) {
    use tracing::debug;
    debug!(
        event = "trampoline_released",
        address = format_args!("{:#x}", address),
        "Trampoline released"
    );
}

/// Log an identity cache hit
#[inline]
pub fn log_cache_hit(function: &str, address: usize) {
    use tracing::trace;
    trace!(
        event = "cache_hit",
        function = function,
        address = format_args!("{:#x}", address),
        "Reusing boxed function"
    );
}

/// Log a failed conversion; position 0 is the return value
pub fn log_conversion_error(function: &str, position: usize, error: &dyn Display) {
    use tracing::error;
    error!(
        event = "conversion_error",
        function = function,
        position = position,
        error = %error,
        "Value conversion failed, returning fallback"
    );
}

/// Log a failed by-reference write-back
pub fn log_writeback_error(function: &str, position: usize, error: &dyn Display) {
    use tracing::error;
    error!(
        event = "writeback_error",
        function = function,
        position = position,
        error = %error,
        "Could not write back by-reference parameter"
    );
}

/// Log a script error; the message carries the script stack traceback
pub fn log_script_error(function: &str, error: &mlua::Error) {
    use tracing::error;
    error!(
        event = "script_error",
        function = function,
        error = %error,
        "Script function failed"
    );
}

/// Log a plugin lifecycle event
pub fn log_plugin_event(plugin: &str, event_name: &str) {
    use tracing::info;
    info!(
        event = "plugin",
        plugin = plugin,
        stage = event_name,
        "Plugin lifecycle event"
    );
}

/// Log a failed plugin hook
pub fn log_plugin_error(plugin: &str, hook: &str, error: &dyn Display) {
    use tracing::error;
    error!(
        event = "plugin_error",
        plugin = plugin,
        hook = hook,
        error = %error,
        "Plugin hook failed"
    );
}

/// Log a native module exposed to scripts
pub fn log_module_exposed(module: &str, methods: usize, skipped: usize) {
    use tracing::debug;
    debug!(
        event = "module_exposed",
        module = module,
        methods = methods,
        skipped = skipped,
        "Native module available to scripts"
    );
}

/// Log language module initialization
pub fn log_module_init(lib_dir: Option<&Path>, libraries: usize) {
    use tracing::info;
    info!(
        event = "module_init",
        lib_dir = ?lib_dir,
        libraries = libraries,
        "Lua language module initializing"
    );
}

/// Log context shutdown
pub fn log_context_shutdown(released: usize) {
    use tracing::info;
    info!(
        event = "context_shutdown",
        released_bindings = released,
        "Script context shutting down"
    );
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &str) -> PerformanceGuard {
        PerformanceGuard {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: String,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            let elapsed = self.start.elapsed();
            debug!(
                operation = %self.operation,
                duration_us = elapsed.as_micros() as u64,
                "operation completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_presets() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.file_output);

        assert_eq!(LogConfig::quiet().level, Level::ERROR);

        let verbose = LogConfig::verbose();
        assert_eq!(verbose.level, Level::TRACE);
        assert!(verbose.show_spans);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Some(Level::DEBUG));
        assert_eq!(parse_level("warning"), Some(Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_init_idempotent() {
        init();
        init(); // Should not panic
        assert!(is_initialized());
    }
}
