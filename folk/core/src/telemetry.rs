use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use folk_logging::{JsonLogger, LogLevel, LogRecord};
use serde_json::Value;

/// Builder for folk telemetry sinks.
pub struct FolkTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
}

impl FolkTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
        }
    }

    /// Sets the JSON-lines log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<FolkTelemetry> {
        FolkTelemetry::new(self.module, self.log_path)
    }
}

/// Telemetry handle shared across evaluation runs.
///
/// Records are always mirrored to `tracing`; they are also appended to a
/// JSON-lines file when a log path was configured.
#[derive(Clone)]
pub struct FolkTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for FolkTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FolkTelemetry")
            .field("module", &self.inner.module)
            .field("log_path", &self.inner.logger.as_ref().map(JsonLogger::path))
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
}

impl FolkTelemetry {
    fn new(module: impl Into<String>, log_path: Option<PathBuf>) -> Result<Self> {
        let logger = log_path.map(JsonLogger::new).transpose()?;
        Ok(Self {
            inner: Arc::new(TelemetryInner {
                module: module.into(),
                logger,
            }),
        })
    }

    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> FolkTelemetryBuilder {
        FolkTelemetryBuilder::new(module)
    }

    /// Module name records are tagged with.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.inner.module
    }

    /// Logs structured metadata, tagged with the evaluation run when given.
    pub fn log(
        &self,
        level: LogLevel,
        message: &str,
        run_id: Option<&str>,
        metadata: Value,
    ) -> Result<()> {
        let module = self.inner.module.as_str();
        let run = run_id.unwrap_or_default();
        match level {
            LogLevel::Debug => tracing::debug!(module, run_id = run, %metadata, "{message}"),
            LogLevel::Info => tracing::info!(module, run_id = run, %metadata, "{message}"),
            LogLevel::Warn => tracing::warn!(module, run_id = run, %metadata, "{message}"),
            LogLevel::Error => tracing::error!(module, run_id = run, %metadata, "{message}"),
        }
        if let Some(logger) = &self.inner.logger {
            let mut record = LogRecord::new(module, level, message).with_metadata(metadata);
            if let Some(run_id) = run_id {
                record = record.with_run_id(run_id);
            }
            logger.log(&record)?;
        }
        Ok(())
    }
}
