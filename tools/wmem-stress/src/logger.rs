use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;

/// Writes `[LEVEL] target: message` lines to stderr.
pub struct StderrLogger {
    max_level: LevelFilter,
}

impl StderrLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Level from the `WMEM_LOG` environment variable, `info` if unset or
    /// unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let level = std::env::var("WMEM_LOG")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(LevelFilter::Info);
        Self::new(level)
    }

    /// Install as the global logger. Call once at start-up.
    #[allow(clippy::missing_errors_doc)]
    pub fn init(self) -> Result<(), SetLoggerError> {
        let max_level = self.max_level;
        log::set_logger(Box::leak(Box::new(self)))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // A closed stderr is not worth failing the run over.
        let _ = writeln!(
            std::io::stderr().lock(),
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
