use crate::{CharSink, console_write};
use kernel_sync::SpinLock;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// A [`Log`] implementation writing `"[LEVEL] target: message\n"` lines to a
/// [`CharSink`].
///
/// The sink sits behind a [`SpinLock`] so records from different cores do
/// not interleave mid-line.
pub struct ConsoleLogger<S> {
    max_level: LevelFilter,
    sink: SpinLock<S>,
}

impl<S: CharSink + Send> ConsoleLogger<S> {
    #[must_use]
    pub const fn new(sink: S, max_level: LevelFilter) -> Self {
        Self {
            max_level,
            sink: SpinLock::new(sink),
        }
    }

    /// Install this logger as the global [`log`] backend. Call once during early init.
    ///
    /// # Errors
    /// Fails if a logger was already installed.
    pub fn init(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }

    /// Exclusive access to the underlying sink.
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        self.sink.with_lock(f)
    }
}

impl<S: CharSink + Send> Log for ConsoleLogger<S> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut sink = self.sink.lock();
        console_write(
            &mut *sink,
            format_args!(
                "[{}] {}: {}\n",
                record.level(),
                record.target(),
                record.args()
            ),
        );
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[derive(Default)]
    struct Capture(Vec<u8>);

    impl CharSink for Capture {
        fn putc(&mut self, byte: u8) {
            self.0.push(byte);
        }
    }

    fn emit(logger: &ConsoleLogger<Capture>, level: Level, message: &str) {
        logger.log(
            &Record::builder()
                .level(level)
                .target("kernel_page_alloc")
                .args(format_args!("{message}"))
                .build(),
        );
    }

    #[test]
    fn formats_level_target_and_message() {
        let logger = ConsoleLogger::new(Capture::default(), LevelFilter::Trace);
        emit(&logger, Level::Warn, "out of memory");
        let text = logger.with_sink(|s| String::from_utf8(s.0.clone()).unwrap());
        assert_eq!(text, "[WARN] kernel_page_alloc: out of memory\n");
    }

    #[test]
    fn records_above_max_level_are_dropped() {
        let logger = ConsoleLogger::new(Capture::default(), LevelFilter::Info);
        emit(&logger, Level::Debug, "free run dump");
        emit(&logger, Level::Error, "invalid free");
        let text = logger.with_sink(|s| String::from_utf8(s.0.clone()).unwrap());
        assert_eq!(text, "[ERROR] kernel_page_alloc: invalid free\n");
    }
}
