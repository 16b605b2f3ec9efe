/*
 * Kernel Logging System
 *
 * Backend for the `log` facade used by the whole scheduler subsystem.
 *
 * The scheduler has no console of its own. The boot glue hands `init` a
 * sink function (serial port, VGA writer, a test buffer) and every record
 * is formatted as `[LEVEL] message` and passed to it.
 *
 * Records are emitted with interrupts in whatever state the caller left
 * them, so the sink must not block.
 */

use core::fmt;

use log::{LevelFilter, Metadata, Record, SetLoggerError};
use spin::Once;

/// Console output function supplied by the boot glue
pub type LogSink = fn(fmt::Arguments);

/// Where records go
static SINK: Once<LogSink> = Once::new();

/// Logger forwarding to the registered sink
struct KernelLogger;

impl log::Log for KernelLogger {
    /// Checks if the given log level is enabled.
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    /// Formats the record and hands it to the sink.
    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(sink) = SINK.get() {
            sink(format_args!("[{}] {}\n", record.level(), record.args()));
        }
    }

    /// Flushes the logger (no-op in this case).
    fn flush(&self) {}
}

/// The KernelLogger instance used for logging.
static LOGGER: KernelLogger = KernelLogger;

/// Install the kernel logger
///
/// # Arguments
///
/// * `sink` - Console output function
/// * `level` - Most verbose level that gets through
///
/// # Errors
///
/// Fails if a logger is already installed.
pub fn init(sink: LogSink, level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    SINK.call_once(|| sink);
    log::set_max_level(level);
    Ok(())
}
